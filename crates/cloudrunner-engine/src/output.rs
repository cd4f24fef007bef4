//! Output sinks consumed by the presentation layer.
//!
//! The engine writes human-readable lines (acknowledgments, rejections,
//! effect results) through [`OutputSink::write`] and notable one-off events
//! through [`OutputSink::toast`]. What a host does with them (a terminal, a
//! HUD popup, a test buffer) is outside the engine.

use serde::{Deserialize, Serialize};

/// Destination for engine output.
pub trait OutputSink {
    /// A line for the terminal log.
    fn write(&mut self, message: &str);

    /// A transient notification, distinct from the line log.
    fn toast(&mut self, message: &str);
}

/// One captured output event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputEvent {
    /// Written via [`OutputSink::write`].
    Line(String),
    /// Written via [`OutputSink::toast`].
    Toast(String),
}

/// Sink that buffers every event in order.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Vec<OutputEvent>,
}

impl RecordingSink {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events so far, in emission order.
    pub fn events(&self) -> &[OutputEvent] {
        &self.events
    }

    /// Only the line events.
    pub fn lines(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                OutputEvent::Line(s) => Some(s.as_str()),
                OutputEvent::Toast(_) => None,
            })
            .collect()
    }

    /// Only the toast events.
    pub fn toasts(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                OutputEvent::Toast(s) => Some(s.as_str()),
                OutputEvent::Line(_) => None,
            })
            .collect()
    }

    /// Whether any line contains `needle`.
    pub fn has_line_containing(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }

    /// Take all buffered events, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<OutputEvent> {
        std::mem::take(&mut self.events)
    }
}

impl OutputSink for RecordingSink {
    fn write(&mut self, message: &str) {
        self.events.push(OutputEvent::Line(message.to_owned()));
    }

    fn toast(&mut self, message: &str) {
        self.events.push(OutputEvent::Toast(message.to_owned()));
    }
}
