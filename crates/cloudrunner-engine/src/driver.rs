//! Per-frame host glue.
//!
//! A host calls [`FrameDriver::frame`] once per rendered frame with the wall
//! time since the previous frame. The driver clamps that to a bounded step so
//! a stalled tab does not dump seconds of queued effects at once, regenerates
//! the ledger, announces weak-window openings on every node, and ticks the engine.

use std::time::Duration;

use cloudrunner_sched::scheduler::AdvanceReport;
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, RegenRates};
use crate::engine::Engine;
use crate::ledger::Resource;
use crate::output::OutputSink;

/// Everything the player fed into one frame. This is the unit the replay
/// recorder stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInput {
    /// Terminal lines entered during the frame, in order.
    pub lines: Vec<String>,
    /// Elapsed wall time for the frame, before clamping. Kept at full
    /// precision so a saved replay log steps exactly as recorded.
    pub dt: Duration,
}

impl FrameInput {
    /// A frame with no input.
    pub fn idle(dt: Duration) -> Self {
        Self {
            lines: Vec::new(),
            dt,
        }
    }
}

/// Advances an [`Engine`] one frame at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDriver {
    max_dt: Duration,
    regen: RegenRates,
}

impl FrameDriver {
    /// A driver with an explicit step bound and drift rates.
    pub fn new(max_dt: Duration, regen: RegenRates) -> Self {
        Self { max_dt, regen }
    }

    /// A driver using the config's `max_frame_dt` and `regen`.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_frame_dt, config.regen)
    }

    /// Upper bound on a frame's step.
    pub fn max_dt(&self) -> Duration {
        self.max_dt
    }

    /// Run one frame of `elapsed` wall time.
    pub fn frame<S: OutputSink>(&self, engine: &mut Engine<S>, elapsed: Duration) -> AdvanceReport {
        let dt = elapsed.min(self.max_dt);
        let before = engine.time();

        let secs = dt.as_secs_f64();
        if secs > 0.0 {
            for resource in Resource::ALL {
                engine.drift(resource, self.regen.rate(resource) * secs);
            }
        }

        let after = before.saturating_add(dt);
        let opened: Vec<String> = engine
            .game()
            .map
            .nodes()
            .filter(|node| node.weak_window.opened_between(before, after))
            .map(|node| format!("{}: weak window open", node.name))
            .collect();
        for message in opened {
            engine.sink_mut().toast(&message);
        }

        engine.tick(dt)
    }

    /// Execute the frame's lines, then run the frame.
    pub fn step<S: OutputSink>(&self, engine: &mut Engine<S>, input: &FrameInput) -> AdvanceReport {
        for line in &input.lines {
            engine.execute_line(line);
        }
        self.frame(engine, input.dt)
    }
}
