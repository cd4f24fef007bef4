//! Deterministic replay with input recording and checkpoint verification.
//!
//! The recorder stores every [`FrameInput`] fed to a [`FrameDriver`] plus
//! periodic state hash checkpoints, producing a [`ReplayLog`]. Replaying the
//! log restores the initial snapshot, re-feeds the frames in order, and
//! compares state hashes at each checkpoint.
//!
//! ```
//! use std::time::Duration;
//! use cloudrunner_engine::prelude::*;
//!
//! let config = EngineConfig::default();
//! let driver = FrameDriver::from_config(&config);
//! let mut engine = Engine::new(CommandRegistry::heist(), &config, RecordingSink::new());
//!
//! let mut recorder = ReplayRecorder::new(engine.capture_snapshot(), 4);
//! for frame in 0..20 {
//!     let mut input = FrameInput::idle(Duration::from_millis(50));
//!     if frame == 2 {
//!         input.lines.push("breach; inject &".to_owned());
//!     }
//!     recorder.record_frame(frame, &input, Some(engine.state_hash()));
//!     driver.step(&mut engine, &input);
//! }
//! let log = recorder.finish();
//!
//! let mut fresh = Engine::new(CommandRegistry::heist(), &config, RecordingSink::new());
//! let result = replay(&mut fresh, &driver, &log).unwrap();
//! assert!(result.completed);
//! assert!(result.first_divergence.is_none());
//! assert_eq!(fresh.state_hash(), engine.state_hash());
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::driver::{FrameDriver, FrameInput};
use crate::engine::Engine;
use crate::output::OutputSink;
use crate::snapshot::EngineSnapshot;

// ---------------------------------------------------------------------------
// ReplayLog
// ---------------------------------------------------------------------------

/// Initial snapshot plus the ordered frames and checkpoints that followed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayLog {
    /// State at the start of recording.
    pub initial_snapshot: EngineSnapshot,
    /// Number of frames recorded. Replay runs exactly this many.
    pub total_frames: u64,
    /// Frames and checkpoints, in recording order.
    pub entries: Vec<ReplayEntry>,
}

/// One entry of a [`ReplayLog`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReplayEntry {
    /// The input for a frame. Every recorded frame has one, since `dt`
    /// matters even when no line was typed.
    Frame {
        /// Frame number, counted from the start of recording.
        frame: u64,
        /// What was fed to the driver.
        input: FrameInput,
    },
    /// State hash taken before the frame ran.
    Checkpoint {
        /// Frame number.
        frame: u64,
        /// BLAKE3 hex digest.
        state_hash: String,
    },
}

/// Outcome of [`replay`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayResult {
    /// Whether every frame ran without a divergence.
    pub completed: bool,
    /// Frames executed.
    pub frames_replayed: u64,
    /// First checkpoint that did not match. `None` when deterministic.
    pub first_divergence: Option<ReplayDivergence>,
}

/// A checkpoint mismatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayDivergence {
    /// Frame at which the mismatch was found.
    pub frame: u64,
    /// Hash in the log.
    pub expected_hash: String,
    /// Hash computed during replay.
    pub actual_hash: String,
}

// ---------------------------------------------------------------------------
// ReplayRecorder
// ---------------------------------------------------------------------------

/// Builds a [`ReplayLog`] one frame at a time.
///
/// Frames must be recorded with strictly increasing numbers starting at 0
/// and without gaps.
pub struct ReplayRecorder {
    log: ReplayLog,
    checkpoint_interval: u64,
    next_frame: u64,
}

impl ReplayRecorder {
    /// Start recording from `snapshot`.
    ///
    /// `checkpoint_interval` of 10 checkpoints frames 0, 10, 20, and so on.
    /// 0 checkpoints every frame for which a hash is supplied.
    pub fn new(snapshot: EngineSnapshot, checkpoint_interval: u64) -> Self {
        Self {
            log: ReplayLog {
                initial_snapshot: snapshot,
                total_frames: 0,
                entries: Vec::new(),
            },
            checkpoint_interval,
            next_frame: 0,
        }
    }

    /// Record a frame. Call this **before** stepping the driver, with the
    /// state hash at that point.
    ///
    /// # Panics
    ///
    /// Panics if `frame` is not the next frame number in sequence.
    pub fn record_frame(&mut self, frame: u64, input: &FrameInput, state_hash: Option<String>) {
        assert_eq!(
            frame, self.next_frame,
            "ReplayRecorder::record_frame: expected frame {}, got {frame}",
            self.next_frame
        );
        self.next_frame += 1;

        if let Some(hash) = state_hash {
            let due = self.checkpoint_interval == 0 || frame % self.checkpoint_interval == 0;
            if due {
                self.log.entries.push(ReplayEntry::Checkpoint {
                    frame,
                    state_hash: hash,
                });
            }
        }
        self.log.entries.push(ReplayEntry::Frame {
            frame,
            input: input.clone(),
        });
    }

    /// Finish recording.
    pub fn finish(mut self) -> ReplayLog {
        self.log.total_frames = self.next_frame;
        self.log
    }
}

// ---------------------------------------------------------------------------
// replay()
// ---------------------------------------------------------------------------

/// Replay `log` on `engine` through `driver`, checking every checkpoint.
///
/// Stops at the first divergence and reports it.
///
/// # Errors
///
/// Fails if the log is malformed (duplicate entries, a frame without
/// input) or the initial snapshot does not restore. All validation happens
/// before the engine is touched.
pub fn replay<S: OutputSink>(
    engine: &mut Engine<S>,
    driver: &FrameDriver,
    log: &ReplayLog,
) -> Result<ReplayResult, anyhow::Error> {
    let mut frames: BTreeMap<u64, &FrameInput> = BTreeMap::new();
    let mut checkpoints: BTreeMap<u64, &str> = BTreeMap::new();

    for entry in &log.entries {
        match entry {
            ReplayEntry::Frame { frame, input } => {
                if frames.insert(*frame, input).is_some() {
                    return Err(anyhow::anyhow!(
                        "replay log contains duplicate Frame entry at frame {frame}"
                    ));
                }
            }
            ReplayEntry::Checkpoint { frame, state_hash } => {
                if checkpoints.insert(*frame, state_hash.as_str()).is_some() {
                    return Err(anyhow::anyhow!(
                        "replay log contains duplicate Checkpoint entry at frame {frame}"
                    ));
                }
            }
        }
    }
    if let Some(missing) = (0..log.total_frames).find(|f| !frames.contains_key(f)) {
        return Err(anyhow::anyhow!("replay log has no input for frame {missing}"));
    }

    engine
        .restore_from_snapshot(&log.initial_snapshot)
        .map_err(|e| anyhow::anyhow!("failed to restore initial snapshot for replay: {e}"))?;

    let mut frames_replayed = 0;
    for (&frame, input) in frames.range(..log.total_frames) {
        if let Some(&expected_hash) = checkpoints.get(&frame) {
            let actual_hash = engine.state_hash();
            if actual_hash != expected_hash {
                return Ok(ReplayResult {
                    completed: false,
                    frames_replayed,
                    first_divergence: Some(ReplayDivergence {
                        frame,
                        expected_hash: expected_hash.to_owned(),
                        actual_hash,
                    }),
                });
            }
        }
        driver.step(engine, input);
        frames_replayed += 1;
    }

    Ok(ReplayResult {
        completed: true,
        frames_replayed,
        first_divergence: None,
    })
}
