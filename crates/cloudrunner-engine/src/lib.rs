//! Cloudrunner Engine -- cast gating, resources, and background jobs on top
//! of a virtual-time scheduler.
//!
//! This crate builds on [`cloudrunner_sched`] to provide the command-execution
//! core of the game: a [`CommandRegistry`](registry::CommandRegistry) of cast
//! specs, a [`Ledger`](ledger::Ledger) of capped resources with atomic cost
//! commits, a global-cooldown [`CastGate`](gate::CastGate), and a
//! [`JobTable`](jobs::JobTable) of cancelable background casts. The
//! [`Engine`](engine::Engine) ties them together; a
//! [`FrameDriver`](driver::FrameDriver) advances it once per rendered frame.
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//! use cloudrunner_engine::prelude::*;
//!
//! let config = EngineConfig::default();
//! let mut engine = Engine::new(CommandRegistry::heist(), &config, RecordingSink::new());
//! let driver = FrameDriver::from_config(&config);
//!
//! engine.execute_line("scan &");
//! assert_eq!(engine.list_jobs().len(), 1);
//!
//! // A background scan takes 3 x 400 ms.
//! for _ in 0..24 {
//!     driver.frame(&mut engine, Duration::from_millis(50));
//! }
//! assert!(engine.list_jobs().is_empty());
//! assert!(engine.sink().has_line_containing("[job %1] done: scan"));
//! ```

#![deny(unsafe_code)]

use std::time::Duration;

pub mod config;
pub mod driver;
pub mod effect;
pub mod engine;
pub mod game;
pub mod gate;
pub mod jobs;
pub mod ledger;
pub mod map;
pub mod output;
pub mod registry;
pub mod replay;
pub mod shell;
pub mod snapshot;

mod millis;

/// Re-export the scheduler crate for convenience.
pub use cloudrunner_sched;

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Why an invocation or kill was rejected.
///
/// Every variant is recoverable; the engine writes the message to its sink
/// before returning it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// A foreground cast was attempted during the global cooldown.
    #[error("GCD active: {:.2}s", .remaining.as_secs_f64())]
    GateBlocked {
        /// Time until the gate reopens.
        remaining: Duration,
    },

    /// The cast's cost does not fit the ledger.
    #[error(transparent)]
    InsufficientResources(#[from] ledger::InsufficientResources),

    /// No command with this id is registered.
    #[error("unknown: {0}")]
    UnknownCommand(String),

    /// No live job with this id.
    #[error("no such job: %{0}")]
    UnknownJob(u64),

    /// The command's arguments did not parse.
    #[error("{command}: {reason}")]
    InvalidArgument {
        /// Command id.
        command: String,
        /// What was wrong.
        reason: String,
    },

    /// A map move was rejected.
    #[error(transparent)]
    Map(#[from] map::MapError),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use cloudrunner_sched::prelude::*;

    pub use crate::config::{ConfigError, EngineConfig, RegenRates, ResourceConfig};
    pub use crate::driver::{FrameDriver, FrameInput};
    pub use crate::effect::{Effect, EffectError, EffectKind, Payload};
    pub use crate::engine::{CastOutcome, Engine, Executed, HudView, PendingTask};
    pub use crate::game::{Enemy, GameState, Player};
    pub use crate::gate::CastGate;
    pub use crate::jobs::{Job, JobTable, JobView};
    pub use crate::ledger::{Cost, Gauge, InsufficientResources, Ledger, Resource};
    pub use crate::map::{MapError, Node, NodeKind, NodeMap, RouteChoice, RoutePolicy, WeakWindow};
    pub use crate::output::{OutputEvent, OutputSink, RecordingSink};
    pub use crate::registry::{CommandRegistry, CommandSpec, RegistryError};
    pub use crate::replay::{
        replay, ReplayDivergence, ReplayEntry, ReplayLog, ReplayRecorder, ReplayResult,
    };
    pub use crate::shell::{parse_line, CommandLine};
    pub use crate::snapshot::EngineSnapshot;
    pub use crate::EngineError;
}
