//! Engine-level snapshot and restore with BLAKE3 hashing.
//!
//! [`EngineSnapshot`] is a serializable copy of everything that affects how
//! the simulation evolves: the scheduler (virtual time and pending tasks),
//! the ledger, the cast gate, the job table, and the game state including its
//! RNG. A BLAKE3 hex digest of that state rides along for integrity checks
//! and determinism tests.
//!
//! ```
//! use std::time::Duration;
//! use cloudrunner_engine::prelude::*;
//!
//! let mut engine = Engine::new(CommandRegistry::heist(), &EngineConfig::default(), RecordingSink::new());
//! engine.execute_line("scan &");
//!
//! let snapshot = engine.capture_snapshot();
//! assert_eq!(snapshot.hash.len(), 64);
//!
//! engine.tick(Duration::from_secs(2));
//! assert!(engine.list_jobs().is_empty());
//!
//! engine.restore_from_snapshot(&snapshot).unwrap();
//! assert_eq!(engine.list_jobs().len(), 1);
//! assert_eq!(engine.state_hash(), snapshot.hash);
//! ```
//!
//! The command registry and the output sink are not part of the snapshot;
//! restoring keeps the engine's own.

use cloudrunner_sched::scheduler::Scheduler;
use serde::{Deserialize, Serialize};

use crate::engine::{Engine, PendingTask};
use crate::game::GameState;
use crate::gate::CastGate;
use crate::jobs::JobTable;
use crate::ledger::Ledger;
use crate::output::OutputSink;

// ---------------------------------------------------------------------------
// EngineSnapshot
// ---------------------------------------------------------------------------

/// A serializable snapshot of the engine's simulation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Virtual time and pending tasks.
    pub scheduler: Scheduler<PendingTask>,
    /// Resource gauges.
    pub ledger: Ledger,
    /// Global cooldown.
    pub gate: CastGate,
    /// Live jobs and the next job id.
    pub jobs: JobTable,
    /// Player, encounter, node map, and RNG.
    pub game: GameState,
    /// Background cast time multiplier.
    pub background_multiplier: u32,
    /// BLAKE3 hex digest of the fields above.
    pub hash: String,
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HashableState<'a> {
    scheduler: &'a Scheduler<PendingTask>,
    ledger: &'a Ledger,
    gate: &'a CastGate,
    jobs: &'a JobTable,
    game: &'a GameState,
    background_multiplier: u32,
}

fn compute_hash(state: &HashableState<'_>) -> String {
    let json_bytes =
        serde_json::to_vec(state).expect("engine state should always be JSON-serializable");
    blake3::hash(&json_bytes).to_hex().to_string()
}

impl EngineSnapshot {
    fn hashable(&self) -> HashableState<'_> {
        HashableState {
            scheduler: &self.scheduler,
            ledger: &self.ledger,
            gate: &self.gate,
            jobs: &self.jobs,
            game: &self.game,
            background_multiplier: self.background_multiplier,
        }
    }

    /// Recompute the digest and compare it with the recorded one.
    pub fn verify(&self) -> bool {
        compute_hash(&self.hashable()) == self.hash
    }
}

// ---------------------------------------------------------------------------
// Engine snapshot/restore methods
// ---------------------------------------------------------------------------

impl<S: OutputSink> Engine<S> {
    fn hashable(&self) -> HashableState<'_> {
        HashableState {
            scheduler: &self.scheduler,
            ledger: &self.ledger,
            gate: &self.gate,
            jobs: &self.jobs,
            game: &self.game,
            background_multiplier: self.background_multiplier,
        }
    }

    /// Capture the current simulation state.
    pub fn capture_snapshot(&self) -> EngineSnapshot {
        let hash = compute_hash(&self.hashable());
        EngineSnapshot {
            scheduler: self.scheduler.clone(),
            ledger: self.ledger.clone(),
            gate: self.gate,
            jobs: self.jobs.clone(),
            game: self.game.clone(),
            background_multiplier: self.background_multiplier,
            hash,
        }
    }

    /// BLAKE3 digest of the current state, without cloning it.
    pub fn state_hash(&self) -> String {
        compute_hash(&self.hashable())
    }

    /// Replace the simulation state with `snapshot`.
    ///
    /// # Errors
    ///
    /// Fails without touching the engine if the recorded hash does not match
    /// the snapshot's contents, if the snapshot could never fire a task, or if
    /// its node map is inconsistent.
    pub fn restore_from_snapshot(&mut self, snapshot: &EngineSnapshot) -> Result<(), anyhow::Error> {
        if snapshot.scheduler.fire_cap() == 0 {
            return Err(anyhow::anyhow!("snapshot has a zero fire cap"));
        }
        if snapshot.background_multiplier == 0 {
            return Err(anyhow::anyhow!("snapshot has a zero background multiplier"));
        }
        snapshot
            .game
            .map
            .validate()
            .map_err(|e| anyhow::anyhow!("snapshot map is invalid: {e}"))?;

        let expected_hash = compute_hash(&snapshot.hashable());
        if expected_hash != snapshot.hash {
            return Err(anyhow::anyhow!(
                "snapshot hash mismatch: recorded {} but recomputed {}. \
                 The snapshot may be corrupted or tampered with.",
                snapshot.hash,
                expected_hash
            ));
        }

        self.scheduler = snapshot.scheduler.clone();
        self.ledger = snapshot.ledger.clone();
        self.gate = snapshot.gate;
        self.jobs = snapshot.jobs.clone();
        self.game = snapshot.game.clone();
        self.background_multiplier = snapshot.background_multiplier;
        Ok(())
    }
}
