//! Game-side state mutated by command effects.
//!
//! Effects need a place to land: the player's shield and credits, the ICE
//! enemy of the current encounter, the [`NodeMap`] with the node under
//! attack, and a seeded RNG. Rendering lives in the host.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::map::{Node, NodeMap};

/// Highest shield value a firewall can build up.
pub const SHIELD_CAP: u32 = 30;

// ---------------------------------------------------------------------------
// Player / Enemy
// ---------------------------------------------------------------------------

/// The player's run state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Hit points.
    pub hp: u32,
    /// Damage absorption, capped at [`SHIELD_CAP`].
    pub shield: u32,
    /// Credits earned this run.
    pub credits: u64,
    /// Detection level, 0–100.
    pub trace: u32,
}

impl Default for Player {
    fn default() -> Self {
        Self {
            hp: 30,
            shield: 0,
            credits: 0,
            trace: 0,
        }
    }
}

/// The ICE defending the current target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enemy {
    /// Display name.
    pub name: String,
    /// Remaining hit points. May go negative on the killing blow.
    pub hp: i64,
}

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

/// Everything command effects read or write besides the resource ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    /// The player.
    pub player: Player,
    /// The active encounter, if any.
    pub enemy: Option<Enemy>,
    /// Nodes and the one under attack.
    pub map: NodeMap,
    rng: Pcg32,
}

impl GameState {
    /// Fresh run state with the given RNG seed and map.
    pub fn new(seed: u64, map: NodeMap) -> Self {
        Self {
            player: Player::default(),
            enemy: None,
            map,
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    /// The node under attack.
    pub fn target(&self) -> &Node {
        self.map.current()
    }

    /// Draw a uniform integer in `[0, upper)`.
    pub(crate) fn roll(&mut self, upper: u32) -> u32 {
        self.rng.gen_range(0..upper)
    }
}
