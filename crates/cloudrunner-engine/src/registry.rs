//! Immutable command-spec registry.
//!
//! The registry is built once, explicitly, and handed to the
//! [`Engine`](crate::engine::Engine). There is no global command table: tests
//! construct synthetic registries and the game uses [`CommandRegistry::heist`].

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::effect::EffectKind;
use crate::ledger::{Cost, Resource};

/// Names handled by the engine itself; commands may not shadow them.
pub const BUILTIN_COMMANDS: [&str; 7] = ["help", "credits", "jobs", "kill", "connect", "route", "map"];

// ---------------------------------------------------------------------------
// RegistryError
// ---------------------------------------------------------------------------

/// Errors raised while building a [`CommandRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Two specs share an id.
    #[error("duplicate command id '{0}'")]
    Duplicate(String),

    /// A spec uses the name of a built-in command.
    #[error("command id '{0}' is reserved for a built-in")]
    Reserved(String),

    /// A spec has an empty or whitespace-containing id.
    #[error("invalid command id '{0}'")]
    InvalidId(String),

    /// A cost amount is NaN or infinite.
    #[error("command '{command}' has a non-finite {resource} cost")]
    NonFiniteCost {
        /// Command id.
        command: String,
        /// Offending resource.
        resource: Resource,
    },
}

// ---------------------------------------------------------------------------
// CommandSpec
// ---------------------------------------------------------------------------

/// Static description of one castable command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Command name as typed at the prompt.
    pub id: String,
    /// Foreground cast time. Background casts take a multiple of it.
    #[serde(with = "crate::millis")]
    pub cast: Duration,
    /// Global cooldown started by a foreground cast.
    #[serde(with = "crate::millis")]
    pub gcd: Duration,
    /// Resources charged at invocation.
    #[serde(default)]
    pub cost: Cost,
    /// What happens when the cast resolves.
    pub effect: EffectKind,
}

impl CommandSpec {
    /// A free, instant command with no cooldown.
    pub fn new(id: impl Into<String>, effect: EffectKind) -> Self {
        Self {
            id: id.into(),
            cast: Duration::ZERO,
            gcd: Duration::ZERO,
            cost: Cost::new(),
            effect,
        }
    }

    /// Builder-style: set the cast time in milliseconds.
    pub fn cast_ms(mut self, ms: u64) -> Self {
        self.cast = Duration::from_millis(ms);
        self
    }

    /// Builder-style: set the global cooldown in milliseconds.
    pub fn gcd_ms(mut self, ms: u64) -> Self {
        self.gcd = Duration::from_millis(ms);
        self
    }

    /// Builder-style: set the cost.
    pub fn cost(mut self, cost: Cost) -> Self {
        self.cost = cost;
        self
    }
}

// ---------------------------------------------------------------------------
// CommandRegistry
// ---------------------------------------------------------------------------

/// Read-only table of command specs keyed by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandRegistry {
    specs: BTreeMap<String, CommandSpec>,
}

impl CommandRegistry {
    /// Build a registry, rejecting duplicate, reserved, or malformed ids and
    /// non-finite costs.
    pub fn new(specs: impl IntoIterator<Item = CommandSpec>) -> Result<Self, RegistryError> {
        let mut map = BTreeMap::new();
        for spec in specs {
            if let Some((resource, _)) = spec.cost.iter().find(|(_, amount)| !amount.is_finite()) {
                return Err(RegistryError::NonFiniteCost {
                    command: spec.id,
                    resource,
                });
            }
            if spec.id.is_empty() || spec.id.chars().any(char::is_whitespace) {
                return Err(RegistryError::InvalidId(spec.id));
            }
            if BUILTIN_COMMANDS.contains(&spec.id.as_str()) {
                return Err(RegistryError::Reserved(spec.id));
            }
            if map.contains_key(&spec.id) {
                return Err(RegistryError::Duplicate(spec.id));
            }
            map.insert(spec.id.clone(), spec);
        }
        Ok(Self { specs: map })
    }

    /// The game's combat command set.
    pub fn heist() -> Self {
        use Resource::{Cpu, Heat, Net, Power};

        let specs = [
            CommandSpec::new("breach", EffectKind::Breach).gcd_ms(600),
            CommandSpec::new("scan", EffectKind::Scan)
                .cast_ms(400)
                .gcd_ms(600)
                .cost(Cost::new().with(Cpu, 1.0).with(Net, 1.0)),
            CommandSpec::new("inject", EffectKind::Inject)
                .cast_ms(600)
                .gcd_ms(600)
                .cost(Cost::new().with(Cpu, 2.0).with(Net, 2.0).with(Heat, 2.0)),
            CommandSpec::new("firewall", EffectKind::Firewall)
                .cast_ms(300)
                .gcd_ms(600)
                .cost(Cost::new().with(Power, 2.0)),
            CommandSpec::new("lag", EffectKind::Lag)
                .cast_ms(300)
                .gcd_ms(600)
                .cost(Cost::new().with(Cpu, 1.0).with(Net, 1.0)),
            CommandSpec::new("overclock", EffectKind::Overclock)
                .gcd_ms(300)
                .cost(Cost::new().with(Power, 2.0).with(Heat, 6.0)),
            CommandSpec::new("cool", EffectKind::Cool)
                .gcd_ms(300)
                .cost(Cost::new().with(Power, 3.0).with(Heat, -8.0)),
        ];

        let mut map = BTreeMap::new();
        for spec in specs {
            map.insert(spec.id.clone(), spec);
        }
        Self { specs: map }
    }

    /// Look up a spec.
    pub fn get(&self, id: &str) -> Option<&CommandSpec> {
        self.specs.get(id)
    }

    /// Command ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
