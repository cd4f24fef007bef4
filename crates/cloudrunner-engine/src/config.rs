//! Engine configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```
//! use cloudrunner_engine::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{ "fire_cap": 8, "seed": 42 }"#).unwrap();
//! assert_eq!(config.fire_cap, 8);
//! assert_eq!(config.background_multiplier, 3);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use cloudrunner_sched::scheduler::DEFAULT_FIRE_CAP;
use serde::{Deserialize, Serialize};

use crate::map::{MapError, NodeMap};
use crate::ledger::{Gauge, Ledger, Resource};

/// Seed used when a config does not name one.
pub const DEFAULT_SEED: u64 = 0x00C1_0D5E_ED00;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating an [`EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The JSON did not match the config schema.
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),

    /// The node map is inconsistent.
    #[error("invalid map: {0}")]
    Map(#[from] MapError),
}

// ---------------------------------------------------------------------------
// ResourceConfig / RegenRates
// ---------------------------------------------------------------------------

/// Starting value and cap for each gauge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Processor time. Most casts spend it.
    pub cpu: Gauge,
    /// Memory held by payloads.
    pub mem: Gauge,
    /// Bandwidth, spent by network-heavy commands.
    pub net: Gauge,
    /// Battery. Drains slowly while the rig runs.
    pub power: Gauge,
    /// Heat. Starts empty and dissipates over time.
    pub heat: Gauge,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        let ledger = Ledger::default();
        Self {
            cpu: ledger.gauge(Resource::Cpu),
            mem: ledger.gauge(Resource::Mem),
            net: ledger.gauge(Resource::Net),
            power: ledger.gauge(Resource::Power),
            heat: ledger.gauge(Resource::Heat),
        }
    }
}

impl ResourceConfig {
    /// The gauge configured for `resource`.
    pub fn gauge(&self, resource: Resource) -> Gauge {
        match resource {
            Resource::Cpu => self.cpu,
            Resource::Mem => self.mem,
            Resource::Net => self.net,
            Resource::Power => self.power,
            Resource::Heat => self.heat,
        }
    }

    /// A ledger holding these gauges.
    pub fn to_ledger(&self) -> Ledger {
        Ledger::from_gauges(Resource::ALL.map(|r| self.gauge(r)))
    }
}

/// Regeneration (positive) or decay (negative) per second of virtual time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegenRates {
    /// CPU units per second.
    pub cpu: f64,
    /// MEM units per second.
    pub mem: f64,
    /// NET units per second.
    pub net: f64,
    /// POWER units per second. Negative drains the battery.
    pub power: f64,
    /// HEAT units per second. Negative cools the rig.
    pub heat: f64,
}

impl Default for RegenRates {
    /// The browser build drifts each gauge by a fixed amount per animation
    /// frame; at 60 fps that is the rates below.
    fn default() -> Self {
        Self {
            cpu: 1.2,
            mem: 0.6,
            net: 1.2,
            power: 1.8,
            heat: -1.2,
        }
    }
}

impl RegenRates {
    /// Per-second rate for `resource`.
    pub fn rate(&self, resource: Resource) -> f64 {
        match resource {
            Resource::Cpu => self.cpu,
            Resource::Mem => self.mem,
            Resource::Net => self.net,
            Resource::Power => self.power,
            Resource::Heat => self.heat,
        }
    }

    /// No drift at all.
    pub fn none() -> Self {
        Self {
            cpu: 0.0,
            mem: 0.0,
            net: 0.0,
            power: 0.0,
            heat: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Tunables for an [`Engine`](crate::engine::Engine) and its
/// [`FrameDriver`](crate::driver::FrameDriver).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Most tasks fired per `tick`.
    pub fire_cap: usize,
    /// Background casts take this many times the foreground cast time.
    pub background_multiplier: u32,
    /// Upper bound on a single frame's `dt`.
    #[serde(rename = "max_frame_dt_ms", with = "crate::millis")]
    pub max_frame_dt: Duration,
    /// RNG seed for game rolls.
    pub seed: u64,
    /// Starting gauges.
    pub resources: ResourceConfig,
    /// Per-second drift applied by the frame driver.
    pub regen: RegenRates,
    /// Nodes the player can move between, with the starting node.
    pub map: NodeMap,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fire_cap: DEFAULT_FIRE_CAP,
            background_multiplier: 3,
            max_frame_dt: Duration::from_millis(50),
            seed: DEFAULT_SEED,
            resources: ResourceConfig::default(),
            regen: RegenRates::default(),
            map: NodeMap::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Check ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fire_cap == 0 {
            return Err(ConfigError::Invalid("fire_cap must be positive".to_owned()));
        }
        if self.background_multiplier == 0 {
            return Err(ConfigError::Invalid(
                "background_multiplier must be at least 1".to_owned(),
            ));
        }
        if self.max_frame_dt.is_zero() {
            return Err(ConfigError::Invalid(
                "max_frame_dt_ms must be positive".to_owned(),
            ));
        }
        for resource in Resource::ALL {
            let gauge = self.resources.gauge(resource);
            if !(gauge.cap.is_finite() && gauge.cap >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{resource} cap must be finite and non-negative, got {}",
                    gauge.cap
                )));
            }
            if !(gauge.value.is_finite() && (0.0..=gauge.cap).contains(&gauge.value)) {
                return Err(ConfigError::Invalid(format!(
                    "{resource} value {} is outside [0, {}]",
                    gauge.value, gauge.cap
                )));
            }
            if !self.regen.rate(resource).is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "{resource} regen rate must be finite"
                )));
            }
        }
        self.map.validate()?;
        Ok(())
    }
}
