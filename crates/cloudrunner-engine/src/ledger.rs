//! Resource ledger with all-or-nothing cost commits.
//!
//! Five gauges are tracked. `cpu`, `mem`, `net` and `power` are *budget*
//! resources: a cast cost subtracts from them. `heat` is a *waste* resource:
//! a cast cost adds to it. Every gauge stays within `[0, cap]`.
//!
//! [`Ledger::try_consume`] is the only path by which cast costs touch the
//! gauges. It stages every delta first and commits only when none of them
//! would overdraw a budget gauge or overflow the waste gauge. Regeneration and
//! decay go through [`Ledger::drift`], which clamps instead of validating.
//!
//! # Example
//!
//! ```
//! use cloudrunner_engine::ledger::{Cost, Ledger, Resource};
//!
//! let mut ledger = Ledger::default();
//! let inject = Cost::new().with(Resource::Cpu, 2.0).with(Resource::Heat, 2.0);
//!
//! ledger.try_consume(&inject).unwrap();
//! assert_eq!(ledger.value(Resource::Cpu), 4.0);
//! assert_eq!(ledger.value(Resource::Heat), 2.0);
//!
//! let too_hot = Cost::new().with(Resource::Heat, 99.0);
//! assert!(ledger.try_consume(&too_hot).is_err());
//! assert_eq!(ledger.value(Resource::Heat), 2.0);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

/// One of the five tracked quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    /// Processing budget.
    Cpu,
    /// Memory budget.
    Mem,
    /// Bandwidth budget.
    Net,
    /// Power budget.
    Power,
    /// Accumulated waste heat.
    Heat,
}

impl Resource {
    /// All resources in ledger order.
    pub const ALL: [Resource; 5] = [
        Resource::Cpu,
        Resource::Mem,
        Resource::Net,
        Resource::Power,
        Resource::Heat,
    ];

    /// Lowercase display name.
    pub fn name(self) -> &'static str {
        match self {
            Resource::Cpu => "cpu",
            Resource::Mem => "mem",
            Resource::Net => "net",
            Resource::Power => "power",
            Resource::Heat => "heat",
        }
    }

    /// Whether a cost *adds* to this resource instead of subtracting.
    pub fn is_waste(self) -> bool {
        matches!(self, Resource::Heat)
    }

    fn index(self) -> usize {
        match self {
            Resource::Cpu => 0,
            Resource::Mem => 1,
            Resource::Net => 2,
            Resource::Power => 3,
            Resource::Heat => 4,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Cost
// ---------------------------------------------------------------------------

/// Partial mapping from resource to a signed amount.
///
/// Positive amounts spend budget or generate heat. Negative amounts are
/// refunds: they raise a budget gauge or vent heat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cost(BTreeMap<Resource, f64>);

impl Cost {
    /// An empty cost. Consuming it always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style: set the amount for `resource`.
    pub fn with(mut self, resource: Resource, amount: f64) -> Self {
        self.0.insert(resource, amount);
        self
    }

    /// Amount charged for `resource`, if any.
    pub fn get(&self, resource: Resource) -> Option<f64> {
        self.0.get(&resource).copied()
    }

    /// Iterate `(resource, amount)` entries in ledger order.
    pub fn iter(&self) -> impl Iterator<Item = (Resource, f64)> + '_ {
        self.0.iter().map(|(r, a)| (*r, *a))
    }

    /// Whether the cost touches no resource.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Resource, f64)> for Cost {
    fn from_iter<I: IntoIterator<Item = (Resource, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Gauge
// ---------------------------------------------------------------------------

/// A capped quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gauge {
    /// Current amount, within `[0, cap]`.
    pub value: f64,
    /// Upper bound.
    pub cap: f64,
}

impl Gauge {
    /// Create a gauge, clamping `value` into `[0, cap]`.
    pub fn new(value: f64, cap: f64) -> Self {
        let cap = cap.max(0.0);
        Self {
            value: value.clamp(0.0, cap),
            cap,
        }
    }

    /// A gauge filled to its cap.
    pub fn full(cap: f64) -> Self {
        Self::new(cap, cap)
    }

    /// A gauge at zero.
    pub fn empty(cap: f64) -> Self {
        Self::new(0.0, cap)
    }

    /// Fill level as a percentage, for HUD bars. Zero-capacity gauges read 0.
    pub fn percent(&self) -> f64 {
        if self.cap > 0.0 {
            (self.value / self.cap * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        }
    }
}

// ---------------------------------------------------------------------------
// InsufficientResources
// ---------------------------------------------------------------------------

/// A cost was rejected because it would push at least one gauge out of range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("insufficient resources: {}", list_resources(.resources))]
pub struct InsufficientResources {
    /// Every resource whose resulting value would have been out of range.
    pub resources: Vec<Resource>,
}

fn list_resources(resources: &[Resource]) -> String {
    resources
        .iter()
        .map(|r| r.name())
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// The five resource gauges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    gauges: [Gauge; 5],
}

impl Default for Ledger {
    /// The starting rig: cpu 6/6, mem 8/8, net 6/6, power 8/8, heat 0/100.
    fn default() -> Self {
        Self::from_gauges([
            Gauge::full(6.0),
            Gauge::full(8.0),
            Gauge::full(6.0),
            Gauge::full(8.0),
            Gauge::empty(100.0),
        ])
    }
}

impl Ledger {
    /// Build a ledger from gauges in [`Resource::ALL`] order.
    pub fn from_gauges(gauges: [Gauge; 5]) -> Self {
        Self { gauges }
    }

    /// Builder-style: replace one gauge.
    pub fn with(mut self, resource: Resource, gauge: Gauge) -> Self {
        self.gauges[resource.index()] = gauge;
        self
    }

    /// The gauge for `resource`.
    pub fn gauge(&self, resource: Resource) -> Gauge {
        self.gauges[resource.index()]
    }

    /// Current value of `resource`.
    pub fn value(&self, resource: Resource) -> f64 {
        self.gauge(resource).value
    }

    /// Iterate `(resource, gauge)` pairs in ledger order.
    pub fn iter(&self) -> impl Iterator<Item = (Resource, Gauge)> + '_ {
        Resource::ALL.into_iter().map(|r| (r, self.gauge(r)))
    }

    /// Atomically apply a cast cost.
    ///
    /// Budget resources subtract the amount; the waste resource adds it. If
    /// any budget result would drop below zero, or the waste result would
    /// exceed its cap, nothing is changed and every offending resource is
    /// reported. Refund results past the opposite bound are clamped.
    pub fn try_consume(&mut self, cost: &Cost) -> Result<(), InsufficientResources> {
        let mut staged = self.gauges;
        let mut short = Vec::new();

        for (resource, amount) in cost.iter() {
            let gauge = &mut staged[resource.index()];
            let next = if resource.is_waste() {
                gauge.value + amount
            } else {
                gauge.value - amount
            };
            let out_of_range = if resource.is_waste() {
                next > gauge.cap
            } else {
                next < 0.0
            };
            if out_of_range {
                short.push(resource);
            } else {
                gauge.value = next.clamp(0.0, gauge.cap);
            }
        }

        if !short.is_empty() {
            return Err(InsufficientResources { resources: short });
        }
        self.gauges = staged;
        Ok(())
    }

    /// Shift `resource` by `delta`, clamped to `[0, cap]`.
    ///
    /// This is the regeneration/decay path used by the frame driver. It is
    /// never rejected.
    pub fn drift(&mut self, resource: Resource, delta: f64) {
        let gauge = &mut self.gauges[resource.index()];
        gauge.value = (gauge.value + delta).clamp(0.0, gauge.cap);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
