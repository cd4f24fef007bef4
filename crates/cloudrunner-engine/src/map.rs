//! The node map the player moves across.
//!
//! A [`NodeMap`] is a small undirected graph of [`Node`]s plus a cursor on the
//! node currently under attack. Every node carries a periodic
//! [`WeakWindow`]; `route` recommends the neighbor to move to next by how soon
//! its window opens.
//!
//! ```
//! use std::time::Duration;
//! use cloudrunner_engine::map::{NodeMap, RoutePolicy};
//!
//! let mut map = NodeMap::demo();
//! assert_eq!(map.current().id, "node-a");
//!
//! let best = map.recommend(Duration::ZERO, RoutePolicy::Fast).unwrap();
//! assert_eq!(best.node_id, "node-c");
//!
//! map.connect("node-c").unwrap();
//! assert!(map.connect("node-e").is_err());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// MapError
// ---------------------------------------------------------------------------

/// Errors raised by map navigation and validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    /// No node with this id.
    #[error("no such node: {0}")]
    UnknownNode(String),

    /// The node exists but is not a neighbor of the current one.
    #[error("not adjacent: {from} -> {to}")]
    NotAdjacent {
        /// Current node id.
        from: String,
        /// Requested node id.
        to: String,
    },

    /// A node lists a neighbor that is not on the map.
    #[error("node {node} lists unknown neighbor {neighbor}")]
    DanglingNeighbor {
        /// Node holding the bad edge.
        node: String,
        /// Missing neighbor id.
        neighbor: String,
    },

    /// A node is stored under a key other than its own id.
    #[error("node {id} is stored under key {key}")]
    KeyMismatch {
        /// Map key.
        key: String,
        /// Node id.
        id: String,
    },

    /// A weak window with a zero period.
    #[error("node {0} has a zero weak_window period")]
    ZeroPeriod(String),
}

// ---------------------------------------------------------------------------
// WeakWindow
// ---------------------------------------------------------------------------

/// A periodic vulnerability interval.
///
/// Within each `period`, the window is open for `len` starting at offset
/// `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeakWindow {
    /// Offset of the opening within each period.
    #[serde(with = "crate::millis")]
    pub open: Duration,
    /// Cycle length. Must be positive.
    #[serde(with = "crate::millis")]
    pub period: Duration,
    /// How long the window stays open.
    #[serde(with = "crate::millis")]
    pub len: Duration,
}

impl WeakWindow {
    /// Build a window from millisecond values.
    pub fn from_millis(open: u64, period: u64, len: u64) -> Self {
        Self {
            open: Duration::from_millis(open),
            period: Duration::from_millis(period),
            len: Duration::from_millis(len),
        }
    }

    /// Whether the window is open at virtual time `t`.
    pub fn is_open(&self, t: Duration) -> bool {
        let period = self.period.as_millis();
        if period == 0 {
            return false;
        }
        let phase = t.as_millis() % period;
        let open = self.open.as_millis();
        phase >= open && phase < open + self.len.as_millis()
    }

    /// Whether an opening instant falls in `(from, to]`.
    pub fn opened_between(&self, from: Duration, to: Duration) -> bool {
        let period = self.period.as_millis();
        if period == 0 || to <= from {
            return false;
        }
        let open = self.open.as_millis();
        let from = from.as_millis();
        let next = if from < open {
            open
        } else {
            open + ((from - open) / period + 1) * period
        };
        next <= to.as_millis()
    }

    /// Time until the next opening at or after `t`; zero if one starts at `t`.
    pub fn wait_until_open(&self, t: Duration) -> Duration {
        let period = self.period.as_millis();
        if period == 0 {
            return Duration::ZERO;
        }
        let phase = t.as_millis() % period;
        let open = self.open.as_millis();
        let wait = if phase <= open {
            open - phase
        } else {
            period - phase + open
        };
        Duration::from_millis(u64::try_from(wait).unwrap_or(u64::MAX))
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// What kind of node the player is attacking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Plain node.
    Normal,
    /// Vault: wins inside the weak window pay a bonus.
    Vault,
    /// Shop node.
    Shop,
    /// Event node.
    Event,
    /// Rest node.
    Rest,
    /// Elite node.
    Elite,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Normal => "normal",
            NodeKind::Vault => "vault",
            NodeKind::Shop => "shop",
            NodeKind::Event => "event",
            NodeKind::Rest => "rest",
            NodeKind::Elite => "elite",
        })
    }
}

/// One node of the map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Stable node id (e.g. `node-b`).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Node kind.
    pub kind: NodeKind,
    /// Vulnerability schedule.
    pub weak_window: WeakWindow,
    /// Security tier, shown in map listings.
    pub tier: u32,
    /// Ids of directly reachable nodes.
    pub neighbors: Vec<String>,
}

impl Node {
    fn new(
        id: &str,
        name: &str,
        kind: NodeKind,
        weak_window: WeakWindow,
        tier: u32,
        neighbors: &[&str],
    ) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            kind,
            weak_window,
            tier,
            neighbors: neighbors.iter().map(|n| (*n).to_owned()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// How `route` ranks neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutePolicy {
    /// Prefer vaults, then the shortest wait.
    Profit,
    /// Shortest wait only.
    Fast,
}

impl RoutePolicy {
    /// Parse a `--policy` value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "profit" => Some(RoutePolicy::Profit),
            "fast" => Some(RoutePolicy::Fast),
            _ => None,
        }
    }

    fn score(self, node: &Node, wait: Duration) -> f64 {
        let wait_penalty = wait.as_secs_f64() / 10.0;
        match self {
            RoutePolicy::Profit => {
                let vault = if node.kind == NodeKind::Vault { 2.0 } else { 0.0 };
                vault - wait_penalty
            }
            RoutePolicy::Fast => -wait_penalty,
        }
    }
}

impl fmt::Display for RoutePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoutePolicy::Profit => "profit",
            RoutePolicy::Fast => "fast",
        })
    }
}

/// A recommended next hop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteChoice {
    /// Neighbor id.
    pub node_id: String,
    /// Neighbor display name.
    pub name: String,
    /// Time until the neighbor's weak window next opens.
    pub wait: Duration,
}

// ---------------------------------------------------------------------------
// NodeMap
// ---------------------------------------------------------------------------

/// Nodes keyed by id plus the node currently under attack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMap {
    nodes: BTreeMap<String, Node>,
    current: String,
}

impl Default for NodeMap {
    fn default() -> Self {
        Self::demo()
    }
}

impl NodeMap {
    /// Build and validate a map.
    pub fn new(
        nodes: impl IntoIterator<Item = Node>,
        current: impl Into<String>,
    ) -> Result<Self, MapError> {
        let map = Self {
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            current: current.into(),
        };
        map.validate()?;
        Ok(map)
    }

    /// The five-node map every run starts on.
    pub fn demo() -> Self {
        use NodeKind::{Elite, Normal, Rest, Shop, Vault};

        let nodes = [
            Node::new("node-a", "Entry", Normal, WeakWindow::from_millis(3_000, 12_000, 3_000), 1, &["node-b", "node-c"]),
            Node::new("node-b", "Vault-α", Vault, WeakWindow::from_millis(8_000, 16_000, 4_000), 2, &["node-a", "node-d"]),
            Node::new("node-c", "Shop", Shop, WeakWindow::from_millis(5_000, 15_000, 3_500), 1, &["node-a", "node-d"]),
            Node::new("node-d", "Rest", Rest, WeakWindow::from_millis(6_000, 18_000, 4_000), 1, &["node-b", "node-c", "node-e"]),
            Node::new("node-e", "Elite", Elite, WeakWindow::from_millis(9_000, 22_000, 5_000), 3, &["node-d"]),
        ];
        Self {
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            current: "node-a".to_owned(),
        }
    }

    /// Builder-style: move the cursor without an adjacency check.
    pub fn starting_at(mut self, node_id: &str) -> Result<Self, MapError> {
        if !self.nodes.contains_key(node_id) {
            return Err(MapError::UnknownNode(node_id.to_owned()));
        }
        self.current = node_id.to_owned();
        Ok(self)
    }

    /// Check ids, edges, periods, and the cursor.
    pub fn validate(&self) -> Result<(), MapError> {
        for (key, node) in &self.nodes {
            if *key != node.id {
                return Err(MapError::KeyMismatch {
                    key: key.clone(),
                    id: node.id.clone(),
                });
            }
            if node.weak_window.period.is_zero() {
                return Err(MapError::ZeroPeriod(node.id.clone()));
            }
            if let Some(missing) = node.neighbors.iter().find(|n| !self.nodes.contains_key(*n)) {
                return Err(MapError::DanglingNeighbor {
                    node: node.id.clone(),
                    neighbor: missing.clone(),
                });
            }
        }
        if !self.nodes.contains_key(&self.current) {
            return Err(MapError::UnknownNode(self.current.clone()));
        }
        Ok(())
    }

    /// The node under attack.
    ///
    /// # Panics
    ///
    /// Panics if the cursor names a missing node. [`NodeMap::validate`]
    /// rejects such maps.
    pub fn current(&self) -> &Node {
        &self.nodes[&self.current]
    }

    /// Look up a node.
    pub fn get(&self, node_id: &str) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Move to a neighbor of the current node.
    pub fn connect(&mut self, node_id: &str) -> Result<&Node, MapError> {
        if !self.nodes.contains_key(node_id) {
            return Err(MapError::UnknownNode(node_id.to_owned()));
        }
        if !self.current().neighbors.iter().any(|n| n == node_id) {
            return Err(MapError::NotAdjacent {
                from: self.current.clone(),
                to: node_id.to_owned(),
            });
        }
        self.current = node_id.to_owned();
        Ok(self.current())
    }

    /// Best neighbor of the current node at `now`. Ties go to the neighbor
    /// listed first. `None` when the current node has no neighbors.
    pub fn recommend(&self, now: Duration, policy: RoutePolicy) -> Option<RouteChoice> {
        let mut best: Option<(f64, &Node, Duration)> = None;
        for node in self.current().neighbors.iter().filter_map(|id| self.nodes.get(id)) {
            let wait = node.weak_window.wait_until_open(now);
            let score = policy.score(node, wait);
            if best.map_or(true, |(top, _, _)| score > top) {
                best = Some((score, node, wait));
            }
        }
        best.map(|(_, node, wait)| RouteChoice {
            node_id: node.id.clone(),
            name: node.name.clone(),
            wait,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
