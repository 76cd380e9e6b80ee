//! Node selection vocabulary shared by the client, its interceptors and the
//! node pool.

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Weight assigned to a node whose registry metadata has no usable `weight`.
pub const DEFAULT_WEIGHT: u32 = 10;

/// A selectable service node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    /// Unique pool key: `namespace/service/address`.
    pub key: String,
    /// `namespace/service`, the part of the key a client resolves against.
    pub service: String,
    /// `host:port` to connect to.
    pub address: String,
    pub weight: u32,
}

impl Node {
    /// Builds a node from a pool key of the form `namespace/service/address`.
    ///
    /// Returns `None` when the key has no `/` separating the address.
    pub fn from_key(key: &str, weight: u32) -> Option<Self> {
        let (service, address) = key.rsplit_once('/')?;
        if service.is_empty() || address.is_empty() {
            return None;
        }
        Some(Self {
            key: key.to_string(),
            service: service.to_string(),
            address: address.to_string(),
            weight,
        })
    }
}

/// Narrows the candidate list before weighted selection.
pub type NodeFilter = Arc<dyn Fn(Vec<Node>) -> Vec<Node> + Send + Sync>;

/// Records which node served a call.
///
/// The client fills the slot after resolution; interceptors can read it once
/// the inner handler returns, or pre-set it for routing decisions.
#[derive(Clone, Default)]
pub struct PeerSlot {
    inner: Arc<Mutex<Option<Node>>>,
}

impl PeerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, node: Node) {
        *self.inner.lock() = Some(node);
    }

    pub fn node(&self) -> Option<Node> {
        self.inner.lock().clone()
    }
}

impl fmt::Debug for PeerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSlot").field("node", &self.node()).finish()
    }
}

/// Weighted selection strategy used by node pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Balancer {
    /// Smooth weighted round robin: deterministic, evenly interleaved picks.
    #[default]
    WeightedRoundRobin,
    /// Independent random pick with probability proportional to weight.
    WeightedRandom,
}

static DEFAULT_BALANCER: OnceLock<Balancer> = OnceLock::new();

/// Sets the process-wide default balancer. First call wins; returns `true`
/// when this call installed `balancer`.
pub fn set_default_balancer(balancer: Balancer) -> bool {
    DEFAULT_BALANCER.set(balancer).is_ok()
}

pub fn default_balancer() -> Balancer {
    *DEFAULT_BALANCER.get_or_init(Balancer::default)
}
