use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::collections::HashMap;
use wirebridge_common::protocol::error::{BridgeError, Result};
use wirebridge_common::selector::{default_balancer, Balancer, Node, NodeFilter};

/// Live, weighted set of nodes fed by discovery.
///
/// One writer (the discovery task) upserts; any number of calling tasks
/// resolve concurrently.
pub trait NodePool: Send + Sync {
    /// Adds the node behind `key` (`namespace/service/address`) or updates its weight.
    fn upsert(&self, key: &str, weight: u32);

    /// Picks one node of `service` (`namespace/service`) after applying `filters`.
    fn resolve(&self, service: &str, filters: &[NodeFilter]) -> Result<Node>;
}

struct Entry {
    node: Node,
    current: i64,
}

/// Weighted node pool keyed by `namespace/service`.
pub struct WeightedPool {
    balancer: Balancer,
    services: RwLock<HashMap<String, Mutex<Vec<Entry>>>>,
}

impl WeightedPool {
    /// Pool using the process-wide default balancer.
    pub fn new() -> Self {
        Self::with_balancer(default_balancer())
    }

    pub fn with_balancer(balancer: Balancer) -> Self {
        Self {
            balancer,
            services: RwLock::new(HashMap::new()),
        }
    }

    pub fn balancer(&self) -> Balancer {
        self.balancer
    }

    /// Removes one node. Returns `true` if it was present.
    pub fn remove(&self, key: &str) -> bool {
        let Some(node) = Node::from_key(key, 0) else {
            return false;
        };
        let mut services = self.services.write();
        let Some(entries) = services.get(&node.service) else {
            return false;
        };
        let removed = {
            let mut entries = entries.lock();
            let before = entries.len();
            entries.retain(|e| e.node.key != key);
            before != entries.len()
        };
        let now_empty = entries.lock().is_empty();
        if now_empty {
            services.remove(&node.service);
        }
        removed
    }

    /// Snapshot of the nodes registered for `service`.
    pub fn nodes(&self, service: &str) -> Vec<Node> {
        self.services
            .read()
            .get(service)
            .map(|entries| entries.lock().iter().map(|e| e.node.clone()).collect())
            .unwrap_or_default()
    }

    pub fn node_count(&self) -> usize {
        self.services
            .read()
            .values()
            .map(|entries| entries.lock().len())
            .sum()
    }
}

impl Default for WeightedPool {
    fn default() -> Self {
        Self::new()
    }
}

impl NodePool for WeightedPool {
    fn upsert(&self, key: &str, weight: u32) {
        let Some(node) = Node::from_key(key, weight) else {
            tracing::warn!(key, "ignoring malformed node key");
            return;
        };

        let mut services = self.services.write();
        let mut entries = services
            .entry(node.service.clone())
            .or_insert_with(|| Mutex::new(Vec::new()))
            .lock();

        match entries.iter_mut().find(|e| e.node.key == node.key) {
            Some(entry) => entry.node.weight = weight,
            None => {
                tracing::debug!(key, weight, "node added to pool");
                entries.push(Entry { node, current: 0 });
            }
        }
    }

    fn resolve(&self, service: &str, filters: &[NodeFilter]) -> Result<Node> {
        let services = self.services.read();
        let entries = services
            .get(service)
            .ok_or_else(|| BridgeError::Resolve(format!("no nodes available for {}", service)))?;
        let mut entries = entries.lock();

        let mut candidates: Vec<Node> = entries.iter().map(|e| e.node.clone()).collect();
        for filter in filters {
            candidates = filter(candidates);
        }
        if candidates.is_empty() {
            return Err(BridgeError::Resolve(format!(
                "no nodes left for {} after filtering",
                service
            )));
        }

        let mut eligible: Vec<&mut Entry> = entries
            .iter_mut()
            .filter(|e| candidates.iter().any(|c| c.key == e.node.key))
            .collect();

        let picked = match self.balancer {
            Balancer::WeightedRoundRobin => pick_smooth(&mut eligible),
            Balancer::WeightedRandom => pick_random(&eligible),
        };
        Ok(eligible[picked].node.clone())
    }
}

/// Zero weights everywhere degrade to equal weights so the service stays reachable.
fn effective_weights(entries: &[&mut Entry]) -> Vec<i64> {
    let weights: Vec<i64> = entries.iter().map(|e| i64::from(e.node.weight)).collect();
    if weights.iter().all(|w| *w == 0) {
        vec![1; weights.len()]
    } else {
        weights
    }
}

// nginx-style smooth weighted round robin
fn pick_smooth(entries: &mut [&mut Entry]) -> usize {
    let weights = effective_weights(entries);
    let total: i64 = weights.iter().sum();

    let mut best = 0;
    let mut best_current = i64::MIN;
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.current += weights[i];
        if entry.current > best_current {
            best_current = entry.current;
            best = i;
        }
    }
    entries[best].current -= total;
    best
}

fn pick_random(entries: &[&mut Entry]) -> usize {
    let weights = effective_weights(entries);
    let total: i64 = weights.iter().sum();
    let mut point = rand::rng().random_range(0..total);
    for (i, weight) in weights.iter().enumerate() {
        if point < *weight {
            return i;
        }
        point -= weight;
    }
    entries.len() - 1
}
