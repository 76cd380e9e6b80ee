//! Service discovery abstractions.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::watch;
use wirebridge_common::protocol::error::{BridgeError, Result};

/// One registered instance of a service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceInstance {
    pub id: String,
    pub name: String,
    pub version: String,
    /// Free-form attributes; `weight` feeds the node pool.
    pub metadata: HashMap<String, String>,
    /// Scheme-qualified endpoints, e.g. `tcp://10.0.0.1:9000`.
    pub endpoints: Vec<String>,
}

impl ServiceInstance {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoints.push(endpoint.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Stream of instance snapshots for one service.
#[async_trait]
pub trait Watcher: Send {
    /// Blocks until the next snapshot. The first call returns the current
    /// instances. After [`stop`](Self::stop), returns [`BridgeError::Canceled`].
    async fn next(&mut self) -> Result<Vec<ServiceInstance>>;

    /// Ends the subscription.
    async fn stop(&mut self) -> Result<()>;
}

/// Source of service instances.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn get_service(&self, name: &str) -> Result<Vec<ServiceInstance>>;

    async fn watch(&self, name: &str) -> Result<Box<dyn Watcher>>;
}

/// Process-local registry. Every change publishes the service's full
/// instance list to its watchers.
#[derive(Default)]
pub struct MemoryRegistry {
    services: Mutex<HashMap<String, watch::Sender<Vec<ServiceInstance>>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces (by id) an instance.
    pub fn register(&self, instance: ServiceInstance) {
        let mut services = self.services.lock();
        let sender = services
            .entry(instance.name.clone())
            .or_insert_with(|| watch::channel(Vec::new()).0);
        sender.send_modify(|instances| {
            match instances.iter_mut().find(|i| i.id == instance.id) {
                Some(existing) => *existing = instance,
                None => instances.push(instance),
            }
        });
    }

    /// Removes an instance by id. Returns `true` if it was registered.
    pub fn deregister(&self, instance: &ServiceInstance) -> bool {
        let services = self.services.lock();
        let Some(sender) = services.get(&instance.name) else {
            return false;
        };
        sender.send_if_modified(|instances| {
            let before = instances.len();
            instances.retain(|i| i.id != instance.id);
            before != instances.len()
        })
    }
}

#[async_trait]
impl Discovery for MemoryRegistry {
    async fn get_service(&self, name: &str) -> Result<Vec<ServiceInstance>> {
        self.services
            .lock()
            .get(name)
            .map(|sender| sender.borrow().clone())
            .ok_or_else(|| BridgeError::Registry(format!("service {} not found", name)))
    }

    async fn watch(&self, name: &str) -> Result<Box<dyn Watcher>> {
        let receiver = self
            .services
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| watch::channel(Vec::new()).0)
            .subscribe();
        Ok(Box::new(MemoryWatcher {
            receiver,
            first: true,
            stopped: false,
        }))
    }
}

struct MemoryWatcher {
    receiver: watch::Receiver<Vec<ServiceInstance>>,
    first: bool,
    stopped: bool,
}

#[async_trait]
impl Watcher for MemoryWatcher {
    async fn next(&mut self) -> Result<Vec<ServiceInstance>> {
        if self.stopped {
            return Err(BridgeError::Canceled);
        }
        if self.first {
            self.first = false;
            return Ok(self.receiver.borrow_and_update().clone());
        }
        self.receiver
            .changed()
            .await
            .map_err(|_| BridgeError::Canceled)?;
        Ok(self.receiver.borrow_and_update().clone())
    }

    async fn stop(&mut self) -> Result<()> {
        self.stopped = true;
        Ok(())
    }
}
