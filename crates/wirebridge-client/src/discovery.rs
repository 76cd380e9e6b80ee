//! Keeps a [`NodePool`] in sync with a discovery [`Watcher`].
//!
//! A background task pulls snapshots from the watcher and upserts every
//! instance into the pool. Watch failures are logged and retried after a
//! fixed backoff; cancellation ends the task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use wirebridge_common::protocol::error::BridgeError;
use wirebridge_common::selector::DEFAULT_WEIGHT;

use crate::node_pool::NodePool;
use crate::registry::{ServiceInstance, Watcher};

/// Pause between a failed watch and the next attempt.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Settings for one discovery session.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// First segment of every pool key.
    pub namespace: String,
    /// Endpoint scheme this client dials.
    pub scheme: String,
    pub backoff: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            scheme: "tcp".to_string(),
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// A running watch loop.
///
/// Dropping the session cancels the loop without waiting for it; use
/// [`close`](Self::close) to wait until the watcher has been stopped.
pub struct DiscoverySession {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl DiscoverySession {
    /// Spawns the watch loop on the current runtime.
    pub fn spawn(watcher: Box<dyn Watcher>, pool: Arc<dyn NodePool>, config: WatchConfig) -> Self {
        let token = CancellationToken::new();
        let handle = tokio::spawn(watch_loop(watcher, pool, config, token.clone()));
        Self {
            token,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancels the loop and waits for it to stop the watcher.
    pub async fn close(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "discovery task failed");
            }
        }
    }
}

impl Drop for DiscoverySession {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn watch_loop(
    mut watcher: Box<dyn Watcher>,
    pool: Arc<dyn NodePool>,
    config: WatchConfig,
    token: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            next = watcher.next() => next,
        };

        match next {
            Ok(instances) => {
                let applied = update(&instances, pool.as_ref(), &config);
                debug!(instances = instances.len(), applied, "discovery snapshot applied");
            }
            Err(BridgeError::Canceled) => break,
            Err(e) => {
                error!(error = %e, "failed to watch discovery endpoint");
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(config.backoff) => {}
                }
            }
        }
    }

    if let Err(e) = watcher.stop().await {
        error!(error = %e, "failed to stop discovery watcher");
    }
    info!(namespace = %config.namespace, "discovery watch stopped");
}

/// Upserts every instance that has an endpoint for `config.scheme`.
///
/// Returns the number of nodes upserted. Nodes missing from the snapshot are
/// left in the pool.
pub fn update(instances: &[ServiceInstance], pool: &dyn NodePool, config: &WatchConfig) -> usize {
    let mut applied = 0;
    for instance in instances {
        let Some(address) = parse_endpoint(&instance.endpoints, &config.scheme) else {
            continue;
        };
        let key = format!("{}/{}/{}", config.namespace, instance.name, address);
        pool.upsert(&key, instance_weight(&instance.metadata));
        applied += 1;
    }
    applied
}

/// Weight from the `weight` metadata entry, or [`DEFAULT_WEIGHT`] when it is
/// absent or not a non-negative integer.
pub fn instance_weight(metadata: &HashMap<String, String>) -> u32 {
    metadata
        .get("weight")
        .and_then(|w| w.trim().parse::<u32>().ok())
        .unwrap_or(DEFAULT_WEIGHT)
}

/// First `scheme://host:port` endpoint, returned as `host:port`.
pub fn parse_endpoint(endpoints: &[String], scheme: &str) -> Option<String> {
    endpoints.iter().find_map(|endpoint| {
        let (s, rest) = endpoint.split_once("://")?;
        let address = rest.split(['/', '?']).next()?;
        (s.eq_ignore_ascii_case(scheme) && !address.is_empty()).then(|| address.to_string())
    })
}
