//! wirebridge client
//!
//! [`Client`] sends calls through an interceptor chain to either a fixed
//! endpoint or a service resolved through [`Discovery`]. Discovered nodes live
//! in a weighted [`NodePool`] kept current by a background
//! [`DiscoverySession`].

pub mod client;
pub mod discovery;
pub mod node_pool;
pub mod pool;
pub mod registry;

pub use client::{Client, ClientOptions, DEFAULT_TIMEOUT, DISCOVERY_SCHEME};
pub use discovery::{DiscoverySession, WatchConfig, DEFAULT_BACKOFF};
pub use node_pool::{NodePool, WeightedPool};
pub use pool::{ConnectionPool, PoolConfig, PooledConnection};
pub use registry::{Discovery, MemoryRegistry, ServiceInstance, Watcher};
