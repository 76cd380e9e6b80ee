use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpStream;
use wirebridge_common::protocol::error::{BridgeError, Result};
use wirebridge_common::transport::{read_packet, write_packet, Packet};

/// A checked-out connection.
///
/// Owned by exactly one call at a time. Dropping it closes the socket, which
/// is what happens to a call abandoned by timeout or cancellation; only
/// connections that completed a full round trip go back to the pool.
#[derive(Debug)]
pub struct PooledConnection {
    /// The TCP stream
    pub stream: TcpStream,
    /// The address this connection is to
    pub addr: String,
}

impl PooledConnection {
    /// Writes one request packet and reads the matching reply.
    pub async fn round_trip(&mut self, packet: &Packet) -> Result<Packet> {
        write_packet(&mut self.stream, packet).await?;
        read_packet(&mut self.stream)
            .await?
            .ok_or_else(|| BridgeError::Connection(format!("{} closed the connection", self.addr)))
    }
}

/// Connection pool configuration.
///
/// # Default Configuration
///
/// - `max_idle_per_node`: 10
/// - `connect_timeout_ms`: 5000 (5 seconds)
///
/// # Example
///
/// ```rust
/// use wirebridge_client::PoolConfig;
///
/// let config = PoolConfig {
///     max_idle_per_node: 4,
///     connect_timeout_ms: 1000,
/// };
/// assert_eq!(config.max_idle_per_node, 4);
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Idle connections kept per address; extra ones are closed on release
    pub max_idle_per_node: usize,
    /// Maximum time to establish a new connection in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_node: 10,
            connect_timeout_ms: 5000,
        }
    }
}

/// Pool of idle TCP connections grouped by node address.
///
/// Connections are reused LIFO. A connection that failed mid-call is never
/// released, so broken sockets drop out of the pool on their own.
pub struct ConnectionPool {
    config: PoolConfig,
    idle: Mutex<HashMap<String, Vec<TcpStream>>>,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            idle: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Takes an idle connection to `addr` or dials a new one.
    ///
    /// Idle connections the peer has closed in the meantime are discarded
    /// instead of being handed out.
    pub async fn acquire(&self, addr: &str) -> Result<PooledConnection> {
        while let Some(stream) = self.take_idle(addr) {
            if is_open(&stream) {
                return Ok(PooledConnection {
                    stream,
                    addr: addr.to_string(),
                });
            }
            tracing::debug!(addr, "discarding closed idle connection");
        }

        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(BridgeError::Connection(format!(
                    "failed to connect to {}: {}",
                    addr, e
                )))
            }
            Err(_) => {
                return Err(BridgeError::Connection(format!(
                    "connect to {} timed out after {}ms",
                    addr, self.config.connect_timeout_ms
                )))
            }
        };
        stream.set_nodelay(true)?;
        tracing::debug!(addr, "opened connection");

        Ok(PooledConnection {
            stream,
            addr: addr.to_string(),
        })
    }

    fn take_idle(&self, addr: &str) -> Option<TcpStream> {
        self.idle.lock().get_mut(addr).and_then(|conns| conns.pop())
    }

    /// Returns a healthy connection for reuse.
    pub fn release(&self, conn: PooledConnection) {
        let mut idle = self.idle.lock();
        let conns = idle.entry(conn.addr).or_default();
        if conns.len() < self.config.max_idle_per_node {
            conns.push(conn.stream);
        }
    }

    /// Number of idle connections held for `addr`.
    pub fn idle_count(&self, addr: &str) -> usize {
        self.idle.lock().get(addr).map(Vec::len).unwrap_or(0)
    }
}

/// An idle connection is usable only while reading from it would block: EOF
/// means the peer closed it, and unsolicited bytes leave it out of sync.
fn is_open(stream: &TcpStream) -> bool {
    let mut probe = [0u8; 1];
    match stream.try_read(&mut probe) {
        Err(e) => e.kind() == std::io::ErrorKind::WouldBlock,
        Ok(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    async fn accepting_listener() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();

        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(stream);
            }
        });
        (addr, accepted)
    }

    #[test]
    fn test_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.max_idle_per_node, 10);
        assert_eq!(config.connect_timeout_ms, 5000);
    }

    #[tokio::test]
    async fn test_acquire_unreachable_addr_fails() {
        let pool = ConnectionPool::new(PoolConfig::default());
        // bind then drop to get a port nobody listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let err = pool.acquire(&addr).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_released_connection_is_reused() {
        let (addr, accepted) = accepting_listener().await;
        let pool = ConnectionPool::new(PoolConfig::default());

        let conn = pool.acquire(&addr).await.unwrap();
        pool.release(conn);
        assert_eq!(pool.idle_count(&addr), 1);

        let _conn = pool.acquire(&addr).await.unwrap();
        assert_eq!(pool.idle_count(&addr), 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_connection_is_not_pooled() {
        let (addr, accepted) = accepting_listener().await;
        let pool = ConnectionPool::new(PoolConfig::default());

        drop(pool.acquire(&addr).await.unwrap());
        assert_eq!(pool.idle_count(&addr), 0);

        let _conn = pool.acquire(&addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_closed_idle_connection_is_replaced() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            // accept and hang up straight away, like a restarting peer
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(stream);
            }
        });

        let pool = ConnectionPool::new(PoolConfig::default());
        let conn = pool.acquire(&addr).await.unwrap();
        pool.release(conn);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let _conn = pool.acquire(&addr).await.unwrap();
        assert_eq!(pool.idle_count(&addr), 0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_idle_limit() {
        let (addr, _accepted) = accepting_listener().await;
        let pool = ConnectionPool::new(PoolConfig {
            max_idle_per_node: 1,
            connect_timeout_ms: 1000,
        });

        let first = pool.acquire(&addr).await.unwrap();
        let second = pool.acquire(&addr).await.unwrap();
        pool.release(first);
        pool.release(second);
        assert_eq!(pool.idle_count(&addr), 1);
    }
}
