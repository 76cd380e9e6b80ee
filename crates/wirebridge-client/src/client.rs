use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use wirebridge_common::context::Context;
use wirebridge_common::middleware::{as_error, chain, handler_fn, into_reply, Message, Middleware};
use wirebridge_common::protocol::error::{BridgeError, Result};
use wirebridge_common::protocol::{Envelope, HeaderCarrier};
use wirebridge_common::selector::{Balancer, Node, NodeFilter, PeerSlot, DEFAULT_WEIGHT};
use wirebridge_common::transport::{default_codec, Codec, Packet, Transport};

use crate::discovery::{DiscoverySession, WatchConfig, DEFAULT_BACKOFF};
use crate::node_pool::{NodePool, WeightedPool};
use crate::pool::{ConnectionPool, PoolConfig};
use crate::registry::Discovery;

/// Scheme prefix that routes a client through discovery.
pub const DISCOVERY_SCHEME: &str = "discovery:///";

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client configuration.
///
/// Built with [`ClientOptions::new`] and the `with_*` setters:
///
/// ```rust
/// use std::time::Duration;
/// use wirebridge_client::ClientOptions;
///
/// let options = ClientOptions::new("127.0.0.1:9090").with_timeout(Duration::from_millis(500));
/// assert_eq!(options.timeout, Duration::from_millis(500));
/// ```
#[derive(Clone)]
pub struct ClientOptions {
    /// `host:port`, `tcp://host:port`, or `discovery:///<service>`.
    pub endpoint: String,
    /// Per-call timeout. Zero disables it and the caller's context alone
    /// bounds the call.
    pub timeout: Duration,
    /// Interceptors, outermost first.
    pub middleware: Vec<Middleware>,
    pub discovery: Option<Arc<dyn Discovery>>,
    /// Namespace prefix of discovered node keys.
    pub namespace: String,
    pub node_filters: Vec<NodeFilter>,
    /// Overrides the process-wide default codec.
    pub codec: Option<Codec>,
    /// Overrides the process-wide default balancer.
    pub balancer: Option<Balancer>,
    pub pool: PoolConfig,
    /// Pause after a failed discovery watch.
    pub discovery_backoff: Duration,
    /// Endpoint scheme picked out of discovered instances.
    pub endpoint_scheme: String,
}

impl ClientOptions {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: DEFAULT_TIMEOUT,
            middleware: Vec::new(),
            discovery: None,
            namespace: "default".to_string(),
            node_filters: Vec::new(),
            codec: None,
            balancer: None,
            pool: PoolConfig::default(),
            discovery_backoff: DEFAULT_BACKOFF,
            endpoint_scheme: "tcp".to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_middleware(mut self, middleware: Vec<Middleware>) -> Self {
        self.middleware = middleware;
        self
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn Discovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_node_filter(mut self, filter: NodeFilter) -> Self {
        self.node_filters.push(filter);
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn with_balancer(mut self, balancer: Balancer) -> Self {
        self.balancer = Some(balancer);
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_discovery_backoff(mut self, backoff: Duration) -> Self {
        self.discovery_backoff = backoff;
        self
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("middleware", &self.middleware.len())
            .field("discovery", &self.discovery.is_some())
            .field("namespace", &self.namespace)
            .field("node_filters", &self.node_filters.len())
            .field("codec", &self.codec)
            .field("balancer", &self.balancer)
            .field("pool", &self.pool)
            .field("discovery_backoff", &self.discovery_backoff)
            .field("endpoint_scheme", &self.endpoint_scheme)
            .finish()
    }
}

enum Target {
    Direct(Node),
    Discovered {
        service: String,
        nodes: Arc<WeightedPool>,
    },
}

struct ClientInner {
    endpoint: String,
    timeout: Duration,
    middleware: Vec<Middleware>,
    node_filters: Vec<NodeFilter>,
    codec: Codec,
    target: Target,
    connections: ConnectionPool,
    session: Mutex<Option<DiscoverySession>>,
}

/// wirebridge client.
///
/// Cheap to clone; clones share the connection pool and the discovery
/// session.
///
/// ```rust,no_run
/// use wirebridge_client::{Client, ClientOptions};
/// use wirebridge_common::Context;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::dial(ClientOptions::new("127.0.0.1:9090")).await?;
/// let reply: Option<String> = client
///     .call(&Context::background(), "/helloworld.Greeter/SayHello", "world".to_string())
///     .await?;
/// println!("{:?}", reply);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Creates a client. With a discovery source configured, subscribes to the
    /// service named by the `discovery:///` endpoint before returning.
    pub async fn dial(options: ClientOptions) -> Result<Self> {
        let codec = options.codec.unwrap_or_else(default_codec);

        let (target, session) = match &options.discovery {
            Some(discovery) => {
                let name = options
                    .endpoint
                    .strip_prefix(DISCOVERY_SCHEME)
                    .unwrap_or(&options.endpoint)
                    .trim_matches('/')
                    .to_string();
                if name.is_empty() {
                    return Err(BridgeError::InvalidRequest(format!(
                        "no service name in endpoint {}",
                        options.endpoint
                    )));
                }

                let watcher = discovery
                    .watch(&name)
                    .await
                    .map_err(|e| BridgeError::Resolve(format!("failed to watch {}: {}", name, e)))?;
                let nodes = Arc::new(match options.balancer {
                    Some(balancer) => WeightedPool::with_balancer(balancer),
                    None => WeightedPool::new(),
                });
                let session = DiscoverySession::spawn(
                    watcher,
                    nodes.clone(),
                    WatchConfig {
                        namespace: options.namespace.clone(),
                        scheme: options.endpoint_scheme.clone(),
                        backoff: options.discovery_backoff,
                    },
                );
                info!(service = %name, namespace = %options.namespace, "watching service");

                let service = format!("{}/{}", options.namespace, name);
                (Target::Discovered { service, nodes }, Some(session))
            }
            None => (Target::Direct(direct_node(&options.endpoint)?), None),
        };

        Ok(Self {
            inner: Arc::new(ClientInner {
                endpoint: options.endpoint,
                timeout: options.timeout,
                middleware: options.middleware,
                node_filters: options.node_filters,
                codec,
                target,
                connections: ConnectionPool::new(options.pool),
                session: Mutex::new(session),
            }),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    pub fn codec(&self) -> Codec {
        self.inner.codec
    }

    /// Nodes currently known for a discovered service; empty for a direct
    /// endpoint.
    pub fn nodes(&self) -> Vec<Node> {
        match &self.inner.target {
            Target::Direct(_) => Vec::new(),
            Target::Discovered { service, nodes } => nodes.nodes(service),
        }
    }

    /// Invokes `operation` with `request`.
    ///
    /// Returns `Ok(None)` when the server replied without a body. A request
    /// value that is itself a [`Status`](wirebridge_common::Status) is sent as
    /// the envelope's error instead of a payload. So is a [`BridgeError`] that
    /// an interceptor substitutes for the request on its way down the chain.
    pub async fn call<Req, Resp>(
        &self,
        ctx: &Context,
        operation: &str,
        request: Req,
    ) -> Result<Option<Resp>>
    where
        Req: Serialize + Send + 'static,
        Resp: DeserializeOwned + Send + 'static,
    {
        let transport = Arc::new(Transport::client(
            self.inner.endpoint.clone(),
            operation,
            self.inner.node_filters.clone(),
        ));
        let peer = ctx.peer().cloned().unwrap_or_default();
        let ctx = ctx.with_transport(transport).with_peer(peer);

        let inner = self.inner.clone();
        let operation = operation.to_string();
        let terminal = handler_fn(move |ctx, msg| {
            let inner = inner.clone();
            let operation = operation.clone();
            async move { inner.invoke::<Req, Resp>(&ctx, &operation, msg).await }
        });

        let request: Message = Box::new(request);
        let reply = if self.inner.middleware.is_empty() {
            terminal(ctx, request).await?
        } else {
            chain(&self.inner.middleware, terminal)(ctx, request).await?
        };
        into_reply::<Resp>(reply)
    }

    /// Like [`call`](Self::call), but writes the reply into `reply`. A reply
    /// without a body leaves `reply` untouched.
    pub async fn call_into<Req, Resp>(
        &self,
        ctx: &Context,
        operation: &str,
        request: Req,
        reply: &mut Resp,
    ) -> Result<()>
    where
        Req: Serialize + Send + 'static,
        Resp: DeserializeOwned + Send + 'static,
    {
        if let Some(value) = self.call::<Req, Resp>(ctx, operation, request).await? {
            *reply = value;
        }
        Ok(())
    }

    /// Stops the discovery session, if any, and waits for it to wind down.
    pub async fn close(&self) {
        let session = self.inner.session.lock().take();
        if let Some(session) = session {
            session.close().await;
        }
    }
}

impl ClientInner {
    async fn invoke<Req, Resp>(&self, ctx: &Context, operation: &str, msg: Message) -> Result<Message>
    where
        Req: Serialize + 'static,
        Resp: DeserializeOwned + Send + 'static,
    {
        let envelope = self.request_envelope::<Req>(ctx, &msg)?;
        let body = self.codec.encode_envelope(&envelope)?;

        let node = self.resolve(ctx)?;
        if let Some(peer) = ctx.peer() {
            peer.set(node.clone());
        }
        debug!(operation, node = %node.address, "dispatching call");

        let reply = self
            .dispatch(ctx, &node.address, Packet::new(operation, body))
            .await?;

        let envelope = self.codec.decode_envelope(&reply.body)?;
        if let Some(transport) = ctx.transport() {
            *transport.reply_header() = HeaderCarrier::from_map(envelope.headers.clone());
        }

        match envelope.into_payload()? {
            Some(payload) => Ok(Box::new(Some(self.codec.decode::<Resp>(&payload)?))),
            None => Ok(Box::new(None::<Resp>)),
        }
    }

    fn request_envelope<Req: Serialize + 'static>(&self, ctx: &Context, msg: &Message) -> Result<Envelope> {
        let headers = ctx
            .transport()
            .map(|t| t.request_header().to_map())
            .unwrap_or_default();

        if let Some(status) = as_error(msg) {
            return Ok(Envelope::from_status(status, headers));
        }

        let request = msg.downcast_ref::<Req>().ok_or_else(|| {
            BridgeError::InvalidRequest(format!(
                "request is not a {}",
                std::any::type_name::<Req>()
            ))
        })?;
        Ok(Envelope::with_payload(self.codec.encode(request)?, headers))
    }

    fn resolve(&self, ctx: &Context) -> Result<Node> {
        match &self.target {
            Target::Direct(node) => Ok(node.clone()),
            Target::Discovered { service, nodes } => {
                let filters = ctx
                    .transport()
                    .map(|t| t.node_filters())
                    .unwrap_or(self.node_filters.as_slice());
                nodes.resolve(service, filters)
            }
        }
    }

    async fn dispatch(&self, ctx: &Context, addr: &str, packet: Packet) -> Result<Packet> {
        if self.timeout > Duration::ZERO {
            return match tokio::time::timeout(self.timeout, self.round_trip(addr, &packet)).await {
                Ok(reply) => reply,
                Err(_) => Err(BridgeError::Timeout(self.timeout.as_millis() as u64)),
            };
        }

        tokio::select! {
            biased;
            err = ctx.done() => Err(err),
            reply = self.round_trip(addr, &packet) => reply,
        }
    }

    async fn round_trip(&self, addr: &str, packet: &Packet) -> Result<Packet> {
        let mut conn = self.connections.acquire(addr).await?;
        let reply = conn.round_trip(packet).await?;
        self.connections.release(conn);
        Ok(reply)
    }
}

/// Node for a fixed endpoint: `host:port` with an optional `tcp://` prefix.
fn direct_node(endpoint: &str) -> Result<Node> {
    if endpoint.starts_with(DISCOVERY_SCHEME) {
        return Err(BridgeError::InvalidRequest(format!(
            "endpoint {} needs a discovery source",
            endpoint
        )));
    }
    let address = endpoint
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(endpoint)
        .trim_end_matches('/');
    if address.is_empty() {
        return Err(BridgeError::InvalidRequest(format!(
            "invalid endpoint {:?}",
            endpoint
        )));
    }
    Ok(Node {
        key: address.to_string(),
        service: address.to_string(),
        address: address.to_string(),
        weight: DEFAULT_WEIGHT,
    })
}
