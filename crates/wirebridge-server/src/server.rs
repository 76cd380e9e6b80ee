use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};
use wirebridge_common::context::Context;
use wirebridge_common::middleware::{handler_fn, into_reply, Handler, Message};
use wirebridge_common::protocol::error::{BridgeError, Result};
use wirebridge_common::protocol::{Envelope, HeaderCarrier, Status};
use wirebridge_common::transport::{default_codec, read_packet, write_packet, Codec, Packet, Transport};

use crate::encoder::{DefaultErrorEncoder, DefaultRecovery, ErrorEncoder, Recovery};
use crate::matcher::Matcher;

/// Default per-call timeout applied to inbound requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default bind address.
pub const DEFAULT_ADDRESS: &str = "0.0.0.0:9090";

/// Status returned for calls that reach no handler.
pub fn no_handler_error() -> Status {
    Status::not_found("handler not found", "no handler found")
}

/// Server configuration.
#[derive(Clone)]
pub struct ServerOptions {
    /// Only `tcp` (and `tcp4`/`tcp6`) can be served.
    pub network: String,
    pub address: String,
    /// Advertised endpoint; derived from the bound listener when unset.
    pub endpoint: Option<String>,
    /// Per-call timeout. Zero leaves only cancellation.
    pub timeout: Duration,
    pub error_encoder: Arc<dyn ErrorEncoder>,
    pub recovery: Arc<dyn Recovery>,
    pub middleware: Matcher,
    /// Overrides the process-wide default codec.
    pub codec: Option<Codec>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            network: "tcp".to_string(),
            address: DEFAULT_ADDRESS.to_string(),
            endpoint: None,
            timeout: DEFAULT_TIMEOUT,
            error_encoder: Arc::new(DefaultErrorEncoder),
            recovery: Arc::new(DefaultRecovery),
            middleware: Matcher::new(),
            codec: None,
        }
    }
}

impl ServerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_error_encoder(mut self, encoder: Arc<dyn ErrorEncoder>) -> Self {
        self.error_encoder = encoder;
        self
    }

    pub fn with_recovery(mut self, recovery: Arc<dyn Recovery>) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_middleware(mut self, middleware: Matcher) -> Self {
        self.middleware = middleware;
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = Some(codec);
        self
    }
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("network", &self.network)
            .field("address", &self.address)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("middleware", &self.middleware)
            .field("codec", &self.codec)
            .finish()
    }
}

/// One inbound request as seen by a route handler.
///
/// Cloning shares the same request; the reply can be written once.
#[derive(Clone)]
pub struct Inbound {
    inner: Arc<InboundInner>,
}

struct InboundInner {
    method: String,
    body: Vec<u8>,
    ctx: Context,
    call_ctx: Mutex<Option<Context>>,
    reply: Mutex<Option<Envelope>>,
}

impl Inbound {
    fn new(method: String, body: Vec<u8>, ctx: Context) -> Self {
        Self {
            inner: Arc::new(InboundInner {
                method,
                body,
                ctx,
                call_ctx: Mutex::new(None),
                reply: Mutex::new(None),
            }),
        }
    }

    pub fn method(&self) -> &str {
        &self.inner.method
    }

    /// Raw request bytes: an encoded envelope, or empty.
    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    /// Connection-scoped context the request arrived on.
    pub fn context(&self) -> &Context {
        &self.inner.ctx
    }

    pub fn is_written(&self) -> bool {
        self.inner.reply.lock().is_some()
    }

    fn call_context(&self) -> Context {
        self.inner
            .call_ctx
            .lock()
            .clone()
            .unwrap_or_else(|| self.inner.ctx.clone())
    }

    fn take_reply(&self) -> Option<Envelope> {
        self.inner.reply.lock().take()
    }
}

type RouteHandler = Arc<dyn Fn(Server, Inbound) -> BoxFuture<'static, Result<()>> + Send + Sync>;

struct ServerInner {
    network: String,
    address: String,
    timeout: Duration,
    error_encoder: Arc<dyn ErrorEncoder>,
    recovery: Arc<dyn Recovery>,
    middleware: Matcher,
    codec: Codec,
    routes: RwLock<HashMap<String, RouteHandler>>,
    listener: tokio::sync::Mutex<Option<TcpListener>>,
    endpoint: Mutex<Option<String>>,
    started: Mutex<bool>,
    base: Context,
}

/// wirebridge server.
///
/// Decodes each inbound envelope, runs the matching interceptors around the
/// registered handler and writes back exactly one envelope per request. A
/// handler that fails or panics still produces an error envelope and the
/// connection stays open.
///
/// ```rust,no_run
/// use wirebridge_common::protocol::error::Result;
/// use wirebridge_common::Context;
/// use wirebridge_server::{Server, ServerOptions};
///
/// # #[tokio::main]
/// # async fn main() -> Result<()> {
/// let server = Server::new(ServerOptions::new().with_address("127.0.0.1:9090"));
/// server.handle_typed("/helloworld.Greeter/SayHello", |_ctx: Context, name: String| async move {
///     Ok(format!("hello {}", name))
/// });
/// server.start().await
/// # }
/// ```
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    pub fn new(options: ServerOptions) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                network: options.network,
                address: options.address,
                timeout: options.timeout,
                error_encoder: options.error_encoder,
                recovery: options.recovery,
                middleware: options.middleware,
                codec: options.codec.unwrap_or_else(default_codec),
                routes: RwLock::new(HashMap::new()),
                listener: tokio::sync::Mutex::new(None),
                endpoint: Mutex::new(options.endpoint),
                started: Mutex::new(false),
                base: Context::background(),
            }),
        }
    }

    pub fn codec(&self) -> Codec {
        self.inner.codec
    }

    /// Registers the raw handler for `method`.
    ///
    /// The handler drives the pipeline itself: [`decode_request`],
    /// [`decode_data`], [`middleware_for`], [`encode_response`] and finally
    /// [`write`]. Returning an error without writing makes the server encode
    /// that error as the reply.
    ///
    /// [`decode_request`]: Self::decode_request
    /// [`decode_data`]: Self::decode_data
    /// [`middleware_for`]: Self::middleware_for
    /// [`encode_response`]: Self::encode_response
    /// [`write`]: Self::write
    pub fn handle<F, Fut>(&self, method: impl Into<String>, handler: F) -> &Self
    where
        F: Fn(Server, Inbound) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let route: RouteHandler = Arc::new(move |server, inbound| Box::pin(handler(server, inbound)));
        self.inner.routes.write().insert(method.into(), route);
        self
    }

    /// Registers a typed handler for `method` and runs the whole decode,
    /// intercept, encode and write pipeline for it.
    pub fn handle_typed<Req, Resp, F, Fut>(&self, method: &str, handler: F) -> &Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Context, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let codec = self.inner.codec;
        let fallback = handler_fn(move |ctx, msg: Message| {
            let handler = handler.clone();
            async move {
                let request = match msg.downcast::<Req>() {
                    Ok(request) => *request,
                    Err(msg) if msg.is::<()>() => codec.decode::<Req>(&[])?,
                    Err(_) => {
                        return Err(BridgeError::Codec(format!(
                            "request is not a {}",
                            std::any::type_name::<Req>()
                        )))
                    }
                };
                let reply: Message = Box::new(handler(ctx, request).await?);
                Ok(reply)
            }
        });

        let operation = method.to_string();
        self.handle(method, move |server: Server, inbound: Inbound| {
            let fallback = fallback.clone();
            let operation = operation.clone();
            async move {
                let (ctx, payload) = server.decode_request(&inbound);
                let result = server
                    .run_typed::<Req, Resp>(&ctx, &operation, payload, fallback)
                    .await;
                let envelope = server.encode_response(&ctx, result);
                server.write(&inbound, envelope)
            }
        })
    }

    async fn run_typed<Req, Resp>(
        &self,
        ctx: &Context,
        operation: &str,
        payload: Result<Option<Vec<u8>>>,
        fallback: Handler,
    ) -> Result<Option<Resp>>
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Send + 'static,
    {
        let payload = payload?;
        if let Some(transport) = ctx.transport() {
            transport.set_operation(operation);
        }
        let request: Message = match payload {
            Some(bytes) => Box::new(self.decode_data::<Req>(&bytes)?),
            None => Box::new(()),
        };
        let reply = self.middleware_for(ctx, fallback)(ctx.clone(), request).await?;
        into_reply::<Resp>(reply)
    }

    /// First decode phase: the envelope and the call metadata.
    ///
    /// An empty body yields the connection context unchanged and no payload.
    /// Otherwise the returned context carries server-side [`Transport`]
    /// metadata built from the envelope headers and is bounded by the
    /// configured timeout. An envelope that carries an error yields that error
    /// together with the initialised context.
    pub fn decode_request(&self, inbound: &Inbound) -> (Context, Result<Option<Vec<u8>>>) {
        let ambient = inbound.context().clone();
        if inbound.body().is_empty() {
            return (ambient, Ok(None));
        }

        let envelope = match self.inner.codec.decode_envelope(inbound.body()) {
            Ok(envelope) => envelope,
            Err(e) => return (ambient, Err(e)),
        };

        let ctx = self.init_transport(&ambient, envelope.headers.clone());
        *inbound.inner.call_ctx.lock() = Some(ctx.clone());
        (ctx, envelope.into_payload())
    }

    fn init_transport(
        &self,
        ambient: &Context,
        headers: std::collections::BTreeMap<String, Vec<String>>,
    ) -> Context {
        let ctx = if self.inner.timeout > Duration::ZERO {
            ambient.with_timeout(self.inner.timeout)
        } else {
            ambient.with_cancel()
        };
        let endpoint = self.inner.endpoint.lock().clone().unwrap_or_default();
        let transport = Transport::server(endpoint, HeaderCarrier::from_map(headers));
        ctx.with_transport(Arc::new(transport))
    }

    /// Second decode phase: the payload into the handler's request type.
    pub fn decode_data<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        self.inner.codec.decode(data)
    }

    /// Wraps `fallback` with the interceptors matched for the call's
    /// operation. Without call metadata or an operation name, returns a
    /// handler that fails with [`no_handler_error`].
    pub fn middleware_for(&self, ctx: &Context, fallback: Handler) -> Handler {
        let operation = ctx
            .transport()
            .and_then(|t| t.operation().map(str::to_string));
        match operation {
            Some(operation) => {
                let middleware = self.inner.middleware.matches(&operation);
                if middleware.is_empty() {
                    fallback
                } else {
                    wirebridge_common::middleware::chain(&middleware, fallback)
                }
            }
            None => handler_fn(|_ctx, _msg| async { Err(BridgeError::Status(no_handler_error())) }),
        }
    }

    /// Builds the reply envelope for a handler result.
    pub fn encode_response<T: Serialize>(&self, ctx: &Context, result: Result<Option<T>>) -> Envelope {
        let response = match result {
            Ok(Some(response)) => response,
            Ok(None) => {
                let mut envelope = Envelope::new();
                envelope.headers = reply_headers(ctx);
                return envelope;
            }
            Err(e) => return self.inner.error_encoder.encode(ctx, &e),
        };
        match self.inner.codec.encode(&response) {
            Ok(payload) => Envelope::with_payload(payload, reply_headers(ctx)),
            Err(e) => self.inner.error_encoder.encode(ctx, &e),
        }
    }

    /// Queues `envelope` as the reply to `inbound`. Fails if a reply was
    /// already written.
    pub fn write(&self, inbound: &Inbound, envelope: Envelope) -> Result<()> {
        let mut reply = inbound.inner.reply.lock();
        if reply.is_some() {
            return Err(BridgeError::Connection(format!(
                "reply to {} already written",
                inbound.method()
            )));
        }
        *reply = Some(envelope);
        Ok(())
    }

    /// Binds the listener if needed and returns the advertised endpoint.
    pub async fn endpoint(&self) -> Result<String> {
        self.listen().await?;
        self.inner
            .endpoint
            .lock()
            .clone()
            .ok_or_else(|| BridgeError::InvalidRequest("server has no endpoint".into()))
    }

    async fn listen(&self) -> Result<()> {
        let mut listener = self.inner.listener.lock().await;
        if listener.is_some() || *self.inner.started.lock() {
            return Ok(());
        }
        if !matches!(self.inner.network.as_str(), "tcp" | "tcp4" | "tcp6") {
            return Err(BridgeError::InvalidRequest(format!(
                "unsupported network {}",
                self.inner.network
            )));
        }

        let address = bind_address(&self.inner.address);
        let bound = TcpListener::bind(&address)
            .await
            .map_err(|e| BridgeError::Connection(format!("Failed to bind to {}: {}", address, e)))?;
        let local = bound.local_addr()?;

        let mut endpoint = self.inner.endpoint.lock();
        if endpoint.is_none() {
            *endpoint = Some(advertised_endpoint(local));
        }
        *listener = Some(bound);
        Ok(())
    }

    /// Serves connections until [`stop`](Self::stop) is called.
    pub async fn start(&self) -> Result<()> {
        self.listen().await?;
        self.mark_started()?;
        let Some(listener) = self.inner.listener.lock().await.take() else {
            return Err(BridgeError::InvalidRequest("server listener unavailable".into()));
        };
        info!(addr = %listener.local_addr()?, "server listening");

        let shutdown = self.inner.base.clone();
        loop {
            let accepted = tokio::select! {
                _ = shutdown.done() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "connection established");
                    let server = self.clone();
                    tokio::spawn(async move { server.serve_connection(stream, peer).await });
                }
                Err(e) => warn!(error = %e, "failed to accept connection"),
            }
        }
        info!("server stopped");
        Ok(())
    }

    fn mark_started(&self) -> Result<()> {
        let mut started = self.inner.started.lock();
        if *started {
            return Err(BridgeError::InvalidRequest("server already started".into()));
        }
        *started = true;
        Ok(())
    }

    /// Stops accepting and cancels every in-flight request context.
    pub async fn stop(&self) -> Result<()> {
        info!("server stopping");
        self.inner.base.cancel();
        Ok(())
    }

    async fn serve_connection(self, mut stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "failed to set TCP_NODELAY");
        }
        let conn_ctx = self.inner.base.with_cancel();

        loop {
            let next = tokio::select! {
                _ = conn_ctx.done() => break,
                next = read_packet(&mut stream) => next,
            };
            let packet = match next {
                Ok(Some(packet)) => packet,
                Ok(None) => {
                    debug!(%peer, "connection closed by peer");
                    break;
                }
                Err(e) => {
                    warn!(%peer, error = %e, "failed to read request");
                    break;
                }
            };

            let method = packet.method.clone();
            let body = match self.dispatch(packet, &conn_ctx).await {
                Ok(body) => body,
                Err(e) => {
                    error!(%peer, method = %method, error = %e, "failed to encode reply");
                    break;
                }
            };
            if let Err(e) = write_packet(&mut stream, &Packet::new(method, body)).await {
                error!(%peer, error = %e, "failed to write reply");
                break;
            }
        }
        conn_ctx.cancel();
    }

    /// Runs one request and returns the encoded reply envelope.
    async fn dispatch(&self, packet: Packet, conn_ctx: &Context) -> Result<Vec<u8>> {
        let inbound = Inbound::new(packet.method, packet.body, conn_ctx.clone());
        let route = self.inner.routes.read().get(inbound.method()).cloned();

        let failure = match route {
            Some(route) => {
                let server = self.clone();
                let call = inbound.clone();
                let outcome = AssertUnwindSafe(async move { route(server, call).await })
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(e),
                    Err(panic) => {
                        let ctx = inbound.call_context();
                        let err = self.inner.recovery.recover(&ctx, panic.as_ref());
                        error!(method = %inbound.method(), error = %err, "panic recovery");
                        Some(err)
                    }
                }
            }
            None => {
                debug!(method = %inbound.method(), "no handler registered");
                Some(BridgeError::Status(no_handler_error()))
            }
        };

        let envelope = match (inbound.take_reply(), failure) {
            (Some(envelope), None) => envelope,
            (Some(envelope), Some(e)) => {
                warn!(method = %inbound.method(), error = %e, "handler failed after writing its reply");
                envelope
            }
            (None, Some(e)) => self.inner.error_encoder.encode(&inbound.call_context(), &e),
            (None, None) => Envelope::new(),
        };

        match self.inner.codec.encode_envelope(&envelope) {
            Ok(body) => Ok(body),
            Err(e) => {
                let fallback = self.inner.error_encoder.encode(&inbound.call_context(), &e);
                self.inner.codec.encode_envelope(&fallback)
            }
        }
    }
}

fn reply_headers(ctx: &Context) -> std::collections::BTreeMap<String, Vec<String>> {
    ctx.transport()
        .map(|t| t.reply_header().to_map())
        .unwrap_or_default()
}

/// `:9090` binds every interface, like `0.0.0.0:9090`.
fn bind_address(address: &str) -> String {
    if address.starts_with(':') {
        format!("0.0.0.0{}", address)
    } else {
        address.to_string()
    }
}

fn advertised_endpoint(local: SocketAddr) -> String {
    let ip = if local.ip().is_unspecified() {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        local.ip()
    };
    format!("tcp://{}", SocketAddr::new(ip, local.port()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirebridge_common::protocol::Header;

    fn server() -> Server {
        Server::new(ServerOptions::new().with_address("127.0.0.1:0"))
    }

    fn inbound(server: &Server, envelope: &Envelope) -> Inbound {
        let body = server.codec().encode_envelope(envelope).unwrap();
        Inbound::new("/test".into(), body, Context::background())
    }

    #[test]
    fn test_options_defaults() {
        let options = ServerOptions::default();
        assert_eq!(options.network, "tcp");
        assert_eq!(options.address, "0.0.0.0:9090");
        assert_eq!(options.timeout, Duration::from_secs(3));
        assert!(options.endpoint.is_none());
    }

    #[test]
    fn test_decode_empty_body() {
        let server = server();
        let inbound = Inbound::new("/test".into(), Vec::new(), Context::background());
        let (ctx, payload) = server.decode_request(&inbound);
        assert!(ctx.transport().is_none());
        assert_eq!(payload.unwrap(), None);
    }

    #[test]
    fn test_decode_request_builds_transport() {
        let server = server();
        let mut headers = HeaderCarrier::new();
        headers.set("X-User", "ada");
        let envelope = Envelope::with_payload(server.codec().encode(&5u32).unwrap(), headers.to_map());

        let (ctx, payload) = server.decode_request(&inbound(&server, &envelope));
        let transport = ctx.transport().unwrap();
        assert_eq!(transport.request_header().get("x-user"), Some("ada"));
        assert!(transport.reply_header().is_empty());
        assert!(ctx.deadline().is_some());

        let value: u32 = server.decode_data(&payload.unwrap().unwrap()).unwrap();
        assert_eq!(value, 5);
    }

    #[test]
    fn test_decode_request_surfaces_envelope_error() {
        let server = server();
        let envelope = Envelope::from_status(Status::new(400, "BAD", "bad"), Default::default());
        let (ctx, payload) = server.decode_request(&inbound(&server, &envelope));
        assert!(ctx.transport().is_some());
        assert_eq!(payload.unwrap_err().as_status().unwrap().code, 400);
    }

    #[test]
    fn test_decode_request_rejects_garbage() {
        let server = server();
        let inbound = Inbound::new("/test".into(), vec![0xFF; 8], Context::background());
        let (ctx, payload) = server.decode_request(&inbound);
        assert!(ctx.transport().is_none());
        assert!(payload.unwrap_err().is_codec());
    }

    #[test]
    fn test_zero_timeout_leaves_no_deadline() {
        let server = Server::new(ServerOptions::new().with_timeout(Duration::ZERO));
        let envelope = Envelope::with_payload(Vec::new(), Default::default());
        let (ctx, _) = server.decode_request(&inbound(&server, &envelope));
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn test_unbounded_timeout_leaves_no_deadline() {
        let server = Server::new(ServerOptions::new().with_timeout(Duration::MAX));
        let envelope = Envelope::with_payload(Vec::new(), Default::default());
        let (ctx, payload) = server.decode_request(&inbound(&server, &envelope));
        assert!(ctx.deadline().is_none());
        assert!(ctx.transport().is_some());
        assert!(payload.is_ok());
    }

    #[tokio::test]
    async fn test_middleware_for_without_operation() {
        let server = server();
        let fallback = handler_fn(|_ctx, msg| async move { Ok(msg) });
        let err = server.middleware_for(&Context::background(), fallback)(Context::background(), Box::new(()))
            .await
            .unwrap_err();
        assert_eq!(err.as_status(), Some(&no_handler_error()));
    }

    #[test]
    fn test_encode_response() {
        let server = server();
        let ctx = Context::background();

        assert_eq!(server.encode_response::<u32>(&ctx, Ok(None)), Envelope::new());

        let ok = server.encode_response(&ctx, Ok(Some(9u32)));
        assert_eq!(server.decode_data::<u32>(ok.payload.as_ref().unwrap()).unwrap(), 9);

        let failed = server.encode_response::<u32>(&ctx, Err(BridgeError::Timeout(3000)));
        assert!(failed.is_error());
        assert!(failed.payload.is_none());
    }

    #[test]
    fn test_write_once() {
        let server = server();
        let inbound = Inbound::new("/test".into(), Vec::new(), Context::background());
        server.write(&inbound, Envelope::new()).unwrap();
        assert!(inbound.is_written());
        assert!(server.write(&inbound, Envelope::new()).is_err());
    }

    #[test]
    fn test_advertised_endpoint() {
        let unspecified: SocketAddr = "0.0.0.0:9090".parse().unwrap();
        assert_eq!(advertised_endpoint(unspecified), "tcp://127.0.0.1:9090");
        let bound: SocketAddr = "10.1.2.3:7000".parse().unwrap();
        assert_eq!(advertised_endpoint(bound), "tcp://10.1.2.3:7000");
        assert_eq!(bind_address(":9090"), "0.0.0.0:9090");
    }

    #[tokio::test]
    async fn test_endpoint_binds_lazily() {
        let server = server();
        let endpoint = server.endpoint().await.unwrap();
        assert!(endpoint.starts_with("tcp://127.0.0.1:"));
        assert_eq!(server.endpoint().await.unwrap(), endpoint);
    }

    #[tokio::test]
    async fn test_unsupported_network() {
        let server = Server::new(ServerOptions::new().with_network("unix"));
        assert!(matches!(
            server.endpoint().await,
            Err(BridgeError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_method() {
        let server = server();
        let packet = Packet::new("/missing", Vec::new());
        let body = server.dispatch(packet, &Context::background()).await.unwrap();
        let envelope = server.codec().decode_envelope(&body).unwrap();
        assert_eq!(envelope.error, Some(no_handler_error()));
    }
}
