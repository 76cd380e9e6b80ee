//! Per-call transport metadata.
//!
//! One [`Transport`] exists per in-flight call, on either side. It is attached
//! to the call's [`Context`](crate::context::Context) and read by
//! interceptors.

use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::OnceLock;

use crate::protocol::HeaderCarrier;
use crate::selector::NodeFilter;

/// Transport kind reported to interceptors.
pub const KIND: &str = "wirebridge";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Server,
}

pub struct Transport {
    side: Side,
    endpoint: String,
    operation: OnceLock<String>,
    request_header: Mutex<HeaderCarrier>,
    reply_header: Mutex<HeaderCarrier>,
    node_filters: Vec<NodeFilter>,
}

impl Transport {
    /// Metadata for an outgoing call. The operation is fixed at creation.
    pub fn client(
        endpoint: impl Into<String>,
        operation: impl Into<String>,
        node_filters: Vec<NodeFilter>,
    ) -> Self {
        let transport = Self {
            side: Side::Client,
            endpoint: endpoint.into(),
            operation: OnceLock::new(),
            request_header: Mutex::new(HeaderCarrier::new()),
            reply_header: Mutex::new(HeaderCarrier::new()),
            node_filters,
        };
        let _ = transport.operation.set(operation.into());
        transport
    }

    /// Metadata for an inbound call, built from the decoded envelope headers.
    /// The operation stays unset until the handler registration path names it.
    pub fn server(endpoint: impl Into<String>, request_header: HeaderCarrier) -> Self {
        Self {
            side: Side::Server,
            endpoint: endpoint.into(),
            operation: OnceLock::new(),
            request_header: Mutex::new(request_header),
            reply_header: Mutex::new(HeaderCarrier::new()),
            node_filters: Vec::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        KIND
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn operation(&self) -> Option<&str> {
        self.operation.get().map(String::as_str)
    }

    /// Names the operation. Succeeds once; later calls leave the first name in
    /// place and return `false`.
    pub fn set_operation(&self, operation: impl Into<String>) -> bool {
        self.operation.set(operation.into()).is_ok()
    }

    /// Request headers. Populated before dispatch; server handlers treat them
    /// as read-only.
    pub fn request_header(&self) -> MutexGuard<'_, HeaderCarrier> {
        self.request_header.lock()
    }

    /// Reply headers, serialized into the outgoing envelope.
    pub fn reply_header(&self) -> MutexGuard<'_, HeaderCarrier> {
        self.reply_header.lock()
    }

    pub fn node_filters(&self) -> &[NodeFilter] {
        &self.node_filters
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("side", &self.side)
            .field("endpoint", &self.endpoint)
            .field("operation", &self.operation.get())
            .field("request_header", &*self.request_header.lock())
            .field("reply_header", &*self.reply_header.lock())
            .field("node_filters", &self.node_filters.len())
            .finish()
    }
}
