//! wirebridge common types and transport
//!
//! wirebridge runs request/response services over a compact length-prefixed
//! binary RPC transport while keeping interceptors, discovery-fed weighted
//! load balancing and structured errors working on both ends. This crate holds
//! the pieces the client and the server share:
//!
//! - [`protocol`] - envelope, structured [`Status`] errors, header carriers
//! - [`transport`] - codec, packet framing, per-call [`Transport`] metadata
//! - [`context`] - cancellation/deadline carrier for a call
//! - [`middleware`] - interceptor composition over type-erased messages
//! - [`selector`] - node, filter and peer types used for load balancing
//!
//! # Example
//!
//! ```
//! use wirebridge_common::{Codec, Envelope, Status};
//!
//! let codec = Codec::default();
//! let reply = Envelope::from_status(Status::not_found("USER", "no such user"), Default::default());
//! let bytes = codec.encode_envelope(&reply).unwrap();
//! assert!(codec.decode_envelope(&bytes).unwrap().is_error());
//! ```

pub mod context;
pub mod middleware;
pub mod protocol;
pub mod selector;
pub mod telemetry;
pub mod transport;

pub use context::Context;
pub use middleware::{chain, handler_fn, middleware_fn, Handler, Message, Middleware};
pub use protocol::*;
pub use selector::{Balancer, Node, NodeFilter, PeerSlot, DEFAULT_WEIGHT};
pub use transport::{Codec, Transport};
