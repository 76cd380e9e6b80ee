//! wirebridge server
//!
//! [`Server`] accepts length-prefixed packets over TCP, decodes each request
//! envelope in two phases (call metadata first, typed payload second), wraps
//! the registered handler with the interceptors a [`Matcher`] selects for the
//! operation and writes back one reply envelope per request.

pub mod encoder;
pub mod matcher;
pub mod server;

pub use encoder::{panic_message, DefaultErrorEncoder, DefaultRecovery, ErrorEncoder, Recovery};
pub use matcher::Matcher;
pub use server::{no_handler_error, Inbound, Server, ServerOptions, DEFAULT_ADDRESS, DEFAULT_TIMEOUT};
