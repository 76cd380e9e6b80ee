//! wirebridge transport layer
//!
//! - **[`Codec`]**: payload and envelope serialization (postcard by default)
//! - **[`frame`]**: length-prefixed packets over any tokio byte stream
//! - **[`Transport`]**: per-call metadata attached to a [`Context`](crate::Context)
//!
//! # Wire Format
//!
//! ```text
//! [4-byte length as u32 big-endian] [postcard Packet { method, body }]
//! ```
//!
//! `body` is the codec-encoded [`Envelope`](crate::protocol::Envelope).

pub mod codec;
pub mod frame;
pub mod metadata;

pub use codec::{default_codec, init_default_codec, Codec, JsonCodec, PostcardCodec};
pub use frame::{read_packet, write_packet, Packet, MAX_MESSAGE_SIZE};
pub use metadata::{Side, Transport, KIND};
