use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::OnceLock;

use crate::protocol::error::Result;
use crate::protocol::Envelope;

static DEFAULT_CODEC: OnceLock<Codec> = OnceLock::new();

/// Sets the process-wide default codec.
///
/// Only the first call has an effect; it returns `true` when this call
/// installed `codec`. Call it once at process start, before any client or
/// server is built.
pub fn init_default_codec(codec: Codec) -> bool {
    DEFAULT_CODEC.set(codec).is_ok()
}

/// Returns the process-wide default codec, postcard unless
/// [`init_default_codec`] installed something else first.
pub fn default_codec() -> Codec {
    *DEFAULT_CODEC.get_or_init(Codec::default)
}

/// Codec for payloads and envelopes.
///
/// Postcard (compact binary) is the default. JSON is kept for debugging and
/// for peers that cannot speak postcard.
///
/// # Example
///
/// ```
/// use wirebridge_common::transport::Codec;
///
/// let codec = Codec::default();
/// let bytes = codec.encode(&("ping", 42u32)).unwrap();
/// let (word, n): (String, u32) = codec.decode(&bytes).unwrap();
/// assert_eq!((word.as_str(), n), ("ping", 42));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    #[default]
    Postcard,
    Json,
}

impl Codec {
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Postcard => "postcard",
            Codec::Json => "json",
        }
    }

    /// Encode a value to bytes
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Codec::Postcard => PostcardCodec::encode(value),
            Codec::Json => JsonCodec::encode(value),
        }
    }

    /// Decode a value from bytes
    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            Codec::Postcard => PostcardCodec::decode(data),
            Codec::Json => JsonCodec::decode(data),
        }
    }

    pub fn encode_envelope(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        self.encode(envelope)
    }

    pub fn decode_envelope(&self, data: &[u8]) -> Result<Envelope> {
        self.decode(data)
    }
}

/// Postcard codec (varint-based compact binary).
pub struct PostcardCodec;

impl PostcardCodec {
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(value)?)
    }

    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        Ok(postcard::from_bytes(data)?)
    }
}

/// JSON codec.
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}
