//! The message envelope: the only unit ever sent over the wire.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::{BridgeError, Result};
use super::status::Status;

/// Wire container for one request or one reply.
///
/// # Reading an envelope
///
/// - `error` set: the envelope is a failure, whatever `payload` holds
/// - `payload` set: success with a body
/// - neither set: success without a body
///
/// The error always takes precedence, so a receiver never decodes the payload
/// of an envelope that carries an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope {
    /// Codec-encoded request or response value.
    pub payload: Option<Vec<u8>>,
    /// Propagated headers (trace ids, content hints, custom fields).
    pub headers: BTreeMap<String, Vec<String>>,
    /// Structured application error.
    pub error: Option<Status>,
}

impl Envelope {
    /// Empty success envelope.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(payload: Vec<u8>, headers: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            payload: Some(payload),
            headers,
            error: None,
        }
    }

    pub fn from_status(status: Status, headers: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            payload: None,
            headers,
            error: Some(status),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Splits the envelope into its outcome.
    ///
    /// Returns the carried status as [`BridgeError::Status`] when the error
    /// field is set, otherwise the (possibly absent) payload bytes.
    pub fn into_payload(self) -> Result<Option<Vec<u8>>> {
        match self.error {
            Some(status) => Err(BridgeError::Status(status)),
            None => Ok(self.payload),
        }
    }
}
