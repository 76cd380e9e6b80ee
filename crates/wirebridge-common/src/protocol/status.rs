//! Structured application errors.
//!
//! A [`Status`] is what travels in the `error` field of an
//! [`Envelope`](super::Envelope). It always carries a code/reason/message
//! triple, optional string metadata and an optional wrapped cause.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::error::BridgeError;

/// Code used when an arbitrary error is converted into a status.
pub const UNKNOWN_CODE: i32 = 500;

/// Reason used when an arbitrary error is converted into a status.
pub const UNKNOWN_REASON: &str = "";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Status {
    pub code: i32,
    pub reason: String,
    pub message: String,
    pub metadata: BTreeMap<String, String>,
    pub cause: Option<Box<Status>>,
}

impl Status {
    pub fn new(code: i32, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            message: message.into(),
            metadata: BTreeMap::new(),
            cause: None,
        }
    }

    /// 404 status returned when no handler exists for an operation.
    pub fn not_found(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(404, reason, message)
    }

    pub fn internal(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(500, reason, message)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_cause(mut self, cause: Status) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Converts any error into a status.
    ///
    /// Application statuses pass through unchanged; everything else becomes an
    /// [`UNKNOWN_CODE`] status whose message is the error text.
    pub fn from_error(err: &BridgeError) -> Self {
        match err {
            BridgeError::Status(status) => status.clone(),
            other => Self::new(UNKNOWN_CODE, UNKNOWN_REASON, other.to_string()),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "error: code = {} reason = {} message = {} metadata = {:?}",
            self.code, self.reason, self.message, self.metadata
        )?;
        if let Some(cause) = &self.cause {
            write!(f, " cause = {}", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for Status {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}
