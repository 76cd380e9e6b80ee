use thiserror::Error;

use super::status::Status;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// No node could be picked for the target, or discovery could not be set up.
    #[error("Resolve error: {0}")]
    Resolve(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Call canceled")]
    Canceled,

    #[error("Codec error: {0}")]
    Codec(String),

    /// Application error reported by the remote handler inside a well-formed envelope.
    #[error("{0}")]
    Status(#[from] Status),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// True for failures that happened before or while talking to the peer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            BridgeError::Connection(_)
                | BridgeError::Timeout(_)
                | BridgeError::Canceled
                | BridgeError::Io(_)
        )
    }

    /// True when bytes reached us (or were about to leave) but could not be (de)serialized.
    pub fn is_codec(&self) -> bool {
        matches!(self, BridgeError::Codec(_))
    }

    pub fn as_status(&self) -> Option<&Status> {
        match self {
            BridgeError::Status(status) => Some(status),
            _ => None,
        }
    }
}

impl From<postcard::Error> for BridgeError {
    fn from(err: postcard::Error) -> Self {
        BridgeError::Codec(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Codec(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
