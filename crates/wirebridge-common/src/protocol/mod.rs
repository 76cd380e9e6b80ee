pub mod envelope;
pub mod error;
pub mod header;
pub mod status;

#[cfg(test)]
mod tests;

pub use envelope::Envelope;
pub use error::{BridgeError, Result};
pub use header::{Header, HeaderCarrier};
pub use status::Status;
