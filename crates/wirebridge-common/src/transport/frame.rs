use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{BridgeError, Result};
use crate::transport::codec::PostcardCodec;

/// Maximum packet size (100 MB)
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// One request or reply on a connection.
///
/// `body` holds a codec-encoded [`Envelope`](crate::protocol::Envelope); the
/// packet itself is always postcard so that framing does not depend on the
/// configured payload codec. An empty body is a valid "no body" request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Packet {
    pub method: String,
    pub body: Vec<u8>,
}

impl Packet {
    pub fn new(method: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: method.into(),
            body,
        }
    }
}

/// Writes a packet with length prefix.
///
/// Wire format: `[4-byte length as u32 big-endian] + [postcard packet]`
pub async fn write_packet<W>(stream: &mut W, packet: &Packet) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let encoded = PostcardCodec::encode(packet)?;
    if encoded.len() > MAX_MESSAGE_SIZE {
        tracing::warn!(
            method = %packet.method,
            size = encoded.len(),
            "refusing to write oversized packet"
        );
        return Err(BridgeError::InvalidRequest(format!(
            "Message too large: {} bytes (max {} bytes)",
            encoded.len(),
            MAX_MESSAGE_SIZE
        )));
    }

    let len = encoded.len() as u32;
    stream
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| map_io_error(e, "writing length prefix"))?;
    stream
        .write_all(&encoded)
        .await
        .map_err(|e| map_io_error(e, "writing data"))?;
    stream
        .flush()
        .await
        .map_err(|e| map_io_error(e, "flushing stream"))?;

    Ok(())
}

/// Reads a length-prefixed packet.
///
/// Returns `Ok(None)` when the peer closed the connection cleanly before a
/// new packet started.
pub async fn read_packet<R>(stream: &mut R) -> Result<Option<Packet>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(map_io_error(e, "reading length prefix")),
    }

    let len = u32::from_be_bytes(len_buf) as usize;

    // Validate length to prevent allocation of excessively large buffers
    if len > MAX_MESSAGE_SIZE {
        tracing::warn!(size = len, "rejecting oversized packet");
        return Err(BridgeError::Codec(format!(
            "Message too large: {} bytes (max {} bytes)",
            len, MAX_MESSAGE_SIZE
        )));
    }

    let mut buf = vec![0u8; len];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|e| map_io_error(e, "reading data"))?;

    Ok(Some(PostcardCodec::decode(&buf)?))
}

/// Map IO errors to appropriate BridgeError variants
///
/// - Connection errors -> `Connection`
/// - Other IO errors -> `Io`
fn map_io_error(err: std::io::Error, context: &str) -> BridgeError {
    match err.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::UnexpectedEof => {
            BridgeError::Connection(format!("{}: Connection lost", context))
        }
        _ => BridgeError::Io(err),
    }
}
