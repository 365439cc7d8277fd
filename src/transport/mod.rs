//! Point-to-point request/response transport
//!
//! Frames are 4-byte big-endian length + JSON payload. A provider greets
//! each new connection with [`Frame::Ready`]; a connection is only writable
//! once that greeting arrived.

pub mod host;
pub mod tcp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::{Error, Result};

pub use host::{EchoHandler, ServiceHandler, ServiceHost};
pub use tcp::{TcpConnection, TcpTransport};

/// Upper bound on a single frame unless configured otherwise
pub const DEFAULT_MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Request or response body addressed to a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub resource: String,
    pub body: serde_json::Value,
}

impl Envelope {
    pub fn new(resource: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            resource: resource.into(),
            body,
        }
    }
}

/// Wire frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frame {
    /// Provider greeting, sent once per connection
    Ready { provider: String },
    Request(Envelope),
    Response(Envelope),
    /// Handler failure for a request
    Failure { resource: String, message: String },
}

/// Opens connections to a set of provider addresses
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start connecting to every address; the first provider ready serves the call
    ///
    /// # Errors
    ///
    /// Returns error if the transport cannot start connecting at all
    async fn connect(&self, addresses: &[String]) -> Result<Box<dyn Connection>>;
}

/// One in-flight request/response exchange
#[async_trait]
pub trait Connection: Send {
    /// Send once the connection is writable, giving up at `deadline`
    ///
    /// Returns false if nothing could be sent.
    ///
    /// # Errors
    ///
    /// Returns error if the envelope cannot be encoded
    async fn try_send(&mut self, envelope: &Envelope, deadline: Instant) -> Result<bool>;

    /// Wait for the response until `deadline`
    ///
    /// Returns `None` if nothing arrived.
    ///
    /// # Errors
    ///
    /// Returns error for malformed frames or a provider-side failure
    async fn try_recv(&mut self, deadline: Instant) -> Result<Option<Envelope>>;
}

/// Encode and write one frame
///
/// # Errors
///
/// Returns error if encoding or writing fails
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let payload = serde_json::to_vec(frame)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| Error::Protocol(format!("frame too large: {} bytes", payload.len())))?;

    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&payload);

    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read and decode one frame, rejecting frames over `max_size` bytes
///
/// # Errors
///
/// Returns error on I/O failure, oversized or undecodable frames
pub async fn read_frame<R>(reader: &mut R, max_size: usize) -> Result<Frame>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > max_size {
        return Err(Error::Protocol(format!(
            "frame too large: {len} > {max_size}"
        )));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(serde_json::from_slice(&buf)?)
}
