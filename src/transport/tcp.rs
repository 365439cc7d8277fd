//! TCP transport
//!
//! Every matching provider address is dialled at once. Whichever provider
//! completes the greeting first carries the request; the other attempts are
//! dropped with the connection.

use async_trait::async_trait;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout_at};

use super::{Connection, DEFAULT_MAX_FRAME_BYTES, Envelope, Frame, Transport, read_frame, write_frame};
use crate::{Error, Result};

type Attempt = BoxFuture<'static, (String, Result<TcpStream>)>;

/// Transport over plain TCP
#[derive(Debug, Clone)]
pub struct TcpTransport {
    max_frame_bytes: usize,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl TcpTransport {
    #[must_use]
    pub const fn new(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }

    /// Start dialling every address without waiting for any of them
    #[must_use]
    pub fn dial(&self, addresses: &[String]) -> TcpConnection {
        let pending = addresses
            .iter()
            .map(|address| -> Attempt { Box::pin(handshake(address.clone(), self.max_frame_bytes)) })
            .collect();

        TcpConnection {
            pending,
            active: None,
            max_frame_bytes: self.max_frame_bytes,
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, addresses: &[String]) -> Result<Box<dyn Connection>> {
        Ok(Box::new(self.dial(addresses)))
    }
}

async fn handshake(address: String, max_frame_bytes: usize) -> (String, Result<TcpStream>) {
    let result = open(&address, max_frame_bytes).await;
    (address, result)
}

/// Connect and wait for the provider greeting
async fn open(address: &str, max_frame_bytes: usize) -> Result<TcpStream> {
    let mut stream = TcpStream::connect(address).await?;
    stream.set_nodelay(true)?;
    match read_frame(&mut stream, max_frame_bytes).await? {
        Frame::Ready { provider } => {
            tracing::trace!(address, provider = %provider, "provider ready");
            Ok(stream)
        }
        other => Err(Error::Protocol(format!(
            "expected greeting, got {other:?}"
        ))),
    }
}

/// Connection racing several providers
pub struct TcpConnection {
    pending: FuturesUnordered<Attempt>,
    active: Option<(String, TcpStream)>,
    max_frame_bytes: usize,
}

impl TcpConnection {
    /// Address of the provider that won the race, once one did
    #[must_use]
    pub fn peer(&self) -> Option<&str> {
        self.active.as_ref().map(|(address, _)| address.as_str())
    }

    /// Wait for the first provider to greet us, until `deadline`
    async fn ensure_ready(&mut self, deadline: Instant) -> bool {
        while self.active.is_none() {
            match timeout_at(deadline, self.pending.next()).await {
                Ok(Some((address, Ok(stream)))) => self.active = Some((address, stream)),
                Ok(Some((address, Err(e)))) => {
                    tracing::debug!(address = %address, error = %e, "connection attempt failed");
                }
                // every attempt failed, or the deadline passed
                Ok(None) | Err(_) => return false,
            }
        }
        true
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn try_send(&mut self, envelope: &Envelope, deadline: Instant) -> Result<bool> {
        let frame = Frame::Request(envelope.clone());
        // a provider that fails the write makes way for the next one to greet us
        while self.ensure_ready(deadline).await {
            let Some((address, stream)) = self.active.as_mut() else {
                return Ok(false);
            };

            let written = timeout_at(deadline, write_frame(stream, &frame)).await;
            match written {
                Ok(Ok(())) => return Ok(true),
                Ok(Err(Error::Io(e))) => {
                    // a partial frame is never decoded by the provider
                    tracing::debug!(address = %address, error = %e, "send failed");
                    self.active = None;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    tracing::debug!(address = %address, "send stalled past deadline");
                    self.active = None;
                    return Ok(false);
                }
            }
        }
        Ok(false)
    }

    async fn try_recv(&mut self, deadline: Instant) -> Result<Option<Envelope>> {
        let max_frame_bytes = self.max_frame_bytes;
        let Some((address, stream)) = self.active.as_mut() else {
            return Ok(None);
        };

        let read = timeout_at(deadline, read_frame(stream, max_frame_bytes)).await;
        match read {
            Err(_) => Ok(None),
            Ok(Ok(Frame::Response(envelope))) => Ok(Some(envelope)),
            Ok(Ok(Frame::Failure { resource, message })) => {
                Err(Error::Remote(format!("{resource}: {message}")))
            }
            Ok(Ok(other)) => Err(Error::Protocol(format!(
                "expected response, got {other:?}"
            ))),
            Ok(Err(Error::Io(e))) => {
                tracing::debug!(address = %address, error = %e, "provider went away before replying");
                self.active = None;
                Ok(None)
            }
            Ok(Err(e)) => Err(e),
        }
    }
}
