//! Provider side of the transport
//!
//! A [`ServiceHost`] accepts connections for one service name, greets each
//! one with [`Frame::Ready`] and answers requests through a
//! [`ServiceHandler`] until cancelled.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::sync::CancellationToken;

use super::{DEFAULT_MAX_FRAME_BYTES, Envelope, Frame, read_frame, write_frame};
use crate::discovery::Provider;
use crate::{Error, Result};

/// Answers requests for one service
#[async_trait]
pub trait ServiceHandler: Send + Sync + 'static {
    /// Produce the response body for a request body
    ///
    /// # Errors
    ///
    /// A failure is reported back to the caller as a remote error
    async fn handle(&self, request: Value) -> anyhow::Result<Value>;
}

/// Handler returning the request unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

#[async_trait]
impl ServiceHandler for EchoHandler {
    async fn handle(&self, request: Value) -> anyhow::Result<Value> {
        Ok(request)
    }
}

/// Listener serving one named service
pub struct ServiceHost {
    service: String,
    identity: String,
    listener: TcpListener,
    max_frame_bytes: usize,
}

impl ServiceHost {
    /// Bind a listener for `service`
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound
    pub async fn bind(
        service: impl Into<String>,
        identity: impl Into<String>,
        addr: impl ToSocketAddrs,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            service: service.into(),
            identity: identity.into(),
            listener,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        })
    }

    #[must_use]
    pub const fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    /// Address the listener is bound to
    ///
    /// # Errors
    ///
    /// Returns error if the socket address cannot be read
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Registry entry describing this host
    ///
    /// # Errors
    ///
    /// Returns error if the socket address cannot be read
    pub fn provider(&self) -> Result<Provider> {
        Ok(Provider::new(
            self.identity.clone(),
            self.local_addr()?.to_string(),
        ))
    }

    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Accept and serve connections until `cancel` fires
    ///
    /// # Errors
    ///
    /// Returns error if accepting fails
    pub async fn serve(self, handler: Arc<dyn ServiceHandler>, cancel: CancellationToken) -> Result<()> {
        let service: Arc<str> = Arc::from(self.service.as_str());
        let identity: Arc<str> = Arc::from(self.identity.as_str());

        tracing::info!(
            service = %service,
            identity = %identity,
            address = %self.listener.local_addr()?,
            "service host listening"
        );

        loop {
            let (stream, peer) = tokio::select! {
                () = cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted?,
            };
            tracing::debug!(service = %service, peer = %peer, "connection accepted");

            let session = Session {
                service: Arc::clone(&service),
                identity: Arc::clone(&identity),
                handler: Arc::clone(&handler),
                max_frame_bytes: self.max_frame_bytes,
            };
            let cancel = cancel.child_token();
            tokio::spawn(async move {
                tokio::select! {
                    () = cancel.cancelled() => {}
                    result = session.run(stream) => {
                        if let Err(e) = result {
                            tracing::debug!(peer = %peer, error = %e, "connection ended");
                        }
                    }
                }
            });
        }

        tracing::info!(service = %service, "service host stopped");
        Ok(())
    }
}

/// One accepted connection
struct Session {
    service: Arc<str>,
    identity: Arc<str>,
    handler: Arc<dyn ServiceHandler>,
    max_frame_bytes: usize,
}

impl Session {
    async fn run(self, mut stream: TcpStream) -> Result<()> {
        stream.set_nodelay(true)?;
        write_frame(
            &mut stream,
            &Frame::Ready {
                provider: self.identity.to_string(),
            },
        )
        .await?;

        loop {
            let frame = match read_frame(&mut stream, self.max_frame_bytes).await {
                Ok(frame) => frame,
                Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(e),
            };

            let Frame::Request(envelope) = frame else {
                return Err(Error::Protocol(format!("expected request, got {frame:?}")));
            };

            let reply = self.answer(envelope).await;
            write_frame(&mut stream, &reply).await?;
        }
    }

    async fn answer(&self, envelope: Envelope) -> Frame {
        if envelope.resource != *self.service {
            tracing::warn!(
                service = %self.service,
                requested = %envelope.resource,
                "request for a service not hosted here"
            );
            return Frame::Failure {
                resource: envelope.resource,
                message: format!("not serving this resource (serving {})", self.service),
            };
        }

        match self.handler.handle(envelope.body).await {
            Ok(body) => Frame::Response(Envelope::new(envelope.resource, body)),
            Err(e) => {
                tracing::warn!(service = %self.service, error = %e, "handler failed");
                Frame::Failure {
                    resource: envelope.resource,
                    message: e.to_string(),
                }
            }
        }
    }
}
