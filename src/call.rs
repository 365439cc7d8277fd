//! Bounded request/response calls against discovered providers
//!
//! A call has two independently bounded waits. The send wait covers
//! connecting and handing the request to a provider; hitting it means the
//! request never left. The receive wait starts once the request was sent;
//! hitting it leaves the outcome unknown.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::discovery::ProviderSet;
use crate::transport::{Envelope, TcpTransport, Transport};
use crate::{CallPhase, Error, Result};

/// Default bound on the send phase
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default bound on the receive phase
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_millis(5000);

/// Per-call options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOptions {
    /// Only call the provider with this identity
    pub target: Option<String>,
    pub send_timeout: Duration,
    pub recv_timeout: Duration,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            target: None,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
        }
    }
}

impl CallOptions {
    #[must_use]
    pub fn target(mut self, identity: impl Into<String>) -> Self {
        self.target = Some(identity.into());
        self
    }

    #[must_use]
    pub const fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }
}

/// Issues calls over a [`Transport`]
///
/// Holds no per-call state, so one client can serve concurrent callers.
#[derive(Clone)]
pub struct CallClient {
    transport: Arc<dyn Transport>,
}

impl Default for CallClient {
    fn default() -> Self {
        Self::tcp()
    }
}

impl CallClient {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Client over the default TCP transport
    #[must_use]
    pub fn tcp() -> Self {
        Self::new(Arc::new(TcpTransport::default()))
    }

    /// Send `request` to the providers in `providers` and wait for one response
    ///
    /// Every matching provider is connected to; the first one ready takes
    /// the request. The request is sent at most once.
    ///
    /// # Errors
    ///
    /// - [`Error::NoProvider`] without any network attempt when nothing matches
    /// - [`Error::Timeout`] with [`CallPhase::Send`] if the request was never sent
    /// - [`Error::Timeout`] with [`CallPhase::Recv`] if no response arrived in time
    /// - [`Error::Cancelled`] as soon as `cancel` fires
    /// - [`Error::Remote`] if the provider handler failed
    pub async fn call(
        &self,
        providers: &ProviderSet,
        request: Value,
        options: &CallOptions,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let addresses: Vec<String> = providers
            .matching(options.target.as_deref())
            .map(|p| p.address.clone())
            .collect();

        if addresses.is_empty() {
            tracing::debug!(
                name = %providers.name,
                target = ?options.target,
                "no eligible provider"
            );
            return Err(Error::NoProvider(providers.name.clone()));
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let envelope = Envelope::new(providers.name.clone(), request);
        let mut connection = self.transport.connect(&addresses).await?;

        let send_deadline = Instant::now() + options.send_timeout;
        let sent = tokio::select! {
            () = cancel.cancelled() => return Err(Error::Cancelled),
            sent = connection.try_send(&envelope, send_deadline) => sent?,
        };
        if !sent {
            tracing::debug!(
                name = %providers.name,
                providers = addresses.len(),
                timeout_ms = options.send_timeout.as_millis(),
                "call not sent"
            );
            return Err(Error::Timeout {
                phase: CallPhase::Send,
            });
        }

        let recv_deadline = Instant::now() + options.recv_timeout;
        let response = tokio::select! {
            () = cancel.cancelled() => return Err(Error::Cancelled),
            response = connection.try_recv(recv_deadline) => response?,
        };
        let Some(response) = response else {
            tracing::debug!(
                name = %providers.name,
                timeout_ms = options.recv_timeout.as_millis(),
                "call sent but no response"
            );
            return Err(Error::Timeout {
                phase: CallPhase::Recv,
            });
        };

        if response.resource != providers.name {
            return Err(Error::Protocol(format!(
                "response for {} while calling {}",
                response.resource, providers.name
            )));
        }
        Ok(response.body)
    }
}
