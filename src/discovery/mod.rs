//! Service discovery
//!
//! [`DiscoveryClient`] polls a [`Registry`] until enough providers for a
//! name show up or the timeout runs out. Polling is deliberate: registries
//! need no push primitive, and worst-case latency is one poll interval.

pub mod mdns;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

pub use mdns::{MdnsAdvertiser, MdnsRegistry};
pub use memory::MemoryRegistry;

/// Default delay between two registry polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// One endpoint able to answer calls for a service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provider {
    /// Identity of the node hosting the endpoint
    pub identity: String,
    /// Transport address (e.g. `127.0.0.1:40123`)
    pub address: String,
}

impl Provider {
    pub fn new(identity: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            address: address.into(),
        }
    }
}

/// Providers found for a name, in discovery order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSet {
    pub name: String,
    pub providers: Vec<Provider>,
}

impl ProviderSet {
    pub fn new(name: impl Into<String>, providers: Vec<Provider>) -> Self {
        Self {
            name: name.into(),
            providers,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Providers matching `identity`, or all of them when `None`
    pub fn matching<'a>(&'a self, identity: Option<&'a str>) -> impl Iterator<Item = &'a Provider> {
        self.providers
            .iter()
            .filter(move |p| identity.is_none_or(|id| p.identity == id))
    }
}

/// Source of provider lists
#[async_trait]
pub trait Registry: Send + Sync {
    /// Providers currently registered for `name`; empty when none (yet)
    async fn list_providers(&self, name: &str) -> Vec<Provider>;
}

/// Polls a registry for providers of a name
#[derive(Clone)]
pub struct DiscoveryClient {
    registry: Arc<dyn Registry>,
    poll_interval: Duration,
}

impl DiscoveryClient {
    #[must_use]
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self {
            registry,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait for at least `minimum_providers` providers of `name`
    ///
    /// `timeout` of `None` or zero polls exactly once. Elapsed time is
    /// measured on the monotonic clock.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] once the timeout elapsed without enough providers
    /// - [`Error::Cancelled`] as soon as `cancel` fires
    pub async fn discover(
        &self,
        name: &str,
        timeout: Option<Duration>,
        minimum_providers: usize,
        cancel: &CancellationToken,
    ) -> Result<ProviderSet> {
        let budget = timeout.unwrap_or(Duration::ZERO);
        let minimum = minimum_providers.max(1);
        let start = Instant::now();
        let mut polls: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let providers = self.registry.list_providers(name).await;
            polls += 1;
            if providers.len() >= minimum {
                tracing::debug!(name, providers = providers.len(), polls, "discovered");
                return Ok(ProviderSet::new(name, providers));
            }

            let elapsed = start.elapsed();
            if elapsed >= budget {
                tracing::debug!(
                    name,
                    found = providers.len(),
                    minimum,
                    polls,
                    elapsed_ms = elapsed.as_millis(),
                    "discovery timed out"
                );
                return Err(Error::NotFound(name.to_string()));
            }

            let wait = self.poll_interval.min(budget - elapsed);
            tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(wait) => {}
            }
        }
    }
}
