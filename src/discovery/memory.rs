//! In-process provider registry
//!
//! An explicit registry instance shared by the providers and callers living
//! in one process (tests, demos, embedded nodes).

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::{Provider, Registry};

/// Registry of providers keyed by service name
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    services: RwLock<HashMap<String, Vec<Provider>>>,
}

impl MemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider for a service
    ///
    /// A provider with the same identity is replaced in place, keeping its
    /// position in discovery order.
    pub fn register(&self, service: &str, provider: Provider) {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        let providers = services.entry(service.to_string()).or_default();
        if let Some(existing) = providers
            .iter_mut()
            .find(|p| p.identity == provider.identity)
        {
            *existing = provider;
        } else {
            tracing::debug!(service, identity = %provider.identity, address = %provider.address, "provider registered");
            providers.push(provider);
        }
    }

    /// Remove a provider, returning whether it was registered
    pub fn unregister(&self, service: &str, identity: &str) -> bool {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        let Some(providers) = services.get_mut(service) else {
            return false;
        };
        let before = providers.len();
        providers.retain(|p| p.identity != identity);
        let removed = providers.len() != before;
        if providers.is_empty() {
            services.remove(service);
        }
        if removed {
            tracing::debug!(service, identity, "provider unregistered");
        }
        removed
    }

    /// Service names with at least one provider
    #[must_use]
    pub fn services(&self) -> Vec<String> {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = services.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn list_providers(&self, name: &str) -> Vec<Provider> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}
