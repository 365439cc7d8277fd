//! mDNS provider advertisement and browsing
//!
//! Providers announce themselves with mDNS (multicast DNS) so callers on the
//! local network can discover them without a central registry.
//!
//! Service type: `_beacon-transients._tcp.local.`
//! Instance name: `{identity}-{service_slug}`
//!
//! TXT records:
//! - `version`: Crate version
//! - `service`: Resource name of the served service
//! - `provider`: Provider identity

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, PoisonError};

use indexmap::IndexMap;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::sync::RwLock;

use super::{Provider, Registry};
use crate::{Error, Result};

/// mDNS service type for beacon transient providers
pub const SERVICE_TYPE: &str = "_beacon-transients._tcp.local.";

/// Browsed providers keyed by mDNS fullname, in resolution order
type ProviderTable = IndexMap<String, (String, Provider)>;

/// Instance label derived from a resource name (`/add_two_ints` -> `add-two-ints`)
fn service_slug(service: &str) -> String {
    let slug: String = service
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    slug.trim_matches('-').to_string()
}

/// mDNS advertiser for service providers
pub struct MdnsAdvertiser {
    /// mDNS daemon
    daemon: ServiceDaemon,

    /// Fullnames of currently registered services
    registered: Arc<RwLock<Vec<String>>>,
}

impl MdnsAdvertiser {
    /// Create a new mDNS advertiser
    ///
    /// # Errors
    ///
    /// Returns error if mDNS daemon cannot be created
    pub fn new() -> Result<Self> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| Error::Discovery(format!("failed to create mDNS daemon: {e}")))?;

        Ok(Self {
            daemon,
            registered: Arc::new(RwLock::new(Vec::new())),
        })
    }

    /// Start advertising one provider of `service`
    ///
    /// # Errors
    ///
    /// Returns error if service cannot be registered
    pub async fn advertise(&self, service: &str, identity: &str, port: u16) -> Result<()> {
        let instance_name = format!("{identity}-{}", service_slug(service));

        let hostname = hostname::get()
            .map_or_else(|_| "beacon".to_string(), |h| h.to_string_lossy().to_string());

        let mut properties = HashMap::new();
        properties.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());
        properties.insert("service".to_string(), service.to_string());
        properties.insert("provider".to_string(), identity.to_string());

        let info = ServiceInfo::new(
            SERVICE_TYPE,
            &instance_name,
            &format!("{hostname}.local."),
            "",
            port,
            properties,
        )
        .map_err(|e| Error::Discovery(format!("failed to create service info: {e}")))?
        .enable_addr_auto();

        let fullname = info.get_fullname().to_string();

        self.daemon
            .register(info)
            .map_err(|e| Error::Discovery(format!("failed to register mDNS service: {e}")))?;

        self.registered.write().await.push(fullname);

        tracing::info!(
            service_type = SERVICE_TYPE,
            instance = instance_name,
            service,
            port,
            "provider advertised"
        );

        Ok(())
    }

    /// Stop advertising every registered provider
    pub async fn stop(&self) {
        let names = std::mem::take(&mut *self.registered.write().await);

        for name in names {
            if let Err(e) = self.daemon.unregister(&name) {
                tracing::warn!(error = %e, name, "failed to unregister mDNS service");
            } else {
                tracing::info!(name, "mDNS service unregistered");
            }
        }
    }

    /// Check if currently advertising
    pub async fn is_advertising(&self) -> bool {
        !self.registered.read().await.is_empty()
    }
}

impl Drop for MdnsAdvertiser {
    fn drop(&mut self) {
        // Best effort, synchronous
        if let Ok(guard) = self.registered.try_read() {
            for name in guard.iter() {
                let _ = self.daemon.unregister(name);
            }
        }
        if let Err(e) = self.daemon.shutdown() {
            tracing::trace!(error = %e, "mDNS daemon shutdown error (expected on normal exit)");
        }
    }
}

/// Registry fed by browsing mDNS announcements
pub struct MdnsRegistry {
    daemon: ServiceDaemon,
    table: Arc<std::sync::RwLock<ProviderTable>>,
}

impl MdnsRegistry {
    /// Start browsing for providers
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the mDNS daemon cannot be created or browsing fails
    pub fn new() -> Result<Self> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| Error::Discovery(format!("failed to create mDNS daemon: {e}")))?;
        let events = daemon
            .browse(SERVICE_TYPE)
            .map_err(|e| Error::Discovery(format!("failed to browse {SERVICE_TYPE}: {e}")))?;

        let table: Arc<std::sync::RwLock<ProviderTable>> = Arc::default();
        let sink = Arc::clone(&table);

        // The receiver is blocking; it returns an error once the daemon shuts down
        tokio::task::spawn_blocking(move || {
            while let Ok(event) = events.recv() {
                apply_event(&sink, event);
            }
            tracing::debug!("mDNS browse ended");
        });

        Ok(Self { daemon, table })
    }
}

fn apply_event(table: &std::sync::RwLock<ProviderTable>, event: ServiceEvent) {
    match event {
        ServiceEvent::ServiceResolved(info) => {
            let Some(service) = info.get_property_val_str("service") else {
                tracing::debug!(fullname = info.get_fullname(), "announcement without service record");
                return;
            };
            let Some(ip) = info.get_addresses().iter().next().copied() else {
                return;
            };
            let identity = info
                .get_property_val_str("provider")
                .unwrap_or_else(|| info.get_fullname())
                .to_string();
            let address = SocketAddr::new(IpAddr::from(ip), info.get_port()).to_string();

            tracing::debug!(service, identity = %identity, address = %address, "provider resolved");
            table.write().unwrap_or_else(PoisonError::into_inner).insert(
                info.get_fullname().to_string(),
                (service.to_string(), Provider { identity, address }),
            );
        }
        ServiceEvent::ServiceRemoved(_, fullname) => {
            if table
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .shift_remove(&fullname)
                .is_some()
            {
                tracing::debug!(fullname, "provider removed");
            }
        }
        _ => {}
    }
}

#[async_trait::async_trait]
impl Registry for MdnsRegistry {
    async fn list_providers(&self, name: &str) -> Vec<Provider> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|(service, _)| service == name)
            .map(|(_, provider)| provider.clone())
            .collect()
    }
}

impl Drop for MdnsRegistry {
    fn drop(&mut self) {
        let _ = self.daemon.stop_browse(SERVICE_TYPE);
        if let Err(e) = self.daemon.shutdown() {
            tracing::trace!(error = %e, "mDNS daemon shutdown error (expected on normal exit)");
        }
    }
}
