//! Generic transient pool: one instance per resource category

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use regex::Regex;

use super::{
    Changes, ExposureDiff, PassReport, ResourceName, ResourceType, TransientAdapter, TransientSet,
    UpdateReport,
};
use crate::{Error, Result};

/// Read-only handle on a pool's availability snapshot
///
/// Safe to hold on another thread while the owner reconciles: each load
/// observes either the previous or the next snapshot, never a mix.
#[derive(Debug, Clone)]
pub struct AvailableView {
    inner: Arc<ArcSwap<BTreeSet<ResourceName>>>,
}

impl AvailableView {
    /// Current snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<BTreeSet<ResourceName>> {
        self.inner.load_full()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.load().contains(name)
    }
}

/// Requested / available / exposed reconciliation for one category
pub struct TransientPool<A: TransientAdapter> {
    label: String,
    adapter: A,
    requested: BTreeMap<ResourceName, A::Args>,
    available: Arc<ArcSwap<BTreeSet<ResourceName>>>,
    exposed: BTreeMap<ResourceName, A::Resource>,
}

impl<A: TransientAdapter> TransientPool<A> {
    /// Create an empty pool around an adapter
    pub fn new(label: impl Into<String>, adapter: A) -> Self {
        Self {
            label: label.into(),
            adapter,
            requested: BTreeMap::new(),
            available: Arc::new(ArcSwap::from_pointee(BTreeSet::new())),
            exposed: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Handle for concurrent readers of the availability snapshot
    #[must_use]
    pub fn available_view(&self) -> AvailableView {
        AvailableView {
            inner: Arc::clone(&self.available),
        }
    }

    /// Ask for a name to be exposed whenever it is available
    ///
    /// Replaces the arguments if the name was already requested.
    pub fn request(&mut self, name: impl Into<ResourceName>, args: A::Args) {
        self.requested.insert(name.into(), args);
    }

    #[must_use]
    pub const fn requested(&self) -> &BTreeMap<ResourceName, A::Args> {
        &self.requested
    }

    #[must_use]
    pub const fn exposed(&self) -> &BTreeMap<ResourceName, A::Resource> {
        &self.exposed
    }

    /// Live resource for a name, if exposed
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&A::Resource> {
        self.exposed.get(name)
    }

    /// Construct and register one exposed resource
    ///
    /// An existing resource under the same name is replaced only once the
    /// new one is built, then destroyed. When construction fails nothing
    /// changes and the old resource stays exposed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Construction`] if the adapter fails
    pub fn make(
        &mut self,
        name: &str,
        resource_type: &ResourceType,
        args: &A::Args,
    ) -> Result<&A::Resource> {
        let resource = self
            .adapter
            .construct(name, resource_type, args)
            .map_err(|e| Error::Construction {
                name: name.to_string(),
                reason: format!("{e:#}"),
            })?;

        tracing::debug!(pool = %self.label, name, resource_type = %resource_type, "exposed");
        match self.exposed.entry(name.to_string()) {
            Entry::Vacant(entry) => Ok(entry.insert(resource)),
            Entry::Occupied(mut entry) => {
                let old = std::mem::replace(entry.get_mut(), resource);
                self.adapter.destroy(name, old);
                tracing::debug!(pool = %self.label, name, "replaced");
                Ok(entry.into_mut())
            }
        }
    }

    /// Destroy and deregister one exposed resource
    ///
    /// Returns false (and does nothing) when the name is not exposed.
    pub fn clean(&mut self, name: &str) -> bool {
        let Some(resource) = self.exposed.remove(name) else {
            return false;
        };
        self.adapter.destroy(name, resource);
        tracing::debug!(pool = %self.label, name, "cleaned");
        true
    }

    /// Arguments to construct `name` with, or `None` if the name must not be exposed
    fn args_for(&self, name: &str, available: &BTreeSet<ResourceName>) -> Option<A::Args> {
        self.requested
            .get(name)
            .cloned()
            .or_else(|| available.contains(name).then(A::Args::default))
    }
}

impl<A: TransientAdapter> TransientSet for TransientPool<A> {
    fn label(&self) -> &str {
        &self.label
    }

    fn list_available(&self) -> Arc<BTreeSet<ResourceName>> {
        self.available.load_full()
    }

    fn list_current_names(&self) -> BTreeSet<ResourceName> {
        self.adapter.list_current_names()
    }

    fn resolve_type(&self, name: &str) -> Result<ResourceType> {
        self.adapter
            .resolve_type(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    fn expose_matching(&mut self, pattern: &Regex) -> BTreeSet<ResourceName> {
        let matched: BTreeSet<ResourceName> = self
            .available
            .load()
            .iter()
            .filter(|name| pattern.is_match(name))
            .cloned()
            .collect();

        for name in &matched {
            self.requested.entry(name.clone()).or_default();
        }

        tracing::debug!(
            pool = %self.label,
            pattern = pattern.as_str(),
            matched = matched.len(),
            "requested by pattern"
        );
        matched
    }

    fn withdraw(&mut self, name: &str) -> bool {
        self.requested.remove(name).is_some()
    }

    fn requested_names(&self) -> BTreeSet<ResourceName> {
        self.requested.keys().cloned().collect()
    }

    fn exposed_names(&self) -> BTreeSet<ResourceName> {
        self.exposed.keys().cloned().collect()
    }

    fn change_detect(&self, snapshot: &BTreeSet<ResourceName>) -> Changes {
        Changes::between(&self.available.load(), snapshot)
    }

    fn change_diff(&self, changes: &Changes) -> ExposureDiff {
        ExposureDiff {
            to_add: changes
                .appeared
                .iter()
                .filter(|name| self.requested.contains_key(*name))
                .cloned()
                .collect(),
            to_remove: changes
                .gone
                .iter()
                .filter(|name| self.exposed.contains_key(*name))
                .cloned()
                .collect(),
        }
    }

    fn update(
        &mut self,
        add: &BTreeSet<ResourceName>,
        remove: &BTreeSet<ResourceName>,
    ) -> UpdateReport {
        let mut report = UpdateReport::default();

        for name in remove {
            if self.clean(name) {
                report.removed.insert(name.clone());
            }
        }

        let available = self.available.load_full();
        for name in add {
            if remove.contains(name) || self.exposed.contains_key(name) {
                continue;
            }
            let Some(args) = self.args_for(name, &available) else {
                tracing::debug!(pool = %self.label, name, "neither requested nor available, skipped");
                continue;
            };
            let Some(resource_type) = self.adapter.resolve_type(name) else {
                tracing::warn!(pool = %self.label, name, "type not resolvable yet");
                report.failures.insert(
                    name.clone(),
                    Error::Construction {
                        name: name.clone(),
                        reason: "type not resolvable".to_string(),
                    },
                );
                continue;
            };

            match self.make(name, &resource_type, &args) {
                Ok(_) => {
                    report.added.insert(name.clone());
                }
                Err(e) => {
                    tracing::warn!(pool = %self.label, name, error = %e, "construction failed");
                    report.failures.insert(name.clone(), e);
                }
            }
        }

        report
    }

    fn reconcile(&mut self, snapshot: BTreeSet<ResourceName>) -> PassReport {
        let changes = self.change_detect(&snapshot);
        let ExposureDiff {
            mut to_add,
            mut to_remove,
        } = self.change_diff(&changes);

        self.available.store(Arc::new(snapshot));
        let available = self.available.load_full();

        // Pending: requested and available but not exposed yet (late pattern
        // matches, earlier construction failures)
        to_add.extend(
            self.requested
                .keys()
                .filter(|name| available.contains(*name) && !self.exposed.contains_key(*name))
                .cloned(),
        );
        // Withdrawn
        to_remove.extend(
            self.exposed
                .keys()
                .filter(|name| !self.requested.contains_key(*name))
                .cloned(),
        );

        let update = self.update(&to_add, &to_remove);
        if update.has_changes() || !update.is_clean() {
            tracing::info!(
                pool = %self.label,
                added = update.added.len(),
                removed = update.removed.len(),
                failed = update.failures.len(),
                "reconciled"
            );
        }

        PassReport { changes, update }
    }

    fn clear(&mut self) -> usize {
        let names: Vec<ResourceName> = self.exposed.keys().cloned().collect();
        names.iter().filter(|name| self.clean(name)).count()
    }
}

impl<A: TransientAdapter> Drop for TransientPool<A> {
    fn drop(&mut self) {
        self.clear();
    }
}
