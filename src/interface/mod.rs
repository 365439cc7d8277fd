//! Resource interface: four transient pools behind one reconciliation entry point
//!
//! The interface owns one [`TransientPool`] per [`Category`] and forwards
//! category-level operations uniformly. [`ResourceInterface::reconcile_all`]
//! snapshots every category from the host before touching any pool, so all
//! four pools in one tick are reconciled against the same moment.

pub mod factory;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::pool::{
    Changes, ExposureDiff, PassReport, ResourceName, ResourceType, TransientAdapter, TransientPool,
    TransientSet, UpdateReport,
};
use crate::{Error, Result};

pub use factory::{InterfaceFactories, InterfaceFactory};

/// Resource category handled by one pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Publishers,
    Subscribers,
    Services,
    Params,
}

impl Category {
    /// Every category in reconciliation order
    pub const ALL: [Self; 4] = [
        Self::Publishers,
        Self::Subscribers,
        Self::Services,
        Self::Params,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Publishers => "publishers",
            Self::Subscribers => "subscribers",
            Self::Services => "services",
            Self::Params => "params",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "publishers" | "publisher" | "pub" => Ok(Self::Publishers),
            "subscribers" | "subscriber" | "sub" => Ok(Self::Subscribers),
            "services" | "service" | "srv" => Ok(Self::Services),
            "params" | "param" => Ok(Self::Params),
            other => Err(Error::Config(format!("unknown resource category: {other}"))),
        }
    }
}

/// Binds one adapter type to each category of a host system
pub trait Host {
    type Publishers: TransientAdapter;
    type Subscribers: TransientAdapter;
    type Services: TransientAdapter;
    type Params: TransientAdapter;
}

/// Per-category results of one reconciliation tick
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub passes: BTreeMap<Category, PassReport>,
}

impl ReconcileReport {
    /// Whether any category exposed or cleaned something
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.passes.values().any(|p| p.update.has_changes())
    }

    /// Construction failures across all categories
    pub fn failures(&self) -> impl Iterator<Item = (Category, &ResourceName, &Error)> {
        self.passes.iter().flat_map(|(category, pass)| {
            pass.update
                .failures
                .iter()
                .map(move |(name, e)| (*category, name, e))
        })
    }

    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.passes.values().map(|p| p.update.failures.len()).sum()
    }
}

/// Four transient pools, one per [`Category`]
pub struct ResourceInterface<H: Host> {
    publishers: TransientPool<H::Publishers>,
    subscribers: TransientPool<H::Subscribers>,
    services: TransientPool<H::Services>,
    params: TransientPool<H::Params>,
}

impl<H: Host> ResourceInterface<H> {
    /// Build an interface from one adapter per category
    pub fn new(
        publishers: H::Publishers,
        subscribers: H::Subscribers,
        services: H::Services,
        params: H::Params,
    ) -> Self {
        Self {
            publishers: TransientPool::new(Category::Publishers.as_str(), publishers),
            subscribers: TransientPool::new(Category::Subscribers.as_str(), subscribers),
            services: TransientPool::new(Category::Services.as_str(), services),
            params: TransientPool::new(Category::Params.as_str(), params),
        }
    }

    pub const fn publishers(&self) -> &TransientPool<H::Publishers> {
        &self.publishers
    }

    pub const fn publishers_mut(&mut self) -> &mut TransientPool<H::Publishers> {
        &mut self.publishers
    }

    pub const fn subscribers(&self) -> &TransientPool<H::Subscribers> {
        &self.subscribers
    }

    pub const fn subscribers_mut(&mut self) -> &mut TransientPool<H::Subscribers> {
        &mut self.subscribers
    }

    pub const fn services(&self) -> &TransientPool<H::Services> {
        &self.services
    }

    pub const fn services_mut(&mut self) -> &mut TransientPool<H::Services> {
        &mut self.services
    }

    pub const fn params(&self) -> &TransientPool<H::Params> {
        &self.params
    }

    pub const fn params_mut(&mut self) -> &mut TransientPool<H::Params> {
        &mut self.params
    }

    /// Name-level view of one category's pool
    #[must_use]
    pub fn pool(&self, category: Category) -> &dyn TransientSet {
        match category {
            Category::Publishers => &self.publishers,
            Category::Subscribers => &self.subscribers,
            Category::Services => &self.services,
            Category::Params => &self.params,
        }
    }

    pub fn pool_mut(&mut self, category: Category) -> &mut dyn TransientSet {
        match category {
            Category::Publishers => &mut self.publishers,
            Category::Subscribers => &mut self.subscribers,
            Category::Services => &mut self.services,
            Category::Params => &mut self.params,
        }
    }

    #[must_use]
    pub fn list_available(&self, category: Category) -> Arc<BTreeSet<ResourceName>> {
        self.pool(category).list_available()
    }

    /// Resolve a name's type in one category
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the name cannot be resolved
    pub fn resolve_type(&self, category: Category, name: &str) -> Result<ResourceType> {
        self.pool(category).resolve_type(name)
    }

    /// Request every available name in `category` matching `pattern`
    ///
    /// # Errors
    ///
    /// Returns error if the pattern does not compile
    pub fn expose(&mut self, category: Category, pattern: &str) -> Result<BTreeSet<ResourceName>> {
        self.pool_mut(category).expose_by_pattern(pattern)
    }

    /// Diff the host's current names against the stored snapshot
    #[must_use]
    pub fn change_detect(&self, category: Category) -> Changes {
        let pool = self.pool(category);
        pool.change_detect(&pool.list_current_names())
    }

    #[must_use]
    pub fn change_diff(&self, category: Category, changes: &Changes) -> ExposureDiff {
        self.pool(category).change_diff(changes)
    }

    pub fn update(
        &mut self,
        category: Category,
        add: &BTreeSet<ResourceName>,
        remove: &BTreeSet<ResourceName>,
    ) -> UpdateReport {
        self.pool_mut(category).update(add, remove)
    }

    #[must_use]
    pub fn exposed_names(&self, category: Category) -> BTreeSet<ResourceName> {
        self.pool(category).exposed_names()
    }

    /// One reconciliation tick over all four categories
    ///
    /// Snapshots are collected for every category first, then applied.
    pub fn reconcile_all(&mut self) -> ReconcileReport {
        let snapshots: Vec<(Category, BTreeSet<ResourceName>)> = Category::ALL
            .into_iter()
            .map(|category| (category, self.pool(category).list_current_names()))
            .collect();

        let mut report = ReconcileReport::default();
        for (category, snapshot) in snapshots {
            let pass = self.pool_mut(category).reconcile(snapshot);
            report.passes.insert(category, pass);
        }
        report
    }

    /// Clean every exposed resource in every category
    pub fn shutdown(&mut self) -> usize {
        let cleaned = Category::ALL
            .into_iter()
            .map(|category| self.pool_mut(category).clear())
            .sum();
        tracing::debug!(cleaned, "interface shut down");
        cleaned
    }
}
