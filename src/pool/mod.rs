//! Transient resource pools
//!
//! A pool tracks three views of one resource category:
//! - requested: names the owner wants exposed, with constructor arguments
//! - available: names currently visible in the host system (replaced wholesale per pass)
//! - exposed: live resource objects instantiated locally
//!
//! The pool is synchronous and performs no network I/O. Concrete resource
//! objects come from a [`TransientAdapter`] supplied per category.

pub mod transient;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub use transient::{AvailableView, TransientPool};

/// Globally unique name of a topic, service or parameter. Compared verbatim.
pub type ResourceName = String;

/// Opaque descriptor of a resource's payload schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceType(String);

impl ResourceType {
    /// Wrap a type descriptor
    #[must_use]
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self(descriptor.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Host-system binding for one resource category
///
/// Implementations translate names into live resource handles for one
/// middleware. All hooks take `&self`; adapters keep their own state behind
/// whatever synchronization they need.
pub trait TransientAdapter {
    /// Live resource handle created for an exposed name
    type Resource;

    /// Constructor arguments stored alongside a requested name
    type Args: Clone + Default;

    /// Names currently visible in the host system
    fn list_current_names(&self) -> BTreeSet<ResourceName>;

    /// Resolve the type of a name, `None` when it is unknown (yet)
    fn resolve_type(&self, name: &str) -> Option<ResourceType>;

    /// Build a live resource
    ///
    /// # Errors
    ///
    /// Returns error if the host system refuses to create the resource
    fn construct(
        &self,
        name: &str,
        resource_type: &ResourceType,
        args: &Self::Args,
    ) -> anyhow::Result<Self::Resource>;

    /// Tear down a live resource
    fn destroy(&self, name: &str, resource: Self::Resource);
}

/// Raw difference between two availability snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    /// Names in the new snapshot but not the previous one
    pub appeared: BTreeSet<ResourceName>,
    /// Names in the previous snapshot but not the new one
    pub gone: BTreeSet<ResourceName>,
}

impl Changes {
    /// Compute `appeared = current - previous`, `gone = previous - current`
    #[must_use]
    pub fn between(previous: &BTreeSet<ResourceName>, current: &BTreeSet<ResourceName>) -> Self {
        Self {
            appeared: current.difference(previous).cloned().collect(),
            gone: previous.difference(current).cloned().collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.appeared.is_empty() && self.gone.is_empty()
    }
}

/// The part of [`Changes`] that affects what should be exposed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExposureDiff {
    /// Appeared names that are requested
    pub to_add: BTreeSet<ResourceName>,
    /// Gone names that are currently exposed
    pub to_remove: BTreeSet<ResourceName>,
}

/// Outcome of one `update`
#[derive(Debug, Default)]
pub struct UpdateReport {
    /// Names newly exposed
    pub added: BTreeSet<ResourceName>,
    /// Names cleaned
    pub removed: BTreeSet<ResourceName>,
    /// Per-name construction failures; the rest of the pass still ran
    pub failures: BTreeMap<ResourceName, Error>,
}

impl UpdateReport {
    /// Whether anything was exposed or cleaned
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    /// Whether every construction succeeded
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of a full reconciliation pass on one pool
#[derive(Debug, Default)]
pub struct PassReport {
    pub changes: Changes,
    pub update: UpdateReport,
}

/// Name-level operations shared by every pool regardless of resource type
///
/// This is the object-safe face of [`TransientPool`], letting callers drive
/// pools of different categories through one code path.
pub trait TransientSet {
    /// Label used in logs (e.g. "services")
    fn label(&self) -> &str;

    /// Last stored availability snapshot
    fn list_available(&self) -> Arc<BTreeSet<ResourceName>>;

    /// Fresh snapshot of names from the host system
    fn list_current_names(&self) -> BTreeSet<ResourceName>;

    /// Resolve a name's type through the adapter
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the adapter cannot resolve the name
    fn resolve_type(&self, name: &str) -> Result<ResourceType>;

    /// Request every available name matching `pattern`, returning the matches
    fn expose_matching(&mut self, pattern: &Regex) -> BTreeSet<ResourceName>;

    /// Stop requesting a name. Exposure is removed on the next pass.
    fn withdraw(&mut self, name: &str) -> bool;

    /// Names currently requested
    fn requested_names(&self) -> BTreeSet<ResourceName>;

    /// Names currently exposed
    fn exposed_names(&self) -> BTreeSet<ResourceName>;

    /// Diff a snapshot against the stored availability without storing it
    fn change_detect(&self, snapshot: &BTreeSet<ResourceName>) -> Changes;

    /// Filter raw changes down to exposure changes
    fn change_diff(&self, changes: &Changes) -> ExposureDiff;

    /// Expose `add` and clean `remove`. A name in both is removed.
    fn update(
        &mut self,
        add: &BTreeSet<ResourceName>,
        remove: &BTreeSet<ResourceName>,
    ) -> UpdateReport;

    /// Store `snapshot` as the new availability and bring exposure in line
    fn reconcile(&mut self, snapshot: BTreeSet<ResourceName>) -> PassReport;

    /// Clean every exposed resource, returning how many were cleaned
    fn clear(&mut self) -> usize;

    /// Request every available name matching a regex pattern
    ///
    /// # Errors
    ///
    /// Returns error if the pattern does not compile
    fn expose_by_pattern(&mut self, pattern: &str) -> Result<BTreeSet<ResourceName>> {
        let re = Regex::new(pattern)?;
        Ok(self.expose_matching(&re))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> BTreeSet<ResourceName> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn changes_between_snapshots() {
        let changes = Changes::between(&names(&["a", "b"]), &names(&["b", "c"]));
        assert_eq!(changes.appeared, names(&["c"]));
        assert_eq!(changes.gone, names(&["a"]));
    }

    #[test]
    fn identical_snapshots_have_no_changes() {
        let snap = names(&["a", "b"]);
        assert!(Changes::between(&snap, &snap).is_empty());
    }

    #[test]
    fn resource_type_is_transparent_in_json() {
        let ty = ResourceType::new("std_msgs/String");
        assert_eq!(serde_json::to_string(&ty).unwrap(), "\"std_msgs/String\"");
        assert_eq!(ty.to_string(), "std_msgs/String");
    }
}
