//! In-memory host system
//!
//! Stands in for a real middleware: names and types per category can be
//! added and removed at runtime, construction can be made to fail per name,
//! and every live resource is tracked so tests can check teardown.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::interface::{Category, Host, ResourceInterface};
use crate::pool::{ResourceName, ResourceType, TransientAdapter};

#[derive(Debug, Default)]
struct MockState {
    tables: HashMap<Category, BTreeMap<ResourceName, ResourceType>>,
    live: HashMap<Category, BTreeMap<ResourceName, usize>>,
    failing: HashSet<(Category, ResourceName)>,
}

/// Shared handle on an in-memory host system
#[derive(Debug, Clone, Default)]
pub struct MockSystem {
    state: Arc<RwLock<MockState>>,
}

impl MockSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MockState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MockState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make a name visible in the host
    pub fn add(&self, category: Category, name: &str, resource_type: &str) {
        self.write()
            .tables
            .entry(category)
            .or_default()
            .insert(name.to_string(), ResourceType::new(resource_type));
    }

    /// Make a name disappear from the host
    pub fn remove(&self, category: Category, name: &str) -> bool {
        self.write()
            .tables
            .get_mut(&category)
            .is_some_and(|t| t.remove(name).is_some())
    }

    /// Toggle injected construction failure for a name
    pub fn fail_construction(&self, category: Category, name: &str, fail: bool) {
        let key = (category, name.to_string());
        let mut state = self.write();
        if fail {
            state.failing.insert(key);
        } else {
            state.failing.remove(&key);
        }
    }

    /// Names with a live (constructed, not yet destroyed) resource
    #[must_use]
    pub fn live(&self, category: Category) -> BTreeSet<ResourceName> {
        self.read()
            .live
            .get(&category)
            .map(|live| live.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Adapter bound to one category of this system
    #[must_use]
    pub fn adapter(&self, category: Category) -> MockAdapter {
        MockAdapter {
            category,
            system: self.clone(),
        }
    }

    /// Interface over all four categories of this system
    #[must_use]
    pub fn interface(&self) -> ResourceInterface<MockHost> {
        ResourceInterface::new(
            self.adapter(Category::Publishers),
            self.adapter(Category::Subscribers),
            self.adapter(Category::Services),
            self.adapter(Category::Params),
        )
    }
}

/// Live resource created by a [`MockAdapter`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MockResource {
    pub category: Category,
    pub name: ResourceName,
    pub resource_type: ResourceType,
    pub args: serde_json::Value,
}

/// One category of a [`MockSystem`]
#[derive(Debug, Clone)]
pub struct MockAdapter {
    category: Category,
    system: MockSystem,
}

impl TransientAdapter for MockAdapter {
    type Resource = MockResource;
    type Args = serde_json::Value;

    fn list_current_names(&self) -> BTreeSet<ResourceName> {
        self.system
            .read()
            .tables
            .get(&self.category)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn resolve_type(&self, name: &str) -> Option<ResourceType> {
        self.system
            .read()
            .tables
            .get(&self.category)
            .and_then(|t| t.get(name).cloned())
    }

    fn construct(
        &self,
        name: &str,
        resource_type: &ResourceType,
        args: &serde_json::Value,
    ) -> anyhow::Result<MockResource> {
        let mut state = self.system.write();
        if state.failing.contains(&(self.category, name.to_string())) {
            anyhow::bail!("injected failure for {} {name}", self.category);
        }
        *state
            .live
            .entry(self.category)
            .or_default()
            .entry(name.to_string())
            .or_default() += 1;

        Ok(MockResource {
            category: self.category,
            name: name.to_string(),
            resource_type: resource_type.clone(),
            args: args.clone(),
        })
    }

    fn destroy(&self, name: &str, _resource: MockResource) {
        let mut state = self.system.write();
        let Some(live) = state.live.get_mut(&self.category) else {
            return;
        };
        if let Some(count) = live.get_mut(name) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                live.remove(name);
            }
        }
    }
}

/// [`Host`] whose four categories are all backed by [`MockAdapter`]
#[derive(Debug)]
pub enum MockHost {}

impl Host for MockHost {
    type Publishers = MockAdapter;
    type Subscribers = MockAdapter;
    type Services = MockAdapter;
    type Params = MockAdapter;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_sees_only_its_category() {
        let system = MockSystem::new();
        system.add(Category::Publishers, "/a", "T");
        system.add(Category::Services, "/s", "S");

        let pubs = system.adapter(Category::Publishers);
        assert_eq!(pubs.list_current_names().len(), 1);
        assert_eq!(pubs.resolve_type("/a"), Some(ResourceType::new("T")));
        assert_eq!(pubs.resolve_type("/s"), None);
    }

    #[test]
    fn construct_and_destroy_track_live_set() {
        let system = MockSystem::new();
        let adapter = system.adapter(Category::Params);
        let resource = adapter
            .construct("/p", &ResourceType::new("int"), &serde_json::json!(3))
            .unwrap();
        assert_eq!(resource.args, serde_json::json!(3));
        assert!(system.live(Category::Params).contains("/p"));

        adapter.destroy("/p", resource);
        assert!(system.live(Category::Params).is_empty());
    }

    #[test]
    fn name_stays_live_until_every_resource_is_destroyed() {
        let system = MockSystem::new();
        let adapter = system.adapter(Category::Services);
        let ty = ResourceType::new("S");
        let first = adapter.construct("/s", &ty, &serde_json::Value::Null).unwrap();
        let second = adapter.construct("/s", &ty, &serde_json::Value::Null).unwrap();

        adapter.destroy("/s", first);
        assert!(system.live(Category::Services).contains("/s"));
        adapter.destroy("/s", second);
        assert!(system.live(Category::Services).is_empty());
    }

    #[test]
    fn injected_failure_is_reported() {
        let system = MockSystem::new();
        system.fail_construction(Category::Services, "/s", true);
        let adapter = system.adapter(Category::Services);

        assert!(adapter.construct("/s", &ResourceType::new("S"), &serde_json::Value::Null).is_err());
        assert!(system.live(Category::Services).is_empty());
    }

    #[test]
    fn remove_reports_presence() {
        let system = MockSystem::new();
        system.add(Category::Subscribers, "/x", "T");
        assert!(system.remove(Category::Subscribers, "/x"));
        assert!(!system.remove(Category::Subscribers, "/x"));
    }
}
