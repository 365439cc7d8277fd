//! Interface factory table
//!
//! Nodes pick the interface they host by name from a table filled in at
//! start-up, instead of importing an implementation at runtime.
//!
//! # Example
//!
//! ```rust,ignore
//! use beacon_transients::interface::InterfaceFactories;
//! use beacon_transients::mock::MockSystem;
//!
//! let system = MockSystem::new();
//! let mut factories = InterfaceFactories::new();
//! factories.register("mock", move |_args| Ok(system.interface()));
//!
//! let iface = factories.build("mock", &serde_json::Value::Null)?;
//! ```

use std::collections::BTreeMap;

use super::{Host, ResourceInterface};
use crate::{Error, Result};

/// Builds a [`ResourceInterface`] from setup arguments
pub type InterfaceFactory<H> =
    Box<dyn Fn(&serde_json::Value) -> Result<ResourceInterface<H>> + Send + Sync>;

/// Named interface factories
pub struct InterfaceFactories<H: Host> {
    factories: BTreeMap<String, InterfaceFactory<H>>,
}

impl<H: Host> Default for InterfaceFactories<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Host> InterfaceFactories<H> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register a factory, replacing any previous one under the same name
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&serde_json::Value) -> Result<ResourceInterface<H>> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!(name = %name, "registering interface factory");
        if self.factories.insert(name.clone(), Box::new(factory)).is_some() {
            tracing::warn!(name = %name, "interface factory replaced");
        }
    }

    /// Build the interface registered under `name`
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown name, or whatever the factory returns
    pub fn build(&self, name: &str, args: &serde_json::Value) -> Result<ResourceInterface<H>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("interface factory '{name}'")))?;
        factory(args)
    }

    /// Registered factory names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}
