//! Node driver
//!
//! A [`Node`] owns one [`ResourceInterface`] and drives its reconciliation,
//! either from caller-supplied ticks ([`Node::update`]) or from its own
//! timer loop ([`Node::spawn`]).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::interface::{Host, ReconcileReport, ResourceInterface};

/// Hosts one resource interface and reconciles it periodically
pub struct Node<H: Host> {
    name: String,
    interface: Arc<Mutex<ResourceInterface<H>>>,
    update_interval: Duration,
    since_update: Duration,
}

impl<H: Host> Node<H> {
    pub fn new(name: impl Into<String>, interface: ResourceInterface<H>, update_interval: Duration) -> Self {
        Self {
            name: name.into(),
            interface: Arc::new(Mutex::new(interface)),
            update_interval,
            since_update: Duration::ZERO,
        }
    }

    /// Node named and paced from configuration
    pub fn from_config(config: &Config, interface: ResourceInterface<H>) -> Self {
        Self::new(config.node.name.clone(), interface, config.node.update_interval)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn update_interval(&self) -> Duration {
        self.update_interval
    }

    /// Shared handle to the interface, for requesting or exposing names
    /// while the node runs
    #[must_use]
    pub fn interface(&self) -> Arc<Mutex<ResourceInterface<H>>> {
        Arc::clone(&self.interface)
    }

    /// Account `elapsed` time and reconcile once a full interval accumulated
    ///
    /// Returns the report when a pass ran.
    pub async fn update(&mut self, elapsed: Duration) -> Option<ReconcileReport> {
        self.since_update += elapsed;
        if self.since_update < self.update_interval {
            return None;
        }
        self.since_update = Duration::ZERO;
        Some(self.reconcile().await)
    }

    /// Run one reconciliation pass now
    pub async fn reconcile(&self) -> ReconcileReport {
        let report = self.interface.lock().await.reconcile_all();

        for (category, name, e) in report.failures() {
            tracing::warn!(node = %self.name, category = %category, name = %name, error = %e, "resource not exposed");
        }
        if report.has_changes() {
            for (category, pass) in &report.passes {
                if pass.update.has_changes() {
                    tracing::info!(
                        node = %self.name,
                        category = %category,
                        added = pass.update.added.len(),
                        removed = pass.update.removed.len(),
                        "exposure changed"
                    );
                }
            }
        }
        report
    }

    /// Destroy every exposed resource
    pub async fn shutdown(&self) -> usize {
        self.interface.lock().await.shutdown()
    }
}

impl<H> Node<H>
where
    H: Host + 'static,
    ResourceInterface<H>: Send,
{
    /// Reconcile every `update_interval` until `cancel` fires, then shut down
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(self.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            node = %self.name,
            interval_ms = self.update_interval.as_millis(),
            "node started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.reconcile().await;
                }
            }
        }

        let cleaned = self.shutdown().await;
        tracing::info!(node = %self.name, cleaned, "node stopped");
    }
}
