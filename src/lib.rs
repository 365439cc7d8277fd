//! Beacon Transients - reconciled exposure of transient resources plus bounded RPC
//!
//! This library provides:
//! - Transient pools reconciling requested, available and exposed resource names
//! - A four-category resource interface driven by a periodic node
//! - Polling discovery of service providers with a minimum count and timeout
//! - Point-to-point calls with separate send and receive timeouts
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                       Node                           │
//! │      periodic reconcile_all  │  shutdown on cancel   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                ResourceInterface                     │
//! │  publishers │ subscribers │ services │ params        │
//! │        (one TransientPool per category)              │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │        Host adapters (mock or a real middleware)     │
//! └─────────────────────────────────────────────────────┘
//!
//!   DiscoveryClient ──► Registry (memory │ mDNS)
//!   CallClient      ──► Transport (TCP) ──► ServiceHost
//! ```

pub mod call;
pub mod config;
pub mod discovery;
pub mod error;
pub mod interface;
pub mod mock;
pub mod node;
pub mod pool;
pub mod transport;

pub use call::{CallClient, CallOptions};
pub use config::Config;
pub use discovery::{DiscoveryClient, MemoryRegistry, Provider, ProviderSet, Registry};
pub use error::{CallPhase, Error, Result};
pub use interface::{Category, Host, InterfaceFactories, ReconcileReport, ResourceInterface};
pub use node::Node;
pub use pool::{
    Changes, ExposureDiff, ResourceName, ResourceType, TransientAdapter, TransientPool,
    TransientSet, UpdateReport,
};
pub use transport::{EchoHandler, ServiceHandler, ServiceHost, TcpTransport, Transport};
