//! Shared test utilities

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use beacon_transients::transport::{Frame, read_frame, write_frame};
use beacon_transients::{
    EchoHandler, MemoryRegistry, Provider, ResourceName, ServiceHandler, ServiceHost,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Build a name set
#[must_use]
pub fn names(list: &[&str]) -> BTreeSet<ResourceName> {
    list.iter().map(ToString::to_string).collect()
}

/// Handler that accepts requests but never answers
pub struct NeverReply;

#[async_trait]
impl ServiceHandler for NeverReply {
    async fn handle(&self, _request: Value) -> anyhow::Result<Value> {
        std::future::pending().await
    }
}

/// Handler adding the two integers of `[a, b]`
pub struct AddTwoInts;

#[async_trait]
impl ServiceHandler for AddTwoInts {
    async fn handle(&self, request: Value) -> anyhow::Result<Value> {
        let (a, b): (i64, i64) = serde_json::from_value(request)?;
        Ok(Value::from(a + b))
    }
}

/// Start a provider on loopback and register it
///
/// The provider stops when the returned token is cancelled.
pub async fn spawn_provider(
    registry: &MemoryRegistry,
    service: &str,
    identity: &str,
    handler: Arc<dyn ServiceHandler>,
) -> (Provider, CancellationToken) {
    let host = ServiceHost::bind(service, identity, "127.0.0.1:0")
        .await
        .expect("failed to bind provider");
    let provider = host.provider().expect("bound address");
    registry.register(service, provider.clone());

    let cancel = CancellationToken::new();
    tokio::spawn(host.serve(handler, cancel.clone()));
    (provider, cancel)
}

/// Start an echo provider
pub async fn spawn_echo(
    registry: &MemoryRegistry,
    service: &str,
    identity: &str,
) -> (Provider, CancellationToken) {
    spawn_provider(registry, service, identity, Arc::new(EchoHandler)).await
}

/// Listener that accepts connections and never speaks the protocol
///
/// Connections are held open until the task is dropped with the runtime.
pub async fn spawn_mute_listener() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind");
    let address = listener.local_addr().expect("bound address").to_string();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    address
}

/// Provider that greets, reads one request and hangs up
pub async fn spawn_hangup_provider(identity: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind");
    let address = listener.local_addr().expect("bound address").to_string();
    let identity = identity.to_string();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let greeting = Frame::Ready {
                provider: identity.clone(),
            };
            if write_frame(&mut stream, &greeting).await.is_err() {
                continue;
            }
            let _ = read_frame(&mut stream, 1024 * 1024).await;
            drop(stream);
        }
    });
    address
}
