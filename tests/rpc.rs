//! Discovery and calls over loopback TCP

use std::sync::Arc;
use std::time::{Duration, Instant};

use beacon_transients::{
    CallClient, CallOptions, CallPhase, DiscoveryClient, Error, MemoryRegistry, Provider,
    ProviderSet,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

mod common;
use common::{AddTwoInts, NeverReply, spawn_echo, spawn_hangup_provider, spawn_mute_listener, spawn_provider};

fn discovery(registry: &Arc<MemoryRegistry>) -> DiscoveryClient {
    DiscoveryClient::new(registry.clone()).with_poll_interval(Duration::from_millis(20))
}

#[tokio::test]
async fn discover_then_call() {
    let registry = Arc::new(MemoryRegistry::new());
    let (_, stop) = spawn_provider(&registry, "/add_two_ints", "n1", Arc::new(AddTwoInts)).await;
    let cancel = CancellationToken::new();

    let providers = discovery(&registry)
        .discover("/add_two_ints", Some(Duration::from_secs(1)), 1, &cancel)
        .await
        .unwrap();
    let sum = CallClient::tcp()
        .call(&providers, json!([40, 2]), &CallOptions::default(), &cancel)
        .await
        .unwrap();

    assert_eq!(sum, json!(42));
    stop.cancel();
}

#[tokio::test]
async fn discovery_waits_for_late_provider() {
    let registry = Arc::new(MemoryRegistry::new());
    let late = registry.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        late.register("/svc", Provider::new("late", "127.0.0.1:1"));
    });

    let providers = discovery(&registry)
        .discover("/svc", Some(Duration::from_secs(2)), 1, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(providers.providers, vec![Provider::new("late", "127.0.0.1:1")]);
}

#[tokio::test]
async fn no_provider_returns_immediately() {
    let start = Instant::now();

    let err = CallClient::tcp()
        .call(
            &ProviderSet::new("/svc", vec![]),
            json!(null),
            &CallOptions::default()
                .send_timeout(Duration::from_secs(1))
                .recv_timeout(Duration::from_secs(1)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NoProvider(_)));
    assert!(err.nothing_sent());
    assert!(start.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn provider_that_never_reads_is_send_timeout() {
    let address = spawn_mute_listener().await;
    let providers = ProviderSet::new("/svc", vec![Provider::new("mute", address)]);
    let start = Instant::now();

    let err = CallClient::tcp()
        .call(
            &providers,
            json!("hello"),
            &CallOptions::default().send_timeout(Duration::from_millis(100)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    let elapsed = start.elapsed();
    assert!(matches!(err, Error::Timeout { phase: CallPhase::Send }));
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(500));
}

#[tokio::test]
async fn provider_that_never_replies_is_recv_timeout() {
    let registry = Arc::new(MemoryRegistry::new());
    let (provider, stop) = spawn_provider(&registry, "/slow", "n1", Arc::new(NeverReply)).await;
    let providers = ProviderSet::new("/slow", vec![provider]);
    let start = Instant::now();

    let err = CallClient::tcp()
        .call(
            &providers,
            json!(1),
            &CallOptions::default().recv_timeout(Duration::from_millis(200)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    let elapsed = start.elapsed();
    assert!(matches!(err, Error::Timeout { phase: CallPhase::Recv }));
    assert!(!err.nothing_sent());
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_millis(700));
    stop.cancel();
}

#[tokio::test]
async fn provider_hanging_up_mid_call_ends_recv_early() {
    let address = spawn_hangup_provider("flaky").await;
    let providers = ProviderSet::new("/svc", vec![Provider::new("flaky", address)]);
    let start = Instant::now();

    let err = CallClient::tcp()
        .call(
            &providers,
            json!(1),
            &CallOptions::default().recv_timeout(Duration::from_secs(5)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout { phase: CallPhase::Recv }));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn target_selects_one_provider() {
    let registry = Arc::new(MemoryRegistry::new());
    // the mute provider would swallow the request if it were dialled and won
    registry.register("/echo", Provider::new("mute", spawn_mute_listener().await));
    let (_, stop) = spawn_echo(&registry, "/echo", "echo").await;
    let cancel = CancellationToken::new();

    let providers = discovery(&registry)
        .discover("/echo", Some(Duration::from_secs(1)), 2, &cancel)
        .await
        .unwrap();
    assert_eq!(providers.len(), 2);

    let body = CallClient::tcp()
        .call(
            &providers,
            json!({"ping": true}),
            &CallOptions::default().target("echo"),
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(body, json!({"ping": true}));
    stop.cancel();
}

#[tokio::test]
async fn fastest_ready_provider_serves_untargeted_call() {
    let registry = Arc::new(MemoryRegistry::new());
    registry.register("/echo", Provider::new("mute", spawn_mute_listener().await));
    let (_, stop) = spawn_echo(&registry, "/echo", "echo").await;
    let providers = ProviderSet::new("/echo", registry_providers(&registry, "/echo").await);

    let body = CallClient::tcp()
        .call(&providers, json!(7), &CallOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(body, json!(7));
    stop.cancel();
}

async fn registry_providers(registry: &MemoryRegistry, service: &str) -> Vec<Provider> {
    use beacon_transients::Registry;
    registry.list_providers(service).await
}

#[tokio::test]
async fn handler_failure_is_remote_error() {
    let registry = Arc::new(MemoryRegistry::new());
    let (provider, stop) =
        spawn_provider(&registry, "/add_two_ints", "n1", Arc::new(AddTwoInts)).await;

    let err = CallClient::tcp()
        .call(
            &ProviderSet::new("/add_two_ints", vec![provider]),
            json!("not a pair"),
            &CallOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Remote(_)));
    stop.cancel();
}

#[tokio::test]
async fn cancellation_abandons_a_pending_call() {
    let registry = Arc::new(MemoryRegistry::new());
    let (provider, stop) = spawn_provider(&registry, "/slow", "n1", Arc::new(NeverReply)).await;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let start = Instant::now();

    let err = CallClient::tcp()
        .call(
            &ProviderSet::new("/slow", vec![provider]),
            json!(null),
            &CallOptions::default(),
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(start.elapsed() < Duration::from_secs(1));
    stop.cancel();
}

#[tokio::test]
async fn cancellation_abandons_a_stalled_send() {
    let address = spawn_mute_listener().await;
    let providers = ProviderSet::new("/svc", vec![Provider::new("mute", address)]);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let start = Instant::now();

    let err = CallClient::tcp()
        .call(
            &providers,
            json!("hello"),
            &CallOptions::default().send_timeout(Duration::from_secs(5)),
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn stopped_provider_is_send_timeout() {
    let registry = Arc::new(MemoryRegistry::new());
    let (provider, stop) = spawn_echo(&registry, "/echo", "gone").await;
    stop.cancel();
    // let the accept loop observe cancellation and drop the listener
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = CallClient::tcp()
        .call(
            &ProviderSet::new("/echo", vec![provider]),
            json!(null),
            &CallOptions::default().send_timeout(Duration::from_millis(300)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(err.nothing_sent());
}
