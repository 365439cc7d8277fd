use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use beacon_transients::discovery::{MdnsAdvertiser, MdnsRegistry};
use beacon_transients::mock::MockSystem;
use beacon_transients::{
    CallClient, Category, Config, DiscoveryClient, EchoHandler, InterfaceFactories, Node, ServiceHost,
    TcpTransport,
};

/// Beacon transients - discover, call and expose transient resources
#[derive(Parser)]
#[command(name = "beacon-transients", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve an echo provider for a service and advertise it over mDNS
    Serve {
        /// Service name (e.g. "/echo")
        service: String,
        /// Listen address, overrides config
        #[arg(long)]
        bind: Option<String>,
        /// Do not advertise over mDNS
        #[arg(long)]
        no_mdns: bool,
    },
    /// Discover providers of a service over mDNS
    Discover {
        service: String,
        /// How long to wait for providers; 0 polls once
        #[arg(short, long)]
        timeout_ms: Option<u64>,
        /// Minimum number of providers to wait for
        #[arg(short, long)]
        min: Option<usize>,
    },
    /// Call a service discovered over mDNS
    Call {
        service: String,
        /// JSON request body
        #[arg(default_value = "null")]
        request: String,
        /// Only call the provider with this identity
        #[arg(long)]
        target: Option<String>,
        /// How long to wait for providers; 0 polls once
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },
    /// Drive a node against an in-memory host and print each pass
    Demo {
        /// Number of reconciliation passes
        #[arg(short, long, default_value = "5")]
        ticks: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,beacon_transients=info",
        1 => "info,beacon_transients=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted");
            on_signal.cancel();
        }
    });

    match cli.command {
        Command::Serve {
            service,
            bind,
            no_mdns,
        } => serve(&config, &service, bind, no_mdns, cancel).await,
        Command::Discover {
            service,
            timeout_ms,
            min,
        } => discover(&config, &service, timeout_ms, min, &cancel).await,
        Command::Call {
            service,
            request,
            target,
            timeout_ms,
        } => call(&config, &service, &request, target, timeout_ms, &cancel).await,
        Command::Demo { ticks } => demo(&config, ticks).await,
    }
}

/// Serve an echo provider until interrupted
async fn serve(
    config: &Config,
    service: &str,
    bind: Option<String>,
    no_mdns: bool,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let identity = format!("{}-{}", config.node.name, &uuid::Uuid::new_v4().simple().to_string()[..8]);
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());

    let host = ServiceHost::bind(service, identity.as_str(), bind.as_str())
        .await?
        .with_max_frame_bytes(config.call.max_frame_bytes);
    let port = host.local_addr()?.port();

    let advertiser = if no_mdns {
        None
    } else {
        let advertiser = MdnsAdvertiser::new()?;
        advertiser.advertise(service, &identity, port).await?;
        Some(advertiser)
    };

    println!("serving {service} as {identity} on port {port}");
    host.serve(Arc::new(EchoHandler), cancel).await?;

    if let Some(advertiser) = advertiser {
        advertiser.stop().await;
    }
    Ok(())
}

fn discovery_timeout(config: &Config, timeout_ms: Option<u64>) -> Option<Duration> {
    timeout_ms
        .map(Duration::from_millis)
        .or_else(|| config.discovery_timeout())
}

fn discovery_client(config: &Config) -> anyhow::Result<DiscoveryClient> {
    let registry = MdnsRegistry::new()?;
    Ok(DiscoveryClient::new(Arc::new(registry)).with_poll_interval(config.discovery.poll_interval))
}

/// Print providers of a service as JSON
async fn discover(
    config: &Config,
    service: &str,
    timeout_ms: Option<u64>,
    min: Option<usize>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let client = discovery_client(config)?;
    let providers = client
        .discover(
            service,
            discovery_timeout(config, timeout_ms),
            min.unwrap_or(config.discovery.minimum_providers),
            cancel,
        )
        .await?;

    println!("{}", serde_json::to_string_pretty(&providers)?);
    Ok(())
}

/// Discover a service, call it once and print the response
async fn call(
    config: &Config,
    service: &str,
    request: &str,
    target: Option<String>,
    timeout_ms: Option<u64>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let request: serde_json::Value = serde_json::from_str(request)?;
    let providers = discovery_client(config)?
        .discover(
            service,
            discovery_timeout(config, timeout_ms),
            config.discovery.minimum_providers,
            cancel,
        )
        .await?;

    let mut options = config.call_options();
    options.target = target;

    let client = CallClient::new(Arc::new(TcpTransport::new(config.call.max_frame_bytes)));
    let response = client.call(&providers, request, &options, cancel).await?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Run a node against the mock host while names come and go
async fn demo(config: &Config, ticks: u32) -> anyhow::Result<()> {
    let system = MockSystem::new();
    let mut factories = InterfaceFactories::new();
    let host = system.clone();
    factories.register("mock", move |_| Ok(host.interface()));

    let mut node = Node::from_config(config, factories.build("mock", &serde_json::Value::Null)?);
    let interface = node.interface();

    interface
        .lock()
        .await
        .services_mut()
        .request("/add_two_ints", serde_json::Value::Null);

    for tick in 0..ticks {
        match tick {
            0 => {
                system.add(Category::Publishers, "/chatter", "std_msgs/String");
                system.add(Category::Services, "/add_two_ints", "AddTwoInts");
            }
            1 => {
                interface.lock().await.expose(Category::Publishers, "^/chat")?;
                system.add(Category::Params, "/rate", "int");
            }
            3 => {
                system.remove(Category::Publishers, "/chatter");
            }
            _ => {}
        }

        if let Some(report) = node.update(node.update_interval()).await {
            println!("tick {tick}:");
            for category in Category::ALL {
                let exposed = interface.lock().await.exposed_names(category);
                println!("  {category:<12} exposed={exposed:?}");
            }
            for (category, name, e) in report.failures() {
                println!("  {category} {name} failed: {e}");
            }
        }
    }

    let cleaned = node.shutdown().await;
    println!("shut down, cleaned {cleaned}");
    Ok(())
}
