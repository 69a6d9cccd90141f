//! Squall Server
//!
//! Main entry point for the squall federated search node.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use squall_common::config::ServerConfig;
use squall_common::prelude::NodeName;
use squall_index::{MemSearcherFactory, MemShardMetaStore, PassThroughExtractor};
use squall_search::{
    HttpRemoteTransport, LocalNodeExecutor, RemoteNodeSearch, RemoteSearchManager,
    RemoteSearchTransport, SearchCoordinator, StaticNodeRegistry, TaskRegistry,
};
use squall_server::{router, AppState, HttpTerminationBroadcaster};

// Use jemalloc as the global allocator for better performance
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Squall - a federated shard search node
#[derive(Parser, Debug)]
#[command(name = "squalld")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/squall.toml")]
    config: PathBuf,

    /// Override listen address
    #[arg(long)]
    listen: Option<String>,

    /// Override this node's name
    #[arg(long)]
    node_name: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_tracing(&config, args.verbose);

    if let Err(errors) = config.validate() {
        for error in &errors {
            tracing::error!("config: {}", error);
        }
        anyhow::bail!("invalid configuration ({} problems)", errors.len());
    }

    let node = NodeName::new(config.node_name.clone());
    info!(node = %node, "starting squall server");

    // Index layer: in-memory metadata and searcher factory. Production
    // deployments swap these for the real index services at the same
    // trait seams.
    let meta = Arc::new(MemShardMetaStore::new());
    let factory = Arc::new(MemSearcherFactory::new());

    let executor = Arc::new(LocalNodeExecutor::new(
        meta.clone(),
        factory,
        Arc::new(PassThroughExtractor),
        &config.search,
    ));

    let registry = Arc::new(TaskRegistry::new());
    let transport: Arc<dyn RemoteSearchTransport> =
        Arc::new(HttpRemoteTransport::new(&config.remote)?);

    // Cluster-wide termination reaches every configured peer
    let peer_endpoints: Vec<(NodeName, String)> = config
        .peers
        .iter()
        .map(|(name, endpoint)| (NodeName::new(name.clone()), endpoint.clone()))
        .collect();
    registry.set_broadcaster(Arc::new(HttpTerminationBroadcaster::new(
        transport.clone(),
        peer_endpoints,
    )));

    let manager = Arc::new(RemoteSearchManager::new(
        node.clone(),
        executor.clone(),
        registry.clone(),
        config.remote.clone(),
    ));

    let shutdown = CancellationToken::new();
    let eviction = manager.start_eviction_loop(shutdown.clone());

    // The coordinator is the embedding point for callers submitting
    // federated searches from this node.
    let _coordinator = SearchCoordinator::new(
        Arc::new(StaticNodeRegistry::from_config(&config)),
        registry,
        meta,
        executor,
        Arc::new(RemoteNodeSearch::new(transport, &config.remote)),
    );

    let state = AppState {
        manager: manager.clone(),
    };
    let app = router(state);

    let listen = args.listen.unwrap_or_else(|| config.listen_addr.clone());
    let addr: SocketAddr = format!("{}:{}", listen, config.http_port).parse()?;
    info!(address = %addr, "remote search control surface listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                }
                _ = server_shutdown.cancelled() => {}
            }
        })
        .await?;

    shutdown.cancel();
    eviction.await?;
    info!("squall server stopped");
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<ServerConfig> {
    let mut config = if args.config.exists() {
        let raw = std::fs::read_to_string(&args.config)?;
        toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing {}: {}", args.config.display(), e))?
    } else {
        eprintln!(
            "config file {} not found, using defaults",
            args.config.display()
        );
        ServerConfig::default()
    };

    if let Some(node_name) = &args.node_name {
        config.node_name = node_name.clone();
    }
    Ok(config)
}

fn init_tracing(config: &ServerConfig, verbose: bool) {
    let level = if verbose { "debug" } else { &config.logging.level };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }
}
