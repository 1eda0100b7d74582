use std::process;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nodesim::cli::Args;
use nodesim::cluster::{MemoryStore, NodeLifecycleService, RandomNameGenerator};
use nodesim::config::{load_config_file, SimulatorConfig};
use nodesim::metrics::LifecycleMetrics;
use nodesim::server::{create_router, AppState};

#[tokio::main]
async fn main() {
    // Load .env file before anything reads the environment
    let args = match Args::parse_with_env_file(std::env::args_os().collect::<Vec<_>>()) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Failed to load env file: {}", e);
            process::exit(1);
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_filter())),
        )
        .init();

    let mut config = match args.config {
        Some(ref path) => match load_config_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load config file {}: {}", path.display(), e);
                process::exit(1);
            }
        },
        None => SimulatorConfig::default(),
    };
    args.apply_overrides(&mut config);
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        process::exit(1);
    }

    let store = Arc::new(MemoryStore::new());
    let service = NodeLifecycleService::new(store)
        .with_name_generator(Arc::new(RandomNameGenerator))
        .with_resource_profile(config.resource_profile())
        .with_device_profile(config.devices.clone())
        .with_metrics(Arc::new(LifecycleMetrics::default()));

    let shutdown = CancellationToken::new();
    let state = AppState::new(service)
        .with_request_timeout(config.request_timeout())
        .with_shutdown(shutdown.clone());

    let addr = config.listen_addr();
    let app = create_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            process::exit(1);
        }
    };

    info!("Server listening on {}", addr);
    info!("Endpoints:");
    info!("  GET    /health               - Health check");
    info!("  GET    /api/v1/nodes         - List simulated nodes");
    info!("  POST   /api/v1/nodes         - Add or update a node");
    info!("  GET    /api/v1/nodes/{{name}}  - Get a node");
    info!("  DELETE /api/v1/nodes/{{name}}  - Delete a node");
    info!("  GET    /api/v1/metrics       - Lifecycle counters");

    let signal = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down, cancelling in-flight requests");
            signal.cancel();
        })
        .await;

    if let Err(e) = served {
        error!("Server error: {}", e);
        process::exit(1);
    }
}
