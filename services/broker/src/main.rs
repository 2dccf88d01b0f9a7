//! yarnbroker
//!
//! Provisions tenant queues on a shared YARN cluster. Each service instance
//! gets its own capacity-scheduler queue carved out of `root.default`;
//! provisioning, updates and deletes run asynchronously and are polled via
//! `last_operation`.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use yarnbroker::{
    api,
    catalog::Catalog,
    collaborators::{Collaborators, StaticCluster},
    config,
    lifecycle::LifecycleOrchestrator,
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to BROKER_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting yarnbroker");
    info!(
        listen_addr = %config.listen_addr,
        krb_realm = %config.krb_realm,
        max_concurrent_tasks = config.max_concurrent_tasks,
        "Configuration loaded"
    );

    let catalog = match &config.catalog_file {
        Some(path) => Catalog::load(path)?,
        None => Catalog::builtin()?,
    };
    info!(services = catalog.services().len(), "Catalog loaded");

    // In-process cluster and stores; a deployment injects real backends here.
    let cluster = Arc::new(StaticCluster::with_empty_pool(config.cluster_memory_mb));
    let collaborators = Collaborators::in_memory(cluster);

    let orchestrator =
        match LifecycleOrchestrator::bootstrap(catalog, collaborators, config.orchestrator_settings())
            .await
        {
            Ok(orchestrator) => orchestrator,
            Err(e) => {
                error!(error = %e, "Failed to load quota pool");
                return Err(e.into());
            }
        };

    let app = api::create_router(AppState::new(orchestrator));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Received shutdown signal");
        })
        .await?;

    info!("yarnbroker shut down");
    Ok(())
}
