use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use send_supply_backend::{
    api::{create_app, SupplyApiState},
    config::{RegistryConfig, SupplyConfig},
    registry::{DocumentRegistry, RegistryProvider, StaticRegistry},
    sources::{ProviderPool, RpcBalanceSource},
    RefreshScheduler, SnapshotAggregator, SnapshotStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SupplyConfig::load().context("Failed to load supply configuration")?;

    // Chain access
    let pool = ProviderPool::new(&config.networks).context("Failed to initialize RPC providers")?;
    pool.verify_chain_ids(config.read_timeout())
        .await
        .context("RPC chain id check failed")?;
    let source = Arc::new(RpcBalanceSource::new(pool, config.read_timeout()));
    info!("✅ RPC providers initialized for {} networks", config.networks.len());

    let registry: Arc<dyn RegistryProvider> = match &config.registry {
        RegistryConfig::Static { accounts } => Arc::new(StaticRegistry::new(accounts.clone())),
        RegistryConfig::Document { url, timeout_secs } => Arc::new(
            DocumentRegistry::new(url, Duration::from_secs(*timeout_secs))
                .context("Failed to initialize document registry")?,
        ),
    };
    info!("✅ Non-circulating registry: {}", registry.provider_name());

    let aggregator = SnapshotAggregator::new(source, registry, config.representations.clone())
        .context("Invalid token representations")?
        .with_expected_total_supply(config.expected_total_supply);

    if config.verify_decimals {
        aggregator
            .verify_representations()
            .await
            .context("Token representation check failed")?;
    }

    // No snapshot, no service
    let store = Arc::new(
        SnapshotStore::bootstrap(&aggregator)
            .await
            .context("Initial supply refresh failed")?,
    );
    let aggregator = Arc::new(aggregator);

    let scheduler = RefreshScheduler::new(
        Arc::clone(&aggregator),
        Arc::clone(&store),
        config.refresh_interval(),
        config.refresh_timeout(),
    );
    scheduler.start().await;

    let state = SupplyApiState::new(Arc::clone(&store), &config.http.homepage).with_scheduler(scheduler.clone());
    let app = create_app(state);

    // IPv6 hosts such as "::" need brackets
    let bind_addr = if config.http.host.contains(':') {
        format!("[{}]:{}", config.http.host, config.http.port)
    } else {
        format!("{}:{}", config.http.host, config.http.port)
    };

    info!("🔧 Routes configured: /, /total, /circulating, /amounts.json, /multisigs, /status");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    let snapshot = store.get();
    info!(
        "🚀 Listening on {} | total supply {} | circulating supply {}",
        bind_addr,
        snapshot.total_supply(),
        snapshot.circulating_supply()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    scheduler.stop().await;
    Ok(())
}
