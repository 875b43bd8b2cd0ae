//! Marketplace HTTP server.

use std::sync::Arc;
use tutorlink_core::environment::SystemClock;
use tutorlink_marketplace::api;
use tutorlink_marketplace::config::Config;
use tutorlink_marketplace::lifecycle::environment::{
    LifecycleEnvironment, LoggingNotifier, LoggingSettlementGateway,
};
use tutorlink_marketplace::MarketplaceStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tutorlink_marketplace=info".into()),
        )
        .init();

    let config = Config::from_env();
    tracing::info!(bind_address = %config.bind_address, "starting marketplace server");

    let env = LifecycleEnvironment::new(
        Arc::new(SystemClock),
        Arc::new(LoggingNotifier),
        Arc::new(LoggingSettlementGateway),
        config.grace,
    );
    let store = MarketplaceStore::new(env);
    let sweeper = store.spawn_sweeper(config.sweep_interval);

    let app = api::router(store);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    sweeper.abort();
    Ok(())
}
