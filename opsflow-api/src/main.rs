//! OpsFlow API Server Entry Point
//!
//! Loads configuration, wires the store, identity provider and SMS gateway,
//! starts the cache cleanup task and serves the Axum router.

use std::net::SocketAddr;
use std::sync::Arc;

use opsflow_api::jobs::{cache_cleanup_task, CacheCleanupConfig};
use opsflow_api::telemetry::{init_tracer, TelemetryConfig};
use opsflow_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, ArkeselGateway, CustomerStore,
    IdentityProvider, InMemoryStore, PostgrestStore, SmsGateway, StaticIdentityProvider,
    StoreBackend, SupabaseAuth,
};
use opsflow_core::OpsError;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracer(&telemetry_config)?;

    let config = ApiConfig::from_env().map_err(OpsError::from)?;
    config.validate().map_err(OpsError::from)?;
    tracing::info!(environment = %config.environment, "Configuration loaded");

    let (store, identity) = build_backends(&config)?;
    let sms = Arc::new(ArkeselGateway::new(
        config.sms_api_url.clone(),
        config.sms_api_key.clone(),
        config.sms_sender_id.clone(),
    )?);
    if !sms.is_configured() {
        tracing::warn!("SMS gateway credentials missing; SMS endpoints will return 500");
    }

    let state = AppState::new(config.clone(), store, identity, sms);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let cleanup_config = CacheCleanupConfig::for_environment(config.environment)
        .with_interval(config.cache_cleanup_interval);
    let cleanup = tokio::spawn(cache_cleanup_task(state.cache(), cleanup_config, shutdown_rx));

    let app = create_api_router(state)?;

    let addr: SocketAddr = config.bind_addr().parse().map_err(|e| {
        ApiError::invalid_input(format!("Invalid bind address {}: {}", config.bind_addr(), e))
    })?;
    tracing::info!(%addr, "Starting OpsFlow API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = cleanup.await {
        tracing::error!(error = %e, "Cache cleanup task panicked");
    }
    Ok(())
}

/// Store and identity provider for the configured backend.
fn build_backends(
    config: &ApiConfig,
) -> ApiResult<(Arc<dyn CustomerStore>, Arc<dyn IdentityProvider>)> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Ok((
                Arc::new(InMemoryStore::new()),
                Arc::new(StaticIdentityProvider::new()),
            ))
        }
        StoreBackend::Postgrest => {
            let (Some(url), Some(anon_key)) = (&config.supabase_url, &config.supabase_key) else {
                return Err(ApiError::internal_error("Supabase URL and key are required"));
            };
            // Table access uses the service key when present; auth always
            // uses the anon key.
            let table_key = config
                .supabase_service_key
                .clone()
                .unwrap_or_else(|| anon_key.clone());
            Ok((
                Arc::new(PostgrestStore::new(url, table_key)?),
                Arc::new(SupabaseAuth::new(url, anon_key.clone())?),
            ))
        }
    }
}
