//! Brokerdesk - Brokerage Ledger Synchronization Service
//!
//! Keeps the local record of commissions, invoices and payments consistent
//! with the external double-entry accounting system: live credentials,
//! at-most-once commission posting, and normalized account activity.

use anyhow::{Context, Result};
use dotenv::dotenv;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use brokerdesk_backend::{
    api,
    commission::{CommissionPostingEngine, CommissionStore},
    config::Config,
    ledger::{CredentialManager, EntityReconciler, LedgerGateway, SqliteConnectionStore},
    report::ReportService,
};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = Config::from_env();
    info!(
        "🚀 Brokerdesk ledger sync starting ({:?} environment)",
        config.environment
    );

    let connection_store = Arc::new(
        SqliteConnectionStore::new(&config.db_path).context("Failed to open connection store")?,
    );
    let commission_store =
        CommissionStore::new(&config.db_path).context("Failed to open commission store")?;

    let credentials = Arc::new(CredentialManager::new(connection_store, &config));
    let gateway = Arc::new(LedgerGateway::new(credentials, config.environment));
    let reconciler = EntityReconciler::new(gateway.clone());

    let engine = Arc::new(CommissionPostingEngine::new(
        commission_store,
        gateway.clone(),
        reconciler,
    ));
    let reports = Arc::new(ReportService::new(gateway));

    let app = api::create_router(engine, reports)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("🎯 API server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

fn load_env() {
    if dotenv().is_ok() {
        info!("Loaded environment from .env");
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "brokerdesk_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
