use std::net::SocketAddr;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use vtu_settlement::config::AppConfig;
use vtu_settlement::database::{init_pool_from_config, provider_settings_repository::keys};
use vtu_settlement::logging::init_tracing;
use vtu_settlement::services::WalletLedger;
use vtu_settlement::{build_router, AppServices, Repositories};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

/// Log every balance change for operators until the ledger goes away
fn spawn_balance_logger(ledger: &WalletLedger) -> tokio::task::JoinHandle<()> {
    let mut events = ledger.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(
                    user_id = %event.user_id,
                    change = ?event.change,
                    delta = %event.delta,
                    new_balance = %event.new_balance,
                    "Balance changed"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Balance logger lagged behind")
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        skip_externals = config.skip_externals,
        "🚀 Starting VTU settlement service"
    );

    let (repos, db_pool) = match &config.database {
        Some(db_config) => {
            info!("📊 Initializing database connection pool...");
            let pool = init_pool_from_config(db_config).await.map_err(|e| {
                error!("Failed to initialize database pool: {}", e);
                e
            })?;
            info!(
                max_connections = pool.options().get_max_connections(),
                "✅ Database connection pool initialized"
            );
            (Repositories::postgres(pool.clone()), Some(pool))
        }
        None => {
            warn!("⏭️  SKIP_EXTERNALS=true: using in-memory repositories, data is lost on exit");
            (Repositories::in_memory(), None)
        }
    };

    let services = AppServices::build(&config, &repos)?;

    match services.provider_client.resolve_active().await {
        Ok((provider, config)) => info!(
            provider = %provider,
            base_url = %config.base_url,
            "Active VTU provider resolved"
        ),
        Err(e) => warn!(
            error = %e,
            setting = keys::ACTIVE_API_PROVIDER,
            "VTU provider is not configured yet; purchases will fail until it is"
        ),
    }

    let balance_logger = spawn_balance_logger(&services.ledger);
    let app = build_router(&services, db_pool);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    balance_logger.abort();
    info!("👋 Server shutdown complete");

    Ok(())
}
