use metcorp_crm_ia::app::build_router;
use metcorp_crm_ia::config::Config;
use metcorp_crm_ia::handlers::AppState;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the application.
///
/// Initializes tracing, loads the configuration, builds the router and serves
/// it until the process is stopped.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "metcorp_crm_ia=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    let app_state = Arc::new(AppState::new(config.clone())?);
    let app = build_router(app_state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Servidor IA CRM escuchando en {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
