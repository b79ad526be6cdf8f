use anyhow::Context;
use salesdesk_api::worker::start_session_sweeper;
use salesdesk_api::{app, AppState};
use salesdesk_core::ComposerIdentity;
use salesdesk_store::{app_config::Config, ErpClient, HttpLookup, LocalApiClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "salesdesk_api=debug,salesdesk_order=debug,salesdesk_store=info,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Salesdesk API on port {}", config.server.port);

    let erp = Arc::new(ErpClient::new(&config.erp).context("Failed to build ERP client")?);
    let local = Arc::new(
        LocalApiClient::new(&config.local_api).context("Failed to build local API client")?,
    );
    let lookup = Arc::new(HttpLookup::new(local.clone(), erp.clone()));

    let identity = ComposerIdentity::new(
        config.composer.employee_id.expose().clone(),
        config.composer.company_id.clone(),
    );
    tracing::info!(?identity, status_marker = %config.commit.status_marker, "Composer configured");

    let state = AppState::new(lookup, erp, local, identity, &config.commit.status_marker);
    tokio::spawn(start_session_sweeper(
        state.sessions.clone(),
        config.server.session_idle(),
    ));
    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
