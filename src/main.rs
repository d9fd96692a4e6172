use anyhow::Context;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use whispers::{AppState, Config, http, store::SqliteStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("whispers=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = SqliteStore::connect(
        &config.database_url,
        config.max_connections,
        config.busy_timeout,
    )
    .await
    .with_context(|| format!("opening {}", config.database_url))?;

    let app = http::router()
        .with_state(AppState::new(store, config.page_size))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutting down"),
        Err(err) => {
            tracing::error!(%err, "no ctrl-c handler, running until killed");
            std::future::pending::<()>().await;
        }
    }
}
