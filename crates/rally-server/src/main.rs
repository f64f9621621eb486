use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use rally_api::auth::{AppState, AppStateInner};
use rally_api::routes;
use rally_core::config::Config;
use rally_core::credentials::Credentials;
use rally_core::notify::WebPushTransport;
use rally_core::tokens::Tokens;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rally=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(rally_db::Database::open(&config.database_path)?);

    // Shared state
    let transport = Arc::new(WebPushTransport::new(&config.push)?);
    let app_state: AppState = Arc::new(AppStateInner::new(
        db,
        Credentials::new(),
        Tokens::new(&config.token),
        transport,
        config.push.public_key.clone(),
    ));

    let app = routes::router(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Rally server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
