use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use pledge_api::auth::{AppState, AppStateInner};
use pledge_api::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pledge=debug,pledge_api=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = pledge_db::Database::open(&config.db_path)?;

    let addr: SocketAddr = config.bind_addr().parse()?;
    info!("Uploads stored in {}", config.upload_dir.display());

    let state: AppState = Arc::new(AppStateInner { db, config });

    let app = pledge_api::build_router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Pledge server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
