mod auth;
mod config;
mod error;
mod rate_limit;
mod routes;
mod storage;


use std::net::SocketAddr;
use std::sync::Arc;

use config::AppConfig;
use routes::{app_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("daybook_api=info".parse().expect("valid directive")),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting daybook-api with config: {:?}", config);

    let state = AppState::from_config(config);
    state.store.ensure_layout().await?;
    let bind_addr = state.config.bind_addr.clone();
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("daybook-api listening on {}", bind_addr);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
