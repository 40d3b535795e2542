mod app;
mod auth;
mod clock;
mod config;
mod contact;
mod error;
mod mail;
mod routes;
mod state;
mod store;
mod validation;

use crate::app::{build_app, listen_addr, serve};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "fastdevp=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = state::AppState::init().await?;
    let addr = listen_addr()?;

    let result = serve(build_app(app_state.clone()), addr).await;
    app_state.shutdown().await;
    result
}
