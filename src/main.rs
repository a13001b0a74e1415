mod app;
mod auth;
mod config;
mod state;

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "credcore=debug,axum=info,tower_http=info".to_string());
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

    let app_state = AppState::init().await?;
    let http = app_state.config.http.clone();

    tracing::info!(
        store = ?app_state.config.store,
        access_ttl_secs = app_state.config.jwt.access_ttl.as_secs(),
        enforce_kind = app_state.config.jwt.enforce_kind,
        "credential service starting"
    );

    app::serve(app::build_app(app_state), &http).await
}
