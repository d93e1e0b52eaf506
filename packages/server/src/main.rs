use anyhow::Context;
use axum::http::{self, HeaderValue, Method};
use dotenvy::dotenv;
use env_logger::Builder;
use log::{info, warn, LevelFilter};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use mafia_server::{
    app,
    models::config::{DebugConfig, ServerConfig},
    state::AppState,
};

// ログ設定
fn init_logger(debug_config: &DebugConfig) {
    let level = if debug_config.verbose_logging {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = Builder::new();
    builder
        .filter_level(level)
        .filter_module("tower_http", level)
        .filter_module("axum", level)
        .format_timestamp(Some(env_logger::TimestampPrecision::Millis))
        .format_target(true)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 環境変数をロード
    if let Err(e) = dotenv() {
        eprintln!("Warning: failed to load .env: {}", e);
    }

    let state = AppState::from_env();
    init_logger(&state.debug_config);

    if state.debug_config.enabled {
        warn!(
            "Debug mode is enabled (show_player_roles = {})",
            state.debug_config.show_player_roles
        );
    }
    if std::env::var("JWT_SECRET").is_err() {
        warn!("JWT_SECRET is not set; websocket connections will be rejected");
    }

    let server_config = ServerConfig::from_env();
    let origin = server_config
        .cors_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("invalid CORS_ORIGIN: {}", server_config.cors_origin))?;
    let cors = CorsLayer::new()
        .allow_origin([origin])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION]);

    let app = app::create_app_with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http() // HTTPトレースログを有効化
                .make_span_with(|request: &http::Request<_>| {
                    tracing::info_span!(
                        "HTTP request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                }),
        );

    let addr: SocketAddr = server_config
        .addr
        .parse()
        .with_context(|| format!("invalid SERVER_ADDR: {}", server_config.addr))?;
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!("Server started: http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
