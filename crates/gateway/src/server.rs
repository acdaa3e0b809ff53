use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use {
    anyhow::Context,
    axum::{
        Router,
        extract::{ConnectInfo, State, WebSocketUpgrade},
        response::{IntoResponse, Json},
        routing::{get, post},
    },
    tokio::net::TcpListener,
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{info, warn},
};

use {
    encore_config::EncoreConfig,
    encore_oauth::{OAuthFlow, TokenExchange, spotify_oauth_config},
};

use crate::{routes, state::GatewayState, ws::handle_connection};

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_upgrade_handler))
        .route("/login", get(routes::login))
        .route("/callback", get(routes::callback))
        .route("/get-token", get(routes::get_token))
        .route("/refresh-token", post(routes::refresh_token))
        .route("/logout", post(routes::logout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the gateway HTTP + WebSocket server and run until Ctrl-C.
pub async fn start_gateway(config: &EncoreConfig, bind: &str, port: u16) -> anyhow::Result<()> {
    let oauth = spotify_oauth_config(&config.spotify)?;
    let exchange: Arc<dyn TokenExchange> = Arc::new(OAuthFlow::new(oauth.clone()));
    let margin = Duration::from_secs(config.token.refresh_margin_secs);
    let state = GatewayState::new(oauth, exchange, margin);

    let addr: SocketAddr = format!("{bind}:{port}")
        .parse()
        .with_context(|| format!("invalid bind address {bind}:{port}"))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    // Startup banner.
    let lines = [
        format!("encore gateway v{}", state.version),
        format!(
            "protocol v{}, listening on {}",
            encore_protocol::PROTOCOL_VERSION,
            addr
        ),
        format!("login: http://{addr}/login"),
        format!("refresh margin: {}s", margin.as_secs()),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    serve(listener, state, shutdown_signal()).await
}

/// Serve on an already-bound listener until `shutdown` resolves, then end the
/// token session.
pub async fn serve(
    listener: TcpListener,
    state: Arc<GatewayState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_gateway_app(Arc::clone(&state));

    // ConnectInfo gives the WebSocket handler the remote address.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    state.tokens.dispose().await;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let count = state.relay.channel_count().await;
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "protocol": encore_protocol::PROTOCOL_VERSION,
        "connections": count,
        "authenticated": state.tokens.is_authenticated().await,
    }))
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, addr))
}
