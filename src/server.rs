use std::net::SocketAddr;

use axum::{response::IntoResponse, routing::get, Extension, Json, Router};
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{bridge::Bridge, config::Config, error::Error, websocket};

pub use crate::config::DEFAULT_PORT;

async fn run(
    bridge: Bridge,
    config: Config,
    port: Option<u16>,
    allocated_port: Option<oneshot::Sender<u16>>,
) -> Result<(), Error> {
    let app = Router::new()
        .route("/", get(websocket::ws_handler))
        .route("/client", get(websocket::ws_handler))
        .route("/config", get(show_config))
        .route("/events", get(show_events))
        .route("/version", get(show_version))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                // Each websocket needs to be able to reach the bridge
                .layer(Extension(bridge))
                // The config should be known to the web server
                .layer(Extension(config)),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(0)));
    let server = axum::Server::try_bind(&addr)
        .map_err(|e| Error::InternalIssue(format!("Could not listen on {addr}: {e}")))?
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());
    let addr = server.local_addr();

    if let Some(port_reply) = allocated_port {
        if port_reply.send(addr.port()).is_err() {
            warn!("Nobody wanted to know which port was allocated");
        }
    }

    info!("listening on {}", addr);

    server
        .await
        .map_err(|e| Error::InternalIssue(format!("Server stopped: {e}")))
}

/// Open the configured device and serve on the configured port.
pub async fn run_on_port(config: Config) -> Result<(), Error> {
    let bridge = Bridge::new(&config)?;
    let port = config.port;

    run(bridge, config, Some(port), None).await
}

/// Open the configured device and serve on an arbitrary available port.
/// The port allocated will be sent on the provided channel.
pub async fn run_any_port(config: Config, allocated_port: oneshot::Sender<u16>) -> Result<(), Error> {
    let bridge = Bridge::new(&config)?;

    run(bridge, config, None, Some(allocated_port)).await
}

/// Serve an existing bridge on an arbitrary available port.
/// The port allocated will be sent on the provided channel.
pub async fn serve_any_port(
    bridge: Bridge,
    config: Config,
    allocated_port: oneshot::Sender<u16>,
) -> Result<(), Error> {
    run(bridge, config, None, Some(allocated_port)).await
}

async fn show_config(Extension(config): Extension<Config>) -> impl IntoResponse {
    config.serialize_pretty()
}

async fn show_events(Extension(bridge): Extension<Bridge>) -> impl IntoResponse {
    Json(bridge.recent_events())
}

async fn show_version() -> impl IntoResponse {
    format!("Joystick Bridge v{}\n", env!("CARGO_PKG_VERSION"))
}
