//! clib-api - WebSocket protocol layer for the Clib actuator
//!
//! This crate speaks a Buttplug-style JSON protocol to one client at a time
//! and forwards device commands to a [`PowerSink`](clib_core::PowerSink). It
//! is sink-agnostic: the plain device controller and the power blender are
//! interchangeable.
//!
//! # Usage
//!
//! ```ignore
//! use clib_api::{create_router, ConnectionServer, ProtocolOptions};
//!
//! let server = Arc::new(ConnectionServer::new(sink, ProtocolOptions::default()));
//! let router = create_router(server);
//! axum::serve(listener, router).await?;
//! ```

pub mod connection;
pub mod descriptor;
pub mod error;
pub mod messages;
pub mod server;
pub mod socket;
pub mod testing;

pub use connection::{AckMode, ProtocolConnection, ProtocolOptions, Session};
pub use descriptor::{descriptor_for_version, DeviceDescriptor};
pub use error::ProtocolError;
pub use messages::{ClientMessage, ServerMessage};
pub use server::{ConnectionGuard, ConnectionServer};
pub use socket::{ClientSocket, WsClientSocket};

use std::future::Future;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Default WebSocket listen port
pub const DEFAULT_PORT: u16 = 12345;

/// Create the router: the protocol WebSocket on `/` and a health check
pub fn create_router(server: Arc<ConnectionServer>) -> Router {
    Router::new()
        .route("/", get(upgrade))
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}

async fn upgrade(State(server): State<Arc<ConnectionServer>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        server.accept(WsClientSocket::new(socket)).await;
    })
}

/// Serve the protocol on `listener` until `shutdown` resolves
pub async fn serve<F>(
    listener: TcpListener,
    server: Arc<ConnectionServer>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, create_router(server))
        .with_graceful_shutdown(shutdown)
        .await
}
