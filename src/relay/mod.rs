//! Relay server
//!
//! Accepts WebSocket connections on one route and answers every inbound
//! [`Envelope`] through a [`ReplyProcessor`]. Frames from one connection are
//! handled in arrival order; a frame that does not parse is logged and
//! dropped without closing the connection.

mod processor;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub use processor::{AckProcessor, EchoProcessor, RelayMode, ReplyProcessor};

use crate::audio::AudioContainer;
use crate::channel::Envelope;
use crate::config::ServerConfig;
use crate::{Error, Result};

/// Shared per-server state
struct RelayState {
    processor: Arc<dyn ReplyProcessor>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Build the relay router: WebSocket on `path`, liveness on `/health`
pub fn router(processor: Arc<dyn ReplyProcessor>, path: &str) -> Router {
    let state = Arc::new(RelayState { processor });

    Router::new()
        .route(path, get(ws_upgrade))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ws_upgrade(
    State(state): State<Arc<RelayState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let connection_id = uuid::Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    tracing::info!(%connection_id, processor = state.processor.name(), "relay connection opened");

    while let Some(frame) = receiver.next().await {
        let envelope = match frame {
            Ok(Message::Text(text)) => match Envelope::parse(text.as_str()) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!(%connection_id, error = %e, "dropping malformed message");
                    continue;
                }
            },
            Ok(Message::Binary(data)) => {
                Envelope::with_container(&AudioContainer::from_bytes(data))
            }
            Ok(Message::Close(_)) => {
                tracing::debug!(%connection_id, "closed by client");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(%connection_id, error = %e, "relay receive error");
                break;
            }
        };

        let reply = match state.processor.process(envelope).await {
            Ok(Some(reply)) => reply,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(%connection_id, error = %e, "processor failed, no reply");
                continue;
            }
        };

        let text = match reply.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(%connection_id, error = %e, "failed to serialize reply");
                continue;
            }
        };

        if sender.send(Message::Text(text.into())).await.is_err() {
            tracing::debug!(%connection_id, "client went away before reply");
            break;
        }
    }

    tracing::info!(%connection_id, "relay connection closed");
}

/// Bound relay server, ready to serve
pub struct RelayServer {
    listener: TcpListener,
    router: Router,
    path: String,
}

impl RelayServer {
    /// Bind using server configuration
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        Self::bind_with(&config.bind_addr(), &config.path, config.mode.processor()).await
    }

    /// Bind `addr` with an explicit processor
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound
    pub async fn bind_with(
        addr: &str,
        path: &str,
        processor: Arc<dyn ReplyProcessor>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind relay server on {addr}: {e}")))?;

        Ok(Self {
            listener,
            router: router(processor, path),
            path: path.to_string(),
        })
    }

    /// Address actually bound (useful with port 0)
    ///
    /// # Errors
    ///
    /// Returns error if the socket has no local address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// WebSocket URL clients should connect to
    ///
    /// # Errors
    ///
    /// Returns error if the socket has no local address
    pub fn url(&self) -> Result<String> {
        Ok(format!("ws://{}{}", self.local_addr()?, self.path))
    }

    /// Serve until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Returns error if the server fails
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        tracing::info!(%addr, path = %self.path, "relay server listening");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Config(format!("relay server error: {e}")))?;

        tracing::info!("relay server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn health_reports_version() {
        let app = router(RelayMode::Echo.processor(), "/call/v1/");

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn plain_get_on_ws_route_is_rejected() {
        let app = router(RelayMode::Echo.processor(), "/call/v1/");

        let response = app
            .oneshot(Request::builder().uri("/call/v1/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn bind_reports_ephemeral_port() {
        let server = RelayServer::bind_with("127.0.0.1:0", "/call/v1/", RelayMode::Echo.processor())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.url().unwrap(), format!("ws://{addr}/call/v1/"));
    }
}
