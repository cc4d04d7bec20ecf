//! `ChatServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use palaver_settings::ServerSettings;
use palaver_store::ChatStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::Authenticator;
use crate::connection::ConnectionDeps;
use crate::handlers;
use crate::hub::PresenceHub;
use crate::router::RouterConfig;
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// What each connection needs.
    pub deps: ConnectionDeps,
    /// Token verification.
    pub auth: Arc<dyn Authenticator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus recorder handle. `/metrics` answers 404 without one.
    pub metrics: Option<PrometheusHandle>,
}

impl From<&ServerSettings> for RouterConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            outbound_buffer: settings.outbound_buffer,
            heartbeat: (settings.heartbeat_interval_secs > 0)
                .then(|| Duration::from_secs(settings.heartbeat_interval_secs)),
        }
    }
}

/// The chat server.
pub struct ChatServer {
    state: AppState,
    shutdown: Arc<ShutdownCoordinator>,
}

impl ChatServer {
    /// Create a server over `store`, verifying connections with `auth`.
    pub fn new(
        settings: &ServerSettings,
        store: Arc<dyn ChatStore>,
        auth: Arc<dyn Authenticator>,
    ) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let state = AppState {
            deps: ConnectionDeps {
                store,
                hub: Arc::new(PresenceHub::new()),
                router: RouterConfig::from(settings),
                shutdown: shutdown.token(),
            },
            auth,
            start_time: Instant::now(),
            metrics: None,
        };
        Self { state, shutdown }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(handlers::health_handler))
            .route("/metrics", get(handlers::metrics_handler))
            .route("/ws", get(handlers::ws_handler))
            .route("/api/v1/chats", get(handlers::list_chats))
            .route("/api/v1/chats/{peer_id}", get(handlers::chat_history))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// The presence hub.
    pub fn hub(&self) -> &Arc<PresenceHub> {
        &self.state.deps.hub
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Serve on `listener` until the shutdown coordinator fires.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        let addr: SocketAddr = listener.local_addr()?;
        info!(%addr, "chat server listening");
        let token = self.shutdown.token();
        let hub = Arc::clone(self.hub());
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                token.cancelled().await;
                hub.close_all();
            })
            .await?;
        info!("chat server stopped");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::JwtAuthenticator;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use palaver_core::{Message, MessageId, UserId, time};
    use palaver_store::SqliteChatStore;
    use tower::ServiceExt;

    const SECRET: &str = "server-test-secret";

    struct Fixture {
        server: ChatServer,
        store: Arc<SqliteChatStore>,
        auth: Arc<JwtAuthenticator>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(SqliteChatStore::in_memory().unwrap());
        let auth = Arc::new(JwtAuthenticator::new(SECRET, Duration::from_secs(600)));
        let server = ChatServer::new(&ServerSettings::default(), store.clone(), auth.clone());
        Fixture {
            server,
            store,
            auth,
        }
    }

    async fn get_json(
        app: Router,
        uri: &str,
        token: Option<&str>,
    ) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder().uri(uri);
        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {token}"));
        }
        let resp = app.oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    async fn seed(store: &SqliteChatStore, from: UserId, to: UserId, n: usize) {
        let t0 = time::now();
        for i in 0..n {
            let offset = chrono::Duration::milliseconds(i64::try_from(i).unwrap());
            store
                .append_message(&Message {
                    id: MessageId::new(),
                    sender_id: from,
                    receiver_id: to,
                    content: format!("m{i}"),
                    sent_at: t0 + offset,
                    read_at: None,
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let f = fixture();
        let (status, json) = get_json(f.server.router(), "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["onlineUsers"], 0);
    }

    #[tokio::test]
    async fn chats_require_auth() {
        let f = fixture();
        let (status, _) = get_json(f.server.router(), "/api/v1/chats", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = get_json(f.server.router(), "/api/v1/chats", Some("garbage")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn ws_requires_auth() {
        let f = fixture();
        let (status, _) = get_json(f.server.router(), "/ws", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn list_chats_returns_previews() {
        let f = fixture();
        let (me, peer) = (UserId::random(), UserId::random());
        seed(&f.store, peer, me, 3).await;
        let token = f.auth.issue(&me).unwrap();

        let (status, json) = get_json(f.server.router(), "/api/v1/chats", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["peerId"], peer.to_string());
        assert_eq!(json[0]["unread"], 3);
        assert_eq!(json[0]["lastMessage"], "m2");
    }

    #[tokio::test]
    async fn history_is_keyed_to_peer_and_clamped() {
        let f = fixture();
        let (me, peer) = (UserId::random(), UserId::random());
        seed(&f.store, me, peer, 60).await;
        let token = f.auth.issue(&me).unwrap();

        let uri = format!("/api/v1/chats/{peer}?limit=500");
        let (status, json) = get_json(f.server.router(), &uri, Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        let items = json.as_array().unwrap();
        assert_eq!(items.len(), 50);
        assert_eq!(items[0]["kind"], "message");
        assert_eq!(items[0]["chatKey"], peer.to_string());
        assert_eq!(items[0]["author"], true);
        assert_eq!(items[0]["content"], "m59");

        let uri = format!("/api/v1/chats/{peer}?offset=58&limit=10");
        let (_, json) = get_json(f.server.router(), &uri, Some(&token)).await;
        assert_eq!(json.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn history_rejects_bad_peer() {
        let f = fixture();
        let me = UserId::random();
        let token = f.auth.issue(&me).unwrap();

        let (status, json) =
            get_json(f.server.router(), "/api/v1/chats/not-a-user", Some(&token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "BAD_REQUEST");

        let uri = format!("/api/v1/chats/{me}");
        let (status, _) = get_json(f.server.router(), &uri, Some(&token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    async fn get_text(app: Router, uri: &str) -> (StatusCode, String) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_recorder() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let server = fixture().server.with_metrics(recorder.handle());
        ::metrics::with_local_recorder(&recorder, || {
            ::metrics::counter!(crate::metrics::WS_CONNECTIONS_TOTAL).increment(3);
        });

        let (status, body) = get_text(server.router(), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("ws_connections_total 3"), "{body}");
    }

    #[tokio::test]
    async fn metrics_endpoint_without_recorder_is_404() {
        let f = fixture();
        let (status, _) = get_text(f.server.router(), "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let f = fixture();
        let (status, _) = get_json(f.server.router(), "/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn zero_heartbeat_disables_pings() {
        let settings = ServerSettings {
            heartbeat_interval_secs: 0,
            ..ServerSettings::default()
        };
        assert!(RouterConfig::from(&settings).heartbeat.is_none());
        assert_eq!(
            RouterConfig::from(&ServerSettings::default()).heartbeat,
            Some(Duration::from_secs(30))
        );
    }
}
