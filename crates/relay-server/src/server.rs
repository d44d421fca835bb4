//! `RelayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Extension, Router};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::http::header::ORIGIN;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use relay_core::ColorPool;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::hub::Hub;
use crate::websocket::lifecycle::LifecycleManager;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connection lifecycle and routing.
    pub lifecycle: Arc<LifecycleManager>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus render handle.
    pub metrics: PrometheusHandle,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
}

/// The relay server.
pub struct RelayServer {
    config: ServerConfig,
    hub: Arc<Hub>,
    lifecycle: Arc<LifecycleManager>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
}

impl RelayServer {
    /// Create a server handing out colors from `colors`.
    pub fn new(config: ServerConfig, colors: ColorPool, metrics: PrometheusHandle) -> Self {
        let hub = Arc::new(Hub::new(colors, config.send_queue_capacity));
        let lifecycle = Arc::new(LifecycleManager::new(hub.clone()));
        Self {
            config,
            hub,
            lifecycle,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            lifecycle: self.lifecycle.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            max_message_size: self.config.max_message_size,
        };

        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the listener and serve on a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task,
    /// which ends once [`ShutdownCoordinator::shutdown`] is called.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let app = self.router();
        let token = self.shutdown.token();
        info!(%local_addr, "relay server listening");

        let handle = tokio::spawn(async move {
            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
            .map_err(ServerError::Serve);
            if let Err(e) = result {
                error!(error = %e, "relay server stopped");
            }
        });

        Ok((local_addr, handle))
    }

    /// Shared relay state.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Connection lifecycle manager.
    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET / and GET /ws: upgrade to a relay session.
///
/// The peer address is only known when served through
/// [`RelayServer::listen`]; a bare [`RelayServer::router`] still upgrades.
async fn ws_handler(
    ws: WebSocketUpgrade,
    connect_info: Option<Extension<ConnectInfo<SocketAddr>>>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let remote = connect_info.map(|Extension(ConnectInfo(addr))| addr);
    let origin = headers
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let AppState {
        lifecycle,
        shutdown,
        max_message_size,
        ..
    } = state;
    ws.max_message_size(max_message_size)
        .max_frame_size(max_message_size)
        .on_upgrade(move |socket| {
            let session = lifecycle.run(socket, remote, origin, shutdown.token());
            shutdown.track(session)
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let hub = state.lifecycle.hub();
    Json(health::health_check(
        state.start_time,
        hub.connection_count(),
        hub.available_colors(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}
