//! `FramecastServer`: axum HTTP + WebSocket surface.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use framecast_core::codec::{BmpCodec, DataUriEncoder, FrameEncoder};
use framecast_core::keys::SessionKey;
use framecast_settings::FramecastSettings;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::errors::SessionError;
use crate::health::{self, HealthResponse};
use crate::metrics::SESSION_REJECTIONS_TOTAL;
use crate::registry::{ProducerFactory, RegistryConfig, SessionRegistry};
use crate::shutdown::{ShutdownCoordinator, ShutdownOutcome};
use crate::websocket::{StreamContext, serve_connection};

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session registry.
    pub registry: Arc<SessionRegistry>,
    /// Per-connection stream settings.
    pub stream: Arc<StreamContext>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The framecast server.
pub struct FramecastServer {
    settings: FramecastSettings,
    registry: Arc<SessionRegistry>,
    stream: Arc<StreamContext>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl FramecastServer {
    /// Server with the configured pattern and the BMP data-URI encoder.
    pub fn new(settings: FramecastSettings) -> framecast_settings::Result<Self> {
        let pattern = settings.session.pattern;
        let producers: ProducerFactory = Arc::new(move || pattern.producer());
        Self::from_parts(settings, producers, Arc::new(DataUriEncoder::new(BmpCodec)))
    }

    /// Server with explicit producer factory and encoder.
    ///
    /// Fails when `settings` do not validate; zero intervals would panic
    /// the pacing and monitor timers.
    pub fn from_parts(
        settings: FramecastSettings,
        producers: ProducerFactory,
        encoder: Arc<dyn FrameEncoder>,
    ) -> framecast_settings::Result<Self> {
        settings.validate()?;
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let registry = SessionRegistry::new(RegistryConfig::from_settings(&settings), producers);
        let stream = Arc::new(StreamContext::from_settings(
            &settings,
            encoder,
            shutdown.child_token(),
        ));
        Ok(Self {
            settings,
            registry,
            stream,
            shutdown,
            start_time: Instant::now(),
            metrics: None,
        })
    }

    /// Serve `/metrics` from this Prometheus handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            stream: self.stream.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/new", get(new_session_handler))
            .route("/frame/{key}", get(frame_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve in the background.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task,
    /// which finishes after [`ShutdownCoordinator::shutdown`].
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.settings.server.host, self.settings.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "framecast server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                warn!(error = %e, "server error");
            }
        });
        Ok((local_addr, handle))
    }

    /// Stop accepting connections, close every stream and drain the registry.
    pub async fn shutdown(&self, serve: JoinHandle<()>) -> ShutdownOutcome {
        let outcome = self.shutdown.graceful_shutdown(vec![serve], None).await;
        self.registry.shutdown();
        info!(?outcome, "framecast server stopped");
        outcome
    }

    /// Session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Shutdown coordinator.
    pub fn shutdown_coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Loaded settings.
    pub fn settings(&self) -> &FramecastSettings {
        &self.settings
    }
}

fn reject(err: SessionError) -> Response {
    debug!(error = %err, "request rejected");
    counter!(SESSION_REJECTIONS_TOTAL, "kind" => err.error_kind()).increment(1);
    err.into_response()
}

/// `GET /new`: issue a session key.
async fn new_session_handler(State(state): State<AppState>) -> Response {
    match state.registry.create() {
        Ok(key) => key.to_string().into_response(),
        Err(e) => reject(e),
    }
}

/// `GET /frame/{key}`: claim the session, then upgrade.
///
/// The key is validated and claimed before the upgrade so rejections are
/// plain HTTP responses.
async fn frame_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(key) = SessionKey::parse(&key) else {
        return reject(SessionError::InvalidKey);
    };
    let attachment = match state.registry.claim(&key) {
        Ok(attachment) => attachment,
        Err(e) => return reject(e),
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!(session = %key, "request was not a websocket upgrade");
            drop(attachment);
            return rejection.into_response();
        }
    };

    let ctx = state.stream.clone();
    ws.on_upgrade(move |socket| async move {
        let _ = serve_connection(socket, attachment, ctx).await;
    })
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.len(),
        state.registry.streaming_count(),
    ))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
