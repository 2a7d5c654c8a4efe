use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use derive_new::new;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::relayer::RelayerService;

pub mod relay;
pub mod utils;

/// Request headers browsers may send cross-origin
const ALLOWED_HEADERS: [&str; 6] = [
    "x-requested-with",
    "access-control-allow-origin",
    "x-http-method-override",
    "content-type",
    "authorization",
    "accept",
];

#[derive(Clone, Debug, new)]
pub struct ServerState {
    pub service: Arc<RelayerService>,
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::OPTIONS,
            Method::PATCH,
            Method::DELETE,
            Method::POST,
            Method::PUT,
        ])
        .allow_headers(ALLOWED_HEADERS.map(HeaderName::from_static))
}

/// All routes of the relayer:
///  - `route` - POST to enqueue, GET for status
///  - `/metrics` - Prometheus text format
pub fn router(service: Arc<RelayerService>, route: &str) -> Router {
    let state = ServerState::new(service);
    Router::new()
        .route(
            route,
            get(relay::status_handler)
                .post(relay::enqueue_handler)
                .options(relay::options_handler)
                .fallback(relay::method_not_allowed),
        )
        .route("/metrics", get(gather_metrics))
        .layer(cors_layer())
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> eyre::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let address = listener.local_addr()?;
    tracing::info!(%address, "starting server");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Gather available metrics into an encoded (plaintext, OpenMetrics format)
/// report.
async fn gather_metrics(State(state): State<ServerState>) -> impl IntoResponse {
    tracing::debug!("Traversing route for /metrics endpoint for serving Prometheus metrics");
    match state.service.metrics().gather() {
        Ok(metrics) => match String::from_utf8(metrics) {
            Ok(metrics) => (StatusCode::OK, metrics),
            Err(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".into(),
            ),
        },
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to gather metrics".into(),
        ),
    }
}
