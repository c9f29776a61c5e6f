use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::get,
    Json, Router,
};
use futures_util::Stream;
use oracle_estimator::{EstimateReader, ReadinessChecker};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{GasEstimateResponse, StreamUpdate};

#[derive(Clone)]
struct ApiState {
    reader: Arc<dyn EstimateReader>,
    checker: Arc<dyn ReadinessChecker>,
    stream_interval: Duration,
}

/// HTTP server publishing the current estimate bundle.
pub struct ApiServer {
    listen_addr: SocketAddr,
    state: ApiState,
}

impl ApiServer {
    pub fn new(
        listen_addr: SocketAddr,
        reader: Arc<dyn EstimateReader>,
        checker: Arc<dyn ReadinessChecker>,
        stream_interval: Duration,
    ) -> Self {
        Self { listen_addr, state: ApiState { reader, checker, stream_interval } }
    }

    /// The route table; exposed separately so tests can drive it in-process.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/v1/gas/estimate", get(estimate_handler))
            .route("/v1/gas/estimate/stream", get(stream_handler))
            .route("/healthz", get(healthz_handler))
            .route("/readyz", get(readyz_handler))
            .with_state(self.state.clone())
    }

    /// Serves until the token is cancelled.
    pub async fn listen(self, token: CancellationToken) -> std::io::Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.listen_addr).await?;
        info!(address = %listener.local_addr()?, "starting api server");

        axum::serve(listener, router)
            .with_graceful_shutdown(token.cancelled_owned())
            .await
    }
}

async fn estimate_handler(State(state): State<ApiState>) -> impl IntoResponse {
    match state.reader.current() {
        Ok(bundle) => {
            (StatusCode::OK, Json(json!(GasEstimateResponse::from(bundle.as_ref()))))
        }
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "estimator not ready"})),
        ),
    }
}

/// Server-sent events; one event per observed block-number change, polled at
/// the recomputation cadence.
async fn stream_handler(
    State(state): State<ApiState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = futures_util::stream::unfold((state, 0u64), |(state, last_block)| async move {
        loop {
            tokio::time::sleep(state.stream_interval).await;

            let Ok(bundle) = state.reader.current() else { continue };
            if bundle.block_number == last_block {
                continue;
            }

            let Ok(event) = Event::default().json_data(StreamUpdate::from(bundle.as_ref()))
            else {
                continue;
            };
            let block = bundle.block_number;
            return Some((Ok(event), (state, block)));
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Liveness: the process is up.
async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "alive"})))
}

/// Readiness: at least one bundle has been published.
async fn readyz_handler(State(state): State<ApiState>) -> impl IntoResponse {
    if state.checker.ready() {
        (StatusCode::OK, Json(json!({"status": "ready"})))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "not_ready"})))
    }
}
