use std::future::ready;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::deliver::RetryPolicy;
use crate::prometheus::{setup_metrics_recorder, track_metrics};
use crate::relay;
use crate::sink::Ingest;
use crate::time::TimeSource;

#[derive(Clone)]
pub struct State {
    /// None until an ingestion credential is configured; postbacks are then
    /// answered with a configuration error while probes keep working.
    pub client: Option<Arc<dyn Ingest + Send + Sync>>,
    pub timesource: Arc<dyn TimeSource + Send + Sync>,
    pub retry: RetryPolicy,
}

async fn index() -> &'static str {
    "postback-relay"
}

pub fn router<TZ: TimeSource + Send + Sync + 'static>(
    timesource: TZ,
    client: Option<Arc<dyn Ingest + Send + Sync>>,
    retry: RetryPolicy,
    metrics: bool,
) -> Router {
    let state = State {
        client,
        timesource: Arc::new(timesource),
        retry,
    };

    let router = Router::new()
        .route("/", get(index))
        .route("/_liveness", get(index))
        // Providers send postbacks as GETs with query parameters or as
        // JSON POSTs; both land on the same handler.
        .route("/postback", post(relay::postback).get(relay::postback))
        .route("/postback/", post(relay::postback).get(relay::postback))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when the crate is used as a library (during tests etc)
    // does not work well.
    if metrics {
        let recorder_handle = setup_metrics_recorder();
        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
