use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{get, post},
    Router,
};
use routes::{
    ask::{ask_classified, ask_question},
    ingest::ingest_text,
    liveness::live,
    readiness::ready,
    stats::collection_stats,
};

pub mod api_state;
pub mod error;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public endpoints for k8s/systemd probes
    let public = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    let engine = Router::new()
        .route(
            "/ingest",
            post(ingest_text).layer(DefaultBodyLimit::max(
                app_state.config.ingest_max_body_bytes,
            )),
        )
        .route("/ask", post(ask_question))
        .route("/ask-classified", post(ask_classified))
        .route("/stats", get(collection_stats));

    public.merge(engine)
}
