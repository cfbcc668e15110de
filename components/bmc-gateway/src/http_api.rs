//! The axum `Router` shared by the HTTP/2-over-TLS and HTTP/3 listeners
//! (spec.md §4.8). RPC routes forward to the bus; everything else falls
//! back to static assets when a `web_ui_dir` is configured.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path as AxumPath, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use bmc_bus::BusProvider;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::dispatch::{dispatch, DispatchError};

#[derive(Clone)]
pub struct ApiState {
    pub bus: Arc<dyn BusProvider>,
    pub request_deadline: Duration,
}

/// Build the router. `web_ui_dir`, if present, is mounted as a fallback
/// service serving static assets (spec.md §4.8's Content-Type-gated
/// fallback: JSON API requests never fall through to it because they
/// always hit one of the named RPC routes first).
pub fn router(state: ApiState, web_ui_dir: Option<&std::path::Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/api/v1/:method", post(invoke_method))
        .route("/api/v1/:method/:name", post(invoke_method_with_name))
        .route("/healthz", get(healthz))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    if let Some(dir) = web_ui_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
}

async fn healthz() -> &'static str {
    "ok"
}

async fn invoke_method(
    State(state): State<ApiState>,
    AxumPath(method): AxumPath<String>,
    body: Bytes,
) -> Response {
    invoke(&state, &method, None, body).await
}

async fn invoke_method_with_name(
    State(state): State<ApiState>,
    AxumPath((method, name)): AxumPath<(String, String)>,
    body: Bytes,
) -> Response {
    invoke(&state, &method, Some(name.as_str()), body).await
}

async fn invoke(state: &ApiState, method: &str, name: Option<&str>, body: Bytes) -> Response {
    match dispatch(&state.bus, method, name, body.to_vec(), state.request_deadline).await {
        Ok(reply) => match crate::dispatch::unmarshal::<serde_json::Value>(&reply) {
            Ok(value) => axum::Json(value).into_response(),
            Err(err) => error_response(&err),
        },
        Err(err) => error_response(&err),
    }
}

fn error_response(err: &DispatchError) -> Response {
    let status = match err.rpc_code() {
        bmc_core::RpcCode::NotFound => StatusCode::NOT_FOUND,
        bmc_core::RpcCode::InvalidArgument => StatusCode::BAD_REQUEST,
        bmc_core::RpcCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        bmc_core::RpcCode::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        bmc_core::RpcCode::FailedPrecondition => StatusCode::CONFLICT,
        bmc_core::RpcCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = serde_json::json!({ "error": err.public_message() });
    (status, axum::Json(body)).into_response()
}
