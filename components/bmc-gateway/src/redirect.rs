//! The plaintext `:80` listener: ACME HTTP-01 challenge responses and an
//! HTTP -> HTTPS redirect for everything else (spec.md §4.8).

use std::net::SocketAddr;

use axum::extract::{Host, Path as AxumPath, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use bmc_certs::acme::ChallengeResponder;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
struct RedirectState {
    responder: ChallengeResponder,
    https_port: u16,
}

pub async fn serve(
    addr: SocketAddr,
    https_port: u16,
    responder: ChallengeResponder,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let state = RedirectState { responder, https_port };
    let router = Router::new()
        .route("/.well-known/acme-challenge/:token", get(challenge))
        .fallback(redirect_to_https)
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "redirect listener bound");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

async fn challenge(State(state): State<RedirectState>, AxumPath(token): AxumPath<String>) -> Response {
    match state.responder.key_authorization_for(&token).await {
        Some(key_authorization) => (StatusCode::OK, key_authorization).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn redirect_to_https(State(state): State<RedirectState>, Host(host): Host, uri: Uri) -> Response {
    let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let host = host.split(':').next().unwrap_or(&host);
    let location = format!("https://{host}:{}{path_and_query}", state.https_port);
    Redirect::permanent(&location).into_response()
}
