//! HTTP/3 listener: a manual accept loop over `quinn`, handing each QUIC
//! connection to `h3` for request/response framing (spec.md §4.8, §6).

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, Bytes};
use h3::server::RequestStream;
use http::{Request, Response, StatusCode};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::http_api::ApiState;

#[derive(Debug, Error)]
pub enum QuicError {
    #[error("quic endpoint bind failed: {0}")]
    Bind(std::io::Error),
    #[error(transparent)]
    Tls(#[from] crate::tls::TlsError),
}

pub async fn serve(
    addr: SocketAddr,
    server_config: quinn::ServerConfig,
    state: ApiState,
    cancel: CancellationToken,
) -> Result<(), QuicError> {
    let endpoint = quinn::Endpoint::server(server_config, addr).map_err(QuicError::Bind)?;
    tracing::info!(%addr, "h3 listener bound");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                endpoint.close(0u32.into(), b"shutting down");
                break;
            }
            incoming = endpoint.accept() => {
                let Some(incoming) = incoming else { break };
                let state = state.clone();
                let conn_cancel = cancel.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(incoming, state, conn_cancel).await {
                        tracing::warn!(%err, "h3 connection ended with an error");
                    }
                });
            }
        }
    }

    Ok(())
}

async fn handle_connection(
    incoming: quinn::Incoming,
    state: ApiState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let connection = incoming.await?;
    let quic_conn = h3_quinn::Connection::new(connection);
    let mut h3_conn = h3::server::Connection::new(quic_conn).await?;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            resolved = h3_conn.accept() => {
                let Some((req, stream)) = resolved? else { break };
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_request(req, stream, state).await {
                        tracing::warn!(%err, "h3 request failed");
                    }
                });
            }
        }
    }

    Ok(())
}

async fn handle_request<T>(
    req: Request<()>,
    mut stream: RequestStream<T, Bytes>,
    state: ApiState,
) -> anyhow::Result<()>
where
    T: h3::quic::BidiStream<Bytes>,
{
    let method = req.method().as_str().to_owned();
    let path = req.uri().path().to_owned();

    let mut body = Vec::new();
    while let Some(chunk) = stream.recv_data().await? {
        body.extend_from_slice(chunk.chunk());
    }

    let (rpc_method, name) = match parse_rpc_path(&path) {
        Some(parts) => parts,
        None => {
            respond(&mut stream, StatusCode::NOT_FOUND, b"not found".to_vec()).await?;
            return Ok(());
        }
    };

    if method != "POST" {
        respond(&mut stream, StatusCode::METHOD_NOT_ALLOWED, b"method not allowed".to_vec()).await?;
        return Ok(());
    }

    match crate::dispatch::dispatch(&state.bus, rpc_method, name.as_deref(), body, state.request_deadline).await {
        Ok(reply) => respond(&mut stream, StatusCode::OK, reply).await?,
        Err(err) => {
            let status = http_status_for(&err);
            let message = err.public_message().into_bytes();
            respond(&mut stream, status, message).await?;
        }
    }

    Ok(())
}

fn http_status_for(err: &crate::dispatch::DispatchError) -> StatusCode {
    match err.rpc_code() {
        bmc_core::RpcCode::NotFound => StatusCode::NOT_FOUND,
        bmc_core::RpcCode::InvalidArgument => StatusCode::BAD_REQUEST,
        bmc_core::RpcCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        bmc_core::RpcCode::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        bmc_core::RpcCode::FailedPrecondition => StatusCode::CONFLICT,
        bmc_core::RpcCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn parse_rpc_path(path: &str) -> Option<(&str, Option<String>)> {
    let rest = path.strip_prefix("/api/v1/")?;
    let mut parts = rest.splitn(2, '/');
    let method = parts.next()?;
    if method.is_empty() {
        return None;
    }
    let name = parts.next().map(|s| s.to_owned());
    Some((method, name))
}

async fn respond<T>(
    stream: &mut RequestStream<T, Bytes>,
    status: StatusCode,
    body: Vec<u8>,
) -> anyhow::Result<()>
where
    T: h3::quic::BidiStream<Bytes>,
{
    let response = Response::builder().status(status).body(()).expect("valid response head");
    stream.send_response(response).await?;
    stream.send_data(Bytes::from(body)).await?;
    stream.finish().await?;
    Ok(())
}
