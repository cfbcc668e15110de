//! HTTP/1.1 + HTTP/2 + HTTP/3 protocol gateway (spec.md §4.8): TLS
//! termination, RPC method validation, and forwarding onto the bus. The
//! wire schema for request/response bodies is explicitly out of scope
//! (spec.md §1); this crate only owns the method table, the body
//! forwarded byte-for-byte between client and bus, and the three
//! listeners that carry it.

pub mod config;
pub mod dispatch;
pub mod http_api;
pub mod quic;
pub mod redirect;
pub mod rpc;
pub mod service;
pub mod tls;

pub use config::{GatewayConfig, GatewayConfigBuilder, TlsSource};
pub use service::Gateway;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Tls(#[from] tls::TlsError),
    #[error(transparent)]
    Dispatch(#[from] dispatch::DispatchError),
    #[error(transparent)]
    Quic(#[from] quic::QuicError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
