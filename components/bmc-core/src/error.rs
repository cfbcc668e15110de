use thiserror::Error;

/// The closed set of error kinds every service in the control plane must be
/// able to raise. Concrete services wrap this in their own error enum rather
/// than returning it bare, but the RPC edge (bmc-gateway) maps every service
/// error back down to one of these kinds before translating to an RPC code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("not connected")]
    NotConnected,

    #[error("no responders for subject")]
    NoResponders,

    #[error("request timed out")]
    Timeout,

    #[error("resource busy")]
    Busy,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid subject: {0}")]
    InvalidSubject(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backend failure: {0}")]
    BackendFailure(String),

    #[error("bus connection closed")]
    ConnectionClosed,

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The RPC status-code family this error kind maps to at the gateway
    /// edge (spec.md §7). Kept here, not in bmc-gateway, so every service
    /// gets the same mapping regardless of which crate raises it.
    pub fn rpc_code(&self) -> RpcCode {
        match self {
            CoreError::InvalidConfiguration(_) => RpcCode::FailedPrecondition,
            CoreError::NotConnected | CoreError::NoResponders | CoreError::ConnectionClosed => {
                RpcCode::Unavailable
            }
            CoreError::Timeout => RpcCode::DeadlineExceeded,
            CoreError::Busy => RpcCode::Unavailable,
            CoreError::InvalidArgument(_) | CoreError::InvalidSubject(_) => {
                RpcCode::InvalidArgument
            }
            CoreError::NotFound(_) => RpcCode::NotFound,
            CoreError::BackendFailure(_) => RpcCode::Internal,
            CoreError::Internal(_) => RpcCode::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcCode {
    InvalidArgument,
    NotFound,
    Unavailable,
    DeadlineExceeded,
    FailedPrecondition,
    Internal,
}
