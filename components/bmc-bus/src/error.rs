use thiserror::Error;

use bmc_core::CoreError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("no responders for subject")]
    NoResponders,
    #[error("request timed out")]
    Timeout,
    #[error("bus connection closed")]
    ConnectionClosed,
    #[error("invalid subject: {0}")]
    InvalidSubject(String),
    #[error("stream error: {0}")]
    Stream(String),
}

impl From<BusError> for CoreError {
    fn from(e: BusError) -> Self {
        match e {
            BusError::NoResponders => CoreError::NoResponders,
            BusError::Timeout => CoreError::Timeout,
            BusError::ConnectionClosed => CoreError::ConnectionClosed,
            BusError::InvalidSubject(s) => CoreError::InvalidSubject(s),
            BusError::Stream(s) => CoreError::Internal(s),
        }
    }
}
