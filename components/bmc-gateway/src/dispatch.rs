//! Marshal/forward/unmarshal: the pipeline step shared by the HTTP/2 and
//! HTTP/3 listeners (spec.md §4.8 "Forwarding").

use std::sync::Arc;
use std::time::Duration;

use bmc_bus::BusProvider;
use bmc_core::{CoreError, RpcCode, Subject};
use serde::de::DeserializeOwned;

use crate::rpc::{lookup, RpcMethodError};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown method {0:?}")]
    UnknownMethod(String),
    #[error(transparent)]
    Method(#[from] RpcMethodError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("failed to decode response body: {0}")]
    Unmarshal(String),
}

impl DispatchError {
    /// Map to an RPC status code (spec.md §4.8's error table, §7). The
    /// human-readable message that travels with this never includes file
    /// paths, internal ids or a stack trace (spec.md §7).
    pub fn rpc_code(&self) -> RpcCode {
        match self {
            DispatchError::UnknownMethod(_) => RpcCode::NotFound,
            DispatchError::Method(RpcMethodError::MissingName(_)) => RpcCode::InvalidArgument,
            DispatchError::Method(RpcMethodError::InvalidName(e)) => e.rpc_code(),
            DispatchError::Method(RpcMethodError::UnknownMethod(_)) => RpcCode::NotFound,
            DispatchError::Core(e) => e.rpc_code(),
            DispatchError::Unmarshal(_) => RpcCode::Internal,
        }
    }

    pub fn public_message(&self) -> String {
        match self.rpc_code() {
            RpcCode::NotFound => "not found".to_owned(),
            RpcCode::InvalidArgument => "invalid argument".to_owned(),
            RpcCode::Unavailable => "service unavailable".to_owned(),
            RpcCode::DeadlineExceeded => "deadline exceeded".to_owned(),
            RpcCode::FailedPrecondition => "failed precondition".to_owned(),
            RpcCode::Internal => "internal error".to_owned(),
        }
    }
}

/// Decode a bus reply payload. The wire schema itself is out of scope
/// (spec.md §1); what every service handler actually emits is bare JSON
/// (spec.md §3's bus message is already a discrete, length-delimited
/// unit, so nothing upstream of it needs its own length prefix), and this
/// must decode exactly what `dispatch` put on the bus, unmodified, on the
/// way back.
pub fn unmarshal<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DispatchError> {
    serde_json::from_slice(bytes).map_err(|e| DispatchError::Unmarshal(e.to_string()))
}

/// Resolve `method` to a subject (validating any supplied `name`), issue
/// `bus.request` with the request body forwarded byte-for-byte, and
/// return the raw reply payload. Callers decode the reply with
/// `unmarshal`.
pub async fn dispatch(
    bus: &Arc<dyn BusProvider>,
    method: &str,
    name: Option<&str>,
    request_body: Vec<u8>,
    deadline: Duration,
) -> Result<Vec<u8>, DispatchError> {
    let rpc_method = lookup(method).ok_or_else(|| DispatchError::UnknownMethod(method.to_owned()))?;
    let subject: Subject = rpc_method.subject(name)?;
    let reply = bus.request(&subject, request_body, Some(deadline)).await.map_err(CoreError::from)?;
    Ok(reply.payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        a: u32,
        b: String,
    }

    #[test]
    fn unmarshal_round_trips_bare_json() {
        let value = Sample { a: 7, b: "x".into() };
        let bytes = serde_json::to_vec(&value).unwrap();
        let decoded: Sample = unmarshal(&bytes).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn unmarshal_rejects_malformed_json() {
        let err = unmarshal::<Sample>(b"not json").unwrap_err();
        assert!(matches!(err, DispatchError::Unmarshal(_)));
    }
}
