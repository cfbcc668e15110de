use std::collections::HashMap;

use bmc_core::Subject;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A message on the bus: `{subject, payload, headers, reply-to}` per
/// spec.md §3.
#[derive(Clone, Debug)]
pub struct BusMessage {
    pub subject: Subject,
    pub payload: Bytes,
    pub headers: HashMap<String, String>,
    pub reply_to: Option<Subject>,
}

impl BusMessage {
    pub fn new(subject: Subject, payload: impl Into<Bytes>) -> Self {
        BusMessage {
            subject,
            payload: payload.into(),
            headers: HashMap::new(),
            reply_to: None,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// The record shape persisted into a stream file. Distinct from
/// `BusMessage` because individual request/response traffic is never
/// persisted -- only messages explicitly routed into a stream are, and they
/// carry a sequence number and wall-clock timestamp once committed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamRecord {
    pub sequence: u64,
    pub subject: String,
    pub payload: Vec<u8>,
    pub headers: HashMap<String, String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}
