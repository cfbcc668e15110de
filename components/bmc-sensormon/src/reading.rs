//! A single sensor observation (spec.md §3 "A reading is
//! `{sensor-id, value, timestamp, status}`").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadingStatus {
    Ok,
    Warning,
    Critical,
    Error,
}

impl ReadingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadingStatus::Ok => "ok",
            ReadingStatus::Warning => "warning",
            ReadingStatus::Critical => "critical",
            ReadingStatus::Error => "error",
        }
    }

    /// Higher is more severe; used by the hysteresis state machine to tell
    /// whether a transition is an escalation or a recovery.
    pub fn severity(self) -> u8 {
        match self {
            ReadingStatus::Ok => 0,
            ReadingStatus::Warning => 1,
            ReadingStatus::Critical => 2,
            ReadingStatus::Error => 3,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: String,
    pub value: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub status: ReadingStatus,
}
