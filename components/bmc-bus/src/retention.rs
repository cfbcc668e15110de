use std::time::Duration;

/// Stream retention policy (spec.md §3). `None` in any field means that
/// bound doesn't apply; a `Retention::default()` with all `None` fields
/// means "keep forever".
#[derive(Clone, Copy, Debug, Default)]
pub struct Retention {
    pub max_age: Option<Duration>,
    pub max_bytes: Option<u64>,
    pub max_messages: Option<u64>,
}

impl Retention {
    pub fn keep_forever() -> Self {
        Retention::default()
    }

    pub fn bounded(max_age: Duration, max_bytes: u64, max_messages: u64) -> Self {
        Retention {
            max_age: Some(max_age),
            max_bytes: Some(max_bytes),
            max_messages: Some(max_messages),
        }
    }
}
