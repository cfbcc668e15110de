use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle returned by `subscribe` / `add_endpoint`; pass to
/// `unsubscribe` to tear it down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(pub(crate) u64);

impl SubscriptionToken {
    pub fn next() -> Self {
        SubscriptionToken(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}
