//! Deadline helpers shared by the bus, backends and the gateway. Spec.md §5
//! requires every outbound request, backend call, TLS handshake and HTTP
//! read/write to be bounded; this is the one place that default is defined.

use std::time::Duration;

/// The default deadline injected when a caller doesn't supply one
/// (spec.md §4.1, §4.8).
pub const DEFAULT_REQUEST_DEADLINE: Duration = Duration::from_secs(5);

/// Run `fut` under `deadline`, mapping an elapsed timer to `None` so callers
/// can fold it into their own error type without pulling in a core error
/// dependency here.
pub async fn with_deadline<T>(
    deadline: Duration,
    fut: impl std::future::Future<Output = T>,
) -> Option<T> {
    tokio::time::timeout(deadline, fut).await.ok()
}
