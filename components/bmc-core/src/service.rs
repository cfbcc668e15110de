//! The `Service` trait every supervised component implements, and the
//! descriptor types the supervision tree and Operator use to track them
//! (spec.md §3 "Service descriptor" / "Supervision node").

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Why a service's `run` returned.
#[derive(Debug)]
pub enum ExitCause {
    /// The supervising context was cancelled; `run` unwound cleanly.
    Cancelled,
    /// The service encountered a fatal, non-recoverable condition.
    Fatal(anyhow::Error),
}

impl fmt::Display for ExitCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitCause::Cancelled => write!(f, "cancelled"),
            ExitCause::Fatal(e) => write!(f, "fatal: {e}"),
        }
    }
}

/// A long-running, bus-attached component. Every concrete service (state
/// manager, power manager, sensor monitor, thermal manager, gateway, ...)
/// implements this and is registered with the supervision tree.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Stable name, unique within one process.
    fn name(&self) -> &str;

    /// Run until `cancel` fires or a fatal fault occurs. Implementations
    /// must drain bus subscriptions before returning.
    async fn run(&self, cancel: CancellationToken) -> Result<(), ExitCause>;
}

/// Restart policy for a supervised child (spec.md §3 / §4.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Always restart on exit, including a clean cancellation-caused exit
    /// that happens before the root context was cancelled.
    Permanent,
    /// Restart only on an error exit that isn't the root cancellation cause.
    Transient,
    /// Never restart.
    Temporary,
}

/// Static configuration for one supervised child.
#[derive(Clone, Debug)]
pub struct ChildSpec {
    pub name: String,
    pub restart_policy: RestartPolicy,
    pub shutdown_timeout: Duration,
}

impl ChildSpec {
    pub fn new(name: impl Into<String>, restart_policy: RestartPolicy) -> Self {
        ChildSpec {
            name: name.into(),
            restart_policy,
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}
