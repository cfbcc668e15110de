//! One addressable power component: serialises operations against its
//! backend, failing fast with `Busy` if a second request arrives while one
//! is in flight (spec.md §4.5, §5 "at most one operation in flight").

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::backend::PowerBackend;
use crate::config::PowerComponentConfig;
use crate::error::PowerMgrError;
use crate::state::PowerState;

pub struct Component {
    pub config: PowerComponentConfig,
    backend: Arc<dyn PowerBackend>,
    lock: Mutex<()>,
}

impl Component {
    pub fn new(config: PowerComponentConfig, backend: Arc<dyn PowerBackend>) -> Self {
        Component { config, backend, lock: Mutex::new(()) }
    }

    async fn serialized<F, Fut>(&self, op: F) -> Result<PowerState, PowerMgrError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(), PowerMgrError>>,
    {
        let _guard = self.lock.try_lock().map_err(|_| PowerMgrError::Busy(self.config.name.clone()))?;
        match tokio::time::timeout(self.config.operation_timeout, op()).await {
            Ok(Ok(())) => self.backend.status(&self.config).await,
            Ok(Err(e)) => {
                warn!(component = %self.config.name, "power operation failed: {e}");
                Err(e)
            }
            Err(_) => Err(PowerMgrError::Timeout),
        }
    }

    pub async fn power_on(&self) -> Result<PowerState, PowerMgrError> {
        self.serialized(|| self.backend.power_on(&self.config)).await
    }

    pub async fn power_off(&self) -> Result<PowerState, PowerMgrError> {
        self.serialized(|| self.backend.power_off(&self.config)).await
    }

    pub async fn cycle(&self) -> Result<PowerState, PowerMgrError> {
        let _guard = self.lock.try_lock().map_err(|_| PowerMgrError::Busy(self.config.name.clone()))?;
        let op = async {
            self.backend.power_off(&self.config).await?;
            self.backend.power_on(&self.config).await
        };
        match tokio::time::timeout(self.config.operation_timeout, op).await {
            Ok(Ok(())) => self.backend.status(&self.config).await,
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PowerMgrError::Timeout),
        }
    }

    pub async fn reset(&self) -> Result<PowerState, PowerMgrError> {
        self.serialized(|| self.backend.reset(&self.config)).await
    }

    pub async fn force_off(&self) -> Result<PowerState, PowerMgrError> {
        self.serialized(|| self.backend.force_off(&self.config)).await
    }

    pub async fn status(&self) -> Result<PowerState, PowerMgrError> {
        self.backend.status(&self.config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::config::ComponentKind;
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_requests_fail_fast_with_busy() {
        let mut cfg = PowerComponentConfig::mock("host-0", ComponentKind::Host);
        cfg.operation_delay = Duration::from_millis(100);
        cfg.power_state_delay = Duration::from_millis(100);
        let component = Arc::new(Component::new(cfg, Arc::new(MockBackend::new())));

        let a = component.clone();
        let first = tokio::spawn(async move { a.power_on().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = component.power_on().await;

        assert!(matches!(second, Err(PowerMgrError::Busy(_))));
        assert!(first.await.unwrap().is_ok());
    }
}
