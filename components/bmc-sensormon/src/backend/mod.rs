//! Backend trait every sensor reads through, plus the hwmon, GPIO and mock
//! implementations (spec.md §4.6).

pub mod gpio;
pub mod hwmon;
pub mod mock;

use async_trait::async_trait;

use crate::error::SensorMonError;

#[async_trait]
pub trait SensorBackend: Send + Sync {
    async fn read(&self) -> Result<f64, SensorMonError>;
}
