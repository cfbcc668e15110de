//! GPIO sensor backend (spec.md §4.6 "binary presence/value on a line").
//! Reports the line's raw value as `0.0`/`1.0`.

use async_trait::async_trait;
use gpio_cdev::{Chip, LineRequestFlags};

use crate::config::GpioSensorConfig;
use crate::error::SensorMonError;

use super::SensorBackend;

pub struct GpioSensorBackend {
    config: GpioSensorConfig,
}

impl GpioSensorBackend {
    pub fn new(config: GpioSensorConfig) -> Self {
        GpioSensorBackend { config }
    }
}

#[async_trait]
impl SensorBackend for GpioSensorBackend {
    async fn read(&self) -> Result<f64, SensorMonError> {
        let chip_path = self.config.chip.clone();
        let line_offset = self.config.line;
        tokio::task::spawn_blocking(move || -> Result<f64, SensorMonError> {
            let mut chip = Chip::new(&chip_path)
                .map_err(|e| SensorMonError::BackendFailure(format!("open chip {chip_path:?}: {e}")))?;
            let line = chip
                .get_line(line_offset)
                .map_err(|e| SensorMonError::BackendFailure(format!("get line {line_offset}: {e}")))?;
            let handle = line
                .request(LineRequestFlags::INPUT, 0, "bmc-sensormon")
                .map_err(|e| SensorMonError::BackendFailure(format!("request line {line_offset}: {e}")))?;
            let value = handle
                .get_value()
                .map_err(|e| SensorMonError::BackendFailure(format!("read line {line_offset}: {e}")))?;
            Ok(value as f64)
        })
        .await
        .map_err(|e| SensorMonError::BackendFailure(format!("gpio task panicked: {e}")))?
    }
}
