//! Mock sensor backend (spec.md §4.6): a configurable base value
//! perturbed by a sine wave plus Gaussian-ish noise, with optional
//! probabilistic failure injection for exercising the error path.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rand::Rng;

use crate::config::MockSensorConfig;
use crate::error::SensorMonError;

use super::SensorBackend;

pub struct MockSensorBackend {
    config: MockSensorConfig,
}

impl MockSensorBackend {
    pub fn new(config: MockSensorConfig) -> Self {
        MockSensorBackend { config }
    }
}

#[async_trait]
impl SensorBackend for MockSensorBackend {
    async fn read(&self) -> Result<f64, SensorMonError> {
        if self.config.failure_probability > 0.0 {
            let roll: f64 = rand::thread_rng().gen();
            if roll < self.config.failure_probability {
                return Err(SensorMonError::BackendFailure("injected mock failure".to_owned()));
            }
        }

        let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64();
        let period = self.config.sine_period.as_secs_f64().max(1.0);
        let phase = (elapsed / period) * std::f64::consts::TAU;
        let sine = self.config.sine_amplitude * phase.sin();
        let noise = if self.config.noise > 0.0 {
            rand::thread_rng().gen_range(-self.config.noise..=self.config.noise)
        } else {
            0.0
        };
        Ok(self.config.base_value + sine + noise)
    }
}
