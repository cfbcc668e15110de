//! Cooling device actuation (spec.md §4.7 "writing the clamped value to
//! the device backend (hwmon pwm path, or mock)"). `level` is a percentage
//! in `[0, 100]`; the hwmon backend scales it to the kernel's `0..=255`
//! pwm range.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::CoolingDeviceConfig;
use crate::error::ThermalMgrError;

#[async_trait]
pub trait CoolingBackend: Send + Sync {
    async fn set_level(&self, device: &CoolingDeviceConfig, level: f64) -> Result<(), ThermalMgrError>;
}

pub struct HwmonCoolingBackend;

impl HwmonCoolingBackend {
    pub fn new() -> Self {
        HwmonCoolingBackend
    }
}

impl Default for HwmonCoolingBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoolingBackend for HwmonCoolingBackend {
    async fn set_level(&self, device: &CoolingDeviceConfig, level: f64) -> Result<(), ThermalMgrError> {
        let path = device
            .pwm_path
            .clone()
            .ok_or_else(|| ThermalMgrError::InvalidConfiguration(format!("{:?} has no pwm path configured", device.id)))?;
        let pwm_value = (level.clamp(0.0, 100.0) / 100.0 * 255.0).round() as u8;
        tokio::fs::write(&path, pwm_value.to_string())
            .await
            .map_err(|e| ThermalMgrError::BackendFailure(format!("write {path}: {e}")))
    }
}

#[derive(Default)]
pub struct MockCoolingBackend {
    levels: Mutex<HashMap<String, f64>>,
}

impl MockCoolingBackend {
    pub fn new() -> Self {
        MockCoolingBackend::default()
    }

    pub fn level_of(&self, id: &str) -> Option<f64> {
        self.levels.lock().get(id).copied()
    }
}

#[async_trait]
impl CoolingBackend for MockCoolingBackend {
    async fn set_level(&self, device: &CoolingDeviceConfig, level: f64) -> Result<(), ThermalMgrError> {
        self.levels.lock().insert(device.id.clone(), level.clamp(0.0, 100.0));
        Ok(())
    }
}
