//! hwmon backend (spec.md §4.6): discovers a chip under
//! `/sys/class/hwmon/*` by matching its `name` file against
//! `chip-name-pattern`, then reads `input-file-pattern` inside that
//! directory. hwmon temperatures are millidegrees and voltages are
//! millivolts; both are divided by 1000 before being reported.

use async_trait::async_trait;
use glob::Pattern;

use crate::config::HwmonConfig;
use crate::error::SensorMonError;

use super::SensorBackend;

pub struct HwmonBackend {
    config: HwmonConfig,
    /// hwmon paths are renumbered across reboots; `sysfs_root` exists so
    /// tests can point discovery at a fixture directory instead of `/sys`.
    sysfs_root: String,
}

impl HwmonBackend {
    pub fn new(config: HwmonConfig) -> Self {
        HwmonBackend { config, sysfs_root: "/sys/class/hwmon".to_owned() }
    }

    pub fn with_root(config: HwmonConfig, sysfs_root: impl Into<String>) -> Self {
        HwmonBackend { config, sysfs_root: sysfs_root.into() }
    }

    fn discover(&self) -> Result<std::path::PathBuf, SensorMonError> {
        let chip_pattern = Pattern::new(&self.config.chip_name_pattern)
            .map_err(|e| SensorMonError::InvalidConfiguration(format!("bad chip-name-pattern: {e}")))?;
        let input_pattern = Pattern::new(&self.config.input_file_pattern)
            .map_err(|e| SensorMonError::InvalidConfiguration(format!("bad input-file-pattern: {e}")))?;

        let entries = std::fs::read_dir(&self.sysfs_root)
            .map_err(|e| SensorMonError::BackendFailure(format!("read {}: {e}", self.sysfs_root)))?;
        for entry in entries.flatten() {
            let name_file = entry.path().join("name");
            let Ok(chip_name) = std::fs::read_to_string(&name_file) else { continue };
            if !chip_pattern.matches(chip_name.trim()) {
                continue;
            }
            let Ok(files) = std::fs::read_dir(entry.path()) else { continue };
            for file in files.flatten() {
                let Some(file_name) = file.file_name().to_str().map(str::to_owned) else { continue };
                if input_pattern.matches(&file_name) {
                    return Ok(file.path());
                }
            }
        }
        Err(SensorMonError::BackendFailure(format!(
            "no hwmon input matching {:?}/{:?}",
            self.config.chip_name_pattern, self.config.input_file_pattern
        )))
    }
}

#[async_trait]
impl SensorBackend for HwmonBackend {
    async fn read(&self) -> Result<f64, SensorMonError> {
        let path = self.discover()?;
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SensorMonError::BackendFailure(format!("read {}: {e}", path.display())))?;
        let milli: f64 = raw
            .trim()
            .parse()
            .map_err(|e| SensorMonError::BackendFailure(format!("parse {}: {e}", path.display())))?;
        Ok(milli / 1000.0)
    }
}
