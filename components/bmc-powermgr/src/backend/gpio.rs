//! GPIO-actuated power backend (spec.md §4.5 "GPIO backend"). Power-on
//! pulses the power button line for `power-on-delay`; power-off pulses it
//! for `power-off-delay` and escalates to holding it for `force-off-delay`
//! if the power-status line still reads "on"; reset pulses the reset
//! button for `reset-delay`. Every physical toggle respects the
//! configured active level: `assert` writes the configured active value.

use std::time::Duration;

use async_trait::async_trait;
use gpio_cdev::{Chip, LineRequestFlags};
use tracing::{debug, warn};

use crate::config::{ActiveLevel, GpioLines, PowerComponentConfig};
use crate::error::PowerMgrError;
use crate::state::PowerState;

use super::PowerBackend;

pub struct GpioBackend;

impl GpioBackend {
    pub fn new() -> Self {
        GpioBackend
    }
}

impl Default for GpioBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn active_value(level: ActiveLevel) -> u8 {
    match level {
        ActiveLevel::High => 1,
        ActiveLevel::Low => 0,
    }
}

fn inactive_value(level: ActiveLevel) -> u8 {
    match level {
        ActiveLevel::High => 0,
        ActiveLevel::Low => 1,
    }
}

/// Pulse `line_offset` on `chip` to its active level for `duration`, then
/// release it back to inactive.
async fn pulse(chip: &str, line_offset: u32, level: ActiveLevel, duration: Duration) -> Result<(), PowerMgrError> {
    let chip = chip.to_owned();
    tokio::task::spawn_blocking(move || -> Result<(), PowerMgrError> {
        let mut chip = Chip::new(&chip).map_err(|e| PowerMgrError::BackendFailure(format!("open chip {chip:?}: {e}")))?;
        let line = chip
            .get_line(line_offset)
            .map_err(|e| PowerMgrError::BackendFailure(format!("get line {line_offset}: {e}")))?;
        let handle = line
            .request(LineRequestFlags::OUTPUT, inactive_value(level), "bmc-powermgr")
            .map_err(|e| PowerMgrError::BackendFailure(format!("request line {line_offset}: {e}")))?;
        handle
            .set_value(active_value(level))
            .map_err(|e| PowerMgrError::BackendFailure(format!("assert line {line_offset}: {e}")))?;
        std::thread::sleep(duration);
        handle
            .set_value(inactive_value(level))
            .map_err(|e| PowerMgrError::BackendFailure(format!("deassert line {line_offset}: {e}")))?;
        Ok(())
    })
    .await
    .map_err(|e| PowerMgrError::BackendFailure(format!("gpio task panicked: {e}")))?
}

/// Hold `line_offset` asserted for `duration` without releasing early
/// (used by the force-off escalation).
async fn hold(chip: &str, line_offset: u32, level: ActiveLevel, duration: Duration) -> Result<(), PowerMgrError> {
    pulse(chip, line_offset, level, duration).await
}

async fn read_status(chip: &str, line_offset: u32, level: ActiveLevel) -> Result<PowerState, PowerMgrError> {
    let chip = chip.to_owned();
    tokio::task::spawn_blocking(move || -> Result<PowerState, PowerMgrError> {
        let mut chip = Chip::new(&chip).map_err(|e| PowerMgrError::BackendFailure(format!("open chip {chip:?}: {e}")))?;
        let line = chip
            .get_line(line_offset)
            .map_err(|e| PowerMgrError::BackendFailure(format!("get line {line_offset}: {e}")))?;
        let handle = line
            .request(LineRequestFlags::INPUT, 0, "bmc-powermgr")
            .map_err(|e| PowerMgrError::BackendFailure(format!("request status line: {e}")))?;
        let value = handle
            .get_value()
            .map_err(|e| PowerMgrError::BackendFailure(format!("read status line: {e}")))?;
        Ok(if value == active_value(level) { PowerState::On } else { PowerState::Off })
    })
    .await
    .map_err(|e| PowerMgrError::BackendFailure(format!("gpio task panicked: {e}")))?
}

fn lines(cfg: &PowerComponentConfig) -> Result<&GpioLines, PowerMgrError> {
    cfg.gpio
        .as_ref()
        .ok_or_else(|| PowerMgrError::InvalidConfiguration(format!("{:?} has no gpio lines configured", cfg.name)))
}

#[async_trait]
impl PowerBackend for GpioBackend {
    async fn power_on(&self, cfg: &PowerComponentConfig) -> Result<(), PowerMgrError> {
        let gpio = lines(cfg)?;
        debug!(component = %cfg.name, "gpio power-on pulse");
        pulse(&gpio.chip, gpio.power_button, gpio.active_level, cfg.power_on_delay).await
    }

    async fn power_off(&self, cfg: &PowerComponentConfig) -> Result<(), PowerMgrError> {
        let gpio = lines(cfg)?;
        debug!(component = %cfg.name, "gpio power-off pulse");
        pulse(&gpio.chip, gpio.power_button, gpio.active_level, cfg.power_off_delay).await?;

        tokio::time::sleep(cfg.force_off_delay).await;
        if matches!(read_status(&gpio.chip, gpio.power_status, gpio.active_level).await?, PowerState::On) {
            warn!(component = %cfg.name, "power-status still on after power-off, escalating to force-off hold");
            hold(&gpio.chip, gpio.power_button, gpio.active_level, cfg.force_off_delay).await?;
        }
        Ok(())
    }

    async fn reset(&self, cfg: &PowerComponentConfig) -> Result<(), PowerMgrError> {
        let gpio = lines(cfg)?;
        debug!(component = %cfg.name, "gpio reset pulse");
        pulse(&gpio.chip, gpio.reset_button, gpio.active_level, cfg.reset_delay).await
    }

    async fn force_off(&self, cfg: &PowerComponentConfig) -> Result<(), PowerMgrError> {
        let gpio = lines(cfg)?;
        debug!(component = %cfg.name, "gpio force-off hold");
        hold(&gpio.chip, gpio.power_button, gpio.active_level, cfg.force_off_delay).await
    }

    async fn status(&self, cfg: &PowerComponentConfig) -> Result<PowerState, PowerMgrError> {
        let gpio = lines(cfg)?;
        read_status(&gpio.chip, gpio.power_status, gpio.active_level).await
    }
}
