//! The zone PID control loop's update equation (spec.md §4.7): `error =
//! temperature − target`; `integral += error · Δt`, clamped so
//! `integral · ki` stays within `[output-min, output-max]` (anti-windup);
//! `derivative = (error − last_error) / Δt`; `output = clamp(kp·error +
//! ki·integral + kd·derivative, output-min, output-max)`.

use crate::config::PidGains;

#[derive(Clone, Copy, Debug)]
pub struct Pid {
    gains: PidGains,
    output_min: f64,
    output_max: f64,
    integral: f64,
    last_error: Option<f64>,
}

impl Pid {
    pub fn new(gains: PidGains, output_min: f64, output_max: f64) -> Self {
        Pid { gains, output_min, output_max, integral: 0.0, last_error: None }
    }

    /// Resets `integral` and `last_error` atomically, as required when the
    /// gains are reconfigured (spec.md §4.7 "resets integral and
    /// last-error atomically to avoid a sudden actuator jump").
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = None;
    }

    pub fn set_gains(&mut self, gains: PidGains) {
        self.gains = gains;
        self.reset();
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn update(&mut self, temperature: f64, target: f64, dt_seconds: f64) -> f64 {
        let error = temperature - target;

        let mut integral = self.integral + error * dt_seconds;
        if self.gains.ki != 0.0 {
            let integral_bound = (self.output_max - self.output_min) / self.gains.ki.abs();
            integral = integral.clamp(-integral_bound, integral_bound);
        }
        self.integral = integral;

        let derivative = match self.last_error {
            Some(last) if dt_seconds > 0.0 => (error - last) / dt_seconds,
            _ => 0.0,
        };
        self.last_error = Some(error);

        let output = self.gains.kp * error + self.gains.ki * self.integral + self.gains.kd * derivative;
        output.clamp(self.output_min, self.output_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proportional_only_tracks_error_linearly() {
        let gains = PidGains { kp: 2.0, ki: 0.0, kd: 0.0 };
        let mut pid = Pid::new(gains, 0.0, 100.0);
        let output = pid.update(70.0, 60.0, 1.0);
        assert!((output - 20.0).abs() < 1e-9);
    }

    #[test]
    fn integral_anti_windup_keeps_contribution_bounded() {
        let gains = PidGains { kp: 0.0, ki: 1.0, kd: 0.0 };
        let mut pid = Pid::new(gains, 0.0, 10.0);
        for _ in 0..1000 {
            pid.update(100.0, 0.0, 1.0);
        }
        let output = pid.update(100.0, 0.0, 1.0);
        assert!(output <= 10.0 + 1e-9);
    }

    #[test]
    fn reset_clears_integral_and_last_error() {
        let gains = PidGains { kp: 1.0, ki: 1.0, kd: 1.0 };
        let mut pid = Pid::new(gains, -100.0, 100.0);
        pid.update(70.0, 60.0, 1.0);
        pid.reset();
        // With a fresh derivative term (no last_error) the first update
        // after reset should equal the proportional + integral terms only.
        let output = pid.update(70.0, 60.0, 1.0);
        assert!((output - (1.0 * 10.0 + 1.0 * 10.0)).abs() < 1e-9);
    }
}
