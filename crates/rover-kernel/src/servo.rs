//! [`Servo`] – pan servo on a PWM channel.

use std::time::Duration;

use rover_hal::PwmOutput;
use rover_types::RoverError;
use tracing::debug;

/// Pan servo driven by pulse width.
pub struct Servo {
    pwm: Box<dyn PwmOutput>,
    min_pulse_us: u32,
    max_pulse_us: u32,
    settle: Duration,
}

impl Servo {
    pub fn new(
        pwm: Box<dyn PwmOutput>,
        min_pulse_us: u32,
        max_pulse_us: u32,
        settle: Duration,
    ) -> Self {
        Self {
            pwm,
            min_pulse_us,
            max_pulse_us,
            settle,
        }
    }

    /// Pulse width for `angle` degrees, `angle` already validated to
    /// `0..=180`.
    pub fn duty_for(&self, angle: u32) -> u32 {
        let span = self.max_pulse_us.saturating_sub(self.min_pulse_us);
        self.min_pulse_us + span * angle / 180
    }

    /// Drive to `angle`, hold for the settle delay, then cut the pulse.
    ///
    /// Cutting the pulse stops the horn jittering around its target.
    /// `on_positioned` runs once the positioning pulse was accepted, before
    /// the settle delay.
    pub async fn pulse(
        &mut self,
        angle: u32,
        on_positioned: impl FnOnce(),
    ) -> Result<(), RoverError> {
        let duty = self.duty_for(angle);
        debug!(pwm = self.pwm.id(), angle, duty_us = duty, "servo pulse");
        self.pwm.set_duty_cycle(duty)?;
        on_positioned();
        tokio::time::sleep(self.settle).await;
        self.pwm.set_duty_cycle(0)
    }
}
