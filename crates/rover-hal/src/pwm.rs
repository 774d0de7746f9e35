//! Duty-cycle output used to position the pan servo.

use rover_types::RoverError;

/// A PWM channel with a fixed period, addressed in microseconds.
pub trait PwmOutput: Send {
    /// Stable identifier, e.g. the BCM pin number `"23"`.
    fn id(&self) -> &str;

    /// PWM period in microseconds.
    fn period_us(&self) -> u32;

    /// Write a duty cycle that has already been range-checked.
    fn write_duty(&mut self, duty_us: u32) -> Result<(), RoverError>;

    /// Range-check `duty_us` against `0..=period` and write it.
    ///
    /// # Errors
    ///
    /// [`RoverError::InvalidRange`] when `duty_us` exceeds the period;
    /// otherwise whatever [`write_duty`][Self::write_duty] reports.
    fn set_duty_cycle(&mut self, duty_us: u32) -> Result<(), RoverError> {
        if duty_us > self.period_us() {
            return Err(RoverError::out_of_range("duty cycle", i64::from(duty_us)));
        }
        self.write_duty(duty_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockPwm {
        writes: Vec<u32>,
    }

    impl PwmOutput for MockPwm {
        fn id(&self) -> &str {
            "23"
        }

        fn period_us(&self) -> u32 {
            20_000
        }

        fn write_duty(&mut self, duty_us: u32) -> Result<(), RoverError> {
            self.writes.push(duty_us);
            Ok(())
        }
    }

    #[test]
    fn duty_within_period_is_written() {
        let mut pwm = MockPwm { writes: Vec::new() };
        pwm.set_duty_cycle(1250).unwrap();
        pwm.set_duty_cycle(20_000).unwrap();
        assert_eq!(pwm.writes, vec![1250, 20_000]);
    }

    #[test]
    fn duty_above_period_is_rejected_without_write() {
        let mut pwm = MockPwm { writes: Vec::new() };
        let err = pwm.set_duty_cycle(20_001).unwrap_err();
        assert_eq!(err.code(), "INVALID_RANGE");
        assert!(pwm.writes.is_empty());
    }
}
