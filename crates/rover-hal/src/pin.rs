//! Generic `DigitalPin` trait for on/off output lines (motor driver inputs,
//! headlight, …).

use rover_types::RoverError;

/// A single digital output line.
pub trait DigitalPin: Send {
    /// Stable identifier for this pin, e.g. `"left_motor_fwd"`.
    fn id(&self) -> &str;

    /// Drive the line high (`true`) or low (`false`).
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::Device`] if the write cannot be applied.
    fn write(&mut self, high: bool) -> Result<(), RoverError>;

    /// Last level written to the line.
    fn is_high(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockPin {
        id: String,
        high: bool,
    }

    impl DigitalPin for MockPin {
        fn id(&self) -> &str {
            &self.id
        }

        fn write(&mut self, high: bool) -> Result<(), RoverError> {
            self.high = high;
            Ok(())
        }

        fn is_high(&self) -> bool {
            self.high
        }
    }

    #[test]
    fn mock_pin_toggle() {
        let mut pin = MockPin {
            id: "headlight".to_string(),
            high: false,
        };
        assert_eq!(pin.id(), "headlight");

        pin.write(true).unwrap();
        assert!(pin.is_high());

        pin.write(false).unwrap();
        assert!(!pin.is_high());
    }
}
