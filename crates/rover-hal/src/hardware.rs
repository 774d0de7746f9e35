//! [`RoverHardware`] – the bundle of driver handles a rover is assembled
//! from.
//!
//! Every handle is optional. A subsystem whose hardware is absent is either
//! not constructed at all (audio, video, display) or answers every request
//! with [`RoverError::NotInitialized`][rover_types::RoverError::NotInitialized]
//! (motors, servo, headlight).

use crate::audio::AudioHost;
use crate::camera::Camera;
use crate::display::BitmapDisplay;
use crate::pin::DigitalPin;
use crate::pwm::PwmOutput;

/// The four H-bridge inputs of the differential drive.
#[derive(Default)]
pub struct MotorPins {
    pub left_fwd: Option<Box<dyn DigitalPin>>,
    pub left_bwd: Option<Box<dyn DigitalPin>>,
    pub right_fwd: Option<Box<dyn DigitalPin>>,
    pub right_bwd: Option<Box<dyn DigitalPin>>,
}

impl MotorPins {
    /// Bundle all four drive pins.
    pub fn new(
        left_fwd: Box<dyn DigitalPin>,
        left_bwd: Box<dyn DigitalPin>,
        right_fwd: Box<dyn DigitalPin>,
        right_bwd: Box<dyn DigitalPin>,
    ) -> Self {
        Self {
            left_fwd: Some(left_fwd),
            left_bwd: Some(left_bwd),
            right_fwd: Some(right_fwd),
            right_bwd: Some(right_bwd),
        }
    }

    /// `true` only when every pin is present. A partial set is treated as
    /// no drive at all.
    pub fn is_complete(&self) -> bool {
        self.left_fwd.is_some()
            && self.left_bwd.is_some()
            && self.right_fwd.is_some()
            && self.right_bwd.is_some()
    }
}

/// Driver handles for one rover.
#[derive(Default)]
pub struct RoverHardware {
    pub motors: MotorPins,
    pub servo: Option<Box<dyn PwmOutput>>,
    pub headlight: Option<Box<dyn DigitalPin>>,
    pub camera: Option<Box<dyn Camera>>,
    pub audio: Option<Box<dyn AudioHost>>,
    pub display: Option<Box<dyn BitmapDisplay>>,
}

impl RoverHardware {
    /// An empty bundle: every subsystem reports itself uninitialized.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_motors(mut self, motors: MotorPins) -> Self {
        self.motors = motors;
        self
    }

    pub fn with_servo(mut self, servo: Box<dyn PwmOutput>) -> Self {
        self.servo = Some(servo);
        self
    }

    pub fn with_headlight(mut self, pin: Box<dyn DigitalPin>) -> Self {
        self.headlight = Some(pin);
        self
    }

    pub fn with_camera(mut self, camera: Box<dyn Camera>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn with_audio(mut self, host: Box<dyn AudioHost>) -> Self {
        self.audio = Some(host);
        self
    }

    pub fn with_display(mut self, display: Box<dyn BitmapDisplay>) -> Self {
        self.display = Some(display);
        self
    }

    /// Short inventory for the startup log, e.g. `"motors servo camera"`.
    pub fn inventory(&self) -> String {
        let mut parts = Vec::new();
        if self.motors.is_complete() {
            parts.push("motors");
        }
        if self.servo.is_some() {
            parts.push("servo");
        }
        if self.headlight.is_some() {
            parts.push("headlight");
        }
        if self.camera.is_some() {
            parts.push("camera");
        }
        if self.audio.is_some() {
            parts.push("audio");
        }
        if self.display.is_some() {
            parts.push("display");
        }
        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join(" ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{PinLog, SimPin};

    #[test]
    fn empty_bundle_has_no_inventory() {
        let hw = RoverHardware::new();
        assert!(!hw.motors.is_complete());
        assert_eq!(hw.inventory(), "none");
    }

    #[test]
    fn partial_motor_set_is_incomplete() {
        let log = PinLog::default();
        let motors = MotorPins {
            left_fwd: Some(SimPin::new("lf", log.clone())),
            ..MotorPins::default()
        };
        assert!(!motors.is_complete());
    }

    #[test]
    fn inventory_lists_present_handles() {
        let log = PinLog::default();
        let hw = RoverHardware::new()
            .with_motors(MotorPins::new(
                SimPin::new("lf", log.clone()),
                SimPin::new("lb", log.clone()),
                SimPin::new("rf", log.clone()),
                SimPin::new("rb", log.clone()),
            ))
            .with_headlight(SimPin::new("light", log));
        assert_eq!(hw.inventory(), "motors headlight");
    }
}
