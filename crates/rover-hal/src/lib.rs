//! `rover-hal` – hardware capability interfaces.
//!
//! The control plane never touches a GPIO line, PWM channel, camera or sound
//! card directly. It talks to the narrow traits below; drivers implement
//! them and are handed to the subsystems at construction time through a
//! [`RoverHardware`] bundle.
//!
//! # Modules
//!
//! - [`pin`] – [`DigitalPin`]: set/clear a single output line.
//! - [`pwm`] – [`PwmOutput`]: duty-cycle output with a fixed period.
//! - [`camera`] – [`Camera`]: format negotiation and frame capture.
//! - [`audio`] – [`AudioHost`], [`AudioInput`], [`AudioOutput`]: blocking
//!   PCM streams.
//! - [`display`] – [`BitmapDisplay`]: monochrome pixel display.
//! - [`hardware`] – [`RoverHardware`]: the bundle of optional handles.
//! - [`sim`] – in-process drivers with probes, for tests and headless runs.

pub mod audio;
pub mod camera;
pub mod display;
pub mod hardware;
pub mod pin;
pub mod pwm;
pub mod sim;

pub use audio::{AudioHost, AudioInput, AudioOutput, StreamParams};
pub use camera::Camera;
pub use display::BitmapDisplay;
pub use hardware::{MotorPins, RoverHardware};
pub use pin::DigitalPin;
pub use pwm::PwmOutput;
