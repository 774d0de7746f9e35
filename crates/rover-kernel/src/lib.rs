//! `rover-kernel` – Actuator safety core.
//!
//! Everything that physically moves the rover goes through this crate. It
//! does not decide *what* to do; it enforces *how*: a global interlock, one
//! drive pulse at a time, angle limits for the pan servo.
//!
//! # Modules
//!
//! - [`interlock`] – [`Interlock`]: the shared handbrake flag.
//! - [`motors`] – [`MotorBank`]: direction → H-bridge pin mapping.
//! - [`servo`] – [`Servo`]: angle → duty-cycle conversion and settle pulse.
//! - [`controller`] – [`ActuatorController`]: the serialised front door for
//!   drive, servo, headlight and interlock requests.

pub mod controller;
pub mod interlock;
pub mod motors;
pub mod servo;

pub use controller::{ActuatorConfig, ActuatorController};
pub use interlock::Interlock;
pub use motors::MotorBank;
pub use servo::Servo;
