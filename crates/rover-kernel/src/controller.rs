//! [`ActuatorController`] – the single front door to everything that moves.
//!
//! # Serialisation
//!
//! - Drive pulses are serialised process-wide by an async *drive turn*: a
//!   second `drive` waits until the first has released its pins.
//! - The motor pins themselves sit behind a short synchronous lock that is
//!   held only while pins are written. [`ActuatorController::set_interlock`]
//!   takes that lock but not the drive turn, so engaging the interlock stops
//!   the motors even in the middle of a pulse.
//! - The servo lane (servo, current angle, step) is one async lock held for
//!   the full pulse-and-settle, so concurrent moves never interleave.
//!
//! A drive future that is dropped mid-pulse (for example because the
//! operator connection went away) still de-asserts every motor pin.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rover_hal::{DigitalPin, PwmOutput, RoverHardware};
use rover_types::{ActuatorState, Direction, RoverError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::interlock::Interlock;
use crate::motors::MotorBank;
use crate::servo::Servo;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Tunables for the actuator core. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    /// Pulse width at 0°.
    pub servo_min_pulse_us: u32,
    /// Pulse width at 180°.
    pub servo_max_pulse_us: u32,
    /// How long the positioning pulse is held before it is cut.
    pub servo_settle_ms: u64,
    pub initial_servo_angle: i64,
    pub initial_servo_step: i64,
    /// Longest accepted drive pulse.
    pub max_drive_ms: u64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            servo_min_pulse_us: 500,
            servo_max_pulse_us: 2000,
            servo_settle_ms: 150,
            initial_servo_angle: 90,
            initial_servo_step: 30,
            max_drive_ms: 10_000,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Internal state
// ────────────────────────────────────────────────────────────────────────────

struct ServoLane {
    servo: Option<Servo>,
    angle: i64,
    step: i64,
}

fn lock_motors(
    motors: &Mutex<Option<MotorBank>>,
) -> Result<MutexGuard<'_, Option<MotorBank>>, RoverError> {
    motors
        .lock()
        .map_err(|_| RoverError::device("motors", "motor state lock poisoned"))
}

fn stop_motors(motors: &Mutex<Option<MotorBank>>) -> Result<(), RoverError> {
    match lock_motors(motors)?.as_mut() {
        Some(bank) => bank.all_stop(),
        None => Ok(()),
    }
}

/// De-asserts every motor pin when dropped, unless released explicitly.
struct PulseGuard<'a> {
    motors: &'a Mutex<Option<MotorBank>>,
    armed: bool,
}

impl PulseGuard<'_> {
    fn release(mut self) -> Result<(), RoverError> {
        self.armed = false;
        stop_motors(self.motors)
    }
}

impl Drop for PulseGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("drive pulse abandoned, stopping motors");
            if let Err(err) = stop_motors(self.motors) {
                warn!(error = %err, "all-stop for abandoned pulse failed");
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ActuatorController
// ────────────────────────────────────────────────────────────────────────────

/// Owns the motor pins, pan servo and headlight, and the shared interlock.
///
/// Every method may be called concurrently from any number of operator
/// connections.
pub struct ActuatorController {
    config: ActuatorConfig,
    interlock: Interlock,
    motors: Mutex<Option<MotorBank>>,
    drive_turn: tokio::sync::Mutex<()>,
    servo: tokio::sync::Mutex<ServoLane>,
    headlight: Mutex<Option<Box<dyn DigitalPin>>>,
}

impl ActuatorController {
    /// Build a controller from whatever actuator hardware is present.
    ///
    /// Missing handles are not an error here; the corresponding operations
    /// fail with [`RoverError::NotInitialized`].
    pub fn new(
        motors: Option<MotorBank>,
        servo: Option<Box<dyn PwmOutput>>,
        headlight: Option<Box<dyn DigitalPin>>,
        config: ActuatorConfig,
    ) -> Self {
        let servo = servo.map(|pwm| {
            Servo::new(
                pwm,
                config.servo_min_pulse_us,
                config.servo_max_pulse_us,
                Duration::from_millis(config.servo_settle_ms),
            )
        });
        Self {
            servo: tokio::sync::Mutex::new(ServoLane {
                servo,
                angle: config.initial_servo_angle,
                step: config.initial_servo_step,
            }),
            config,
            interlock: Interlock::new(),
            motors: Mutex::new(motors),
            drive_turn: tokio::sync::Mutex::new(()),
            headlight: Mutex::new(headlight),
        }
    }

    /// Take the motor, servo and headlight handles out of `hw`.
    pub fn from_hardware(hw: &mut RoverHardware, config: ActuatorConfig) -> Self {
        let motors = MotorBank::from_pins(std::mem::take(&mut hw.motors));
        Self::new(motors, hw.servo.take(), hw.headlight.take(), config)
    }

    /// Handle to the shared interlock flag.
    pub fn interlock(&self) -> &Interlock {
        &self.interlock
    }

    // ── Interlock ────────────────────────────────────────────────────────

    /// Engage or release the global interlock.
    ///
    /// Engaging first stops every motor, then records the interlock. The
    /// interlock is recorded even if the all-stop write fails; that failure
    /// is then returned.
    pub fn set_interlock(&self, engaged: bool) -> Result<(), RoverError> {
        let mut motors = lock_motors(&self.motors)?;
        let stopped = if engaged {
            motors.as_mut().map_or(Ok(()), MotorBank::all_stop)
        } else {
            Ok(())
        };
        self.interlock.set(engaged);
        info!(engaged, "interlock set");
        if let Err(err) = &stopped {
            warn!(error = %err, "all-stop while engaging interlock failed");
        }
        stopped
    }

    // ── Drive ────────────────────────────────────────────────────────────

    /// Run the motors in `direction` for `duration_ms`, then stop them.
    ///
    /// Returns only after the pulse has ended.
    ///
    /// # Errors
    ///
    /// - [`RoverError::NotInitialized`] without a complete set of motor pins.
    /// - [`RoverError::Interlocked`] while the interlock is engaged.
    /// - [`RoverError::InvalidRange`] if `duration_ms` exceeds the configured
    ///   maximum.
    /// - [`RoverError::Device`] if a pin write fails.
    pub async fn drive(&self, direction: Direction, duration_ms: u64) -> Result<(), RoverError> {
        let _turn = self.drive_turn.lock().await;

        {
            let mut motors = lock_motors(&self.motors)?;
            let bank = motors
                .as_mut()
                .ok_or_else(|| RoverError::NotInitialized("motors".to_string()))?;
            self.interlock.check()?;
            if duration_ms > self.config.max_drive_ms {
                return Err(RoverError::out_of_range(
                    "drive duration ms",
                    i64::try_from(duration_ms).unwrap_or(i64::MAX),
                ));
            }
            debug!(?direction, duration_ms, "drive pulse");
            bank.engage(direction)?;
        }

        let guard = PulseGuard {
            motors: &self.motors,
            armed: true,
        };
        tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        guard.release()
    }

    // ── Servo ────────────────────────────────────────────────────────────

    /// Move the pan servo to `angle` degrees.
    ///
    /// # Errors
    ///
    /// [`RoverError::NotInitialized`], [`RoverError::Interlocked`], or
    /// [`RoverError::InvalidAngle`] outside `0..=180` (state unchanged).
    pub async fn set_servo_angle(&self, angle: i64) -> Result<(), RoverError> {
        let mut lane = self.servo.lock().await;
        self.move_servo(&mut lane, angle).await
    }

    /// Move the servo by `delta` degrees from its current angle.
    pub async fn step_servo(&self, delta: i64) -> Result<(), RoverError> {
        let mut lane = self.servo.lock().await;
        let target = lane.angle.saturating_add(delta);
        self.move_servo(&mut lane, target).await
    }

    /// Tilt up by one step (towards 0°).
    pub async fn servo_up(&self) -> Result<(), RoverError> {
        let mut lane = self.servo.lock().await;
        let target = lane.angle.saturating_sub(lane.step);
        self.move_servo(&mut lane, target).await
    }

    /// Tilt down by one step (towards 180°).
    pub async fn servo_down(&self) -> Result<(), RoverError> {
        let mut lane = self.servo.lock().await;
        let target = lane.angle.saturating_add(lane.step);
        self.move_servo(&mut lane, target).await
    }

    /// Set the step used by [`servo_up`][Self::servo_up] and
    /// [`servo_down`][Self::servo_down]. Accepts `1..=180`.
    pub async fn set_servo_step(&self, step: i64) -> Result<(), RoverError> {
        if !(1..=180).contains(&step) {
            return Err(RoverError::out_of_range("servo step", step));
        }
        self.servo.lock().await.step = step;
        debug!(step, "servo step set");
        Ok(())
    }

    async fn move_servo(&self, lane: &mut ServoLane, angle: i64) -> Result<(), RoverError> {
        let Some(servo) = lane.servo.as_mut() else {
            return Err(RoverError::NotInitialized("servo".to_string()));
        };
        self.interlock.check()?;
        let valid = u32::try_from(angle)
            .ok()
            .filter(|a| *a <= 180)
            .ok_or(RoverError::InvalidAngle(angle))?;

        let mut reached = false;
        let result = servo.pulse(valid, || reached = true).await;
        if reached {
            lane.angle = angle;
        }
        result
    }

    // ── Headlight ────────────────────────────────────────────────────────

    /// Switch the headlight. Not affected by the interlock.
    pub fn set_headlight(&self, on: bool) -> Result<(), RoverError> {
        let mut headlight = self
            .headlight
            .lock()
            .map_err(|_| RoverError::device("headlight", "state lock poisoned"))?;
        let pin = headlight
            .as_mut()
            .ok_or_else(|| RoverError::NotInitialized("headlight".to_string()))?;
        pin.write(on)?;
        debug!(on, "headlight set");
        Ok(())
    }

    pub fn headlight_on(&self) -> bool {
        self.headlight
            .lock()
            .ok()
            .and_then(|h| h.as_ref().map(|pin| pin.is_high()))
            .unwrap_or(false)
    }

    // ── State ────────────────────────────────────────────────────────────

    /// Snapshot of servo angle, step and interlock.
    pub async fn state(&self) -> ActuatorState {
        let lane = self.servo.lock().await;
        ActuatorState {
            servo_angle: lane.angle,
            servo_step: lane.step,
            interlocked: self.interlock.is_engaged(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
