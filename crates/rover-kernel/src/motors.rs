//! [`MotorBank`] – the four H-bridge inputs of the differential drive.
//!
//! # Direction mapping
//!
//! | Direction | Asserted pins |
//! |---|---|
//! | `Forward` | left fwd, right fwd |
//! | `Backward` | left bwd, right bwd |
//! | `Left` | left fwd, right bwd |
//! | `Right` | right fwd, left bwd |
//! | `LeftOnly` | left fwd |
//! | `RightOnly` | right fwd |

use rover_hal::{DigitalPin, MotorPins};
use rover_types::{Direction, RoverError};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Line {
    LeftFwd,
    LeftBwd,
    RightFwd,
    RightBwd,
}

const ALL_LINES: [Line; 4] = [Line::LeftBwd, Line::LeftFwd, Line::RightBwd, Line::RightFwd];

fn lines_for(direction: Direction) -> &'static [Line] {
    match direction {
        Direction::Forward => &[Line::LeftFwd, Line::RightFwd],
        Direction::Backward => &[Line::LeftBwd, Line::RightBwd],
        Direction::Left => &[Line::LeftFwd, Line::RightBwd],
        Direction::Right => &[Line::RightFwd, Line::LeftBwd],
        Direction::LeftOnly => &[Line::LeftFwd],
        Direction::RightOnly => &[Line::RightFwd],
    }
}

/// A complete set of motor pins.
pub struct MotorBank {
    left_fwd: Box<dyn DigitalPin>,
    left_bwd: Box<dyn DigitalPin>,
    right_fwd: Box<dyn DigitalPin>,
    right_bwd: Box<dyn DigitalPin>,
}

impl MotorBank {
    /// Take ownership of the pins. Returns `None` unless all four are
    /// present.
    pub fn from_pins(pins: MotorPins) -> Option<Self> {
        Some(Self {
            left_fwd: pins.left_fwd?,
            left_bwd: pins.left_bwd?,
            right_fwd: pins.right_fwd?,
            right_bwd: pins.right_bwd?,
        })
    }

    fn pin(&mut self, line: Line) -> &mut dyn DigitalPin {
        match line {
            Line::LeftFwd => self.left_fwd.as_mut(),
            Line::LeftBwd => self.left_bwd.as_mut(),
            Line::RightFwd => self.right_fwd.as_mut(),
            Line::RightBwd => self.right_bwd.as_mut(),
        }
    }

    /// Assert the pin pair for `direction`.
    ///
    /// If any write fails every pin is de-asserted before the error is
    /// returned, so a half-driven bridge never stays on.
    pub fn engage(&mut self, direction: Direction) -> Result<(), RoverError> {
        for &line in lines_for(direction) {
            if let Err(err) = self.pin(line).write(true) {
                if let Err(stop_err) = self.all_stop() {
                    warn!(error = %stop_err, "all-stop after failed engage also failed");
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// De-assert every motor pin.
    ///
    /// All four writes are attempted even if one fails; the first failure is
    /// returned.
    pub fn all_stop(&mut self) -> Result<(), RoverError> {
        let mut first_err = None;
        for line in ALL_LINES {
            if let Err(err) = self.pin(line).write(false) {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// `true` if any pin is currently asserted.
    pub fn is_moving(&self) -> bool {
        self.left_fwd.is_high()
            || self.left_bwd.is_high()
            || self.right_fwd.is_high()
            || self.right_bwd.is_high()
    }
}
