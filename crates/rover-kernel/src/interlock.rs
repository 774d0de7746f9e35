//! [`Interlock`] – the global handbrake.
//!
//! One flag, shared by the drive and the pan servo. While it is engaged no
//! movement request reaches a pin or PWM channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rover_types::RoverError;

/// Cloneable handle to the shared interlock flag.
#[derive(Debug, Clone, Default)]
pub struct Interlock(Arc<AtomicBool>);

impl Interlock {
    /// A released interlock.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_engaged(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`RoverError::Interlocked`] while engaged.
    pub fn check(&self) -> Result<(), RoverError> {
        if self.is_engaged() {
            Err(RoverError::Interlocked)
        } else {
            Ok(())
        }
    }

    pub(crate) fn set(&self, engaged: bool) {
        self.0.store(engaged, Ordering::SeqCst);
    }
}
