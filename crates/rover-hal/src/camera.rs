//! Generic `Camera` trait for streaming image-capture hardware.

use std::time::Duration;

use rover_types::{PixelFormat, RoverError};

/// A streaming camera (e.g. a V4L2 device).
///
/// All calls block. The video pipeline drives them from the blocking pool.
pub trait Camera: Send {
    /// Stable identifier, e.g. `"/dev/video0"`.
    fn id(&self) -> &str;

    /// Negotiate pixel format and resolution. Returns the frame size the
    /// device actually accepted.
    fn set_format(
        &mut self,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<(u32, u32), RoverError>;

    fn start_streaming(&mut self) -> Result<(), RoverError>;

    fn stop_streaming(&mut self) -> Result<(), RoverError>;

    /// Block until a frame is ready or `timeout` elapses. Returns `false` on
    /// timeout.
    ///
    /// # Errors
    ///
    /// [`RoverError::TransientIo`] for a failed wait,
    /// [`RoverError::FatalIo`] when the device is gone.
    fn wait_for_frame(&mut self, timeout: Duration) -> Result<bool, RoverError>;

    /// Read the next encoded frame from the device.
    fn read_frame(&mut self) -> Result<Vec<u8>, RoverError>;

    /// Release the device.
    fn close(&mut self) -> Result<(), RoverError>;
}
