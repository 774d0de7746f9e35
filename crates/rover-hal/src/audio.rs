//! Blocking PCM audio streams.
//!
//! An [`AudioHost`] opens the default input and output streams; the streams
//! move whole buffers of signed 16-bit mono samples per call.

use rover_types::RoverError;

/// Sample rate and buffer length a stream is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub sample_rate: u32,
    /// Samples moved by one read or write.
    pub frames: usize,
}

/// Opens the default capture and playback streams.
pub trait AudioHost: Send + Sync {
    fn open_input(&self, params: StreamParams) -> Result<Box<dyn AudioInput>, RoverError>;

    fn open_output(&self, params: StreamParams) -> Result<Box<dyn AudioOutput>, RoverError>;
}

/// Microphone stream.
pub trait AudioInput: Send {
    fn params(&self) -> StreamParams;

    fn start(&mut self) -> Result<(), RoverError>;

    fn stop(&mut self) -> Result<(), RoverError>;

    fn close(&mut self) -> Result<(), RoverError>;

    /// Block until `buf` (exactly `params().frames` samples) is filled.
    fn read(&mut self, buf: &mut [i16]) -> Result<(), RoverError>;
}

/// Speaker stream.
pub trait AudioOutput: Send {
    fn params(&self) -> StreamParams;

    fn start(&mut self) -> Result<(), RoverError>;

    fn stop(&mut self) -> Result<(), RoverError>;

    fn close(&mut self) -> Result<(), RoverError>;

    /// Block until `buf` (exactly `params().frames` samples) is queued on
    /// the device.
    fn write(&mut self, buf: &[i16]) -> Result<(), RoverError>;
}
