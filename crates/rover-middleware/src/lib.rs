//! `rover-middleware` – streaming plumbing between devices and operators.
//!
//! # Modules
//!
//! - [`device`] – [`BlockingDevice`]: runs blocking driver calls on the
//!   tokio blocking pool behind a per-device lock.
//! - [`audio`] – [`AudioPipeline`]: full-duplex PCM link with the
//!   capture/playback pause-resume state machine.
//! - [`video`] – [`VideoPipeline`]: camera capture decoupled from a
//!   fixed-rate publisher.
//! - [`frame_slot`] – [`FrameSlot`]: latest-frame slot with sequence numbers
//!   that any number of MJPEG readers can follow.

pub mod audio;
pub mod device;
pub mod frame_slot;
pub mod video;

pub use audio::{AudioConfig, AudioPipeline, AudioStats, AudioSubscriber, SampleBuffer};
pub use device::BlockingDevice;
pub use frame_slot::{Frame, FrameReader, FrameSlot};
pub use video::{VideoConfig, VideoPipeline};
