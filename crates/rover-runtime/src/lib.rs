//! `rover-runtime` – process-level assembly of a rover.
//!
//! # Modules
//!
//! - [`animator`] – [`DisplayAnimator`]: one task that owns the status
//!   display and cycles an [`AnimationSet`] of PNG-derived bitmaps.
//! - [`rover`] – [`Rover`]: builds the actuator controller, audio and video
//!   pipelines and the animator from a [`RoverHardware`][rover_hal::RoverHardware]
//!   bundle, reports combined status and shuts everything down in order.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with an optional OTLP span exporter.

pub mod animator;
pub mod rover;
pub mod telemetry;

pub use animator::{AnimationSet, Bitmap, DisplayAnimator, load_bitmaps};
pub use rover::{DisplayConfig, Rover, RoverConfig, ShutdownFailure};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
