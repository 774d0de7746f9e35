//! `rover-types` – shared vocabulary of the rover control plane.
//!
//! Every other crate speaks in these types:
//!
//! - [`ControlMsg`] / [`Command`] – the operator's control envelope on the
//!   wire and its decoded, closed form.
//! - [`ResultEnvelope`] – what goes back to the operator.
//! - [`ActuatorState`], [`AudioChannelState`], [`VideoStatus`],
//!   [`StatusReport`] – snapshots of subsystem state.
//! - [`RoverError`] – the error taxonomy shared by every subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod command;

pub use command::{CmdType, Command, ControlMsg, Direction, Resolution};

/// Error taxonomy spanning request-scoped failures (interlock, bounds,
/// missing hardware) and loop-scoped device failures.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoverError {
    /// A capability handle required by the operation is absent.
    #[error("{0} not initialized")]
    NotInitialized(String),

    /// The global safety interlock is engaged.
    #[error("interlocked")]
    Interlocked,

    #[error("angle needs to be 0 to 180, got {0}")]
    InvalidAngle(i64),

    #[error("{what} out of range: {value}")]
    InvalidRange { what: String, value: i64 },

    /// A capability open/start/stop call failed.
    #[error("device error on {component}: {details}")]
    Device { component: String, details: String },

    /// One-shot read/write failure during an active loop.
    #[error("transient i/o on {component}: {details}")]
    TransientIo { component: String, details: String },

    /// The device went away; the owning loop must terminate.
    #[error("{component} detached: {details}")]
    FatalIo { component: String, details: String },

    /// The control envelope could not be decoded.
    #[error("malformed command: {0}")]
    Malformed(String),

    /// An internal queue or task is gone.
    #[error("channel error: {0}")]
    Channel(String),
}

impl RoverError {
    /// Shorthand for [`RoverError::Device`].
    pub fn device(component: impl Into<String>, details: impl std::fmt::Display) -> Self {
        Self::Device {
            component: component.into(),
            details: details.to_string(),
        }
    }

    /// Shorthand for [`RoverError::InvalidRange`].
    pub fn out_of_range(what: impl Into<String>, value: i64) -> Self {
        Self::InvalidRange {
            what: what.into(),
            value,
        }
    }

    /// Stable taxonomy name of this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInitialized(_) => "NOT_INITIALIZED",
            Self::Interlocked => "INTERLOCKED",
            Self::InvalidAngle(_) => "INVALID_ANGLE",
            Self::InvalidRange { .. } => "INVALID_RANGE",
            Self::Device { .. } => "DEVICE_ERROR",
            Self::TransientIo { .. } => "TRANSIENT_IO",
            Self::FatalIo { .. } => "FATAL_IO",
            Self::Malformed(_) => "MALFORMED",
            Self::Channel(_) => "CHANNEL",
        }
    }

    /// `true` for errors that must terminate the loop that observed them.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalIo { .. })
    }

    /// Re-classify an i/o failure observed while opening, starting or
    /// stopping a device as a [`RoverError::Device`] error. Other variants
    /// pass through untouched.
    pub fn into_device_error(self) -> Self {
        match self {
            Self::TransientIo { component, details } | Self::FatalIo { component, details } => {
                Self::Device { component, details }
            }
            other => other,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State snapshots
// ─────────────────────────────────────────────────────────────────────────────

/// Snapshot of the actuator controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorState {
    /// Last commanded pan-servo angle in degrees, always within `0..=180`.
    pub servo_angle: i64,
    /// Degrees moved by one SERVO_UP / SERVO_DOWN.
    pub servo_step: i64,
    pub interlocked: bool,
}

/// Lifecycle phase of one streaming loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LoopPhase {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Snapshot of the audio pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioChannelState {
    pub recording: bool,
    pub playing: bool,
    /// Capture was preempted to free the device for playback and will be
    /// resumed when playback ends.
    pub paused_by_playback: bool,
}

/// Camera pixel formats understood by the video pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[default]
    Mjpeg,
    Yuyv422,
}

/// Snapshot of the video pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoStatus {
    pub streaming: bool,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
}

/// Everything a STATUS query reports back to the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub actuators: ActuatorState,
    pub headlight: bool,
    /// `None` when the rover was started without audio.
    pub audio: Option<AudioChannelState>,
    /// `None` when the rover was started without a camera.
    pub video: Option<VideoStatus>,
    pub timestamp: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Result envelope
// ─────────────────────────────────────────────────────────────────────────────

/// Reply sent back on the control channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultEnvelope {
    /// Acknowledgement of a successful mutating command.
    Ok,
    Error(String),
    Status(Box<StatusReport>),
}

impl ResultEnvelope {
    pub fn error(err: &RoverError) -> Self {
        Self::Error(err.to_string())
    }
}

impl From<ResultEnvelope> for ControlMsg {
    fn from(result: ResultEnvelope) -> Self {
        match result {
            ResultEnvelope::Ok => ControlMsg::new(CmdType::Cmd, serde_json::Value::Null),
            ResultEnvelope::Error(message) => {
                ControlMsg::new(CmdType::Err, serde_json::Value::String(message))
            }
            ResultEnvelope::Status(report) => ControlMsg::new(
                CmdType::Status,
                serde_json::to_value(*report).unwrap_or(serde_json::Value::Null),
            ),
        }
    }
}
