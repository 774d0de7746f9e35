//! [`Rover`] – assembles every subsystem from a hardware bundle and tears
//! them down in order.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rover_hal::RoverHardware;
use rover_kernel::{ActuatorConfig, ActuatorController};
use rover_middleware::{AudioConfig, AudioPipeline, VideoConfig, VideoPipeline};
use rover_types::{RoverError, StatusReport};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::animator::{AnimationSet, DisplayAnimator, load_bitmaps};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Startup animation for the status display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// PNG files shown in order. Empty leaves the display blank.
    pub frames: Vec<PathBuf>,
    pub interval_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            interval_ms: 500,
        }
    }
}

/// Per-subsystem tunables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoverConfig {
    pub actuators: ActuatorConfig,
    pub audio: AudioConfig,
    pub video: VideoConfig,
    pub display: DisplayConfig,
}

// ────────────────────────────────────────────────────────────────────────────
// Rover
// ────────────────────────────────────────────────────────────────────────────

/// A subsystem that failed to stop cleanly, with the reason.
pub type ShutdownFailure = (&'static str, RoverError);

/// Every subsystem of one rover. Subsystems whose hardware was absent are
/// `None`.
pub struct Rover {
    actuators: Arc<ActuatorController>,
    audio: Option<Arc<AudioPipeline>>,
    video: Option<Arc<VideoPipeline>>,
    display: Option<DisplayAnimator>,
}

impl Rover {
    /// Take the drivers out of `hw` and bring every present subsystem up.
    ///
    /// The servo is centred on its initial angle and the startup animation
    /// is loaded; failures of either are logged, not returned.
    ///
    /// # Errors
    ///
    /// [`RoverError::Device`] if audio or video initialisation fails.
    pub async fn assemble(mut hw: RoverHardware, config: RoverConfig) -> Result<Self, RoverError> {
        info!(hardware = %hw.inventory(), "assembling rover");

        let initial_angle = config.actuators.initial_servo_angle;
        let actuators = Arc::new(ActuatorController::from_hardware(&mut hw, config.actuators));
        match actuators.set_servo_angle(initial_angle).await {
            Ok(()) | Err(RoverError::NotInitialized(_)) => {}
            Err(err) => warn!(error = %err, angle = initial_angle, "could not centre servo"),
        }

        let audio = match hw.audio.take() {
            Some(host) => {
                let cfg = config.audio;
                let pipeline =
                    tokio::task::spawn_blocking(move || AudioPipeline::init(host.as_ref(), cfg))
                        .await
                        .map_err(|e| RoverError::device("audio", e))??;
                Some(Arc::new(pipeline))
            }
            None => None,
        };

        let video = match hw.camera.take() {
            Some(camera) => {
                let cfg = config.video;
                let pipeline = tokio::task::spawn_blocking(move || VideoPipeline::init(camera, cfg))
                    .await
                    .map_err(|e| RoverError::device("video", e))??;
                Some(Arc::new(pipeline))
            }
            None => None,
        };

        let display = match hw.display.take() {
            Some(panel) => {
                let animator = DisplayAnimator::spawn(panel, Arc::new(Mutex::new(())));
                if !config.display.frames.is_empty() {
                    if let Err(err) = load_startup_animation(&animator, &config.display).await {
                        warn!(error = %err, "startup animation not loaded");
                    }
                }
                Some(animator)
            }
            None => None,
        };

        let has_display = display.is_some();
        info!(
            audio = audio.is_some(),
            video = video.is_some(),
            display = has_display,
            "rover assembled"
        );
        Ok(Self {
            actuators,
            audio,
            video,
            display,
        })
    }

    pub fn actuators(&self) -> &Arc<ActuatorController> {
        &self.actuators
    }

    pub fn audio(&self) -> Option<&Arc<AudioPipeline>> {
        self.audio.as_ref()
    }

    pub fn video(&self) -> Option<&Arc<VideoPipeline>> {
        self.video.as_ref()
    }

    pub fn display(&self) -> Option<&DisplayAnimator> {
        self.display.as_ref()
    }

    /// Snapshot of every subsystem.
    pub async fn status(&self) -> StatusReport {
        let audio = match &self.audio {
            Some(a) => Some(a.status().await),
            None => None,
        };
        let video = match &self.video {
            Some(v) => Some(v.status().await),
            None => None,
        };
        StatusReport {
            actuators: self.actuators.state().await,
            headlight: self.actuators.headlight_on(),
            audio,
            video,
            timestamp: Utc::now(),
        }
    }

    /// Engage the interlock, then stop audio, video and the display
    /// concurrently.
    ///
    /// Returns the subsystems that did not stop cleanly; empty on success.
    pub async fn shutdown(&self) -> Vec<ShutdownFailure> {
        let mut failures = Vec::new();
        if let Err(err) = self.actuators.set_interlock(true) {
            failures.push(("actuators", err));
        }

        let audio = async {
            match &self.audio {
                Some(a) => a.shutdown().await,
                None => Ok(()),
            }
        };
        let video = async {
            match &self.video {
                Some(v) => v.shutdown().await,
                None => Ok(()),
            }
        };
        let display = async {
            match &self.display {
                Some(d) => d.shutdown().await,
                None => Ok(()),
            }
        };
        let (audio, video, display) = tokio::join!(audio, video, display);

        for (name, res) in [("audio", audio), ("video", video), ("display", display)] {
            if let Err(err) = res {
                failures.push((name, err));
            }
        }
        for (name, err) in &failures {
            error!(subsystem = name, error = %err, "subsystem failed to stop");
        }
        info!(failures = failures.len(), "rover shut down");
        failures
    }
}

async fn load_startup_animation(
    animator: &DisplayAnimator,
    config: &DisplayConfig,
) -> Result<(), RoverError> {
    let paths = config.frames.clone();
    let frames = tokio::task::spawn_blocking(move || load_bitmaps(&paths))
        .await
        .map_err(|e| RoverError::device("display", e))??;
    animator
        .load_animation(AnimationSet::new(frames, config.interval_ms)?)
        .await
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
