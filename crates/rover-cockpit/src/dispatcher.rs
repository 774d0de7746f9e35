//! [`Dispatcher`] – turns control envelopes into subsystem calls.
//!
//! Replies follow one rule: errors always answer with an ERROR envelope,
//! STATUS always answers with a report, and successful commands answer only
//! when acknowledgements are switched on.

use std::sync::Arc;

use rover_middleware::{AudioPipeline, VideoPipeline};
use rover_runtime::Rover;
use rover_types::{Command, ControlMsg, ResultEnvelope, RoverError};
use tracing::{debug, warn};

/// Routes decoded commands to the rover. Cheap to clone; one per
/// connection is fine.
#[derive(Clone)]
pub struct Dispatcher {
    rover: Arc<Rover>,
    ack: bool,
}

impl Dispatcher {
    pub fn new(rover: Arc<Rover>) -> Self {
        Self { rover, ack: false }
    }

    /// Answer successful mutating commands with an OK envelope.
    pub fn with_ack(mut self, ack: bool) -> Self {
        self.ack = ack;
        self
    }

    /// Handle one text frame from the control socket.
    pub async fn handle_text(&self, text: &str) -> Option<ResultEnvelope> {
        match serde_json::from_str::<ControlMsg>(text) {
            Ok(msg) => self.handle(&msg).await,
            Err(e) => {
                let err = RoverError::Malformed(e.to_string());
                warn!(error = %err, "undecodable control message");
                Some(ResultEnvelope::error(&err))
            }
        }
    }

    /// Handle one decoded envelope. `None` means nothing is sent back.
    pub async fn handle(&self, msg: &ControlMsg) -> Option<ResultEnvelope> {
        let command = match Command::decode(msg) {
            Ok(Some(command)) => command,
            Ok(None) => {
                debug!(kind = msg.cmd_type, "ignoring envelope");
                return None;
            }
            Err(err) => {
                warn!(kind = msg.cmd_type, error = %err, "rejected envelope");
                return Some(ResultEnvelope::error(&err));
            }
        };

        debug!(?command, "dispatching");
        match self.execute(command).await {
            Ok(Some(reply)) => Some(reply),
            Ok(None) => self.ack.then_some(ResultEnvelope::Ok),
            Err(err) => {
                warn!(kind = msg.cmd_type, code = err.code(), error = %err, "command failed");
                Some(ResultEnvelope::error(&err))
            }
        }
    }

    async fn execute(&self, command: Command) -> Result<Option<ResultEnvelope>, RoverError> {
        let actuators = self.rover.actuators();
        match command {
            Command::Drive {
                direction,
                duration_ms,
            } => actuators.drive(direction, duration_ms).await?,
            Command::ServoUp => actuators.servo_up().await?,
            Command::ServoDown => actuators.servo_down().await?,
            Command::SetServoStep(step) => actuators.set_servo_step(step).await?,
            Command::ServoAbsolute(angle) => actuators.set_servo_angle(angle).await?,
            Command::CaptureStart => self.audio()?.start_capture().await?,
            Command::CaptureStop => self.audio()?.stop_capture().await?,
            Command::PlaybackStart => self.audio()?.start_playback().await?,
            Command::PlaybackStop => self.audio()?.stop_playback().await?,
            Command::VideoEnable { fps, resolution } => {
                self.video()?.reconfigure(fps, resolution).await?
            }
            Command::VideoDisable => self.video()?.stop_stream().await?,
            Command::Interlock { engaged } => actuators.set_interlock(engaged)?,
            Command::Headlight { on } => actuators.set_headlight(on)?,
            Command::StatusQuery => {
                let report = self.rover.status().await;
                return Ok(Some(ResultEnvelope::Status(Box::new(report))));
            }
        }
        Ok(None)
    }

    fn audio(&self) -> Result<&AudioPipeline, RoverError> {
        self.rover
            .audio()
            .map(|a| a.as_ref())
            .ok_or_else(|| RoverError::NotInitialized("audio".to_string()))
    }

    fn video(&self) -> Result<&VideoPipeline, RoverError> {
        self.rover
            .video()
            .map(|v| v.as_ref())
            .ok_or_else(|| RoverError::NotInitialized("video".to_string()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use rover_hal::sim::{SimHardware, SimProbes};
    use rover_runtime::RoverConfig;
    use rover_types::{AudioChannelState, CmdType};
    use serde_json::json;

    async fn dispatcher(builder: SimHardware) -> (Dispatcher, SimProbes) {
        let (hw, probes) = builder.build();
        let mut config = RoverConfig::default();
        config.actuators.servo_settle_ms = 1;
        let rover = Rover::assemble(hw, config).await.unwrap();
        probes.servo.clear();
        probes.pins.clear();
        (Dispatcher::new(Arc::new(rover)), probes)
    }

    fn envelope(kind: CmdType, data: serde_json::Value) -> String {
        serde_json::to_string(&ControlMsg::new(kind, data)).unwrap()
    }

    async fn audio_state(d: &Dispatcher) -> AudioChannelState {
        d.rover.audio().unwrap().status().await
    }

    #[tokio::test]
    async fn servo_absolute_then_up() {
        let (d, probes) = dispatcher(SimHardware::new().with_servo()).await;

        assert_eq!(d.handle_text(&envelope(CmdType::ServoAbs, json!(45))).await, None);
        assert_eq!(d.rover.actuators().state().await.servo_angle, 45);

        assert_eq!(d.handle_text(&envelope(CmdType::ServoUp, json!(null))).await, None);
        assert_eq!(d.rover.actuators().state().await.servo_angle, 15);

        // 45° then 15° on a 500..2000 µs servo, each followed by a cut.
        assert_eq!(probes.servo.duties(), vec![875, 0, 625, 0]);
    }

    #[tokio::test]
    async fn drive_while_interlocked_is_refused() {
        let (d, probes) = dispatcher(SimHardware::new().with_drive_base()).await;

        assert_eq!(
            d.handle_text(&envelope(CmdType::MasterEnable, json!(null))).await,
            None
        );
        probes.pins.clear();

        let reply = d.handle_text(&envelope(CmdType::DriveFwd, json!(500))).await;
        assert_eq!(reply, Some(ResultEnvelope::Error("interlocked".to_string())));
        assert!(probes.pins.writes().is_empty());
    }

    #[tokio::test]
    async fn playback_preempts_capture_and_restores_it() {
        let (d, _probes) =
            dispatcher(SimHardware::new().with_audio_cadence(Duration::from_millis(2))).await;

        assert_eq!(d.handle_text(&envelope(CmdType::AudioEnable, json!(null))).await, None);
        let st = audio_state(&d).await;
        assert!(st.recording && !st.playing);

        assert_eq!(d.handle_text(&envelope(CmdType::AudioStart, json!(null))).await, None);
        let st = audio_state(&d).await;
        assert!(!st.recording && st.playing && st.paused_by_playback);

        assert_eq!(d.handle_text(&envelope(CmdType::AudioStop, json!(null))).await, None);
        let st = audio_state(&d).await;
        assert!(st.recording && !st.playing && !st.paused_by_playback);
    }

    #[tokio::test]
    async fn malformed_json_replies_error() {
        let (d, _probes) = dispatcher(SimHardware::new()).await;
        let reply = d.handle_text("{not json").await;
        assert!(matches!(reply, Some(ResultEnvelope::Error(msg)) if msg.starts_with("malformed")));
    }

    #[tokio::test]
    async fn unknown_kind_is_silent() {
        let (d, _probes) = dispatcher(SimHardware::new()).await;
        assert_eq!(d.handle_text(r#"{"CmdType":77,"Data":1}"#).await, None);
        assert_eq!(d.handle_text(r#"{"CmdType":0,"Data":"x"}"#).await, None);
    }

    #[tokio::test]
    async fn missing_subsystems_reply_not_initialized() {
        let (d, _probes) = dispatcher(SimHardware::new()).await;

        for (kind, data) in [
            (CmdType::AudioEnable, json!(null)),
            (CmdType::AudioStart, json!(null)),
            (CmdType::VideoEnable, json!([2, 1])),
            (CmdType::VideoDisable, json!(null)),
            (CmdType::ServoAbs, json!(10)),
            (CmdType::DriveLeft, json!(10)),
            (CmdType::HeadlightOn, json!(null)),
        ] {
            match d.handle_text(&envelope(kind, data)).await {
                Some(ResultEnvelope::Error(msg)) => {
                    assert!(msg.contains("not initialized"), "{kind:?}: {msg}")
                }
                other => panic!("{kind:?}: expected error, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn ack_mode_confirms_success() {
        let (d, _probes) = dispatcher(SimHardware::new().with_headlight()).await;
        let d = d.with_ack(true);

        assert_eq!(
            d.handle_text(&envelope(CmdType::HeadlightOn, json!(null))).await,
            Some(ResultEnvelope::Ok)
        );
        assert!(d.rover.actuators().headlight_on());
        assert_eq!(d.handle_text(r#"{"CmdType":99}"#).await, None);
    }

    #[tokio::test]
    async fn status_always_replies() {
        let (d, _probes) = dispatcher(SimHardware::new().with_servo().with_camera()).await;

        match d.handle_text(&envelope(CmdType::Status, json!(null))).await {
            Some(ResultEnvelope::Status(report)) => {
                assert_eq!(report.actuators.servo_angle, 90);
                assert!(report.audio.is_none());
                assert!(report.video.is_some());
            }
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn video_enable_reconfigures_stream() {
        let (d, probes) = dispatcher(SimHardware::new().with_camera()).await;

        assert_eq!(
            d.handle_text(&envelope(CmdType::VideoEnable, json!([5.0, 2.0]))).await,
            None
        );
        let status = d.rover.video().unwrap().status().await;
        assert!(status.streaming);
        assert_eq!((status.fps, status.width, status.height), (5, 1280, 720));

        assert_eq!(
            d.handle_text(&envelope(CmdType::VideoDisable, json!(null))).await,
            None
        );
        assert!(!d.rover.video().unwrap().status().await.streaming);
        assert!(probes.camera.stops() >= 1);
    }

    #[tokio::test]
    async fn out_of_range_values_are_reported() {
        let (d, _probes) = dispatcher(SimHardware::new().with_servo()).await;

        let reply = d.handle_text(&envelope(CmdType::ServoAbs, json!(200))).await;
        assert!(matches!(reply, Some(ResultEnvelope::Error(_))));
        assert_eq!(d.rover.actuators().state().await.servo_angle, 90);

        let reply = d.handle_text(&envelope(CmdType::ServoStep, json!(0))).await;
        assert!(matches!(reply, Some(ResultEnvelope::Error(_))));
    }
}
