//! Control envelope and the closed set of operator commands.
//!
//! On the wire every control message is `{"CmdType": <int>, "Data": <any>}`.
//! [`Command::decode`] turns one envelope into one [`Command`]; the
//! dispatcher then matches on it exhaustively.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::RoverError;

/// Raw control envelope as exchanged with the operator page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMsg {
    #[serde(rename = "CmdType")]
    pub cmd_type: i64,
    #[serde(rename = "Data", default)]
    pub data: Value,
}

impl ControlMsg {
    pub fn new(kind: CmdType, data: Value) -> Self {
        Self {
            cmd_type: kind.code(),
            data,
        }
    }
}

/// Envelope kind codes. The numbering is shared with the operator page and
/// must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmdType {
    Err,
    Cmd,
    AudioStart,
    AudioStop,
    DriveFwd,
    DriveBwd,
    DriveLeft,
    DriveRight,
    ServoUp,
    ServoDown,
    ServoStep,
    VideoEnable,
    VideoDisable,
    AudioEnable,
    AudioDisable,
    MasterEnable,
    MasterDisable,
    ServoAbs,
    DriveLeftOnly,
    DriveRightOnly,
    HeadlightOn,
    HeadlightOff,
    Status,
}

const ALL_KINDS: [CmdType; 23] = [
    CmdType::Err,
    CmdType::Cmd,
    CmdType::AudioStart,
    CmdType::AudioStop,
    CmdType::DriveFwd,
    CmdType::DriveBwd,
    CmdType::DriveLeft,
    CmdType::DriveRight,
    CmdType::ServoUp,
    CmdType::ServoDown,
    CmdType::ServoStep,
    CmdType::VideoEnable,
    CmdType::VideoDisable,
    CmdType::AudioEnable,
    CmdType::AudioDisable,
    CmdType::MasterEnable,
    CmdType::MasterDisable,
    CmdType::ServoAbs,
    CmdType::DriveLeftOnly,
    CmdType::DriveRightOnly,
    CmdType::HeadlightOn,
    CmdType::HeadlightOff,
    CmdType::Status,
];

impl CmdType {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| ALL_KINDS.get(idx).copied())
    }
}

/// Motor pin-pair selection for a drive pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    LeftOnly,
    RightOnly,
}

/// Camera resolution requested by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Map the operator page's resolution selector to a frame size.
    pub fn from_mode(mode: i64) -> Result<Self, RoverError> {
        let (width, height) = match mode {
            0 => (320, 240),
            1 => (640, 480),
            2 => (1280, 720),
            other => return Err(RoverError::out_of_range("resolution mode", other)),
        };
        Ok(Self { width, height })
    }
}

/// One decoded operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Drive { direction: Direction, duration_ms: u64 },
    ServoUp,
    ServoDown,
    SetServoStep(i64),
    ServoAbsolute(i64),
    CaptureStart,
    CaptureStop,
    PlaybackStart,
    PlaybackStop,
    VideoEnable { fps: u32, resolution: Resolution },
    VideoDisable,
    Interlock { engaged: bool },
    Headlight { on: bool },
    StatusQuery,
}

impl Command {
    /// Decode one envelope.
    ///
    /// Returns `Ok(None)` for kinds the rover does not act on (unknown codes
    /// and the outbound-only ERR / CMD kinds).
    ///
    /// # Errors
    ///
    /// [`RoverError::Malformed`] when `Data` has the wrong shape for the
    /// kind, [`RoverError::InvalidRange`] for negative durations or unknown
    /// resolution modes.
    pub fn decode(msg: &ControlMsg) -> Result<Option<Self>, RoverError> {
        let Some(kind) = CmdType::from_code(msg.cmd_type) else {
            return Ok(None);
        };
        let data = &msg.data;

        let command = match kind {
            CmdType::Err | CmdType::Cmd => return Ok(None),
            CmdType::DriveFwd => drive(kind, Direction::Forward, data)?,
            CmdType::DriveBwd => drive(kind, Direction::Backward, data)?,
            CmdType::DriveLeft => drive(kind, Direction::Left, data)?,
            CmdType::DriveRight => drive(kind, Direction::Right, data)?,
            CmdType::DriveLeftOnly => drive(kind, Direction::LeftOnly, data)?,
            CmdType::DriveRightOnly => drive(kind, Direction::RightOnly, data)?,
            CmdType::ServoUp => Command::ServoUp,
            CmdType::ServoDown => Command::ServoDown,
            CmdType::ServoStep => Command::SetServoStep(number(kind, data)?),
            CmdType::ServoAbs => Command::ServoAbsolute(number(kind, data)?),
            CmdType::AudioEnable => Command::CaptureStart,
            CmdType::AudioDisable => Command::CaptureStop,
            CmdType::AudioStart => Command::PlaybackStart,
            CmdType::AudioStop => Command::PlaybackStop,
            CmdType::VideoEnable => video_enable(kind, data)?,
            CmdType::VideoDisable => Command::VideoDisable,
            CmdType::MasterEnable => Command::Interlock { engaged: true },
            CmdType::MasterDisable => Command::Interlock { engaged: false },
            CmdType::HeadlightOn => Command::Headlight { on: true },
            CmdType::HeadlightOff => Command::Headlight { on: false },
            CmdType::Status => Command::StatusQuery,
        };
        Ok(Some(command))
    }
}

// Browser clients send every number as a JSON float.
fn number(kind: CmdType, data: &Value) -> Result<i64, RoverError> {
    data.as_f64()
        .filter(|v| v.is_finite())
        .map(|v| v.trunc() as i64)
        .ok_or_else(|| RoverError::Malformed(format!("{kind:?} expects a number, got {data}")))
}

fn drive(kind: CmdType, direction: Direction, data: &Value) -> Result<Command, RoverError> {
    let raw = number(kind, data)?;
    let duration_ms =
        u64::try_from(raw).map_err(|_| RoverError::out_of_range("drive duration", raw))?;
    Ok(Command::Drive {
        direction,
        duration_ms,
    })
}

fn video_enable(kind: CmdType, data: &Value) -> Result<Command, RoverError> {
    let pair = data
        .as_array()
        .filter(|items| items.len() == 2)
        .ok_or_else(|| {
            RoverError::Malformed(format!("{kind:?} expects [fps, resolution], got {data}"))
        })?;
    let fps_raw = number(kind, &pair[0])?;
    let fps = u32::try_from(fps_raw).map_err(|_| RoverError::out_of_range("fps", fps_raw))?;
    let resolution = Resolution::from_mode(number(kind, &pair[1])?)?;
    Ok(Command::VideoEnable { fps, resolution })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(text: &str) -> Result<Option<Command>, RoverError> {
        let msg: ControlMsg = serde_json::from_str(text).expect("valid envelope");
        Command::decode(&msg)
    }

    #[test]
    fn codes_round_trip_through_table() {
        for (idx, kind) in ALL_KINDS.iter().enumerate() {
            assert_eq!(kind.code(), idx as i64);
            assert_eq!(CmdType::from_code(idx as i64), Some(*kind));
        }
        assert_eq!(CmdType::ServoAbs.code(), 17);
        assert_eq!(CmdType::Status.code(), 22);
        assert_eq!(CmdType::from_code(23), None);
        assert_eq!(CmdType::from_code(-1), None);
    }

    #[test]
    fn decodes_drive_with_float_duration() {
        let cmd = decode(r#"{"CmdType":4,"Data":500.0}"#).unwrap();
        assert_eq!(
            cmd,
            Some(Command::Drive {
                direction: Direction::Forward,
                duration_ms: 500
            })
        );
    }

    #[test]
    fn negative_drive_duration_is_out_of_range() {
        let err = decode(r#"{"CmdType":5,"Data":-20}"#).unwrap_err();
        assert_eq!(err.code(), "INVALID_RANGE");
    }

    #[test]
    fn drive_without_duration_is_malformed() {
        let err = decode(r#"{"CmdType":6}"#).unwrap_err();
        assert!(matches!(err, RoverError::Malformed(_)));
    }

    #[test]
    fn payload_is_ignored_for_payloadless_kinds() {
        assert_eq!(
            decode(r#"{"CmdType":2,"Data":""}"#).unwrap(),
            Some(Command::PlaybackStart)
        );
        assert_eq!(
            decode(r#"{"CmdType":15}"#).unwrap(),
            Some(Command::Interlock { engaged: true })
        );
    }

    #[test]
    fn decodes_video_enable_pair() {
        let cmd = decode(r#"{"CmdType":11,"Data":[5,1]}"#).unwrap();
        assert_eq!(
            cmd,
            Some(Command::VideoEnable {
                fps: 5,
                resolution: Resolution {
                    width: 640,
                    height: 480
                }
            })
        );
    }

    #[test]
    fn video_enable_rejects_unknown_resolution_mode() {
        let err = decode(r#"{"CmdType":11,"Data":[5,9]}"#).unwrap_err();
        assert_eq!(err, RoverError::out_of_range("resolution mode", 9));
    }

    #[test]
    fn unknown_and_outbound_kinds_are_ignored() {
        assert_eq!(decode(r#"{"CmdType":99,"Data":1}"#).unwrap(), None);
        assert_eq!(decode(r#"{"CmdType":0,"Data":"x"}"#).unwrap(), None);
        assert_eq!(decode(r#"{"CmdType":1}"#).unwrap(), None);
    }

    #[test]
    fn control_msg_serializes_with_wire_names() {
        let msg = ControlMsg::new(CmdType::ServoAbs, json!(45));
        assert_eq!(serde_json::to_value(&msg).unwrap(), json!({"CmdType": 17, "Data": 45}));
    }
}
