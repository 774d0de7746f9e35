//! In-process simulated drivers for CI/CD testing without physical hardware.
//!
//! Every simulated driver shares a cloneable *probe* with the test that
//! built it. The driver records what it was asked to do into the probe, and
//! the test can script failures through it.
//!
//! # Example
//!
//! ```rust
//! use rover_hal::sim::SimHardware;
//!
//! let (hardware, probes) = SimHardware::new()
//!     .with_drive_base()
//!     .with_headlight()
//!     .build();
//!
//! assert!(hardware.motors.is_complete());
//! assert!(probes.pins.writes().is_empty());
//! ```

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use rover_types::{PixelFormat, RoverError};
use tracing::debug;

use crate::audio::{AudioHost, AudioInput, AudioOutput, StreamParams};
use crate::camera::Camera;
use crate::display::BitmapDisplay;
use crate::hardware::{MotorPins, RoverHardware};
use crate::pin::DigitalPin;
use crate::pwm::PwmOutput;

pub const LEFT_FWD_PIN: &str = "left_motor_fwd";
pub const LEFT_BWD_PIN: &str = "left_motor_bwd";
pub const RIGHT_FWD_PIN: &str = "right_motor_fwd";
pub const RIGHT_BWD_PIN: &str = "right_motor_bwd";
pub const HEADLIGHT_PIN: &str = "headlight";

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ────────────────────────────────────────────────────────────────────────────
// Digital pins
// ────────────────────────────────────────────────────────────────────────────

/// One recorded pin write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinWrite {
    pub pin: String,
    pub high: bool,
}

/// Shared write log for a set of [`SimPin`]s.
#[derive(Clone, Default)]
pub struct PinLog {
    writes: Arc<Mutex<Vec<PinWrite>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl PinLog {
    /// Every write so far, in order.
    pub fn writes(&self) -> Vec<PinWrite> {
        lock(&self.writes).clone()
    }

    pub fn clear(&self) {
        lock(&self.writes).clear();
    }

    /// Pins whose last successful write was high.
    pub fn high_pins(&self) -> BTreeSet<String> {
        let mut high = BTreeSet::new();
        for w in lock(&self.writes).iter() {
            if w.high {
                high.insert(w.pin.clone());
            } else {
                high.remove(&w.pin);
            }
        }
        high
    }

    /// Make every later write to `pin` fail.
    pub fn fail_pin(&self, pin: impl Into<String>) {
        lock(&self.failing).insert(pin.into());
    }

    fn record(&self, pin: &str, high: bool) -> Result<(), RoverError> {
        if lock(&self.failing).contains(pin) {
            return Err(RoverError::device(pin, "simulated write failure"));
        }
        lock(&self.writes).push(PinWrite {
            pin: pin.to_string(),
            high,
        });
        Ok(())
    }
}

/// A simulated output line that records writes into a [`PinLog`].
pub struct SimPin {
    id: String,
    high: bool,
    log: PinLog,
}

impl SimPin {
    pub fn new(id: impl Into<String>, log: PinLog) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            high: false,
            log,
        })
    }
}

impl DigitalPin for SimPin {
    fn id(&self) -> &str {
        &self.id
    }

    fn write(&mut self, high: bool) -> Result<(), RoverError> {
        self.log.record(&self.id, high)?;
        self.high = high;
        Ok(())
    }

    fn is_high(&self) -> bool {
        self.high
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PWM
// ────────────────────────────────────────────────────────────────────────────

/// Shared duty-cycle log for a [`SimPwm`].
#[derive(Clone, Default)]
pub struct DutyLog(Arc<Mutex<Vec<u32>>>);

impl DutyLog {
    pub fn duties(&self) -> Vec<u32> {
        lock(&self.0).clone()
    }

    pub fn clear(&self) {
        lock(&self.0).clear();
    }
}

/// A simulated PWM channel.
pub struct SimPwm {
    id: String,
    period_us: u32,
    log: DutyLog,
}

impl SimPwm {
    pub fn new(id: impl Into<String>, period_us: u32, log: DutyLog) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            period_us,
            log,
        })
    }
}

impl PwmOutput for SimPwm {
    fn id(&self) -> &str {
        &self.id
    }

    fn period_us(&self) -> u32 {
        self.period_us
    }

    fn write_duty(&mut self, duty_us: u32) -> Result<(), RoverError> {
        lock(&self.log.0).push(duty_us);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Camera
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct CameraShared {
    starts: AtomicUsize,
    stops: AtomicUsize,
    closes: AtomicUsize,
    frames: AtomicU64,
    formats: Mutex<Vec<(PixelFormat, u32, u32)>>,
    read_errors: Mutex<VecDeque<RoverError>>,
    reject_start: AtomicBool,
    reject_format: AtomicBool,
}

/// Observation and fault-injection handle for a [`SimCamera`].
#[derive(Clone, Default)]
pub struct CameraProbe(Arc<CameraShared>);

impl CameraProbe {
    pub fn starts(&self) -> usize {
        self.0.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.0.stops.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.0.closes.load(Ordering::SeqCst)
    }

    /// Frames successfully read so far.
    pub fn frames_read(&self) -> u64 {
        self.0.frames.load(Ordering::SeqCst)
    }

    /// Every `set_format` request, in order.
    pub fn formats(&self) -> Vec<(PixelFormat, u32, u32)> {
        lock(&self.0.formats).clone()
    }

    /// Queue an error to be returned by the next `read_frame`.
    pub fn fail_next_read(&self, err: RoverError) {
        lock(&self.0.read_errors).push_back(err);
    }

    pub fn reject_start(&self, reject: bool) {
        self.0.reject_start.store(reject, Ordering::SeqCst);
    }

    /// Make `set_format` fail without recording the request.
    pub fn reject_format(&self, reject: bool) {
        self.0.reject_format.store(reject, Ordering::SeqCst);
    }
}

/// Minimal JPEG-framed payload (SOI, tag, EOI) tagged with `seq`.
pub fn fake_jpeg(seq: u64) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8];
    data.extend_from_slice(format!("frame-{seq}").as_bytes());
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

/// A simulated camera producing [`fake_jpeg`] frames at a fixed cadence.
pub struct SimCamera {
    id: String,
    probe: CameraProbe,
    streaming: bool,
    max_size: (u32, u32),
    frame_interval: Duration,
}

impl SimCamera {
    pub fn new(id: impl Into<String>, probe: CameraProbe) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            probe,
            streaming: false,
            max_size: (1280, 720),
            frame_interval: Duration::from_millis(5),
        })
    }

    pub fn with_frame_interval(mut self: Box<Self>, interval: Duration) -> Box<Self> {
        self.frame_interval = interval;
        self
    }
}

impl Camera for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_format(
        &mut self,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<(u32, u32), RoverError> {
        if self.probe.0.reject_format.load(Ordering::SeqCst) {
            return Err(RoverError::device(&self.id, "format not supported"));
        }
        lock(&self.probe.0.formats).push((format, width, height));
        let negotiated = (width.min(self.max_size.0), height.min(self.max_size.1));
        debug!(camera = %self.id, ?format, width = negotiated.0, height = negotiated.1, "sim format set");
        Ok(negotiated)
    }

    fn start_streaming(&mut self) -> Result<(), RoverError> {
        if self.probe.0.reject_start.load(Ordering::SeqCst) {
            return Err(RoverError::device(&self.id, "stream start refused"));
        }
        self.streaming = true;
        self.probe.0.starts.fetch_add(1, Ordering::SeqCst);
        debug!(camera = %self.id, "sim stream started");
        Ok(())
    }

    fn stop_streaming(&mut self) -> Result<(), RoverError> {
        self.streaming = false;
        self.probe.0.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn wait_for_frame(&mut self, timeout: Duration) -> Result<bool, RoverError> {
        if !self.streaming {
            return Err(RoverError::TransientIo {
                component: self.id.clone(),
                details: "not streaming".to_string(),
            });
        }
        thread::sleep(self.frame_interval.min(timeout));
        Ok(self.frame_interval <= timeout)
    }

    fn read_frame(&mut self) -> Result<Vec<u8>, RoverError> {
        if let Some(err) = lock(&self.probe.0.read_errors).pop_front() {
            return Err(err);
        }
        let seq = self.probe.0.frames.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(fake_jpeg(seq))
    }

    fn close(&mut self) -> Result<(), RoverError> {
        self.streaming = false;
        self.probe.0.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Audio
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct AudioShared {
    input_opens: AtomicUsize,
    input_starts: AtomicUsize,
    input_stops: AtomicUsize,
    input_closes: AtomicUsize,
    output_opens: AtomicUsize,
    output_starts: AtomicUsize,
    output_stops: AtomicUsize,
    output_closes: AtomicUsize,
    samples_read: AtomicU64,
    written: Mutex<Vec<i16>>,
    read_errors: Mutex<VecDeque<RoverError>>,
    write_errors: Mutex<VecDeque<RoverError>>,
    fail_input_open: AtomicBool,
    fail_output_open: AtomicBool,
    fail_input_start: AtomicBool,
    fail_output_start: AtomicBool,
}

/// Observation and fault-injection handle for a [`SimAudioHost`] and the
/// streams it opens.
#[derive(Clone, Default)]
pub struct AudioProbe(Arc<AudioShared>);

impl AudioProbe {
    pub fn input_opens(&self) -> usize {
        self.0.input_opens.load(Ordering::SeqCst)
    }

    pub fn input_starts(&self) -> usize {
        self.0.input_starts.load(Ordering::SeqCst)
    }

    pub fn input_stops(&self) -> usize {
        self.0.input_stops.load(Ordering::SeqCst)
    }

    pub fn input_closes(&self) -> usize {
        self.0.input_closes.load(Ordering::SeqCst)
    }

    pub fn output_opens(&self) -> usize {
        self.0.output_opens.load(Ordering::SeqCst)
    }

    pub fn output_starts(&self) -> usize {
        self.0.output_starts.load(Ordering::SeqCst)
    }

    pub fn output_stops(&self) -> usize {
        self.0.output_stops.load(Ordering::SeqCst)
    }

    pub fn output_closes(&self) -> usize {
        self.0.output_closes.load(Ordering::SeqCst)
    }

    pub fn samples_read(&self) -> u64 {
        self.0.samples_read.load(Ordering::SeqCst)
    }

    /// Every sample written to the speaker so far.
    pub fn written(&self) -> Vec<i16> {
        lock(&self.0.written).clone()
    }

    pub fn fail_next_read(&self, err: RoverError) {
        lock(&self.0.read_errors).push_back(err);
    }

    pub fn fail_next_write(&self, err: RoverError) {
        lock(&self.0.write_errors).push_back(err);
    }

    pub fn fail_input_open(&self, fail: bool) {
        self.0.fail_input_open.store(fail, Ordering::SeqCst);
    }

    pub fn fail_output_open(&self, fail: bool) {
        self.0.fail_output_open.store(fail, Ordering::SeqCst);
    }

    pub fn fail_input_start(&self, fail: bool) {
        self.0.fail_input_start.store(fail, Ordering::SeqCst);
    }

    pub fn fail_output_start(&self, fail: bool) {
        self.0.fail_output_start.store(fail, Ordering::SeqCst);
    }
}

/// A simulated sound card.
///
/// Reads and writes sleep for `cadence` to mimic a device paced by its
/// sample clock. The default cadence is the real buffer duration
/// (`frames / sample_rate`).
pub struct SimAudioHost {
    probe: AudioProbe,
    cadence: Option<Duration>,
}

impl SimAudioHost {
    pub fn new(probe: AudioProbe) -> Box<Self> {
        Box::new(Self {
            probe,
            cadence: None,
        })
    }

    pub fn with_cadence(mut self: Box<Self>, cadence: Duration) -> Box<Self> {
        self.cadence = Some(cadence);
        self
    }

    fn cadence_for(&self, params: StreamParams) -> Duration {
        self.cadence.unwrap_or_else(|| {
            let rate = u64::from(params.sample_rate.max(1));
            Duration::from_micros(params.frames as u64 * 1_000_000 / rate)
        })
    }
}

impl AudioHost for SimAudioHost {
    fn open_input(&self, params: StreamParams) -> Result<Box<dyn AudioInput>, RoverError> {
        self.probe.0.input_opens.fetch_add(1, Ordering::SeqCst);
        if self.probe.0.fail_input_open.load(Ordering::SeqCst) {
            return Err(RoverError::device("microphone", "no input device"));
        }
        Ok(Box::new(SimAudioInput {
            params,
            cadence: self.cadence_for(params),
            probe: self.probe.clone(),
            started: false,
            counter: 0,
        }))
    }

    fn open_output(&self, params: StreamParams) -> Result<Box<dyn AudioOutput>, RoverError> {
        self.probe.0.output_opens.fetch_add(1, Ordering::SeqCst);
        if self.probe.0.fail_output_open.load(Ordering::SeqCst) {
            return Err(RoverError::device("speaker", "no output device"));
        }
        Ok(Box::new(SimAudioOutput {
            params,
            cadence: self.cadence_for(params),
            probe: self.probe.clone(),
            started: false,
        }))
    }
}

fn check_len(component: &str, expected: usize, got: usize) -> Result<(), RoverError> {
    if expected == got {
        Ok(())
    } else {
        Err(RoverError::device(
            component,
            format!("buffer holds {got} samples, stream expects {expected}"),
        ))
    }
}

/// Simulated microphone: fills each buffer with a ramp.
pub struct SimAudioInput {
    params: StreamParams,
    cadence: Duration,
    probe: AudioProbe,
    started: bool,
    counter: i16,
}

impl AudioInput for SimAudioInput {
    fn params(&self) -> StreamParams {
        self.params
    }

    fn start(&mut self) -> Result<(), RoverError> {
        if self.probe.0.fail_input_start.load(Ordering::SeqCst) {
            return Err(RoverError::device("microphone", "input stream refused to start"));
        }
        self.started = true;
        self.probe.0.input_starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RoverError> {
        self.started = false;
        self.probe.0.input_stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) -> Result<(), RoverError> {
        self.started = false;
        self.probe.0.input_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<(), RoverError> {
        check_len("microphone", self.params.frames, buf.len())?;
        thread::sleep(self.cadence);
        if let Some(err) = lock(&self.probe.0.read_errors).pop_front() {
            return Err(err);
        }
        if !self.started {
            return Err(RoverError::TransientIo {
                component: "microphone".to_string(),
                details: "stream not started".to_string(),
            });
        }
        for sample in buf.iter_mut() {
            *sample = self.counter;
            self.counter = self.counter.wrapping_add(1);
        }
        self.probe
            .0
            .samples_read
            .fetch_add(buf.len() as u64, Ordering::SeqCst);
        Ok(())
    }
}

/// Simulated speaker: appends every written sample to the probe.
pub struct SimAudioOutput {
    params: StreamParams,
    cadence: Duration,
    probe: AudioProbe,
    started: bool,
}

impl AudioOutput for SimAudioOutput {
    fn params(&self) -> StreamParams {
        self.params
    }

    fn start(&mut self) -> Result<(), RoverError> {
        if self.probe.0.fail_output_start.load(Ordering::SeqCst) {
            return Err(RoverError::device("speaker", "no output device"));
        }
        self.started = true;
        self.probe.0.output_starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RoverError> {
        self.started = false;
        self.probe.0.output_stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) -> Result<(), RoverError> {
        self.started = false;
        self.probe.0.output_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn write(&mut self, buf: &[i16]) -> Result<(), RoverError> {
        check_len("speaker", self.params.frames, buf.len())?;
        thread::sleep(self.cadence);
        if let Some(err) = lock(&self.probe.0.write_errors).pop_front() {
            return Err(err);
        }
        if !self.started {
            return Err(RoverError::TransientIo {
                component: "speaker".to_string(),
                details: "stream not started".to_string(),
            });
        }
        lock(&self.probe.0.written).extend_from_slice(buf);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Display
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct DisplayShared {
    flushed: Mutex<Vec<Vec<bool>>>,
    resets: AtomicUsize,
    powered_off: AtomicBool,
    failing_flushes: AtomicUsize,
}

/// Observation and fault-injection handle for a [`SimDisplay`].
#[derive(Clone, Default)]
pub struct DisplayProbe(Arc<DisplayShared>);

impl DisplayProbe {
    /// Snapshot of the frame buffer at every successful flush.
    pub fn flushed(&self) -> Vec<Vec<bool>> {
        lock(&self.0.flushed).clone()
    }

    pub fn flush_count(&self) -> usize {
        lock(&self.0.flushed).len()
    }

    pub fn resets(&self) -> usize {
        self.0.resets.load(Ordering::SeqCst)
    }

    pub fn is_powered_off(&self) -> bool {
        self.0.powered_off.load(Ordering::SeqCst)
    }

    /// Make the next `n` flushes fail.
    pub fn fail_next_flushes(&self, n: usize) {
        self.0.failing_flushes.store(n, Ordering::SeqCst);
    }
}

/// A simulated monochrome display.
pub struct SimDisplay {
    width: u32,
    height: u32,
    buffer: Vec<bool>,
    probe: DisplayProbe,
}

impl SimDisplay {
    pub fn new(width: u32, height: u32, probe: DisplayProbe) -> Box<Self> {
        Box::new(Self {
            width,
            height,
            buffer: vec![false; (width * height) as usize],
            probe,
        })
    }
}

impl BitmapDisplay for SimDisplay {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn clear(&mut self) {
        self.buffer.fill(false);
    }

    fn set_pixel(&mut self, x: u32, y: u32, on: bool) {
        if x < self.width && y < self.height {
            self.buffer[(y * self.width + x) as usize] = on;
        }
    }

    fn flush(&mut self) -> Result<(), RoverError> {
        let failing = self
            .probe
            .0
            .failing_flushes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RoverError::TransientIo {
                component: "display".to_string(),
                details: "i2c write failed".to_string(),
            });
        }
        lock(&self.probe.0.flushed).push(self.buffer.clone());
        Ok(())
    }

    fn reset(&mut self) -> Result<(), RoverError> {
        debug!("sim display reset");
        self.buffer.fill(false);
        self.probe.0.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn power_off(&mut self) -> Result<(), RoverError> {
        self.probe.0.powered_off.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimHardware builder
// ────────────────────────────────────────────────────────────────────────────

/// Probes for every driver a [`SimHardware`] build produced.
#[derive(Clone, Default)]
pub struct SimProbes {
    pub pins: PinLog,
    pub servo: DutyLog,
    pub camera: CameraProbe,
    pub audio: AudioProbe,
    pub display: DisplayProbe,
}

/// Builder that assembles a [`RoverHardware`] bundle backed by simulated
/// drivers.
///
/// Call the `with_*` methods for the components you need, then
/// [`build`][Self::build] to get the bundle and its probes.
#[derive(Default)]
pub struct SimHardware {
    drive_base: bool,
    servo: bool,
    headlight: bool,
    camera: bool,
    audio: bool,
    audio_cadence: Option<Duration>,
    display: Option<(u32, u32)>,
}

impl SimHardware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every component, with a 128×64 display.
    pub fn full() -> Self {
        Self::new()
            .with_drive_base()
            .with_servo()
            .with_headlight()
            .with_camera()
            .with_audio()
            .with_display(128, 64)
    }

    /// Four motor pins named [`LEFT_FWD_PIN`], [`LEFT_BWD_PIN`],
    /// [`RIGHT_FWD_PIN`] and [`RIGHT_BWD_PIN`].
    pub fn with_drive_base(mut self) -> Self {
        self.drive_base = true;
        self
    }

    /// A pan servo on a 20 ms PWM period.
    pub fn with_servo(mut self) -> Self {
        self.servo = true;
        self
    }

    pub fn with_headlight(mut self) -> Self {
        self.headlight = true;
        self
    }

    pub fn with_camera(mut self) -> Self {
        self.camera = true;
        self
    }

    pub fn with_audio(mut self) -> Self {
        self.audio = true;
        self
    }

    /// Audio host whose streams move one buffer per `cadence`.
    pub fn with_audio_cadence(mut self, cadence: Duration) -> Self {
        self.audio = true;
        self.audio_cadence = Some(cadence);
        self
    }

    pub fn with_display(mut self, width: u32, height: u32) -> Self {
        self.display = Some((width, height));
        self
    }

    /// Consume the builder and return the hardware bundle with its probes.
    pub fn build(self) -> (RoverHardware, SimProbes) {
        let probes = SimProbes::default();
        let mut hw = RoverHardware::new();

        if self.drive_base {
            let log = &probes.pins;
            hw = hw.with_motors(MotorPins::new(
                SimPin::new(LEFT_FWD_PIN, log.clone()),
                SimPin::new(LEFT_BWD_PIN, log.clone()),
                SimPin::new(RIGHT_FWD_PIN, log.clone()),
                SimPin::new(RIGHT_BWD_PIN, log.clone()),
            ));
        }
        if self.servo {
            hw = hw.with_servo(SimPwm::new("servo", 20_000, probes.servo.clone()));
        }
        if self.headlight {
            hw = hw.with_headlight(SimPin::new(HEADLIGHT_PIN, probes.pins.clone()));
        }
        if self.camera {
            hw = hw.with_camera(SimCamera::new("sim-camera", probes.camera.clone()));
        }
        if self.audio {
            let mut host = SimAudioHost::new(probes.audio.clone());
            if let Some(cadence) = self.audio_cadence {
                host = host.with_cadence(cadence);
            }
            hw = hw.with_audio(host);
        }
        if let Some((w, h)) = self.display {
            hw = hw.with_display(SimDisplay::new(w, h, probes.display.clone()));
        }

        (hw, probes)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_log_tracks_high_pins() {
        let log = PinLog::default();
        let mut a = SimPin::new("a", log.clone());
        let mut b = SimPin::new("b", log.clone());

        a.write(true).unwrap();
        b.write(true).unwrap();
        a.write(false).unwrap();

        assert_eq!(log.writes().len(), 3);
        assert_eq!(log.high_pins(), BTreeSet::from(["b".to_string()]));
        assert!(!a.is_high());
        assert!(b.is_high());
    }

    #[test]
    fn failing_pin_keeps_level_and_log() {
        let log = PinLog::default();
        let mut pin = SimPin::new("broken", log.clone());
        log.fail_pin("broken");

        let err = pin.write(true).unwrap_err();
        assert_eq!(err.code(), "DEVICE_ERROR");
        assert!(!pin.is_high());
        assert!(log.writes().is_empty());
    }

    #[test]
    fn sim_pwm_records_duties_and_checks_period() {
        let log = DutyLog::default();
        let mut pwm = SimPwm::new("servo", 20_000, log.clone());
        pwm.set_duty_cycle(1250).unwrap();
        assert!(pwm.set_duty_cycle(25_000).is_err());
        assert_eq!(log.duties(), vec![1250]);
    }

    #[test]
    fn sim_camera_streams_numbered_frames() {
        let probe = CameraProbe::default();
        let mut cam = SimCamera::new("cam", probe.clone()).with_frame_interval(Duration::ZERO);

        assert_eq!(
            cam.set_format(PixelFormat::Mjpeg, 1920, 1080).unwrap(),
            (1280, 720)
        );
        assert!(cam.wait_for_frame(Duration::from_millis(10)).is_err());

        cam.start_streaming().unwrap();
        assert!(cam.wait_for_frame(Duration::from_millis(10)).unwrap());
        assert_eq!(cam.read_frame().unwrap(), fake_jpeg(1));
        assert_eq!(cam.read_frame().unwrap(), fake_jpeg(2));
        assert_eq!(probe.frames_read(), 2);
        assert_eq!(probe.starts(), 1);
    }

    #[test]
    fn sim_camera_scripted_read_error() {
        let probe = CameraProbe::default();
        let mut cam = SimCamera::new("cam", probe.clone());
        cam.start_streaming().unwrap();
        probe.fail_next_read(RoverError::FatalIo {
            component: "cam".into(),
            details: "unplugged".into(),
        });

        assert!(cam.read_frame().unwrap_err().is_fatal());
        assert_eq!(cam.read_frame().unwrap(), fake_jpeg(1));
    }

    #[test]
    fn sim_audio_input_requires_start() {
        let probe = AudioProbe::default();
        let host = SimAudioHost::new(probe.clone()).with_cadence(Duration::ZERO);
        let params = StreamParams {
            sample_rate: 8000,
            frames: 4,
        };
        let mut input = host.open_input(params).unwrap();
        let mut buf = [0i16; 4];

        assert!(input.read(&mut buf).is_err());
        input.start().unwrap();
        input.read(&mut buf).unwrap();
        assert_eq!(buf, [0, 1, 2, 3]);
        assert_eq!(probe.samples_read(), 4);

        let mut short = [0i16; 3];
        assert_eq!(input.read(&mut short).unwrap_err().code(), "DEVICE_ERROR");
    }

    #[test]
    fn sim_audio_output_collects_samples() {
        let probe = AudioProbe::default();
        let host = SimAudioHost::new(probe.clone()).with_cadence(Duration::ZERO);
        let mut out = host
            .open_output(StreamParams {
                sample_rate: 4000,
                frames: 2,
            })
            .unwrap();

        out.start().unwrap();
        out.write(&[7, -7]).unwrap();
        out.stop().unwrap();
        out.close().unwrap();

        assert_eq!(probe.written(), vec![7, -7]);
        assert_eq!(probe.output_starts(), 1);
        assert_eq!(probe.output_stops(), 1);
        assert_eq!(probe.output_closes(), 1);
    }

    #[test]
    fn sim_audio_default_cadence_matches_buffer_duration() {
        let host = SimAudioHost::new(AudioProbe::default());
        let cadence = host.cadence_for(StreamParams {
            sample_rate: 8000,
            frames: 512,
        });
        assert_eq!(cadence, Duration::from_millis(64));
    }

    #[test]
    fn sim_display_flush_failures_are_scripted() {
        let probe = DisplayProbe::default();
        let mut display = SimDisplay::new(2, 2, probe.clone());
        display.set_pixel(1, 0, true);
        display.set_pixel(5, 5, true);

        probe.fail_next_flushes(1);
        assert!(display.flush().is_err());
        display.flush().unwrap();

        assert_eq!(probe.flushed(), vec![vec![false, true, false, false]]);
        display.reset().unwrap();
        display.power_off().unwrap();
        assert_eq!(probe.resets(), 1);
        assert!(probe.is_powered_off());
    }

    #[test]
    fn sim_hardware_full_stack_no_hardware_required() {
        let (hw, _probes) = SimHardware::full().build();
        assert_eq!(
            hw.inventory(),
            "motors servo headlight camera audio display"
        );
    }

    #[test]
    fn sim_hardware_empty_build() {
        let (hw, _probes) = SimHardware::new().build();
        assert_eq!(hw.inventory(), "none");
    }
}
