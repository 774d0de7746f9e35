//! [`AudioPipeline`] – full-duplex PCM link between the rover and operators.
//!
//! Two lanes share one sound card:
//!
//! - **capture**: microphone → little-endian byte chunks → bounded broadcast
//!   ring, read by every `/audiostream` listener;
//! - **playback**: operator uploads → bounded queue → speaker.
//!
//! The card cannot usefully record while it plays (the speaker would feed
//! straight back into the microphone), so starting playback pauses a
//! running capture and stopping playback resumes it exactly once.
//!
//! # State machine
//!
//! Each lane moves `Idle → Starting → Running → Stopping → Idle`. All phase
//! changes go through [`transition`] while holding the single machine lock,
//! so only one start/stop is ever in flight. A loop that dies on a fatal
//! device error is *reaped* back to `Idle` by the next request or status
//! query; reaping a dead playback lane resumes a paused capture.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rover_hal::{AudioHost, AudioInput, AudioOutput, StreamParams};
use rover_types::{AudioChannelState, LoopPhase, RoverError};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::device::BlockingDevice;

/// One captured chunk: 16-bit little-endian mono PCM.
pub type SampleBuffer = Arc<[u8]>;

// ────────────────────────────────────────────────────────────────────────────
// Configuration & stats
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub capture_sample_rate: u32,
    /// Samples per captured chunk.
    pub capture_frames: usize,
    pub playback_sample_rate: u32,
    /// Samples per speaker write. Uploads must be a whole number of these.
    pub playback_frames: usize,
    /// Chunks buffered per listener before the oldest are dropped.
    pub outbound_capacity: usize,
    /// Uploaded buffers queued before new ones are dropped.
    pub inbound_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: 8000,
            capture_frames: 512,
            playback_sample_rate: 4000,
            playback_frames: 740,
            outbound_capacity: 32,
            inbound_capacity: 100,
        }
    }
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AudioStats {
    /// Chunks handed to at least one listener.
    pub chunks_sent: u64,
    /// Chunks a slow listener never saw.
    pub chunks_lost: u64,
    /// Chunks captured while nobody was listening.
    pub chunks_unheard: u64,
    /// Uploads dropped because the playback queue was full.
    pub inbound_dropped: u64,
    /// Uploads dropped for not being a whole number of speaker frames.
    pub inbound_malformed: u64,
}

#[derive(Default)]
struct Counters {
    chunks_sent: AtomicU64,
    chunks_lost: AtomicU64,
    chunks_unheard: AtomicU64,
    inbound_dropped: AtomicU64,
    inbound_malformed: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn snapshot(&self) -> AudioStats {
        AudioStats {
            chunks_sent: self.chunks_sent.load(Ordering::Relaxed),
            chunks_lost: self.chunks_lost.load(Ordering::Relaxed),
            chunks_unheard: self.chunks_unheard.load(Ordering::Relaxed),
            inbound_dropped: self.inbound_dropped.load(Ordering::Relaxed),
            inbound_malformed: self.inbound_malformed.load(Ordering::Relaxed),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Lane state machine
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum LoopExit {
    /// Out-of-band stop signal.
    Stopped,
    /// The inbound queue closed.
    Closed,
    /// Fatal device error.
    Failed(RoverError),
}

struct RunningLoop {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<LoopExit>,
}

struct Lane {
    name: &'static str,
    phase: LoopPhase,
    running: Option<RunningLoop>,
}

impl Lane {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            phase: LoopPhase::Idle,
            running: None,
        }
    }

    fn is_running(&self) -> bool {
        self.phase == LoopPhase::Running
    }
}

/// The only place a lane's phase changes.
fn transition(lane: &mut Lane, to: LoopPhase) -> Result<(), RoverError> {
    use LoopPhase::{Idle, Running, Starting, Stopping};
    let legal = matches!(
        (lane.phase, to),
        (Idle, Starting)
            | (Starting, Running)
            | (Starting, Idle)
            | (Running, Stopping)
            | (Stopping, Idle)
            | (Running, Idle)
    );
    if !legal {
        return Err(RoverError::device(
            lane.name,
            format!("illegal transition {:?} -> {:?}", lane.phase, to),
        ));
    }
    trace!(lane = lane.name, from = ?lane.phase, to = ?to, "lane transition");
    lane.phase = to;
    Ok(())
}

struct AudioMachine {
    capture: Lane,
    playback: Lane,
    paused_by_playback: bool,
    closed: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Byte framing
// ────────────────────────────────────────────────────────────────────────────

fn encode_le(samples: &[i16]) -> SampleBuffer {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

fn decode_le(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// AudioPipeline
// ────────────────────────────────────────────────────────────────────────────

/// Full-duplex audio link.
pub struct AudioPipeline {
    config: AudioConfig,
    input: BlockingDevice<dyn AudioInput>,
    output: BlockingDevice<dyn AudioOutput>,
    machine: Mutex<AudioMachine>,
    outbound: broadcast::Sender<SampleBuffer>,
    inbound_tx: mpsc::Sender<Vec<u8>>,
    inbound_rx: Arc<Mutex<mpsc::Receiver<Vec<u8>>>>,
    counters: Arc<Counters>,
}

impl AudioPipeline {
    /// Open the default input and output streams on `host`.
    ///
    /// # Errors
    ///
    /// [`RoverError::Device`] if either stream cannot be opened.
    pub fn init(host: &dyn AudioHost, config: AudioConfig) -> Result<Self, RoverError> {
        let input = host
            .open_input(StreamParams {
                sample_rate: config.capture_sample_rate,
                frames: config.capture_frames,
            })
            .map_err(RoverError::into_device_error)?;
        let output = host
            .open_output(StreamParams {
                sample_rate: config.playback_sample_rate,
                frames: config.playback_frames,
            })
            .map_err(RoverError::into_device_error)?;

        let (outbound, _) = broadcast::channel(config.outbound_capacity.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity.max(1));

        info!(
            capture_hz = config.capture_sample_rate,
            playback_hz = config.playback_sample_rate,
            "audio pipeline initialised"
        );

        Ok(Self {
            config,
            input: BlockingDevice::new("microphone", input),
            output: BlockingDevice::new("speaker", output),
            machine: Mutex::new(AudioMachine {
                capture: Lane::new("capture"),
                playback: Lane::new("playback"),
                paused_by_playback: false,
                closed: false,
            }),
            outbound,
            inbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            counters: Arc::new(Counters::default()),
        })
    }

    // ── Capture ──────────────────────────────────────────────────────────

    /// Start streaming the microphone to listeners.
    ///
    /// No-op if already capturing. While playback runs the request is
    /// remembered and honoured when playback ends.
    pub async fn start_capture(&self) -> Result<(), RoverError> {
        let mut m = self.machine.lock().await;
        self.reap(&mut m).await;
        ensure_open(&m)?;

        if m.capture.is_running() {
            return Ok(());
        }
        if m.playback.is_running() {
            m.paused_by_playback = true;
            info!("capture deferred until playback stops");
            return Ok(());
        }
        self.launch_capture(&mut m).await
    }

    /// Stop streaming the microphone. Also cancels a deferred capture.
    pub async fn stop_capture(&self) -> Result<(), RoverError> {
        let mut m = self.machine.lock().await;
        self.reap(&mut m).await;

        m.paused_by_playback = false;
        if !m.capture.is_running() {
            return Ok(());
        }
        halt(&mut m.capture).await
    }

    // ── Playback ─────────────────────────────────────────────────────────

    /// Start feeding uploaded buffers to the speaker.
    ///
    /// Pauses a running capture. If the speaker fails to start, a capture
    /// paused by this call is resumed before the error is returned.
    pub async fn start_playback(&self) -> Result<(), RoverError> {
        let mut m = self.machine.lock().await;
        self.reap(&mut m).await;
        ensure_open(&m)?;

        if m.playback.is_running() {
            return Ok(());
        }
        if m.capture.is_running() {
            halt(&mut m.capture).await?;
            m.paused_by_playback = true;
            info!("capture paused for playback");
        }

        transition(&mut m.playback, LoopPhase::Starting)?;

        let stale = {
            let mut rx = self.inbound_rx.lock().await;
            let mut n = 0usize;
            while rx.try_recv().is_ok() {
                n += 1;
            }
            n
        };
        if stale > 0 {
            debug!(stale, "discarded queued playback buffers");
        }

        if let Err(err) = self.output.call(|dev| dev.start()).await {
            transition(&mut m.playback, LoopPhase::Idle)?;
            if m.paused_by_playback {
                m.paused_by_playback = false;
                if let Err(resume_err) = self.launch_capture(&mut m).await {
                    warn!(error = %resume_err, "capture resume after failed playback start failed");
                }
            }
            return Err(err.into_device_error());
        }

        let (stop, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(playback_loop(
            self.output.clone(),
            self.config.playback_frames,
            Arc::clone(&self.inbound_rx),
            Arc::clone(&self.counters),
            stop_rx,
        ));
        m.playback.running = Some(RunningLoop { stop, handle });
        transition(&mut m.playback, LoopPhase::Running)?;
        info!("playback started");
        Ok(())
    }

    /// Stop the speaker and resume a capture it paused.
    pub async fn stop_playback(&self) -> Result<(), RoverError> {
        let mut m = self.machine.lock().await;
        self.reap(&mut m).await;

        if !m.playback.is_running() {
            return Ok(());
        }
        halt(&mut m.playback).await?;
        info!("playback stopped");

        if m.paused_by_playback {
            m.paused_by_playback = false;
            if !m.closed {
                self.launch_capture(&mut m).await?;
                info!("capture resumed after playback");
            }
        }
        Ok(())
    }

    /// Queue an uploaded buffer for the speaker.
    ///
    /// Never blocks. When the queue is full the new buffer is dropped and
    /// counted.
    pub fn push_playback(&self, buffer: Vec<u8>) -> Result<(), RoverError> {
        match self.inbound_tx.try_send(buffer) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                Counters::bump(&self.counters.inbound_dropped, 1);
                trace!("playback queue full, buffer dropped");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(RoverError::Channel("playback queue closed".to_string()))
            }
        }
    }

    // ── Listeners & status ───────────────────────────────────────────────

    /// Follow the capture stream.
    pub fn subscribe(&self) -> AudioSubscriber {
        AudioSubscriber {
            receiver: self.outbound.subscribe(),
            counters: Arc::clone(&self.counters),
        }
    }

    pub async fn status(&self) -> AudioChannelState {
        let mut m = self.machine.lock().await;
        self.reap(&mut m).await;
        AudioChannelState {
            recording: m.capture.is_running(),
            playing: m.playback.is_running(),
            paused_by_playback: m.paused_by_playback,
        }
    }

    pub fn stats(&self) -> AudioStats {
        self.counters.snapshot()
    }

    /// Stop both lanes and close both streams. Terminal: later starts fail
    /// with [`RoverError::NotInitialized`].
    pub async fn shutdown(&self) -> Result<(), RoverError> {
        let mut m = self.machine.lock().await;
        if m.closed {
            return Ok(());
        }
        self.reap(&mut m).await;
        m.paused_by_playback = false;
        m.closed = true;

        let mut first_err = None;
        let machine = &mut *m;
        for lane in [&mut machine.capture, &mut machine.playback] {
            if lane.is_running() {
                if let Err(err) = halt(lane).await {
                    first_err.get_or_insert(err);
                }
            }
        }
        if let Err(err) = self.input.call(|dev| dev.close()).await {
            first_err.get_or_insert(err);
        }
        if let Err(err) = self.output.call(|dev| dev.close()).await {
            first_err.get_or_insert(err);
        }
        info!("audio pipeline shut down");
        first_err.map_or(Ok(()), Err)
    }

    // ── Internals ────────────────────────────────────────────────────────

    async fn launch_capture(&self, m: &mut AudioMachine) -> Result<(), RoverError> {
        transition(&mut m.capture, LoopPhase::Starting)?;
        if let Err(err) = self.input.call(|dev| dev.start()).await {
            transition(&mut m.capture, LoopPhase::Idle)?;
            return Err(err.into_device_error());
        }

        let (stop, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(capture_loop(
            self.input.clone(),
            self.config.capture_frames,
            self.outbound.clone(),
            Arc::clone(&self.counters),
            stop_rx,
        ));
        m.capture.running = Some(RunningLoop { stop, handle });
        transition(&mut m.capture, LoopPhase::Running)?;
        info!("capture started");
        Ok(())
    }

    /// Return lanes whose loop has already exited to `Idle`.
    async fn reap(&self, m: &mut AudioMachine) {
        reap_lane(&mut m.capture).await;
        if reap_lane(&mut m.playback).await && m.paused_by_playback && !m.closed {
            m.paused_by_playback = false;
            match self.launch_capture(m).await {
                Ok(()) => info!("capture resumed after playback failure"),
                Err(err) => warn!(error = %err, "capture resume after playback failure failed"),
            }
        }
    }
}

fn ensure_open(m: &AudioMachine) -> Result<(), RoverError> {
    if m.closed {
        Err(RoverError::NotInitialized("audio".to_string()))
    } else {
        Ok(())
    }
}

/// Signal the lane's loop to stop and wait for it.
async fn halt(lane: &mut Lane) -> Result<(), RoverError> {
    transition(lane, LoopPhase::Stopping)?;
    if let Some(running) = lane.running.take() {
        let _ = running.stop.send(());
        match running.handle.await {
            Ok(exit) => debug!(lane = lane.name, ?exit, "loop exited"),
            Err(err) => warn!(lane = lane.name, error = %err, "loop task failed"),
        }
    }
    transition(lane, LoopPhase::Idle)
}

/// `true` if the lane was running but its loop had already exited.
async fn reap_lane(lane: &mut Lane) -> bool {
    let finished = lane
        .running
        .as_ref()
        .is_some_and(|running| running.handle.is_finished());
    if !finished {
        return false;
    }
    if let Some(running) = lane.running.take() {
        match running.handle.await {
            Ok(exit) => warn!(lane = lane.name, ?exit, "loop ended on its own"),
            Err(err) => warn!(lane = lane.name, error = %err, "loop task failed"),
        }
    }
    if let Err(err) = transition(lane, LoopPhase::Idle) {
        error!(lane = lane.name, error = %err, "reap failed");
    }
    true
}

// ────────────────────────────────────────────────────────────────────────────
// Loops
// ────────────────────────────────────────────────────────────────────────────

async fn capture_loop(
    input: BlockingDevice<dyn AudioInput>,
    frames: usize,
    outbound: broadcast::Sender<SampleBuffer>,
    counters: Arc<Counters>,
    mut stop: oneshot::Receiver<()>,
) -> LoopExit {
    let exit = loop {
        let read = input.call(move |dev| {
            let mut buf = vec![0i16; frames];
            dev.read(&mut buf)?;
            Ok(buf)
        });
        tokio::select! {
            biased;
            _ = &mut stop => break LoopExit::Stopped,
            res = read => match res {
                Ok(samples) => {
                    let chunk = encode_le(&samples);
                    match outbound.send(chunk) {
                        Ok(listeners) => {
                            Counters::bump(&counters.chunks_sent, 1);
                            trace!(listeners, "audio chunk sent");
                        }
                        Err(_) => Counters::bump(&counters.chunks_unheard, 1),
                    }
                }
                Err(err) if err.is_fatal() => {
                    error!(error = %err, "microphone read failed, capture loop ending");
                    break LoopExit::Failed(err);
                }
                Err(err) => warn!(error = %err, "microphone read failed"),
            },
        }
    };

    if let Err(err) = input.call(|dev| dev.stop()).await {
        warn!(error = %err, "microphone stop failed");
    }
    exit
}

async fn playback_loop(
    output: BlockingDevice<dyn AudioOutput>,
    frames: usize,
    inbound: Arc<Mutex<mpsc::Receiver<Vec<u8>>>>,
    counters: Arc<Counters>,
    mut stop: oneshot::Receiver<()>,
) -> LoopExit {
    let frame_bytes = frames * 2;
    let mut rx = inbound.lock().await;

    let exit = loop {
        let buffer = tokio::select! {
            biased;
            _ = &mut stop => break LoopExit::Stopped,
            msg = rx.recv() => match msg {
                Some(buffer) => buffer,
                None => break LoopExit::Closed,
            },
        };

        if buffer.is_empty() || buffer.len() % frame_bytes != 0 {
            Counters::bump(&counters.inbound_malformed, 1);
            warn!(
                len = buffer.len(),
                frame_bytes, "playback buffer is not a whole number of frames, dropped"
            );
            continue;
        }

        let samples = decode_le(&buffer);
        let written = output
            .call(move |dev| {
                for frame in samples.chunks(frames) {
                    dev.write(frame)?;
                }
                Ok(())
            })
            .await;
        match written {
            Ok(()) => trace!(bytes = buffer.len(), "playback buffer written"),
            Err(err) if err.is_fatal() => {
                error!(error = %err, "speaker write failed, playback loop ending");
                break LoopExit::Failed(err);
            }
            Err(err) => warn!(error = %err, "speaker write failed"),
        }
    };

    if let Err(err) = output.call(|dev| dev.stop()).await {
        warn!(error = %err, "speaker stop failed");
    }
    exit
}

// ────────────────────────────────────────────────────────────────────────────
// Listener
// ────────────────────────────────────────────────────────────────────────────

/// A listener on the capture stream.
pub struct AudioSubscriber {
    receiver: broadcast::Receiver<SampleBuffer>,
    counters: Arc<Counters>,
}

impl AudioSubscriber {
    /// Next captured chunk. Chunks missed by falling behind are logged and
    /// counted, then skipped. Returns `None` once the pipeline is gone.
    pub async fn recv(&mut self) -> Option<SampleBuffer> {
        loop {
            match self.receiver.recv().await {
                Ok(chunk) => return Some(chunk),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged_by = n, "audio listener lagged");
                    Counters::bump(&self.counters.chunks_lost, n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
