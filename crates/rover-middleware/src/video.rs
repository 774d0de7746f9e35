//! [`VideoPipeline`] – camera capture decoupled from MJPEG publication.
//!
//! Two cadences run while streaming:
//!
//! 1. a capture loop on the blocking pool that waits for the camera and
//!    keeps only the most recent frame;
//! 2. a publisher ticking at `1000 / fps` ms that copies that frame into the
//!    [`FrameSlot`], but only when a newer capture exists.
//!
//! The camera's own buffering means reading it at the publish rate would
//! fall behind; draining it continuously keeps latency at one frame.

use std::sync::Arc;
use std::time::Duration;

use rover_hal::Camera;
use rover_types::{PixelFormat, Resolution, RoverError, VideoStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::device::BlockingDevice;
use crate::frame_slot::FrameSlot;

const MAX_FPS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    /// Upper bound on one wait-for-frame call. Also bounds stop latency.
    pub frame_wait_ms: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            fps: 2,
            width: 640,
            height: 480,
            pixel_format: PixelFormat::Mjpeg,
            frame_wait_ms: 1000,
        }
    }
}

fn check_fps(fps: u32) -> Result<u32, RoverError> {
    if (1..=MAX_FPS).contains(&fps) {
        Ok(fps)
    } else {
        Err(RoverError::out_of_range("fps", i64::from(fps)))
    }
}

#[derive(Debug)]
enum CaptureExit {
    Stopped,
    Failed(RoverError),
}

struct Streaming {
    /// Publish rate and requested size the stream was started with.
    fps: u32,
    size: (u32, u32),
    stop: watch::Sender<bool>,
    capture: JoinHandle<CaptureExit>,
    publisher: JoinHandle<()>,
}

struct VideoState {
    fps: u32,
    format: PixelFormat,
    /// Size last asked for.
    requested: (u32, u32),
    /// Size the camera accepted.
    negotiated: (u32, u32),
    streaming: Option<Streaming>,
    closed: bool,
}

/// Owns the camera and the published frame slot.
pub struct VideoPipeline {
    camera: BlockingDevice<dyn Camera>,
    state: Mutex<VideoState>,
    slot: FrameSlot,
    frame_wait: Duration,
}

impl VideoPipeline {
    /// Take the camera and negotiate the configured format.
    ///
    /// # Errors
    ///
    /// [`RoverError::InvalidRange`] for an fps outside `1..=30`,
    /// [`RoverError::Device`] if the camera rejects the format.
    pub fn init(camera: Box<dyn Camera>, config: VideoConfig) -> Result<Self, RoverError> {
        let fps = check_fps(config.fps)?;
        let camera = BlockingDevice::new("camera", camera);
        let negotiated = camera
            .call_blocking(|cam| cam.set_format(config.pixel_format, config.width, config.height))
            .map_err(RoverError::into_device_error)?;
        info!(
            camera = camera.name(),
            fps,
            width = negotiated.0,
            height = negotiated.1,
            "video pipeline initialised"
        );
        Ok(Self {
            camera,
            state: Mutex::new(VideoState {
                fps,
                format: config.pixel_format,
                requested: (config.width, config.height),
                negotiated,
                streaming: None,
                closed: false,
            }),
            slot: FrameSlot::new(),
            frame_wait: Duration::from_millis(config.frame_wait_ms),
        })
    }

    /// The slot MJPEG readers follow.
    pub fn frames(&self) -> FrameSlot {
        self.slot.clone()
    }

    /// Negotiate a new format. Refused while streaming.
    pub async fn set_format(
        &self,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<(), RoverError> {
        let mut st = self.state.lock().await;
        self.reap(&mut st).await;
        ensure_open(&st)?;
        if st.streaming.is_some() {
            return Err(RoverError::device(
                "camera",
                "format cannot change while streaming",
            ));
        }
        self.negotiate(&mut st, format, width, height).await
    }

    /// Set the publish rate used by the next start.
    pub async fn set_fps(&self, fps: u32) -> Result<(), RoverError> {
        let fps = check_fps(fps)?;
        self.state.lock().await.fps = fps;
        debug!(fps, "video fps set");
        Ok(())
    }

    /// Start streaming. No-op if already streaming.
    pub async fn start_stream(&self) -> Result<(), RoverError> {
        let mut st = self.state.lock().await;
        self.reap(&mut st).await;
        ensure_open(&st)?;
        self.launch(&mut st).await
    }

    /// Stop streaming. No-op if not streaming.
    pub async fn stop_stream(&self) -> Result<(), RoverError> {
        let mut st = self.state.lock().await;
        self.reap(&mut st).await;
        self.halt(&mut st).await
    }

    /// Apply `fps` and `resolution`, restarting the stream only if they
    /// differ from what it is running with, and make sure it runs.
    ///
    /// An idle pipeline compares against its stored configuration instead.
    pub async fn reconfigure(&self, fps: u32, resolution: Resolution) -> Result<(), RoverError> {
        let fps = check_fps(fps)?;
        let mut st = self.state.lock().await;
        self.reap(&mut st).await;
        ensure_open(&st)?;

        let wanted = (resolution.width, resolution.height);
        let current = match &st.streaming {
            Some(running) => (running.fps, running.size),
            None => (st.fps, st.requested),
        };
        if current != (fps, wanted) {
            info!(fps, width = wanted.0, height = wanted.1, "reconfiguring video");
            self.halt(&mut st).await?;
            if st.requested != wanted {
                let format = st.format;
                self.negotiate(&mut st, format, wanted.0, wanted.1).await?;
            }
            st.fps = fps;
        }
        self.launch(&mut st).await
    }

    pub async fn status(&self) -> VideoStatus {
        let mut st = self.state.lock().await;
        self.reap(&mut st).await;
        VideoStatus {
            streaming: st.streaming.is_some(),
            fps: st.fps,
            width: st.negotiated.0,
            height: st.negotiated.1,
            pixel_format: st.format,
        }
    }

    /// Stop streaming and close the camera. Terminal.
    pub async fn shutdown(&self) -> Result<(), RoverError> {
        let mut st = self.state.lock().await;
        if st.closed {
            return Ok(());
        }
        self.reap(&mut st).await;
        st.closed = true;
        let halted = self.halt(&mut st).await;
        let closed = self.camera.call(|cam| cam.close()).await;
        info!("video pipeline shut down");
        halted.and(closed)
    }

    // ── Internals ────────────────────────────────────────────────────────

    async fn negotiate(
        &self,
        st: &mut VideoState,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<(), RoverError> {
        let negotiated = self
            .camera
            .call(move |cam| cam.set_format(format, width, height))
            .await
            .map_err(RoverError::into_device_error)?;
        st.format = format;
        st.requested = (width, height);
        st.negotiated = negotiated;
        debug!(?format, width = negotiated.0, height = negotiated.1, "video format negotiated");
        Ok(())
    }

    async fn launch(&self, st: &mut VideoState) -> Result<(), RoverError> {
        if st.streaming.is_some() {
            return Ok(());
        }
        self.camera
            .call(|cam| cam.start_streaming())
            .await
            .map_err(RoverError::into_device_error)?;

        let (stop, stop_rx) = watch::channel(false);
        let (latest_tx, latest_rx) = watch::channel(None);

        let camera = self.camera.clone();
        let wait = self.frame_wait;
        let capture_stop = stop_rx.clone();
        let capture = tokio::task::spawn_blocking(move || {
            capture_loop(&camera, wait, &capture_stop, &latest_tx)
        });
        let publisher = tokio::spawn(publish_loop(
            st.fps,
            latest_rx,
            self.slot.clone(),
            stop_rx,
        ));

        st.streaming = Some(Streaming {
            fps: st.fps,
            size: st.requested,
            stop,
            capture,
            publisher,
        });
        info!(fps = st.fps, "video capture started");
        Ok(())
    }

    async fn halt(&self, st: &mut VideoState) -> Result<(), RoverError> {
        let Some(streaming) = st.streaming.take() else {
            return Ok(());
        };
        let exit = join_streaming(streaming).await;
        debug!(?exit, "video capture loop exited");
        let stopped = self
            .camera
            .call(|cam| cam.stop_streaming())
            .await
            .map_err(RoverError::into_device_error);
        info!("video capture stopped");
        stopped
    }

    async fn reap(&self, st: &mut VideoState) {
        let dead = st
            .streaming
            .as_ref()
            .is_some_and(|s| s.capture.is_finished());
        if !dead {
            return;
        }
        if let Some(streaming) = st.streaming.take() {
            let exit = join_streaming(streaming).await;
            warn!(?exit, "video capture ended on its own");
        }
        if let Err(err) = self.camera.call(|cam| cam.stop_streaming()).await {
            warn!(error = %err, "camera stop after capture failure failed");
        }
    }
}

fn ensure_open(st: &VideoState) -> Result<(), RoverError> {
    if st.closed {
        Err(RoverError::NotInitialized("video".to_string()))
    } else {
        Ok(())
    }
}

async fn join_streaming(streaming: Streaming) -> Option<CaptureExit> {
    let _ = streaming.stop.send(true);
    if let Err(err) = streaming.publisher.await {
        warn!(error = %err, "video publisher task failed");
    }
    match streaming.capture.await {
        Ok(exit) => Some(exit),
        Err(err) => {
            warn!(error = %err, "video capture task failed");
            None
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Loops
// ────────────────────────────────────────────────────────────────────────────

fn capture_loop(
    camera: &BlockingDevice<dyn Camera>,
    wait: Duration,
    stop: &watch::Receiver<bool>,
    latest: &watch::Sender<Option<Arc<[u8]>>>,
) -> CaptureExit {
    loop {
        // a closed channel means the pipeline itself is gone
        if *stop.borrow() || stop.has_changed().is_err() {
            return CaptureExit::Stopped;
        }
        let res = camera.call_blocking(|cam| {
            if !cam.wait_for_frame(wait)? {
                return Ok(None);
            }
            cam.read_frame().map(Some)
        });
        match res {
            Ok(Some(frame)) if !frame.is_empty() => {
                latest.send_replace(Some(frame.into()));
            }
            Ok(Some(_)) => warn!("camera returned an empty frame"),
            Ok(None) => trace!("frame wait timed out"),
            Err(err) if err.is_fatal() => {
                error!(error = %err, "camera failed, capture loop ending");
                return CaptureExit::Failed(err);
            }
            Err(err) => {
                warn!(error = %err, "camera read failed");
                // back off before retrying
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }
}

async fn publish_loop(
    fps: u32,
    mut captured: watch::Receiver<Option<Arc<[u8]>>>,
    slot: FrameSlot,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(1000 / u64::from(fps.max(1))));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                match captured.has_changed() {
                    Ok(true) => {
                        if let Some(frame) = captured.borrow_and_update().clone() {
                            let seq = slot.publish(frame);
                            trace!(seq, "frame published");
                        }
                    }
                    Ok(false) => {}
                    // capture loop is gone
                    Err(_) => break,
                }
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rover_hal::sim::{CameraProbe, SimCamera};

    fn pipeline(config: VideoConfig) -> (VideoPipeline, CameraProbe) {
        let probe = CameraProbe::default();
        let camera = SimCamera::new("sim", probe.clone()).with_frame_interval(Duration::from_millis(5));
        (VideoPipeline::init(camera, config).unwrap(), probe)
    }

    fn fast() -> VideoConfig {
        VideoConfig {
            fps: 30,
            ..VideoConfig::default()
        }
    }

    async fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {what}");
    }

    #[test]
    fn config_defaults() {
        let cfg = VideoConfig::default();
        assert_eq!((cfg.width, cfg.height), (640, 480));
        assert_eq!(cfg.pixel_format, PixelFormat::Mjpeg);
        assert_eq!(cfg.fps, 2);
    }

    #[tokio::test]
    async fn init_negotiates_format() {
        let (video, probe) = pipeline(VideoConfig::default());
        assert_eq!(probe.formats(), vec![(PixelFormat::Mjpeg, 640, 480)]);

        let status = video.status().await;
        assert!(!status.streaming);
        assert_eq!((status.width, status.height), (640, 480));
    }

    #[test]
    fn init_rejects_bad_fps() {
        let camera = SimCamera::new("sim", CameraProbe::default());
        let err = VideoPipeline::init(
            camera,
            VideoConfig {
                fps: 0,
                ..VideoConfig::default()
            },
        )
        .err()
        .unwrap();
        assert_eq!(err.code(), "INVALID_RANGE");
    }

    #[tokio::test]
    async fn streaming_publishes_increasing_frames() {
        let (video, probe) = pipeline(fast());
        let mut reader = video.frames().subscribe();
        video.start_stream().await.unwrap();

        let mut last = 0;
        for _ in 0..3 {
            let frame = tokio::time::timeout(Duration::from_secs(2), reader.next())
                .await
                .unwrap()
                .unwrap();
            assert!(frame.seq > last);
            assert_eq!(&frame.jpeg[..2], &[0xFF, 0xD8]);
            last = frame.seq;
        }

        video.stop_stream().await.unwrap();
        assert!(!video.status().await.streaming);
        assert_eq!(probe.starts(), 1);
        assert_eq!(probe.stops(), 1);
    }

    #[tokio::test]
    async fn publishes_never_outrun_captures() {
        let probe = CameraProbe::default();
        let camera =
            SimCamera::new("sim", probe.clone()).with_frame_interval(Duration::from_millis(60));
        let video = VideoPipeline::init(camera, fast()).unwrap();

        video.start_stream().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        video.stop_stream().await.unwrap();

        let published = video.frames().latest().map_or(0, |f| f.seq);
        assert!(published >= 1);
        assert!(published <= probe.frames_read());
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let (video, probe) = pipeline(fast());
        video.start_stream().await.unwrap();
        video.start_stream().await.unwrap();
        assert_eq!(probe.starts(), 1);

        video.stop_stream().await.unwrap();
        video.stop_stream().await.unwrap();
        assert_eq!(probe.stops(), 1);
    }

    #[tokio::test]
    async fn set_format_refused_while_streaming() {
        let (video, probe) = pipeline(fast());
        video.start_stream().await.unwrap();
        let err = video
            .set_format(PixelFormat::Yuyv422, 320, 240)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DEVICE_ERROR");

        video.stop_stream().await.unwrap();
        video.set_format(PixelFormat::Yuyv422, 320, 240).await.unwrap();
        assert_eq!(probe.formats().len(), 2);
        assert_eq!(video.status().await.pixel_format, PixelFormat::Yuyv422);
    }

    #[tokio::test]
    async fn set_fps_bounds() {
        let (video, _) = pipeline(fast());
        video.set_fps(10).await.unwrap();
        assert_eq!(video.status().await.fps, 10);
        assert!(video.set_fps(0).await.is_err());
        assert!(video.set_fps(31).await.is_err());
        assert_eq!(video.status().await.fps, 10);
    }

    #[tokio::test]
    async fn reconfigure_restarts_only_on_change() {
        let (video, probe) = pipeline(fast());
        video.start_stream().await.unwrap();

        video
            .reconfigure(30, Resolution::from_mode(1).unwrap())
            .await
            .unwrap();
        assert_eq!(probe.starts(), 1);
        assert_eq!(probe.stops(), 0);

        video
            .reconfigure(5, Resolution::from_mode(0).unwrap())
            .await
            .unwrap();
        assert_eq!(probe.stops(), 1);
        assert_eq!(probe.starts(), 2);
        assert_eq!(probe.formats().last(), Some(&(PixelFormat::Mjpeg, 320, 240)));

        let status = video.status().await;
        assert!(status.streaming);
        assert_eq!(status.fps, 5);
        assert_eq!((status.width, status.height), (320, 240));
    }

    #[tokio::test]
    async fn reconfigure_compares_against_running_rate() {
        let (video, probe) = pipeline(VideoConfig::default());
        video.start_stream().await.unwrap();

        // Stored for the next start; the running stream keeps 2 fps.
        video.set_fps(20).await.unwrap();
        video
            .reconfigure(20, Resolution::from_mode(1).unwrap())
            .await
            .unwrap();
        assert_eq!(probe.stops(), 1);
        assert_eq!(probe.starts(), 2);
        // Same size, so no renegotiation.
        assert_eq!(probe.formats().len(), 1);

        let before = video.frames().latest().map_or(0, |f| f.seq);
        tokio::time::sleep(Duration::from_millis(500)).await;
        let after = video.frames().latest().map_or(0, |f| f.seq);
        assert!(after - before >= 4, "only {} frames in 500ms", after - before);

        video.stop_stream().await.unwrap();
    }

    #[tokio::test]
    async fn dropping_pipeline_ends_capture_loop() {
        let (video, probe) = pipeline(fast());
        video.start_stream().await.unwrap();
        eventually("first capture", || probe.frames_read() > 0).await;
        drop(video);

        // Let an in-flight read finish, then the count must stay put.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let settled = probe.frames_read();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(probe.frames_read(), settled);
    }

    #[tokio::test]
    async fn refused_start_leaves_stream_stopped() {
        let (video, probe) = pipeline(fast());
        probe.reject_start(true);

        let err = video.start_stream().await.unwrap_err();
        assert_eq!(err.code(), "DEVICE_ERROR");
        assert!(!video.status().await.streaming);
        assert_eq!(probe.starts(), 0);

        probe.reject_start(false);
        video.start_stream().await.unwrap();
        assert!(video.status().await.streaming);
        video.stop_stream().await.unwrap();
    }

    #[test]
    fn init_fails_when_camera_rejects_format() {
        let probe = CameraProbe::default();
        probe.reject_format(true);
        let err = VideoPipeline::init(SimCamera::new("sim", probe.clone()), VideoConfig::default())
            .err()
            .unwrap();
        assert_eq!(err.code(), "DEVICE_ERROR");
        assert!(probe.formats().is_empty());
    }

    #[tokio::test]
    async fn reconfigure_starts_idle_stream() {
        let (video, probe) = pipeline(fast());
        video
            .reconfigure(30, Resolution::from_mode(1).unwrap())
            .await
            .unwrap();
        assert!(video.status().await.streaming);
        assert_eq!(probe.formats().len(), 1);
    }

    #[tokio::test]
    async fn transient_read_error_keeps_streaming() {
        let (video, probe) = pipeline(fast());
        probe.fail_next_read(RoverError::TransientIo {
            component: "sim".into(),
            details: "short read".into(),
        });
        let mut reader = video.frames().subscribe();
        video.start_stream().await.unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(2), reader.next())
            .await
            .unwrap();
        assert!(frame.is_some());
        assert!(video.status().await.streaming);
    }

    #[tokio::test]
    async fn fatal_read_error_reaps_stream() {
        let (video, probe) = pipeline(fast());
        probe.fail_next_read(RoverError::FatalIo {
            component: "sim".into(),
            details: "unplugged".into(),
        });
        video.start_stream().await.unwrap();

        for _ in 0..100 {
            if !video.status().await.streaming {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!video.status().await.streaming);
        eventually("camera stop", || probe.stops() == 1).await;

        video.start_stream().await.unwrap();
        assert_eq!(probe.starts(), 2);
    }

    #[tokio::test]
    async fn shutdown_closes_camera_and_is_terminal() {
        let (video, probe) = pipeline(fast());
        video.start_stream().await.unwrap();
        video.shutdown().await.unwrap();

        assert_eq!(probe.closes(), 1);
        assert!(!video.status().await.streaming);
        assert_eq!(
            video.start_stream().await.unwrap_err(),
            RoverError::NotInitialized("video".to_string())
        );
    }
}
