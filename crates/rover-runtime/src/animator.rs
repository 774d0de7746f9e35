//! [`DisplayAnimator`] – cycles a set of bitmaps on the status display.
//!
//! One task owns the display. It reacts to three things:
//!
//! | Event | Effect |
//! |---|---|
//! | load request | replace the frame set, rewind to frame 0, restart the ticker at the new interval, then acknowledge |
//! | tick | draw the current frame and advance (wrapping) |
//! | shutdown | clear the panel, power it off, exit |
//!
//! Drawing holds the shared display-bus lock for exactly clear + pixels +
//! flush. A failed flush clears and resets the panel; the next tick tries
//! again.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use image::RgbaImage;
use rover_hal::BitmapDisplay;
use rover_middleware::BlockingDevice;
use rover_types::RoverError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

// ────────────────────────────────────────────────────────────────────────────
// Bitmaps
// ────────────────────────────────────────────────────────────────────────────

/// A monochrome image: each pixel is on or off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl Bitmap {
    /// Every pixel with non-zero alpha is on.
    pub fn from_rgba(img: &RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        let bits = img.pixels().map(|p| p.0[3] > 0).collect();
        Self {
            width,
            height,
            bits,
        }
    }

    /// Row-major bits; `bits.len()` must equal `width * height`.
    pub fn from_bits(width: u32, height: u32, bits: Vec<bool>) -> Result<Self, RoverError> {
        if bits.len() != (width as usize) * (height as usize) {
            return Err(RoverError::out_of_range("bitmap length", bits.len() as i64));
        }
        Ok(Self {
            width,
            height,
            bits,
        })
    }

    /// Decode an image file (PNG) and threshold it on alpha.
    pub fn load(path: &Path) -> Result<Self, RoverError> {
        let img = image::open(path)
            .map_err(|e| RoverError::device("display", format!("{}: {e}", path.display())))?
            .into_rgba8();
        Ok(Self::from_rgba(&img))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_on(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.bits[(y * self.width + x) as usize]
    }
}

/// Load each path with [`Bitmap::load`], failing on the first bad file.
pub fn load_bitmaps<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Bitmap>, RoverError> {
    paths.iter().map(|p| Bitmap::load(p.as_ref())).collect()
}

/// Frames shown in order, one per interval.
#[derive(Debug, Clone)]
pub struct AnimationSet {
    frames: Arc<[Bitmap]>,
    interval: Duration,
}

impl AnimationSet {
    /// # Errors
    ///
    /// [`RoverError::InvalidRange`] for an empty frame list or a zero
    /// interval.
    pub fn new(frames: Vec<Bitmap>, interval_ms: u64) -> Result<Self, RoverError> {
        if frames.is_empty() {
            return Err(RoverError::out_of_range("animation frames", 0));
        }
        if interval_ms == 0 {
            return Err(RoverError::out_of_range("animation interval ms", 0));
        }
        Ok(Self {
            frames: frames.into(),
            interval: Duration::from_millis(interval_ms),
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Animator
// ────────────────────────────────────────────────────────────────────────────

enum Request {
    Load(AnimationSet, oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the animation task.
pub struct DisplayAnimator {
    requests: mpsc::Sender<Request>,
}

impl DisplayAnimator {
    /// Start the animation task. `bus` is shared with every other device on
    /// the same display bus.
    pub fn spawn(display: Box<dyn BitmapDisplay>, bus: Arc<Mutex<()>>) -> Self {
        let (requests, rx) = mpsc::channel(8);
        let display = BlockingDevice::new("display", display);
        tokio::spawn(animation_loop(display, bus, rx));
        Self { requests }
    }

    /// Replace the running animation. Returns once the new set is live.
    ///
    /// # Errors
    ///
    /// [`RoverError::Channel`] if the animator has been shut down.
    pub async fn load_animation(&self, set: AnimationSet) -> Result<(), RoverError> {
        let (ack, done) = oneshot::channel();
        self.requests
            .send(Request::Load(set, ack))
            .await
            .map_err(|_| RoverError::Channel("display animator stopped".to_string()))?;
        done.await
            .map_err(|_| RoverError::Channel("display animator stopped".to_string()))
    }

    /// Blank and power off the display, then end the task. Calling it again
    /// is a no-op.
    pub async fn shutdown(&self) -> Result<(), RoverError> {
        let (ack, done) = oneshot::channel();
        if self.requests.send(Request::Shutdown(ack)).await.is_err() {
            return Ok(());
        }
        let _ = done.await;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        !self.requests.is_closed()
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn animation_loop(
    display: BlockingDevice<dyn BitmapDisplay>,
    bus: Arc<Mutex<()>>,
    mut requests: mpsc::Receiver<Request>,
) {
    let mut set: Option<AnimationSet> = None;
    let mut cursor = 0usize;
    let mut ticker: Option<Interval> = None;

    loop {
        tokio::select! {
            req = requests.recv() => match req {
                Some(Request::Load(new_set, ack)) => {
                    let mut interval = tokio::time::interval(new_set.interval);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    info!(frames = new_set.len(), interval_ms = new_set.interval.as_millis() as u64, "animation loaded");
                    ticker = Some(interval);
                    set = Some(new_set);
                    cursor = 0;
                    let _ = ack.send(());
                }
                Some(Request::Shutdown(ack)) => {
                    power_down(&display, &bus).await;
                    requests.close();
                    let _ = ack.send(());
                    break;
                }
                None => {
                    power_down(&display, &bus).await;
                    break;
                }
            },
            _ = next_tick(&mut ticker) => {
                if let Some(set) = &set {
                    let frames = Arc::clone(&set.frames);
                    let index = cursor;
                    cursor = (cursor + 1) % frames.len();
                    if let Err(err) = draw(&display, &bus, frames, index).await {
                        warn!(error = %err, "display draw failed");
                    }
                }
            }
        }
    }
    info!("display animator stopped");
}

async fn draw(
    display: &BlockingDevice<dyn BitmapDisplay>,
    bus: &Arc<Mutex<()>>,
    frames: Arc<[Bitmap]>,
    index: usize,
) -> Result<(), RoverError> {
    let bus = Arc::clone(bus);
    display
        .call(move |panel| {
            let frame = &frames[index];
            let _bus = bus.lock().unwrap_or_else(PoisonError::into_inner);
            panel.clear();
            for y in 0..panel.height().min(frame.height()) {
                for x in 0..panel.width().min(frame.width()) {
                    if frame.is_on(x, y) {
                        panel.set_pixel(x, y, true);
                    }
                }
            }
            if let Err(err) = panel.flush() {
                panel.clear();
                panel.reset()?;
                return Err(err);
            }
            Ok(())
        })
        .await?;
    debug!(index, "frame drawn");
    Ok(())
}

async fn power_down(display: &BlockingDevice<dyn BitmapDisplay>, bus: &Arc<Mutex<()>>) {
    let bus = Arc::clone(bus);
    let res = display
        .call(move |panel| {
            let _bus = bus.lock().unwrap_or_else(PoisonError::into_inner);
            panel.clear();
            panel.flush()?;
            panel.power_off()
        })
        .await;
    if let Err(err) = res {
        warn!(error = %err, "display power-off failed");
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
