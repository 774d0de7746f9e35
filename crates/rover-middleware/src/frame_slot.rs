//! [`FrameSlot`] – the single most recent encoded video frame.
//!
//! Publishing overwrites; readers never see a queue. Each publication gets
//! the next sequence number, so a reader can tell a new frame from the one
//! it already sent.

use std::sync::Arc;

use tokio::sync::watch;

/// One published JPEG frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub seq: u64,
    pub jpeg: Arc<[u8]>,
}

/// Last-write-wins frame slot. Clone it cheaply; all clones share the slot.
#[derive(Clone)]
pub struct FrameSlot {
    tx: Arc<watch::Sender<Option<Frame>>>,
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSlot {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the current frame. Returns the new sequence number.
    pub fn publish(&self, jpeg: impl Into<Arc<[u8]>>) -> u64 {
        let jpeg = jpeg.into();
        let mut seq = 0;
        self.tx.send_modify(|slot| {
            seq = slot.as_ref().map_or(1, |f| f.seq + 1);
            *slot = Some(Frame { seq, jpeg });
        });
        seq
    }

    /// The current frame, if anything was published yet. Never blocks.
    pub fn latest(&self) -> Option<Frame> {
        self.tx.borrow().clone()
    }

    /// A reader positioned *before* the current frame: its first
    /// [`FrameReader::next`] returns the current frame if there is one.
    pub fn subscribe(&self) -> FrameReader {
        let mut rx = self.tx.subscribe();
        if rx.borrow().is_some() {
            rx.mark_changed();
        }
        FrameReader { rx }
    }
}

/// Follows a [`FrameSlot`], skipping any frames published while it was busy.
pub struct FrameReader {
    rx: watch::Receiver<Option<Frame>>,
}

impl FrameReader {
    /// Wait for a frame newer than the last one returned.
    ///
    /// Returns `None` once the slot has been dropped.
    pub async fn next(&mut self) -> Option<Frame> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(frame) = self.rx.borrow_and_update().clone() {
                return Some(frame);
            }
        }
    }
}
