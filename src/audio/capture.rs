//! Microphone abstraction used by the conversation session

use crate::{ReadalongError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Frames queued between the capture callback and the session
pub const FRAME_QUEUE: usize = 64;

/// A capture device producing fixed-size mono frames at the wire rate
pub trait MicrophoneSource: Send {
    /// Start capturing
    ///
    /// Frames are only delivered while `gate` is set; the capture side drops
    /// them otherwise. Access being refused is `PermissionDenied`.
    fn open(&mut self, gate: Arc<AtomicBool>) -> Result<mpsc::Receiver<Vec<f32>>>;

    /// Stop capturing and release the device
    fn close(&mut self);
}

type FeedSlot = Arc<Mutex<Option<(mpsc::Sender<Vec<f32>>, Arc<AtomicBool>)>>>;

/// Microphone fed by hand, for headless use and tests
pub struct ChannelMicrophone {
    slot: FeedSlot,
    deny: bool,
}

/// Pushes frames into an open `ChannelMicrophone`
#[derive(Clone)]
pub struct MicFeed {
    slot: FeedSlot,
}

impl ChannelMicrophone {
    pub fn new() -> (Self, MicFeed) {
        let slot: FeedSlot = Arc::new(Mutex::new(None));
        (
            Self {
                slot: Arc::clone(&slot),
                deny: false,
            },
            MicFeed { slot },
        )
    }

    /// A microphone the user refused access to
    pub fn denied() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            deny: true,
        }
    }
}

impl MicrophoneSource for ChannelMicrophone {
    fn open(&mut self, gate: Arc<AtomicBool>) -> Result<mpsc::Receiver<Vec<f32>>> {
        if self.deny {
            return Err(ReadalongError::PermissionDenied(
                "Microphone access was refused".into(),
            ));
        }
        let (tx, rx) = mpsc::channel(FRAME_QUEUE);
        *self.slot.lock() = Some((tx, gate));
        Ok(rx)
    }

    fn close(&mut self) {
        if self.slot.lock().take().is_some() {
            debug!("Channel microphone closed");
        }
    }
}

impl MicFeed {
    /// Deliver a frame the way a capture callback would. Returns whether it
    /// was queued.
    pub fn push(&self, frame: Vec<f32>) -> bool {
        let slot = self.slot.lock();
        match slot.as_ref() {
            Some((tx, gate)) if gate.load(Ordering::SeqCst) => tx.try_send(frame).is_ok(),
            _ => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.slot.lock().is_some()
    }
}
