//! Keeps the highlighted word in step with narration playback

pub mod clock;
pub mod config;
pub mod cursor;
pub mod engine;
pub mod player;
pub mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SyncConfig;
pub use cursor::PlaybackCursor;
pub use engine::{SeekTarget, SegmentEnd, SyncUpdate, WordSyncEngine};
#[cfg(feature = "audio-io")]
pub use player::RodioNarrationPlayer;
pub use player::{ClockPlayer, NarrationPlayer};
pub use worker::{SyncCommand, SyncEvent, SyncLoop};
