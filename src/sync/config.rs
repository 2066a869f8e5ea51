//! Configuration for narration playback and word sync

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the word sync engine and its frame loop
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How far ahead of the reported playback position words are resolved,
    /// in seconds. Compensates for output latency.
    pub lookahead_secs: f64,

    /// No auto-scroll for this long after the listener scrolls by hand
    pub manual_scroll_grace_ms: u64,

    /// Minimum spacing between auto-scroll requests
    pub auto_scroll_cooldown_ms: u64,

    /// Silence between the end of one segment and the start of the next
    pub section_pause_ms: u64,

    /// Frame interval of the sync loop while playing
    pub frame_interval_ms: u64,

    /// Directory holding one narration file per segment
    pub audio_dir: PathBuf,

    /// File extension of narration files
    pub audio_extension: String,

    /// Maximum queued commands/events
    pub queue_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lookahead_secs: 0.15,
            manual_scroll_grace_ms: 5000,
            auto_scroll_cooldown_ms: 500,
            section_pause_ms: 600,
            frame_interval_ms: 16,
            audio_dir: PathBuf::from("audio"),
            audio_extension: "mp3".to_string(),
            queue_size: 64,
        }
    }
}

impl SyncConfig {
    pub fn manual_scroll_grace(&self) -> Duration {
        Duration::from_millis(self.manual_scroll_grace_ms)
    }

    pub fn auto_scroll_cooldown(&self) -> Duration {
        Duration::from_millis(self.auto_scroll_cooldown_ms)
    }

    pub fn section_pause(&self) -> Duration {
        Duration::from_millis(self.section_pause_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    /// Set the lookahead in seconds
    pub fn with_lookahead(mut self, secs: f64) -> Self {
        self.lookahead_secs = secs;
        self
    }

    /// Set the narration audio directory
    pub fn with_audio_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.audio_dir = dir.into();
        self
    }

    /// Set the frame interval
    pub fn with_frame_interval_ms(mut self, ms: u64) -> Self {
        self.frame_interval_ms = ms;
        self
    }

    /// Set the pause between segments
    pub fn with_section_pause_ms(mut self, ms: u64) -> Self {
        self.section_pause_ms = ms;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.lookahead_secs.is_finite() || self.lookahead_secs < 0.0 {
            return Err(format!("Invalid lookahead: {}", self.lookahead_secs));
        }
        if self.frame_interval_ms == 0 {
            return Err("Frame interval must be greater than 0".to_string());
        }
        if self.queue_size == 0 {
            return Err("Queue size must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.manual_scroll_grace(), Duration::from_secs(5));
        assert_eq!(config.auto_scroll_cooldown(), Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_lookahead_rejected() {
        assert!(SyncConfig::default().with_lookahead(-0.1).validate().is_err());
    }
}
