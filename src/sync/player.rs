//! Narration audio players driven by the sync loop

use crate::content::SegmentId;
use crate::sync::clock::Clock;
use crate::timing::TimingIndex;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;

/// Plays one segment's narration at a time
///
/// Players are created on the sync loop's thread and never leave it, so
/// implementations do not need to be `Send`.
pub trait NarrationPlayer {
    /// Load a segment, paused at position 0
    fn load(&mut self, segment: &SegmentId) -> Result<()>;

    fn play(&mut self);

    fn pause(&mut self);

    /// Move to a position in seconds within the loaded segment
    fn seek(&mut self, position: f64) -> Result<()>;

    /// Current position in seconds within the loaded segment
    fn position(&self) -> f64;

    /// The loaded segment has played to its end
    fn is_finished(&self) -> bool;

    /// Stop and unload
    fn stop(&mut self);
}

/// Silent player that advances with the clock
///
/// Used when no output device is wanted. A segment lasts until its last
/// timed word plus `tail`; until its timing table is ready its length is
/// unknown and it keeps playing.
pub struct ClockPlayer {
    clock: Arc<dyn Clock>,
    timing: TimingIndex,
    tail: Duration,
    segment: Option<SegmentId>,
    /// Position when playback last started or was paused/seeked
    base: f64,
    /// Clock reading when playback started, if playing
    started_at: Option<Duration>,
}

impl ClockPlayer {
    pub fn new(clock: Arc<dyn Clock>, timing: TimingIndex, tail: Duration) -> Self {
        Self {
            clock,
            timing,
            tail,
            segment: None,
            base: 0.0,
            started_at: None,
        }
    }

    /// `None` while nothing is loaded or the segment's timing is not ready
    fn duration(&self) -> Option<f64> {
        let segment = self.segment.as_ref()?;
        let table = self.timing.table(segment)?;
        let last_start = table.entries().last().map_or(0.0, |w| w.start);
        Some(last_start + self.tail.as_secs_f64())
    }
}

impl NarrationPlayer for ClockPlayer {
    fn load(&mut self, segment: &SegmentId) -> Result<()> {
        self.segment = Some(segment.clone());
        self.base = 0.0;
        self.started_at = None;
        Ok(())
    }

    fn play(&mut self) {
        if self.segment.is_some() && self.started_at.is_none() {
            self.started_at = Some(self.clock.now());
        }
    }

    fn pause(&mut self) {
        self.base = self.position();
        self.started_at = None;
    }

    fn seek(&mut self, position: f64) -> Result<()> {
        self.base = position.max(0.0);
        if self.started_at.is_some() {
            self.started_at = Some(self.clock.now());
        }
        Ok(())
    }

    fn position(&self) -> f64 {
        let elapsed = self
            .started_at
            .map(|at| self.clock.now().saturating_sub(at).as_secs_f64())
            .unwrap_or(0.0);
        let position = self.base + elapsed;
        match self.duration() {
            Some(duration) => position.min(duration),
            None if self.segment.is_some() => position,
            None => 0.0,
        }
    }

    fn is_finished(&self) -> bool {
        match self.duration() {
            Some(duration) => self.position() >= duration,
            None => false,
        }
    }

    fn stop(&mut self) {
        self.segment = None;
        self.base = 0.0;
        self.started_at = None;
    }
}

#[cfg(feature = "audio-io")]
pub use self::rodio_player::RodioNarrationPlayer;

#[cfg(feature = "audio-io")]
mod rodio_player {
    use super::NarrationPlayer;
    use crate::content::SegmentId;
    use crate::sync::config::SyncConfig;
    use crate::{ReadalongError, Result};
    use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
    use std::fs::File;
    use std::io::BufReader;
    use std::path::PathBuf;
    use std::time::Duration;
    use tracing::{debug, info};

    /// Plays `{audio_dir}/{segment}.{ext}` through the default output device
    pub struct RodioNarrationPlayer {
        _stream: OutputStream,
        handle: OutputStreamHandle,
        sink: Option<Sink>,
        audio_dir: PathBuf,
        extension: String,
    }

    impl RodioNarrationPlayer {
        pub fn new(config: &SyncConfig) -> Result<Self> {
            let (stream, handle) = OutputStream::try_default().map_err(|e| {
                ReadalongError::AudioDeviceError(format!("Failed to open output stream: {}", e))
            })?;
            info!("Narration output ready");

            Ok(Self {
                _stream: stream,
                handle,
                sink: None,
                audio_dir: config.audio_dir.clone(),
                extension: config.audio_extension.clone(),
            })
        }

        pub fn path_for(&self, segment: &SegmentId) -> PathBuf {
            self.audio_dir
                .join(format!("{}.{}", segment, self.extension))
        }
    }

    impl NarrationPlayer for RodioNarrationPlayer {
        fn load(&mut self, segment: &SegmentId) -> Result<()> {
            let path = self.path_for(segment);
            let file = File::open(&path).map_err(|e| {
                ReadalongError::ResourceUnavailable(format!("{}: {}", path.display(), e))
            })?;
            let source = Decoder::new(BufReader::new(file)).map_err(|e| {
                ReadalongError::PlaybackError(format!("{}: {}", path.display(), e))
            })?;
            let sink = Sink::try_new(&self.handle)
                .map_err(|e| ReadalongError::PlaybackError(format!("Failed to create sink: {}", e)))?;
            sink.pause();
            sink.append(source);

            if let Some(previous) = self.sink.replace(sink) {
                previous.stop();
            }
            debug!("Loaded narration {}", path.display());
            Ok(())
        }

        fn play(&mut self) {
            if let Some(sink) = &self.sink {
                sink.play();
            }
        }

        fn pause(&mut self) {
            if let Some(sink) = &self.sink {
                sink.pause();
            }
        }

        fn seek(&mut self, position: f64) -> Result<()> {
            let Some(sink) = &self.sink else {
                return Ok(());
            };
            sink.try_seek(Duration::from_secs_f64(position.max(0.0)))
                .map_err(|e| ReadalongError::PlaybackError(format!("Seek failed: {}", e)))
        }

        fn position(&self) -> f64 {
            self.sink
                .as_ref()
                .map(|s| s.get_pos().as_secs_f64())
                .unwrap_or(0.0)
        }

        fn is_finished(&self) -> bool {
            self.sink.as_ref().map_or(false, |s| s.empty())
        }

        fn stop(&mut self) {
            if let Some(sink) = self.sink.take() {
                sink.stop();
            }
        }
    }
}
