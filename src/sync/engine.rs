//! Maps narration playback time to the globally highlighted word
//!
//! The engine is pure: it never touches audio devices or threads. The frame
//! loop in `worker` feeds it positions and clock readings and applies the
//! seek targets it returns to the narration player.

use crate::content::SegmentId;
use crate::sync::config::SyncConfig;
use crate::sync::cursor::PlaybackCursor;
use crate::timing::{TimingIndex, WordIndex};
use crate::{ReadalongError, Result};
use std::time::Duration;
use tracing::debug;

/// Emitted when the highlighted word changes
#[derive(Debug, Clone, PartialEq)]
pub struct SyncUpdate {
    pub global: usize,
    pub segment: usize,
    pub local: usize,
    /// Progress through the article, 0..=100
    pub progress: f32,
    /// The host should scroll the word into view
    pub auto_scroll: bool,
}

/// Where the narration player has to go after a seek
#[derive(Debug, Clone, PartialEq)]
pub struct SeekTarget {
    pub segment: usize,
    /// Position in seconds within the segment audio
    pub position: f64,
}

/// What happens when a segment's audio runs out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentEnd {
    /// Continue with this segment after the section pause
    Advance(usize),
    /// That was the last segment
    Finished,
}

pub struct WordSyncEngine {
    segments: Vec<SegmentId>,
    words: WordIndex,
    timing: TimingIndex,
    lookahead: f64,
    manual_scroll_grace: Duration,
    auto_scroll_cooldown: Duration,
    cursor: PlaybackCursor,
}

impl WordSyncEngine {
    pub fn new(
        segments: Vec<SegmentId>,
        word_counts: &[usize],
        timing: TimingIndex,
        config: &SyncConfig,
    ) -> Result<Self> {
        if segments.len() != word_counts.len() {
            return Err(ReadalongError::ConfigError(format!(
                "{} segments but {} word counts",
                segments.len(),
                word_counts.len()
            )));
        }
        let words = WordIndex::from_counts(word_counts)?;

        Ok(Self {
            segments,
            words,
            timing,
            lookahead: config.lookahead_secs,
            manual_scroll_grace: config.manual_scroll_grace(),
            auto_scroll_cooldown: config.auto_scroll_cooldown(),
            cursor: PlaybackCursor::default(),
        })
    }

    pub fn cursor(&self) -> &PlaybackCursor {
        &self.cursor
    }

    pub fn words(&self) -> &WordIndex {
        &self.words
    }

    pub fn timing(&self) -> &TimingIndex {
        &self.timing
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn current_segment(&self) -> usize {
        self.cursor.segment
    }

    pub fn segment_id(&self, segment: usize) -> Option<&SegmentId> {
        self.segments.get(segment)
    }

    pub fn current_segment_id(&self) -> &SegmentId {
        &self.segments[self.cursor.segment]
    }

    pub fn current_global(&self) -> Option<usize> {
        self.cursor.global
    }

    pub fn is_finished(&self) -> bool {
        self.cursor.finished
    }

    pub fn progress(&self) -> f32 {
        if self.cursor.finished {
            return 100.0;
        }
        self.cursor
            .global
            .map(|g| self.words.progress_percent(g))
            .unwrap_or(0.0)
    }

    /// Resolve the active word for a playback position
    ///
    /// Returns an update only when the global word index changed.
    pub fn on_frame(&mut self, position: f64, now: Duration) -> Option<SyncUpdate> {
        let segment = self.cursor.segment;
        let table = self.timing.table(&self.segments[segment])?;
        let current = position + self.lookahead;

        let found = table.lookup_from(self.cursor.hint, current)?;
        self.cursor.hint = Some(found);

        // Alignment can yield more tokens than the text has words
        let count = self.words.word_count(segment);
        if count == 0 {
            return None;
        }
        let local = found.min(count - 1);
        let global = self.words.to_global(segment, local)?;

        if self.cursor.global == Some(global) {
            return None;
        }
        self.cursor.global = Some(global);

        let auto_scroll = self.take_auto_scroll(now);
        Some(SyncUpdate {
            global,
            segment,
            local,
            progress: self.words.progress_percent(global),
            auto_scroll,
        })
    }

    fn take_auto_scroll(&mut self, now: Duration) -> bool {
        let recently_scrolled = self
            .cursor
            .last_manual_scroll
            .map_or(false, |at| now.saturating_sub(at) < self.manual_scroll_grace);
        let cooling_down = self.cursor.auto_scroll_until.map_or(false, |until| now < until);

        if recently_scrolled || cooling_down {
            return false;
        }
        self.cursor.auto_scroll_until = Some(now + self.auto_scroll_cooldown);
        true
    }

    /// Record a scroll made by the listener
    ///
    /// Scroll notifications inside the auto-scroll window come from our own
    /// scroll request and are ignored. Returns whether it was recorded.
    pub fn note_manual_scroll(&mut self, now: Duration) -> bool {
        if self.cursor.auto_scroll_until.map_or(false, |until| now < until) {
            return false;
        }
        self.cursor.last_manual_scroll = Some(now);
        true
    }

    pub fn on_segment_ended(&mut self) -> SegmentEnd {
        let next = self.cursor.segment + 1;
        if next < self.segments.len() {
            debug!("Segment {} ended, advancing to {}", self.cursor.segment, next);
            self.cursor.segment = next;
            self.cursor.hint = None;
            SegmentEnd::Advance(next)
        } else {
            debug!("Last segment ended");
            self.cursor.hint = None;
            self.cursor.global = Some(self.words.total_words().saturating_sub(1));
            self.cursor.finished = true;
            SegmentEnd::Finished
        }
    }

    pub fn seek_to_percentage(&mut self, percent: f64) -> Option<SeekTarget> {
        let global = self.words.global_at_fraction(percent / 100.0)?;
        self.seek_to_word(global)
    }

    pub fn seek_to_word(&mut self, global: usize) -> Option<SeekTarget> {
        let location = self.words.resolve(global)?;
        let position = self
            .timing
            .table(&self.segments[location.segment])
            .and_then(|table| table.start_of(location.local))
            .unwrap_or(0.0);

        self.cursor.segment = location.segment;
        self.cursor.clear_resolution();
        debug!(
            "Seek to word {} (segment {}, {:.2}s)",
            global, location.segment, position
        );

        Some(SeekTarget {
            segment: location.segment,
            position,
        })
    }

    pub fn jump_to_segment(&mut self, segment: usize) -> Option<SeekTarget> {
        if segment >= self.segments.len() {
            return None;
        }
        self.cursor.segment = segment;
        self.cursor.clear_resolution();
        Some(SeekTarget {
            segment,
            position: 0.0,
        })
    }

    /// Back to the first word of the first segment
    pub fn reset(&mut self) -> SeekTarget {
        self.cursor = PlaybackCursor::default();
        SeekTarget {
            segment: 0,
            position: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::{TimingSource, TimingTable, WordTiming};
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::Arc;

    struct NoSource;

    impl TimingSource for NoSource {
        fn fetch<'a>(
            &'a self,
            _segment: &'a SegmentId,
        ) -> BoxFuture<'a, Result<Vec<WordTiming>>> {
            async { Err(ReadalongError::ResourceUnavailable("offline".into())) }.boxed()
        }
    }

    fn table(starts: &[f64]) -> TimingTable {
        TimingTable::new(
            starts
                .iter()
                .enumerate()
                .map(|(i, &s)| WordTiming::new(format!("w{}", i), s))
                .collect(),
        )
        .unwrap()
    }

    /// Two segments: A has 3 words, B has 2
    fn engine(lookahead: f64) -> WordSyncEngine {
        let timing = TimingIndex::new(Arc::new(NoSource));
        timing.insert("a".into(), table(&[0.0, 0.5, 1.2]));
        timing.insert("b".into(), table(&[0.2, 0.9]));
        let config = SyncConfig::default().with_lookahead(lookahead);
        WordSyncEngine::new(vec!["a".into(), "b".into()], &[3, 2], timing, &config).unwrap()
    }

    const T0: Duration = Duration::from_secs(100);

    #[test]
    fn test_emits_only_on_change() {
        let mut engine = engine(0.0);
        let first = engine.on_frame(0.6, T0).unwrap();
        assert_eq!((first.global, first.segment, first.local), (1, 0, 1));
        assert!(engine.on_frame(0.7, T0).is_none());
        assert!(engine.on_frame(1.1, T0).is_none());
        assert_eq!(engine.on_frame(1.5, T0).unwrap().global, 2);
    }

    #[test]
    fn test_lookahead_is_applied() {
        let mut engine = engine(0.15);
        assert_eq!(engine.on_frame(0.4, T0).unwrap().local, 1);
    }

    #[test]
    fn test_before_first_word_nothing() {
        let mut engine = engine(0.0);
        engine.jump_to_segment(1);
        assert!(engine.on_frame(0.1, T0).is_none());
        assert_eq!(engine.on_frame(0.25, T0).unwrap().global, 3);
    }

    #[test]
    fn test_progress_percentage() {
        let mut engine = engine(0.0);
        engine.jump_to_segment(1);
        let update = engine.on_frame(1.0, T0).unwrap();
        assert_eq!(update.global, 4);
        assert!((update.progress - 80.0).abs() < 1e-4);
    }

    #[test]
    fn test_missing_table_resolves_nothing() {
        let timing = TimingIndex::new(Arc::new(NoSource));
        let mut engine = WordSyncEngine::new(
            vec!["a".into()],
            &[3],
            timing.clone(),
            &SyncConfig::default(),
        )
        .unwrap();
        assert!(engine.on_frame(1.0, T0).is_none());

        timing.insert("a".into(), TimingTable::empty());
        assert!(engine.on_frame(1.0, T0).is_none());
    }

    #[test]
    fn test_extra_aligned_words_clamp_to_last() {
        let timing = TimingIndex::new(Arc::new(NoSource));
        timing.insert("a".into(), table(&[0.0, 0.1, 0.2, 0.3]));
        let mut engine =
            WordSyncEngine::new(vec!["a".into()], &[2], timing, &SyncConfig::default().with_lookahead(0.0))
                .unwrap();
        assert_eq!(engine.on_frame(0.35, T0).unwrap().global, 1);
    }

    #[test]
    fn test_auto_scroll_throttled() {
        let mut engine = engine(0.0);
        assert!(engine.on_frame(0.0, T0).unwrap().auto_scroll);
        // Inside the 500ms cooldown
        let next = engine.on_frame(0.6, T0 + Duration::from_millis(200)).unwrap();
        assert!(!next.auto_scroll);
        let later = engine.on_frame(1.3, T0 + Duration::from_millis(600)).unwrap();
        assert!(later.auto_scroll);
    }

    #[test]
    fn test_manual_scroll_suppresses_auto_scroll_for_grace_period() {
        let mut engine = engine(0.0);
        assert!(engine.note_manual_scroll(T0));

        let update = engine.on_frame(0.0, T0 + Duration::from_secs(4)).unwrap();
        assert!(!update.auto_scroll);

        let update = engine.on_frame(0.6, T0 + Duration::from_secs(5)).unwrap();
        assert!(update.auto_scroll);
    }

    #[test]
    fn test_scroll_during_auto_scroll_window_is_ignored() {
        let mut engine = engine(0.0);
        assert!(engine.on_frame(0.0, T0).unwrap().auto_scroll);
        assert!(!engine.note_manual_scroll(T0 + Duration::from_millis(100)));
        assert!(engine.cursor().last_manual_scroll.is_none());
        assert!(engine.note_manual_scroll(T0 + Duration::from_millis(700)));
    }

    #[test]
    fn test_segment_end_advances_and_resets_hint() {
        let mut engine = engine(0.0);
        engine.on_frame(1.5, T0);
        assert_eq!(engine.cursor().hint, Some(2));

        assert_eq!(engine.on_segment_ended(), SegmentEnd::Advance(1));
        assert_eq!(engine.current_segment(), 1);
        assert_eq!(engine.cursor().hint, None);
        assert_eq!(engine.on_frame(0.3, T0).unwrap().global, 3);
    }

    #[test]
    fn test_last_segment_end_reports_full_progress() {
        let mut engine = engine(0.0);
        engine.jump_to_segment(1);
        assert_eq!(engine.on_segment_ended(), SegmentEnd::Finished);
        assert_eq!(engine.current_global(), Some(4));
        assert!(engine.is_finished());
        assert_eq!(engine.progress(), 100.0);

        engine.seek_to_word(0);
        assert!(!engine.is_finished());
    }

    #[test]
    fn test_seek_to_word_uses_recorded_start() {
        let mut engine = engine(0.0);
        engine.on_frame(1.5, T0);

        let target = engine.seek_to_word(4).unwrap();
        assert_eq!(target, SeekTarget { segment: 1, position: 0.9 });
        assert_eq!(engine.cursor().hint, None);
        assert_eq!(engine.current_global(), None);
    }

    #[test]
    fn test_seek_without_table_goes_to_segment_start() {
        let timing = TimingIndex::new(Arc::new(NoSource));
        let mut engine = WordSyncEngine::new(
            vec!["a".into(), "b".into()],
            &[3, 2],
            timing,
            &SyncConfig::default(),
        )
        .unwrap();
        assert_eq!(
            engine.seek_to_word(4),
            Some(SeekTarget { segment: 1, position: 0.0 })
        );
    }

    #[test]
    fn test_seek_to_percentage() {
        let mut engine = engine(0.0);
        // 60% of 5 words is word 3, the first word of B
        assert_eq!(
            engine.seek_to_percentage(60.0),
            Some(SeekTarget { segment: 1, position: 0.2 })
        );
        assert_eq!(
            engine.seek_to_percentage(0.0),
            Some(SeekTarget { segment: 0, position: 0.0 })
        );
    }

    #[test]
    fn test_backward_seek_re_resolves() {
        let mut engine = engine(0.0);
        engine.on_frame(1.5, T0);
        engine.seek_to_word(0);
        assert_eq!(engine.on_frame(0.1, T0).unwrap().global, 0);
    }

    #[test]
    fn test_jump_out_of_range() {
        let mut engine = engine(0.0);
        assert!(engine.jump_to_segment(2).is_none());
        assert_eq!(engine.current_segment(), 0);
    }

    #[test]
    fn test_reset() {
        let mut engine = engine(0.0);
        engine.jump_to_segment(1);
        engine.on_frame(1.0, T0);
        assert_eq!(engine.reset(), SeekTarget { segment: 0, position: 0.0 });
        assert_eq!(engine.current_global(), None);
        assert_eq!(engine.progress(), 0.0);
    }

    #[test]
    fn test_mismatched_counts_rejected() {
        let timing = TimingIndex::new(Arc::new(NoSource));
        let result = WordSyncEngine::new(vec!["a".into()], &[1, 2], timing, &SyncConfig::default());
        assert!(result.is_err());
    }
}
