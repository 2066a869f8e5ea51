//! Gapless placement of streamed response audio on the output timeline
//!
//! Chunks arrive in order and are queued back to back from a monotonic
//! `next_play_time` cursor. Every chunk carries the id of the turn that
//! produced it, so an interruption can hard-stop exactly the stale audio.

use crate::audio::envelope::GainEnvelope;
use crate::sync::Clock;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Identifier of a model response turn
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TurnId(String);

impl TurnId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TurnId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

pub type ChunkHandle = u64;

/// Where scheduled audio is played
///
/// The sink owns the output timeline: `current_time` is the clock every
/// start time and envelope ramp is expressed in.
pub trait OutputSink: Send + Sync {
    fn current_time(&self) -> Duration;

    /// Play `samples` starting at `at` on the output timeline
    fn start(&self, handle: ChunkHandle, samples: Arc<[f32]>, sample_rate: u32, at: Duration);

    /// Stop a chunk immediately, whether or not it has started
    fn stop(&self, handle: ChunkHandle);

    fn set_envelope(&self, envelope: GainEnvelope);
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledChunk {
    pub handle: ChunkHandle,
    pub turn: TurnId,
    pub start: Duration,
    pub duration: Duration,
}

impl ScheduledChunk {
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }
}

pub struct StreamScheduler {
    sink: Arc<dyn OutputSink>,
    next_play_time: Duration,
    live: Vec<ScheduledChunk>,
    superseded: HashSet<TurnId>,
    next_handle: ChunkHandle,
}

impl StreamScheduler {
    pub fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self {
            sink,
            next_play_time: Duration::ZERO,
            live: Vec::new(),
            superseded: HashSet::new(),
            next_handle: 1,
        }
    }

    pub fn sink(&self) -> &Arc<dyn OutputSink> {
        &self.sink
    }

    pub fn now(&self) -> Duration {
        self.sink.current_time()
    }

    pub fn next_play_time(&self) -> Duration {
        self.next_play_time
    }

    pub fn live(&self) -> &[ScheduledChunk] {
        &self.live
    }

    pub fn is_superseded(&self, turn: &TurnId) -> bool {
        self.superseded.contains(turn)
    }

    /// Queue a chunk right after the previous one, or now if the output ran dry
    ///
    /// Chunks of superseded turns are dropped and `None` is returned.
    pub fn schedule(
        &mut self,
        turn: &TurnId,
        samples: Vec<f32>,
        sample_rate: u32,
    ) -> Option<ScheduledChunk> {
        if self.superseded.contains(turn) {
            debug!("Dropping audio for superseded turn {}", turn);
            return None;
        }
        if samples.is_empty() || sample_rate == 0 {
            return None;
        }

        let now = self.sink.current_time();
        self.reap(now);

        let start = self.next_play_time.max(now);
        let duration = Duration::from_secs_f64(samples.len() as f64 / sample_rate as f64);
        self.next_play_time = start + duration;

        let handle = self.next_handle;
        self.next_handle += 1;
        self.sink.start(handle, samples.into(), sample_rate, start);

        let chunk = ScheduledChunk {
            handle,
            turn: turn.clone(),
            start,
            duration,
        };
        trace!(
            "Scheduled chunk {} for turn {} at {:?} ({:?})",
            handle,
            turn,
            start,
            duration
        );
        self.live.push(chunk.clone());
        Some(chunk)
    }

    /// Hard-stop every chunk not belonging to `current`
    ///
    /// Their turns are marked superseded so late chunks are dropped on
    /// arrival. Returns the number of chunks stopped.
    pub fn cancel_except(&mut self, current: &TurnId) -> usize {
        let mut stopped = 0;
        for chunk in self.live.iter().filter(|c| &c.turn != current) {
            self.sink.stop(chunk.handle);
            self.superseded.insert(chunk.turn.clone());
            stopped += 1;
        }
        self.live.retain(|c| &c.turn == current);
        if stopped > 0 {
            debug!("Stopped {} chunks not in turn {}", stopped, current);
        }
        stopped
    }

    /// Mark a turn superseded and stop its chunks
    pub fn supersede(&mut self, turn: &TurnId) {
        self.superseded.insert(turn.clone());
        for chunk in self.live.iter().filter(|c| &c.turn == turn) {
            self.sink.stop(chunk.handle);
        }
        self.live.retain(|c| &c.turn != turn);
    }

    pub fn reset_cursor(&mut self, now: Duration) {
        self.next_play_time = now;
    }

    /// Forget chunks that have finished playing
    pub fn reap(&mut self, now: Duration) {
        self.live.retain(|c| c.end() > now);
    }

    /// Stop everything, used when the session ends
    pub fn stop_all(&mut self) {
        for chunk in self.live.drain(..) {
            self.sink.stop(chunk.handle);
        }
    }
}

/// Sink that plays nothing and keeps time with a clock
pub struct SilentSink {
    clock: Arc<dyn Clock>,
    envelope: Mutex<GainEnvelope>,
}

impl SilentSink {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            envelope: Mutex::new(GainEnvelope::unity()),
        }
    }

    pub fn envelope(&self) -> GainEnvelope {
        *self.envelope.lock()
    }
}

impl OutputSink for SilentSink {
    fn current_time(&self) -> Duration {
        self.clock.now()
    }

    fn start(&self, handle: ChunkHandle, samples: Arc<[f32]>, sample_rate: u32, at: Duration) {
        trace!(
            "Silent sink: chunk {} ({} samples @ {} Hz) at {:?}",
            handle,
            samples.len(),
            sample_rate,
            at
        );
    }

    fn stop(&self, _handle: ChunkHandle) {}

    fn set_envelope(&self, envelope: GainEnvelope) {
        *self.envelope.lock() = envelope;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::ManualClock;

    #[derive(Default)]
    struct RecordingSink {
        now: Mutex<Duration>,
        started: Mutex<Vec<(ChunkHandle, Duration)>>,
        stopped: Mutex<Vec<ChunkHandle>>,
    }

    impl OutputSink for RecordingSink {
        fn current_time(&self) -> Duration {
            *self.now.lock()
        }

        fn start(&self, handle: ChunkHandle, _samples: Arc<[f32]>, _rate: u32, at: Duration) {
            self.started.lock().push((handle, at));
        }

        fn stop(&self, handle: ChunkHandle) {
            self.stopped.lock().push(handle);
        }

        fn set_envelope(&self, _envelope: GainEnvelope) {}
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    fn setup() -> (Arc<RecordingSink>, StreamScheduler) {
        let sink = Arc::new(RecordingSink::default());
        let scheduler = StreamScheduler::new(sink.clone());
        (sink, scheduler)
    }

    #[test]
    fn test_chunk_queued_after_cursor() {
        let (sink, mut scheduler) = setup();
        scheduler.reset_cursor(secs(2.0));
        *sink.now.lock() = secs(1.0);

        let chunk = scheduler
            .schedule(&"t1".into(), vec![0.0; 12_000], 24_000)
            .unwrap();
        assert_eq!(chunk.start, secs(2.0));
        assert_eq!(scheduler.next_play_time(), secs(2.5));
    }

    #[test]
    fn test_dry_output_starts_now() {
        let (sink, mut scheduler) = setup();
        *sink.now.lock() = secs(3.0);
        let chunk = scheduler.schedule(&"t1".into(), vec![0.0; 2400], 24_000).unwrap();
        assert_eq!(chunk.start, secs(3.0));
        assert_eq!(scheduler.next_play_time(), secs(3.1));
    }

    #[test]
    fn test_back_to_back_without_overlap() {
        let (sink, mut scheduler) = setup();
        let turn = TurnId::from("t1");
        let sizes = [480usize, 2400, 24, 9600, 1200];
        let mut last_cursor = Duration::ZERO;
        for (i, &n) in sizes.iter().enumerate() {
            *sink.now.lock() = secs(i as f64 * 0.01);
            scheduler.schedule(&turn, vec![0.0; n], 24_000).unwrap();
            assert!(scheduler.next_play_time() >= last_cursor);
            last_cursor = scheduler.next_play_time();
        }
        let live = scheduler.live();
        for pair in live.windows(2) {
            assert!(pair[1].start >= pair[0].end());
            assert_eq!(pair[1].start, pair[0].end());
        }
    }

    #[test]
    fn test_new_turn_stops_previous_chunks() {
        let (sink, mut scheduler) = setup();
        let t1 = TurnId::from("t1");
        let t2 = TurnId::from("t2");
        let a = scheduler.schedule(&t1, vec![0.0; 24_000], 24_000).unwrap();
        let b = scheduler.schedule(&t1, vec![0.0; 24_000], 24_000).unwrap();

        *sink.now.lock() = secs(0.5);
        assert_eq!(scheduler.cancel_except(&t2), 2);
        scheduler.reset_cursor(secs(0.5));

        assert_eq!(*sink.stopped.lock(), vec![a.handle, b.handle]);
        assert!(scheduler.live().is_empty());
        assert!(scheduler.schedule(&t1, vec![0.0; 100], 24_000).is_none());

        let c = scheduler.schedule(&t2, vec![0.0; 2400], 24_000).unwrap();
        assert_eq!(c.start, secs(0.5));
    }

    #[test]
    fn test_supersede_without_live_chunks() {
        let (_sink, mut scheduler) = setup();
        scheduler.supersede(&"old".into());
        assert!(scheduler.is_superseded(&"old".into()));
        assert!(scheduler.schedule(&"old".into(), vec![0.0; 10], 24_000).is_none());
    }

    #[test]
    fn test_finished_chunks_are_reaped() {
        let (sink, mut scheduler) = setup();
        scheduler.schedule(&"t1".into(), vec![0.0; 2400], 24_000);
        *sink.now.lock() = secs(1.0);
        scheduler.schedule(&"t1".into(), vec![0.0; 2400], 24_000);
        assert_eq!(scheduler.live().len(), 1);
    }

    #[test]
    fn test_empty_chunk_ignored() {
        let (sink, mut scheduler) = setup();
        assert!(scheduler.schedule(&"t1".into(), Vec::new(), 24_000).is_none());
        assert!(sink.started.lock().is_empty());
    }

    #[test]
    fn test_silent_sink_follows_clock() {
        let clock = Arc::new(ManualClock::new());
        let sink = SilentSink::new(clock.clone());
        clock.advance(Duration::from_millis(40));
        assert_eq!(sink.current_time(), Duration::from_millis(40));
    }
}
