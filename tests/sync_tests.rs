//! Narration sync tests
//!
//! These tests drive the sync loop through its public channels with a silent
//! clock-driven player, so no audio device is needed.

use readalong::content::SegmentId;
use readalong::sync::{
    ClockPlayer, Clock, ManualClock, SyncCommand, SyncConfig, SyncEvent, SyncLoop, WordSyncEngine,
};
use readalong::timing::{
    TimingIndex, TimingSource, TimingTable, WordIndex, WordLocation, WordTiming,
};
use readalong::{ReadalongError, Result};
use crossbeam_channel::{Receiver, Sender};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

struct Offline;

impl TimingSource for Offline {
    fn fetch<'a>(&'a self, _: &'a SegmentId) -> BoxFuture<'a, Result<Vec<WordTiming>>> {
        async { Err(ReadalongError::ResourceUnavailable("offline".into())) }.boxed()
    }
}

fn table(words: &[(&str, f64)]) -> TimingTable {
    TimingTable::new(words.iter().map(|(w, s)| WordTiming::new(*w, *s)).collect()).unwrap()
}

struct Running {
    clock: Arc<ManualClock>,
    commands: Sender<SyncCommand>,
    events: Receiver<SyncEvent>,
    worker: JoinHandle<()>,
}

fn start() -> Running {
    let timing = TimingIndex::new(Arc::new(Offline));
    timing.insert("a".into(), table(&[("one", 0.0), ("two", 0.5), ("three", 1.0)]));
    timing.insert("b".into(), table(&[("four", 0.0), ("five", 0.4)]));

    let config = SyncConfig::default()
        .with_lookahead(0.0)
        .with_frame_interval_ms(1)
        .with_section_pause_ms(0);
    let engine = WordSyncEngine::new(
        vec!["a".into(), "b".into()],
        &[3, 2],
        timing.clone(),
        &config,
    )
    .unwrap();

    let clock = Arc::new(ManualClock::new());
    let sync_loop = SyncLoop::new(config);
    let commands = sync_loop.command_sender();
    let events = sync_loop.event_receiver();

    let player_clock: Arc<dyn Clock> = clock.clone();
    let loop_clock: Arc<dyn Clock> = clock.clone();
    let worker = sync_loop
        .start_worker(engine, loop_clock, None, move || {
            Ok(ClockPlayer::new(player_clock, timing, Duration::from_millis(500)))
        })
        .unwrap();

    Running {
        clock,
        commands,
        events,
        worker,
    }
}

fn wait_for(events: &Receiver<SyncEvent>, pred: impl Fn(&SyncEvent) -> bool) -> SyncEvent {
    loop {
        match events.recv_timeout(Duration::from_secs(2)) {
            Ok(event) if pred(&event) => return event,
            Ok(_) => continue,
            Err(e) => panic!("Expected event not received: {}", e),
        }
    }
}

fn word(events: &Receiver<SyncEvent>) -> usize {
    match wait_for(events, |e| matches!(e, SyncEvent::Word(_))) {
        SyncEvent::Word(update) => update.global,
        _ => unreachable!(),
    }
}

fn shutdown(running: Running) {
    running.commands.send(SyncCommand::Shutdown).unwrap();
    running.worker.join().unwrap();
}

#[test]
fn test_global_index_resolves_across_segments() {
    let index = WordIndex::from_counts(&[10, 5]).unwrap();
    assert_eq!(
        index.resolve(12),
        Some(WordLocation {
            segment: 1,
            local: 2
        }),
        "Word 12 of [10, 5] should be the third word of the second segment"
    );
    assert_eq!(index.to_global(1, 2), Some(12));
    assert_eq!(index.total_words(), 15);
}

#[test]
fn test_table_lookup_picks_active_word() {
    let table = table(&[("a", 0.0), ("b", 0.5), ("c", 1.2)]);
    assert_eq!(table.lookup(0.6), Some(1), "t=0.6 falls in \"b\"");
    assert_eq!(table.lookup(1.5), Some(2), "t=1.5 falls in \"c\"");
}

#[test]
fn test_playback_highlights_every_word_in_order() {
    let running = start();
    running.commands.send(SyncCommand::Play).unwrap();

    wait_for(&running.events, |e| *e == SyncEvent::Playing);
    assert_eq!(word(&running.events), 0);

    running.clock.set(Duration::from_millis(600));
    assert_eq!(word(&running.events), 1);

    running.clock.set(Duration::from_millis(1100));
    assert_eq!(word(&running.events), 2);

    // Past the end of "a": the loop moves on to "b"
    running.clock.set(Duration::from_millis(1600));
    let started = wait_for(&running.events, |e| {
        matches!(e, SyncEvent::SegmentStarted { segment: 1, .. })
    });
    assert_eq!(
        started,
        SyncEvent::SegmentStarted {
            segment: 1,
            id: "b".into()
        }
    );
    assert_eq!(word(&running.events), 3);

    running.clock.advance(Duration::from_millis(500));
    assert_eq!(word(&running.events), 4);

    running.clock.advance(Duration::from_secs(1));
    wait_for(&running.events, |e| *e == SyncEvent::Finished);

    shutdown(running);
}

#[test]
fn test_seek_while_paused_highlights_immediately() {
    let running = start();

    running.commands.send(SyncCommand::SeekToWord(4)).unwrap();
    let update = match wait_for(&running.events, |e| matches!(e, SyncEvent::Word(_))) {
        SyncEvent::Word(update) => update,
        _ => unreachable!(),
    };
    assert_eq!(update.global, 4);
    assert_eq!(update.segment, 1);
    assert_eq!(update.local, 1);

    running.commands.send(SyncCommand::SeekToPercentage(0.0)).unwrap();
    assert_eq!(word(&running.events), 0, "Seeking to 0% returns to the first word");

    shutdown(running);
}

#[test]
fn test_reset_pauses_at_first_word() {
    let running = start();
    running.commands.send(SyncCommand::Play).unwrap();
    wait_for(&running.events, |e| *e == SyncEvent::Playing);

    running.clock.set(Duration::from_millis(1100));
    wait_for(&running.events, |e| matches!(e, SyncEvent::Word(u) if u.global == 2));

    running.commands.send(SyncCommand::Reset).unwrap();
    assert_eq!(word(&running.events), 0);
    wait_for(&running.events, |e| *e == SyncEvent::Reset);

    shutdown(running);
}
