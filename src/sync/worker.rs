//! Frame loop driving the word sync engine
//!
//! The loop owns the engine and the narration player. While playing it wakes
//! every frame interval to sample the player position; while paused it blocks
//! on the command channel, so no frame work happens outside playback.

use crate::content::SegmentId;
use crate::sync::clock::Clock;
use crate::sync::config::SyncConfig;
use crate::sync::engine::{SeekTarget, SegmentEnd, SyncUpdate, WordSyncEngine};
use crate::sync::player::NarrationPlayer;
use crate::Result;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Command sent to the sync loop
#[derive(Clone, Debug, PartialEq)]
pub enum SyncCommand {
    Play,
    Pause,
    /// Seek to a percentage of the article, 0..=100
    SeekToPercentage(f64),
    /// Seek to a global word index
    SeekToWord(usize),
    /// Start a segment from its beginning
    JumpToSegment(usize),
    /// The listener scrolled the transcript by hand
    ManualScroll,
    /// Pause and return to the first word
    Reset,
    Shutdown,
}

/// Event emitted by the sync loop
#[derive(Clone, Debug, PartialEq)]
pub enum SyncEvent {
    /// The highlighted word changed
    Word(SyncUpdate),
    /// A segment's narration was loaded
    SegmentStarted { segment: usize, id: SegmentId },
    Playing,
    Paused,
    /// The last segment played to the end
    Finished,
    Reset,
    Error(String),
    Shutdown,
}

pub struct SyncLoop {
    config: SyncConfig,
    command_tx: Sender<SyncCommand>,
    command_rx: Receiver<SyncCommand>,
    event_tx: Sender<SyncEvent>,
    event_rx: Receiver<SyncEvent>,
}

impl SyncLoop {
    pub fn new(config: SyncConfig) -> Self {
        let (command_tx, command_rx) = bounded(config.queue_size);
        let (event_tx, event_rx) = bounded(config.queue_size);

        Self {
            config,
            command_tx,
            command_rx,
            event_tx,
            event_rx,
        }
    }

    pub fn command_sender(&self) -> Sender<SyncCommand> {
        self.command_tx.clone()
    }

    pub fn event_receiver(&self) -> Receiver<SyncEvent> {
        self.event_rx.clone()
    }

    /// Start the loop thread
    ///
    /// The player is built on the loop thread by `make_player`. When a tokio
    /// runtime handle is given, timing tables for segments nobody requested
    /// yet are fetched on it as playback reaches them.
    pub fn start_worker<P, F>(
        self,
        engine: WordSyncEngine,
        clock: Arc<dyn Clock>,
        runtime: Option<tokio::runtime::Handle>,
        make_player: F,
    ) -> Result<thread::JoinHandle<()>>
    where
        P: NarrationPlayer,
        F: FnOnce() -> Result<P> + Send + 'static,
    {
        let frame_interval = self.config.frame_interval();
        let section_pause = self.config.section_pause();
        let command_rx = self.command_rx.clone();
        let event_tx = self.event_tx.clone();

        let handle = thread::spawn(move || {
            info!("Sync loop starting");

            let player = match make_player() {
                Ok(player) => player,
                Err(e) => {
                    error!("Failed to create narration player: {}", e);
                    let _ = event_tx.send(SyncEvent::Error(e.to_string()));
                    let _ = event_tx.send(SyncEvent::Shutdown);
                    return;
                }
            };

            let mut worker = Worker {
                engine,
                player,
                clock,
                runtime,
                event_tx,
                section_pause,
                playing: false,
                loaded: None,
                pending_advance: None,
            };

            loop {
                let command = if worker.playing {
                    match command_rx.recv_timeout(frame_interval) {
                        Ok(command) => Some(command),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => {
                            warn!("Sync command channel disconnected");
                            break;
                        }
                    }
                } else {
                    match command_rx.recv() {
                        Ok(command) => Some(command),
                        Err(e) => {
                            warn!("Sync command channel error: {}", e);
                            break;
                        }
                    }
                };

                if let Some(command) = command {
                    if !worker.handle(command) {
                        break;
                    }
                }
                worker.tick();
            }

            worker.player.stop();
            info!("Sync loop stopped");
        });

        Ok(handle)
    }
}

struct Worker<P: NarrationPlayer> {
    engine: WordSyncEngine,
    player: P,
    clock: Arc<dyn Clock>,
    runtime: Option<tokio::runtime::Handle>,
    event_tx: Sender<SyncEvent>,
    section_pause: Duration,
    playing: bool,
    /// Segment currently loaded into the player
    loaded: Option<usize>,
    /// Clock reading at which the next segment starts
    pending_advance: Option<Duration>,
}

impl<P: NarrationPlayer> Worker<P> {
    fn emit(&self, event: SyncEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Returns false when the loop should exit
    fn handle(&mut self, command: SyncCommand) -> bool {
        match command {
            SyncCommand::Play => self.play(),
            SyncCommand::Pause => {
                if self.playing {
                    self.player.pause();
                    self.playing = false;
                    self.emit(SyncEvent::Paused);
                }
            }
            SyncCommand::SeekToPercentage(percent) => match self.engine.seek_to_percentage(percent) {
                Some(target) => self.apply(target),
                None => warn!("Cannot seek to {}%", percent),
            },
            SyncCommand::SeekToWord(global) => match self.engine.seek_to_word(global) {
                Some(target) => self.apply(target),
                None => warn!("Word {} is out of range", global),
            },
            SyncCommand::JumpToSegment(segment) => match self.engine.jump_to_segment(segment) {
                Some(target) => self.apply(target),
                None => warn!("Segment {} is out of range", segment),
            },
            SyncCommand::ManualScroll => {
                if !self.engine.note_manual_scroll(self.clock.now()) {
                    debug!("Scroll attributed to auto-scroll");
                }
            }
            SyncCommand::Reset => {
                self.player.pause();
                self.playing = false;
                let target = self.engine.reset();
                self.apply(target);
                self.emit(SyncEvent::Reset);
            }
            SyncCommand::Shutdown => {
                info!("Sync loop shutdown requested");
                self.emit(SyncEvent::Shutdown);
                return false;
            }
        }
        true
    }

    fn play(&mut self) {
        if self.playing {
            return;
        }
        if self.engine.is_finished() {
            let target = self.engine.reset();
            self.apply(target);
        }
        if !self.ensure_loaded(self.engine.current_segment()) {
            return;
        }
        self.player.play();
        self.playing = true;
        self.emit(SyncEvent::Playing);
    }

    fn apply(&mut self, target: SeekTarget) {
        self.pending_advance = None;
        if !self.ensure_loaded(target.segment) {
            return;
        }
        if let Err(e) = self.player.seek(target.position) {
            warn!("{}", e);
            self.emit(SyncEvent::Error(e.to_string()));
        }
        if self.playing {
            self.player.play();
        }
        if let Some(update) = self.engine.on_frame(target.position, self.clock.now()) {
            self.emit(SyncEvent::Word(update));
        }
    }

    fn ensure_loaded(&mut self, segment: usize) -> bool {
        if self.loaded == Some(segment) {
            return true;
        }
        let Some(id) = self.engine.segment_id(segment).cloned() else {
            return false;
        };
        self.await_timing(&id);

        match self.player.load(&id) {
            Ok(()) => {
                info!("Narrating segment {} ({})", segment, id);
                self.loaded = Some(segment);
                self.emit(SyncEvent::SegmentStarted { segment, id });
                true
            }
            Err(e) => {
                warn!("Cannot load narration for {}: {}", id, e);
                self.loaded = None;
                if self.playing {
                    self.playing = false;
                    self.emit(SyncEvent::Paused);
                }
                self.emit(SyncEvent::Error(e.to_string()));
                false
            }
        }
    }

    /// Block until the segment's timing table is ready, so narration never
    /// starts ahead of its highlighting. The table load is bounded, and a
    /// runtime shutting down ends the wait early.
    fn await_timing(&self, id: &SegmentId) {
        let Some(runtime) = &self.runtime else {
            return;
        };
        let timing = self.engine.timing().clone();
        if timing.status(id).is_ready() {
            return;
        }

        debug!("Waiting for timing of {}", id);
        let limit = timing.fetch_timeout() * 2;
        let (tx, rx) = bounded(1);
        let segment = id.clone();
        runtime.spawn(async move {
            let table = timing.wait_ready(&segment).await;
            let _ = tx.send(table.len());
        });
        match rx.recv_timeout(limit) {
            Ok(words) => debug!("Timing for {} ready ({} words)", id, words),
            Err(e) => warn!("Gave up waiting for timing of {}: {}", id, e),
        }
    }

    fn request_timing(&self, id: &SegmentId) {
        if let Some(runtime) = &self.runtime {
            self.engine.timing().spawn_load(runtime, id.clone());
        }
    }

    fn tick(&mut self) {
        if !self.playing {
            return;
        }
        let now = self.clock.now();

        if let Some(deadline) = self.pending_advance {
            if now < deadline {
                return;
            }
            self.pending_advance = None;
            let segment = self.engine.current_segment();
            if self.ensure_loaded(segment) {
                if let Err(e) = self.player.seek(0.0) {
                    warn!("{}", e);
                }
                self.player.play();
            }
            return;
        }

        if self.player.is_finished() {
            match self.engine.on_segment_ended() {
                SegmentEnd::Advance(next) => {
                    self.pending_advance = Some(now + self.section_pause);
                    if let Some(id) = self.engine.segment_id(next) {
                        self.request_timing(id);
                    }
                }
                SegmentEnd::Finished => {
                    info!("Narration finished");
                    self.player.pause();
                    self.playing = false;
                    self.emit(SyncEvent::Finished);
                }
            }
            return;
        }

        let position = self.player.position();
        if let Some(update) = self.engine.on_frame(position, now) {
            self.emit(SyncEvent::Word(update));
        }
    }
}
