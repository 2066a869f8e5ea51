//! Orchestrator for the read-along host
//!
//! Connects all components: narration sync loop, timing preload, the voice
//! companion session and the observable surface state.

use crate::audio::{ChannelMicrophone, MicrophoneSource, OutputSink, SilentSink, TurnId};
use crate::content::{Catalog, SegmentId};
use crate::conversation::{
    article_tools, build_instructions, ConnectionStatus, ConversationEvent, ConversationSession,
    CredentialIssuer, HttpCredentialIssuer, SessionHandle, SessionParts, ToolRegistry, TurnStatus,
    WebSocketConnector, WireConnector,
};
use crate::integration::config::ReadalongConfig;
use crate::sync::{
    ClockPlayer, Clock, SyncCommand, SyncEvent, SyncLoop, SystemClock, WordSyncEngine,
};
use crate::{ReadalongError, Result};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Builds a fresh microphone for each conversation
pub type MicrophoneFactory = Arc<dyn Fn() -> Box<dyn MicrophoneSource> + Send + Sync>;

/// Commands that can be sent to the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorCommand {
    Play,
    Pause,

    /// Seek to a percentage of the article, 0..=100
    SeekToPercentage(f64),

    /// Seek to a global word index
    SeekToWord(usize),

    /// Start narrating a section from its beginning
    JumpToSegment(usize),

    /// The listener scrolled the transcript by hand
    ManualScroll,

    /// Pause and return to the first word
    Reset,

    StartConversation,
    StopConversation,

    /// Shutdown the orchestrator
    Shutdown,
}

/// Events emitted by the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    /// The highlighted word changed
    Word {
        global: usize,
        progress: f32,
        auto_scroll: bool,
    },

    SectionStarted(SegmentId),
    Playing,
    Paused,
    Finished,
    Reset,

    /// The companion asked to bring a section into view
    ScrollTo(SegmentId),

    Connection(ConnectionStatus),
    TurnStarted(TurnId),
    TurnFinished { turn: TurnId, status: TurnStatus },
    ToolCalled(String),

    /// An error occurred
    Error(String),

    /// Orchestrator has shut down
    Shutdown,
}

/// Snapshot of what the host displays
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurfaceState {
    pub current_word: Option<usize>,
    pub progress: f32,
    pub playing: bool,
    pub active_section: Option<SegmentId>,
    pub connection: ConnectionStatus,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for SurfaceState {
    fn default() -> Self {
        Self {
            current_word: None,
            progress: 0.0,
            playing: false,
            active_section: None,
            connection: ConnectionStatus::Idle,
            connected_at: None,
            last_error: None,
        }
    }
}

/// Handle for controlling the orchestrator from the host
#[derive(Clone)]
pub struct OrchestratorHandle {
    command_tx: Sender<OrchestratorCommand>,
    event_rx: Receiver<OrchestratorEvent>,
    surface: Arc<RwLock<SurfaceState>>,
}

impl OrchestratorHandle {
    /// Send a command to the orchestrator
    pub fn send_command(&self, cmd: OrchestratorCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|e| ReadalongError::ChannelError(format!("Failed to send command: {}", e)))
    }

    /// Try to receive an event from the orchestrator
    pub fn try_recv_event(&self) -> Option<OrchestratorEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn event_receiver(&self) -> Receiver<OrchestratorEvent> {
        self.event_rx.clone()
    }

    /// Current surface snapshot
    pub fn surface(&self) -> SurfaceState {
        self.surface.read().clone()
    }
}

/// Main orchestrator that coordinates all components
pub struct Orchestrator {
    config: ReadalongConfig,
    catalog: Arc<Catalog>,
    runtime: tokio::runtime::Runtime,
    clock: Arc<dyn Clock>,
    engine: WordSyncEngine,
    sync_loop: SyncLoop,
    command_rx: Receiver<OrchestratorCommand>,
    event_tx: Sender<OrchestratorEvent>,
    surface: Arc<RwLock<SurfaceState>>,
    credential: Option<Arc<dyn CredentialIssuer>>,
    connector: Arc<dyn WireConnector>,
    microphone: MicrophoneFactory,
    sink: Option<Arc<dyn OutputSink>>,
}

impl Orchestrator {
    /// Start the sync loop and the coordinator
    ///
    /// This consumes the orchestrator and returns join handles for the worker threads.
    pub fn start(self) -> Result<Vec<JoinHandle<()>>> {
        let Orchestrator {
            config,
            catalog,
            runtime,
            clock,
            engine,
            sync_loop,
            command_rx,
            event_tx,
            surface,
            credential,
            connector,
            microphone,
            sink,
        } = self;

        let mut handles = Vec::new();

        let timing = engine.timing().clone();
        let segments = catalog.segment_ids();
        runtime.spawn(async move {
            timing.preload(segments).await;
        });

        let sync_tx = sync_loop.command_sender();
        let sync_rx = sync_loop.event_receiver();
        handles.push(start_sync_loop(
            sync_loop,
            engine,
            Arc::clone(&clock),
            runtime.handle().clone(),
            &config,
        )?);
        info!("Sync loop started");

        let (nav_tx, nav_rx) = unbounded();
        let (conversation_tx, conversation_rx) = unbounded();
        let tools = Arc::new(article_tools(Arc::clone(&catalog), nav_tx));

        let coordinator = Coordinator {
            config,
            catalog,
            runtime,
            clock,
            event_tx,
            surface,
            sync_tx,
            tools,
            credential,
            connector,
            microphone,
            sink,
            conversation_tx,
            session: None,
        };

        handles.push(thread::spawn(move || {
            coordinator.run(command_rx, sync_rx, conversation_rx, nav_rx)
        }));

        Ok(handles)
    }
}

fn start_sync_loop(
    sync_loop: SyncLoop,
    engine: WordSyncEngine,
    clock: Arc<dyn Clock>,
    runtime: tokio::runtime::Handle,
    config: &ReadalongConfig,
) -> Result<JoinHandle<()>> {
    #[cfg(feature = "audio-io")]
    {
        if config.audio_devices {
            let sync_config = config.sync.clone();
            return sync_loop.start_worker(engine, clock, Some(runtime), move || {
                crate::sync::RodioNarrationPlayer::new(&sync_config)
            });
        }
    }

    let timing = engine.timing().clone();
    let player_clock = Arc::clone(&clock);
    let tail = config.narration_tail();
    sync_loop.start_worker(engine, clock, Some(runtime), move || {
        Ok(ClockPlayer::new(player_clock, timing, tail))
    })
}

/// State owned by the coordinator thread
struct Coordinator {
    config: ReadalongConfig,
    catalog: Arc<Catalog>,
    runtime: tokio::runtime::Runtime,
    clock: Arc<dyn Clock>,
    event_tx: Sender<OrchestratorEvent>,
    surface: Arc<RwLock<SurfaceState>>,
    sync_tx: Sender<SyncCommand>,
    tools: Arc<ToolRegistry>,
    credential: Option<Arc<dyn CredentialIssuer>>,
    connector: Arc<dyn WireConnector>,
    microphone: MicrophoneFactory,
    sink: Option<Arc<dyn OutputSink>>,
    conversation_tx: Sender<ConversationEvent>,
    session: Option<SessionHandle>,
}

impl Coordinator {
    fn run(
        mut self,
        command_rx: Receiver<OrchestratorCommand>,
        sync_rx: Receiver<SyncEvent>,
        conversation_rx: Receiver<ConversationEvent>,
        nav_rx: Receiver<SegmentId>,
    ) {
        info!("Orchestrator started");

        loop {
            select! {
                recv(command_rx) -> command => match command {
                    Ok(OrchestratorCommand::Shutdown) => {
                        info!("Orchestrator shutdown requested");
                        break;
                    }
                    Ok(command) => self.handle_command(command),
                    Err(_) => {
                        warn!("Command channel disconnected");
                        break;
                    }
                },
                recv(sync_rx) -> event => match event {
                    Ok(event) => self.on_sync_event(event),
                    Err(_) => {
                        error!("Sync loop exited");
                        break;
                    }
                },
                recv(conversation_rx) -> event => {
                    if let Ok(event) = event {
                        self.on_conversation_event(event);
                    }
                },
                recv(nav_rx) -> section => {
                    if let Ok(section) = section {
                        self.surface.write().active_section = Some(section.clone());
                        self.emit(OrchestratorEvent::ScrollTo(section));
                    }
                },
            }
        }

        if let Some(session) = self.session.take() {
            session.stop();
        }
        let _ = self.sync_tx.send(SyncCommand::Shutdown);
        self.emit(OrchestratorEvent::Shutdown);
        self.runtime.shutdown_timeout(Duration::from_secs(1));
        info!("Orchestrator stopped");
    }

    fn emit(&self, event: OrchestratorEvent) {
        let _ = self.event_tx.send(event);
    }

    fn handle_command(&mut self, command: OrchestratorCommand) {
        debug!("Command: {:?}", command);
        let forward = match command {
            OrchestratorCommand::Play => SyncCommand::Play,
            OrchestratorCommand::Pause => SyncCommand::Pause,
            OrchestratorCommand::SeekToPercentage(p) => SyncCommand::SeekToPercentage(p),
            OrchestratorCommand::SeekToWord(w) => SyncCommand::SeekToWord(w),
            OrchestratorCommand::JumpToSegment(s) => SyncCommand::JumpToSegment(s),
            OrchestratorCommand::ManualScroll => SyncCommand::ManualScroll,
            OrchestratorCommand::Reset => SyncCommand::Reset,
            OrchestratorCommand::StartConversation => {
                self.start_conversation();
                return;
            }
            OrchestratorCommand::StopConversation => {
                match &self.session {
                    Some(session) => {
                        session.stop();
                    }
                    None => debug!("No conversation to stop"),
                }
                return;
            }
            OrchestratorCommand::Shutdown => return,
        };

        if let Err(e) = self.sync_tx.send(forward) {
            self.fail(format!("Sync loop unavailable: {}", e));
        }
    }

    fn on_sync_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Word(update) => {
                {
                    let mut surface = self.surface.write();
                    surface.current_word = Some(update.global);
                    surface.progress = update.progress;
                    if let Some(section) = self.catalog.sections().get(update.segment) {
                        surface.active_section = Some(section.id.clone());
                    }
                }
                self.emit(OrchestratorEvent::Word {
                    global: update.global,
                    progress: update.progress,
                    auto_scroll: update.auto_scroll,
                });
            }
            SyncEvent::SegmentStarted { id, .. } => {
                self.surface.write().active_section = Some(id.clone());
                self.emit(OrchestratorEvent::SectionStarted(id));
            }
            SyncEvent::Playing => {
                self.surface.write().playing = true;
                self.emit(OrchestratorEvent::Playing);
            }
            SyncEvent::Paused => {
                self.surface.write().playing = false;
                self.emit(OrchestratorEvent::Paused);
            }
            SyncEvent::Finished => {
                {
                    let mut surface = self.surface.write();
                    surface.playing = false;
                    surface.progress = 100.0;
                }
                self.emit(OrchestratorEvent::Finished);
            }
            SyncEvent::Reset => {
                self.surface.write().playing = false;
                self.emit(OrchestratorEvent::Reset);
            }
            SyncEvent::Error(message) => self.fail(message),
            SyncEvent::Shutdown => debug!("Sync loop shut down"),
        }
    }

    fn on_conversation_event(&mut self, event: ConversationEvent) {
        match event {
            ConversationEvent::Status(status) => {
                {
                    let mut surface = self.surface.write();
                    surface.connection = status;
                    surface.connected_at = match status {
                        ConnectionStatus::Connected => {
                            Some(surface.connected_at.unwrap_or_else(Utc::now))
                        }
                        _ => None,
                    };
                }
                self.emit(OrchestratorEvent::Connection(status));
            }
            ConversationEvent::State(state) => debug!("Conversation state {:?}", state),
            ConversationEvent::TurnStarted(turn) => self.emit(OrchestratorEvent::TurnStarted(turn)),
            ConversationEvent::TurnFinished { turn, status } => {
                self.emit(OrchestratorEvent::TurnFinished { turn, status })
            }
            ConversationEvent::ToolCalled { name, .. } => self.emit(OrchestratorEvent::ToolCalled(name)),
            ConversationEvent::Error { message, .. } => self.fail(message),
            ConversationEvent::Ended => {
                info!("Conversation ended");
                self.session = None;
            }
        }
    }

    fn fail(&self, message: String) {
        warn!("{}", message);
        self.surface.write().last_error = Some(message.clone());
        self.emit(OrchestratorEvent::Error(message));
    }

    fn start_conversation(&mut self) {
        if self.session.as_ref().map_or(false, SessionHandle::is_running) {
            warn!("Conversation already running");
            return;
        }

        let Some(credential) = self.credential.clone() else {
            self.fail(ReadalongError::CredentialError("No credential issuer configured".into()).to_string());
            return;
        };
        let sink = match self.output_sink() {
            Ok(sink) => sink,
            Err(e) => {
                self.fail(e.to_string());
                return;
            }
        };

        let conversation = &self.config.conversation;
        let active = self.surface.read().active_section.clone();
        let instructions = build_instructions(
            &conversation.persona,
            conversation.listener_name.as_deref(),
            active.as_ref(),
            &self.catalog,
            &self.tools.definitions(),
        );

        info!("Starting conversation");
        let session = ConversationSession::new(
            conversation.clone(),
            instructions,
            SessionParts {
                credential,
                connector: Arc::clone(&self.connector),
                microphone: (self.microphone)(),
                sink,
                tools: Arc::clone(&self.tools),
            },
            self.conversation_tx.clone(),
        );
        self.session = Some(session.spawn(self.runtime.handle()));
    }

    /// The companion's output, opened on first use
    fn output_sink(&mut self) -> Result<Arc<dyn OutputSink>> {
        if let Some(sink) = &self.sink {
            return Ok(Arc::clone(sink));
        }

        #[cfg(feature = "audio-io")]
        {
            if self.config.audio_devices {
                let output: Arc<dyn OutputSink> = Arc::new(crate::audio::AudioOutput::open()?);
                self.sink = Some(Arc::clone(&output));
                return Ok(output);
            }
        }

        let silent: Arc<dyn OutputSink> = Arc::new(SilentSink::new(Arc::clone(&self.clock)));
        self.sink = Some(Arc::clone(&silent));
        Ok(silent)
    }
}

/// Builder for creating an orchestrator
pub struct OrchestratorBuilder {
    config: ReadalongConfig,
    catalog: Option<Catalog>,
    clock: Option<Arc<dyn Clock>>,
    credential: Option<Arc<dyn CredentialIssuer>>,
    connector: Option<Arc<dyn WireConnector>>,
    microphone: Option<MicrophoneFactory>,
    sink: Option<Arc<dyn OutputSink>>,
}

impl OrchestratorBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ReadalongConfig::default(),
            catalog: None,
            clock: None,
            credential: None,
            connector: None,
            microphone: None,
            sink: None,
        }
    }

    /// Set the complete configuration
    pub fn with_config(mut self, config: ReadalongConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an already loaded catalog instead of reading `catalog_path`
    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_credential(mut self, credential: Arc<dyn CredentialIssuer>) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn WireConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_microphone(mut self, factory: MicrophoneFactory) -> Self {
        self.microphone = Some(factory);
        self
    }

    pub fn with_output_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Disable sound devices
    pub fn without_audio_devices(mut self) -> Self {
        self.config.audio_devices = false;
        self
    }

    /// Build the orchestrator
    pub fn build(self) -> Result<(Orchestrator, OrchestratorHandle)> {
        let config = self.config;
        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => Catalog::from_json_file(&config.catalog_path)?,
        };
        if catalog.is_empty() {
            return Err(ReadalongError::ConfigError("Catalog has no sections".into()));
        }
        let catalog = Arc::new(catalog);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("readalong-io")
            .enable_all()
            .build()?;

        let timing = config.timing.build_index().map_err(ReadalongError::ConfigError)?;
        let engine = WordSyncEngine::new(
            catalog.segment_ids(),
            &catalog.word_counts(),
            timing,
            &config.sync,
        )?;

        let credential = match self.credential {
            Some(credential) => Some(credential),
            None => match &config.conversation.credential_url {
                Some(url) => Some(Arc::new(HttpCredentialIssuer::new(
                    url.clone(),
                    config.conversation.credential_auth.clone(),
                )?) as Arc<dyn CredentialIssuer>),
                None => None,
            },
        };

        let connector = self.connector.unwrap_or_else(|| {
            let conversation = &config.conversation;
            Arc::new(WebSocketConnector::new(
                conversation.realtime_url.clone(),
                conversation.model.clone(),
                conversation.auth.clone(),
            )) as Arc<dyn WireConnector>
        });

        let microphone = self
            .microphone
            .unwrap_or_else(|| default_microphone(&config));

        let (command_tx, command_rx) = bounded(100);
        let (event_tx, event_rx) = bounded(1000);
        let surface = Arc::new(RwLock::new(SurfaceState::default()));

        let handle = OrchestratorHandle {
            command_tx,
            event_rx,
            surface: Arc::clone(&surface),
        };

        let orchestrator = Orchestrator {
            sync_loop: SyncLoop::new(config.sync.clone()),
            config,
            catalog,
            runtime,
            clock: self
                .clock
                .unwrap_or_else(|| Arc::new(SystemClock::new()) as Arc<dyn Clock>),
            engine,
            command_rx,
            event_tx,
            surface,
            credential,
            connector,
            microphone,
            sink: self.sink,
        };

        Ok((orchestrator, handle))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_microphone(config: &ReadalongConfig) -> MicrophoneFactory {
    #[cfg(feature = "audio-io")]
    {
        if config.audio_devices {
            let frame_size = config.conversation.mic_frame_size;
            let rate = config.conversation.sample_rate;
            return Arc::new(move || {
                Box::new(crate::audio::AudioInput::new(frame_size, rate)) as Box<dyn MicrophoneSource>
            });
        }
    }

    let _ = config;
    Arc::new(|| {
        let (microphone, _feed) = ChannelMicrophone::new();
        Box::new(microphone) as Box<dyn MicrophoneSource>
    })
}
