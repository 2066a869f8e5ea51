//! The realtime conversation session
//!
//! One task owns the session: it reads server events, forwards microphone
//! frames and answers host commands from a single `select!` loop, so turn
//! bookkeeping never races with audio scheduling.

use crate::audio::codec::{decode_frame, encode_frame};
use crate::audio::{
    GainEnvelope, MicrophoneSource, OutputSink, RampShape, StreamScheduler, TurnId, GAIN_FLOOR,
};
use crate::conversation::config::ConversationConfig;
use crate::conversation::credential::CredentialIssuer;
use crate::conversation::protocol::{
    error_message, ClientEvent, ServerEvent, SessionSettings, TurnDetection,
};
use crate::conversation::state::{
    BargeIn, ConnectionStatus, ConversationTurn, SessionState, TurnStatus,
};
use crate::conversation::tools::ToolRegistry;
use crate::conversation::transport::WireConnector;
use crate::{ReadalongError, Result};
use crossbeam_channel::Sender;
use futures::stream::{BoxStream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Host requests to a running session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Stop,
}

/// What the session reports to the host
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    Status(ConnectionStatus),
    State(SessionState),
    TurnStarted(TurnId),
    TurnFinished { turn: TurnId, status: TurnStatus },
    ToolCalled { name: String, call_id: String },
    Error { message: String, fatal: bool },
    Ended,
}

/// Collaborators a session is built from
pub struct SessionParts {
    pub credential: Arc<dyn CredentialIssuer>,
    pub connector: Arc<dyn WireConnector>,
    pub microphone: Box<dyn MicrophoneSource>,
    pub sink: Arc<dyn OutputSink>,
    pub tools: Arc<ToolRegistry>,
}

/// Sending half of a running session
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub fn stop(&self) -> bool {
        self.commands.send(SessionCommand::Stop).is_ok()
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

pub struct ConversationSession {
    config: ConversationConfig,
    instructions: String,
    credential: Arc<dyn CredentialIssuer>,
    connector: Arc<dyn WireConnector>,
    microphone: Box<dyn MicrophoneSource>,
    tools: Arc<ToolRegistry>,
    scheduler: StreamScheduler,
    envelope: GainEnvelope,
    barge_in: BargeIn,
    state: SessionState,
    current_turn: Option<ConversationTurn>,
    mic_gate: Arc<AtomicBool>,
    configured: bool,
    /// The next response continues the current one after a tool result
    continuation_pending: bool,
    outbound: Option<mpsc::UnboundedSender<String>>,
    events: Sender<ConversationEvent>,
}

impl ConversationSession {
    pub fn new(
        config: ConversationConfig,
        instructions: String,
        parts: SessionParts,
        events: Sender<ConversationEvent>,
    ) -> Self {
        Self {
            config,
            instructions,
            credential: parts.credential,
            connector: parts.connector,
            microphone: parts.microphone,
            tools: parts.tools,
            scheduler: StreamScheduler::new(parts.sink),
            envelope: GainEnvelope::unity(),
            barge_in: BargeIn::Idle,
            state: SessionState::Connecting,
            current_turn: None,
            mic_gate: Arc::new(AtomicBool::new(false)),
            configured: false,
            continuation_pending: false,
            outbound: None,
            events,
        }
    }

    /// Start the session on `runtime`
    pub fn spawn(self, runtime: &tokio::runtime::Handle) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        runtime.spawn(self.run(rx));
        SessionHandle { commands: tx }
    }

    /// Connect and serve until stopped or a fatal error
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        self.emit(ConversationEvent::Status(ConnectionStatus::Connecting));
        self.set_state(SessionState::Connecting);

        let (mut inbound, mut mic_rx) = match self.connect().await {
            Ok(opened) => opened,
            Err(e) => {
                self.terminate(Some(e));
                return;
            }
        };

        let mut mic_live = true;
        let failure = loop {
            tokio::select! {
                message = inbound.next() => match message {
                    Some(Ok(text)) => {
                        if let Err(e) = self.on_message(&text).await {
                            break Some(e);
                        }
                    }
                    Some(Err(e)) => break Some(e),
                    None => break Some(ReadalongError::TransportError("Connection closed".into())),
                },
                frame = mic_rx.recv(), if mic_live => match frame {
                    Some(frame) => {
                        if let Err(e) = self.on_mic_frame(&frame) {
                            break Some(e);
                        }
                    }
                    None => {
                        warn!("Microphone stream ended");
                        mic_live = false;
                    }
                },
                command = commands.recv() => match command {
                    Some(SessionCommand::Stop) | None => {
                        info!("Stopping conversation");
                        break None;
                    }
                },
            }
        };

        self.terminate(failure);
    }

    async fn connect(
        &mut self,
    ) -> Result<(BoxStream<'static, Result<String>>, mpsc::Receiver<Vec<f32>>)> {
        let token = self.credential.issue().await?;
        debug!("Credential obtained");

        let mic_rx = self.microphone.open(Arc::clone(&self.mic_gate))?;

        let connection = self.connector.connect(&token).await?;
        self.outbound = Some(connection.outbound);

        self.set_state(SessionState::Configuring);
        self.send(&ClientEvent::SessionUpdate {
            event_id: crate::conversation::protocol::new_event_id(),
            session: self.settings(),
        })?;

        Ok((connection.inbound, mic_rx))
    }

    fn settings(&self) -> SessionSettings {
        let tools = self.tools.definitions();
        SessionSettings {
            modalities: vec!["text".to_string(), "audio".to_string()],
            instructions: self.instructions.clone(),
            voice: self.config.voice.clone(),
            input_audio_format: "pcm16".to_string(),
            output_audio_format: "pcm16".to_string(),
            turn_detection: TurnDetection {
                kind: "server_vad".to_string(),
                threshold: self.config.vad_threshold,
                prefix_padding_ms: self.config.vad_prefix_padding_ms,
                silence_duration_ms: self.config.vad_silence_duration_ms,
            },
            tool_choice: (!tools.is_empty()).then(|| "auto".to_string()),
            tools,
        }
    }

    async fn on_message(&mut self, text: &str) -> Result<()> {
        match ServerEvent::parse(text) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => {
                warn!("{}", e);
                self.emit(ConversationEvent::Error {
                    message: e.to_string(),
                    fatal: false,
                });
                Ok(())
            }
        }
    }

    /// Apply one server event. Errors returned here end the session.
    async fn handle_event(&mut self, event: ServerEvent) -> Result<()> {
        match event {
            ServerEvent::SessionCreated {} => {
                debug!("Session created");
            }

            ServerEvent::SessionUpdated {} => {
                if !self.configured {
                    self.configured = true;
                    info!("Session configured");
                    self.emit(ConversationEvent::Status(ConnectionStatus::Connected));
                    self.set_state(SessionState::Listening);
                    self.send(&ClientEvent::response_create())?;
                }
            }

            ServerEvent::ResponseCreated { response } => self.begin_turn(TurnId::new(response.id)),

            ServerEvent::AudioDelta { response_id, delta } => {
                self.on_audio(response_id.map(TurnId::new), &delta)
            }

            ServerEvent::SpeechStarted {} => {
                let now = self.scheduler.now();
                debug!("Listener started speaking");
                self.envelope
                    .ramp_to(GAIN_FLOOR, now, self.config.fade_out(), RampShape::Exponential);
                self.scheduler.sink().set_envelope(self.envelope);
                self.barge_in = BargeIn::FadingOut { since: now };
            }

            ServerEvent::SpeechStopped {} => {
                let now = self.scheduler.now();
                debug!("Listener stopped speaking");
                self.envelope
                    .ramp_to(1.0, now, self.config.fade_in(), RampShape::Linear);
                self.scheduler.sink().set_envelope(self.envelope);
                self.barge_in = BargeIn::Recovering { since: now };
            }

            ServerEvent::FunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
            } => {
                let resume = self.state;
                self.set_state(SessionState::ToolCallPending);
                info!("Tool call {} ({})", name, call_id);
                self.emit(ConversationEvent::ToolCalled {
                    name: name.clone(),
                    call_id: call_id.clone(),
                });

                let output = self.tools.invoke(&name, &arguments).await;
                self.send(&ClientEvent::function_output(call_id, &output))?;
                self.send(&ClientEvent::response_create())?;
                self.continuation_pending = true;
                self.set_state(resume);
            }

            ServerEvent::ResponseDone { response } => {
                if let Some(turn) = self.current_turn.as_mut() {
                    if (response.id.is_empty() || turn.id.as_str() == response.id)
                        && !turn.is_finished()
                    {
                        turn.status = TurnStatus::Complete;
                        let id = turn.id.clone();
                        self.emit(ConversationEvent::TurnFinished {
                            turn: id,
                            status: TurnStatus::Complete,
                        });
                    }
                }
                if self.state == SessionState::Speaking {
                    self.set_state(SessionState::Listening);
                }
            }

            ServerEvent::Error { error } => {
                let message = error_message(&error);
                warn!("Realtime error: {}", message);
                self.emit(ConversationEvent::Error {
                    message,
                    fatal: false,
                });
            }

            ServerEvent::Unknown => {
                trace!("Ignoring unhandled event");
            }
        }
        Ok(())
    }

    /// A new turn supersedes whatever is still playing, unless it continues
    /// the previous one after a tool result and the listener has not spoken
    fn begin_turn(&mut self, id: TurnId) {
        let now = self.scheduler.now();
        self.barge_in = self.barge_in.settle(now, self.config.fade_in());
        let continuation = std::mem::take(&mut self.continuation_pending);

        if continuation && !self.barge_in.is_ducked() {
            if let Some(mut previous) = self.current_turn.take() {
                debug!("Turn {} continues as {}, buffered audio kept", previous.id, id);
                if !previous.is_finished() {
                    previous.status = TurnStatus::Complete;
                    self.emit(ConversationEvent::TurnFinished {
                        turn: previous.id,
                        status: TurnStatus::Complete,
                    });
                }
            }
        } else if let Some(mut previous) = self.current_turn.take() {
            let status = previous.superseded_status();
            let stopped = self.scheduler.cancel_except(&id);
            self.scheduler.supersede(&previous.id);
            self.scheduler.reset_cursor(now);
            self.envelope.set(1.0);
            self.scheduler.sink().set_envelope(self.envelope);
            self.barge_in = BargeIn::Idle;
            debug!("Turn {} superseded, {} chunks stopped", previous.id, stopped);

            if previous.status != status {
                previous.status = status;
                self.emit(ConversationEvent::TurnFinished {
                    turn: previous.id,
                    status,
                });
            }
        }

        info!("Turn {} started", id);
        self.emit(ConversationEvent::TurnStarted(id.clone()));
        self.current_turn = Some(ConversationTurn::new(id));
    }

    fn on_audio(&mut self, response_id: Option<TurnId>, delta: &str) {
        let turn = match (response_id, self.current_turn.as_ref()) {
            (Some(id), _) => id,
            (None, Some(current)) => current.id.clone(),
            (None, None) => {
                debug!("Audio with no turn, dropping");
                return;
            }
        };
        if self.current_turn.as_ref().map(|t| &t.id) != Some(&turn) {
            debug!("Dropping audio for stale turn {}", turn);
            return;
        }

        let samples = match decode_frame(delta) {
            Ok(samples) => samples,
            Err(e) => {
                warn!("{}", e);
                self.emit(ConversationEvent::Error {
                    message: e.to_string(),
                    fatal: false,
                });
                return;
            }
        };

        let now = self.scheduler.now();
        self.barge_in = self.barge_in.settle(now, self.config.fade_in());

        if self
            .scheduler
            .schedule(&turn, samples, self.config.sample_rate)
            .is_none()
        {
            return;
        }

        if !self.mic_gate.swap(true, Ordering::SeqCst) {
            info!("First response audio scheduled, microphone live");
        }
        if let Some(current) = self.current_turn.as_mut() {
            current.status = TurnStatus::Speaking;
        }
        if self.state != SessionState::ToolCallPending {
            self.set_state(SessionState::Speaking);
        }
    }

    fn on_mic_frame(&mut self, frame: &[f32]) -> Result<()> {
        if !self.mic_gate.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.send(&ClientEvent::audio_append(encode_frame(frame)))
    }

    fn send(&self, event: &ClientEvent) -> Result<()> {
        let text = event.to_json()?;
        let outbound = self
            .outbound
            .as_ref()
            .ok_or_else(|| ReadalongError::TransportError("Not connected".into()))?;
        outbound
            .send(text)
            .map_err(|_| ReadalongError::TransportError("Connection closed".into()))
    }

    /// Release everything; safe to reach from any state
    fn terminate(&mut self, failure: Option<ReadalongError>) {
        self.mic_gate.store(false, Ordering::SeqCst);
        self.microphone.close();
        self.scheduler.stop_all();
        self.outbound = None;

        if let Some(e) = failure {
            error!("Conversation ended: {}", e);
            self.emit(ConversationEvent::Error {
                message: e.user_message(),
                fatal: true,
            });
        }

        if let Some(turn) = self.current_turn.take() {
            let status = turn.superseded_status();
            if turn.status != status {
                self.emit(ConversationEvent::TurnFinished {
                    turn: turn.id,
                    status,
                });
            }
        }

        self.set_state(SessionState::Terminated);
        self.emit(ConversationEvent::Status(ConnectionStatus::Idle));
        self.emit(ConversationEvent::Ended);
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state || state == SessionState::Connecting {
            debug!("Session state {:?} -> {:?}", self.state, state);
            self.state = state;
            self.emit(ConversationEvent::State(state));
        }
    }

    fn emit(&self, event: ConversationEvent) {
        if self.events.send(event).is_err() {
            trace!("No listener for conversation events");
        }
    }
}
