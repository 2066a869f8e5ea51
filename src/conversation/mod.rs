//! Realtime voice companion
//!
//! The session connects with a short-lived credential, streams the
//! microphone up as PCM16, schedules response audio gaplessly, ducks it
//! when the listener talks over it and answers tool calls against the
//! article catalog.

pub mod config;
pub mod credential;
pub mod instructions;
pub mod protocol;
pub mod session;
pub mod state;
pub mod tools;
pub mod transport;

pub use config::{ConversationConfig, WireAuth};
pub use credential::{CredentialIssuer, HttpCredentialIssuer, StaticCredential};
pub use instructions::{build_instructions, first_name};
pub use protocol::{ClientEvent, ServerEvent, ToolDefinition};
pub use session::{
    ConversationEvent, ConversationSession, SessionCommand, SessionHandle, SessionParts,
};
pub use state::{BargeIn, ConnectionStatus, ConversationTurn, SessionState, TurnStatus};
pub use tools::{article_tools, ToolRegistry};
pub use transport::{LoopbackConnector, RemoteEnd, WebSocketConnector, WireConnection, WireConnector};
