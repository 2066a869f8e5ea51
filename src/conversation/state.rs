use crate::audio::TurnId;
use serde::Serialize;
use std::time::Duration;

/// Lifecycle of a conversation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// Fetching the credential, opening the microphone and the wire
    Connecting,
    /// Session settings sent, waiting for the remote to apply them
    Configuring,
    Listening,
    /// Response audio is being scheduled
    Speaking,
    /// A tool call is being answered
    ToolCallPending,
    Terminated,
}

/// What the host shows for the companion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Connected,
}

impl SessionState {
    pub fn connection_status(&self) -> ConnectionStatus {
        match self {
            SessionState::Connecting | SessionState::Configuring => ConnectionStatus::Connecting,
            SessionState::Terminated => ConnectionStatus::Idle,
            _ => ConnectionStatus::Connected,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Terminated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TurnStatus {
    /// Created, no audio yet
    Pending,
    Speaking,
    /// Superseded while audio was still arriving or playing
    Interrupted,
    Complete,
}

/// One model response
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub id: TurnId,
    pub status: TurnStatus,
}

impl ConversationTurn {
    pub fn new(id: TurnId) -> Self {
        Self {
            id,
            status: TurnStatus::Pending,
        }
    }

    /// Final status when a newer turn takes over
    pub fn superseded_status(&self) -> TurnStatus {
        match self.status {
            TurnStatus::Speaking => TurnStatus::Interrupted,
            TurnStatus::Pending | TurnStatus::Complete => TurnStatus::Complete,
            TurnStatus::Interrupted => TurnStatus::Interrupted,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, TurnStatus::Interrupted | TurnStatus::Complete)
    }
}

/// Output ducking while the listener talks over the companion
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BargeIn {
    Idle,
    FadingOut { since: Duration },
    Recovering { since: Duration },
}

impl BargeIn {
    /// Collapse a finished recovery back to idle
    pub fn settle(self, now: Duration, fade_in: Duration) -> Self {
        match self {
            BargeIn::Recovering { since } if now >= since + fade_in => BargeIn::Idle,
            other => other,
        }
    }

    /// Output is below full gain because the listener talked
    pub fn is_ducked(&self) -> bool {
        !matches!(self, BargeIn::Idle)
    }
}
