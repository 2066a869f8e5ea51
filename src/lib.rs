pub mod audio;
pub mod content;
pub mod conversation;
pub mod integration;
pub mod sync;
pub mod timing;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadalongError {
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Credential error: {0}")]
    CredentialError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    #[error("Audio processing error: {0}")]
    AudioProcessingError(String),

    #[error("Playback error: {0}")]
    PlaybackError(String),

    #[error("IO error: {0}")]
    IOError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl From<std::io::Error> for ReadalongError {
    fn from(e: std::io::Error) -> Self {
        ReadalongError::IOError(e.to_string())
    }
}

impl From<serde_json::Error> for ReadalongError {
    fn from(e: serde_json::Error) -> Self {
        ReadalongError::ProtocolError(e.to_string())
    }
}

impl ReadalongError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Missing timing degrades to no highlighting
            ReadalongError::ResourceUnavailable(_) => true,
            // The user has to grant access and start again
            ReadalongError::PermissionDenied(_) => false,
            ReadalongError::CredentialError(_) => false,
            ReadalongError::TransportError(_) => false,
            // The remote reported a problem but the connection is still usable
            ReadalongError::ProtocolError(_) => true,
            ReadalongError::ToolError(_) => true,
            ReadalongError::AudioDeviceError(_) => false,
            ReadalongError::AudioProcessingError(_) => true,
            ReadalongError::PlaybackError(_) => true,
            ReadalongError::IOError(_) => false,
            ReadalongError::ConfigError(_) => false,
            ReadalongError::ChannelError(_) => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            ReadalongError::ResourceUnavailable(_) => {
                "Word highlighting is unavailable for this section.".to_string()
            }
            ReadalongError::PermissionDenied(_) => {
                "Microphone access was denied. Allow access and start the conversation again."
                    .to_string()
            }
            ReadalongError::CredentialError(_) => {
                "Could not authorise the voice companion. Please try again.".to_string()
            }
            ReadalongError::TransportError(_) => {
                "Lost connection to the voice companion.".to_string()
            }
            ReadalongError::ProtocolError(_) => {
                "The voice companion reported a problem.".to_string()
            }
            ReadalongError::ToolError(_) => "A companion action failed.".to_string(),
            ReadalongError::AudioDeviceError(_) => {
                "Audio device error. Please check your microphone/speakers.".to_string()
            }
            ReadalongError::AudioProcessingError(_) => {
                "Audio processing failed. Please try again.".to_string()
            }
            ReadalongError::PlaybackError(_) => "Narration playback failed.".to_string(),
            ReadalongError::IOError(_) => "File system error occurred.".to_string(),
            ReadalongError::ConfigError(_) => {
                "Configuration error. Please check settings.".to_string()
            }
            ReadalongError::ChannelError(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ReadalongError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_aborting_errors_are_not_recoverable() {
        assert!(!ReadalongError::PermissionDenied("mic".into()).is_recoverable());
        assert!(!ReadalongError::CredentialError("token".into()).is_recoverable());
        assert!(!ReadalongError::TransportError("closed".into()).is_recoverable());
    }

    #[test]
    fn test_degraded_errors_are_recoverable() {
        assert!(ReadalongError::ResourceUnavailable("timing".into()).is_recoverable());
        assert!(ReadalongError::ProtocolError("bad event".into()).is_recoverable());
        assert!(ReadalongError::ToolError("handler".into()).is_recoverable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ReadalongError = io.into();
        assert!(matches!(err, ReadalongError::IOError(_)));
        assert!(!err.user_message().is_empty());
    }
}
