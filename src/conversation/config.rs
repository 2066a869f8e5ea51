//! Configuration for the voice companion

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the ephemeral token is presented to the realtime endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireAuth {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// Token carried in the WebSocket subprotocol list
    Subprotocol,
    /// `?token=<token>` for relays that forward to the model endpoint
    QueryToken,
}

/// Configuration for the conversation session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Realtime WebSocket endpoint
    pub realtime_url: String,

    /// Model requested from the endpoint
    pub model: String,

    pub auth: WireAuth,

    /// Endpoint issuing short-lived tokens
    pub credential_url: Option<String>,

    /// Authorization header value sent to the credential endpoint
    pub credential_auth: Option<String>,

    pub voice: String,

    /// PCM16 sample rate on the wire, both directions
    pub sample_rate: u32,

    /// Samples per microphone frame sent upstream
    pub mic_frame_size: usize,

    /// Server VAD activation threshold
    pub vad_threshold: f32,

    /// Audio kept before detected speech
    pub vad_prefix_padding_ms: u32,

    /// Silence that ends a listener turn
    pub vad_silence_duration_ms: u32,

    /// Duck response audio over this long when the listener starts talking
    pub fade_out_ms: u64,

    /// Restore response audio over this long when the listener stops
    pub fade_in_ms: u64,

    /// Listener's name, used to greet them
    pub listener_name: Option<String>,

    /// Opening of the companion's instructions
    pub persona: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            realtime_url: "wss://api.x.ai/v1/realtime".to_string(),
            model: "grok-beta".to_string(),
            auth: WireAuth::Bearer,
            credential_url: None,
            credential_auth: None,
            voice: "Leo".to_string(),
            sample_rate: 24000,
            mic_frame_size: 4096,
            vad_threshold: 0.5,
            vad_prefix_padding_ms: 300,
            vad_silence_duration_ms: 500,
            fade_out_ms: 400,
            fade_in_ms: 400,
            listener_name: None,
            persona: "You are a calm, thoughtful conversationalist. Speak softly, with warmth \
                      and patience. You are not in a hurry. Pauses are fine."
                .to_string(),
        }
    }
}

impl ConversationConfig {
    pub fn fade_out(&self) -> Duration {
        Duration::from_millis(self.fade_out_ms)
    }

    pub fn fade_in(&self) -> Duration {
        Duration::from_millis(self.fade_in_ms)
    }

    /// Set the listener's name
    pub fn with_listener(mut self, name: impl Into<String>) -> Self {
        self.listener_name = Some(name.into());
        self
    }

    /// Set the credential endpoint
    pub fn with_credential_url(mut self, url: impl Into<String>) -> Self {
        self.credential_url = Some(url.into());
        self
    }

    /// Set the realtime endpoint and how to authenticate against it
    pub fn with_endpoint(mut self, url: impl Into<String>, auth: WireAuth) -> Self {
        self.realtime_url = url.into();
        self.auth = auth;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.realtime_url.starts_with("ws://") || self.realtime_url.starts_with("wss://")) {
            return Err(format!("Realtime URL must be ws:// or wss://: {}", self.realtime_url));
        }
        if self.sample_rate == 0 {
            return Err("Sample rate must be greater than 0".to_string());
        }
        if self.mic_frame_size == 0 {
            return Err("Microphone frame size must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.vad_threshold) {
            return Err(format!("VAD threshold out of range: {}", self.vad_threshold));
        }
        Ok(())
    }
}
