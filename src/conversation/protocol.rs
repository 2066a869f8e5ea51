//! Realtime wire messages
//!
//! Every message is a JSON text frame tagged by `type`. Inbound types we do
//! not act on deserialize to `ServerEvent::Unknown`.

use crate::{ReadalongError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub fn new_event_id() -> String {
    format!("evt_{}", Uuid::new_v4().simple())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: String,
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSettings {
    pub modalities: Vec<String>,
    pub instructions: String,
    pub voice: String,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub turn_detection: TurnDetection,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ConversationItem {
    #[serde(rename = "function_call_output")]
    FunctionCallOutput { call_id: String, output: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate {
        event_id: String,
        session: SessionSettings,
    },

    #[serde(rename = "input_audio_buffer.append")]
    InputAudioAppend { event_id: String, audio: String },

    #[serde(rename = "response.create")]
    ResponseCreate { event_id: String },

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        event_id: String,
        item: ConversationItem,
    },
}

impl ClientEvent {
    pub fn response_create() -> Self {
        ClientEvent::ResponseCreate {
            event_id: new_event_id(),
        }
    }

    pub fn audio_append(audio: String) -> Self {
        ClientEvent::InputAudioAppend {
            event_id: new_event_id(),
            audio,
        }
    }

    pub fn function_output(call_id: impl Into<String>, output: &Value) -> Self {
        ClientEvent::ConversationItemCreate {
            event_id: new_event_id(),
            item: ConversationItem::FunctionCallOutput {
                call_id: call_id.into(),
                output: output.to_string(),
            },
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResponseInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated {},

    #[serde(rename = "session.updated")]
    SessionUpdated {},

    /// A new model turn begins
    #[serde(rename = "response.created")]
    ResponseCreated { response: ResponseInfo },

    #[serde(rename = "response.output_audio.delta", alias = "response.audio.delta")]
    AudioDelta {
        #[serde(default)]
        response_id: Option<String>,
        delta: String,
    },

    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {},

    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {},

    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: String,
    },

    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: ResponseInfo,
    },

    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: Value,
    },

    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| ReadalongError::ProtocolError(format!("Malformed message: {}", e)))
    }
}

/// Human-readable text of an `error` payload, which may be an object or a string
pub fn error_message(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        Value::Null => "Unknown error".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_create_shape() {
        let value: Value = serde_json::from_str(&ClientEvent::response_create().to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "response.create");
        assert!(value["event_id"].as_str().unwrap().starts_with("evt_"));
    }

    #[test]
    fn test_function_output_is_json_string() {
        let event = ClientEvent::function_output("call_1", &json!({"success": true}));
        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "conversation.item.create");
        assert_eq!(value["item"]["type"], "function_call_output");
        assert_eq!(value["item"]["call_id"], "call_1");
        assert_eq!(value["item"]["output"], "{\"success\":true}");
    }

    #[test]
    fn test_audio_delta_both_names() {
        let a = ServerEvent::parse(r#"{"type":"response.output_audio.delta","response_id":"r1","delta":"AAA="}"#).unwrap();
        let b = ServerEvent::parse(r#"{"type":"response.audio.delta","response_id":"r1","delta":"AAA=","item_id":"x"}"#).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unknown_type_ignored() {
        let event = ServerEvent::parse(r#"{"type":"rate_limits.updated","rate_limits":[]}"#).unwrap();
        assert_eq!(event, ServerEvent::Unknown);
    }

    #[test]
    fn test_extra_fields_on_known_type() {
        let event = ServerEvent::parse(
            r#"{"type":"session.updated","event_id":"e","session":{"voice":"Leo"}}"#,
        )
        .unwrap();
        assert_eq!(event, ServerEvent::SessionUpdated {});
    }

    #[test]
    fn test_malformed_is_protocol_error() {
        assert!(matches!(
            ServerEvent::parse("not json"),
            Err(ReadalongError::ProtocolError(_))
        ));
        assert!(ServerEvent::parse(r#"{"type":"response.created"}"#).is_err());
    }

    #[test]
    fn test_error_message_variants() {
        assert_eq!(error_message(&json!({"message": "bad", "code": 1})), "bad");
        assert_eq!(error_message(&json!("relay down")), "relay down");
        assert_eq!(error_message(&Value::Null), "Unknown error");
    }
}
