//! Wire shapes for the `/ws/chat` protocol (spec.md §6.1), concretized as
//! `serde`-tagged enums the way the teacher's `skynet-protocol` crate
//! shapes its own req/res/event envelopes — except this protocol has no
//! generic RPC envelope, so each message tags on `type` directly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ListenState {
    Start,
    Stop,
    Detect,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioParams {
    pub format: String,
    pub sample_rate: u32,
    pub channels: u8,
    pub frame_duration: u32,
}

impl AudioParams {
    /// The fixed opus/24kHz/mono/60ms shape the server always replies
    /// with on `hello` (spec.md §4.4/§6.1), regardless of what the client
    /// proposed.
    pub fn server_default() -> Self {
        Self {
            format: "opus".to_string(),
            sample_rate: 24_000,
            channels: 1,
            frame_duration: 60,
        }
    }
}

/// Inbound client -> server messages (spec.md §6.1). Binary frames are
/// handled separately by the connection loop, not through this enum.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Hello {
        version: u32,
        transport: String,
        #[serde(default)]
        audio_params: Option<AudioParams>,
    },
    Listen {
        #[serde(default)]
        session_id: Option<String>,
        state: ListenState,
        #[serde(default)]
        mode: Option<String>,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        agent_id: Option<i64>,
    },
    Text {
        #[serde(default)]
        session_id: Option<String>,
        content: String,
        agent_id: i64,
    },
    Abort {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    },
    Mcp {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        payload: Value,
    },
}

/// Outbound server -> client messages (spec.md §6.1). Binary TTS frames
/// are sent directly as WS binary frames, not wrapped in this enum.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Hello {
        transport: String,
        audio_params: AudioParams,
    },
    Tts {
        state: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Llm {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        emotion: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        finished: Option<bool>,
    },
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
}

impl OutboundMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        OutboundMessage::Error {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("outbound message serialization is infallible")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_message() {
        let raw = r#"{"type":"text","agent_id":7,"content":"hello"}"#;
        let msg: InboundMessage = serde_json::from_str(raw).unwrap();
        match msg {
            InboundMessage::Text { agent_id, content, session_id } => {
                assert_eq!(agent_id, 7);
                assert_eq!(content, "hello");
                assert!(session_id.is_none());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn parses_listen_start_without_optional_fields() {
        let raw = r#"{"type":"listen","state":"start"}"#;
        let msg: InboundMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            msg,
            InboundMessage::Listen { state: ListenState::Start, .. }
        ));
    }

    #[test]
    fn llm_message_omits_absent_fields() {
        let msg = OutboundMessage::Llm {
            content: Some("hi".to_string()),
            emotion: None,
            finished: None,
        };
        let json = msg.to_json();
        assert!(json.contains("\"content\":\"hi\""));
        assert!(!json.contains("emotion"));
        assert!(!json.contains("finished"));
    }

    #[test]
    fn llm_finished_message_carries_no_content() {
        let msg = OutboundMessage::Llm {
            content: None,
            emotion: None,
            finished: Some(true),
        };
        let json = msg.to_json();
        assert!(json.contains("\"finished\":true"));
        assert!(!json.contains("content"));
    }

    #[test]
    fn server_audio_params_are_fixed() {
        let params = AudioParams::server_default();
        assert_eq!(params.format, "opus");
        assert_eq!(params.sample_rate, 24_000);
        assert_eq!(params.channels, 1);
        assert_eq!(params.frame_duration, 60);
    }
}
