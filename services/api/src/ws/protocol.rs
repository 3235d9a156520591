//! Defines the WebSocket message shapes exchanged with the browser client.
//!
//! The client protocol is not uniformly tagged: audio pushes and the
//! sentence/metadata notifications use their own top-level keys, while
//! control traffic rides a `type` tag. Synthesized audio itself travels as
//! raw binary frames and never appears here.

use serde::{Deserialize, Serialize};

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum ClientMessage {
    /// A batch of recorded audio chunks.
    Audio {
        #[serde(rename = "realtimeInput")]
        realtime_input: RealtimeInput,
    },
    /// Tagged control traffic (synthetic text input, interrupt).
    Control(ControlMessage),
    /// A setup/config handshake; only the language hint is interpreted.
    Setup { setup: SetupConfig },
    /// Any other well-formed JSON; logged and ignored.
    Other(serde_json::Value),
}

#[derive(Deserialize, Debug)]
pub struct RealtimeInput {
    #[serde(rename = "mediaChunks")]
    pub media_chunks: Vec<MediaChunk>,
}

#[derive(Deserialize, Debug)]
pub struct MediaChunk {
    #[serde(rename = "mimeType", default)]
    pub mime_type: Option<String>,
    /// Base64-encoded audio payload.
    pub data: String,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Text injected as if it were a finalized transcript (testing aid).
    #[serde(rename = "timer-message")]
    Timer { data: String },
    /// Cancels in-flight synthesis and clears client playback.
    #[serde(rename = "stop")]
    Stop,
}

#[derive(Deserialize, Debug, Default)]
pub struct SetupConfig {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum ServerMessage {
    Event(EventMessage),
    /// Per-sentence text notification emitted as the response streams.
    Sentence {
        #[serde(rename = "groqSentence")]
        sentence: String,
    },
    /// Backend diagnostic metadata passthrough.
    Metadata { metadata: serde_json::Value },
}

/// The `type`-tagged outbound envelopes.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventMessage {
    Connection { message: String },
    Error { message: String },
    Transcription { data: String },
    LlmText { data: String },
    ClearPlayback { message: String },
}

impl ServerMessage {
    pub fn connection(message: impl Into<String>) -> Self {
        ServerMessage::Event(EventMessage::Connection {
            message: message.into(),
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Event(EventMessage::Error {
            message: message.into(),
        })
    }

    pub fn transcription(data: impl Into<String>) -> Self {
        ServerMessage::Event(EventMessage::Transcription { data: data.into() })
    }

    pub fn llm_text(data: impl Into<String>) -> Self {
        ServerMessage::Event(EventMessage::LlmText { data: data.into() })
    }

    pub fn clear_playback(message: impl Into<String>) -> Self {
        ServerMessage::Event(EventMessage::ClearPlayback {
            message: message.into(),
        })
    }

    pub fn sentence(sentence: impl Into<String>) -> Self {
        ServerMessage::Sentence {
            sentence: sentence.into(),
        }
    }

    pub fn metadata(metadata: serde_json::Value) -> Self {
        ServerMessage::Metadata { metadata }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_audio_push() {
        let raw = r#"{"realtimeInput":{"mediaChunks":[{"mimeType":"audio/pcm;rate=16000","data":"AAAA"}]}}"#;
        match serde_json::from_str::<ClientMessage>(raw).unwrap() {
            ClientMessage::Audio { realtime_input } => {
                assert_eq!(realtime_input.media_chunks.len(), 1);
                assert_eq!(realtime_input.media_chunks[0].data, "AAAA");
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn parses_control_messages() {
        match serde_json::from_str::<ClientMessage>(r#"{"type":"timer-message","data":"hi."}"#) {
            Ok(ClientMessage::Control(ControlMessage::Timer { data })) => assert_eq!(data, "hi."),
            other => panic!("unexpected parse: {other:?}"),
        }
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"stop"}"#),
            Ok(ClientMessage::Control(ControlMessage::Stop))
        ));
    }

    #[test]
    fn parses_setup_with_language_hint() {
        let raw = r#"{"setup":{"language":"es","model":"whatever"}}"#;
        match serde_json::from_str::<ClientMessage>(raw).unwrap() {
            ClientMessage::Setup { setup } => {
                assert_eq!(setup.language.as_deref(), Some("es"));
                assert!(setup.extra.contains_key("model"));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn unknown_json_falls_through_to_other() {
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"later-feature","x":1}"#),
            Ok(ClientMessage::Other(_))
        ));
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"contents":[{"parts":[]}]}"#),
            Ok(ClientMessage::Other(_))
        ));
    }

    #[test]
    fn serializes_tagged_envelopes() {
        let json = serde_json::to_value(ServerMessage::error("boom")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "error", "message": "boom"}));

        let json = serde_json::to_value(ServerMessage::llm_text("full text")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "llm-text", "data": "full text"}));

        let json = serde_json::to_value(ServerMessage::clear_playback("stopped")).unwrap();
        assert_eq!(json["type"], "clear-playback");
    }

    #[test]
    fn serializes_sentence_and_metadata_shapes() {
        let json = serde_json::to_value(ServerMessage::sentence("One moment.")).unwrap();
        assert_eq!(json, serde_json::json!({"groqSentence": "One moment."}));

        let json =
            serde_json::to_value(ServerMessage::metadata(serde_json::json!({"request_id": 7})))
                .unwrap();
        assert_eq!(json, serde_json::json!({"metadata": {"request_id": 7}}));
    }
}
