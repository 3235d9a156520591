//! Deepgram adapters: live transcription over WebSocket, speech synthesis
//! over streaming HTTP.

use super::{AudioStream, SttBackend, SttEvent, SttParams, SttStream, TranscriptEvent, TtsBackend};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt, TryStreamExt, stream::SplitSink};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{debug, info, warn};

// --- Local Deepgram wire types (for encapsulation) ---
mod listen_types {
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    #[serde(tag = "type")]
    pub(super) enum ListenMessage {
        Results(ListenResults),
        Metadata(serde_json::Map<String, serde_json::Value>),
        #[serde(other)]
        Ignored,
    }

    #[derive(Deserialize, Debug)]
    pub(super) struct ListenResults {
        #[serde(default)]
        pub is_final: bool,
        pub channel: ListenChannel,
    }

    #[derive(Deserialize, Debug)]
    pub(super) struct ListenChannel {
        pub alternatives: Vec<ListenAlternative>,
    }

    #[derive(Deserialize, Debug)]
    pub(super) struct ListenAlternative {
        pub transcript: String,
        #[serde(default)]
        pub confidence: f32,
    }
}

const KEEPALIVE_FRAME: &str = r#"{"type":"KeepAlive"}"#;
const CLOSE_FRAME: &str = r#"{"type":"CloseStream"}"#;

/// Shared client for both Deepgram products: `listen` (STT) and `speak`
/// (TTS).
pub struct DeepgramBackend {
    api_key: String,
    speak_model: String,
    http: reqwest::Client,
}

impl DeepgramBackend {
    pub fn new(api_key: String, speak_model: String) -> Self {
        Self {
            api_key,
            speak_model,
            http: reqwest::Client::new(),
        }
    }
}

fn listen_url(params: &SttParams) -> String {
    format!(
        "wss://api.deepgram.com/v1/listen?model={}&language={}&encoding=linear16&sample_rate={}&channels=1&punctuate=true&smart_format=true&interim_results=true",
        params.model, params.language, params.sample_rate
    )
}

fn speak_url(model: &str) -> String {
    format!("https://api.deepgram.com/v1/speak?model={model}&encoding=linear16&sample_rate=24000")
}

fn parse_listen_frame(text: &str) -> Option<SttEvent> {
    match serde_json::from_str::<listen_types::ListenMessage>(text) {
        Ok(listen_types::ListenMessage::Results(results)) => {
            let alternative = results.channel.alternatives.into_iter().next()?;
            if alternative.transcript.is_empty() {
                return None;
            }
            Some(SttEvent::Transcript(TranscriptEvent {
                text: alternative.transcript,
                is_final: results.is_final,
                confidence: alternative.confidence,
                timestamp: Utc::now(),
            }))
        }
        Ok(listen_types::ListenMessage::Metadata(meta)) => {
            Some(SttEvent::Metadata(serde_json::Value::Object(meta)))
        }
        Ok(listen_types::ListenMessage::Ignored) => None,
        Err(e) => {
            debug!(error = ?e, "Ignoring unrecognized transcription frame");
            None
        }
    }
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>, WsMessage>;

struct DeepgramListenStream {
    sink: WsSink,
}

#[async_trait]
impl SttStream for DeepgramListenStream {
    async fn send_audio(&mut self, audio: Bytes) -> Result<()> {
        self.sink.send(WsMessage::Binary(audio)).await?;
        Ok(())
    }

    async fn keepalive(&mut self) -> Result<()> {
        self.sink.send(WsMessage::Text(KEEPALIVE_FRAME.into())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.sink.send(WsMessage::Text(CLOSE_FRAME.into())).await;
        let _ = self.sink.close().await;
    }
}

#[async_trait]
impl SttBackend for DeepgramBackend {
    async fn open(
        &self,
        params: &SttParams,
    ) -> Result<(Box<dyn SttStream>, mpsc::Receiver<SttEvent>)> {
        let mut request = listen_url(params).into_client_request()?;
        request
            .headers_mut()
            .insert("Authorization", format!("Token {}", self.api_key).parse()?);

        let (ws_stream, _) = connect_async(request)
            .await
            .context("Failed to connect to Deepgram live transcription")?;
        info!(model = %params.model, "Connected to Deepgram live transcription.");
        let (sink, mut read) = ws_stream.split();

        let (event_tx, event_rx) = mpsc::channel(64);
        tokio::spawn(async move {
            loop {
                match read.next().await {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Some(event) = parse_listen_frame(&text) {
                            if event_tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        info!(?frame, "Transcription socket closed by server.");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Error reading from the transcription socket");
                        let _ = event_tx.send(SttEvent::Error(e.to_string())).await;
                        return;
                    }
                    None => break,
                }
            }
            let _ = event_tx.send(SttEvent::Closed).await;
        });

        Ok((Box::new(DeepgramListenStream { sink }), event_rx))
    }
}

#[async_trait]
impl TtsBackend for DeepgramBackend {
    async fn synthesize(&self, text: &str) -> Result<AudioStream> {
        debug!(model = %self.speak_model, text_len = text.len(), "Starting speech synthesis stream");
        let resp = self
            .http
            .post(speak_url(&self.speak_model))
            .header("Authorization", format!("Token {}", self.api_key))
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("speech synthesis request failed with {status}: {body}");
        }

        Ok(resp.bytes_stream().map_err(anyhow::Error::from).boxed())
    }
}
