//! End-to-end exercises of the voice session over a real WebSocket, with
//! scripted stand-ins for the three streaming backends.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as TMessage;
use tracing::Level;
use voxbridge_api::backend::{
    AudioStream, SttBackend, SttEvent, SttParams, SttStream, TranscriptEvent, TtsBackend,
};
use voxbridge_api::config::Config;
use voxbridge_api::router::create_router;
use voxbridge_api::state::AppState;
use voxbridge_core::llm_client::{ChatTurn, LlmClient, TokenStream};

fn transcript(text: &str, is_final: bool) -> SttEvent {
    SttEvent::Transcript(TranscriptEvent {
        text: text.into(),
        is_final,
        confidence: 0.95,
        timestamp: Utc::now(),
    })
}

/// One scripted recognizer connection.
struct SttScript {
    /// Hold the script until the first audio frame arrives.
    wait_for_audio: bool,
    events: Vec<SttEvent>,
}

struct FakeStt {
    scripts: Mutex<VecDeque<SttScript>>,
    opens: AtomicUsize,
}

impl FakeStt {
    fn new(scripts: Vec<SttScript>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            opens: AtomicUsize::new(0),
        })
    }
}

struct FakeSttStream {
    audio_tx: mpsc::Sender<Bytes>,
}

#[async_trait]
impl SttStream for FakeSttStream {
    async fn send_audio(&mut self, audio: Bytes) -> Result<()> {
        self.audio_tx
            .send(audio)
            .await
            .map_err(|_| anyhow!("recognizer gone"))
    }

    async fn keepalive(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) {}
}

#[async_trait]
impl SttBackend for FakeStt {
    async fn open(
        &self,
        _params: &SttParams,
    ) -> Result<(Box<dyn SttStream>, mpsc::Receiver<SttEvent>)> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted connection left"))?;

        let (event_tx, event_rx) = mpsc::channel(16);
        let (audio_tx, mut audio_rx) = mpsc::channel::<Bytes>(16);
        tokio::spawn(async move {
            if script.wait_for_audio && audio_rx.recv().await.is_none() {
                return;
            }
            for event in script.events {
                if event_tx.send(event).await.is_err() {
                    return;
                }
            }
            // Keep the connection open while the session lives.
            while audio_rx.recv().await.is_some() {}
        });
        Ok((Box::new(FakeSttStream { audio_tx }), event_rx))
    }
}

struct FakeLlm {
    tokens: Vec<&'static str>,
    calls: AtomicUsize,
    turns_seen: Mutex<Vec<Vec<ChatTurn>>>,
}

impl FakeLlm {
    fn new(tokens: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            tokens,
            calls: AtomicUsize::new(0),
            turns_seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn stream_chat(
        &self,
        _system_prompt: String,
        _summary: String,
        turns: Vec<ChatTurn>,
        _utterance: String,
    ) -> Result<TokenStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.turns_seen.lock().unwrap().push(turns);
        let items: Vec<Result<String>> = self.tokens.iter().map(|t| Ok(t.to_string())).collect();
        Ok(Box::pin(futures_util::stream::iter(items)))
    }

    async fn summarize(&self, _prior_summary: String, _turns: Vec<ChatTurn>) -> Result<String> {
        Ok(String::new())
    }
}

/// Emits one audio chunk that names the sentence it spoke.
struct FakeTts;

#[async_trait]
impl TtsBackend for FakeTts {
    async fn synthesize(&self, text: &str) -> Result<AudioStream> {
        let payload = Bytes::from(format!("audio:{text}"));
        Ok(futures_util::stream::iter(vec![Ok(payload)]).boxed())
    }
}

fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        deepgram_api_key: "unused".into(),
        groq_api_key: "unused".into(),
        chat_model: "scripted".into(),
        summary_model: "scripted".into(),
        listen_model: "nova-3".into(),
        speak_model: "aura-2-thalia-en".into(),
        listen_sample_rate: 24000,
        language: "en".into(),
        audio_queue_capacity: 8,
        backpressure_warn: Duration::from_millis(200),
        keepalive_interval: Duration::from_secs(10),
        keepalive_max_failures: 3,
        reconnect_base: Duration::from_millis(10),
        reconnect_cap: Duration::from_millis(100),
        utterance_gate: Duration::from_millis(300),
        memory_token_budget: 1000,
        system_prompt: "be brief".into(),
        log_level: Level::INFO,
    }
}

async fn spawn_app(
    stt: Arc<dyn SttBackend>,
    llm: Arc<dyn LlmClient>,
    tts: Arc<dyn TtsBackend>,
) -> SocketAddr {
    let config = test_config();
    let state = Arc::new(AppState {
        system_prompt: Arc::new(config.system_prompt.clone()),
        config: Arc::new(config),
        stt,
        llm,
        tts,
    });
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

type WsClient = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("WebSocket connect failed");
    ws
}

async fn recv(ws: &mut WsClient) -> TMessage {
    tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for a server message")
        .expect("connection closed")
        .expect("transport error")
}

async fn recv_json(ws: &mut WsClient) -> serde_json::Value {
    match recv(ws).await {
        TMessage::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

/// Reads frames until the full response text arrives, skipping audio.
async fn wait_for_response_text(ws: &mut WsClient) -> String {
    loop {
        if let TMessage::Text(text) = recv(ws).await {
            let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
            assert_ne!(value["type"], "error", "unexpected error event: {value}");
            if value["type"] == "llm-text" {
                return value["data"].as_str().unwrap().to_string();
            }
        }
    }
}

fn audio_push() -> TMessage {
    TMessage::Text(
        r#"{"realtimeInput":{"mediaChunks":[{"mimeType":"audio/pcm;rate=24000","data":"AAAA"}]}}"#
            .into(),
    )
}

fn timer_message(text: &str) -> TMessage {
    TMessage::Text(
        serde_json::json!({"type": "timer-message", "data": text})
            .to_string()
            .into(),
    )
}

#[tokio::test]
async fn voice_loop_end_to_end() {
    let stt = FakeStt::new(vec![SttScript {
        wait_for_audio: true,
        events: vec![
            transcript("Hello, how", false),
            transcript("Hello, how are you?", true),
        ],
    }]);
    let llm = FakeLlm::new(vec!["Hi", " there", ". All", " good."]);
    let tts = Arc::new(FakeTts);
    let addr = spawn_app(stt.clone(), llm.clone(), tts).await;

    let mut ws = connect(addr).await;
    let greeting = recv_json(&mut ws).await;
    assert_eq!(greeting["type"], "connection");

    // Push audio; the scripted recognizer answers with a partial and then a
    // final transcript.
    ws.send(audio_push()).await.unwrap();

    let mut transcriptions = Vec::new();
    let mut sentences = Vec::new();
    let mut audio = Vec::new();
    let mut full_text = None;
    while full_text.is_none() || audio.len() < 2 {
        match recv(&mut ws).await {
            TMessage::Text(text) => {
                let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                if let Some(sentence) = value.get("groqSentence") {
                    sentences.push(sentence.as_str().unwrap().to_string());
                } else if value["type"] == "transcription" {
                    transcriptions.push(value["data"].as_str().unwrap().to_string());
                } else if value["type"] == "llm-text" {
                    full_text = Some(value["data"].as_str().unwrap().to_string());
                } else if value["type"] == "error" {
                    panic!("unexpected error event: {value}");
                }
            }
            TMessage::Binary(payload) => audio.push(payload),
            _ => {}
        }
    }

    // One advisory partial plus one final transcript.
    assert_eq!(
        transcriptions,
        vec!["Hello, how".to_string(), "Hello, how are you?".to_string()]
    );
    // Exactly one generation call for the finalized utterance.
    assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    assert!(llm.turns_seen.lock().unwrap()[0].is_empty());

    assert_eq!(sentences, vec!["Hi there.".to_string(), "All good.".to_string()]);
    assert_eq!(full_text.as_deref(), Some("Hi there. All good."));

    // Audio arrives in sentence order, matching the spoken sentences.
    assert_eq!(audio[0].as_ref(), b"audio:Hi there.");
    assert_eq!(audio[1].as_ref(), b"audio:All good.");

    // A follow-up utterance sees exactly one remembered turn.
    ws.send(timer_message("Thanks, that helps a lot.")).await.unwrap();
    wait_for_response_text(&mut ws).await;
    let turns = llm.turns_seen.lock().unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].len(), 2, "one user/assistant pair remembered");
    assert_eq!(turns[1][0].content, "Hello, how are you?");
    assert_eq!(turns[1][1].content, "Hi there. All good.");
}

#[tokio::test]
async fn transcription_resumes_after_backend_drop() {
    let stt = FakeStt::new(vec![
        SttScript {
            wait_for_audio: true,
            events: vec![transcript("I like it.", true), SttEvent::Closed],
        },
        SttScript {
            wait_for_audio: false,
            events: vec![transcript("You got it.", true)],
        },
    ]);
    let llm = FakeLlm::new(vec!["Ok."]);
    let tts = Arc::new(FakeTts);
    let addr = spawn_app(stt.clone(), llm.clone(), tts).await;

    let mut ws = connect(addr).await;
    recv_json(&mut ws).await; // greeting

    ws.send(audio_push()).await.unwrap();

    let mut transcriptions = Vec::new();
    while transcriptions.len() < 2 {
        if let TMessage::Text(text) = recv(&mut ws).await {
            let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
            if value["type"] == "transcription" {
                transcriptions.push(value["data"].as_str().unwrap().to_string());
            }
        }
    }

    // Both transcripts arrived on the same client connection, across the
    // recognizer drop and reconnect.
    assert_eq!(transcriptions, vec!["I like it.".to_string(), "You got it.".to_string()]);
    assert_eq!(stt.opens.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stop_is_idempotent_over_the_wire() {
    let stt = FakeStt::new(vec![SttScript {
        wait_for_audio: true,
        events: vec![],
    }]);
    let llm = FakeLlm::new(vec!["Ok."]);
    let tts = Arc::new(FakeTts);
    let addr = spawn_app(stt, llm, tts).await;

    let mut ws = connect(addr).await;
    recv_json(&mut ws).await; // greeting

    ws.send(TMessage::Text(r#"{"type":"stop"}"#.into())).await.unwrap();
    ws.send(TMessage::Text(r#"{"type":"stop"}"#.into())).await.unwrap();

    // Each stop is acknowledged with a clear-playback event; neither raises
    // an error nor any audio.
    let first = recv_json(&mut ws).await;
    assert_eq!(first["type"], "clear-playback");
    let second = recv_json(&mut ws).await;
    assert_eq!(second["type"], "clear-playback");

    // The session is still healthy afterwards.
    ws.send(timer_message("Tell me something nice.")).await.unwrap();
    let response = wait_for_response_text(&mut ws).await;
    assert_eq!(response, "Ok.");
}
