//! Manages the WebSocket connection lifecycle for one voice session.
//!
//! Each client connection gets its own session task and its own backend
//! legs: a transcription supervisor, at most one in-flight response
//! generation, and a synthesis dispatcher. All backend events funnel back
//! through this task, which is the only writer on the client socket, so
//! outbound envelopes and audio frames are naturally serialized.

use crate::audio;
use crate::state::AppState;
use crate::ws::generate::{self, GenerationContext, GenerationEvent};
use crate::ws::protocol::{ClientMessage, ControlMessage, ServerMessage};
use crate::ws::synth::{self, DeliveryEvent, SynthesisHandle};
use crate::ws::transcribe::{self, SttSessionEvent, TranscriptionHandle, TranscriptionTuning};
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use bytes::Bytes;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use voxbridge_core::completeness::{self, Language};
use voxbridge_core::memory::ConversationMemory;

/// Lifecycle of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionPhase {
    /// Client connected; no backend connections yet.
    Initializing,
    /// First inbound message seen; transcription leg is open.
    Active,
    /// Client disconnect observed; tearing down.
    Closing,
    /// All backend resources released.
    Closed,
}

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Entry point for an individual WebSocket connection.
#[instrument(name = "voice_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4();
    tracing::Span::current().record("session_id", &session_id.to_string());
    info!("Client connected");

    let (sink, socket_rx) = socket.split();

    let (stt_event_tx, stt_event_rx) = mpsc::channel(64);
    let (gen_event_tx, gen_event_rx) = mpsc::channel(64);
    let (delivery_tx, delivery_rx) = mpsc::channel(64);
    let (synth_handle, synth_task) = synth::spawn(state.tts.clone(), delivery_tx);

    let language_hint = Language::parse(&state.config.language);
    let memory = Arc::new(Mutex::new(ConversationMemory::new(
        state.config.memory_token_budget,
    )));

    let mut session = Session {
        id: session_id,
        app: state,
        phase: SessionPhase::Initializing,
        sink,
        language_hint,
        memory,
        stt_event_tx,
        transcription: None,
        synth: synth_handle,
        synth_task,
        gen_event_tx,
        generation: None,
        pending_utterances: VecDeque::new(),
        gather: String::new(),
        gate_deadline: None,
    };

    if session
        .send(ServerMessage::connection("Connected to WebSocket server"))
        .await
        .is_err()
    {
        return;
    }

    if let Err(e) = session
        .run(socket_rx, stt_event_rx, gen_event_rx, delivery_rx)
        .await
    {
        error!(error = ?e, "Session terminated with error");
    }
    session.shutdown().await;
    info!("Session closed");
}

struct Session {
    id: Uuid,
    app: Arc<AppState>,
    phase: SessionPhase,
    sink: SplitSink<WebSocket, Message>,
    /// Declared language, or `None` to detect per utterance.
    language_hint: Option<Language>,
    memory: Arc<Mutex<ConversationMemory>>,
    stt_event_tx: mpsc::Sender<SttSessionEvent>,
    transcription: Option<TranscriptionHandle>,
    synth: SynthesisHandle,
    synth_task: JoinHandle<()>,
    gen_event_tx: mpsc::Sender<GenerationEvent>,
    generation: Option<JoinHandle<()>>,
    pending_utterances: VecDeque<(Language, String)>,
    /// Finalized transcript fragments awaiting the completeness gate.
    gather: String,
    gate_deadline: Option<Instant>,
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl Session {
    /// The main event loop: client frames in, backend events out.
    async fn run(
        &mut self,
        mut socket_rx: SplitStream<WebSocket>,
        mut stt_event_rx: mpsc::Receiver<SttSessionEvent>,
        mut gen_event_rx: mpsc::Receiver<GenerationEvent>,
        mut delivery_rx: mpsc::Receiver<DeliveryEvent>,
    ) -> Result<()> {
        loop {
            let gate_deadline = self.gate_deadline;
            tokio::select! {
                msg = socket_rx.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.on_client_text(text.as_str()).await?,
                    Some(Ok(Message::Binary(data))) => {
                        // Unwrapped audio frames are accepted as-is.
                        self.ensure_active();
                        self.forward_audio(data).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Client disconnected");
                        self.phase = SessionPhase::Closing;
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = ?e, "Error receiving from client");
                        self.phase = SessionPhase::Closing;
                        break;
                    }
                },
                Some(event) = stt_event_rx.recv() => self.on_stt_event(event).await?,
                Some(event) = gen_event_rx.recv() => self.on_generation_event(event).await?,
                Some(event) = delivery_rx.recv() => self.on_delivery_event(event).await?,
                _ = sleep_until_opt(gate_deadline) => {
                    debug!("Utterance gate timed out; forcing acceptance");
                    self.gate_deadline = None;
                    self.dispatch_gathered();
                }
            }
        }
        Ok(())
    }

    /// Lazily brings the session to `Active` on the first inbound message.
    fn ensure_active(&mut self) {
        if self.phase == SessionPhase::Initializing {
            self.open_transcription();
            self.phase = SessionPhase::Active;
            info!("Session active");
        }
    }

    /// Idempotent: keeps at most one transcription supervisor per session.
    fn open_transcription(&mut self) {
        if self.transcription.is_some() {
            return;
        }
        let config = &self.app.config;
        let tuning = TranscriptionTuning {
            reconnect_base: config.reconnect_base,
            reconnect_cap: config.reconnect_cap,
            keepalive_interval: config.keepalive_interval,
            keepalive_max_failures: config.keepalive_max_failures,
            queue_capacity: config.audio_queue_capacity,
            backpressure_warn: config.backpressure_warn,
        };
        self.transcription = Some(transcribe::spawn(
            self.app.stt.clone(),
            config.stt_params(),
            tuning,
            self.stt_event_tx.clone(),
        ));
    }

    async fn on_client_text(&mut self, text: &str) -> Result<()> {
        self.ensure_active();
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Audio { realtime_input }) => {
                for chunk in realtime_input.media_chunks {
                    match audio::decode_media_chunk(&chunk.data) {
                        Ok(bytes) => self.forward_audio(bytes).await,
                        Err(e) => {
                            warn!(error = ?e, "Rejected malformed audio chunk");
                            self.send(ServerMessage::error("Invalid message format")).await?;
                        }
                    }
                }
            }
            Ok(ClientMessage::Control(ControlMessage::Timer { data })) => {
                debug!("Synthetic transcript injected");
                self.accept_final_transcript(data).await?;
            }
            Ok(ClientMessage::Control(ControlMessage::Stop)) => {
                info!("Stop requested by client");
                self.stop_playback().await;
            }
            Ok(ClientMessage::Setup { setup }) => {
                if let Some(code) = setup.language.as_deref() {
                    if code.eq_ignore_ascii_case("auto") {
                        self.language_hint = None;
                    } else if let Some(language) = Language::parse(code) {
                        self.language_hint = Some(language);
                    } else {
                        warn!(code, "Unknown language in setup message");
                    }
                }
                debug!("Setup handshake applied");
            }
            Ok(ClientMessage::Other(value)) => {
                debug!(%value, "Ignoring unrecognized client message");
            }
            Err(e) => {
                warn!(error = ?e, "Malformed client message");
                self.send(ServerMessage::error("Invalid message format")).await?;
            }
        }
        Ok(())
    }

    async fn forward_audio(&mut self, bytes: Bytes) {
        if let Some(transcription) = &self.transcription {
            transcription.send_audio(bytes).await;
        }
    }

    async fn on_stt_event(&mut self, event: SttSessionEvent) -> Result<()> {
        match event {
            SttSessionEvent::Transcript(transcript) => {
                self.send(ServerMessage::transcription(transcript.text.clone()))
                    .await?;
                // Partial results are advisory only; finals feed the gate.
                if transcript.is_final {
                    self.accept_final_transcript(transcript.text).await?;
                }
            }
            SttSessionEvent::Metadata(metadata) => {
                self.send(ServerMessage::metadata(metadata)).await?;
            }
            SttSessionEvent::Backpressure { dropped } => {
                warn!(
                    session_id = %self.id,
                    dropped,
                    "Audio backlog saturated while transcription is down"
                );
            }
            SttSessionEvent::Degraded(message) => {
                self.send(ServerMessage::error(format!(
                    "Transcription degraded: {message}"
                )))
                .await?;
            }
        }
        Ok(())
    }

    /// Feeds one finalized transcript into the utterance gate.
    async fn accept_final_transcript(&mut self, text: String) -> Result<()> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        if completeness::is_interrupt(trimmed) {
            info!("Spoken interrupt detected");
            self.stop_playback().await;
            return Ok(());
        }

        if !self.gather.is_empty() {
            self.gather.push(' ');
        }
        self.gather.push_str(trimmed);

        if completeness::is_complete(&self.gather, self.language_hint) {
            self.dispatch_gathered();
        } else {
            // Keep waiting for the speaker, but never past the gate window.
            self.gate_deadline = Some(Instant::now() + self.app.config.utterance_gate);
        }
        Ok(())
    }

    /// Promotes the gathered transcript to an utterance and queues it for
    /// generation, in arrival order.
    fn dispatch_gathered(&mut self) {
        self.gate_deadline = None;
        let utterance = std::mem::take(&mut self.gather);
        if utterance.is_empty() {
            return;
        }
        let language = self
            .language_hint
            .unwrap_or_else(|| completeness::detect_language(&utterance));
        self.pending_utterances.push_back((language, utterance));
        self.pump_generation();
    }

    /// Starts the next queued generation if none is in flight.
    fn pump_generation(&mut self) {
        if self.generation.is_some() {
            return;
        }
        let Some((language, utterance)) = self.pending_utterances.pop_front() else {
            return;
        };
        let ctx = GenerationContext {
            llm: self.app.llm.clone(),
            system_prompt: self.app.system_prompt.clone(),
            memory: self.memory.clone(),
            synth: self.synth.clone(),
            events: self.gen_event_tx.clone(),
        };
        self.generation = Some(generate::spawn(ctx, language, utterance));
    }

    async fn on_generation_event(&mut self, event: GenerationEvent) -> Result<()> {
        match event {
            GenerationEvent::Sentence { text, .. } => {
                self.send(ServerMessage::sentence(text)).await?;
            }
            GenerationEvent::Completed { response } => {
                self.send(ServerMessage::llm_text(response)).await?;
                self.generation = None;
                self.pump_generation();
            }
            GenerationEvent::Failed(message) => {
                self.send(ServerMessage::error(format!(
                    "Response generation failed: {message}"
                )))
                .await?;
                self.generation = None;
                self.pump_generation();
            }
        }
        Ok(())
    }

    async fn on_delivery_event(&mut self, event: DeliveryEvent) -> Result<()> {
        match event {
            DeliveryEvent::Audio(chunk) => {
                self.sink.send(Message::Binary(chunk.payload)).await?;
            }
            DeliveryEvent::SentenceFailed {
                sentence_id,
                message,
            } => {
                warn!(%sentence_id, %message, "Skipping one unsynthesizable sentence");
                self.send(ServerMessage::error(format!(
                    "Speech synthesis failed for one sentence: {message}"
                )))
                .await?;
            }
            DeliveryEvent::Cleared => {
                self.send(ServerMessage::clear_playback("Playback cleared"))
                    .await?;
            }
        }
        Ok(())
    }

    /// Cancels response generation and all undelivered audio. Idempotent;
    /// the dispatcher acknowledges with a clear-playback event.
    async fn stop_playback(&mut self) {
        if let Some(handle) = self.generation.take() {
            handle.abort();
            // Wait the abort out so no late sentence can race the stop.
            let _ = handle.await;
        }
        self.pending_utterances.clear();
        self.gather.clear();
        self.gate_deadline = None;
        self.synth.stop().await;
    }

    async fn send(&mut self, msg: ServerMessage) -> Result<()> {
        send_msg(&mut self.sink, msg).await
    }

    /// Releases every backend resource owned by this session.
    async fn shutdown(&mut self) {
        self.phase = SessionPhase::Closing;
        if let Some(handle) = self.generation.take() {
            handle.abort();
        }
        // Dropping the handle stops the supervisor and its keepalive timer.
        self.transcription = None;
        self.synth_task.abort();
        self.phase = SessionPhase::Closed;
    }
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    sink.send(Message::Text(serialized.into())).await?;
    Ok(())
}
