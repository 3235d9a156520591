//! Vendor-neutral streaming interfaces for the three backend legs.
//!
//! Each vendor SDK's callback or socket surface is normalized into the same
//! shape: an `open`/`synthesize` call that yields a control handle plus an
//! async event sequence delivered over a channel or stream. The session
//! code only ever consumes these interfaces, never vendor wire formats.

pub mod deepgram;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use tokio::sync::mpsc;

/// One speech-to-text result from the transcription backend.
#[derive(Debug, Clone)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

/// Everything a live transcription connection can report.
#[derive(Debug)]
pub enum SttEvent {
    Transcript(TranscriptEvent),
    /// Diagnostic metadata passed through to the client untouched.
    Metadata(serde_json::Value),
    Error(String),
    /// The backend closed the connection.
    Closed,
}

/// Parameters for opening a transcription stream.
#[derive(Debug, Clone)]
pub struct SttParams {
    pub model: String,
    pub language: String,
    pub sample_rate: u32,
}

/// Control half of an open transcription connection.
#[async_trait]
pub trait SttStream: Send {
    /// Pushes a frame of raw audio to the recognizer.
    async fn send_audio(&mut self, audio: Bytes) -> Result<()>;

    /// Liveness probe; an error counts as a failed probe.
    async fn keepalive(&mut self) -> Result<()>;

    /// Best-effort graceful shutdown.
    async fn close(&mut self);
}

/// A speech-to-text backend that can open live transcription connections.
#[async_trait]
pub trait SttBackend: Send + Sync {
    /// Opens a connection, returning its control handle and event sequence.
    async fn open(
        &self,
        params: &SttParams,
    ) -> Result<(Box<dyn SttStream>, mpsc::Receiver<SttEvent>)>;
}

/// A finite, lazy stream of synthesized audio chunks.
pub type AudioStream = BoxStream<'static, Result<Bytes>>;

/// A text-to-speech backend.
#[async_trait]
pub trait TtsBackend: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<AudioStream>;
}
