//! Sentence-ordered speech synthesis dispatch.
//!
//! Sentences are synthesized concurrently, one task per sentence, but their
//! audio is released to the client strictly in submission order: a later
//! sentence's chunks wait in its channel until every earlier sentence has
//! fully delivered. A stop command cancels all in-flight synthesis, drops
//! everything undelivered and acknowledges with a clear-playback event from
//! inside the delivery loop, so no stale audio can follow the
//! acknowledgement.

use crate::backend::TtsBackend;
use bytes::Bytes;
use futures_util::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// One ordered piece of outbound audio.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub sequence_number: u64,
    pub sentence_id: Uuid,
    pub payload: Bytes,
}

/// What the dispatcher hands to the session for the client transport.
#[derive(Debug)]
pub enum DeliveryEvent {
    Audio(AudioChunk),
    /// Synthesis failed for one sentence; later sentences are unaffected.
    SentenceFailed { sentence_id: Uuid, message: String },
    /// Acknowledges a stop: everything undelivered has been discarded.
    Cleared,
}

#[derive(Debug)]
enum SynthCommand {
    Speak { sentence_id: Uuid, text: String },
    Stop,
}

/// Cloneable handle for submitting sentences and cancelling playback.
#[derive(Debug, Clone)]
pub struct SynthesisHandle {
    cmd_tx: mpsc::Sender<SynthCommand>,
}

impl SynthesisHandle {
    pub async fn speak(&self, sentence_id: Uuid, text: String) {
        let _ = self
            .cmd_tx
            .send(SynthCommand::Speak { sentence_id, text })
            .await;
    }

    /// Cancels queued and in-flight synthesis. Safe to call at any time,
    /// any number of times.
    pub async fn stop(&self) {
        let _ = self.cmd_tx.send(SynthCommand::Stop).await;
    }
}

enum SentenceChunk {
    Audio(Bytes),
    Failed(String),
}

struct PendingSentence {
    id: Uuid,
    chunks: mpsc::Receiver<SentenceChunk>,
}

/// Spawns the dispatcher task for one session.
pub fn spawn(
    tts: Arc<dyn TtsBackend>,
    out: mpsc::Sender<DeliveryEvent>,
) -> (SynthesisHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let task = tokio::spawn(run(tts, cmd_rx, out));
    (SynthesisHandle { cmd_tx }, task)
}

async fn run(
    tts: Arc<dyn TtsBackend>,
    mut cmd_rx: mpsc::Receiver<SynthCommand>,
    out: mpsc::Sender<DeliveryEvent>,
) {
    let mut queue: VecDeque<PendingSentence> = VecDeque::new();
    let mut cancel = CancellationToken::new();
    let mut sequence_number: u64 = 0;

    'outer: loop {
        // Wait for a sentence to deliver, handling commands meanwhile.
        let mut job = loop {
            if let Some(job) = queue.pop_front() {
                break job;
            }
            match cmd_rx.recv().await {
                Some(cmd) => {
                    if !handle_command(cmd, &tts, &mut queue, &mut cancel, &out).await {
                        break 'outer;
                    }
                }
                None => break 'outer,
            }
        };

        // Deliver this sentence to completion; chunks of queued sentences
        // stay parked in their own channels until it is done.
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(SynthCommand::Stop) => {
                        drop(job);
                        if !handle_command(SynthCommand::Stop, &tts, &mut queue, &mut cancel, &out).await {
                            break 'outer;
                        }
                        continue 'outer;
                    }
                    Some(speak) => {
                        if !handle_command(speak, &tts, &mut queue, &mut cancel, &out).await {
                            break 'outer;
                        }
                    }
                    None => break 'outer,
                },
                chunk = job.chunks.recv() => match chunk {
                    Some(SentenceChunk::Audio(payload)) => {
                        sequence_number += 1;
                        let event = DeliveryEvent::Audio(AudioChunk {
                            sequence_number,
                            sentence_id: job.id,
                            payload,
                        });
                        if out.send(event).await.is_err() {
                            break 'outer;
                        }
                    }
                    Some(SentenceChunk::Failed(message)) => {
                        warn!(sentence_id = %job.id, %message, "Sentence synthesis failed");
                        let failed = DeliveryEvent::SentenceFailed { sentence_id: job.id, message };
                        if out.send(failed).await.is_err() {
                            break 'outer;
                        }
                        continue 'outer;
                    }
                    None => continue 'outer,
                },
            }
        }
    }
    debug!("Synthesis dispatcher stopped.");
}

/// Applies one command; returns `false` when the session side is gone.
async fn handle_command(
    cmd: SynthCommand,
    tts: &Arc<dyn TtsBackend>,
    queue: &mut VecDeque<PendingSentence>,
    cancel: &mut CancellationToken,
    out: &mpsc::Sender<DeliveryEvent>,
) -> bool {
    match cmd {
        SynthCommand::Speak { sentence_id, text } => {
            let (tx, rx) = mpsc::channel(32);
            tokio::spawn(synthesize_sentence(
                tts.clone(),
                sentence_id,
                text,
                tx,
                cancel.clone(),
            ));
            queue.push_back(PendingSentence {
                id: sentence_id,
                chunks: rx,
            });
            true
        }
        SynthCommand::Stop => {
            cancel.cancel();
            *cancel = CancellationToken::new();
            queue.clear();
            out.send(DeliveryEvent::Cleared).await.is_ok()
        }
    }
}

async fn synthesize_sentence(
    tts: Arc<dyn TtsBackend>,
    sentence_id: Uuid,
    text: String,
    tx: mpsc::Sender<SentenceChunk>,
    cancel: CancellationToken,
) {
    let mut stream = tokio::select! {
        _ = cancel.cancelled() => return,
        opened = tts.synthesize(&text) => match opened {
            Ok(stream) => stream,
            Err(e) => {
                let _ = tx.send(SentenceChunk::Failed(e.to_string())).await;
                return;
            }
        },
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            item = stream.next() => match item {
                Some(Ok(payload)) => {
                    if tx.send(SentenceChunk::Audio(payload)).await.is_err() {
                        // Receiver discarded by a stop; nothing left to do.
                        return;
                    }
                }
                Some(Err(e)) => {
                    debug!(sentence_id = %sentence_id, error = ?e, "Synthesis stream error");
                    let _ = tx.send(SentenceChunk::Failed(e.to_string())).await;
                    return;
                }
                None => return,
            },
        }
    }
}
