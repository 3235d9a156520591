//! Supervises the transcription leg of a session.
//!
//! One supervisor task owns the speech-to-text connection for its session:
//! it connects, replays audio buffered while disconnected, runs the
//! keepalive probe, and reconnects with capped exponential backoff whenever
//! the link is lost. It stops for good only when the client side goes away.

use crate::backend::{SttBackend, SttEvent, SttParams, SttStream, TranscriptEvent};
use crate::ws::bridge::AudioFrameBridge;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

/// Backoff and keepalive tuning for one transcription supervisor.
#[derive(Debug, Clone)]
pub struct TranscriptionTuning {
    pub reconnect_base: Duration,
    pub reconnect_cap: Duration,
    pub keepalive_interval: Duration,
    pub keepalive_max_failures: u32,
    pub queue_capacity: usize,
    pub backpressure_warn: Duration,
}

/// Commands accepted by the supervisor task.
#[derive(Debug)]
enum SttCommand {
    Audio(Bytes),
}

/// Events the supervisor reports back to its session.
#[derive(Debug)]
pub enum SttSessionEvent {
    Transcript(TranscriptEvent),
    Metadata(serde_json::Value),
    /// The bounded audio queue stayed full past its timeout; raised at most
    /// once per saturation episode.
    Backpressure { dropped: u64 },
    /// The backend leg failed; transcription pauses until reconnect.
    Degraded(String),
}

/// Handle held by the session; dropping it shuts the supervisor down.
#[derive(Debug)]
pub struct TranscriptionHandle {
    cmd_tx: mpsc::Sender<SttCommand>,
    task: JoinHandle<()>,
}

impl TranscriptionHandle {
    /// Forwards one frame of client audio. Frames sent while the link is
    /// down are buffered and replayed on reconnect.
    pub async fn send_audio(&self, audio: Bytes) {
        let _ = self.cmd_tx.send(SttCommand::Audio(audio)).await;
    }
}

impl Drop for TranscriptionHandle {
    fn drop(&mut self) {
        // The supervisor notices the closed command channel and exits on its
        // own; the abort is a backstop for a task parked in backoff sleep.
        self.task.abort();
    }
}

/// Spawns the supervisor for one session. Idempotence of "open" is handled
/// by the caller keeping at most one handle per session.
pub fn spawn(
    backend: Arc<dyn SttBackend>,
    params: SttParams,
    tuning: TranscriptionTuning,
    event_tx: mpsc::Sender<SttSessionEvent>,
) -> TranscriptionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let supervisor = Supervisor {
        backend,
        params,
        bridge: AudioFrameBridge::new(tuning.queue_capacity, tuning.backpressure_warn),
        tuning,
        event_tx,
    };
    let task = tokio::spawn(supervisor.run(cmd_rx));
    TranscriptionHandle { cmd_tx, task }
}

enum LinkOutcome {
    /// The command channel closed: the client session is gone.
    ClientGone,
    /// The backend connection failed; reconnect after backoff.
    Lost,
}

struct Supervisor {
    backend: Arc<dyn SttBackend>,
    params: SttParams,
    tuning: TranscriptionTuning,
    bridge: AudioFrameBridge,
    event_tx: mpsc::Sender<SttSessionEvent>,
}

impl Supervisor {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<SttCommand>) {
        let mut delay = self.tuning.reconnect_base;
        loop {
            match self.backend.open(&self.params).await {
                Ok((stream, events)) => {
                    delay = self.tuning.reconnect_base;
                    match self.serve(stream, events, &mut cmd_rx).await {
                        LinkOutcome::ClientGone => break,
                        LinkOutcome::Lost => {}
                    }
                }
                Err(e) => {
                    warn!(error = ?e, "Transcription connect failed");
                    let _ = self
                        .event_tx
                        .send(SttSessionEvent::Degraded(e.to_string()))
                        .await;
                }
            }

            if !self.backoff(delay, &mut cmd_rx).await {
                break;
            }
            delay = (delay * 2).min(self.tuning.reconnect_cap);
        }
        info!("Transcription supervisor stopped.");
    }

    /// Runs one open connection until the link drops or the client leaves.
    async fn serve(
        &mut self,
        mut stream: Box<dyn SttStream>,
        mut events: mpsc::Receiver<SttEvent>,
        cmd_rx: &mut mpsc::Receiver<SttCommand>,
    ) -> LinkOutcome {
        // Replay anything buffered while the link was down, oldest first.
        for chunk in self.bridge.drain() {
            if let Err(e) = stream.send_audio(chunk).await {
                warn!(error = ?e, "Failed to replay buffered audio");
                return LinkOutcome::Lost;
            }
        }

        let mut keepalive = tokio::time::interval_at(
            Instant::now() + self.tuning.keepalive_interval,
            self.tuning.keepalive_interval,
        );
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut probe_failures = 0u32;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(SttCommand::Audio(audio)) => {
                        if let Err(e) = stream.send_audio(audio).await {
                            warn!(error = ?e, "Audio send failed; reconnecting");
                            stream.close().await;
                            return LinkOutcome::Lost;
                        }
                    }
                    None => {
                        stream.close().await;
                        return LinkOutcome::ClientGone;
                    }
                },
                event = events.recv() => match event {
                    Some(SttEvent::Transcript(t)) => {
                        if self.event_tx.send(SttSessionEvent::Transcript(t)).await.is_err() {
                            stream.close().await;
                            return LinkOutcome::ClientGone;
                        }
                    }
                    Some(SttEvent::Metadata(m)) => {
                        let _ = self.event_tx.send(SttSessionEvent::Metadata(m)).await;
                    }
                    Some(SttEvent::Error(message)) => {
                        warn!(%message, "Transcription backend error");
                        let _ = self.event_tx.send(SttSessionEvent::Degraded(message)).await;
                        stream.close().await;
                        return LinkOutcome::Lost;
                    }
                    Some(SttEvent::Closed) | None => {
                        warn!("Transcription connection closed by backend");
                        return LinkOutcome::Lost;
                    }
                },
                _ = keepalive.tick() => {
                    if stream.keepalive().await.is_err() {
                        probe_failures += 1;
                        if probe_failures >= self.tuning.keepalive_max_failures {
                            warn!(probe_failures, "Keepalive probes failing; reconnecting");
                            stream.close().await;
                            return LinkOutcome::Lost;
                        }
                    } else {
                        probe_failures = 0;
                    }
                }
            }
        }
    }

    /// Sleeps out one backoff window, buffering audio that arrives in the
    /// meantime. Returns `false` when the client side is gone.
    async fn backoff(&mut self, delay: Duration, cmd_rx: &mut mpsc::Receiver<SttCommand>) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return true,
                cmd = cmd_rx.recv() => match cmd {
                    Some(SttCommand::Audio(audio)) => {
                        if self.bridge.enqueue(audio) {
                            let dropped = self.bridge.dropped();
                            warn!(dropped, "Audio backlog full while transcription is down");
                            let _ = self
                                .event_tx
                                .send(SttSessionEvent::Backpressure { dropped })
                                .await;
                        }
                    }
                    None => return false,
                },
            }
        }
    }
}
