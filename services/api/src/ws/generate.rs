//! Drives one streaming model response per finalized user utterance.
//!
//! Tokens stream through a fresh sentence splitter; each completed sentence
//! is announced to the session and handed to the synthesis dispatcher
//! immediately, so speech starts before the model finishes. The
//! conversation memory is only touched after the whole response lands.

use crate::ws::synth::SynthesisHandle;
use anyhow::{Result, anyhow};
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, warn};
use uuid::Uuid;
use voxbridge_core::completeness::Language;
use voxbridge_core::llm_client::LlmClient;
use voxbridge_core::memory::ConversationMemory;
use voxbridge_core::segmenter::SentenceSegmenter;

/// Progress reported back to the session loop.
#[derive(Debug)]
pub enum GenerationEvent {
    /// A sentence completed and was submitted for synthesis.
    Sentence { sentence_id: Uuid, text: String },
    /// The response finished and was committed to memory.
    Completed { response: String },
    /// The response was aborted; memory is untouched.
    Failed(String),
}

/// Everything one generation run needs, bundled so spawning stays tidy.
#[derive(Clone)]
pub struct GenerationContext {
    pub llm: Arc<dyn LlmClient>,
    pub system_prompt: Arc<String>,
    pub memory: Arc<Mutex<ConversationMemory>>,
    pub synth: SynthesisHandle,
    pub events: mpsc::Sender<GenerationEvent>,
}

/// Spawns the generation task for one utterance.
pub fn spawn(ctx: GenerationContext, language: Language, utterance: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let events = ctx.events.clone();
        if let Err(e) = run(ctx, language, utterance).await {
            error!(error = ?e, "Response generation failed");
            let _ = events.send(GenerationEvent::Failed(e.to_string())).await;
        }
    })
}

async fn run(ctx: GenerationContext, language: Language, utterance: String) -> Result<()> {
    let (summary, turns) = {
        let memory = ctx.memory.lock().await;
        (memory.summary().to_string(), memory.history())
    };

    let mut stream = ctx
        .llm
        .stream_chat(
            ctx.system_prompt.as_str().to_owned(),
            summary,
            turns,
            utterance.clone(),
        )
        .await?;

    let mut segmenter = SentenceSegmenter::new(language);
    let mut response = String::new();
    while let Some(token) = stream.next().await {
        let token = token?;
        response.push_str(&token);
        for sentence in segmenter.push(&token) {
            emit_sentence(&ctx, &sentence).await?;
        }
    }
    if let Some(rest) = segmenter.finish() {
        emit_sentence(&ctx, &rest).await?;
    }

    {
        let mut memory = ctx.memory.lock().await;
        memory.record_turn(utterance, response.clone());
        if let Err(e) = memory.compact(ctx.llm.as_ref()).await {
            // The response already succeeded; a failed fold only delays
            // trimming until the next turn.
            warn!(error = ?e, "Conversation summarization failed");
        }
    }

    ctx.events
        .send(GenerationEvent::Completed { response })
        .await
        .map_err(|_| anyhow!("session closed during generation"))?;
    Ok(())
}

async fn emit_sentence(ctx: &GenerationContext, raw: &str) -> Result<()> {
    let text = raw.trim();
    if text.is_empty() {
        return Ok(());
    }
    let sentence_id = Uuid::new_v4();
    ctx.events
        .send(GenerationEvent::Sentence {
            sentence_id,
            text: text.to_string(),
        })
        .await
        .map_err(|_| anyhow!("session closed during generation"))?;
    ctx.synth.speak(sentence_id, text.to_string()).await;
    Ok(())
}
