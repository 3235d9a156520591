//! Bounded conversation memory with progressive summarization.
//!
//! Recent (utterance, response) pairs are kept verbatim; once their
//! estimated token weight exceeds the budget, the oldest pairs are folded
//! into a running summary by a cheap model call. The raw turns are only
//! discarded after the summarization call succeeds.

use crate::llm_client::{ChatTurn, LlmClient};
use anyhow::Result;
use std::collections::VecDeque;

/// One completed exchange between the user and the assistant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub user: String,
    pub assistant: String,
}

/// Rough token estimate; four characters per token is close enough for
/// budget enforcement.
fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

#[derive(Debug)]
pub struct ConversationMemory {
    summary: String,
    turns: VecDeque<ConversationTurn>,
    token_budget: usize,
}

impl ConversationMemory {
    pub fn new(token_budget: usize) -> Self {
        Self {
            summary: String::new(),
            turns: VecDeque::new(),
            token_budget,
        }
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// The retained turns flattened into model-ready messages, oldest first.
    pub fn history(&self) -> Vec<ChatTurn> {
        self.turns
            .iter()
            .flat_map(|t| {
                [
                    ChatTurn::user(t.user.clone()),
                    ChatTurn::assistant(t.assistant.clone()),
                ]
            })
            .collect()
    }

    /// Records one successfully completed exchange.
    pub fn record_turn(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.turns.push_back(ConversationTurn {
            user: user.into(),
            assistant: assistant.into(),
        });
    }

    fn retained_tokens(&self) -> usize {
        self.turns
            .iter()
            .map(|t| estimate_tokens(&t.user) + estimate_tokens(&t.assistant))
            .sum()
    }

    pub fn over_budget(&self) -> bool {
        self.retained_tokens() > self.token_budget
    }

    /// Folds the oldest turns into the summary until the retained turns fit
    /// the budget again. At least one turn is always kept verbatim. Returns
    /// whether anything was folded; on summarization failure the memory is
    /// left exactly as it was.
    pub async fn compact(&mut self, llm: &dyn LlmClient) -> Result<bool> {
        if !self.over_budget() || self.turns.len() <= 1 {
            return Ok(false);
        }

        let mut keep = self.turns.clone();
        let mut folded: Vec<ChatTurn> = Vec::new();
        while keep.len() > 1 {
            let within_budget = keep
                .iter()
                .map(|t| estimate_tokens(&t.user) + estimate_tokens(&t.assistant))
                .sum::<usize>()
                <= self.token_budget;
            if within_budget {
                break;
            }
            let Some(oldest) = keep.pop_front() else {
                break;
            };
            folded.push(ChatTurn::user(oldest.user));
            folded.push(ChatTurn::assistant(oldest.assistant));
        }
        if folded.is_empty() {
            return Ok(false);
        }

        let new_summary = llm.summarize(self.summary.clone(), folded).await?;
        self.summary = new_summary;
        self.turns = keep;
        Ok(true)
    }
}
