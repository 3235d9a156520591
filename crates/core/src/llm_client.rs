use anyhow::{Result, anyhow};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
}

/// One prior message in the conversation, as fed back into the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// A finite, non-restartable stream of response text fragments.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A generic client for interacting with a chat-completion LLM.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Opens one streaming completion for a finalized user utterance, seeded
    /// with the system prompt, the running summary of older conversation and
    /// the retained recent turns.
    async fn stream_chat(
        &self,
        system_prompt: String,
        summary: String,
        turns: Vec<ChatTurn>,
        utterance: String,
    ) -> Result<TokenStream>;

    /// Folds older turns into a running summary using the cheap model.
    async fn summarize(&self, prior_summary: String, turns: Vec<ChatTurn>) -> Result<String>;
}

/// An implementation of [`LlmClient`] for any OpenAI-compatible API.
///
/// Uses one model for conversational responses and a second, cheaper model
/// for memory summarization.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    chat_model: String,
    summary_model: String,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - Client configuration, including API key and base URL.
    /// * `chat_model` - Model identifier for conversational responses.
    /// * `summary_model` - Cheaper model identifier for summarization calls.
    pub fn new(config: OpenAIConfig, chat_model: String, summary_model: String) -> Self {
        Self {
            client: Client::with_config(config),
            chat_model,
            summary_model,
        }
    }

    fn build_messages(
        system_prompt: &str,
        summary: &str,
        turns: &[ChatTurn],
        utterance: &str,
    ) -> Result<Vec<ChatCompletionRequestMessage>> {
        let mut messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()?
                .into(),
        ];
        if !summary.is_empty() {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(format!("Summary of the conversation so far:\n{summary}"))
                    .build()?
                    .into(),
            );
        }
        for turn in turns {
            match turn.role {
                TurnRole::User => messages.push(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(turn.content.clone())
                        .build()?
                        .into(),
                ),
                TurnRole::Assistant => messages.push(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(turn.content.clone())
                        .build()?
                        .into(),
                ),
            }
        }
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(utterance)
                .build()?
                .into(),
        );
        Ok(messages)
    }
}

const SUMMARIZE_INSTRUCTION: &str = "Progressively summarize the conversation below, \
folding it into the previous summary. Keep facts, names and open questions. \
Respond with the new summary only.";

#[async_trait]
impl LlmClient for OpenAICompatibleClient {
    async fn stream_chat(
        &self,
        system_prompt: String,
        summary: String,
        turns: Vec<ChatTurn>,
        utterance: String,
    ) -> Result<TokenStream> {
        let messages = Self::build_messages(&system_prompt, &summary, &turns, &utterance)?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.chat_model)
            .messages(messages)
            .stream(true)
            .build()?;

        let stream = self.client.chat().create_stream(request).await?;

        Ok(Box::pin(stream.filter_map(|result| async {
            match result {
                Ok(response) => {
                    let choice = response.choices.first()?;
                    let content = choice.delta.content.as_deref()?;
                    if content.is_empty() {
                        None
                    } else {
                        Some(Ok(content.to_string()))
                    }
                }
                Err(e) => Some(Err(e.into())),
            }
        })))
    }

    async fn summarize(&self, prior_summary: String, turns: Vec<ChatTurn>) -> Result<String> {
        let mut transcript = String::new();
        if !prior_summary.is_empty() {
            transcript.push_str("Previous summary:\n");
            transcript.push_str(&prior_summary);
            transcript.push_str("\n\n");
        }
        transcript.push_str("New lines:\n");
        for turn in &turns {
            let speaker = match turn.role {
                TurnRole::User => "User",
                TurnRole::Assistant => "Assistant",
            };
            transcript.push_str(&format!("{speaker}: {}\n", turn.content));
        }

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.summary_model)
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(SUMMARIZE_INSTRUCTION)
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(transcript)
                    .build()?
                    .into(),
            ])
            .build()?;

        let response = self.client.chat().create(request).await?;
        let choice = response
            .choices
            .first()
            .ok_or_else(|| anyhow!("summarization response had no choices"))?;
        choice
            .message
            .content
            .clone()
            .ok_or_else(|| anyhow!("summarization response had no content"))
    }
}
