use crate::backend::SttParams;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful english tutor. Please, make short responses.\n\nRespond naturally to the user's input. Focus on being helpful and educational.";

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub deepgram_api_key: String,
    pub groq_api_key: String,
    /// Model for conversational responses.
    pub chat_model: String,
    /// Cheaper model for memory summarization.
    pub summary_model: String,
    /// Transcription model and voice model.
    pub listen_model: String,
    pub speak_model: String,
    pub listen_sample_rate: u32,
    /// Two-letter language code, or "auto" to detect per utterance.
    pub language: String,
    pub audio_queue_capacity: usize,
    pub backpressure_warn: Duration,
    pub keepalive_interval: Duration,
    pub keepalive_max_failures: u32,
    pub reconnect_base: Duration,
    pub reconnect_cap: Duration,
    /// How long the utterance gate waits before forcing acceptance.
    pub utterance_gate: Duration,
    pub memory_token_budget: usize,
    pub system_prompt: String,
    pub log_level: Level,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = env_or("BIND_ADDRESS", "0.0.0.0:3001");
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let deepgram_api_key = std::env::var("DEEPGRAM_API_KEY")
            .map_err(|_| ConfigError::MissingVar("DEEPGRAM_API_KEY".to_string()))?;
        let groq_api_key = std::env::var("GROQ_API_KEY")
            .map_err(|_| ConfigError::MissingVar("GROQ_API_KEY".to_string()))?;

        let log_level_str = env_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            deepgram_api_key,
            groq_api_key,
            chat_model: env_or("CHAT_MODEL", "meta-llama/llama-4-maverick-17b-128e-instruct"),
            summary_model: env_or("SUMMARY_MODEL", "llama-3.1-8b-instant"),
            listen_model: env_or("LISTEN_MODEL", "nova-3"),
            speak_model: env_or("SPEAK_MODEL", "aura-2-thalia-en"),
            listen_sample_rate: env_parse("LISTEN_SAMPLE_RATE", 24000)?,
            language: env_or("LANGUAGE", "en"),
            audio_queue_capacity: env_parse("AUDIO_QUEUE_CAPACITY", 64)?,
            backpressure_warn: Duration::from_millis(env_parse("BACKPRESSURE_WARN_MS", 3000)?),
            keepalive_interval: Duration::from_secs(env_parse("KEEPALIVE_SECS", 10)?),
            keepalive_max_failures: env_parse("KEEPALIVE_MAX_FAILURES", 3)?,
            reconnect_base: Duration::from_millis(env_parse("RECONNECT_BASE_MS", 500)?),
            reconnect_cap: Duration::from_secs(env_parse("RECONNECT_CAP_SECS", 30)?),
            utterance_gate: Duration::from_millis(env_parse("UTTERANCE_GATE_MS", 5000)?),
            memory_token_budget: env_parse("MEMORY_TOKEN_BUDGET", 1000)?,
            system_prompt: env_or("SYSTEM_PROMPT", DEFAULT_SYSTEM_PROMPT),
            log_level,
        })
    }

    /// Parameters for opening a transcription stream.
    pub fn stt_params(&self) -> SttParams {
        SttParams {
            model: self.listen_model.clone(),
            language: if self.language == "auto" {
                "en".to_string()
            } else {
                self.language.clone()
            },
            sample_rate: self.listen_sample_rate,
        }
    }
}
