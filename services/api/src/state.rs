//! Shared Application State
//!
//! This module defines the `AppState` struct holding the configuration and
//! the backend clients shared by every session.

use crate::backend::{SttBackend, TtsBackend};
use crate::config::Config;
use std::sync::Arc;
use voxbridge_core::llm_client::LlmClient;

/// The shared application state, created once at startup and passed to all
/// handlers. Sessions never share mutable state; everything here is
/// read-only or internally synchronized.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub stt: Arc<dyn SttBackend>,
    pub llm: Arc<dyn LlmClient>,
    pub tts: Arc<dyn TtsBackend>,
    pub system_prompt: Arc<String>,
}
