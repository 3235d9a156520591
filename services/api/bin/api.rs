//! Main Entrypoint for the Voxbridge API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the streaming backend clients.
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use voxbridge_api::{backend::deepgram::DeepgramBackend, config::Config, router::create_router, state::AppState};
use voxbridge_core::llm_client::OpenAICompatibleClient;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing backend clients...");

    // --- 3. Initialize Backend Clients ---
    let groq_config = OpenAIConfig::new()
        .with_api_key(&config.groq_api_key)
        .with_api_base("https://api.groq.com/openai/v1");
    let llm = Arc::new(OpenAICompatibleClient::new(
        groq_config,
        config.chat_model.clone(),
        config.summary_model.clone(),
    ));

    let deepgram = Arc::new(DeepgramBackend::new(
        config.deepgram_api_key.clone(),
        config.speak_model.clone(),
    ));

    let system_prompt = Arc::new(config.system_prompt.clone());
    let app_state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        stt: deepgram.clone(),
        llm,
        tts: deepgram,
        system_prompt,
    });

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(
        chat_model = %config.chat_model,
        listen_model = %config.listen_model,
        speak_model = %config.speak_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
