//! Ayin assistant entry point
//!
//! Acquires the microphone and screen, opens a Gemini Live session and runs
//! until Ctrl-C or a terminal error. Status changes are logged; there is no
//! other user interface.

use anyhow::{Context, Result};
use ayin::audio_out::PulseOutput;
use ayin::{media_in, Assistant, AssistantConfig, AssistantState, GeminiGateway};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("Starting ayin assistant");

    let config = AssistantConfig::from_env().context("Failed to load configuration")?;
    let output = PulseOutput::open(&config.app_name).context("Failed to open playback device")?;
    let gateway = Arc::new(GeminiGateway::new(config.gemini.clone()));

    let media = media_in::acquire(&config.media());
    let assistant = Assistant::new(config, gateway, Box::new(output));

    let mut status = assistant.status();
    let status_task = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            if current.error.is_empty() {
                info!("Assistant is {}", current.state);
            } else {
                warn!("Assistant is {}: {}", current.state, current.error);
            }
        }
    });

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let state = assistant.run(media, shutdown).await;
    status_task.abort();

    info!("ayin assistant stopped");
    match state {
        AssistantState::PermissionsError => anyhow::bail!("Microphone and camera access denied"),
        AssistantState::Error => anyhow::bail!("Session ended with a connection error"),
        _ => Ok(()),
    }
}
