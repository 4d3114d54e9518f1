//! Gemini Live API wire types
//!
//! Message shapes for the BidiGenerateContent WebSocket, the client
//! configuration, and the mapping from server messages to [`SessionEvent`]s.

use crate::codec::decode_transport_safe;
use crate::events::{RealtimeInput, SessionEvent};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Error as WsError;
use tracing::{debug, warn};

/// Default Live endpoint; the API key is appended as a query parameter.
pub const LIVE_ENDPOINT: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-preview-native-audio-dialog";

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are Ayin, a friendly, hyper-terse AI assistant for users who are blind or have low vision. \
Your primary function is to be their eyes. You receive a live image stream and the user's spoken requests; \
analyze both to understand the user's environment and answer quickly and tersely. The user may ask clarifying questions. \
Keep a calm, reassuring tone. If the user asks nothing specific, speak up briefly when you see something dangerous \
or something the user should pay attention to.";

/// Generation configuration for the Live API.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

/// Setup message, the first thing sent on a fresh socket.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BidiGenerateContentSetup {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

/// Client -> server messages
#[derive(Debug, Serialize, Clone)]
pub enum ClientMessage {
    #[serde(rename = "setup")]
    Setup(BidiGenerateContentSetup),
    #[serde(rename = "realtimeInput")]
    RealtimeInput(RealtimeInput),
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Server -> client messages
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    SetupComplete {
        #[serde(rename = "setupComplete")]
        setup_complete: serde_json::Value,
    },
    ServerContent {
        #[serde(rename = "serverContent")]
        server_content: serde_json::Value,
    },
    ToolCall {
        #[serde(rename = "toolCall")]
        tool_call: serde_json::Value,
    },
    GoAway {
        #[serde(rename = "goAway")]
        go_away: serde_json::Value,
    },
}

/// Error type for Gemini API operations
#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Timeout")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, GeminiError>;

/// Replies are always synthesized speech
pub const RESPONSE_MODALITY: &str = "AUDIO";

/// Configuration for the Gemini client
#[derive(Debug, Clone)]
pub struct GeminiClientConfig {
    pub url: String,
    pub model: String,
    pub system_instruction: Option<String>,
    pub setup_timeout: Duration,
}

impl Default for GeminiClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            model: DEFAULT_MODEL.to_string(),
            system_instruction: Some(DEFAULT_SYSTEM_INSTRUCTION.to_string()),
            setup_timeout: Duration::from_secs(10),
        }
    }
}

impl GeminiClientConfig {
    pub fn from_api_key(api_key: &str) -> Self {
        Self {
            url: format!("{}?key={}", LIVE_ENDPOINT, api_key),
            ..Default::default()
        }
    }

    /// The setup message for this configuration.
    pub fn setup(&self) -> BidiGenerateContentSetup {
        BidiGenerateContentSetup {
            model: self.model.clone(),
            generation_config: Some(GenerationConfig {
                response_modalities: vec![RESPONSE_MODALITY.to_string()],
            }),
            system_instruction: self.system_instruction.as_ref().map(|instruction| Content {
                role: None,
                parts: vec![Part {
                    text: Some(instruction.clone()),
                }],
            }),
        }
    }
}

/// URL with the key masked, for logs
pub fn redact_url(url: &str) -> String {
    match url.find("key=") {
        Some(i) => format!("{}key=***", &url[..i]),
        None => url.to_string(),
    }
}

/// Parse one inbound text frame.
pub fn parse_server_message(text: &str) -> Result<ServerMessage> {
    Ok(serde_json::from_str::<ServerMessage>(text)?)
}

/// Events carried by a `serverContent` payload, in order: the speech in the
/// model turn (all inline parts joined), then turn completion.
pub fn server_content_events(content: &serde_json::Value) -> Vec<SessionEvent> {
    let mut events = Vec::new();

    if let Some(parts) = content
        .get("modelTurn")
        .and_then(|turn| turn.get("parts"))
        .and_then(|parts| parts.as_array())
    {
        let mut audio = Vec::new();
        for inline_data in parts.iter().filter_map(|part| part.get("inlineData")) {
            let Some(data) = inline_data.get("data").and_then(|d| d.as_str()) else {
                warn!("Inline data without data field");
                continue;
            };
            match decode_transport_safe(data) {
                Ok(bytes) => audio.extend_from_slice(&bytes),
                Err(e) => warn!("Failed to decode inline audio: {}", e),
            }
        }
        if !audio.is_empty() {
            events.push(SessionEvent::AudioChunk(audio));
        }
    }

    if content
        .get("interrupted")
        .and_then(|i| i.as_bool())
        .unwrap_or(false)
    {
        debug!("Server reported an interrupted generation");
    }

    if content
        .get("turnComplete")
        .and_then(|t| t.as_bool())
        .unwrap_or(false)
    {
        events.push(SessionEvent::TurnComplete);
    }

    events
}
