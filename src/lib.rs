//! Ayin - hands-free voice and vision assistant
//!
//! Streams the microphone and a live video feed to a Gemini Live session,
//! plays the synthesized reply back gaplessly, and hands the turn back to the
//! user as soon as they talk over the assistant.

#![forbid(unsafe_code)]

pub mod assistant;
pub mod audio_out;
pub mod capture;
pub mod codec;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod frame;
pub mod gateway;
pub mod gemini;
pub mod gemini_client;
pub mod media_in;
pub mod playback;
pub mod turn_fsm;
pub mod ws_writer;

pub use assistant::Assistant;
pub use config::AssistantConfig;
pub use gemini_client::GeminiGateway;
pub use turn_fsm::{AssistantState, AssistantStatus};
