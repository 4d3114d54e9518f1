//! Messages crossing the session gateway boundary

use crate::codec::{EncodedAudioPayload, EncodedImagePayload};
use serde::Serialize;

/// Inbound events from the remote session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Session is ready for realtime input
    Open,
    /// Session failed; the session is gone
    Error(String),
    /// Raw PCM16 (24 kHz) slice of synthesized speech
    AudioChunk(Vec<u8>),
    /// Remote finished its turn
    TurnComplete,
}

/// base64 payload with its MIME descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaBlob {
    pub data: String,
    pub mime_type: String,
}

impl MediaBlob {
    /// `None` for an empty payload, which is never sent.
    fn non_empty(data: String, mime_type: &str) -> Option<Self> {
        if data.is_empty() {
            return None;
        }
        Some(Self {
            data,
            mime_type: mime_type.to_string(),
        })
    }
}

/// Outbound realtime input. Absent payloads are omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RealtimeInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<MediaBlob>,
    #[serde(rename = "video", skip_serializing_if = "Option::is_none")]
    pub image: Option<MediaBlob>,
}

impl RealtimeInput {
    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.image.is_none()
    }
}

impl From<EncodedAudioPayload> for RealtimeInput {
    fn from(payload: EncodedAudioPayload) -> Self {
        let mime_type = payload.mime_type();
        Self {
            audio: MediaBlob::non_empty(payload.data, mime_type),
            image: None,
        }
    }
}

impl From<EncodedImagePayload> for RealtimeInput {
    fn from(payload: EncodedImagePayload) -> Self {
        let mime_type = payload.mime_type();
        Self {
            audio: None,
            image: MediaBlob::non_empty(payload.data, mime_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_payloads_are_omitted() {
        let input = RealtimeInput::from(EncodedAudioPayload {
            data: "AAA=".to_string(),
        });
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["audio"]["data"], "AAA=");
        assert_eq!(json["audio"]["mimeType"], "audio/pcm;rate=16000");
        assert!(json.get("video").is_none());

        let empty = serde_json::to_value(RealtimeInput::default()).unwrap();
        assert_eq!(empty, serde_json::json!({}));
        assert!(RealtimeInput::default().is_empty());
        assert!(RealtimeInput::from(EncodedAudioPayload::default()).is_empty());
    }

    #[test]
    fn test_image_travels_as_video() {
        let input = RealtimeInput::from(EncodedImagePayload {
            data: "/9j/".to_string(),
        });
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["video"]["mimeType"], "image/jpeg");
        assert!(json.get("audio").is_none());
    }
}
