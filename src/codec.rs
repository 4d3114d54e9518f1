//! Signal codec
//!
//! Stateless conversions between float samples, resampled rates, 16-bit PCM,
//! little-endian byte buffers and the base64 text carried over the wire.

use base64::engine::general_purpose;
use base64::Engine;

/// Uplink rate expected by the session
pub const UPLINK_SAMPLE_RATE: u32 = 16_000;
/// Rate of synthesized speech coming back from the session
pub const DOWNLINK_SAMPLE_RATE: u32 = 24_000;
/// MIME descriptor attached to uplink audio
pub const AUDIO_MIME_TYPE: &str = "audio/pcm;rate=16000";
/// MIME descriptor attached to sampled frames
pub const IMAGE_MIME_TYPE: &str = "image/jpeg";

pub use base64::DecodeError;

/// Audio ready for the session: base64 of little-endian PCM16 at 16 kHz
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedAudioPayload {
    pub data: String,
}

impl EncodedAudioPayload {
    pub fn mime_type(&self) -> &'static str {
        AUDIO_MIME_TYPE
    }
}

/// One sampled frame: base64 of a JPEG still
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedImagePayload {
    pub data: String,
}

impl EncodedImagePayload {
    pub fn mime_type(&self) -> &'static str {
        IMAGE_MIME_TYPE
    }
}

/// Box-car resampling: each output sample is the mean of the input window it
/// covers. Returns a copy of the input when the rates match.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = (samples.len() as f64 / ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);

    let mut start = 0usize;
    for k in 0..out_len {
        let end = (((k + 1) as f64 * ratio).round() as usize).min(samples.len());
        let window = &samples[start.min(end)..end];
        let mean = if window.is_empty() {
            0.0
        } else {
            window.iter().sum::<f32>() / window.len() as f32
        };
        out.push(mean);
        start = end;
    }

    out
}

/// Clamp to [-1, 1] and scale to signed 16-bit, truncating toward zero.
pub fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let s = s.clamp(-1.0, 1.0);
            if s < 0.0 {
                (s * 32768.0) as i16
            } else {
                (s * 32767.0) as i16
            }
        })
        .collect()
}

pub fn pcm16_to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Little-endian PCM16 from raw bytes. A trailing odd byte is dropped.
pub fn bytes_to_pcm16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

pub fn encode_transport_safe(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

pub fn decode_transport_safe(text: &str) -> Result<Vec<u8>, DecodeError> {
    general_purpose::STANDARD.decode(text)
}

/// Root-mean-square energy of a block (0.0 when empty)
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Full uplink chain for one captured block.
pub fn encode_audio_block(block: &[f32], input_rate: u32) -> EncodedAudioPayload {
    let resampled = resample(block, input_rate, UPLINK_SAMPLE_RATE);
    let pcm = to_pcm16(&resampled);
    EncodedAudioPayload {
        data: encode_transport_safe(&pcm16_to_bytes(&pcm)),
    }
}

/// Downlink chain: raw session bytes to playable floats.
pub fn decode_remote_chunk(bytes: &[u8]) -> Vec<f32> {
    pcm16_to_float(&bytes_to_pcm16(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_resample_identity() {
        let input = vec![0.1, -0.2, 0.3, 0.4];
        assert_eq!(resample(&input, 16_000, 16_000), input);
    }

    #[test]
    fn test_resample_lengths() {
        let block = vec![0.5f32; 4096];
        assert_eq!(resample(&block, 48_000, 16_000).len(), 1365);
        assert_eq!(resample(&block, 44_100, 16_000).len(), 1486);
        assert_eq!(resample(&block, 22_050, 16_000).len(), 2972);
    }

    #[test]
    fn test_resample_averages_windows() {
        let input = [0.0, 0.3, 0.6, 0.9, 0.9, 0.9];
        let out = resample(&input, 48_000, 16_000);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.3).abs() < 1e-6);
        assert!((out[1] - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_resample_constant_signal_stays_constant() {
        let block = vec![0.25f32; 4096];
        for rate in [44_100, 48_000, 96_000] {
            let out = resample(&block, rate, 16_000);
            assert!(out.iter().all(|s| (s - 0.25).abs() < 1e-6), "rate {rate}");
        }
    }

    #[test]
    fn test_pcm16_scaling_and_clamping() {
        assert_eq!(to_pcm16(&[0.0, 1.0, -1.0, 2.0, -3.0]), vec![0, 32767, -32768, 32767, -32768]);
        assert_eq!(to_pcm16(&[0.5, -0.5]), vec![16383, -16384]);
    }

    #[test]
    fn test_pcm16_round_trip_within_one_step() {
        let mut rng = rand::rng();
        let pcm: Vec<i16> = (0..2048).map(|_| rng.random::<i16>()).collect();
        let back = to_pcm16(&pcm16_to_float(&pcm));
        for (a, b) in pcm.iter().zip(back.iter()) {
            assert!((*a as i32 - *b as i32).abs() <= 1, "{a} vs {b}");
        }
    }

    #[test]
    fn test_float_round_trip_is_close() {
        let mut rng = rand::rng();
        let floats: Vec<f32> = (0..2048).map(|_| rng.random_range(-1.0f32..=1.0)).collect();
        let back = pcm16_to_float(&to_pcm16(&floats));
        // positive samples scale up by 32767 and back down by 32768
        let tolerance = 2.0 / 32768.0;
        for (a, b) in floats.iter().zip(back.iter()) {
            assert!((a - b).abs() <= tolerance, "{a} vs {b}");
        }
    }

    #[test]
    fn test_transport_round_trip_is_exact() {
        let mut rng = rand::rng();
        for len in [0usize, 1, 2, 3, 255, 4096] {
            let bytes: Vec<u8> = (0..len).map(|_| rng.random::<u8>()).collect();
            let text = encode_transport_safe(&bytes);
            assert_eq!(decode_transport_safe(&text).unwrap(), bytes);
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_transport_safe("not base64!!").is_err());
    }

    #[test]
    fn test_bytes_to_pcm16_little_endian() {
        assert_eq!(bytes_to_pcm16(&[0x01, 0x00, 0xff, 0x7f, 0x09]), vec![1, 32767]);
        assert_eq!(pcm16_to_bytes(&[1, -1]), vec![0x01, 0x00, 0xff, 0xff]);
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[0.05; 4096]) - 0.05).abs() < 1e-4);
        assert!((rms(&[1.0, -1.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_encode_audio_block() {
        let payload = encode_audio_block(&vec![0.0f32; 4096], 48_000);
        let bytes = decode_transport_safe(&payload.data).unwrap();
        assert_eq!(bytes.len(), 1365 * 2);
        assert!(bytes.iter().all(|b| *b == 0));
        assert_eq!(payload.mime_type(), "audio/pcm;rate=16000");
    }
}
