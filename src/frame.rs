//! Frame sampling
//!
//! On every tick the current video frame is compressed to a JPEG still and
//! forwarded, but only while the assistant is listening. Nothing is buffered
//! across ticks: a source that is not ready simply yields no frame.

use crate::codec::{encode_transport_safe, EncodedImagePayload};
use crate::controller::TurnController;
use crate::gateway::RealtimeSender;
use crate::turn_fsm::AssistantState;
use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::{RgbImage, RgbaImage};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// How much of the stream a source has buffered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

/// Minimum readiness before a frame is worth sampling
pub const READY_THRESHOLD: ReadyState = ReadyState::HaveCurrentData;

/// A live video feed
pub trait VideoSource {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn ready_state(&self) -> ReadyState;
    fn current_frame(&self) -> Option<&RgbaImage>;
}

#[derive(Debug, Clone)]
pub struct FrameSampler {
    quality: u8,
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameSampler {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    /// One JPEG payload of the current frame, or nothing if the source is
    /// not ready yet.
    pub fn sample(&self, source: &dyn VideoSource) -> Option<EncodedImagePayload> {
        if source.width() == 0 || source.height() == 0 || source.ready_state() < READY_THRESHOLD {
            return None;
        }
        let frame = source.current_frame()?;

        let rgb: RgbImage = frame.convert();
        let mut jpeg = Vec::new();
        if let Err(e) = JpegEncoder::new_with_quality(&mut jpeg, self.quality).encode_image(&rgb) {
            debug!("Skipping frame, JPEG encoding failed: {}", e);
            return None;
        }

        Some(EncodedImagePayload {
            data: encode_transport_safe(&jpeg),
        })
    }
}

/// Per-tick work of the video loop
pub struct FrameLoop {
    sampler: FrameSampler,
    turn: Arc<TurnController>,
    sender: Arc<dyn RealtimeSender>,
    frames_sent: u64,
}

impl FrameLoop {
    pub fn new(sampler: FrameSampler, turn: Arc<TurnController>, sender: Arc<dyn RealtimeSender>) -> Self {
        Self {
            sampler,
            turn,
            sender,
            frames_sent: 0,
        }
    }

    /// Returns whether a frame went out on this tick.
    pub fn tick(&mut self, source: &dyn VideoSource) -> bool {
        if self.turn.state() != AssistantState::Listening {
            return false;
        }
        let Some(payload) = self.sampler.sample(source) else {
            return false;
        };

        self.sender.send_realtime_input(payload.into());
        self.frames_sent += 1;
        if self.frames_sent % 300 == 0 {
            debug!("{} frames sent", self.frames_sent);
        }
        true
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::codec::decode_transport_safe;
    use crate::gateway::tests::FakeGateway;
    use crate::playback::tests::FakeSink;
    use crate::playback::PlaybackScheduler;
    use crate::turn_fsm::Event;
    use image::Rgba;

    pub struct StillSource {
        pub frame: Option<RgbaImage>,
        pub ready: ReadyState,
    }

    impl StillSource {
        pub fn ready(width: u32, height: u32) -> Self {
            Self {
                frame: Some(RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 255]))),
                ready: ReadyState::HaveEnoughData,
            }
        }
    }

    impl VideoSource for StillSource {
        fn width(&self) -> u32 {
            self.frame.as_ref().map_or(0, |f| f.width())
        }
        fn height(&self) -> u32 {
            self.frame.as_ref().map_or(0, |f| f.height())
        }
        fn ready_state(&self) -> ReadyState {
            self.ready
        }
        fn current_frame(&self) -> Option<&RgbaImage> {
            self.frame.as_ref()
        }
    }

    #[test]
    fn test_zero_width_yields_nothing() {
        let source = StillSource {
            frame: None,
            ready: ReadyState::HaveEnoughData,
        };
        assert!(FrameSampler::default().sample(&source).is_none());
    }

    #[test]
    fn test_not_ready_yields_nothing() {
        let mut source = StillSource::ready(32, 24);
        source.ready = ReadyState::HaveMetadata;
        assert!(FrameSampler::default().sample(&source).is_none());
    }

    #[test]
    fn test_ready_source_yields_one_jpeg() {
        let source = StillSource::ready(32, 24);
        let payload = FrameSampler::default().sample(&source).unwrap();
        let jpeg = decode_transport_safe(&payload.data).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(payload.mime_type(), "image/jpeg");

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    fn frame_loop(gateway: Arc<FakeGateway>) -> (FrameLoop, Arc<TurnController>) {
        let playback = PlaybackScheduler::new(Box::new(FakeSink::default()));
        let turn = Arc::new(TurnController::new(playback));
        let sender: Arc<dyn RealtimeSender> = gateway;
        (FrameLoop::new(FrameSampler::default(), turn.clone(), sender), turn)
    }

    #[test]
    fn test_frames_only_go_out_while_listening() {
        let gateway = Arc::new(FakeGateway::connected());
        let (mut frames, turn) = frame_loop(gateway.clone());
        let source = StillSource::ready(16, 16);

        // idle
        assert!(!frames.tick(&source));

        turn.dispatch(Event::SessionOpened);
        assert!(frames.tick(&source));
        assert!(frames.tick(&source));

        turn.dispatch(Event::AudioChunk(vec![0; 480]));
        assert!(!frames.tick(&source));

        turn.dispatch(Event::TurnComplete);
        assert!(frames.tick(&source));

        let sent = gateway.sent();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|input| input.image.is_some() && input.audio.is_none()));
        assert_eq!(frames.frames_sent(), 3);
    }

    #[test]
    fn test_unready_source_skips_tick() {
        let gateway = Arc::new(FakeGateway::connected());
        let (mut frames, turn) = frame_loop(gateway.clone());
        turn.dispatch(Event::SessionOpened);

        let source = StillSource {
            frame: None,
            ready: ReadyState::HaveNothing,
        };
        assert!(!frames.tick(&source));
        assert!(gateway.sent().is_empty());
    }
}
