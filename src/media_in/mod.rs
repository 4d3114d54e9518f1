//! Local media acquisition
//!
//! Microphone and video are granted together: either both open or neither
//! stays open.

pub mod audio;
pub mod video;

pub use audio::Microphone;
pub use video::{ScreenSource, ScreenVideo};

use crate::capture::CapturePipeline;
use crate::error::MediaError;
use crate::frame::FrameLoop;
use std::time::Duration;
use tracing::info;

/// Acquired media, as seen by the session driver
pub trait MediaInput: Send {
    /// Attach the capture pipeline to the microphone and start the frame loop.
    fn start(&mut self, capture: CapturePipeline, frames: FrameLoop) -> Result<(), MediaError>;

    /// Release every device. Never fails; problems are logged.
    fn release(&mut self);
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub app_name: String,
    pub capture_rate: u32,
    pub frame_interval: Duration,
}

/// Microphone plus screen video
pub struct MediaStreams {
    pub microphone: Microphone,
    pub video: ScreenVideo,
}

/// Open both devices as one grant.
pub fn acquire(config: &MediaConfig) -> Result<MediaStreams, MediaError> {
    let mut microphone = Microphone::open(&config.app_name, config.capture_rate)?;
    let video = match ScreenVideo::open(config.frame_interval) {
        Ok(video) => video,
        Err(e) => {
            microphone.release();
            return Err(e);
        }
    };
    info!("Media acquired");
    Ok(MediaStreams { microphone, video })
}

impl MediaInput for MediaStreams {
    fn start(&mut self, capture: CapturePipeline, frames: FrameLoop) -> Result<(), MediaError> {
        self.microphone.start(capture.into_handler())?;
        self.video.start(frames)
    }

    fn release(&mut self) {
        self.microphone.release();
        self.video.release();
        info!("Media released");
    }
}
