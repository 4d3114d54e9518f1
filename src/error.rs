//! Error types for media devices

/// Failure to open or drive a local media device.
///
/// During acquisition any variant counts as a denied permission grant.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Microphone unavailable: {0}")]
    Microphone(String),

    #[error("Video source unavailable: {0}")]
    Video(String),

    #[error("Playback device error: {0}")]
    Playback(String),

    #[error("Device thread exited before reporting readiness")]
    DeviceThread,
}

/// Invalid or missing configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}
