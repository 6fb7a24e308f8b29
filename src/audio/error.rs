use thiserror::Error;

/// Failures surfaced by [`AudioSource`](super::AudioSource) initializers and the host boundary.
///
/// Every variant is terminal for the attempt that produced it. Nothing is retried
/// internally; the caller decides whether to call the initializer again.
#[derive(Debug, Error)]
pub enum AudioSourceError {
    /// The user or platform refused access to the capture device.
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    /// No usable capture device, or the device vanished while opening it.
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A media element can only ever feed one analysis tap.
    #[error(
        "media element '{0}' is already connected to an audio source; \
         reuse the existing AudioSource or create a new MediaElement"
    )]
    AlreadyHasSource(String),

    /// The external connector was handed something it cannot analyse.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Any other host audio failure (stream build/play, decoding, worker spawn).
    #[error("audio backend error: {0}")]
    Backend(String),

    /// Options file could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AudioSourceError>;
