use thiserror::Error;

/// everything that can go wrong while building or running an envelope detector.
///
/// bad parameters passed to `EnvelopeDetector::init` are a bug in the caller and panic instead.
/// `try_init` is the only path that turns those into [`EnvelopeError::InvalidConfig`].
#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("envelope detector must be initialized before processing")]
    Uninitialized,
    #[error("envelope detector is already initialized")]
    AlreadyInitialized,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("expected {expected} channels, got {actual}")]
    ChannelCountMismatch { expected: usize, actual: usize },
    /// every downsampler shares one ratio, so this means the per-channel state got out of sync
    #[error("channel {channel} produced {actual} envelope samples instead of {expected}")]
    ChannelLengthMismatch {
        channel: usize,
        expected: usize,
        actual: usize,
    },
    /// `biquad::Errors` doesn't implement `std::error::Error`, so no `#[from]`
    #[error("filter design error: {0:?}")]
    FilterDesign(biquad::Errors),
}

pub type EnvelopeResult<T> = Result<T, EnvelopeError>;
