//! Streaming RMS envelope of multichannel audio.
//!
//! Feed [`EnvelopeDetector::process_block`] audio in whatever block sizes you get. It returns a smoothed level per channel at a much lower rate.
pub mod audio;
pub mod config;
pub mod errors;
pub mod logging;
pub mod windows;

pub use audio::EnvelopeDetector;
pub use config::{EnvelopeDetectorConfig, MAX_DOWNSAMPLING_FACTOR};
pub use errors::{EnvelopeError, EnvelopeResult};
