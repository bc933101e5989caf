//! Audio processing
//!
//! Samples -> BiquadCascade (prefilter) -> Square -> BiquadCascade (smoother) -> FractionalDownsampler -> Sqrt -> Envelope
pub mod biquad_cascade;
pub mod envelope_detector;
pub mod filter_design;
pub mod resampler;

pub use biquad_cascade::{BiquadCascade, CascadeCoefficients};
pub use envelope_detector::{
    EnvelopeDetector, RATIONAL_APPROXIMATION_MAX_DENOMINATOR, SMOOTHER_QUALITY_FACTOR,
};
pub use resampler::{FractionalDownsampler, ResamplingKernel, rational_approximation};
