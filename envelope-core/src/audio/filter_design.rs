//! Coefficient design for the biquads.
//!
//! RBJ cookbook sections stored as `biquad` coefficients, plus the couple of shapes the envelope detector needs.
use core::f64::consts::PI;

use biquad::{Coefficients, Errors};
use num::Complex;

use super::biquad_cascade::CascadeCoefficients;
use crate::errors::{EnvelopeError, EnvelopeResult};

/// quality factor of a two pole butterworth section
pub const Q_BUTTERWORTH: f64 = core::f64::consts::FRAC_1_SQRT_2;

/// which cookbook section to design
#[derive(Clone, Copy, Debug, PartialEq)]
enum Section {
    LowPass,
    HighPass,
}

/// RBJ cookbook coefficients, normalized so `a0 == 1`.
///
/// `biquad::Coefficients::from_params` 0.5.0 puts the corner at a quarter of the requested frequency. don't use it
fn design(
    section: Section,
    sample_rate_hz: f64,
    cutoff_hz: f64,
    quality_factor: f64,
) -> EnvelopeResult<Coefficients<f64>> {
    if !(sample_rate_hz > 0.0) || !sample_rate_hz.is_finite() {
        return Err(EnvelopeError::FilterDesign(Errors::NegativeFrequency));
    }

    if !(cutoff_hz > 0.0) {
        return Err(EnvelopeError::FilterDesign(Errors::NegativeFrequency));
    }

    if 2.0 * cutoff_hz > sample_rate_hz {
        return Err(EnvelopeError::FilterDesign(Errors::OutsideNyquist));
    }

    if !(quality_factor > 0.0) {
        return Err(EnvelopeError::FilterDesign(Errors::NegativeQ));
    }

    let omega = 2.0 * PI * cutoff_hz / sample_rate_hz;
    let (sin, cos) = omega.sin_cos();
    let alpha = sin / (2.0 * quality_factor);

    let (b0, b1, b2) = match section {
        Section::LowPass => ((1.0 - cos) / 2.0, 1.0 - cos, (1.0 - cos) / 2.0),
        Section::HighPass => ((1.0 + cos) / 2.0, -(1.0 + cos), (1.0 + cos) / 2.0),
    };

    let a0 = 1.0 + alpha;

    Ok(Coefficients {
        a1: -2.0 * cos / a0,
        a2: (1.0 - alpha) / a0,
        b0: b0 / a0,
        b1: b1 / a0,
        b2: b2 / a0,
    })
}

/// second order lowpass.
///
/// a quality factor of 0.5 is critically damped. the step response never overshoots
pub fn lowpass(
    sample_rate_hz: f64,
    cutoff_hz: f64,
    quality_factor: f64,
) -> EnvelopeResult<Coefficients<f64>> {
    design(Section::LowPass, sample_rate_hz, cutoff_hz, quality_factor)
}

/// second order highpass
pub fn highpass(
    sample_rate_hz: f64,
    cutoff_hz: f64,
    quality_factor: f64,
) -> EnvelopeResult<Coefficients<f64>> {
    design(Section::HighPass, sample_rate_hz, cutoff_hz, quality_factor)
}

/// highpass at `low_hz` followed by lowpass at `high_hz`.
///
/// This is the usual prefilter for an envelope. It keeps DC offsets and rumble out of the level and stops anything above the band from aliasing.
pub fn bandpass_cascade(
    sample_rate_hz: f64,
    low_hz: f64,
    high_hz: f64,
    quality_factor: f64,
) -> EnvelopeResult<CascadeCoefficients> {
    if !(low_hz < high_hz) {
        return Err(EnvelopeError::InvalidConfig(
            "bandpass low_hz must be below high_hz",
        ));
    }

    let sections = vec![
        highpass(sample_rate_hz, low_hz, quality_factor)?,
        lowpass(sample_rate_hz, high_hz, quality_factor)?,
    ];

    Ok(CascadeCoefficients(sections))
}

/// |H(e^jw)| of one section
pub fn section_magnitude(coeffs: &Coefficients<f64>, sample_rate_hz: f64, frequency_hz: f64) -> f64 {
    let w = 2.0 * PI * frequency_hz / sample_rate_hz;

    // z^-1 and z^-2 on the unit circle
    let z1 = Complex::from_polar(1.0, -w);
    let z2 = z1 * z1;

    let numerator = coeffs.b0 + z1 * coeffs.b1 + z2 * coeffs.b2;
    let denominator = 1.0 + z1 * coeffs.a1 + z2 * coeffs.a2;

    (numerator / denominator).norm()
}

/// gain of the whole cascade at one frequency. the sections are in series so their gains multiply
pub fn magnitude_response(
    cascade: &CascadeCoefficients,
    sample_rate_hz: f64,
    frequency_hz: f64,
) -> f64 {
    cascade
        .0
        .iter()
        .map(|section| section_magnitude(section, sample_rate_hz, frequency_hz))
        .product()
}
