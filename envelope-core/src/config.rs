use serde::{Deserialize, Serialize};

use crate::errors::{EnvelopeError, EnvelopeResult};

/// Most input samples per envelope sample that `validate` accepts.
///
/// The downsampler's kernel grows with this factor, so anything bigger takes a long time to build and a lot of memory to hold.
pub const MAX_DOWNSAMPLING_FACTOR: f32 = 10_000.0;

/// Fixed parameters of an [`EnvelopeDetector`](crate::EnvelopeDetector).
///
/// The prefilter coefficients are passed separately since they aren't plain data.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EnvelopeDetectorConfig {
    pub channel_count: usize,
    /// rate of the audio passed to `process_block`
    pub input_sample_rate_hz: f32,
    /// corner of the mean-square smoother. must be below half the envelope rate
    pub envelope_cutoff_hz: f32,
    /// rate of the envelope that comes out of `process_block`
    pub envelope_sample_rate_hz: f32,
}

impl Default for EnvelopeDetectorConfig {
    fn default() -> Self {
        Self {
            channel_count: 1,
            input_sample_rate_hz: 16_000.0,
            envelope_cutoff_hz: 10.0,
            envelope_sample_rate_hz: 100.0,
        }
    }
}

impl EnvelopeDetectorConfig {
    pub const fn new(
        channel_count: usize,
        input_sample_rate_hz: f32,
        envelope_cutoff_hz: f32,
        envelope_sample_rate_hz: f32,
    ) -> Self {
        Self {
            channel_count,
            input_sample_rate_hz,
            envelope_cutoff_hz,
            envelope_sample_rate_hz,
        }
    }

    /// check the relationships between the rates. this only downsamples!
    pub fn validate(&self) -> EnvelopeResult<()> {
        if self.channel_count == 0 {
            return Err(EnvelopeError::InvalidConfig("channel_count must be > 0"));
        }

        if !is_positive_rate(self.input_sample_rate_hz) {
            return Err(EnvelopeError::InvalidConfig(
                "input_sample_rate_hz must be finite and > 0",
            ));
        }

        if !is_positive_rate(self.envelope_sample_rate_hz) {
            return Err(EnvelopeError::InvalidConfig(
                "envelope_sample_rate_hz must be finite and > 0",
            ));
        }

        if self.envelope_sample_rate_hz > self.input_sample_rate_hz {
            return Err(EnvelopeError::InvalidConfig(
                "envelope_sample_rate_hz must be <= input_sample_rate_hz",
            ));
        }

        if self.input_sample_rate_hz / self.envelope_sample_rate_hz > MAX_DOWNSAMPLING_FACTOR {
            return Err(EnvelopeError::InvalidConfig(
                "input_sample_rate_hz / envelope_sample_rate_hz must be <= MAX_DOWNSAMPLING_FACTOR",
            ));
        }

        if !is_positive_rate(self.envelope_cutoff_hz) {
            return Err(EnvelopeError::InvalidConfig(
                "envelope_cutoff_hz must be finite and > 0",
            ));
        }

        if self.envelope_cutoff_hz >= self.envelope_sample_rate_hz / 2.0 {
            return Err(EnvelopeError::InvalidConfig(
                "envelope_cutoff_hz must be below half of envelope_sample_rate_hz",
            ));
        }

        Ok(())
    }
}

#[inline]
fn is_positive_rate(x: f32) -> bool {
    x.is_finite() && x > 0.0
}
