//! Smoothed RMS level of a multichannel stream, at a much lower sample rate.
//!
//! Samples -> Prefilter -> Square -> Smoother -> Downsample -> Sqrt -> Envelope
//!
//! Audio can come in blocks of any size. A block too short to finish a single envelope sample is fine. [`EnvelopeDetector::most_recent_output`] always has the latest level.
use itertools::Itertools;
use ndarray::{Array2, ArrayView2, Axis};

use super::biquad_cascade::{BiquadCascade, CascadeCoefficients};
use super::filter_design::lowpass;
use super::resampler::{FractionalDownsampler, ResamplingKernel};
use crate::config::EnvelopeDetectorConfig;
use crate::errors::{EnvelopeError, EnvelopeResult};
use crate::logging::{debug, warn};

/// Q of the mean-square smoother. Critically damped, so the envelope never overshoots a step.
pub const SMOOTHER_QUALITY_FACTOR: f64 = 0.5;

/// limit on the denominator of the rate ratio. bounds the number of polyphase branches in each downsampler
pub const RATIONAL_APPROXIMATION_MAX_DENOMINATOR: u64 = 500;

pub struct EnvelopeDetector {
    /// 0 until `init` is called
    channel_count: usize,
    input_sample_rate_hz: f32,
    envelope_cutoff_hz: f32,
    envelope_sample_rate_hz: f32,
    prefilter: BiquadCascade,
    smoother: BiquadCascade,
    /// one per channel. never resized after `init`
    downsamplers: Box<[FractionalDownsampler]>,
    /// one per channel
    most_recent_output: Box<[f32]>,
    /// the prefiltered, squared, and smoothed block
    workspace: Array2<f32>,
    /// output of one channel's downsampler
    downsampled: Vec<f32>,
}

impl Default for EnvelopeDetector {
    fn default() -> Self {
        Self::uninit()
    }
}

impl EnvelopeDetector {
    /// Use this when the detector has to exist before its parameters are known.
    /// You MUST call `init` on this before using it! Until then `process_block` returns [`EnvelopeError::Uninitialized`].
    pub fn uninit() -> Self {
        Self {
            channel_count: 0,
            input_sample_rate_hz: 0.0,
            envelope_cutoff_hz: 0.0,
            envelope_sample_rate_hz: 0.0,
            prefilter: BiquadCascade::uninit(),
            smoother: BiquadCascade::uninit(),
            downsamplers: Box::default(),
            most_recent_output: Box::default(),
            workspace: Array2::zeros((0, 0)),
            downsampled: Vec::new(),
        }
    }

    /// create an initialized detector. `init` is called for you.
    pub fn new(config: &EnvelopeDetectorConfig, prefilter: CascadeCoefficients) -> Self {
        let mut x = Self::uninit();

        x.init(config, prefilter);

        x
    }

    /// Set the fixed parameters and build every stage.
    ///
    /// Panics if the config is invalid or if this detector was already initialized. Those are bugs in the caller, not something to recover from.
    pub fn init(&mut self, config: &EnvelopeDetectorConfig, prefilter: CascadeCoefficients) {
        if let Err(err) = self.try_init(config, prefilter) {
            panic!("failed initializing envelope detector: {}", err);
        }
    }

    /// `init` for configs that come from outside the program. Nothing is modified on error.
    pub fn try_init(
        &mut self,
        config: &EnvelopeDetectorConfig,
        prefilter: CascadeCoefficients,
    ) -> EnvelopeResult<()> {
        if self.is_initialized() {
            return Err(EnvelopeError::AlreadyInitialized);
        }

        config.validate()?;

        let input_sample_rate_hz = config.input_sample_rate_hz as f64;
        let envelope_sample_rate_hz = config.envelope_sample_rate_hz as f64;

        let smoother_coefficients = lowpass(
            input_sample_rate_hz,
            config.envelope_cutoff_hz as f64,
            SMOOTHER_QUALITY_FACTOR,
        )?;

        let kernel = ResamplingKernel::default_for(input_sample_rate_hz, envelope_sample_rate_hz);
        let downsampler =
            FractionalDownsampler::new(&kernel, RATIONAL_APPROXIMATION_MAX_DENOMINATOR);

        let (numerator, denominator) = downsampler.ratio();
        debug!(
            "envelope detector: {} channels. {} Hz -> {} Hz ({}/{}). {} taps per branch",
            config.channel_count,
            config.input_sample_rate_hz,
            config.envelope_sample_rate_hz,
            numerator,
            denominator,
            downsampler.taps_per_phase()
        );

        let channel_count = config.channel_count;

        self.prefilter.init(channel_count, prefilter);
        self.smoother
            .init(channel_count, CascadeCoefficients::from(smoother_coefficients));

        self.downsamplers = vec![downsampler; channel_count].into_boxed_slice();
        self.most_recent_output = vec![0.0; channel_count].into_boxed_slice();

        self.workspace = Array2::zeros((channel_count, 0));
        self.downsampled = Vec::new();

        self.input_sample_rate_hz = config.input_sample_rate_hz;
        self.envelope_cutoff_hz = config.envelope_cutoff_hz;
        self.envelope_sample_rate_hz = config.envelope_sample_rate_hz;
        self.channel_count = channel_count;

        Ok(())
    }

    /// Clear the history of every filter and downsampler. The configuration stays.
    ///
    /// `most_recent_output` is left alone. It is the last level that was measured, not filter history.
    pub fn reset(&mut self) {
        self.prefilter.reset();
        self.smoother.reset();

        for downsampler in self.downsamplers.iter_mut() {
            downsampler.reset();
        }
    }

    /// Process a block of audio. Rows are channels, columns are samples at the input rate.
    ///
    /// On success, `output` is replaced with the envelope samples that became available. Rows are channels, columns are samples at the envelope rate. There might be zero columns!
    ///
    /// If the detector isn't initialized or the channel count is wrong, nothing is modified.
    /// If the channels ever disagree on how many envelope samples they produced, the detector is reset and `output` is left alone.
    pub fn process_block(
        &mut self,
        input: ArrayView2<'_, f32>,
        output: &mut Array2<f32>,
    ) -> EnvelopeResult<()> {
        if !self.is_initialized() {
            warn!("envelope detector must be initialized before processing!");
            return Err(EnvelopeError::Uninitialized);
        }

        if input.nrows() != self.channel_count {
            warn!(
                "envelope detector expected {} channels. got {}",
                self.channel_count,
                input.nrows()
            );
            return Err(EnvelopeError::ChannelCountMismatch {
                expected: self.channel_count,
                actual: input.nrows(),
            });
        }

        // remove anything outside the band we care about
        self.prefilter.process_block(input, &mut self.workspace);

        // rectify. squaring gives power, which is smoother to filter than abs
        self.workspace.mapv_inplace(|x| x * x);

        // mean square
        self.smoother.process_block_in_place(&mut self.workspace);

        // every channel pushes the same number of samples through the same ratio, so they all produce the same number
        let channel_count = self.channel_count;
        let mut envelope: Option<Array2<f32>> = None;
        let mut mismatch = None;

        for (channel, (row, downsampler)) in self
            .workspace
            .axis_iter(Axis(0))
            .zip_eq(self.downsamplers.iter_mut())
            .enumerate()
        {
            downsampler.process_samples(row, &mut self.downsampled);

            let produced = self.downsampled.len();

            // channel 0 decides the shape
            let block = envelope.get_or_insert_with(|| Array2::zeros((channel_count, produced)));

            if produced != block.ncols() {
                mismatch = Some(EnvelopeError::ChannelLengthMismatch {
                    channel,
                    expected: block.ncols(),
                    actual: produced,
                });
                break;
            }

            // undo the square. ringing can make the mean square slightly negative
            for (y, &x) in block.row_mut(channel).iter_mut().zip(self.downsampled.iter()) {
                *y = x.max(0.0).sqrt();
            }
        }

        // the earlier channels already advanced. start everything over instead of leaving them out of step
        if let Some(err) = mismatch {
            warn!("envelope detector channels out of sync. resetting");
            self.reset();
            return Err(err);
        }

        let envelope = envelope.unwrap_or_else(|| Array2::zeros((channel_count, 0)));

        // keep the latest level around. a short block might not have produced anything
        if let Some(last) = envelope.ncols().checked_sub(1) {
            for (recent, &x) in self.most_recent_output.iter_mut().zip(envelope.column(last)) {
                *recent = x;
            }
        }

        *output = envelope;

        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.channel_count > 0
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn input_sample_rate_hz(&self) -> f32 {
        self.input_sample_rate_hz
    }

    pub fn envelope_cutoff_hz(&self) -> f32 {
        self.envelope_cutoff_hz
    }

    pub fn envelope_sample_rate_hz(&self) -> f32 {
        self.envelope_sample_rate_hz
    }

    /// the last envelope sample of every channel. all zeros until the first one is produced
    pub fn most_recent_output(&self) -> &[f32] {
        &self.most_recent_output
    }
}

#[cfg(test)]
mod tests {
    use core::f64::consts::PI;

    use super::*;
    use crate::audio::filter_design::{Q_BUTTERWORTH, bandpass_cascade, magnitude_response};

    const INPUT_HZ: f32 = 16_000.0;

    fn config(channel_count: usize) -> EnvelopeDetectorConfig {
        EnvelopeDetectorConfig::new(channel_count, INPUT_HZ, 10.0, 100.0)
    }

    fn prefilter() -> CascadeCoefficients {
        bandpass_cascade(INPUT_HZ as f64, 80.0, 4_000.0, Q_BUTTERWORTH).unwrap()
    }

    fn detector(channel_count: usize) -> EnvelopeDetector {
        EnvelopeDetector::new(&config(channel_count), prefilter())
    }

    fn sine(frequency_hz: f64, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * frequency_hz * i as f64 / INPUT_HZ as f64).sin() as f32)
            .collect()
    }

    /// rows are channels
    fn block(channels: &[&[f32]]) -> Array2<f32> {
        let len = channels.first().map_or(0, |c| c.len());

        Array2::from_shape_fn((channels.len(), len), |(c, i)| channels[c][i])
    }

    /// feed `signal` through in uneven blocks and collect every envelope sample per channel
    fn run_in_blocks(detector: &mut EnvelopeDetector, channels: &[&[f32]]) -> Vec<Vec<f32>> {
        let len = channels[0].len();

        let mut collected = vec![Vec::new(); channels.len()];
        let mut output = Array2::zeros((0, 0));

        let mut start = 0;
        let mut size = 1;
        while start < len {
            let end = (start + size).min(len);

            let chunk: Vec<&[f32]> = channels.iter().map(|c| &c[start..end]).collect();
            detector
                .process_block(block(&chunk).view(), &mut output)
                .unwrap();

            for (c, row) in output.axis_iter(Axis(0)).enumerate() {
                collected[c].extend(row.iter().copied());
            }

            start = end;
            size = (size * 5 + 11) % 701;
        }

        collected
    }

    #[test]
    fn test_empty_block() {
        let mut detector = detector(2);

        let mut output = Array2::ones((1, 1));
        detector
            .process_block(Array2::<f32>::zeros((2, 0)).view(), &mut output)
            .unwrap();

        assert_eq!(output.dim(), (2, 0));
        assert_eq!(detector.most_recent_output(), &[0.0, 0.0]);
    }

    #[test_log::test]
    fn test_uninitialized_fails() {
        let mut detector = EnvelopeDetector::default();

        assert!(!detector.is_initialized());

        let input = block(&[&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]]);
        let mut output = Array2::zeros((2, 3));

        assert!(matches!(
            detector.process_block(input.view(), &mut output),
            Err(EnvelopeError::Uninitialized)
        ));
        assert_eq!(output, Array2::<f32>::zeros((2, 3)));
        assert!(detector.most_recent_output().is_empty());

        // initializing later is fine
        detector.init(&config(2), prefilter());
        detector.process_block(input.view(), &mut output).unwrap();
        assert_eq!(output.nrows(), 2);
    }

    #[test]
    fn test_wrong_channel_count() {
        let mut detector = detector(2);

        let mut output = Array2::zeros((2, 3));

        assert!(matches!(
            detector.process_block(Array2::<f32>::zeros((3, 10)).view(), &mut output),
            Err(EnvelopeError::ChannelCountMismatch {
                expected: 2,
                actual: 3
            })
        ));
        assert_eq!(output, Array2::<f32>::zeros((2, 3)));
    }

    #[test]
    fn test_can_move_to_an_audio_thread() {
        fn assert_send<T: Send>() {}

        assert_send::<EnvelopeDetector>();
    }

    #[test]
    fn test_accessors() {
        let detector = detector(3);

        assert!(detector.is_initialized());
        assert_eq!(detector.channel_count(), 3);
        assert_eq!(detector.input_sample_rate_hz(), 16_000.0);
        assert_eq!(detector.envelope_cutoff_hz(), 10.0);
        assert_eq!(detector.envelope_sample_rate_hz(), 100.0);
        assert_eq!(detector.most_recent_output(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_output_is_finite_and_non_negative() {
        let mut detector = detector(2);

        // clicks, a square wave, and silence. plenty of ringing in every stage
        let clicks: Vec<f32> = (0..40_000)
            .map(|i| if i % 997 == 0 { 1_000.0 } else { 0.0 })
            .collect();
        let square: Vec<f32> = (0..40_000)
            .map(|i| match i {
                0..10_000 => if (i / 37) % 2 == 0 { 1.0 } else { -1.0 },
                10_000..20_000 => 0.0,
                _ => if (i / 5) % 2 == 0 { 30.0 } else { -30.0 },
            })
            .collect();

        let collected = run_in_blocks(&mut detector, &[&clicks, &square]);

        assert!(!collected[0].is_empty());

        for channel in collected.iter() {
            for &y in channel {
                assert!(y.is_finite(), "{}", y);
                assert!(y >= 0.0, "{}", y);
            }
        }
    }

    #[test]
    fn test_reset_twice_is_the_same_as_reset_once() {
        let warmup = sine(440.0, 0.8, 3_333);
        let signal = sine(1_000.0, 0.3, 8_000);

        let mut once = detector(1);
        run_in_blocks(&mut once, &[&warmup]);
        once.reset();
        let once_output = run_in_blocks(&mut once, &[&signal]);

        let mut twice = detector(1);
        run_in_blocks(&mut twice, &[&warmup]);
        twice.reset();
        twice.reset();
        let twice_output = run_in_blocks(&mut twice, &[&signal]);

        let mut fresh = detector(1);
        let fresh_output = run_in_blocks(&mut fresh, &[&signal]);

        assert!(!once_output[0].is_empty());
        assert_eq!(once_output, twice_output);
        assert_eq!(once_output, fresh_output);
        assert_eq!(once.most_recent_output(), twice.most_recent_output());
    }

    #[test]
    fn test_reset_keeps_config_and_level() {
        let mut detector = detector(1);

        run_in_blocks(&mut detector, &[&sine(1_000.0, 1.0, 16_000)]);

        let level = detector.most_recent_output().to_vec();
        assert!(level[0] > 0.0);

        detector.reset();

        assert!(detector.is_initialized());
        assert_eq!(detector.channel_count(), 1);
        assert_eq!(detector.envelope_sample_rate_hz(), 100.0);
        assert_eq!(detector.most_recent_output(), level.as_slice());
    }

    #[test_log::test]
    fn test_most_recent_output_survives_empty_blocks() {
        let mut detector = detector(1);

        let signal = sine(1_000.0, 1.0, 16_000);

        let mut output = Array2::zeros((0, 0));
        detector
            .process_block(block(&[&signal[..8_000]]).view(), &mut output)
            .unwrap();
        assert!(output.ncols() > 0);

        // one sample at a time until an envelope sample comes out
        let mut i = 8_000;
        loop {
            detector
                .process_block(block(&[&signal[i..i + 1]]).view(), &mut output)
                .unwrap();
            i += 1;

            if output.ncols() > 0 {
                break;
            }

            assert!(i < 8_000 + 1_000, "downsampler never produced anything");
        }

        let level = detector.most_recent_output().to_vec();
        assert!(level[0] > 0.0);
        assert_eq!(level[0], output[[0, output.ncols() - 1]]);

        // 160 input samples per envelope sample. one more can't be enough
        detector
            .process_block(block(&[&signal[i..i + 1]]).view(), &mut output)
            .unwrap();

        assert_eq!(output.dim(), (1, 0));
        assert_eq!(detector.most_recent_output(), level.as_slice());
    }

    #[test]
    fn test_channels_are_independent() {
        let left = sine(300.0, 0.9, 24_000);
        let right: Vec<f32> = sine(2_500.0, 0.2, 24_000)
            .into_iter()
            .enumerate()
            .map(|(i, x)| if i > 12_000 { x * 3.0 } else { x })
            .collect();

        let mut stereo = detector(2);
        let stereo_output = run_in_blocks(&mut stereo, &[&left, &right]);

        let mut left_only = detector(1);
        let left_output = run_in_blocks(&mut left_only, &[&left]);

        let mut right_only = detector(1);
        let right_output = run_in_blocks(&mut right_only, &[&right]);

        assert!(!stereo_output[0].is_empty());
        assert_eq!(stereo_output[0], left_output[0]);
        assert_eq!(stereo_output[1], right_output[0]);

        assert_eq!(stereo.most_recent_output()[0], left_only.most_recent_output()[0]);
        assert_eq!(stereo.most_recent_output()[1], right_only.most_recent_output()[0]);
    }

    #[test_log::test]
    fn test_converges_to_sine_rms() {
        let rms = 0.5;
        let frequency_hz = 1_000.0;

        let mut detector = detector(1);

        // 2 seconds is many times the smoother's time constant
        let signal = sine(frequency_hz, rms * core::f32::consts::SQRT_2, 32_000);
        let collected = run_in_blocks(&mut detector, &[&signal]);

        // about one envelope sample per 160 input samples, minus the kernel delay
        assert!(collected[0].len() > 180, "{}", collected[0].len());

        let gain = magnitude_response(&prefilter(), INPUT_HZ as f64, frequency_hz) as f32;
        let expected = rms * gain;

        let level = detector.most_recent_output()[0];
        assert!(
            (level - expected).abs() < expected * 0.02,
            "{} vs {}",
            level,
            expected
        );

        // it isn't just the last sample
        for &y in collected[0].iter().rev().take(20) {
            assert!((y - expected).abs() < expected * 0.02, "{} vs {}", y, expected);
        }
    }

    #[test_log::test]
    fn test_channel_length_mismatch_resets() {
        let signal = sine(440.0, 0.5, 16_000);

        let mut detector = detector(2);

        // a downsampler with a different ratio can't keep up with channel 0
        detector.downsamplers[1] = FractionalDownsampler::new(
            &ResamplingKernel::default_for(INPUT_HZ as f64, 50.0),
            RATIONAL_APPROXIMATION_MAX_DENOMINATOR,
        );

        let mut output = Array2::<f32>::zeros((2, 3));
        assert!(matches!(
            detector.process_block(block(&[&signal, &signal]).view(), &mut output),
            Err(EnvelopeError::ChannelLengthMismatch { channel: 1, .. })
        ));
        assert_eq!(output, Array2::<f32>::zeros((2, 3)));
        assert_eq!(detector.most_recent_output(), &[0.0, 0.0]);

        // every stage is back at the start. with matching downsamplers it behaves like a fresh detector
        detector.downsamplers[1] = detector.downsamplers[0].clone();
        let after = run_in_blocks(&mut detector, &[&signal, &signal]);

        let mut fresh = self::detector(2);
        let expected = run_in_blocks(&mut fresh, &[&signal, &signal]);

        assert!(!expected[0].is_empty());
        assert_eq!(after, expected);
    }

    /// Constant input skips the prefilter question entirely. The envelope is then the square root of the smoother's step response.
    #[test_log::test]
    fn test_step_response_follows_the_envelope_cutoff() {
        let config = EnvelopeDetectorConfig::new(1, INPUT_HZ, 10.0, 100.0);
        let mut detector = EnvelopeDetector::new(&config, CascadeCoefficients::identity());

        let ones = vec![1.0f32; 16_000];
        let collected = run_in_blocks(&mut detector, &[&ones]);

        // envelope sample n is at n / 100 seconds
        let at = |seconds: f64| collected[0][(seconds * 100.0).round() as usize] as f64;

        // critically damped with a 10 Hz corner: 1 - e^(-wt) (1 + wt) with w = 2 pi 10
        let expected = |seconds: f64| {
            let wt = 2.0 * PI * 10.0 * seconds;
            (1.0 - (-wt).exp() * (1.0 + wt)).sqrt()
        };

        // a 2.5 Hz corner would only be at 0.2 here
        assert!((at(0.02) - expected(0.02)).abs() < 0.05, "{} vs {}", at(0.02), expected(0.02));
        assert!((at(0.05) - expected(0.05)).abs() < 0.05, "{} vs {}", at(0.05), expected(0.05));
        assert!(at(0.1) > 0.97, "{}", at(0.1));

        let level = detector.most_recent_output()[0];
        assert!((level - 1.0).abs() < 1e-3, "{}", level);
    }

    #[test]
    fn test_smoother_corner_is_the_envelope_cutoff() {
        let smoother = lowpass(INPUT_HZ as f64, 10.0, SMOOTHER_QUALITY_FACTOR).unwrap();
        let smoother = CascadeCoefficients::from(smoother);

        // a critically damped section is down 6 dB at its corner
        let gain = magnitude_response(&smoother, INPUT_HZ as f64, 10.0);
        assert!((gain - 0.5).abs() < 1e-4, "{}", gain);

        // and the prefilter used in these tests is flat across its band
        let gain = magnitude_response(&prefilter(), INPUT_HZ as f64, 1_000.0);
        assert!(gain > 0.99 && gain <= 1.0, "{}", gain);
    }

    #[test]
    fn test_try_init_rejects_huge_downsampling() {
        let mut detector = EnvelopeDetector::uninit();

        assert!(matches!(
            detector.try_init(
                &EnvelopeDetectorConfig::new(1, 16_000.0, 1e-21, 1e-20),
                CascadeCoefficients::identity()
            ),
            Err(EnvelopeError::InvalidConfig(_))
        ));
        assert!(!detector.is_initialized());
    }

    #[test]
    #[should_panic]
    fn test_init_rejects_upsampling() {
        EnvelopeDetector::new(
            &EnvelopeDetectorConfig::new(1, 8_000.0, 10.0, 16_000.0),
            CascadeCoefficients::identity(),
        );
    }

    #[test]
    #[should_panic]
    fn test_init_rejects_cutoff_at_envelope_nyquist() {
        EnvelopeDetector::new(
            &EnvelopeDetectorConfig::new(1, 16_000.0, 50.0, 100.0),
            CascadeCoefficients::identity(),
        );
    }

    #[test]
    #[should_panic]
    fn test_init_rejects_zero_channels() {
        EnvelopeDetector::new(
            &EnvelopeDetectorConfig::new(0, 16_000.0, 10.0, 100.0),
            CascadeCoefficients::identity(),
        );
    }

    #[test]
    #[should_panic]
    fn test_init_twice_panics() {
        let mut detector = detector(1);

        detector.init(&config(1), prefilter());
    }

    #[test]
    fn test_try_init() {
        let mut detector = EnvelopeDetector::uninit();

        assert!(matches!(
            detector.try_init(
                &EnvelopeDetectorConfig::new(1, 16_000.0, 60.0, 100.0),
                prefilter()
            ),
            Err(EnvelopeError::InvalidConfig(_))
        ));
        assert!(!detector.is_initialized());

        detector.try_init(&config(1), prefilter()).unwrap();
        assert!(detector.is_initialized());

        assert!(matches!(
            detector.try_init(&config(1), prefilter()),
            Err(EnvelopeError::AlreadyInitialized)
        ));
    }
}
