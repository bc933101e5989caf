use core::f64::consts::PI;

use crate::windows::{KaiserWindow, Window};

/// anti-alias cutoff as a fraction of the lower of the two rates
pub const DEFAULT_CUTOFF_PROPORTION: f64 = 0.45;

/// how far the kernel reaches in each direction. measured in periods of the lower rate
pub const DEFAULT_RADIUS_PERIODS: f64 = 5.0;

pub const DEFAULT_KAISER_BETA: f64 = 6.0;

/// A windowed sinc lowpass, evaluated at offsets measured in input samples.
#[derive(Clone, Debug)]
pub struct ResamplingKernel<W: Window = KaiserWindow> {
    input_sample_rate_hz: f64,
    output_sample_rate_hz: f64,
    cutoff_hz: f64,
    /// in input samples
    radius: f64,
    window: W,
}

impl ResamplingKernel<KaiserWindow> {
    /// a reasonable kernel for converting between these two rates
    pub fn default_for(input_sample_rate_hz: f64, output_sample_rate_hz: f64) -> Self {
        let factor = input_sample_rate_hz / output_sample_rate_hz;

        Self::with_window(
            input_sample_rate_hz,
            output_sample_rate_hz,
            DEFAULT_CUTOFF_PROPORTION * input_sample_rate_hz.min(output_sample_rate_hz),
            DEFAULT_RADIUS_PERIODS * factor.max(1.0),
            KaiserWindow::new(DEFAULT_KAISER_BETA),
        )
    }
}

impl<W: Window> ResamplingKernel<W> {
    pub fn with_window(
        input_sample_rate_hz: f64,
        output_sample_rate_hz: f64,
        cutoff_hz: f64,
        radius: f64,
        window: W,
    ) -> Self {
        assert!(input_sample_rate_hz > 0.0);
        assert!(output_sample_rate_hz > 0.0);
        assert!(cutoff_hz > 0.0 && cutoff_hz <= input_sample_rate_hz / 2.0);
        assert!(radius >= 1.0);

        Self {
            input_sample_rate_hz,
            output_sample_rate_hz,
            cutoff_hz,
            radius,
            window,
        }
    }

    /// input samples per output sample
    pub fn factor(&self) -> f64 {
        self.input_sample_rate_hz / self.output_sample_rate_hz
    }

    pub fn input_sample_rate_hz(&self) -> f64 {
        self.input_sample_rate_hz
    }

    pub fn output_sample_rate_hz(&self) -> f64 {
        self.output_sample_rate_hz
    }

    pub fn cutoff_hz(&self) -> f64 {
        self.cutoff_hz
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// weight for an input sample `offset` input samples away from the output instant
    pub fn eval(&self, offset: f64) -> f64 {
        if offset.abs() >= self.radius {
            return 0.0;
        }

        let normalized_cutoff = self.cutoff_hz / self.input_sample_rate_hz;

        2.0 * normalized_cutoff
            * sinc(2.0 * normalized_cutoff * offset)
            * self.window.window(offset / self.radius)
    }
}

/// sin(pi x) / (pi x)
fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-9 {
        return 1.0;
    }

    let pi_x = PI * x;

    pi_x.sin() / pi_x
}
