use biquad::{Biquad, Coefficients, DirectForm2Transposed};
use itertools::Itertools;
use ndarray::{Array2, ArrayView2, Axis};

/// second order sections, applied in order
#[derive(Clone, Debug, Default)]
pub struct CascadeCoefficients(pub Vec<Coefficients<f64>>);

impl CascadeCoefficients {
    /// no sections at all. samples pass through untouched
    pub const fn identity() -> Self {
        Self(Vec::new())
    }

    pub fn num_sections(&self) -> usize {
        self.0.len()
    }
}

impl From<Coefficients<f64>> for CascadeCoefficients {
    fn from(x: Coefficients<f64>) -> Self {
        Self(vec![x])
    }
}

/// A chain of biquads run independently on every channel.
///
/// All the channels share one set of coefficients but each has its own history.
/// Samples come in and out as f32. The state is f64 because low corners at audio rates put the poles very close to the unit circle.
pub struct BiquadCascade {
    coefficients: CascadeCoefficients,
    /// `filters[channel][section]`
    filters: Vec<Vec<DirectForm2Transposed<f64>>>,
}

impl Default for BiquadCascade {
    fn default() -> Self {
        Self::uninit()
    }
}

impl BiquadCascade {
    /// zero channels. You MUST call `init` before this does anything useful
    pub const fn uninit() -> Self {
        Self {
            coefficients: CascadeCoefficients::identity(),
            filters: Vec::new(),
        }
    }

    pub fn new(channel_count: usize, coefficients: CascadeCoefficients) -> Self {
        let mut x = Self::uninit();

        x.init(channel_count, coefficients);

        x
    }

    /// replaces any existing channels and clears all history
    pub fn init(&mut self, channel_count: usize, coefficients: CascadeCoefficients) {
        self.coefficients = coefficients;
        self.filters = (0..channel_count)
            .map(|_| fresh_sections(&self.coefficients))
            .collect();
    }

    pub fn reset(&mut self) {
        for channel in self.filters.iter_mut() {
            *channel = fresh_sections(&self.coefficients);
        }
    }

    pub fn channel_count(&self) -> usize {
        self.filters.len()
    }

    pub fn coefficients(&self) -> &CascadeCoefficients {
        &self.coefficients
    }

    /// filter `input` into `output`. `output` is resized to match `input` if needed
    pub fn process_block(&mut self, input: ArrayView2<'_, f32>, output: &mut Array2<f32>) {
        if output.dim() != input.dim() {
            *output = Array2::zeros(input.dim());
        }

        output.assign(&input);

        self.process_block_in_place(output);
    }

    /// rows are channels. columns are samples. panics if the number of rows doesn't match `channel_count`
    pub fn process_block_in_place(&mut self, block: &mut Array2<f32>) {
        for (mut row, sections) in block
            .axis_iter_mut(Axis(0))
            .zip_eq(self.filters.iter_mut())
        {
            for x in row.iter_mut() {
                let mut y = *x as f64;

                for section in sections.iter_mut() {
                    y = section.run(y);
                }

                *x = y as f32;
            }
        }
    }
}

fn fresh_sections(coefficients: &CascadeCoefficients) -> Vec<DirectForm2Transposed<f64>> {
    coefficients
        .0
        .iter()
        .map(|&c| DirectForm2Transposed::<f64>::new(c))
        .collect()
}
