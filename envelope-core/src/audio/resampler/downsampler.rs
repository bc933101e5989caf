use core::borrow::Borrow;
use std::sync::Arc;

use super::kernel::ResamplingKernel;
use super::rational_approximation;
use crate::logging::trace;
use crate::windows::Window;

/// the precomputed branches. never changes after `new`, so clones of a downsampler share it
#[derive(Debug)]
struct PolyphaseTable {
    /// input samples per output sample is `numerator / denominator`
    numerator: u64,
    denominator: u64,
    /// taps on each side of the output instant
    radius: usize,
    /// `denominator` branches of `2 * radius` taps, back to back
    taps: Vec<f32>,
}

impl PolyphaseTable {
    fn new<W: Window>(kernel: &ResamplingKernel<W>, max_denominator: u64) -> Self {
        let (numerator, denominator) = rational_approximation(kernel.factor(), max_denominator);

        let radius = kernel.radius().ceil() as usize;
        let taps_per_phase = 2 * radius;

        let mut taps = Vec::with_capacity(denominator as usize * taps_per_phase);

        let mut branch = vec![0.0f64; taps_per_phase];

        for phase in 0..denominator {
            let fraction = phase as f64 / denominator as f64;

            // tap j sits at input offset j + 1 - radius from the sample at or before the output instant
            for (j, w) in branch.iter_mut().enumerate() {
                let k = j as f64 + 1.0 - radius as f64;

                *w = kernel.eval(k - fraction);
            }

            // unity gain at DC on every branch. a constant level must come out as exactly that level
            let sum: f64 = branch.iter().sum();
            let scale = if sum.abs() > f64::EPSILON { 1.0 / sum } else { 1.0 };

            taps.extend(branch.iter().map(|w| (w * scale) as f32));
        }

        Self {
            numerator,
            denominator,
            radius,
            taps,
        }
    }

    #[inline]
    fn branch(&self, phase: u64) -> &[f32] {
        let taps_per_phase = 2 * self.radius;
        let start = phase as usize * taps_per_phase;

        &self.taps[start..start + taps_per_phase]
    }
}

/// Streaming polyphase downsampler for one channel.
///
/// Input is buffered between calls, so any block size works. Short blocks can produce no output at all.
/// How many samples come out only depends on how many samples have gone in so far, never on how they were split up.
#[derive(Clone, Debug)]
pub struct FractionalDownsampler {
    table: Arc<PolyphaseTable>,
    /// input that still has outputs depending on it
    buffer: Vec<f32>,
    /// buffer index of the input sample at or just before the next output instant
    next_index: usize,
    /// where the next output instant falls between two input samples. out of `table.denominator`
    next_phase: u64,
}

impl FractionalDownsampler {
    /// `max_denominator` bounds the fraction used for the rate ratio.
    /// the table holds that many branches at most
    pub fn new<W: Window>(kernel: &ResamplingKernel<W>, max_denominator: u64) -> Self {
        assert!(max_denominator > 0);

        let table = PolyphaseTable::new(kernel, max_denominator);

        trace!(
            "downsampler: {}/{} input samples per output, {} taps per branch",
            table.numerator,
            table.denominator,
            2 * table.radius
        );

        let mut x = Self {
            table: Arc::new(table),
            buffer: Vec::new(),
            next_index: 0,
            next_phase: 0,
        };

        x.reset();

        x
    }

    /// forget all buffered input. the next sample in lines up with the first output instant again
    pub fn reset(&mut self) {
        let history = self.table.radius - 1;

        // prime with silence so the first output can look backwards
        self.buffer.clear();
        self.buffer.resize(history, 0.0);

        self.next_index = history;
        self.next_phase = 0;
    }

    /// `(numerator, denominator)` input samples per output sample
    pub fn ratio(&self) -> (u64, u64) {
        (self.table.numerator, self.table.denominator)
    }

    pub fn taps_per_phase(&self) -> usize {
        2 * self.table.radius
    }

    /// Push `input` and write every output that is now complete into `output`.
    ///
    /// `output` is cleared first. It is up to the caller to reuse it between calls.
    pub fn process_samples<I>(&mut self, input: I, output: &mut Vec<f32>)
    where
        I: IntoIterator,
        I::Item: Borrow<f32>,
    {
        output.clear();

        self.buffer.extend(input.into_iter().map(|x| *x.borrow()));

        let table = &*self.table;
        let taps_per_phase = 2 * table.radius;

        while self.next_index + table.radius < self.buffer.len() {
            let start = self.next_index + 1 - table.radius;

            let y: f32 = self.buffer[start..start + taps_per_phase]
                .iter()
                .zip(table.branch(self.next_phase))
                .map(|(x, w)| x * w)
                .sum();

            output.push(y);

            self.next_phase += table.numerator;
            self.next_index += (self.next_phase / table.denominator) as usize;
            self.next_phase %= table.denominator;
        }

        // the oldest sample the next output still needs. the next output might even be past the end of what we have
        let consumed = (self.next_index + 1 - table.radius).min(self.buffer.len());

        self.buffer.drain(..consumed);
        self.next_index -= consumed;
    }
}
