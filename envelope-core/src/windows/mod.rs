//! Tapers for the resampling kernel.
//!
//! These are continuous. the kernel asks for arbitrary fractional offsets, so a precomputed array of N weights doesn't work here.
mod hanning;
mod kaiser;

pub use hanning::HanningWindow;
pub use kaiser::KaiserWindow;

pub trait Window {
    /// `x` is the position normalized to the window's radius. -1.0 and 1.0 are the edges.
    /// anything outside of that range must be 0.0
    fn window(&self, x: f64) -> f64;

    /// `n` evenly spaced weights across the whole window, edges included.
    /// handy for looking at the shape in tests and logs
    fn weights(&self, n: usize) -> Vec<f64> {
        match n {
            0 => Vec::new(),
            1 => vec![self.window(0.0)],
            _ => (0..n)
                .map(|i| self.window(2.0 * i as f64 / (n - 1) as f64 - 1.0))
                .collect(),
        }
    }
}
