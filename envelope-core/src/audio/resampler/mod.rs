//! Fractional rate conversion.
//!
//! The ratio between the two rates is turned into a fraction. That fraction picks how many polyphase branches the downsampler needs.
mod downsampler;
mod kernel;

pub use downsampler::FractionalDownsampler;
pub use kernel::ResamplingKernel;

/// Best rational approximation `numerator / denominator` of `x` with `denominator <= max_denominator`.
///
/// Walks the continued fraction of `x` and stops at the last convergent that fits. The semiconvergent between that and the next one is also considered.
///
/// `x` must be finite and > 0. `max_denominator` must be > 0.
pub fn rational_approximation(x: f64, max_denominator: u64) -> (u64, u64) {
    debug_assert!(x.is_finite() && x > 0.0);
    debug_assert!(max_denominator > 0);

    // convergents h/k. starts at h_{-2}/k_{-2} = 0/1 and h_{-1}/k_{-1} = 1/0
    let (mut h_prev, mut h) = (0u64, 1u64);
    let (mut k_prev, mut k) = (1u64, 0u64);

    let mut remainder = x;

    loop {
        let a = remainder.floor();
        let a_int = a as u64;

        let h_next = a_int * h + h_prev;
        let k_next = a_int * k + k_prev;

        if k_next > max_denominator {
            if k == 0 {
                // even the integer part doesn't fit. only possible when max_denominator is 0
                return (h_next, 1);
            }

            // the largest semiconvergent that still fits might be closer than the last convergent
            let n = (max_denominator - k_prev) / k;
            let semi_h = n * h + h_prev;
            let semi_k = n * k + k_prev;

            let semi_error = (semi_h as f64 / semi_k as f64 - x).abs();
            let convergent_error = (h as f64 / k as f64 - x).abs();

            if semi_k > 0 && semi_error < convergent_error {
                (h, k) = (semi_h, semi_k);
            }

            break;
        }

        (h_prev, h) = (h, h_next);
        (k_prev, k) = (k, k_next);

        let fraction = remainder - a;

        if fraction < 1e-12 || (h as f64 / k as f64 - x).abs() <= x * 1e-15 {
            break;
        }

        remainder = 1.0 / fraction;
    }

    let divisor = num::integer::gcd(h, k);

    (h / divisor, k / divisor)
}
