use super::Window;

/// Kaiser window. `beta` trades main lobe width for sidelobe level.
///
/// beta = 6 is roughly 60 dB of stopband rejection
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KaiserWindow {
    beta: f64,
    /// I0(beta). cached because every single tap divides by it
    scale: f64,
}

impl KaiserWindow {
    pub fn new(beta: f64) -> Self {
        Self {
            beta,
            scale: bessel_i0(beta),
        }
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }
}

impl Window for KaiserWindow {
    fn window(&self, x: f64) -> f64 {
        if x.abs() > 1.0 {
            return 0.0;
        }

        bessel_i0(self.beta * (1.0 - x * x).sqrt()) / self.scale
    }
}

/// zeroth order modified bessel function of the first kind.
///
/// power series. converges quickly for the betas a window uses
pub fn bessel_i0(x: f64) -> f64 {
    let half_x = x / 2.0;

    let mut sum = 1.0;
    let mut term = 1.0;
    let mut k = 1.0;

    loop {
        term *= (half_x / k) * (half_x / k);
        sum += term;

        if term < sum * 1e-16 {
            break;
        }

        k += 1.0;
    }

    sum
}
