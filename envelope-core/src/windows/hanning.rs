use core::f64::consts::PI;

use super::Window;

/// raised cosine. cheaper than kaiser but with a much worse stopband
#[derive(Clone, Copy, Debug, Default)]
pub struct HanningWindow;

impl Window for HanningWindow {
    fn window(&self, x: f64) -> f64 {
        if x.abs() > 1.0 {
            return 0.0;
        }

        0.5 + 0.5 * (PI * x).cos()
    }
}
