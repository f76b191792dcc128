//! Constant-Power Panning
//!
//! Maps a pan position in `[-1, 1]` onto a quarter circle:
//!
//! ```text
//! angle = (pan + 1) * π/4        // 0 .. π/2
//! left  = cos(angle) * gain
//! right = sin(angle) * gain
//! ```
//!
//! `left² + right²` stays equal to `gain²` across the sweep, so a source
//! keeps the same perceived loudness while it moves. At center both sides
//! sit at -3dB.

use std::f32::consts::FRAC_PI_4;

/// Per-ear linear gains for one channel
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StereoGain {
    pub left: f32,
    pub right: f32,
}

impl StereoGain {
    /// Build the per-ear gains for `pan` at a given linear gain
    ///
    /// `pan` is expected pre-clamped; out-of-range values are clamped here
    /// as well so the law never leaves the quarter circle.
    #[inline]
    pub fn constant_power(pan: f32, linear_gain: f32) -> Self {
        let angle = (clamp_pan(pan) + 1.0) * FRAC_PI_4;
        Self {
            left: angle.cos() * linear_gain,
            right: angle.sin() * linear_gain,
        }
    }

    /// Total power `left² + right²`
    #[inline]
    pub fn power(&self) -> f32 {
        self.left * self.left + self.right * self.right
    }

    /// True when neither ear would receive signal
    #[inline]
    pub fn is_silent(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }
}

/// Clamp a pan position to `[-1, 1]`; NaN collapses to center
#[inline]
pub fn clamp_pan(pan: f32) -> f32 {
    if pan.is_nan() {
        0.0
    } else {
        pan.clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_is_minus_3db() {
        let g = StereoGain::constant_power(0.0, 1.0);
        assert!((g.left - FRAC_PI_4.cos()).abs() < 1e-6);
        assert!((g.left - g.right).abs() < 1e-6);
        assert!((g.left - 0.7071).abs() < 1e-3);
    }

    #[test]
    fn test_hard_left_and_right() {
        let left = StereoGain::constant_power(-1.0, 1.0);
        assert!((left.left - 1.0).abs() < 1e-6);
        assert!(left.right.abs() < 1e-6);

        let right = StereoGain::constant_power(1.0, 1.0);
        assert!(right.left.abs() < 1e-6);
        assert!((right.right - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_constant_power_across_sweep() {
        for gain in [0.25_f32, 1.0, 1.995, 3.98] {
            let expected = gain * gain;
            let mut pan = -1.0_f32;
            while pan <= 1.0 {
                let g = StereoGain::constant_power(pan, gain);
                assert!(
                    (g.power() - expected).abs() < 1e-4 * expected.max(1.0),
                    "power {} != {} at pan {}",
                    g.power(),
                    expected,
                    pan
                );
                pan += 0.05;
            }
        }
    }

    #[test]
    fn test_out_of_range_pan_is_clamped() {
        assert_eq!(
            StereoGain::constant_power(5.0, 1.0),
            StereoGain::constant_power(1.0, 1.0)
        );
        assert_eq!(clamp_pan(-3.0), -1.0);
        assert_eq!(clamp_pan(f32::NAN), 0.0);
    }

    #[test]
    fn test_zero_gain_is_silent() {
        assert!(StereoGain::constant_power(0.3, 0.0).is_silent());
        assert!(!StereoGain::constant_power(0.3, 0.1).is_silent());
    }
}
