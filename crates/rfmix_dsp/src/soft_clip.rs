//! Soft Clipping
//!
//! Bounds rendered samples without a hard ceiling at 0dBFS.
//!
//! # Curve
//!
//! - `|x| <= 1`: passthrough, bit-exact
//! - `x > 1`: `1 - 1/(1 + (x - 1))`, mirrored for `x < -1`
//!
//! Overshoot folds back into `(0, 1)` and approaches 1.0 as the excess grows.
//! The result is additionally capped at [`SOFT_CLIP_CEILING`] so very large
//! excesses cannot round up to exactly 1.0 in f32.

/// Largest f32 strictly below 1.0
pub const SOFT_CLIP_CEILING: f32 = 1.0 - f32::EPSILON / 2.0;

/// Soft clip a single sample
///
/// # Real-time Safety
/// No allocations, no syscalls, O(1) time.
#[inline]
pub fn soft_clip(sample: f32) -> f32 {
    if sample > 1.0 {
        let excess = sample - 1.0;
        (1.0 - 1.0 / (1.0 + excess)).min(SOFT_CLIP_CEILING)
    } else if sample < -1.0 {
        let excess = -sample - 1.0;
        (-1.0 + 1.0 / (1.0 + excess)).max(-SOFT_CLIP_CEILING)
    } else if sample.is_nan() {
        0.0
    } else {
        sample
    }
}

/// Soft clip an interleaved buffer in-place
#[inline]
pub fn soft_clip_interleaved(buffer: &mut [f32]) {
    for sample in buffer.iter_mut() {
        *sample = soft_clip(*sample);
    }
}
