//! RF Mix DSP - Per-sample math for the render pipeline
//!
//! This crate provides the sample-level building blocks used by the engine:
//! - dB <-> linear gain conversion with a hard mute floor at -60dB
//! - Constant-power panning (sin/cos law)
//! - Soft clipping that bounds output without a hard digital ceiling
//! - Block metering (peak and RMS)
//! - A single-pass mono -> interleaved stereo render kernel
//!
//! # Architecture
//!
//! Nothing here allocates, locks or performs I/O. Every function is safe to
//! call from the latency-sensitive producer path that feeds RF blocks.

mod error;
mod gain;
mod meter;
mod pan;
mod render;
mod soft_clip;

pub use error::DspError;
pub use gain::{clamp_gain_db, db_to_linear, linear_to_db, MAX_GAIN_DB, MIN_GAIN_DB};
pub use meter::{BlockMeter, Levels, RmsSource};
pub use pan::{clamp_pan, StereoGain};
pub use render::render_mono_to_stereo;
pub use soft_clip::{soft_clip, soft_clip_interleaved, SOFT_CLIP_CEILING};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        // Verify all public types are accessible
        let gains = StereoGain::constant_power(0.0, db_to_linear(0.0));
        let _meter = BlockMeter::new(RmsSource::default(), 1.0);
        assert!(gains.left > 0.0);
    }
}
