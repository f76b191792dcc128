//! Mono -> Stereo Render Kernel
//!
//! Pan/gain each sample into interleaved stereo while metering, then soft
//! clip the whole block with each ear handled independently.

use crate::error::DspError;
use crate::meter::{BlockMeter, Levels, RmsSource};
use crate::pan::StereoGain;
use crate::soft_clip::soft_clip_interleaved;

/// Render `input` into `output` as `[L0, R0, L1, R1, ...]`
///
/// `linear_gain` is the combined channel+master gain already folded into
/// `gains`; it is passed separately only for metering.
///
/// # Real-time Safety
/// No allocations. `output` must be exactly twice the length of `input`.
pub fn render_mono_to_stereo(
    input: &[f32],
    gains: StereoGain,
    linear_gain: f32,
    rms_source: RmsSource,
    output: &mut [f32],
) -> Result<Levels, DspError> {
    let expected = input.len() * 2;
    if output.len() != expected {
        return Err(DspError::BufferSizeMismatch {
            expected,
            got: output.len(),
        });
    }

    let mut meter = BlockMeter::new(rms_source, linear_gain);
    for (&sample, frame) in input.iter().zip(output.chunks_exact_mut(2)) {
        frame[0] = sample * gains.left;
        frame[1] = sample * gains.right;
        meter.push(sample);
    }
    soft_clip_interleaved(output);

    Ok(meter.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gain::db_to_linear;
    use crate::soft_clip::soft_clip;
    use std::f32::consts::FRAC_PI_4;

    #[test]
    fn test_center_pan_plus_6db() {
        let linear = db_to_linear(6.0);
        let gains = StereoGain::constant_power(0.0, linear);
        let expected_gain = linear * FRAC_PI_4.cos();
        assert!((gains.left - expected_gain).abs() < 1e-6);
        assert!((gains.right - expected_gain).abs() < 1e-6);

        let input = [0.5_f32; 10];
        let mut output = [0.0_f32; 20];
        let levels =
            render_mono_to_stereo(&input, gains, linear, RmsSource::PreGain, &mut output).unwrap();

        let expected = soft_clip(0.5 * gains.left);
        for frame in output.chunks_exact(2) {
            assert_eq!(frame[0], expected);
            assert!((frame[1] - expected).abs() < 1e-6);
        }
        assert!((levels.peak - 0.5 * linear).abs() < 1e-6);
        assert!((levels.rms - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_hard_pan_silences_other_ear() {
        let gains = StereoGain::constant_power(-1.0, 1.0);
        let input = [0.25_f32, -0.25];
        let mut output = [1.0_f32; 4];
        render_mono_to_stereo(&input, gains, 1.0, RmsSource::PreGain, &mut output).unwrap();
        assert!((output[0] - 0.25).abs() < 1e-6);
        assert!(output[1].abs() < 1e-6);
        assert!((output[2] + 0.25).abs() < 1e-6);
        assert!(output[3].abs() < 1e-6);
    }

    #[test]
    fn test_hot_signal_is_bounded() {
        let linear = db_to_linear(12.0);
        let gains = StereoGain::constant_power(0.0, linear);
        let input = [1.0_f32, -1.0, 0.9];
        let mut output = [0.0_f32; 6];
        render_mono_to_stereo(&input, gains, linear, RmsSource::PreGain, &mut output).unwrap();
        assert!(output.iter().all(|s| s.abs() < 1.0));
    }

    #[test]
    fn test_ears_clip_independently() {
        let gains = StereoGain {
            left: 4.0,
            right: 0.5,
        };
        let input = [0.5_f32, -0.5];
        let mut output = [0.0_f32; 4];
        render_mono_to_stereo(&input, gains, 1.0, RmsSource::PreGain, &mut output).unwrap();
        assert_eq!(output[0], soft_clip(2.0));
        assert_eq!(output[1], 0.25);
        assert_eq!(output[2], soft_clip(-2.0));
        assert_eq!(output[3], -0.25);
    }

    #[test]
    fn test_size_mismatch() {
        let input = [0.0_f32; 4];
        let mut output = [0.0_f32; 4];
        let err = render_mono_to_stereo(
            &input,
            StereoGain::default(),
            1.0,
            RmsSource::PreGain,
            &mut output,
        )
        .unwrap_err();
        assert_eq!(err, DspError::BufferSizeMismatch { expected: 8, got: 4 });
    }

    #[test]
    fn test_empty_block() {
        let mut output: [f32; 0] = [];
        let levels =
            render_mono_to_stereo(&[], StereoGain::default(), 1.0, RmsSource::PreGain, &mut output)
                .unwrap();
        assert_eq!(levels, Levels::default());
    }
}
