//! Gain conversion and clamping
//!
//! Channel and master gains live in dB. Anything at or below the floor is
//! treated as a hard mute rather than a very small linear factor, so the
//! render pipeline can skip muted channels entirely.

/// Lowest channel/master gain; at or below this the signal is muted
pub const MIN_GAIN_DB: f32 = -60.0;

/// Highest channel/master gain
pub const MAX_GAIN_DB: f32 = 12.0;

/// Convert decibels to linear amplitude
///
/// Returns exactly `0.0` at or below [`MIN_GAIN_DB`].
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    if db <= MIN_GAIN_DB {
        0.0
    } else {
        10.0_f32.powf(db / 20.0)
    }
}

/// Convert linear amplitude to decibels, flooring at [`MIN_GAIN_DB`]
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear > 0.00001 {
        20.0 * linear.log10()
    } else {
        MIN_GAIN_DB
    }
}

/// Clamp a gain to `[MIN_GAIN_DB, MAX_GAIN_DB]`
///
/// NaN maps to the mute floor so a corrupt control value can never
/// reach the mixer.
#[inline]
pub fn clamp_gain_db(db: f32) -> f32 {
    if db.is_nan() {
        MIN_GAIN_DB
    } else {
        db.clamp(MIN_GAIN_DB, MAX_GAIN_DB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_is_silent() {
        assert_eq!(db_to_linear(-60.0), 0.0);
        assert_eq!(db_to_linear(-75.0), 0.0);
        assert_eq!(db_to_linear(f32::NEG_INFINITY), 0.0);
    }

    #[test]
    fn test_unity() {
        assert!((db_to_linear(0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_known_values() {
        // +6dB ≈ 1.995, -6dB ≈ 0.501
        assert!((db_to_linear(6.0) - 1.9953).abs() < 1e-3);
        assert!((db_to_linear(-6.0) - 0.5012).abs() < 1e-3);
        // Just above the floor is tiny but not zero
        assert!(db_to_linear(-59.9) > 0.0);
    }

    #[test]
    fn test_linear_to_db() {
        assert!((linear_to_db(1.0)).abs() < 1e-5);
        assert!((linear_to_db(0.5) + 6.0206).abs() < 1e-3);
        assert_eq!(linear_to_db(0.0), MIN_GAIN_DB);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp_gain_db(-100.0), -60.0);
        assert_eq!(clamp_gain_db(30.0), 12.0);
        assert_eq!(clamp_gain_db(3.5), 3.5);
        assert_eq!(clamp_gain_db(f32::INFINITY), 12.0);
        assert_eq!(clamp_gain_db(f32::NAN), MIN_GAIN_DB);
    }

    #[test]
    fn test_clamp_sweep() {
        let mut db = -120.0_f32;
        while db < 40.0 {
            let clamped = clamp_gain_db(db);
            assert_eq!(clamped, db.max(-60.0).min(12.0));
            db += 0.37;
        }
    }
}
