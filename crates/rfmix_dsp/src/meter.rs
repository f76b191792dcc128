//! Block Metering
//!
//! Peak is taken after gain (what the listener hears before clipping).
//! RMS defaults to the raw pre-gain input so the meter stays stable while
//! an operator rides the fader; `RmsSource::PostGain` switches it to the
//! same reference as peak.

use serde::{Deserialize, Serialize};

/// Which signal RMS is measured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RmsSource {
    /// Raw input sample
    #[default]
    PreGain,
    /// Input sample times channel+master linear gain
    PostGain,
}

/// Measured levels for one block (linear amplitude)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Levels {
    pub peak: f32,
    pub rms: f32,
}

/// Single-pass peak/RMS accumulator
#[derive(Debug, Clone)]
pub struct BlockMeter {
    source: RmsSource,
    linear_gain: f32,
    peak: f32,
    sum_squares: f32,
    count: usize,
}

impl BlockMeter {
    pub fn new(source: RmsSource, linear_gain: f32) -> Self {
        Self {
            source,
            linear_gain,
            peak: 0.0,
            sum_squares: 0.0,
            count: 0,
        }
    }

    /// Feed one raw (pre-gain) input sample
    #[inline]
    pub fn push(&mut self, sample: f32) {
        let gained = sample * self.linear_gain;
        let abs = gained.abs();
        if abs > self.peak {
            self.peak = abs;
        }
        let reference = match self.source {
            RmsSource::PreGain => sample,
            RmsSource::PostGain => gained,
        };
        self.sum_squares += reference * reference;
        self.count += 1;
    }

    pub fn finish(&self) -> Levels {
        if self.count == 0 {
            return Levels::default();
        }
        Levels {
            peak: self.peak,
            rms: (self.sum_squares / self.count as f32).sqrt(),
        }
    }
}
