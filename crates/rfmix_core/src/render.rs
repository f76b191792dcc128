//! Render Pipeline Helpers
//!
//! Gain staging and the per-thread stereo scratch block used by
//! `RfEngine::render_channel_rf`.

use std::cell::RefCell;

use rfmix_dsp::{db_to_linear, StereoGain};

use crate::stream::RecoveryAction;

/// Initial scratch capacity in frames; grows to the largest block seen
const SCRATCH_FRAMES: usize = 1024;

thread_local! {
    static SCRATCH: RefCell<Vec<f32>> = RefCell::new(Vec::with_capacity(SCRATCH_FRAMES * 2));
}

/// What happened to one inbound block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Engine stopped or released, or the block was empty
    Skipped,
    /// Channel gain at or below the mute floor
    Muted,
    /// Channel deactivated; its stream (if any) was torn down
    Inactive,
    /// No stream could be obtained; the whole block was dropped
    Dropped { frames: usize },
    Written { frames: usize },
    Shortfall {
        written: usize,
        dropped: usize,
        action: RecoveryAction,
    },
    /// Native exception during write
    Failed { action: RecoveryAction },
}

impl RenderOutcome {
    /// Whether the native write was attempted
    pub fn reached_native(&self) -> bool {
        matches!(
            self,
            RenderOutcome::Written { .. }
                | RenderOutcome::Shortfall { .. }
                | RenderOutcome::Failed { .. }
        )
    }
}

/// Linear gain and per-ear gains for channel + master
pub fn mix_gains(channel_gain_db: f32, master_gain_db: f32, pan: f32) -> (f32, StereoGain) {
    let linear = db_to_linear(channel_gain_db + master_gain_db);
    (linear, StereoGain::constant_power(pan, linear))
}

/// Run `f` with an interleaved stereo block of `frames` frames
///
/// The block is reused per producer thread, so steady-state rendering does
/// not allocate.
pub fn with_stereo_block<R>(frames: usize, f: impl FnOnce(&mut [f32]) -> R) -> R {
    SCRATCH.with(|cell| match cell.try_borrow_mut() {
        Ok(mut block) => {
            block.resize(frames * 2, 0.0);
            f(&mut block[..])
        }
        // Re-entrant render on the same thread
        Err(_) => f(&mut vec![0.0; frames * 2]),
    })
}
