//! Receiver Jitter Buffer
//!
//! Sits between the producer's `write` calls and the device callback.
//! An `rtrb` SPSC ring carries interleaved frames; everything the reader
//! must act on (flush, discard requests) is signalled through atomics so
//! neither side ever takes a lock.
//!
//! # Policy
//!
//! ```text
//! write:  not enough room  -> ask reader to discard 75% of queued frames
//!                             (counted as drops), accept what fits now
//! fill:   empty            -> silence, underrun++
//!                             silent > silence_reset_ms -> reset (rate-limited)
//!         queued > 3/4 cap -> drop oldest frames down to the target
//! clear:  flush on next fill, reset counters, resets++
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rtrb::{Consumer, Producer, RingBuffer};
use tracing::debug;

use crate::traits::RfStreamStats;

/// Ring capacity in frames (~42ms at 48kHz)
pub const DEFAULT_CAPACITY_FRAMES: usize = 2048;

/// Frames kept after a preventive drop (~2.7ms at 48kHz)
pub const DEFAULT_TARGET_FRAMES: usize = 128;

/// Smallest target the buffer accepts
pub const MIN_TARGET_FRAMES: usize = 16;

const NEVER: u64 = u64::MAX;

/// Jitter buffer configuration
#[derive(Debug, Clone)]
pub struct JitterConfig {
    pub channels: usize,
    pub sample_rate: u32,
    pub capacity_frames: usize,
    pub target_frames: usize,
    /// Sustained silence after which the ring is reset
    pub silence_reset_ms: u64,
    /// Minimum spacing between silence-triggered resets
    pub min_reset_spacing_ms: u64,
    /// A stream counts as receiving if audio arrived within this window
    pub receiving_window_ms: u64,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 48000,
            capacity_frames: DEFAULT_CAPACITY_FRAMES,
            target_frames: DEFAULT_TARGET_FRAMES,
            silence_reset_ms: 5_000,
            min_reset_spacing_ms: 10_000,
            receiving_window_ms: 2_000,
        }
    }
}

/// Create a jitter buffer, returning its writer and reader halves
pub fn jitter_buffer(config: JitterConfig) -> (JitterWriter, JitterReader) {
    let channels = config.channels.max(1);
    let capacity_frames = config.capacity_frames.max(MIN_TARGET_FRAMES * 2);
    let (producer, consumer) = RingBuffer::<f32>::new(capacity_frames * channels);

    let state = Arc::new(JitterState {
        channels,
        sample_rate: config.sample_rate.max(1),
        capacity_frames,
        silence_reset_ms: config.silence_reset_ms,
        min_reset_spacing_ms: config.min_reset_spacing_ms,
        receiving_window_ms: config.receiving_window_ms,
        target_frames: AtomicUsize::new(clamp_target(config.target_frames, capacity_frames)),
        queued_samples: AtomicUsize::new(0),
        discard_frames: AtomicUsize::new(0),
        flush_requested: AtomicBool::new(false),
        underruns: AtomicU32::new(0),
        drops: AtomicU32::new(0),
        resets: AtomicU32::new(0),
        callbacks: AtomicU64::new(0),
        last_audio_ms: AtomicU64::new(0),
        last_reset_ms: AtomicU64::new(NEVER),
        was_silent: AtomicBool::new(false),
        epoch: Instant::now(),
    });

    (
        JitterWriter {
            producer,
            state: Arc::clone(&state),
        },
        JitterReader { consumer, state },
    )
}

fn clamp_target(frames: usize, capacity_frames: usize) -> usize {
    frames.clamp(MIN_TARGET_FRAMES, capacity_frames / 2)
}

/// State shared by both halves and by stats readers
pub struct JitterState {
    channels: usize,
    sample_rate: u32,
    capacity_frames: usize,
    silence_reset_ms: u64,
    min_reset_spacing_ms: u64,
    receiving_window_ms: u64,

    target_frames: AtomicUsize,
    /// Last queued-sample count observed by either side
    queued_samples: AtomicUsize,
    /// Frames the reader must discard on its next callback
    discard_frames: AtomicUsize,
    flush_requested: AtomicBool,

    underruns: AtomicU32,
    drops: AtomicU32,
    resets: AtomicU32,
    callbacks: AtomicU64,

    last_audio_ms: AtomicU64,
    last_reset_ms: AtomicU64,
    was_silent: AtomicBool,
    epoch: Instant,
}

impl JitterState {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }

    /// Preventive drop kicks in above 75% of capacity
    pub fn drop_threshold_frames(&self) -> usize {
        self.capacity_frames * 3 / 4
    }

    pub fn target_frames(&self) -> usize {
        self.target_frames.load(Ordering::Relaxed)
    }

    /// Set the post-drop target; returns the value applied
    pub fn set_target_frames(&self, frames: usize) -> usize {
        let applied = clamp_target(frames, self.capacity_frames);
        self.target_frames.store(applied, Ordering::Relaxed);
        applied
    }

    pub fn available_frames(&self) -> usize {
        self.queued_samples.load(Ordering::Relaxed) / self.channels
    }

    pub fn latency_ms(&self) -> f32 {
        self.available_frames() as f32 / self.sample_rate as f32 * 1000.0
    }

    pub fn callback_count(&self) -> u64 {
        self.callbacks.load(Ordering::Relaxed)
    }

    pub fn is_receiving(&self) -> bool {
        self.now_ms()
            .saturating_sub(self.last_audio_ms.load(Ordering::Relaxed))
            < self.receiving_window_ms
    }

    /// Flush the ring on the reader's next callback and reset counters
    pub fn clear(&self) {
        self.flush_requested.store(true, Ordering::Release);
        self.discard_frames.store(0, Ordering::Relaxed);
        self.mark_reset(self.now_ms());
        debug!("Jitter buffer cleared (reset #{})", self.resets.load(Ordering::Relaxed));
    }

    fn mark_reset(&self, now: u64) {
        self.underruns.store(0, Ordering::Relaxed);
        self.drops.store(0, Ordering::Relaxed);
        self.was_silent.store(false, Ordering::Relaxed);
        self.resets.fetch_add(1, Ordering::Relaxed);
        self.last_reset_ms.store(now, Ordering::Relaxed);
    }

    pub fn stats(&self) -> RfStreamStats {
        let available = self.available_frames();
        RfStreamStats {
            available_frames: available as u32,
            latency_ms: (available as u64 * 1000 / self.sample_rate as u64) as u32,
            is_receiving: self.is_receiving(),
            underruns: self.underruns.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
            buffer_usage_percent: (available * 100 / self.capacity_frames) as u32,
            resets: self.resets.load(Ordering::Relaxed),
        }
    }
}

/// Producer half, owned by whoever calls `write`
pub struct JitterWriter {
    producer: Producer<f32>,
    state: Arc<JitterState>,
}

impl JitterWriter {
    pub fn state(&self) -> &Arc<JitterState> {
        &self.state
    }

    /// Queue interleaved frames; returns whole frames accepted
    pub fn write(&mut self, interleaved: &[f32]) -> usize {
        let state = &*self.state;
        let channels = state.channels;
        let frames = interleaved.len() / channels;
        if frames == 0 {
            return 0;
        }

        state.last_audio_ms.store(state.now_ms(), Ordering::Relaxed);

        let capacity_samples = self.producer.buffer().capacity();
        let free_frames = self.producer.slots() / channels;

        if free_frames < frames {
            // Emergency: have the reader throw away most of the backlog
            let pending = state.discard_frames.load(Ordering::Relaxed);
            let queued_frames =
                ((capacity_samples - self.producer.slots()) / channels).saturating_sub(pending);
            let to_clear = queued_frames * 3 / 4;
            if to_clear > 0 {
                debug!(
                    "Jitter buffer saturated ({} frames queued), discarding {}",
                    queued_frames, to_clear
                );
                state.discard_frames.fetch_add(to_clear, Ordering::AcqRel);
                state.drops.fetch_add(to_clear as u32, Ordering::Relaxed);
            }
        }

        let to_write = frames.min(free_frames);
        if to_write == 0 {
            debug!("Jitter buffer full, discarding {} frames", frames);
            state.drops.fetch_add(frames as u32, Ordering::Relaxed);
            return 0;
        }

        let samples = to_write * channels;
        match self.producer.write_chunk(samples) {
            Ok(mut chunk) => {
                let (first, second) = chunk.as_mut_slices();
                let split = first.len();
                first.copy_from_slice(&interleaved[..split]);
                second.copy_from_slice(&interleaved[split..samples]);
                chunk.commit_all();
            }
            Err(_) => return 0,
        }

        state.queued_samples.store(
            capacity_samples - self.producer.slots(),
            Ordering::Relaxed,
        );
        to_write
    }
}

/// Consumer half, owned by the device callback
pub struct JitterReader {
    consumer: Consumer<f32>,
    state: Arc<JitterState>,
}

impl JitterReader {
    pub fn state(&self) -> &Arc<JitterState> {
        &self.state
    }

    fn discard(consumer: &mut Consumer<f32>, samples: usize) -> usize {
        let n = samples.min(consumer.slots());
        if n == 0 {
            return 0;
        }
        match consumer.read_chunk(n) {
            Ok(chunk) => {
                chunk.commit_all();
                n
            }
            Err(_) => 0,
        }
    }

    /// Fill an interleaved device buffer; returns frames of real audio played
    ///
    /// # Real-time Safety
    /// No allocations, no locks, no logging.
    pub fn fill(&mut self, output: &mut [f32]) -> usize {
        let state = &*self.state;
        let channels = state.channels;
        state.callbacks.fetch_add(1, Ordering::Relaxed);

        if state.flush_requested.swap(false, Ordering::AcqRel) {
            Self::discard(&mut self.consumer, usize::MAX);
        }
        let skip = state.discard_frames.swap(0, Ordering::AcqRel);
        if skip > 0 {
            Self::discard(&mut self.consumer, skip * channels);
        }

        let now = state.now_ms();
        let available_frames = self.consumer.slots() / channels;

        if available_frames == 0 {
            output.fill(0.0);
            state.underruns.fetch_add(1, Ordering::Relaxed);

            let silent_for = now.saturating_sub(state.last_audio_ms.load(Ordering::Relaxed));
            let last_reset = state.last_reset_ms.load(Ordering::Relaxed);
            let reset_allowed = last_reset == NEVER
                || now.saturating_sub(last_reset) > state.min_reset_spacing_ms;
            if silent_for > state.silence_reset_ms
                && state.was_silent.load(Ordering::Relaxed)
                && reset_allowed
            {
                Self::discard(&mut self.consumer, usize::MAX);
                state.mark_reset(now);
            }

            state.was_silent.store(true, Ordering::Relaxed);
            state.queued_samples.store(self.consumer.slots(), Ordering::Relaxed);
            return 0;
        }

        let frames = available_frames.min(output.len() / channels);
        let samples = frames * channels;
        if let Ok(chunk) = self.consumer.read_chunk(samples) {
            let (first, second) = chunk.as_slices();
            output[..first.len()].copy_from_slice(first);
            output[first.len()..samples].copy_from_slice(second);
            chunk.commit_all();
        }
        output[samples..].fill(0.0);

        state.last_audio_ms.store(now, Ordering::Relaxed);
        state.was_silent.store(false, Ordering::Relaxed);

        let remaining = self.consumer.slots() / channels;
        if remaining > state.drop_threshold_frames() {
            let excess = remaining.saturating_sub(state.target_frames());
            if excess > 0 {
                Self::discard(&mut self.consumer, excess * channels);
                state.drops.fetch_add(excess as u32, Ordering::Relaxed);
            }
        }

        state.queued_samples.store(self.consumer.slots(), Ordering::Relaxed);
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn stereo(frames: usize, value: f32) -> Vec<f32> {
        vec![value; frames * 2]
    }

    #[test]
    fn test_write_then_fill() {
        let (mut writer, mut reader) = jitter_buffer(JitterConfig::default());
        assert_eq!(writer.write(&stereo(64, 0.5)), 64);
        assert_eq!(reader.state().available_frames(), 64);

        let mut out = vec![1.0_f32; 128 * 2];
        assert_eq!(reader.fill(&mut out), 64);
        assert!(out[..128].iter().all(|&s| s == 0.5));
        assert!(out[128..].iter().all(|&s| s == 0.0));
        assert_eq!(reader.state().available_frames(), 0);
    }

    #[test]
    fn test_underrun_fills_silence() {
        let (_writer, mut reader) = jitter_buffer(JitterConfig::default());
        let mut out = vec![1.0_f32; 32];
        assert_eq!(reader.fill(&mut out), 0);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(reader.state().stats().underruns, 1);
    }

    #[test]
    fn test_overflow_requests_discard() {
        let config = JitterConfig {
            capacity_frames: 256,
            target_frames: 32,
            ..Default::default()
        };
        let (mut writer, mut reader) = jitter_buffer(config);

        assert_eq!(writer.write(&stereo(200, 0.1)), 200);
        // Only 56 frames of room left: short write, backlog discard requested
        assert_eq!(writer.write(&stereo(100, 0.2)), 56);
        let stats = writer.state().stats();
        assert_eq!(stats.drops, 150);

        // Reader honours the discard before playing
        let mut out = vec![0.0_f32; 8 * 2];
        reader.fill(&mut out);
        assert!(reader.state().available_frames() <= 256 - 150);
    }

    #[test]
    fn test_preventive_drop_to_target() {
        let config = JitterConfig {
            capacity_frames: 2048,
            target_frames: 128,
            ..Default::default()
        };
        let (mut writer, mut reader) = jitter_buffer(config);
        assert_eq!(writer.write(&stereo(1600, 0.3)), 1600);

        let mut out = vec![0.0_f32; 16 * 2];
        assert_eq!(reader.fill(&mut out), 16);
        // 1584 remaining > 1536 threshold -> trimmed to target
        assert_eq!(reader.state().available_frames(), 128);
        assert_eq!(reader.state().stats().drops, 1584 - 128);
    }

    #[test]
    fn test_clear_flushes_and_counts_reset() {
        let (mut writer, mut reader) = jitter_buffer(JitterConfig::default());
        writer.write(&stereo(100, 0.4));
        writer.state().clear();

        let mut out = vec![1.0_f32; 10 * 2];
        assert_eq!(reader.fill(&mut out), 0);
        let stats = reader.state().stats();
        assert_eq!(stats.resets, 1);
        assert_eq!(stats.available_frames, 0);
    }

    #[test]
    fn test_silence_reset_is_rate_limited() {
        let config = JitterConfig {
            silence_reset_ms: 0,
            min_reset_spacing_ms: 60_000,
            ..Default::default()
        };
        let (_writer, mut reader) = jitter_buffer(config);
        let mut out = vec![0.0_f32; 8];

        thread::sleep(Duration::from_millis(5));
        reader.fill(&mut out); // first silent callback only arms was_silent
        thread::sleep(Duration::from_millis(5));
        reader.fill(&mut out); // resets
        thread::sleep(Duration::from_millis(5));
        reader.fill(&mut out);
        reader.fill(&mut out); // within spacing -> no second reset

        assert_eq!(reader.state().stats().resets, 1);
    }

    #[test]
    fn test_target_is_clamped() {
        let (writer, _reader) = jitter_buffer(JitterConfig::default());
        assert_eq!(writer.state().set_target_frames(1), MIN_TARGET_FRAMES);
        assert_eq!(
            writer.state().set_target_frames(1_000_000),
            DEFAULT_CAPACITY_FRAMES / 2
        );
        assert_eq!(writer.state().set_target_frames(256), 256);
    }

    #[test]
    fn test_stats_latency_and_usage() {
        let (mut writer, _reader) = jitter_buffer(JitterConfig::default());
        writer.write(&stereo(480, 0.0));
        let stats = writer.state().stats();
        assert_eq!(stats.available_frames, 480);
        assert_eq!(stats.latency_ms, 10);
        assert_eq!(stats.buffer_usage_percent, 480 * 100 / 2048);
        assert!(stats.is_receiving);
    }
}
