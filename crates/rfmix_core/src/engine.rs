//! RF Engine - Main Entry Point
//!
//! `RfEngine` owns one native engine handle, the channel table and the
//! stream pool. It is shared as `Arc<RfEngine>` between RF producer threads
//! (one per receiver, each calling `render_channel_rf`), the control surface
//! and the monitor.
//!
//! # Architecture
//!
//! ```text
//! RF receiver ──block──▶ render_channel_rf
//!                           │ admit (channel shard lock)
//!                           │ get_or_create (pool shard lock, short)
//!                           │ re-check running/active, else release it
//!                           │ gain/pan/soft clip ──▶ stereo scratch block
//!                           │ backend.write            (no engine locks held)
//!                           ▼
//!                        classify ──▶ pool bookkeeping ──▶ clear/restart/destroy
//!                                 └─▶ drop counters
//! ```
//!
//! Nothing on the control surface can fail. Native errors degrade to
//! "this channel is silent now" and show up only in counters and logs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use rfmix_dsp::{clamp_gain_db, render_mono_to_stereo};
use rfmix_platform::{ChannelId, EngineHandle, PlatformError, StreamBackend, StreamHandle};
use tracing::{debug, error, info, warn};

use crate::channel::{Admission, ChannelState, ChannelTable};
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::pool::StreamPool;
use crate::render::{mix_gains, with_stereo_block, RenderOutcome};
use crate::settings::{ChannelSettings, MixerSettings};
use crate::stats::{BufferInfo, ChannelRfStats, EngineCounters, RfStats, StatsAccumulator};

/// Shortfalls larger than this are logged
const SHORTFALL_LOG_FRAMES: usize = 100;

/// The multi-channel RF render engine
pub struct RfEngine {
    backend: Arc<dyn StreamBackend>,
    config: EngineConfig,
    native: EngineHandle,
    pool: StreamPool,
    channels: ChannelTable,
    counters: EngineCounters,

    /// Master gain in dB (stored as u32, interpreted as f32 bits)
    master_gain_bits: AtomicU32,

    running: AtomicBool,
    released: AtomicBool,
}

impl RfEngine {
    /// Create an engine on `backend`
    ///
    /// Fails if the configuration is invalid or the native engine cannot be
    /// created. A fresh engine is running.
    pub fn new(backend: Arc<dyn StreamBackend>, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;

        let native = backend.create_engine(config.stream.sample_rate, config.stream.channels)?;
        let pool = StreamPool::new(
            Arc::clone(&backend),
            native,
            config.pool.clone(),
            config.stream.buffer_size,
        );

        info!(
            "RF engine initialized on {} backend: {} Hz, {} channels, up to {} streams",
            backend.name(),
            config.stream.sample_rate,
            config.stream.channels,
            config.pool.max_streams
        );

        Ok(Self {
            backend,
            config,
            native,
            pool,
            channels: ChannelTable::new(),
            counters: EngineCounters::new(),
            master_gain_bits: AtomicU32::new(0.0_f32.to_bits()),
            running: AtomicBool::new(true),
            released: AtomicBool::new(false),
        })
    }

    /// Create an engine on the best backend this build supports
    pub fn with_default_backend(config: EngineConfig) -> EngineResult<Self> {
        Self::new(rfmix_platform::default_backend(), config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    // ------------------------------------------------------------------
    // Render path
    // ------------------------------------------------------------------

    /// Mix one mono RF block into the channel's stream
    ///
    /// `position` is the receiver's sample position, used for diagnostics
    /// only. Blocks render in arrival order.
    pub fn render_channel_rf(
        &self,
        channel: ChannelId,
        samples: &[f32],
        position: u64,
    ) -> RenderOutcome {
        if samples.is_empty() || !self.is_running() {
            return RenderOutcome::Skipped;
        }

        let (admission, regressed) = self.channels.admit(channel, position);
        if let Some(previous) = regressed {
            debug!(
                "Channel {}: sample position {} does not advance past {}",
                channel, position, previous
            );
        }

        let params = match admission {
            Admission::Render(params) => params,
            Admission::Muted => return RenderOutcome::Muted,
            Admission::Inactive => {
                // A stream created by a render racing deactivation goes here
                self.pool.destroy(channel);
                return RenderOutcome::Inactive;
            }
        };

        self.counters.record_packet();
        let frames = samples.len();

        let Some(handle) = self.pool.get_or_create(channel) else {
            self.counters.record_dropped(frames as u64);
            return RenderOutcome::Dropped { frames };
        };

        // Stop or deactivation may have released streams while this one
        // was being created; it must not outlive them
        if !self.is_running() {
            self.pool.destroy_if_current(channel, handle);
            return RenderOutcome::Skipped;
        }
        if !self.channels.is_active(channel) {
            self.pool.destroy_if_current(channel, handle);
            return RenderOutcome::Inactive;
        }

        let (linear_gain, gains) = mix_gains(params.gain_db, self.master_gain_db(), params.pan);

        with_stereo_block(frames, |block| {
            let levels = match render_mono_to_stereo(
                samples,
                gains,
                linear_gain,
                self.config.rms_source,
                block,
            ) {
                Ok(levels) => levels,
                Err(e) => {
                    error!("Render failed on channel {}: {}", channel, e);
                    self.counters.record_dropped(frames as u64);
                    return RenderOutcome::Dropped { frames };
                }
            };
            if !self.channels.record_if_active(channel, levels) {
                self.pool.destroy_if_current(channel, handle);
                return RenderOutcome::Inactive;
            }

            let result = self.backend.write(handle, block);
            self.classify_write(channel, handle, frames, result)
        })
    }

    fn classify_write(
        &self,
        channel: ChannelId,
        handle: StreamHandle,
        frames: usize,
        result: Result<usize, PlatformError>,
    ) -> RenderOutcome {
        match result {
            Ok(written) if written >= frames => {
                self.pool.on_write_complete(channel, handle);
                RenderOutcome::Written { frames }
            }
            Ok(written) => {
                let dropped = frames - written;
                self.counters.record_dropped(dropped as u64);
                if dropped > SHORTFALL_LOG_FRAMES {
                    debug!("RF drop: {} frames on channel {}", dropped, channel);
                }
                let action = self.pool.on_write_shortfall(channel, handle);
                RenderOutcome::Shortfall {
                    written,
                    dropped,
                    action,
                }
            }
            Err(e) => {
                error!("Write failed on channel {}: {}", channel, e);
                self.counters.record_dropped(frames as u64);
                let action = self.pool.on_write_error(channel, handle);
                RenderOutcome::Failed { action }
            }
        }
    }

    // ------------------------------------------------------------------
    // Control surface
    // ------------------------------------------------------------------

    /// Set channel gain; stored clamped to [-60, +12] dB
    pub fn update_channel_gain(&self, channel: ChannelId, gain_db: f32) {
        if self.is_released() {
            return;
        }
        self.channels.update(channel, |state| state.set_gain_db(gain_db));
    }

    /// Set channel pan; stored clamped to [-1, 1]
    pub fn update_channel_pan(&self, channel: ChannelId, pan: f32) {
        if self.is_released() {
            return;
        }
        self.channels.update(channel, |state| state.set_pan(pan));
    }

    /// Activate or deactivate a channel
    ///
    /// Deactivation zeroes the channel's levels and tears down its stream.
    pub fn set_channel_active(&self, channel: ChannelId, active: bool) {
        if self.is_released() {
            return;
        }
        self.channels.update(channel, |state| {
            state.active = active;
            if !active {
                state.clear_levels();
            }
        });
        if !active && self.pool.destroy(channel) {
            debug!("Channel {} deactivated, stream released", channel);
        }
    }

    /// Set master gain; stored clamped to [-60, +12] dB
    pub fn set_master_gain(&self, gain_db: f32) {
        if self.is_released() {
            return;
        }
        self.master_gain_bits
            .store(clamp_gain_db(gain_db).to_bits(), Ordering::Relaxed);
    }

    pub fn master_gain_db(&self) -> f32 {
        f32::from_bits(self.master_gain_bits.load(Ordering::Relaxed))
    }

    pub fn channel_state(&self, channel: ChannelId) -> Option<ChannelState> {
        self.channels.get(channel)
    }

    /// Immutable snapshot of every known channel
    pub fn all_channel_states(&self) -> BTreeMap<ChannelId, ChannelState> {
        self.channels.snapshot()
    }

    /// Destroy every stream; each channel recreates its own on the next block
    pub fn recreate_all_streams(&self) -> usize {
        if self.is_released() {
            return 0;
        }
        warn!("Recreating all streams");
        let count = self.pool.recreate_all();
        info!("{} streams marked for recreation", count);
        count
    }

    /// Re-arm rendering after `stop`
    pub fn start(&self) {
        if self.is_released() {
            return;
        }
        if !self.running.swap(true, Ordering::SeqCst) {
            info!("RF engine started");
        }
    }

    /// Tear down all streams and channels, reset stats, and ignore renders
    /// until `start`
    pub fn stop(&self) {
        if self.is_released() {
            return;
        }
        self.running.store(false, Ordering::SeqCst);
        let streams = self.pool.recreate_all();
        self.channels.clear();
        self.reset_rf_stats();
        info!("RF engine stopped ({} streams released)", streams);
    }

    /// Release all native resources; terminal and idempotent
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.running.store(false, Ordering::SeqCst);
        let streams = self.pool.close();
        self.channels.clear();
        self.counters.reset();
        self.backend.destroy_engine(self.native);
        info!("RF engine released ({} streams destroyed)", streams);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Native engine is alive
    pub fn is_initialized(&self) -> bool {
        !self.is_released()
    }

    /// Initialized and rendering to at least one stream
    pub fn is_active(&self) -> bool {
        self.is_initialized() && !self.pool.is_empty()
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    /// Aggregate statistics across all live streams
    ///
    /// Streams whose native stats query fails are skipped.
    pub fn rf_stats(&self) -> RfStats {
        let streams = self.pool.snapshot();
        let mut acc = StatsAccumulator::default();
        for stream in &streams {
            match self.backend.rf_stats(stream.handle) {
                Ok(stats) => acc.add(&stats, stream.consecutive_failures),
                Err(e) => debug!("Skipping stats for channel {}: {}", stream.channel, e),
            }
        }
        acc.finish(&self.counters, streams.len(), self.is_initialized())
    }

    /// Native stats for one channel's stream
    pub fn channel_rf_stats(&self, channel: ChannelId) -> Option<ChannelRfStats> {
        let stream = self.pool.get(channel)?;
        match self.backend.rf_stats(stream.handle) {
            Ok(stats) => Some(ChannelRfStats {
                channel,
                stream: stats,
                consecutive_failures: stream.consecutive_failures,
            }),
            Err(e) => {
                error!("Error reading RF stats for channel {}: {}", channel, e);
                None
            }
        }
    }

    /// Zero packet/drop counters, per-channel packet counts and per-stream
    /// failure bookkeeping
    pub fn reset_rf_stats(&self) {
        self.counters.reset();
        self.channels
            .for_each_mut(|_, state| state.packets_received = 0);
        self.pool.reset_failures();
    }

    /// Mean native latency over live streams, or 0 with none
    pub fn latency_ms(&self) -> f32 {
        if !self.is_initialized() {
            return 0.0;
        }
        let (sum, count) = self
            .pool
            .snapshot()
            .iter()
            .filter_map(|stream| self.backend.latency_ms(stream.handle).ok())
            .fold((0.0_f32, 0_u32), |(sum, count), latency| (sum + latency, count + 1));
        if count > 0 {
            sum / count as f32
        } else {
            0.0
        }
    }

    pub fn buffer_info(&self) -> BufferInfo {
        let streams = self.pool.snapshot();
        let buffered_frames = streams
            .iter()
            .filter_map(|stream| self.backend.buffer_stats(stream.handle).ok())
            .map(u64::from)
            .sum();
        BufferInfo {
            buffered_frames,
            active_streams: streams.len(),
            packets_received: self.counters.packets_received(),
            packets_dropped: self.counters.frames_dropped(),
            is_initialized: self.is_initialized(),
        }
    }

    /// Live stream bound to `channel`, if any
    pub fn stream_handle(&self, channel: ChannelId) -> Option<StreamHandle> {
        self.pool.get(channel).map(|stream| stream.handle)
    }

    pub fn active_streams(&self) -> usize {
        self.pool.len()
    }

    /// Channels with stored parameters
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    /// Capture the current mix as persistable settings
    pub fn capture_settings(&self) -> MixerSettings {
        MixerSettings {
            master_gain_db: self.master_gain_db(),
            channels: self
                .all_channel_states()
                .into_iter()
                .map(|(id, state)| {
                    (
                        id,
                        ChannelSettings {
                            gain_db: state.gain_db,
                            pan: state.pan,
                            active: state.active,
                        },
                    )
                })
                .collect(),
            saved_at: None,
        }
    }

    /// Apply saved settings through the regular control surface
    pub fn apply_settings(&self, settings: &MixerSettings) {
        self.set_master_gain(settings.master_gain_db);
        for (&channel, saved) in &settings.channels {
            self.update_channel_gain(channel, saved.gain_db);
            self.update_channel_pan(channel, saved.pan);
            self.set_channel_active(channel, saved.active);
        }
        debug!("Applied settings for {} channels", settings.channels.len());
    }
}

impl Drop for RfEngine {
    fn drop(&mut self) {
        self.release();
    }
}
