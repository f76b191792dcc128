//! RF Statistics
//!
//! Engine-side counters plus the pull-based aggregate built from every
//! live stream's native stats.

use std::sync::atomic::{AtomicU64, Ordering};

use rfmix_platform::{ChannelId, RfStreamStats};
use serde::{Deserialize, Serialize};

/// Engine-wide packet and drop counters
#[derive(Debug, Default)]
pub struct EngineCounters {
    packets_received: AtomicU64,
    frames_dropped: AtomicU64,
}

impl EngineCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_packet(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, frames: u64) {
        self.frames_dropped.fetch_add(frames, Ordering::Relaxed);
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.packets_received.store(0, Ordering::Relaxed);
        self.frames_dropped.store(0, Ordering::Relaxed);
    }
}

/// `dropped / total * 100`, or 0 before any packet arrived
pub fn drop_rate(dropped_frames: u64, total_packets: u64) -> f32 {
    if total_packets == 0 {
        0.0
    } else {
        dropped_frames as f32 / total_packets as f32 * 100.0
    }
}

/// Aggregate statistics across all live streams
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RfStats {
    pub total_packets: u64,
    /// Engine-side drops plus native receiver drops
    pub dropped_frames: u64,
    pub drop_rate: f32,
    pub avg_latency_ms: f32,
    pub available_frames: u64,
    pub underruns: u64,
    pub drops: u64,
    pub resets: u64,
    pub active_streams: usize,
    pub is_initialized: bool,
    pub total_failures: u64,
}

/// Accumulates per-stream stats into an [`RfStats`]
#[derive(Debug, Default)]
pub struct StatsAccumulator {
    latency_sum: u64,
    available: u64,
    underruns: u64,
    drops: u64,
    resets: u64,
    failures: u64,
    sampled: u64,
}

impl StatsAccumulator {
    pub fn add(&mut self, stats: &RfStreamStats, consecutive_failures: u32) {
        self.latency_sum += stats.latency_ms as u64;
        self.available += stats.available_frames as u64;
        self.underruns += stats.underruns as u64;
        self.drops += stats.drops as u64;
        self.resets += stats.resets as u64;
        self.failures += consecutive_failures as u64;
        self.sampled += 1;
    }

    pub fn finish(
        self,
        counters: &EngineCounters,
        active_streams: usize,
        is_initialized: bool,
    ) -> RfStats {
        let total_packets = counters.packets_received();
        let dropped_frames = counters.frames_dropped() + self.drops;
        RfStats {
            total_packets,
            dropped_frames,
            drop_rate: drop_rate(dropped_frames, total_packets),
            avg_latency_ms: if self.sampled > 0 {
                self.latency_sum as f32 / self.sampled as f32
            } else {
                0.0
            },
            available_frames: self.available,
            underruns: self.underruns,
            drops: self.drops,
            resets: self.resets,
            active_streams,
            is_initialized,
            total_failures: self.failures,
        }
    }
}

/// Native stats for one channel's stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelRfStats {
    pub channel: ChannelId,
    #[serde(flatten)]
    pub stream: RfStreamStats,
    pub consecutive_failures: u32,
}

/// Buffer occupancy summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferInfo {
    pub buffered_frames: u64,
    pub active_streams: usize,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub is_initialized: bool,
}
