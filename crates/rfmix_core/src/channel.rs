//! Channel State Store
//!
//! Per-channel mix parameters and measured levels, sharded across a fixed
//! set of `RwLock`s keyed by `channel % SHARDS`. Producers rendering
//! different channels rarely contend, and the ~5Hz poller only takes read
//! locks, one shard at a time.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use rfmix_dsp::{clamp_gain_db, clamp_pan, Levels, MIN_GAIN_DB};
use rfmix_platform::ChannelId;
use serde::{Deserialize, Serialize};

const SHARDS: usize = 16;

/// Runtime state of one RF channel
///
/// `gain_db` and `pan` are always stored pre-clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelState {
    pub gain_db: f32,
    pub pan: f32,
    pub active: bool,
    pub peak_level: f32,
    pub rms_level: f32,
    pub packets_received: u64,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            gain_db: 0.0,
            pan: 0.0,
            active: true,
            peak_level: 0.0,
            rms_level: 0.0,
            packets_received: 0,
        }
    }
}

impl ChannelState {
    pub fn set_gain_db(&mut self, gain_db: f32) {
        self.gain_db = clamp_gain_db(gain_db);
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan = clamp_pan(pan);
    }

    /// Whether a block on this channel should reach the native layer
    pub fn is_audible(&self) -> bool {
        self.active && self.gain_db > MIN_GAIN_DB
    }

    pub fn record_block(&mut self, levels: Levels) {
        self.peak_level = levels.peak;
        self.rms_level = levels.rms;
        self.packets_received += 1;
    }

    pub fn clear_levels(&mut self) {
        self.peak_level = 0.0;
        self.rms_level = 0.0;
    }
}

#[derive(Debug, Default)]
struct ChannelEntry {
    state: ChannelState,
    /// Last sample position seen, for ordering diagnostics
    last_position: Option<u64>,
}

/// Mix parameters captured for one render
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderParams {
    pub gain_db: f32,
    pub pan: f32,
}

/// Outcome of admitting a block into the render path
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Render(RenderParams),
    /// Channel is muted at or below the gain floor
    Muted,
    /// Channel is deactivated; any stream it still holds should go
    Inactive,
}

/// Sharded channel table; entries are created lazily and never removed
/// except by [`ChannelTable::clear`]
pub struct ChannelTable {
    shards: Vec<RwLock<HashMap<ChannelId, ChannelEntry>>>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, channel: ChannelId) -> &RwLock<HashMap<ChannelId, ChannelEntry>> {
        &self.shards[channel as usize % SHARDS]
    }

    /// Mutate a channel, creating it with defaults if needed
    pub fn update<R>(&self, channel: ChannelId, f: impl FnOnce(&mut ChannelState) -> R) -> R {
        let mut shard = self.shard(channel).write();
        f(&mut shard.entry(channel).or_default().state)
    }

    /// Check whether a block should render and note its sample position
    ///
    /// Returns the admission decision and, when the position went
    /// backwards, the previous position.
    pub fn admit(&self, channel: ChannelId, position: u64) -> (Admission, Option<u64>) {
        let mut shard = self.shard(channel).write();
        let entry = shard.entry(channel).or_default();

        let regressed = match entry.last_position {
            Some(last) if position <= last => Some(last),
            _ => None,
        };
        entry.last_position = Some(position);

        let state = &entry.state;
        let admission = if !state.active {
            Admission::Inactive
        } else if !state.is_audible() {
            Admission::Muted
        } else {
            Admission::Render(RenderParams {
                gain_db: state.gain_db,
                pan: state.pan,
            })
        };
        (admission, regressed)
    }

    pub fn get(&self, channel: ChannelId) -> Option<ChannelState> {
        self.shard(channel)
            .read()
            .get(&channel)
            .map(|entry| entry.state.clone())
    }

    /// Whether the channel exists and is active
    ///
    /// Missing means cleared by an engine stop since the block was admitted.
    pub fn is_active(&self, channel: ChannelId) -> bool {
        self.shard(channel)
            .read()
            .get(&channel)
            .is_some_and(|entry| entry.state.active)
    }

    /// Store a rendered block's levels unless the channel went inactive
    /// or was cleared after admission
    pub fn record_if_active(&self, channel: ChannelId, levels: Levels) -> bool {
        let mut shard = self.shard(channel).write();
        match shard.get_mut(&channel) {
            Some(entry) if entry.state.active => {
                entry.state.record_block(levels);
                true
            }
            _ => false,
        }
    }

    /// Immutable copy of every channel, ordered by id
    pub fn snapshot(&self) -> BTreeMap<ChannelId, ChannelState> {
        let mut out = BTreeMap::new();
        for shard in &self.shards {
            let shard = shard.read();
            out.extend(shard.iter().map(|(id, entry)| (*id, entry.state.clone())));
        }
        out
    }

    pub fn for_each_mut(&self, mut f: impl FnMut(ChannelId, &mut ChannelState)) {
        for shard in &self.shards {
            for (id, entry) in shard.write().iter_mut() {
                f(*id, &mut entry.state);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            shard.write().clear();
        }
    }
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self::new()
    }
}
