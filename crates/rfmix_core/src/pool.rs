//! Stream Lifecycle Manager
//!
//! Maps channel id -> healthy native stream, hiding creation, recreation
//! and capacity eviction from the render path.
//!
//! # Locking
//!
//! ```text
//! lookup/insert  ──▶ one shard mutex (channel % SHARDS), no native calls
//! capacity       ──▶ atomic slot count, shards scanned only to evict
//! create/destroy ──▶ backend, outside every shard lock
//! write          ──▶ backend, outside every shard lock (engine side)
//! bookkeeping    ──▶ shard mutex, matched by handle
//! ```
//!
//! At most one shard lock is held at a time. A slot is reserved before a
//! native stream is opened and given back when that stream is discarded,
//! so live plus in-flight streams never exceed the configured maximum.
//!
//! Every bookkeeping call names the handle it is reporting on. If the
//! channel's record was replaced or removed meanwhile (deactivation,
//! eviction, a concurrent recreate), the report is ignored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rfmix_platform::{ChannelId, EngineHandle, StreamBackend, StreamHandle};
use tracing::{debug, error, warn};

use crate::config::PoolConfig;
use crate::stream::{RecoveryAction, StreamState};

const SHARDS: usize = 16;

/// Evictions tried before a creator gives up and drops its block
const EVICTION_ATTEMPTS: usize = 4;

type Shard = Mutex<HashMap<ChannelId, StreamState>>;

/// Point-in-time view of one pooled stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PooledStream {
    pub channel: ChannelId,
    pub handle: StreamHandle,
    pub consecutive_failures: u32,
}

pub struct StreamPool {
    backend: Arc<dyn StreamBackend>,
    engine: EngineHandle,
    policy: PoolConfig,
    buffer_size: u32,
    shards: Vec<Shard>,
    /// Pooled streams plus creations in flight
    slots: AtomicUsize,
    closed: AtomicBool,
}

impl StreamPool {
    pub fn new(
        backend: Arc<dyn StreamBackend>,
        engine: EngineHandle,
        policy: PoolConfig,
        buffer_size: u32,
    ) -> Self {
        Self {
            backend,
            engine,
            policy,
            buffer_size,
            shards: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
            slots: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn shard(&self, channel: ChannelId) -> &Shard {
        &self.shards[channel as usize % SHARDS]
    }

    /// Return a healthy stream for `channel`, creating one if needed
    ///
    /// `None` means the block must be dropped: creation failed, the pool is
    /// closed, or capacity could not be freed.
    pub fn get_or_create(&self, channel: ChannelId) -> Option<StreamHandle> {
        let stale = {
            let mut shard = self.shard(channel).lock();
            if self.is_closed() {
                return None;
            }
            if let Some(state) = shard.get(&channel) {
                if state.is_reusable(&self.policy) {
                    return Some(state.handle);
                }
            }
            shard.remove(&channel)
        };

        if let Some(state) = stale {
            self.slots.fetch_sub(1, Ordering::AcqRel);
            warn!(
                "Recreating stream for channel {} ({} failures)",
                channel, state.consecutive_failures
            );
            self.release_native(channel, state.handle);
        }

        if !self.reserve_slot() {
            debug!("Channel {}: no stream slot could be freed", channel);
            return None;
        }
        let Some(handle) = self.open_native(channel) else {
            self.slots.fetch_sub(1, Ordering::AcqRel);
            return None;
        };
        self.insert(channel, handle)
    }

    /// Claim capacity for one new stream, evicting the LRU stream when full
    fn reserve_slot(&self) -> bool {
        let max = self.policy.max_streams;
        for _ in 0..EVICTION_ATTEMPTS {
            let claimed = self
                .slots
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    (n < max).then_some(n + 1)
                })
                .is_ok();
            if claimed {
                return true;
            }

            // Every slot may be an in-flight creation with nothing to evict
            let Some((lru, handle)) = self.least_recently_written() else {
                return false;
            };
            if self.destroy_if_current(lru, handle) {
                warn!("Stream limit reached ({}), evicted channel {}", max, lru);
            }
        }
        false
    }

    /// Scan the shards one at a time for the oldest write
    fn least_recently_written(&self) -> Option<(ChannelId, StreamHandle)> {
        self.shards
            .iter()
            .filter_map(|shard| {
                shard
                    .lock()
                    .iter()
                    .min_by_key(|(_, state)| state.last_write)
                    .map(|(channel, state)| (*channel, state.handle, state.last_write))
            })
            .min_by_key(|(_, _, last_write)| *last_write)
            .map(|(channel, handle, _)| (channel, handle))
    }

    /// Create, size and start a native stream
    fn open_native(&self, channel: ChannelId) -> Option<StreamHandle> {
        let handle = match self.backend.create_stream(self.engine, channel) {
            Ok(handle) => handle,
            Err(e) => {
                error!("Stream creation failed for channel {}: {}", channel, e);
                return None;
            }
        };

        if let Err(e) = self.backend.set_buffer_size(handle, self.buffer_size) {
            debug!("Channel {}: buffer size request ignored: {}", channel, e);
        }

        if let Err(e) = self.backend.start(handle) {
            error!("Stream start failed for channel {}: {}", channel, e);
            let _ = self.backend.destroy_stream(handle);
            return None;
        }

        debug!("Stream {} created for channel {}", handle, channel);
        Some(handle)
    }

    /// Publish a freshly opened stream, resolving races with other creators
    ///
    /// The caller's reserved slot either becomes the new record's slot or
    /// is handed back along with whichever stream gets discarded.
    fn insert(&self, channel: ChannelId, handle: StreamHandle) -> Option<StreamHandle> {
        let (result, displaced) = {
            let mut shard = self.shard(channel).lock();
            if self.is_closed() {
                (None, Some(handle))
            } else if let Some(existing) = shard
                .get(&channel)
                .filter(|state| state.is_reusable(&self.policy))
            {
                // Another producer won the race; keep its stream
                (Some(existing.handle), Some(handle))
            } else {
                let old = shard.insert(channel, StreamState::new(handle, Instant::now()));
                (Some(handle), old.map(|state| state.handle))
            }
        };

        if let Some(discard) = displaced {
            self.slots.fetch_sub(1, Ordering::AcqRel);
            self.release_native(channel, discard);
        }
        result
    }

    /// Stop and destroy a native stream; errors are logged and swallowed
    fn release_native(&self, channel: ChannelId, handle: StreamHandle) {
        let _ = self.backend.stop(handle);
        match self.backend.destroy_stream(handle) {
            Ok(()) => debug!("Stream {} for channel {} destroyed", handle, channel),
            Err(e) => error!("Error destroying stream for channel {}: {}", channel, e),
        }
    }

    /// Take the channel's record, optionally only if it still holds `expected`
    fn remove(&self, channel: ChannelId, expected: Option<StreamHandle>) -> Option<StreamState> {
        let removed = {
            let mut shard = self.shard(channel).lock();
            match shard.get(&channel) {
                Some(state) if expected.map_or(true, |h| h == state.handle) => {
                    shard.remove(&channel)
                }
                _ => None,
            }
        };
        if removed.is_some() {
            self.slots.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    /// Remove and destroy the channel's stream, if any
    pub fn destroy(&self, channel: ChannelId) -> bool {
        match self.remove(channel, None) {
            Some(state) => {
                self.release_native(channel, state.handle);
                true
            }
            None => false,
        }
    }

    /// Remove and destroy the channel's stream only if it is still `handle`
    pub fn destroy_if_current(&self, channel: ChannelId, handle: StreamHandle) -> bool {
        match self.remove(channel, Some(handle)) {
            Some(state) => {
                self.release_native(channel, state.handle);
                true
            }
            None => false,
        }
    }

    fn with_current<R>(
        &self,
        channel: ChannelId,
        handle: StreamHandle,
        f: impl FnOnce(&mut StreamState) -> R,
    ) -> Option<R> {
        let mut shard = self.shard(channel).lock();
        shard
            .get_mut(&channel)
            .filter(|state| state.handle == handle)
            .map(f)
    }

    pub fn on_write_complete(&self, channel: ChannelId, handle: StreamHandle) {
        self.with_current(channel, handle, |state| {
            state.on_write_complete(Instant::now())
        });
    }

    /// Record a short write and apply the resulting escalation step
    pub fn on_write_shortfall(&self, channel: ChannelId, handle: StreamHandle) -> RecoveryAction {
        let policy = &self.policy;
        let action = self
            .with_current(channel, handle, |state| {
                state.on_shortfall(policy, Instant::now())
            })
            .unwrap_or(RecoveryAction::None);
        self.apply(channel, handle, action);
        action
    }

    /// Record a native write exception and apply the rate-limited clear
    pub fn on_write_error(&self, channel: ChannelId, handle: StreamHandle) -> RecoveryAction {
        let policy = &self.policy;
        let action = self
            .with_current(channel, handle, |state| {
                state.on_exception(policy, Instant::now())
            })
            .unwrap_or(RecoveryAction::None);
        if action == RecoveryAction::ClearBuffer {
            warn!("Stream for channel {} raised an exception, clearing", channel);
        }
        self.apply(channel, handle, action);
        action
    }

    fn apply(&self, channel: ChannelId, handle: StreamHandle, action: RecoveryAction) {
        match action {
            RecoveryAction::None => {}
            RecoveryAction::ClearBuffer => {
                if let Err(e) = self.backend.clear_buffer(handle) {
                    error!(
                        "Clear failed on channel {} ({}), marking for recreation",
                        channel, e
                    );
                    self.mark_unhealthy(channel, handle);
                }
            }
            RecoveryAction::Restart => {
                warn!("Restarting stream for channel {}", channel);
                let restarted = self
                    .backend
                    .stop(handle)
                    .and_then(|_| self.backend.start(handle));
                if let Err(e) = restarted {
                    error!(
                        "Restart failed on channel {} ({}), marking for recreation",
                        channel, e
                    );
                    self.mark_unhealthy(channel, handle);
                }
            }
            RecoveryAction::Destroy => {
                warn!("Destroying stream for channel {} after repeated failures", channel);
                self.destroy_if_current(channel, handle);
            }
        }
    }

    fn mark_unhealthy(&self, channel: ChannelId, handle: StreamHandle) {
        let policy = &self.policy;
        self.with_current(channel, handle, |state| state.mark_unhealthy(policy));
    }

    /// Destroy every stream; channels recreate theirs on the next render
    pub fn recreate_all(&self) -> usize {
        let mut count = 0;
        for shard in &self.shards {
            let drained: Vec<(ChannelId, StreamState)> = shard.lock().drain().collect();
            self.slots.fetch_sub(drained.len(), Ordering::AcqRel);
            count += drained.len();
            for (channel, state) in drained {
                self.release_native(channel, state.handle);
            }
        }
        count
    }

    /// Zero failure counters and clear timestamps on every stream
    pub fn reset_failures(&self) {
        for shard in &self.shards {
            for state in shard.lock().values_mut() {
                state.reset_failures();
            }
        }
    }

    pub fn snapshot(&self) -> Vec<PooledStream> {
        let mut out: Vec<PooledStream> = Vec::new();
        for shard in &self.shards {
            out.extend(shard.lock().iter().map(|(channel, state)| PooledStream {
                channel: *channel,
                handle: state.handle,
                consecutive_failures: state.consecutive_failures,
            }));
        }
        out.sort_by_key(|s| s.channel);
        out
    }

    pub fn get(&self, channel: ChannelId) -> Option<PooledStream> {
        self.shard(channel).lock().get(&channel).map(|state| PooledStream {
            channel,
            handle: state.handle,
            consecutive_failures: state.consecutive_failures,
        })
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Refuse new streams and destroy the live ones
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        self.recreate_all()
    }

    #[cfg(test)]
    pub(crate) fn set_last_write(&self, channel: ChannelId, at: Instant) {
        if let Some(state) = self.shard(channel).lock().get_mut(&channel) {
            state.last_write = at;
        }
    }

    #[cfg(test)]
    pub(crate) fn reserved_slots(&self) -> usize {
        self.slots.load(Ordering::Acquire)
    }
}
