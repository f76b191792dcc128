//! Scripted backend for engine unit tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use rfmix_platform::{
    ChannelId, EngineHandle, PlatformError, RfStreamStats, StreamBackend, StreamHandle,
};

/// Scripted result for one `write` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WriteScript {
    /// Accept every frame
    Accept,
    /// Accept this many frames
    Short(usize),
    /// Raise a native exception
    Fail,
}

type CreateHook = Box<dyn FnOnce(ChannelId) + Send>;

/// Native call counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Calls {
    pub creates: usize,
    pub destroys: usize,
    pub writes: usize,
    pub clears: usize,
    pub starts: usize,
    pub stops: usize,
    pub buffer_sizes: usize,
}

#[derive(Debug)]
struct FakeStream {
    channel: ChannelId,
    stats: RfStreamStats,
    latency_ms: f32,
}

#[derive(Default)]
pub struct FakeBackend {
    next_handle: AtomicU64,
    streams: Mutex<HashMap<StreamHandle, FakeStream>>,
    script: Mutex<VecDeque<WriteScript>>,
    fail_create: AtomicBool,
    fail_clear: AtomicBool,
    fail_stats: Mutex<HashSet<StreamHandle>>,
    engine_destroyed: AtomicBool,
    last_written: Mutex<Vec<f32>>,
    on_create: Mutex<Option<CreateHook>>,

    creates: AtomicUsize,
    destroys: AtomicUsize,
    writes: AtomicUsize,
    clears: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
    buffer_sizes: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            ..Default::default()
        }
    }

    /// Queue write results; once drained, writes accept everything
    pub fn script_writes(&self, writes: impl IntoIterator<Item = WriteScript>) {
        self.script.lock().extend(writes);
    }

    /// Run `hook` inside the next successful `create_stream`, after the
    /// native stream exists but before the caller sees its handle
    pub fn on_next_create(&self, hook: impl FnOnce(ChannelId) + Send + 'static) {
        *self.on_create.lock() = Some(Box::new(hook));
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_clear(&self, fail: bool) {
        self.fail_clear.store(fail, Ordering::SeqCst);
    }

    pub fn fail_stats_for(&self, handle: StreamHandle) {
        self.fail_stats.lock().insert(handle);
    }

    pub fn set_stream_stats(&self, handle: StreamHandle, stats: RfStreamStats, latency_ms: f32) {
        if let Some(stream) = self.streams.lock().get_mut(&handle) {
            stream.stats = stats;
            stream.latency_ms = latency_ms;
        }
    }

    pub fn live_streams(&self) -> usize {
        self.streams.lock().len()
    }

    pub fn is_live(&self, handle: StreamHandle) -> bool {
        self.streams.lock().contains_key(&handle)
    }

    pub fn channel_of(&self, handle: StreamHandle) -> Option<ChannelId> {
        self.streams.lock().get(&handle).map(|s| s.channel)
    }

    /// Interleaved buffer passed to the most recent `write`
    pub fn last_written(&self) -> Vec<f32> {
        self.last_written.lock().clone()
    }

    pub fn engine_destroyed(&self) -> bool {
        self.engine_destroyed.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Calls {
        Calls {
            creates: self.creates.load(Ordering::SeqCst),
            destroys: self.destroys.load(Ordering::SeqCst),
            writes: self.writes.load(Ordering::SeqCst),
            clears: self.clears.load(Ordering::SeqCst),
            starts: self.starts.load(Ordering::SeqCst),
            stops: self.stops.load(Ordering::SeqCst),
            buffer_sizes: self.buffer_sizes.load(Ordering::SeqCst),
        }
    }

    fn check(&self, handle: StreamHandle) -> Result<(), PlatformError> {
        if self.streams.lock().contains_key(&handle) {
            Ok(())
        } else {
            Err(PlatformError::InvalidHandle(handle.get()))
        }
    }
}

impl StreamBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn create_engine(
        &self,
        _sample_rate: u32,
        _channels: u16,
    ) -> Result<EngineHandle, PlatformError> {
        EngineHandle::from_raw(1000)
            .ok_or_else(|| PlatformError::EngineCreationFailed("zero handle".into()))
    }

    fn destroy_engine(&self, _engine: EngineHandle) {
        self.engine_destroyed.store(true, Ordering::SeqCst);
    }

    fn create_stream(
        &self,
        _engine: EngineHandle,
        channel: ChannelId,
    ) -> Result<StreamHandle, PlatformError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(PlatformError::StreamCreationFailed {
                channel,
                reason: "scripted".into(),
            });
        }
        let handle = StreamHandle::from_raw(self.next_handle.fetch_add(1, Ordering::SeqCst))
            .ok_or(PlatformError::InvalidHandle(0))?;
        self.streams.lock().insert(
            handle,
            FakeStream {
                channel,
                stats: RfStreamStats::default(),
                latency_ms: 0.0,
            },
        );
        let hook = self.on_create.lock().take();
        if let Some(hook) = hook {
            hook(channel);
        }
        Ok(handle)
    }

    fn start(&self, stream: StreamHandle) -> Result<(), PlatformError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.check(stream)
    }

    fn stop(&self, stream: StreamHandle) -> Result<(), PlatformError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.check(stream)
    }

    fn write(&self, stream: StreamHandle, interleaved: &[f32]) -> Result<usize, PlatformError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check(stream)?;
        *self.last_written.lock() = interleaved.to_vec();
        let frames = interleaved.len() / 2;
        match self.script.lock().pop_front().unwrap_or(WriteScript::Accept) {
            WriteScript::Accept => Ok(frames),
            WriteScript::Short(n) => Ok(n.min(frames)),
            WriteScript::Fail => Err(PlatformError::WriteFailed("scripted".into())),
        }
    }

    fn clear_buffer(&self, stream: StreamHandle) -> Result<(), PlatformError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.check(stream)?;
        if self.fail_clear.load(Ordering::SeqCst) {
            return Err(PlatformError::StreamOperationFailed("scripted clear".into()));
        }
        Ok(())
    }

    fn set_buffer_size(&self, stream: StreamHandle, frames: u32) -> Result<u32, PlatformError> {
        self.buffer_sizes.fetch_add(1, Ordering::SeqCst);
        self.check(stream)?;
        Ok(frames)
    }

    fn latency_ms(&self, stream: StreamHandle) -> Result<f32, PlatformError> {
        self.streams
            .lock()
            .get(&stream)
            .map(|s| s.latency_ms)
            .ok_or(PlatformError::InvalidHandle(stream.get()))
    }

    fn buffer_stats(&self, stream: StreamHandle) -> Result<u32, PlatformError> {
        self.streams
            .lock()
            .get(&stream)
            .map(|s| s.stats.available_frames)
            .ok_or(PlatformError::InvalidHandle(stream.get()))
    }

    fn rf_stats(&self, stream: StreamHandle) -> Result<RfStreamStats, PlatformError> {
        if self.fail_stats.lock().contains(&stream) {
            return Err(PlatformError::StreamOperationFailed("scripted stats".into()));
        }
        self.streams
            .lock()
            .get(&stream)
            .map(|s| s.stats)
            .ok_or(PlatformError::InvalidHandle(stream.get()))
    }

    fn destroy_stream(&self, stream: StreamHandle) -> Result<(), PlatformError> {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        self.streams
            .lock()
            .remove(&stream)
            .map(|_| ())
            .ok_or(PlatformError::InvalidHandle(stream.get()))
    }
}
