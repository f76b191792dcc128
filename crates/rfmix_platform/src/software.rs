//! Software Output Backend
//!
//! A device-less implementation of [`StreamBackend`]. Each stream owns a
//! jitter buffer exactly as a hardware adapter would, but nothing drains it
//! until [`SoftwareBackend::pump`] is called. A clock thread calling `pump`
//! at real-time pace turns this into a null sink; tests call it directly to
//! step the "device" deterministically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::PlatformError;
use crate::jitter::{jitter_buffer, JitterConfig, JitterReader, JitterState, JitterWriter};
use crate::traits::{ChannelId, EngineHandle, RfStreamStats, StreamBackend, StreamHandle};

#[derive(Debug, Clone, Copy)]
struct EngineInfo {
    sample_rate: u32,
    channels: u16,
}

struct SoftwareStream {
    channel: ChannelId,
    engine: EngineHandle,
    running: AtomicBool,
    writer: Mutex<JitterWriter>,
    reader: Mutex<JitterReader>,
    state: Arc<JitterState>,
}

/// Null-device backend driven by an explicit clock
pub struct SoftwareBackend {
    next_handle: AtomicU64,
    jitter: JitterConfig,
    engines: Mutex<HashMap<EngineHandle, EngineInfo>>,
    streams: RwLock<HashMap<StreamHandle, Arc<SoftwareStream>>>,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::with_jitter_config(JitterConfig::default())
    }

    /// Use a custom jitter policy; channels and sample rate come from the engine
    pub fn with_jitter_config(jitter: JitterConfig) -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            jitter,
            engines: Mutex::new(HashMap::new()),
            streams: RwLock::new(HashMap::new()),
        }
    }

    fn allocate(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn stream(&self, handle: StreamHandle) -> Result<Arc<SoftwareStream>, PlatformError> {
        self.streams
            .read()
            .get(&handle)
            .cloned()
            .ok_or(PlatformError::InvalidHandle(handle.get()))
    }

    /// Advance the virtual device clock by `frames` on every running stream
    ///
    /// Returns the total number of real (non-silent) frames consumed.
    pub fn pump(&self, frames: usize) -> usize {
        let streams: Vec<Arc<SoftwareStream>> = self.streams.read().values().cloned().collect();
        let mut scratch = Vec::new();
        let mut played = 0;
        for stream in streams {
            if !stream.running.load(Ordering::Acquire) {
                continue;
            }
            scratch.resize(frames * stream.state.channels(), 0.0);
            played += stream.reader.lock().fill(&mut scratch);
        }
        played
    }

    /// Number of open streams across all engines
    pub fn stream_count(&self) -> usize {
        self.streams.read().len()
    }

    /// Channel a live stream is bound to
    pub fn channel_of(&self, handle: StreamHandle) -> Option<ChannelId> {
        self.streams.read().get(&handle).map(|s| s.channel)
    }

    pub fn is_running(&self, handle: StreamHandle) -> bool {
        self.streams
            .read()
            .get(&handle)
            .map(|s| s.running.load(Ordering::Acquire))
            .unwrap_or(false)
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn create_engine(
        &self,
        sample_rate: u32,
        channels: u16,
    ) -> Result<EngineHandle, PlatformError> {
        if sample_rate == 0 || channels == 0 {
            return Err(PlatformError::EngineCreationFailed(format!(
                "{} Hz / {} channels",
                sample_rate, channels
            )));
        }
        let handle = EngineHandle::from_raw(self.allocate())
            .ok_or_else(|| PlatformError::EngineCreationFailed("handle space exhausted".into()))?;
        self.engines.lock().insert(
            handle,
            EngineInfo {
                sample_rate,
                channels,
            },
        );
        debug!("Software engine {} created: {} Hz, {} channels", handle, sample_rate, channels);
        Ok(handle)
    }

    fn destroy_engine(&self, engine: EngineHandle) {
        if self.engines.lock().remove(&engine).is_none() {
            return;
        }
        let mut streams = self.streams.write();
        let before = streams.len();
        streams.retain(|_, s| s.engine != engine);
        debug!(
            "Software engine {} destroyed with {} streams",
            engine,
            before - streams.len()
        );
    }

    fn create_stream(
        &self,
        engine: EngineHandle,
        channel: ChannelId,
    ) -> Result<StreamHandle, PlatformError> {
        let info = self
            .engines
            .lock()
            .get(&engine)
            .copied()
            .ok_or(PlatformError::InvalidHandle(engine.get()))?;

        let config = JitterConfig {
            channels: info.channels as usize,
            sample_rate: info.sample_rate,
            ..self.jitter.clone()
        };
        let (writer, reader) = jitter_buffer(config);
        let state = Arc::clone(writer.state());

        let handle = StreamHandle::from_raw(self.allocate()).ok_or_else(|| {
            PlatformError::StreamCreationFailed {
                channel,
                reason: "handle space exhausted".into(),
            }
        })?;
        self.streams.write().insert(
            handle,
            Arc::new(SoftwareStream {
                channel,
                engine,
                running: AtomicBool::new(false),
                writer: Mutex::new(writer),
                reader: Mutex::new(reader),
                state,
            }),
        );
        Ok(handle)
    }

    fn start(&self, stream: StreamHandle) -> Result<(), PlatformError> {
        self.stream(stream)?.running.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&self, stream: StreamHandle) -> Result<(), PlatformError> {
        self.stream(stream)?.running.store(false, Ordering::Release);
        Ok(())
    }

    fn write(&self, stream: StreamHandle, interleaved: &[f32]) -> Result<usize, PlatformError> {
        let stream = self.stream(stream)?;
        let written = stream.writer.lock().write(interleaved);
        Ok(written)
    }

    fn clear_buffer(&self, stream: StreamHandle) -> Result<(), PlatformError> {
        self.stream(stream)?.state.clear();
        Ok(())
    }

    fn set_buffer_size(&self, stream: StreamHandle, frames: u32) -> Result<u32, PlatformError> {
        let applied = self.stream(stream)?.state.set_target_frames(frames as usize);
        Ok(applied as u32)
    }

    fn latency_ms(&self, stream: StreamHandle) -> Result<f32, PlatformError> {
        Ok(self.stream(stream)?.state.latency_ms())
    }

    fn buffer_stats(&self, stream: StreamHandle) -> Result<u32, PlatformError> {
        Ok(self.stream(stream)?.state.available_frames() as u32)
    }

    fn rf_stats(&self, stream: StreamHandle) -> Result<RfStreamStats, PlatformError> {
        Ok(self.stream(stream)?.state.stats())
    }

    fn destroy_stream(&self, stream: StreamHandle) -> Result<(), PlatformError> {
        self.streams
            .write()
            .remove(&stream)
            .map(|_| ())
            .ok_or(PlatformError::InvalidHandle(stream.get()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_with_engine() -> (SoftwareBackend, EngineHandle) {
        let backend = SoftwareBackend::new();
        let engine = backend.create_engine(48000, 2).unwrap();
        (backend, engine)
    }

    #[test]
    fn test_stream_lifecycle() {
        let (backend, engine) = backend_with_engine();
        let stream = backend.create_stream(engine, 3).unwrap();
        assert_eq!(backend.channel_of(stream), Some(3));
        assert!(!backend.is_running(stream));

        backend.start(stream).unwrap();
        assert!(backend.is_running(stream));

        backend.destroy_stream(stream).unwrap();
        assert!(matches!(
            backend.write(stream, &[0.0; 4]),
            Err(PlatformError::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_handles_are_unique() {
        let (backend, engine) = backend_with_engine();
        let a = backend.create_stream(engine, 0).unwrap();
        let b = backend.create_stream(engine, 0).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_write_and_pump() {
        let (backend, engine) = backend_with_engine();
        let stream = backend.create_stream(engine, 1).unwrap();
        backend.start(stream).unwrap();

        assert_eq!(backend.write(stream, &[0.25; 200]).unwrap(), 100);
        assert_eq!(backend.buffer_stats(stream).unwrap(), 100);

        assert_eq!(backend.pump(64), 64);
        assert_eq!(backend.buffer_stats(stream).unwrap(), 36);
    }

    #[test]
    fn test_stopped_stream_is_not_drained() {
        let (backend, engine) = backend_with_engine();
        let stream = backend.create_stream(engine, 1).unwrap();
        backend.write(stream, &[0.25; 20]).unwrap();
        assert_eq!(backend.pump(64), 0);
        assert_eq!(backend.buffer_stats(stream).unwrap(), 10);
    }

    #[test]
    fn test_unknown_engine() {
        let backend = SoftwareBackend::new();
        let bogus = EngineHandle::from_raw(99).unwrap();
        assert!(backend.create_stream(bogus, 0).is_err());
        assert!(backend.create_engine(0, 2).is_err());
    }

    #[test]
    fn test_destroy_engine_drops_streams() {
        let (backend, engine) = backend_with_engine();
        backend.create_stream(engine, 0).unwrap();
        backend.create_stream(engine, 1).unwrap();
        assert_eq!(backend.stream_count(), 2);
        backend.destroy_engine(engine);
        assert_eq!(backend.stream_count(), 0);
    }

    #[test]
    fn test_set_buffer_size_reports_applied() {
        let (backend, engine) = backend_with_engine();
        let stream = backend.create_stream(engine, 0).unwrap();
        assert_eq!(backend.set_buffer_size(stream, 128).unwrap(), 128);
        assert_eq!(backend.set_buffer_size(stream, 2).unwrap(), 16);
    }
}
