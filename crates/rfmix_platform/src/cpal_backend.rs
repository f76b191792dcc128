//! Hardware Output via CPAL
//!
//! One CPAL output stream per RF channel on the default host device. The
//! jitter reader moves into the device callback; the writer stays with the
//! backend so `write` never touches the audio thread.
//!
//! ```text
//! write() -> JitterWriter -> rtrb ring -> JitterReader (cpal callback) -> speakers
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig as CpalStreamConfig};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error};

use crate::error::PlatformError;
use crate::jitter::{jitter_buffer, JitterConfig, JitterState, JitterWriter};
use crate::traits::{ChannelId, EngineHandle, RfStreamStats, StreamBackend, StreamHandle};

/// Owned CPAL stream
struct SendStream(Stream);

// Safety: the stream is only played, paused and dropped through the backend's
// lock; the callback state it owns is already Send
unsafe impl Send for SendStream {}
unsafe impl Sync for SendStream {}

#[derive(Debug, Clone, Copy)]
struct EngineInfo {
    sample_rate: u32,
    channels: u16,
}

struct CpalStream {
    engine: EngineHandle,
    stream: SendStream,
    writer: Mutex<JitterWriter>,
    state: Arc<JitterState>,
}

/// Backend rendering to the default CPAL output device
pub struct CpalBackend {
    next_handle: AtomicU64,
    jitter: JitterConfig,
    engines: Mutex<HashMap<EngineHandle, EngineInfo>>,
    streams: RwLock<HashMap<StreamHandle, Arc<CpalStream>>>,
}

impl CpalBackend {
    /// Fails if the host has no default output device
    pub fn new() -> Result<Self, PlatformError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(PlatformError::NoOutputDevice)?;
        debug!(
            "CPAL backend on host {:?}, device {}",
            host.id(),
            device.name().unwrap_or_else(|_| "<unnamed>".into())
        );
        Ok(Self {
            next_handle: AtomicU64::new(1),
            jitter: JitterConfig::default(),
            engines: Mutex::new(HashMap::new()),
            streams: RwLock::new(HashMap::new()),
        })
    }

    fn stream(&self, handle: StreamHandle) -> Result<Arc<CpalStream>, PlatformError> {
        self.streams
            .read()
            .get(&handle)
            .cloned()
            .ok_or(PlatformError::InvalidHandle(handle.get()))
    }

    fn build_stream(
        &self,
        info: EngineInfo,
        channel: ChannelId,
    ) -> Result<(Stream, JitterWriter), PlatformError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or(PlatformError::NoOutputDevice)?;

        let config = CpalStreamConfig {
            channels: info.channels,
            sample_rate: cpal::SampleRate(info.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (writer, mut reader) = jitter_buffer(JitterConfig {
            channels: info.channels as usize,
            sample_rate: info.sample_rate,
            ..self.jitter.clone()
        });

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // Real-time callback: no allocation, no locks
                    reader.fill(data);
                },
                move |err| {
                    error!("CPAL stream error on channel {}: {}", channel, err);
                },
                None,
            )
            .map_err(|e| PlatformError::StreamCreationFailed {
                channel,
                reason: e.to_string(),
            })?;

        Ok((stream, writer))
    }
}

impl StreamBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn create_engine(
        &self,
        sample_rate: u32,
        channels: u16,
    ) -> Result<EngineHandle, PlatformError> {
        if channels == 0 {
            return Err(PlatformError::UnsupportedFormat(format!(
                "{} channels",
                channels
            )));
        }
        let handle = EngineHandle::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed))
            .ok_or_else(|| PlatformError::EngineCreationFailed("handle space exhausted".into()))?;
        self.engines.lock().insert(
            handle,
            EngineInfo {
                sample_rate,
                channels,
            },
        );
        Ok(handle)
    }

    fn destroy_engine(&self, engine: EngineHandle) {
        if self.engines.lock().remove(&engine).is_some() {
            self.streams.write().retain(|_, s| s.engine != engine);
        }
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

        let (stream, writer) = self.build_stream(info, channel)?;
        let state = Arc::clone(writer.state());
        let handle = StreamHandle::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed))
            .ok_or_else(|| PlatformError::StreamCreationFailed {
                channel,
                reason: "handle space exhausted".into(),
            })?;

        self.streams.write().insert(
            handle,
            Arc::new(CpalStream {
                engine,
                stream: SendStream(stream),
                writer: Mutex::new(writer),
                state,
            }),
        );
        Ok(handle)
    }

    fn start(&self, stream: StreamHandle) -> Result<(), PlatformError> {
        self.stream(stream)?
            .stream
            .0
            .play()
            .map_err(|e| PlatformError::StreamOperationFailed(e.to_string()))
    }

    fn stop(&self, stream: StreamHandle) -> Result<(), PlatformError> {
        self.stream(stream)?
            .stream
            .0
            .pause()
            .map_err(|e| PlatformError::StreamOperationFailed(e.to_string()))
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
        let removed = self
            .streams
            .write()
            .remove(&stream)
            .ok_or(PlatformError::InvalidHandle(stream.get()))?;
        // Pause before the last reference drops the CPAL stream
        let _ = removed.stream.0.pause();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_cpal_stream_roundtrip() {
        let backend = match CpalBackend::new() {
            Ok(b) => b,
            Err(_) => return,
        };
        let engine = backend.create_engine(48000, 2).unwrap();
        let stream = backend.create_stream(engine, 0).unwrap();
        backend.start(stream).unwrap();
        assert_eq!(backend.write(stream, &[0.0; 256]).unwrap(), 128);
        backend.destroy_stream(stream).unwrap();
        backend.destroy_engine(engine);
    }
}
