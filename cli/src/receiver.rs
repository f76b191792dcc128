//! Simulated RF receivers and the software device clock

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rfmix_core::{ChannelId, RenderOutcome, RfEngine, SoftwareBackend};
use tracing::debug;

/// Sine generator standing in for one demodulated receiver
pub struct ToneReceiver {
    channel: ChannelId,
    phase: f32,
    step: f32,
    amplitude: f32,
    position: u64,
}

impl ToneReceiver {
    pub fn new(channel: ChannelId, frequency_hz: f32, sample_rate: u32, amplitude: f32) -> Self {
        Self {
            channel,
            phase: 0.0,
            step: TAU * frequency_hz / sample_rate as f32,
            amplitude,
            position: 0,
        }
    }

    /// Fill `block` with the next samples; returns the block's start position
    pub fn next_block(&mut self, block: &mut [f32]) -> u64 {
        for sample in block.iter_mut() {
            *sample = self.phase.sin() * self.amplitude;
            self.phase = (self.phase + self.step) % TAU;
        }
        let start = self.position;
        self.position += block.len() as u64;
        start
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }
}

/// Run `receiver` on its own thread until `stop` is set
pub fn spawn_receiver(
    engine: Arc<RfEngine>,
    mut receiver: ToneReceiver,
    block_frames: usize,
    block_period: Duration,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("rfmix-rx-{}", receiver.channel()))
        .spawn(move || {
            let mut block = vec![0.0f32; block_frames];
            let mut next = Instant::now();
            while !stop.load(Ordering::Relaxed) {
                let position = receiver.next_block(&mut block);
                let outcome = engine.render_channel_rf(receiver.channel(), &block, position);
                if let RenderOutcome::Dropped { frames } = outcome {
                    debug!("Receiver {} lost {} frames", receiver.channel(), frames);
                }

                next += block_period;
                if let Some(wait) = next.checked_duration_since(Instant::now()) {
                    thread::sleep(wait);
                }
            }
        })
}

/// Drain software streams in real time, like a device callback would
pub fn spawn_clock(
    backend: Arc<SoftwareBackend>,
    frames: usize,
    period: Duration,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("rfmix-clock".into())
        .spawn(move || {
            let mut next = Instant::now();
            while !stop.load(Ordering::Relaxed) {
                backend.pump(frames);
                next += period;
                if let Some(wait) = next.checked_duration_since(Instant::now()) {
                    thread::sleep(wait);
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_positions_advance() {
        let mut rx = ToneReceiver::new(3, 1000.0, 48000, 0.5);
        let mut block = vec![0.0; 64];
        assert_eq!(rx.next_block(&mut block), 0);
        assert_eq!(rx.next_block(&mut block), 64);
        assert!(block.iter().all(|s| s.abs() <= 0.5));
        assert!(block.iter().any(|s| s.abs() > 0.1));
    }
}
