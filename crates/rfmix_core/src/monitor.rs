//! Engine Monitor
//!
//! A background thread that samples the engine and publishes snapshots as
//! [`Event`]s. Channel levels go out every poll interval, aggregate stats
//! once per second.
//!
//! The event channel is bounded and the monitor only ever uses `try_send`:
//! a slow consumer loses samples, it never stalls the monitor.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, info};

use crate::engine::RfEngine;
use crate::error::{EngineError, EngineResult};
use crate::message::Event;

/// Interval between `Event::Stats` samples
pub const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// Default event queue depth
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Handle to a running monitor thread
pub struct Monitor {
    events: Receiver<Event>,
    stop_sender: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Monitor {
    /// Start monitoring `engine`
    pub fn spawn(
        engine: Arc<RfEngine>,
        poll_interval: Duration,
        capacity: usize,
    ) -> EngineResult<Self> {
        Self::spawn_with_stats_interval(engine, poll_interval, STATS_INTERVAL, capacity)
    }

    pub fn spawn_with_stats_interval(
        engine: Arc<RfEngine>,
        poll_interval: Duration,
        stats_interval: Duration,
        capacity: usize,
    ) -> EngineResult<Self> {
        let (event_sender, events) = bounded::<Event>(capacity.max(1));
        let (stop_sender, stop_receiver) = bounded::<()>(1);

        let thread = thread::Builder::new()
            .name("rfmix-monitor".into())
            .spawn(move || {
                Self::monitor_main(
                    engine,
                    event_sender,
                    stop_receiver,
                    poll_interval,
                    stats_interval,
                );
            })
            .map_err(|e| EngineError::ThreadSpawn {
                name: "rfmix-monitor",
                reason: e.to_string(),
            })?;

        Ok(Self {
            events,
            stop_sender: Some(stop_sender),
            thread: Some(thread),
        })
    }

    fn monitor_main(
        engine: Arc<RfEngine>,
        events: Sender<Event>,
        stop: Receiver<()>,
        poll_interval: Duration,
        stats_interval: Duration,
    ) {
        info!("Monitor started ({:?} poll interval)", poll_interval);
        let mut dropped = 0_u64;
        let mut publish = |event: Event| match events.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                dropped += 1;
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        };

        publish(Event::Started);
        let mut last_stats: Option<Instant> = None;

        loop {
            match stop.recv_timeout(poll_interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }

            if engine.is_released() {
                publish(Event::error("engine released while monitoring"));
                break;
            }

            let channels = engine.all_channel_states();
            if !publish(Event::ChannelLevels { channels }) {
                break;
            }

            let due = last_stats.map_or(true, |at| at.elapsed() >= stats_interval);
            if due {
                last_stats = Some(Instant::now());
                if !publish(Event::Stats(engine.rf_stats())) {
                    break;
                }
            }
        }

        publish(Event::Stopped);
        if dropped > 0 {
            debug!("Monitor dropped {} events on a full queue", dropped);
        }
        info!("Monitor stopped");
    }

    /// Get next event (non-blocking)
    pub fn poll_event(&self) -> Option<Event> {
        self.events.try_recv().ok()
    }

    /// Get next event, waiting up to `timeout`
    pub fn wait_event_timeout(&self, timeout: Duration) -> Option<Event> {
        self.events.recv_timeout(timeout).ok()
    }

    pub fn events(&self) -> &Receiver<Event> {
        &self.events
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the thread and wait for it; idempotent
    pub fn stop(&mut self) {
        if let Some(sender) = self.stop_sender.take() {
            let _ = sender.try_send(());
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}
