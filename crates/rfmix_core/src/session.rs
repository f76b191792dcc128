//! Foreground Session
//!
//! A `Session` keeps the engine alive for as long as an operator is
//! listening. It holds the platform power locks (CPU wake, network) through
//! a [`PowerGuard`], renews them before they time out, and runs a
//! [`Monitor`] for display consumers.
//!
//! # Lifecycle
//!
//! ```text
//! start:    guard.acquire ─▶ engine.start ─▶ monitor ─▶ renewer thread
//! running:  every RENEW_INTERVAL: guard.renew(LOCK_TIMEOUT)
//! shutdown: renewer stop ─▶ monitor stop ─▶ engine.release ─▶ guard.release
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::engine::RfEngine;
use crate::error::{EngineError, EngineResult};
use crate::message::Event;
use crate::monitor::{Monitor, DEFAULT_EVENT_CAPACITY, STATS_INTERVAL};

/// Power locks are acquired with this timeout
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Locks are renewed this often, ahead of `LOCK_TIMEOUT`
pub const RENEW_INTERVAL: Duration = Duration::from_secs(4 * 60);

/// Platform power/network locks held while a session runs
pub trait PowerGuard: Send {
    /// Take the locks, expiring after `timeout` unless renewed
    fn acquire(&mut self, timeout: Duration) -> EngineResult<()>;

    /// Extend the locks for another `timeout`
    fn renew(&mut self, timeout: Duration) -> EngineResult<()>;

    /// Drop the locks; must be safe to call when not held
    fn release(&mut self);

    fn is_held(&self) -> bool;
}

/// Guard for hosts without power management
#[derive(Debug, Default)]
pub struct NoopPowerGuard {
    held: bool,
}

impl PowerGuard for NoopPowerGuard {
    fn acquire(&mut self, _timeout: Duration) -> EngineResult<()> {
        self.held = true;
        Ok(())
    }

    fn renew(&mut self, _timeout: Duration) -> EngineResult<()> {
        if self.held {
            Ok(())
        } else {
            Err(EngineError::PowerLock("renew without acquire".into()))
        }
    }

    fn release(&mut self) {
        self.held = false;
    }

    fn is_held(&self) -> bool {
        self.held
    }
}

/// Session timing knobs
#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    pub lock_timeout: Duration,
    pub renew_interval: Duration,
    pub poll_interval: Duration,
    pub stats_interval: Duration,
    pub event_capacity: usize,
}

impl SessionTiming {
    /// Default timing with the engine's configured poll interval
    pub fn for_engine(engine: &RfEngine) -> Self {
        Self {
            lock_timeout: LOCK_TIMEOUT,
            renew_interval: RENEW_INTERVAL,
            poll_interval: Duration::from_millis(engine.config().poll_interval_ms),
            stats_interval: STATS_INTERVAL,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

type SharedGuard = Arc<Mutex<Box<dyn PowerGuard>>>;

/// A running foreground session
pub struct Session {
    engine: Arc<RfEngine>,
    guard: SharedGuard,
    monitor: Option<Monitor>,
    renew_stop: Option<Sender<()>>,
    renewer: Option<JoinHandle<()>>,
}

impl Session {
    /// Start a session with default timing
    pub fn start(engine: Arc<RfEngine>, guard: Box<dyn PowerGuard>) -> EngineResult<Self> {
        let timing = SessionTiming::for_engine(&engine);
        Self::with_timing(engine, guard, timing)
    }

    pub fn with_timing(
        engine: Arc<RfEngine>,
        mut guard: Box<dyn PowerGuard>,
        timing: SessionTiming,
    ) -> EngineResult<Self> {
        guard.acquire(timing.lock_timeout)?;
        let guard: SharedGuard = Arc::new(Mutex::new(guard));

        engine.start();

        let monitor = match Monitor::spawn_with_stats_interval(
            Arc::clone(&engine),
            timing.poll_interval,
            timing.stats_interval,
            timing.event_capacity,
        ) {
            Ok(monitor) => monitor,
            Err(e) => {
                guard.lock().release();
                return Err(e);
            }
        };

        let (renew_stop, renew_rx) = bounded::<()>(1);
        let renew_guard = Arc::clone(&guard);
        let renewer = thread::Builder::new()
            .name("rfmix-power".into())
            .spawn(move || Self::renew_main(renew_guard, renew_rx, timing))
            .map_err(|e| EngineError::ThreadSpawn {
                name: "rfmix-power",
                reason: e.to_string(),
            });
        let renewer = match renewer {
            Ok(handle) => handle,
            Err(e) => {
                drop(monitor);
                guard.lock().release();
                return Err(e);
            }
        };

        info!("Session started on {} backend", engine.backend_name());

        Ok(Self {
            engine,
            guard,
            monitor: Some(monitor),
            renew_stop: Some(renew_stop),
            renewer: Some(renewer),
        })
    }

    fn renew_main(guard: SharedGuard, stop: Receiver<()>, timing: SessionTiming) {
        loop {
            match stop.recv_timeout(timing.renew_interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
            match guard.lock().renew(timing.lock_timeout) {
                Ok(()) => debug!("Power locks renewed for {:?}", timing.lock_timeout),
                Err(e) => warn!("Failed to renew power locks: {}", e),
            }
        }
    }

    pub fn engine(&self) -> &Arc<RfEngine> {
        &self.engine
    }

    /// Get next monitor event (non-blocking)
    pub fn poll_event(&self) -> Option<Event> {
        self.monitor.as_ref().and_then(Monitor::poll_event)
    }

    /// Get next monitor event, waiting up to `timeout`
    pub fn wait_event_timeout(&self, timeout: Duration) -> Option<Event> {
        self.monitor
            .as_ref()
            .and_then(|monitor| monitor.wait_event_timeout(timeout))
    }

    pub fn holds_power_locks(&self) -> bool {
        self.guard.lock().is_held()
    }

    pub fn is_shut_down(&self) -> bool {
        self.monitor.is_none()
    }

    /// Stop monitoring, release the engine and the power locks; idempotent
    pub fn shutdown(&mut self) {
        if let Some(stop) = self.renew_stop.take() {
            let _ = stop.try_send(());
        }
        if let Some(handle) = self.renewer.take() {
            let _ = handle.join();
        }

        let Some(mut monitor) = self.monitor.take() else {
            return;
        };
        monitor.stop();

        self.engine.release();
        self.guard.lock().release();
        info!("Session ended");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
