//! Transport seam for acknowledgment-gated hardware output.
//!
//! The playback engine does not own a serial port. It depends on a minimal
//! [`Transport`] capability - send a textual command, wait for the device's
//! acknowledgment, remember the last known laser state - and a
//! physical-port adapter outside this crate implements it. The adapter's
//! inbound-listener worker calls into [`LinkState`] to flip the ready
//! signal and record disconnects; the engine only ever waits on it.
//!
//! Protocol: newline-terminated text lines. `laser on`, `laser off` and
//! `move <x> <y>` each elicit exactly one acknowledgment. Arbitrary
//! operator commands are passed through verbatim and never interpreted.

use crate::Result;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::trace;

/// Default bound on waiting for a command acknowledgment. On expiry the
/// engine proceeds rather than deadlocking on a silent device.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// Half-duplex command link to a laser projector.
///
/// Implementations are shared between the playback worker (sender) and the
/// adapter's listener worker (acknowledger); all methods take `&self`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Write one command line to the device. Implementations append the
    /// trailing newline if missing and mark the link busy until the next
    /// acknowledgment.
    async fn send(&self, command: &str) -> Result<()>;

    /// Wait until the last command is acknowledged, bounded by `timeout`.
    ///
    /// Returns `false` on expiry. An acknowledgment that arrived before the
    /// wait started completes immediately; the wait can never race a busy
    /// flag set just before the preceding send.
    async fn await_ready(&self, timeout: Duration) -> bool;

    /// Last known laser state. `None` when unknown or disconnected, which
    /// forces the engine to re-send the laser command before moving.
    fn laser_on(&self) -> Option<bool>;

    /// Record the laser state after a laser command was issued.
    fn set_laser_on(&self, on: bool);

    /// Whether a device is currently attached. Transmit mode refuses to run
    /// without one.
    fn is_connected(&self) -> bool;

    /// Toggle echoing of device responses to the operator console. Transmit
    /// mode turns echo off by policy; adapters without a console ignore it.
    fn set_echo(&self, _enabled: bool) {}
}

/// Shared ready/laser bookkeeping for transport adapters.
///
/// The ready signal is a `watch` channel carrying "is the link idle": the
/// sender flips it to busy after each write, the listener worker flips it
/// back on each acknowledgment. Waiters check the current value before
/// parking, so the set/clear ordering around a send cannot lose a wake-up.
#[derive(Debug)]
pub struct LinkState {
    ready_tx: watch::Sender<bool>,
    laser: Mutex<Option<bool>>,
    connected: AtomicBool,
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkState {
    /// A link that starts idle, disconnected, with unknown laser state.
    pub fn new() -> Self {
        let (ready_tx, _) = watch::channel(true);
        Self { ready_tx, laser: Mutex::new(None), connected: AtomicBool::new(false) }
    }

    /// Mark the link busy. Call immediately after writing a command.
    pub fn mark_busy(&self) {
        self.ready_tx.send_replace(false);
    }

    /// Mark the link idle. The adapter's listener calls this once per
    /// acknowledgment line received from the device.
    pub fn acknowledge(&self) {
        trace!("Transport acknowledged");
        self.ready_tx.send_replace(true);
    }

    /// Wait for the link to be idle, bounded by `timeout`. Returns `false`
    /// on expiry.
    pub async fn await_ready(&self, timeout: Duration) -> bool {
        let mut rx = self.ready_tx.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|ready| *ready)).await.is_ok_and(|r| r.is_ok())
    }

    /// Last known laser state.
    pub fn laser_on(&self) -> Option<bool> {
        *self.laser.lock().expect("laser state lock poisoned")
    }

    /// Record the laser state.
    pub fn set_laser_on(&self, on: bool) {
        *self.laser.lock().expect("laser state lock poisoned") = Some(on);
    }

    /// Record that the device appeared. The laser state stays unknown until
    /// the first laser command round-trips.
    pub fn connected(&self) {
        self.connected.store(true, Ordering::Release);
        self.ready_tx.send_replace(true);
    }

    /// Record that the device went away: laser state becomes unknown and
    /// any waiter is released so playback cannot hang on a dead port.
    pub fn disconnected(&self) {
        self.connected.store(false, Ordering::Release);
        *self.laser.lock().expect("laser state lock poisoned") = None;
        self.ready_tx.send_replace(true);
    }

    /// Whether the device is currently attached.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}
