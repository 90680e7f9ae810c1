//! Public playback session handle.
//!
//! A [`Player`] owns one background playback worker and exposes the whole
//! operator surface: open/close a show, tune rate and scale, toggle
//! transmit, pass raw commands to the device, and observe throughput. The
//! handle is cheap to share behind an `Arc`; dropping the last one stops
//! the worker.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use beamline::{Player, sink::DisplaySink};
//! use std::sync::Arc;
//!
//! # struct Canvas;
//! # impl DisplaySink for Canvas {
//! #     fn plot(&self, _x: u32, _y: u32) {}
//! #     fn clear(&self) {}
//! #     fn size(&self) -> u32 { 600 }
//! # }
//! # async fn run() -> beamline::Result<()> {
//! let player = Player::new(Arc::new(Canvas), None);
//! player.open("show.ild")?;
//! player.set_target_rate(25.0)?;
//! println!("playing at {:.1} fps", player.stats().fps);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::engine::{Command, Engine};
use crate::ilda::IldaReader;
use crate::sink::DisplaySink;
use crate::transport::{ACK_TIMEOUT, Transport};
use crate::types::PlaybackStats;
use crate::{PlayerError, Result};

/// Handle to a running playback session.
pub struct Player {
    commands: mpsc::UnboundedSender<Command>,
    preempt: Arc<AtomicBool>,
    stats: watch::Receiver<PlaybackStats>,
    cancel: CancellationToken,
    transport: Option<Arc<dyn Transport>>,
}

impl Player {
    /// Start a playback session over the given sink, optionally attached to
    /// a projector transport. Must be called within a tokio runtime.
    pub fn new(sink: Arc<dyn DisplaySink>, transport: Option<Arc<dyn Transport>>) -> Self {
        let handles = Engine::spawn(sink, transport.clone(), ACK_TIMEOUT);
        Self {
            commands: handles.commands,
            preempt: handles.preempt,
            stats: handles.stats,
            cancel: handles.cancel,
            transport,
        }
    }

    /// Open an ILDA file and start playing it, replacing any active show.
    ///
    /// The file is decoded-validated before the swap is enqueued, so a
    /// malformed file leaves the current show playing untouched.
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.swap_in(IldaReader::open(path)?)
    }

    /// Open an in-memory ILDA buffer, replacing any active show.
    pub fn open_bytes(&self, data: Vec<u8>) -> Result<()> {
        self.swap_in(IldaReader::from_bytes(data)?)
    }

    fn swap_in(&self, reader: IldaReader) -> Result<()> {
        // Preempt before enqueueing: the worker aborts the in-flight frame
        // at the next point and picks up the swap at the frame boundary.
        self.preempt.store(true, Ordering::Release);
        self.send(Command::Open(reader))
    }

    /// Stop playback and drop the active show. The worker keeps running and
    /// a later [`open`](Self::open) resumes the session.
    pub fn close(&self) -> Result<()> {
        self.preempt.store(true, Ordering::Release);
        self.send(Command::Close)
    }

    /// Set the target frame rate. Values outside the supported range are
    /// clamped; non-finite values are rejected.
    pub fn set_target_rate(&self, rate: f64) -> Result<()> {
        if !rate.is_finite() {
            return Err(PlayerError::config("target_rate", format!("{rate} is not finite")));
        }
        self.send(Command::SetTargetRate(rate))
    }

    /// Set the output scale. Values outside (0, 1] are clamped; non-finite
    /// values are rejected.
    pub fn set_scale(&self, scale: f64) -> Result<()> {
        if !scale.is_finite() {
            return Err(PlayerError::config("scale", format!("{scale} is not finite")));
        }
        self.send(Command::SetScale(scale))
    }

    /// Toggle transmit mode. Enabling requires a transport to have been
    /// attached at construction.
    pub fn set_transmit(&self, transmit: bool) -> Result<()> {
        if transmit && self.transport.is_none() {
            return Err(PlayerError::TransportUnavailable);
        }
        self.send(Command::SetTransmit(transmit))
    }

    /// Pass one raw command line through to the device, unmodified and
    /// uninterpreted. Does not wait for an acknowledgment.
    pub async fn send_command(&self, command: &str) -> Result<()> {
        let transport = self.transport.as_ref().ok_or(PlayerError::TransportUnavailable)?;
        transport.send(command).await
    }

    /// Latest throughput snapshot.
    pub fn stats(&self) -> PlaybackStats {
        *self.stats.borrow()
    }

    /// Stream of throughput snapshots, one per change. Starts with the
    /// current value.
    pub fn stats_stream(&self) -> WatchStream<PlaybackStats> {
        WatchStream::new(self.stats.clone())
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| PlayerError::Closed)
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        debug!("Player dropped, stopping worker");
        self.cancel.cancel();
    }
}
