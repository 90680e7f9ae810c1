//! Playback worker: pulls frames, simplifies them and drives a sink.
//!
//! One dedicated background task owns all mutable playback state. It pulls
//! frames from the looping reader, simplifies each point list, and emits it
//! either to the local display sink on a spin-wait timer (preview mode) or
//! to the transport paced purely by hardware acknowledgments (transmit
//! mode). Configuration changes and source swaps arrive as commands over a
//! queue and are applied only at frame boundaries, so the worker never
//! observes half-updated state mid-frame.
//!
//! Mid-frame preemption uses a single atomic flag polled after every point:
//! whoever opens or closes a file sets it, the worker aborts the in-flight
//! frame, applies the queued swap at the boundary, and clears the flag only
//! after the swap. The command queue - not the flag - is the source of
//! truth, which closes the lost-wake-up race between a stale clear and a
//! newer open.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::ilda::IldaReader;
use crate::rate::RateController;
use crate::simplify::simplify;
use crate::sink::{DisplaySink, to_normalized, to_pixel};
use crate::transport::Transport;
use crate::types::{FrameHeader, PlaybackConfig, PlaybackStats, Point};

/// Length of one throughput measurement window.
const MEASUREMENT_WINDOW: Duration = Duration::from_secs(1);

/// Playback state mutations, applied at frame boundaries only.
pub(crate) enum Command {
    /// Swap in a new, already-validated source.
    Open(IldaReader),
    /// Drop the active source.
    Close,
    SetTargetRate(f64),
    SetScale(f64),
    SetTransmit(bool),
}

/// Handles returned by [`Engine::spawn`] for the owning player.
pub(crate) struct EngineHandles {
    pub commands: mpsc::UnboundedSender<Command>,
    pub preempt: Arc<AtomicBool>,
    pub stats: watch::Receiver<PlaybackStats>,
    pub cancel: CancellationToken,
}

/// The playback worker. Owns the reader, the rate controller and the
/// frame/point accumulators; nothing else touches them.
pub(crate) struct Engine {
    sink: Arc<dyn DisplaySink>,
    transport: Option<Arc<dyn Transport>>,
    commands: mpsc::UnboundedReceiver<Command>,
    preempt: Arc<AtomicBool>,
    stats_tx: watch::Sender<PlaybackStats>,
    cancel: CancellationToken,
    ack_timeout: Duration,

    reader: Option<IldaReader>,
    config: PlaybackConfig,
    controller: RateController,
    stats: PlaybackStats,
    window_start: Instant,
    window_frames: u64,
    window_points: u64,
    /// Whether the transmit fallback warning has been issued for the
    /// current outage, so a flapping link does not spam the log.
    fallback_warned: bool,
}

impl Engine {
    /// Spawn the playback worker task.
    pub(crate) fn spawn(
        sink: Arc<dyn DisplaySink>,
        transport: Option<Arc<dyn Transport>>,
        ack_timeout: Duration,
    ) -> EngineHandles {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (stats_tx, stats_rx) = watch::channel(PlaybackStats::default());
        let preempt = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let config = PlaybackConfig::default();
        let engine = Engine {
            sink,
            transport,
            commands: command_rx,
            preempt: Arc::clone(&preempt),
            stats_tx,
            cancel: cancel.clone(),
            ack_timeout,
            reader: None,
            config,
            controller: RateController::new(config.target_rate),
            stats: PlaybackStats { current_rate: config.target_rate, ..Default::default() },
            window_start: Instant::now(),
            window_frames: 0,
            window_points: 0,
            fallback_warned: false,
        };

        tokio::spawn(engine.run());

        EngineHandles { commands: command_tx, preempt, stats: stats_rx, cancel }
    }

    async fn run(mut self) {
        info!("Playback worker started");

        loop {
            // Frame boundary: apply every queued command. The preemption
            // flag is cleared only while applying an Open or Close, so a
            // flag stored just before its command lands in the queue is
            // never swallowed here; until it arrives, frames abort at their
            // first point.
            while let Ok(command) = self.commands.try_recv() {
                self.apply(command);
            }

            if self.cancel.is_cancelled() {
                break;
            }

            let Some(reader) = self.reader.as_mut() else {
                // Idle: park until a command arrives or we shut down.
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    command = self.commands.recv() => match command {
                        Some(command) => {
                            self.apply(command);
                            continue;
                        }
                        None => {
                            debug!("Command channel closed, shutting down");
                            break;
                        }
                    },
                }
            };

            let frame = match reader.next_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    // A stream that decoded cleanly at open time went bad
                    // mid-file. Drop it; the session keeps running.
                    error!("Decode error mid-stream, closing source: {e}");
                    self.reader = None;
                    continue;
                }
            };

            self.stats.frame_index = frame.header.frame_index;
            self.stats.frame_count = frame.header.frame_count;
            // Publish the position before playing: a long frame must not
            // hide which frame is on the projector.
            self.publish_stats();

            let points = simplify(&frame.points);
            if !points.is_empty() {
                self.play_frame(&frame.header, &points).await;
                self.sink.clear();
            }
            self.window_frames += 1;

            self.close_window_if_due();
            self.publish_stats();

            // Keep the scheduler breathing between frames; the preview
            // pacing loop blocks this thread while it spins.
            tokio::task::yield_now().await;
        }

        info!("Playback worker ended");
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Open(reader) => {
                info!(path = %reader.file_path().display(), "Source swapped");
                self.reader = Some(reader);
                self.reset_window();
                // Clear-after-swap: the preempt flag belongs to this
                // command and dies with it.
                self.preempt.store(false, Ordering::Release);
            }
            Command::Close => {
                info!("Source closed");
                self.reader = None;
                self.stats = PlaybackStats {
                    current_rate: self.controller.current_rate(),
                    ..Default::default()
                };
                self.publish_stats();
                self.preempt.store(false, Ordering::Release);
            }
            Command::SetTargetRate(rate) => {
                let rate = PlaybackConfig::clamp_rate(rate);
                debug!(rate, "Target rate set");
                self.config.target_rate = rate;
                self.controller.set_target(rate);
            }
            Command::SetScale(scale) => {
                let scale = PlaybackConfig::clamp_scale(scale);
                debug!(scale, "Scale set");
                self.config.scale = scale;
            }
            Command::SetTransmit(transmit) => {
                debug!(transmit, "Transmit mode set");
                self.config.transmit = transmit;
                // Hardware acknowledgments pace transmit mode, so the
                // timer-oriented controller restarts from the target when
                // the regime changes.
                self.controller.reset();
                self.fallback_warned = false;
                if let Some(transport) = &self.transport {
                    // Response echo is off while transmitting by policy.
                    transport.set_echo(!transmit);
                }
            }
        }
    }

    /// Emit one simplified frame to the active sink.
    async fn play_frame(&mut self, header: &FrameHeader, points: &[Point]) {
        let transmitting = self.effective_transmit();
        self.stats.transmitting = transmitting;

        trace!(
            frame = header.frame_index,
            points = points.len(),
            transmitting,
            "Playing frame"
        );

        match self.transport.clone() {
            Some(transport) if transmitting => self.transmit_frame(&*transport, points).await,
            _ => self.preview_frame(points),
        }
    }

    /// Transmit requested and a live transport present? Otherwise fall back
    /// to preview for this frame and resume automatically when the link
    /// returns.
    fn effective_transmit(&mut self) -> bool {
        if !self.config.transmit {
            return false;
        }
        let connected = self.transport.as_ref().is_some_and(|t| t.is_connected());
        if !connected && !self.fallback_warned {
            warn!("Transmit requested but no transport connected; falling back to preview");
            self.fallback_warned = true;
        }
        if connected && self.fallback_warned {
            info!("Transport available again, resuming transmit");
            self.fallback_warned = false;
        }
        connected
    }

    /// Preview mode: plot lit points immediately; pace every point with a
    /// spin-wait so the whole frame completes in `1/current_rate` seconds
    /// regardless of point count.
    fn preview_frame(&mut self, points: &[Point]) {
        let rate = self.controller.current_rate();
        let delay = Duration::from_secs_f64(1.0 / (rate * points.len() as f64));
        let size = self.sink.size();

        for point in points {
            if point.lit {
                let (x, y) = to_pixel(point.x, point.y, self.config.scale, size);
                self.sink.plot(x, y);
            }

            // Spin, not sleep: sub-millisecond pacing precision. The flag
            // is polled inside the spin, so preemption lands within one
            // point's processing time.
            if spin_wait(delay, &self.preempt) {
                trace!("Frame preempted mid-preview");
                return;
            }
            self.window_points += 1;
        }
    }

    /// Transmit mode: each command is gated on the previous acknowledgment;
    /// the hardware is the pacing. A timed-out wait proceeds rather than
    /// deadlocking on a silent device.
    async fn transmit_frame(&mut self, transport: &dyn Transport, points: &[Point]) {
        let mut previous: Option<Point> = None;

        for point in points {
            if self.preempt.load(Ordering::Acquire) {
                trace!("Frame preempted mid-transmit");
                return;
            }

            // An identical consecutive point moves nothing; skip the
            // round-trip.
            if previous == Some(*point) {
                continue;
            }

            if transport.laser_on() != Some(point.lit) {
                let command = if point.lit { "laser on" } else { "laser off" };
                self.send_acknowledged(transport, command).await;
                transport.set_laser_on(point.lit);
            }

            let nx = to_normalized(point.x, self.config.scale);
            let ny = to_normalized(point.y, self.config.scale);
            self.send_acknowledged(transport, &format!("move {nx} {ny}")).await;

            self.window_points += 1;
            previous = Some(*point);
        }
    }

    async fn send_acknowledged(&self, transport: &dyn Transport, command: &str) {
        if let Err(e) = transport.send(command).await {
            warn!("Transport send failed: {e}");
            return;
        }
        if !transport.await_ready(self.ack_timeout).await {
            // Non-fatal: a stalled handshake must not freeze the session.
            warn!(
                timeout = ?self.ack_timeout,
                command, "Transport acknowledgment timed out, proceeding"
            );
        }
    }

    /// Close the measurement window once a full second has elapsed: compute
    /// fps/pps, feed the controller, reset the accumulators.
    fn close_window_if_due(&mut self) {
        let elapsed = self.window_start.elapsed();
        if elapsed < MEASUREMENT_WINDOW {
            return;
        }

        let secs = elapsed.as_secs_f64();
        self.stats.fps = self.window_frames as f64 / secs;
        self.stats.pps = self.window_points as f64 / secs;

        debug!(fps = self.stats.fps, pps = self.stats.pps, "Measurement window closed");

        // current_rate only drives preview pacing; in transmit mode the
        // acknowledgments set the pace and the controller holds.
        if !self.stats.transmitting {
            self.controller.observe(self.stats.fps);
        }
        self.stats.current_rate = self.controller.current_rate();

        self.window_start = Instant::now();
        self.window_frames = 0;
        self.window_points = 0;
    }

    fn reset_window(&mut self) {
        self.window_start = Instant::now();
        self.window_frames = 0;
        self.window_points = 0;
    }

    fn publish_stats(&self) {
        // One whole snapshot per send; readers never see half-updated
        // counters.
        self.stats_tx.send_replace(self.stats);
    }
}

/// Busy-wait for `delay`, polling the preemption flag. Returns true if the
/// flag was observed set.
fn spin_wait(delay: Duration, preempt: &AtomicBool) -> bool {
    let deadline = Instant::now() + delay;
    while Instant::now() < deadline {
        if preempt.load(Ordering::Acquire) {
            return true;
        }
        std::hint::spin_loop();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{CaptureSink, MockTransport, frame_section, terminator_section};
    use crate::transport::LinkState;
    use std::time::Duration;

    fn small_show() -> IldaReader {
        let mut data = frame_section(
            1,
            &[Point::new(0, 0, true), Point::new(1000, 9000, true), Point::new(2000, 0, false)],
            1,
            1,
        );
        data.extend(terminator_section(1));
        IldaReader::from_bytes(data).expect("valid show")
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within 5s");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn preview_plots_lit_points_and_loops() {
        crate::test_utils::init_tracing();
        let sink = Arc::new(CaptureSink::new(600));
        let handles = Engine::spawn(sink.clone(), None, Duration::from_millis(20));

        handles.commands.send(Command::SetTargetRate(200.0)).unwrap();
        handles.preempt.store(true, Ordering::Release);
        handles.commands.send(Command::Open(small_show())).unwrap();

        // Two lit points per frame; the show loops, so plots keep growing.
        wait_for(|| sink.plots().len() >= 6).await;
        assert!(sink.clears() >= 2, "sink cleared after each frame");

        // Blanked point never plotted: all plots map from the two lit ones.
        let unique: std::collections::HashSet<_> = sink.plots().into_iter().collect();
        assert_eq!(unique.len(), 2);

        handles.cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn transmit_orders_laser_and_move_commands() {
        let link = Arc::new(LinkState::new());
        link.connected();
        let transport = Arc::new(MockTransport::auto_ack(Arc::clone(&link)));
        crate::test_utils::init_tracing();
        let sink = Arc::new(CaptureSink::new(600));

        let handles =
            Engine::spawn(sink, Some(transport.clone()), Duration::from_millis(100));
        handles.commands.send(Command::SetTransmit(true)).unwrap();
        handles.preempt.store(true, Ordering::Release);
        handles.commands.send(Command::Open(small_show())).unwrap();

        wait_for(|| transport.sent().len() >= 5).await;
        handles.cancel.cancel();

        let sent = transport.sent();
        // First point is lit with laser state unknown: laser command first,
        // then the move; the blanked third point flips it off again.
        assert_eq!(sent[0], "laser on");
        assert!(sent[1].starts_with("move "), "got {:?}", sent[1]);
        assert!(sent.iter().any(|c| c == "laser off"));
        // Every move is preceded by an acknowledged state; order within the
        // frame is file order.
        let moves: Vec<_> = sent.iter().filter(|c| c.starts_with("move ")).collect();
        assert!(moves.len() >= 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn transmit_timeout_does_not_hang_playback() {
        let link = Arc::new(LinkState::new());
        link.connected();
        // Never acknowledges: every send must still return within the
        // configured timeout.
        let transport = Arc::new(MockTransport::silent(Arc::clone(&link)));
        crate::test_utils::init_tracing();
        let sink = Arc::new(CaptureSink::new(600));

        let handles = Engine::spawn(sink, Some(transport.clone()), Duration::from_millis(10));
        handles.commands.send(Command::SetTransmit(true)).unwrap();
        handles.commands.send(Command::Open(small_show())).unwrap();

        wait_for(|| transport.sent().len() >= 4).await;
        handles.cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn transmit_without_transport_falls_back_to_preview() {
        crate::test_utils::init_tracing();
        let sink = Arc::new(CaptureSink::new(600));
        let handles = Engine::spawn(sink.clone(), None, Duration::from_millis(20));

        handles.commands.send(Command::SetTransmit(true)).unwrap();
        handles.commands.send(Command::SetTargetRate(200.0)).unwrap();
        handles.commands.send(Command::Open(small_show())).unwrap();

        // Points land on the local sink despite transmit being requested.
        wait_for(|| !sink.plots().is_empty()).await;
        assert!(!handles.stats.borrow().transmitting);

        handles.cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn disconnected_transport_falls_back_and_recovers() {
        let link = Arc::new(LinkState::new());
        let transport = Arc::new(MockTransport::auto_ack(Arc::clone(&link)));
        crate::test_utils::init_tracing();
        let sink = Arc::new(CaptureSink::new(600));

        let handles =
            Engine::spawn(sink.clone(), Some(transport.clone()), Duration::from_millis(100));
        handles.commands.send(Command::SetTransmit(true)).unwrap();
        handles.commands.send(Command::SetTargetRate(200.0)).unwrap();
        handles.commands.send(Command::Open(small_show())).unwrap();

        // Link down: preview fallback.
        wait_for(|| !sink.plots().is_empty()).await;
        assert!(transport.sent().is_empty());

        // Link up: transmit resumes without intervention.
        link.connected();
        wait_for(|| !transport.sent().is_empty()).await;

        handles.cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn close_stops_emission_within_one_point() {
        crate::test_utils::init_tracing();
        let sink = Arc::new(CaptureSink::new(600));
        let handles = Engine::spawn(sink.clone(), None, Duration::from_millis(20));

        // A slow frame: 1 fps over many points keeps the worker mid-frame
        // long enough to preempt it.
        let points: Vec<Point> = (0i16..1000).map(|i| Point::new(i, i, true)).collect();
        let mut data = frame_section(1, &points, 1, 1);
        data.extend(terminator_section(1));
        let reader = IldaReader::from_bytes(data).expect("valid show");

        handles.commands.send(Command::SetTargetRate(1.0)).unwrap();
        handles.commands.send(Command::Open(reader)).unwrap();
        wait_for(|| !sink.plots().is_empty()).await;

        // Preempt-then-enqueue, the caller-side ordering for close.
        handles.preempt.store(true, Ordering::Release);
        handles.commands.send(Command::Close).unwrap();

        wait_for(|| handles.stats.borrow().frame_count == 0).await;
        let after_close = sink.plots().len();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            sink.plots().len(),
            after_close,
            "no point from the superseded frame may be emitted after close"
        );

        handles.cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn preempt_flag_outlives_boundaries_until_its_command_arrives() {
        crate::test_utils::init_tracing();
        let sink = Arc::new(CaptureSink::new(600));
        let handles = Engine::spawn(sink.clone(), None, Duration::from_millis(20));

        handles.commands.send(Command::SetTargetRate(200.0)).unwrap();
        handles.commands.send(Command::Open(small_show())).unwrap();
        wait_for(|| !sink.plots().is_empty()).await;

        // A caller stores the flag before its command reaches the queue.
        // The worker crosses many frame boundaries in this window and must
        // not clear the flag at any of them.
        handles.preempt.store(true, Ordering::Release);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(
            handles.preempt.load(Ordering::Acquire),
            "flag cleared without a command to carry it"
        );

        // Once the command lands, applying it clears the flag.
        handles.commands.send(Command::Open(small_show())).unwrap();
        wait_for(|| !handles.preempt.load(Ordering::Acquire)).await;

        handles.cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn open_swaps_source_within_one_frame() {
        crate::test_utils::init_tracing();
        let sink = Arc::new(CaptureSink::new(600));
        let handles = Engine::spawn(sink.clone(), None, Duration::from_millis(20));

        let slow_points: Vec<Point> = (0i16..1000).map(|i| Point::new(-i, i, true)).collect();
        let mut slow = frame_section(1, &slow_points, 1, 9);
        slow.extend(terminator_section(1));

        handles.commands.send(Command::SetTargetRate(1.0)).unwrap();
        handles
            .commands
            .send(Command::Open(IldaReader::from_bytes(slow).expect("valid show")))
            .unwrap();
        wait_for(|| handles.stats.borrow().frame_count == 9).await;

        handles.preempt.store(true, Ordering::Release);
        handles.commands.send(Command::Open(small_show())).unwrap();

        // The replacement (frame_count = 1) must be playing within a frame.
        wait_for(|| handles.stats.borrow().frame_count == 1).await;

        handles.cancel.cancel();
    }
}
