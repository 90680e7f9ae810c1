//! Shared fixtures for unit tests: ILDA byte builders, a scripted
//! transport and a capturing sink.

use crate::Result;
use crate::ilda::format::{HEADER_SIZE, PALETTE_FORMAT, record_size};
use crate::sink::DisplaySink;
use crate::transport::{LinkState, Transport};
use crate::types::Point;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Install a log subscriber honoring `RUST_LOG`, once per process. Later
/// calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a 32-byte ILDA section header with the documented field layout.
pub fn header_bytes(format: u8, record_count: u16, frame_index: u16, frame_count: u16) -> Vec<u8> {
    let mut header = vec![0u8; HEADER_SIZE];
    header[0..4].copy_from_slice(b"ILDA");
    header[7] = format;
    header[24..26].copy_from_slice(&record_count.to_be_bytes());
    header[26..28].copy_from_slice(&frame_index.to_be_bytes());
    header[28..30].copy_from_slice(&frame_count.to_be_bytes());
    header
}

/// Encode one point record in the given format's layout.
pub fn encode_point(point: Point, format: u8) -> Vec<u8> {
    let size = record_size(format).expect("point format");
    let mut record = vec![0u8; size];
    record[0..2].copy_from_slice(&point.x.to_be_bytes());
    record[2..4].copy_from_slice(&point.y.to_be_bytes());

    let status_offset = match format {
        0 | 1 => size - 2,
        4 | 5 => size - 4,
        _ => panic!("format {format} carries no point records"),
    };
    if !point.lit {
        record[status_offset] |= 0x40;
    }
    record
}

/// One complete frame section: header plus encoded point records.
pub fn frame_section(format: u8, points: &[Point], frame_index: u16, frame_count: u16) -> Vec<u8> {
    let mut data = header_bytes(format, points.len() as u16, frame_index, frame_count);
    for point in points {
        data.extend(encode_point(*point, format));
    }
    data
}

/// A palette section: header plus `record_count` 3-byte color entries.
pub fn palette_section(record_count: u16, frame_index: u16, frame_count: u16) -> Vec<u8> {
    let mut data = header_bytes(PALETTE_FORMAT, record_count, frame_index, frame_count);
    data.extend(vec![0u8; record_count as usize * 3]);
    data
}

/// An end-of-stream marker: a header with `record_count == 0`.
pub fn terminator_section(format: u8) -> Vec<u8> {
    header_bytes(format, 0, 0, 0)
}

/// Transport double backed by a real [`LinkState`]. Records every command
/// and either acknowledges immediately or stays silent.
pub struct MockTransport {
    link: Arc<LinkState>,
    sent: Mutex<Vec<String>>,
    auto_ack: bool,
}

impl MockTransport {
    /// A device that acknowledges every command as soon as it arrives.
    pub fn auto_ack(link: Arc<LinkState>) -> Self {
        Self { link, sent: Mutex::new(Vec::new()), auto_ack: true }
    }

    /// A device that never acknowledges anything.
    pub fn silent(link: Arc<LinkState>) -> Self {
        Self { link, sent: Mutex::new(Vec::new()), auto_ack: false }
    }

    /// Commands sent so far, in order.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send(&self, command: &str) -> Result<()> {
        self.sent.lock().expect("sent lock").push(command.to_owned());
        self.link.mark_busy();
        if self.auto_ack {
            self.link.acknowledge();
        }
        Ok(())
    }

    async fn await_ready(&self, timeout: Duration) -> bool {
        self.link.await_ready(timeout).await
    }

    fn laser_on(&self) -> Option<bool> {
        self.link.laser_on()
    }

    fn set_laser_on(&self, on: bool) {
        self.link.set_laser_on(on);
    }

    fn is_connected(&self) -> bool {
        self.link.is_connected()
    }
}

/// Sink double recording plotted pixels and clear calls.
pub struct CaptureSink {
    size: u32,
    plots: Mutex<Vec<(u32, u32)>>,
    clears: AtomicUsize,
}

impl CaptureSink {
    pub fn new(size: u32) -> Self {
        Self { size, plots: Mutex::new(Vec::new()), clears: AtomicUsize::new(0) }
    }

    /// All plotted pixels, in emission order.
    pub fn plots(&self) -> Vec<(u32, u32)> {
        self.plots.lock().expect("plots lock").clone()
    }

    /// Number of times the surface was cleared.
    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::Acquire)
    }
}

impl DisplaySink for CaptureSink {
    fn plot(&self, x: u32, y: u32) {
        self.plots.lock().expect("plots lock").push((x, y));
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::Release);
    }

    fn size(&self) -> u32 {
        self.size
    }
}
