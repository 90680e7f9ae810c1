//! Frame and point value types.

/// A single galvanometer sample.
///
/// Coordinates are in the device's native signed 16-bit range. `lit` is true
/// when the laser fires at this coordinate and false for a blanked
/// (travel-only) point. Immutable once decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i16,
    pub y: i16,
    pub lit: bool,
}

impl Point {
    pub fn new(x: i16, y: i16, lit: bool) -> Self {
        Self { x, y, lit }
    }
}

/// Header of one ILDA frame, read from a fixed-offset 32-byte block.
///
/// `record_count == 0` marks end-of-stream and triggers a restart from the
/// top of the buffer; the show is inherently cyclic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Format code (0, 1, 4, 5 carry points; 2 is a palette block).
    pub format: u8,
    /// Number of records following the header.
    pub record_count: u16,
    /// Index of this frame within the show.
    pub frame_index: u16,
    /// Total number of frames the file declares.
    pub frame_count: u16,
}

/// One decoded frame: header plus points in drawing order.
///
/// Point order is load-bearing; reordering changes the traced figure. Frames
/// are ephemeral: produced by the reader, consumed within the same playback
/// iteration, never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub points: Vec<Point>,
}

impl Frame {
    /// Whether this frame contributes nothing to the display (e.g. a palette
    /// block, which is consumed but yields no points).
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
