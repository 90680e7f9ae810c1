//! ILDA file reader producing a lazy, infinitely looping frame sequence.
//!
//! The reader owns the whole file buffer plus a byte cursor; `next_frame()`
//! advances the cursor and returns one decoded frame. When it hits the
//! end-of-stream marker (`record_count == 0`) the cursor resets to offset 0
//! and decoding resumes from the top - the show is cyclic and the sequence
//! never terminates on its own. The consumer is the one that stops pulling.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use beamline::ilda::IldaReader;
//!
//! fn trace_show() -> beamline::Result<()> {
//!     let mut reader = IldaReader::open("show.ild")?;
//!     for _ in 0..100 {
//!         let frame = reader.next_frame()?;
//!         println!("frame {}/{}: {} points",
//!             frame.header.frame_index,
//!             frame.header.frame_count,
//!             frame.points.len());
//!     }
//!     Ok(())
//! }
//! ```

use super::format::{self, HEADER_SIZE};
use crate::types::{Frame, FrameHeader, Point};
use crate::{PlayerError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

/// Cursor-owning reader over an in-memory ILDA buffer.
///
/// The buffer is read fully into memory up front; headers must be
/// re-locatable at offset 0 for looping, so no streaming disk read is
/// useful. The reader owns no more than the current cursor; frames are not
/// retained after being handed downstream.
pub struct IldaReader {
    data: Vec<u8>,
    cursor: usize,
    path: PathBuf,
    frames_emitted: u64,
}

impl std::fmt::Debug for IldaReader {
    // The buffer itself is omitted; whole shows are megabytes.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IldaReader")
            .field("path", &self.path)
            .field("bytes", &self.data.len())
            .field("cursor", &self.cursor)
            .field("frames_emitted", &self.frames_emitted)
            .finish()
    }
}

impl IldaReader {
    /// Open an ILDA file for reading.
    ///
    /// The whole file is loaded into memory and the first header is
    /// validated eagerly, so a malformed file fails here instead of
    /// corrupting an already-running stream.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.extension().is_none_or(|ext| !ext.eq_ignore_ascii_case("ild")) {
            warn!("Opening {} without the .ild suffix", path.display());
        }

        let data = std::fs::read(path)
            .map_err(|e| PlayerError::file_error(path.to_path_buf(), e))?;

        Self::from_bytes_with_path(data, path.to_path_buf())
    }

    /// Create a reader over an in-memory buffer (for testing).
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with_path(data, PathBuf::from("<memory>"))
    }

    fn from_bytes_with_path(data: Vec<u8>, path: PathBuf) -> Result<Self> {
        // Validate the first header eagerly. A buffer whose opening header
        // is already the end-of-stream marker contains no frames at all and
        // would otherwise spin forever on restart.
        let header = FrameHeader::parse(&data)?;
        if header.record_count == 0 {
            return Err(PlayerError::decode(
                "ILDA stream",
                "first header is an end-of-stream marker; file contains no frames",
            ));
        }

        info!(
            path = %path.display(),
            bytes = data.len(),
            frame_count = header.frame_count,
            "Opened ILDA stream"
        );

        Ok(Self { data, cursor: 0, path, frames_emitted: 0 })
    }

    /// Path this reader was opened from.
    pub fn file_path(&self) -> &Path {
        &self.path
    }

    /// Total frames the file's first header declares.
    pub fn declared_frame_count(&self) -> Result<u16> {
        Ok(FrameHeader::parse(&self.data)?.frame_count)
    }

    /// Frames handed out since the reader was created, across loops.
    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    /// Decode the next frame, looping back to offset 0 at end-of-stream.
    ///
    /// Palette sections (format 2) are consumed - the cursor advances past
    /// their records - but yield a frame with zero points; preserving the
    /// cursor walk matters even though nothing is rendered.
    pub fn next_frame(&mut self) -> Result<Frame> {
        let mut header = self.read_header()?;

        if header.record_count == 0 {
            // End-of-stream marker: restart from the top of the buffer.
            trace!("End-of-stream marker, restarting from offset 0");
            self.cursor = 0;
            header = self.read_header()?;
            if header.record_count == 0 {
                // Loop detection: a restart that lands on another marker can
                // never produce a frame.
                return Err(PlayerError::decode(
                    "ILDA stream",
                    "restart header is an end-of-stream marker; stream yields no frames",
                ));
            }
        }

        let points = self.read_records(&header)?;
        self.frames_emitted += 1;

        trace!(
            frame = header.frame_index,
            of = header.frame_count,
            format = header.format,
            points = points.len(),
            "Decoded frame"
        );

        Ok(Frame { header, points })
    }

    fn read_header(&mut self) -> Result<FrameHeader> {
        let header = FrameHeader::parse(&self.data[self.cursor.min(self.data.len())..])?;
        self.cursor += HEADER_SIZE;
        Ok(header)
    }

    fn read_records(&mut self, header: &FrameHeader) -> Result<Vec<Point>> {
        let count = header.record_count as usize;
        let size = header.record_size();

        let bytes = count.checked_mul(size).ok_or_else(|| {
            PlayerError::decode("record block", "record block size overflowed")
        })?;
        let end = self.cursor.checked_add(bytes).ok_or_else(|| {
            PlayerError::decode("record block", "record block end overflowed")
        })?;
        if end > self.data.len() {
            return Err(PlayerError::decode(
                "record block",
                format!(
                    "header claims {count} records of {size} bytes but only {} bytes remain",
                    self.data.len() - self.cursor
                ),
            ));
        }

        // Palette blocks are consumed without decoding; the cursor still
        // advances by record_count * size.
        if header.is_palette() {
            debug!(records = count, "Skipping palette block");
            self.cursor = end;
            return Ok(Vec::new());
        }

        let mut points = Vec::with_capacity(count);
        for record in self.data[self.cursor..end].chunks_exact(size) {
            points.push(format::decode_point(record, header.format)?);
        }
        self.cursor = end;

        Ok(points)
    }
}
