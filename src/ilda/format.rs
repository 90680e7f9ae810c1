//! ILDA container binary layout and record decoding.
//!
//! ILDA files are a sequence of sections, each a fixed 32-byte header
//! followed by `record_count` fixed-size records:
//!
//! 1. **Header** (32 bytes) - format code plus big-endian frame metadata
//! 2. **Records** - point samples (formats 0, 1, 4, 5) or palette entries
//!    (format 2, consumed but never rendered)
//!
//! A header with `record_count == 0` marks end-of-stream; the reader treats
//! it as a restart trigger, never as termination.

use crate::types::{FrameHeader, Point};
use crate::{PlayerError, Result};

/// Size of an ILDA section header in bytes.
pub const HEADER_SIZE: usize = 32;

/// Byte offset of the format code within the header.
const FORMAT_OFFSET: usize = 7;

/// Byte offset of the big-endian record count within the header.
const RECORD_COUNT_OFFSET: usize = 24;

/// Byte offset of the big-endian frame index within the header.
const FRAME_INDEX_OFFSET: usize = 26;

/// Byte offset of the big-endian frame total within the header.
const FRAME_COUNT_OFFSET: usize = 28;

/// Format code of palette sections, which carry no point data.
pub const PALETTE_FORMAT: u8 = 2;

/// Bit of the record status byte that marks a blanked point.
const BLANKING_BIT: u8 = 0x40;

/// Record size in bytes for a given format code.
///
/// Returns `None` for format codes this crate does not recognize.
pub fn record_size(format: u8) -> Option<usize> {
    match format {
        0 => Some(8),  // 3D coordinates, indexed color
        1 => Some(6),  // 2D coordinates, indexed color
        2 => Some(3),  // palette entry (skipped, not decoded into points)
        4 => Some(10), // 3D coordinates, true color
        5 => Some(8),  // 2D coordinates, true color
        _ => None,
    }
}

impl FrameHeader {
    /// Parse a frame header from the start of `data`.
    ///
    /// `data` is the remaining buffer at the read cursor; it must hold at
    /// least [`HEADER_SIZE`] bytes. Unknown format codes are a decode error
    /// so a corrupt file cannot silently desynchronize the cursor.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(PlayerError::decode(
                "frame header",
                format!("need {} bytes, have {}", HEADER_SIZE, data.len()),
            ));
        }

        let format = data[FORMAT_OFFSET];
        if record_size(format).is_none() {
            return Err(PlayerError::decode(
                "frame header",
                format!("unrecognized format code {format}"),
            ));
        }

        Ok(Self {
            format,
            record_count: parse_u16_be(data, RECORD_COUNT_OFFSET)?,
            frame_index: parse_u16_be(data, FRAME_INDEX_OFFSET)?,
            frame_count: parse_u16_be(data, FRAME_COUNT_OFFSET)?,
        })
    }

    /// Size in bytes of one record in this frame.
    pub fn record_size(&self) -> usize {
        // Format was validated in parse().
        record_size(self.format).unwrap_or(0)
    }

    /// Whether this section is a palette block (consumed, no points).
    pub fn is_palette(&self) -> bool {
        self.format == PALETTE_FORMAT
    }
}

/// Decode one point record of the given format.
///
/// x and y are signed big-endian 16-bit values at record offsets 0 and 2.
/// The blanking flag is bit 6 of the status byte: second-to-last byte for
/// the short formats (0, 1), fourth-from-last for the formats carrying an
/// extra color field (4, 5). A point is lit when the blanking bit is clear.
pub fn decode_point(record: &[u8], format: u8) -> Result<Point> {
    let size = record_size(format).ok_or_else(|| {
        PlayerError::decode("point record", format!("unrecognized format code {format}"))
    })?;
    if record.len() < size {
        return Err(PlayerError::decode(
            "point record",
            format!("format {format} record needs {size} bytes, have {}", record.len()),
        ));
    }

    let x = parse_i16_be(record, 0)?;
    let y = parse_i16_be(record, 2)?;

    let status = match format {
        0 | 1 => record[size - 2],
        4 | 5 => record[size - 4],
        _ => {
            return Err(PlayerError::decode(
                "point record",
                format!("format {format} carries no point data"),
            ));
        }
    };

    Ok(Point { x, y, lit: status & BLANKING_BIT == 0 })
}

/// Safe byte parsing helpers with bounds checking
fn parse_u16_be(data: &[u8], offset: usize) -> Result<u16> {
    if offset + 2 > data.len() {
        return Err(PlayerError::decode(
            "integer parsing",
            format!(
                "insufficient data for u16 at offset {} (need 2 bytes, have {})",
                offset,
                data.len().saturating_sub(offset)
            ),
        ));
    }
    Ok(u16::from_be_bytes([data[offset], data[offset + 1]]))
}

fn parse_i16_be(data: &[u8], offset: usize) -> Result<i16> {
    if offset + 2 > data.len() {
        return Err(PlayerError::decode(
            "integer parsing",
            format!(
                "insufficient data for i16 at offset {} (need 2 bytes, have {})",
                offset,
                data.len().saturating_sub(offset)
            ),
        ));
    }
    Ok(i16::from_be_bytes([data[offset], data[offset + 1]]))
}
