//! ILDA container decoding: binary layout and the looping frame reader.

pub mod format;
mod reader;

pub use format::{HEADER_SIZE, PALETTE_FORMAT, decode_point, record_size};
pub use reader::IldaReader;
