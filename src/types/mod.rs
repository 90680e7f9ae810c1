//! Core types for ILDA frame data and playback control.
//!
//! - [`Point`] is a single `(x, y, lit)` galvanometer sample
//! - [`Frame`] is an ordered point list traced once per display refresh
//! - [`FrameHeader`] carries the per-frame metadata from the container
//! - [`PlaybackConfig`] / [`PlaybackStats`] are the operator-facing surface

mod config;
mod point;

pub use config::{MAX_RATE, MIN_RATE, PlaybackConfig, PlaybackStats};
pub use point::{Frame, FrameHeader, Point};
