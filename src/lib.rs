//! ILDA laser show playback engine.
//!
//! Decodes the ILDA binary frame format into point sequences, thins them
//! with a geometry-preserving simplifier, and plays them back on a
//! dedicated worker task: either to a local preview sink paced by an
//! adaptive frame-rate controller, or to projector hardware over an
//! acknowledgment-gated transport.
//!
//! The crate is UI- and device-agnostic. A frontend supplies a
//! [`sink::DisplaySink`] for preview rendering and, optionally, a
//! [`transport::Transport`] wrapping the physical link; everything else -
//! file decoding, looping, simplification, pacing, the transmit handshake -
//! lives behind the [`Player`] handle.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use beamline::{Player, sink::DisplaySink};
//! use std::sync::Arc;
//!
//! struct Canvas;
//! impl DisplaySink for Canvas {
//!     fn plot(&self, _x: u32, _y: u32) { /* draw a pixel */ }
//!     fn clear(&self) { /* wipe the surface */ }
//!     fn size(&self) -> u32 { 600 }
//! }
//!
//! # async fn run() -> beamline::Result<()> {
//! let player = Player::new(Arc::new(Canvas), None);
//! player.open("show.ild")?;
//! player.set_scale(0.8)?;
//! # Ok(())
//! # }
//! ```

mod engine;
mod error;
mod player;

pub mod ilda;
pub mod rate;
pub mod simplify;
pub mod sink;
pub mod transport;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use error::{PlayerError, Result};
pub use player::Player;
pub use types::{Frame, FrameHeader, PlaybackConfig, PlaybackStats, Point};
