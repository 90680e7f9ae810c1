//! Operator-facing playback configuration and throughput metrics.

use serde::{Deserialize, Serialize};

/// Hard upper clamp for the pacing rate, in frames per second.
pub const MAX_RATE: f64 = 1000.0;

/// Lower clamp for the pacing rate.
pub const MIN_RATE: f64 = 1.0;

/// Playback configuration consumed by the engine.
///
/// All fields are settable at runtime and take effect on the next frame
/// boundary, never mid-frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Frames per second requested by the operator, clamped to [`MIN_RATE`],
    /// [`MAX_RATE`].
    pub target_rate: f64,

    /// Output scale in (0, 1], clamped to [0.01, 1.0].
    pub scale: f64,

    /// Transmit mode: stream points over the transport instead of timing the
    /// preview sink.
    pub transmit: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { target_rate: 30.0, scale: 1.0, transmit: false }
    }
}

impl PlaybackConfig {
    /// Clamp a requested target rate into the supported range.
    pub fn clamp_rate(rate: f64) -> f64 {
        rate.clamp(MIN_RATE, MAX_RATE)
    }

    /// Clamp a requested scale into the supported range.
    pub fn clamp_scale(scale: f64) -> f64 {
        scale.clamp(0.01, 1.0)
    }
}

/// Consistent snapshot of playback throughput, published once per
/// measurement window.
///
/// The frame/point accumulators behind `fps`/`pps` are owned solely by the
/// playback worker; readers only ever see a whole snapshot, never
/// partially-updated counters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlaybackStats {
    /// Frames emitted per second over the last window.
    pub fps: f64,

    /// Points emitted per second over the last window.
    pub pps: f64,

    /// Index of the frame being played, from the file header (1-based).
    pub frame_index: u16,

    /// Total frames the file declares.
    pub frame_count: u16,

    /// Pacing rate currently being attempted by the controller.
    pub current_rate: f64,

    /// Whether points were actually going to the transport during this
    /// window. False in preview mode and while transmit has fallen back
    /// because the transport is unavailable.
    pub transmitting: bool,
}
