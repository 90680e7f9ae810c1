//! Local display sink seam and device-to-pixel mapping.

/// Minimal drawing surface for preview playback.
///
/// The engine only needs a square canvas it can plot lit points on and
/// clear between frames; widget layout and rendering live outside this
/// crate.
pub trait DisplaySink: Send + Sync + 'static {
    /// Plot one lit point at pixel coordinates.
    fn plot(&self, x: u32, y: u32);

    /// Clear the surface. Called after each completed frame.
    fn clear(&self);

    /// Canvas edge length in pixels.
    fn size(&self) -> u32;
}

/// Map a device coordinate pair to sink pixels.
///
/// `x` maps directly, `y` is flipped so positive device y points up on a
/// top-left-origin canvas:
///
/// ```text
/// x_px = round((x*scale + 32768) / 65535 * size)
/// y_px = round((32767 - y*scale) / 65535 * size)
/// ```
pub fn to_pixel(x: i16, y: i16, scale: f64, size: u32) -> (u32, u32) {
    let size = f64::from(size);
    let px = (f64::from(x) * scale + 32768.0) / 65535.0 * size;
    let py = (32767.0 - f64::from(y) * scale) / 65535.0 * size;
    (px.round().max(0.0) as u32, py.round().max(0.0) as u32)
}

/// Map a device coordinate to the transport's normalized symmetric range.
///
/// Produces a value in roughly `[-scale, scale]`; the hardware expects the
/// same normalization on both axes (no flip - the projector's coordinate
/// system already matches the device's).
pub fn to_normalized(coord: i16, scale: f64) -> f64 {
    ((f64::from(coord) + 32768.0) / 65535.0 * 2.0 - 1.0) * scale
}
