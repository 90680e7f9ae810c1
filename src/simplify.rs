//! Frame simplification: drop redundant points without altering the figure.
//!
//! Two stages run in order, both pure and deterministic:
//!
//! 1. **Run collapse** - adjacent byte-identical unlit points are collapsed
//!    to one, shortening blanked travel runs.
//! 2. **Collinearity reduction** - interior points that sit on the straight
//!    line between their neighbors (within a tolerance band) are dropped,
//!    thinning straight segments while keeping every actual vertex.
//!
//! Removing a point can make its former neighbors collinear (or identical)
//! in turn, so the pair of stages runs until a pass changes nothing. Every
//! pass yields a subsequence, so the loop terminates and the result is a
//! fixed point: simplifying it again returns it unchanged.
//!
//! Neither stage ever removes the first or last point of a frame, nor any
//! point at a lit/blank boundary - those carry the figure's shape and the
//! beam's on/off timing.

use crate::types::Point;

/// Default collinearity tolerance, as a fraction of the full 16-bit
/// coordinate span (65535). The band is independent of any per-frame
/// bounding box, so the filter's aggressiveness does not vary with frame
/// content.
pub const DEFAULT_TOLERANCE: f64 = 0.002;

/// Full signed 16-bit coordinate span.
const COORD_SPAN: f64 = 65535.0;

/// Simplify a frame's point list with the default tolerance.
pub fn simplify(points: &[Point]) -> Vec<Point> {
    simplify_with_tolerance(points, DEFAULT_TOLERANCE)
}

/// Simplify a frame's point list.
///
/// Insertion order is drawing order and is preserved; only points whose
/// removal cannot change the traced figure are dropped. The stages repeat
/// until stable, so the output is idempotent under re-simplification.
pub fn simplify_with_tolerance(points: &[Point], tolerance: f64) -> Vec<Point> {
    let mut current = points.to_vec();
    loop {
        let next = reduce_collinear(&collapse_runs(&current), tolerance);
        if next == current {
            return current;
        }
        // Dropping a point exposes new neighbor triples; go again. Each
        // changing pass is strictly shorter, bounding the loop.
        current = next;
    }
}

/// Stage 1: collapse runs of identical unlit points.
///
/// A point is dropped only when it is byte-identical to its successor and
/// both are unlit; the last point is always kept. Identical lit duplicates
/// are intentional dwell and survive, and every lit/blank transition keeps
/// both of its boundary points.
fn collapse_runs(points: &[Point]) -> Vec<Point> {
    points
        .iter()
        .enumerate()
        .filter(|&(i, p)| {
            i + 1 == points.len() || *p != points[i + 1] || p.lit || points[i + 1].lit
        })
        .map(|(_, p)| *p)
        .collect()
}

/// Stage 2: drop interior points collinear with their neighbors.
///
/// Scans with a 3-point window: the previously kept point, the candidate,
/// and the next point. The candidate survives when the window spans a
/// lit/blank boundary, when the path bends there, or when the vertical-fit
/// degenerate case changes direction.
fn reduce_collinear(points: &[Point], tolerance: f64) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let band = tolerance * COORD_SPAN;
    let mut kept = Vec::with_capacity(points.len());
    kept.push(points[0]);

    for i in 1..points.len() - 1 {
        let prev = kept[kept.len() - 1];
        let cur = points[i];
        let next = points[i + 1];

        // A lit/blank boundary is never collapsed.
        if prev.lit != cur.lit || cur.lit != next.lit {
            kept.push(cur);
            continue;
        }

        if prev.x == cur.x {
            // Vertical fit is degenerate; keep the point iff the direction
            // changes there.
            if cur.x != next.x {
                kept.push(cur);
            }
            continue;
        }

        let m = (f64::from(cur.y) - f64::from(prev.y)) / (f64::from(cur.x) - f64::from(prev.x));
        let b = f64::from(cur.y) - m * f64::from(cur.x);
        let predicted = m * f64::from(next.x) + b;

        // Within the band the three points are collinear and the middle one
        // is redundant; outside it the path bends and the vertex stays.
        if (predicted - f64::from(next.y)).abs() > band {
            kept.push(cur);
        }
    }

    kept.push(points[points.len() - 1]);
    kept
}
