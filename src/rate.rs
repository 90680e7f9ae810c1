//! Adaptive pacing rate control.
//!
//! A bang-bang/proportional hybrid: after each measurement window the
//! achieved frame rate is compared to the operator's target and the pacing
//! rate is nudged multiplicatively toward whatever value makes actual
//! throughput match. This compensates for per-frame point-count variance
//! and transport latency the engine cannot predict analytically.
//!
//! The first window after any rate change only marks the rate as settled
//! and takes no corrective action, so transient startup noise never feeds
//! back into the controller.

use crate::types::{MAX_RATE, MIN_RATE, PlaybackConfig};
use tracing::debug;

/// Closed-loop controller converging the attempted pacing rate onto the
/// operator's target frame rate.
#[derive(Debug, Clone)]
pub struct RateController {
    target: f64,
    current: f64,
    settled: bool,
}

impl RateController {
    /// Create a controller attempting `target` frames per second.
    pub fn new(target: f64) -> Self {
        let target = PlaybackConfig::clamp_rate(target);
        Self { target, current: target, settled: false }
    }

    /// Rate the controller is currently attempting.
    pub fn current_rate(&self) -> f64 {
        self.current
    }

    /// Operator's requested rate.
    pub fn target_rate(&self) -> f64 {
        self.target
    }

    /// Whether the current rate has completed a full measurement window
    /// since the last change.
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Change the operator target. The attempted rate restarts at the new
    /// target and must settle again before corrections resume.
    pub fn set_target(&mut self, target: f64) {
        self.target = PlaybackConfig::clamp_rate(target);
        self.current = self.target;
        self.settled = false;
    }

    /// Reset to the target rate without changing it, e.g. when the pacing
    /// regime switches between timer and acknowledgment.
    pub fn reset(&mut self) {
        self.current = self.target;
        self.settled = false;
    }

    /// Feed one measurement window's achieved frame rate.
    ///
    /// Returns the new attempted rate if a correction was applied. The
    /// first observation after any change only settles the rate.
    pub fn observe(&mut self, fps: f64) -> Option<f64> {
        if !self.settled {
            self.settled = true;
            debug!(fps, current = self.current, "Rate settled, holding for one window");
            return None;
        }

        let factor = if fps < self.target * 0.95 {
            // Increasing is only allowed below the hard clamp.
            if self.current >= MAX_RATE {
                return None;
            }
            if fps < self.target * 0.8 { 1.5 } else { 1.1 }
        } else if fps > self.target * 1.05 {
            if fps > self.target * 1.2 { 0.67 } else { 0.91 }
        } else {
            // Within +/-5% of target: leave it alone.
            return None;
        };

        self.current = (self.current * factor).clamp(MIN_RATE, MAX_RATE);
        self.settled = false;
        debug!(
            fps,
            target = self.target,
            factor,
            current = self.current,
            "Adjusted pacing rate"
        );
        Some(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_only_settles() {
        let mut ctl = RateController::new(30.0);
        assert!(!ctl.is_settled());
        assert_eq!(ctl.observe(15.0), None);
        assert!(ctl.is_settled());
        assert_eq!(ctl.current_rate(), 30.0);
    }

    #[test]
    fn far_below_target_multiplies_by_one_point_five() {
        let mut ctl = RateController::new(30.0);
        ctl.observe(15.0); // settle
        // 15 fps is 50% of target, below the 80% knee: aggressive step.
        let adjusted = ctl.observe(15.0).expect("correction applied");
        assert!((adjusted - 45.0).abs() < 1e-9);
        assert!(!ctl.is_settled());
    }

    #[test]
    fn slightly_below_target_multiplies_by_one_point_one() {
        let mut ctl = RateController::new(30.0);
        ctl.observe(27.0); // settle
        // 27 fps is 90% of target: between the 80% and 95% knees.
        let adjusted = ctl.observe(27.0).expect("correction applied");
        assert!((adjusted - 33.0).abs() < 1e-9);
    }

    #[test]
    fn far_above_target_backs_off_hard() {
        let mut ctl = RateController::new(30.0);
        ctl.observe(40.0); // settle
        let adjusted = ctl.observe(40.0).expect("correction applied");
        assert!((adjusted - 30.0 * 0.67).abs() < 1e-9);
    }

    #[test]
    fn slightly_above_target_backs_off_gently() {
        let mut ctl = RateController::new(30.0);
        ctl.observe(33.0); // settle
        // 33 fps is 110% of target: between the 105% and 120% knees.
        let adjusted = ctl.observe(33.0).expect("correction applied");
        assert!((adjusted - 30.0 * 0.91).abs() < 1e-9);
    }

    #[test]
    fn within_five_percent_no_change() {
        let mut ctl = RateController::new(30.0);
        ctl.observe(30.0); // settle
        assert_eq!(ctl.observe(29.0), None);
        assert_eq!(ctl.observe(31.0), None);
        assert!(ctl.is_settled());
        assert_eq!(ctl.current_rate(), 30.0);
    }

    #[test]
    fn adjustment_requires_resettling() {
        let mut ctl = RateController::new(30.0);
        ctl.observe(15.0); // settle
        ctl.observe(15.0).expect("correction");
        // Next window only settles again, even though fps is still low.
        assert_eq!(ctl.observe(15.0), None);
        ctl.observe(15.0).expect("second correction");
    }

    #[test]
    fn increase_stops_at_the_hard_clamp() {
        let mut ctl = RateController::new(MAX_RATE);
        ctl.observe(10.0); // settle
        let mut last = ctl.current_rate();
        for _ in 0..40 {
            if let Some(rate) = ctl.observe(10.0) {
                last = rate;
            }
        }
        assert!(last <= MAX_RATE);
        assert_eq!(ctl.current_rate(), MAX_RATE);
        // Once pinned at the clamp, no further increase is attempted.
        ctl.observe(10.0);
        assert_eq!(ctl.observe(10.0), None);
    }

    #[test]
    fn decrease_never_goes_below_minimum() {
        let mut ctl = RateController::new(MIN_RATE);
        ctl.observe(500.0);
        for _ in 0..40 {
            ctl.observe(500.0);
        }
        assert!(ctl.current_rate() >= MIN_RATE);
    }

    #[test]
    fn set_target_clamps_and_unsettles() {
        let mut ctl = RateController::new(30.0);
        ctl.observe(30.0); // settle
        ctl.set_target(5000.0);
        assert_eq!(ctl.target_rate(), MAX_RATE);
        assert_eq!(ctl.current_rate(), MAX_RATE);
        assert!(!ctl.is_settled());
    }

    #[test]
    fn reset_restores_target_rate() {
        let mut ctl = RateController::new(30.0);
        ctl.observe(15.0);
        ctl.observe(15.0).expect("wound up");
        assert!(ctl.current_rate() > 30.0);
        ctl.reset();
        assert_eq!(ctl.current_rate(), 30.0);
        assert!(!ctl.is_settled());
    }
}
