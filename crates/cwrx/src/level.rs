//! Signal level trackers
//!
//! Both trackers are single-tap exponential filters with
//! *asymmetric* update rates. The [`NoiseFloor`] falls quickly
//! and rises slowly, so it hugs the quietest recent magnitudes.
//! The [`PeakTracker`] does the opposite: it jumps to any new
//! maximum and then relaxes slowly.

/// Smallest noise floor used to form a ratio
///
/// Digital silence has zero magnitude. The floor is never
/// allowed to divide by less than this.
pub const FLOOR_EPSILON: f32 = 1.0e-4;

/// Noise floor estimate
///
/// The first observation seeds the estimate. Thereafter,
/// observations below the floor pull it down by `fall` (a
/// fraction of the difference) and observations above it raise
/// it by `rise`. With `fall` ≫ `rise`, a keyed carrier barely
/// moves the floor while the gaps between elements keep
/// it anchored to the background.
#[derive(Clone, Debug)]
pub struct NoiseFloor {
    // fraction of a downward step taken each update
    fall: f32,

    // fraction of an upward step taken each update
    rise: f32,

    // current estimate, if any
    level: Option<f32>,
}

impl NoiseFloor {
    /// Default downward update rate
    pub const FALL: f32 = 0.5;

    /// Default upward update rate
    pub const RISE: f32 = 0.002;

    /// New noise floor with the given update rates
    ///
    /// Both rates are fractions in `[0.0, 1.0]`.
    pub fn new(fall: f32, rise: f32) -> Self {
        Self {
            fall: f32::clamp(fall, 0.0, 1.0),
            rise: f32::clamp(rise, 0.0, 1.0),
            level: None,
        }
    }

    /// Reset to the unseeded state
    pub fn reset(&mut self) {
        self.level = None;
    }

    /// Replace the estimate with `level`
    pub fn seed(&mut self, level: f32) {
        self.level = Some(f32::max(level, 0.0));
    }

    /// Update with a new magnitude observation
    ///
    /// Returns the updated floor.
    #[inline]
    pub fn track(&mut self, magnitude: f32) -> f32 {
        let level = match self.level {
            None => magnitude,
            Some(level) if magnitude < level => level + (magnitude - level) * self.fall,
            Some(level) => level + (magnitude - level) * self.rise,
        };
        let level = f32::max(level, 0.0);
        self.level = Some(level);
        level
    }

    /// Ratio of `magnitude` to the floor
    ///
    /// The floor is bounded below by [`FLOOR_EPSILON`]. An
    /// unseeded floor is treated as `FLOOR_EPSILON`.
    #[inline]
    pub fn ratio(&self, magnitude: f32) -> f32 {
        magnitude / f32::max(self.level(), FLOOR_EPSILON)
    }

    /// Current estimate
    ///
    /// Zero if unseeded.
    pub fn level(&self) -> f32 {
        self.level.unwrap_or(0.0)
    }

    /// True if at least one observation has been made
    pub fn is_seeded(&self) -> bool {
        self.level.is_some()
    }
}

impl Default for NoiseFloor {
    fn default() -> Self {
        Self::new(Self::FALL, Self::RISE)
    }
}

/// Recent peak signal level
#[derive(Clone, Debug)]
pub struct PeakTracker {
    // fraction of a downward step taken each update
    decay: f32,

    // current estimate
    level: f32,
}

impl PeakTracker {
    /// Default decay rate
    pub const DECAY: f32 = 0.01;

    /// New peak tracker
    ///
    /// Below the current peak, each observation pulls the peak
    /// toward itself by `decay`, a fraction in `[0.0, 1.0]`.
    pub fn new(decay: f32) -> Self {
        Self {
            decay: f32::clamp(decay, 0.0, 1.0),
            level: 0.0,
        }
    }

    /// Reset to zero
    pub fn reset(&mut self) {
        self.level = 0.0;
    }

    /// Replace the estimate with `level`
    pub fn seed(&mut self, level: f32) {
        self.level = f32::max(level, 0.0);
    }

    /// Update with a new magnitude observation
    #[inline]
    pub fn track(&mut self, magnitude: f32) -> f32 {
        if magnitude > self.level {
            self.level = magnitude;
        } else {
            self.level += (magnitude - self.level) * self.decay;
        }
        self.level
    }

    /// Current peak estimate
    pub fn level(&self) -> f32 {
        self.level
    }
}

impl Default for PeakTracker {
    fn default() -> Self {
        Self::new(Self::DECAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_noise_floor() {
        let mut floor = NoiseFloor::new(0.5, 0.1);
        assert!(!floor.is_seeded());
        assert_approx_eq!(2.0f32 / FLOOR_EPSILON, floor.ratio(2.0));

        assert_eq!(1.0f32, floor.track(1.0));
        assert!(floor.is_seeded());

        // falls fast
        assert_approx_eq!(0.5f32, floor.track(0.0));
        assert_approx_eq!(0.25f32, floor.track(0.0));

        // rises slow
        assert_approx_eq!(0.325f32, floor.track(1.0));
        assert_approx_eq!(2.0f32 / 0.325f32, floor.ratio(2.0));

        floor.seed(4.0);
        assert_eq!(4.0f32, floor.level());
        floor.reset();
        assert_eq!(0.0f32, floor.level());
    }

    #[test]
    fn test_noise_floor_ignores_keying() {
        // a carrier keyed 50% of the time hardly moves the floor
        let mut floor = NoiseFloor::default();
        floor.track(0.01);
        for _i in 0..20 {
            for _j in 0..6 {
                floor.track(1.0);
            }
            for _j in 0..6 {
                floor.track(0.01);
            }
        }
        assert!(floor.level() < 0.02);
    }

    #[test]
    fn test_peak_tracker() {
        let mut peak = PeakTracker::new(0.5);
        assert_eq!(0.0f32, peak.level());
        assert_eq!(1.0f32, peak.track(1.0));
        assert_approx_eq!(0.5f32, peak.track(0.0));
        assert_eq!(2.0f32, peak.track(2.0));

        peak.seed(-1.0);
        assert_eq!(0.0f32, peak.level());
    }
}
