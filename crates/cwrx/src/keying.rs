//! Key state detection
//!
//! The [`KeyDetector`] turns a stream of per-block tone
//! magnitudes into debounced key-down and key-up events.
//! It compares each magnitude against an adaptive
//! [noise floor](crate::level::NoiseFloor), with hysteresis:
//! the key goes down when the ratio exceeds `on_ratio` and
//! comes back up only when the ratio falls below the smaller
//! `off_ratio`. Either transition must persist for several
//! blocks before it is reported.
//!
//! Tones usually end abruptly. When the magnitude falls well
//! below the recent signal peak, the key is released without
//! waiting for confirmation.

#[cfg(not(test))]
use log::{debug, trace};

#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as trace;

use crate::level::{NoiseFloor, PeakTracker};

/// Smallest ratio of the key-down threshold to the key-up threshold
pub const MIN_HYSTERESIS: f32 = 1.1;

/// Limit key thresholds to `1.0 ≤ off` and `off × MIN_HYSTERESIS ≤ on`
///
/// Returns the (`on`, `off`) ratios. `on` is raised and `off`
/// is lowered as needed.
pub fn key_thresholds(on: f32, off: f32) -> (f32, f32) {
    let on = f32::max(on, MIN_HYSTERESIS);
    let off = f32::clamp(off, 1.0, on / MIN_HYSTERESIS);
    (on, off)
}

/// A key transition
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KeyEvent {
    /// True if the key went down; false if it came up
    pub key_down: bool,

    /// Time of the transition (s)
    pub time: f64,
}

impl KeyEvent {
    /// Key went down at `time`
    pub fn down(time: f64) -> Self {
        Self {
            key_down: true,
            time,
        }
    }

    /// Key came up at `time`
    pub fn up(time: f64) -> Self {
        Self {
            key_down: false,
            time,
        }
    }
}

/// Debounced key state detector
///
/// Feed the magnitude of the active frequency, one block at a
/// time, to [`input()`](#method.input).
///
/// The first `calibration_blocks` blocks only train the noise
/// floor and signal peak. No events are emitted until
/// calibration is complete or the detector is explicitly
/// [seeded](#method.seed).
#[derive(Clone, Debug)]
pub struct KeyDetector {
    // ratio to floor which may key down
    on_ratio: f32,

    // ratio to floor below which the key may come up
    off_ratio: f32,

    // consecutive blocks required to change state
    confirm_blocks: u32,

    // blocks of calibration
    calibration_blocks: u32,

    // minimum time between transitions (s)
    debounce: f64,

    // key up immediately below this fraction of the peak
    fast_drop: f32,

    // duration of one block (s)
    block_duration: f64,

    // background level
    floor: NoiseFloor,

    // recent signal level
    peak: PeakTracker,

    // blocks seen, saturating at calibration_blocks
    blocks_seen: u32,

    // current state
    key_down: bool,

    // consecutive blocks favoring key-down
    on_count: u32,

    // consecutive blocks favoring key-up
    off_count: u32,

    // time of the last transition
    last_transition: Option<f64>,
}

impl KeyDetector {
    /// Create detector
    ///
    /// `on_ratio` must exceed `off_ratio`. Both are limited by
    /// [`key_thresholds()`]. Blocks are `block_duration` seconds
    /// long.
    pub fn new(
        on_ratio: f32,
        off_ratio: f32,
        confirm_blocks: u32,
        calibration_blocks: u32,
        debounce: f64,
        fast_drop: f32,
        block_duration: f64,
    ) -> Self {
        let (on_ratio, off_ratio) = key_thresholds(on_ratio, off_ratio);
        Self {
            on_ratio,
            off_ratio,
            confirm_blocks: u32::max(confirm_blocks, 1),
            calibration_blocks,
            debounce: f64::max(debounce, 0.0),
            fast_drop: f32::clamp(fast_drop, 0.0, 1.0),
            block_duration,
            floor: NoiseFloor::default(),
            peak: PeakTracker::default(),
            blocks_seen: 0,
            key_down: false,
            on_count: 0,
            off_count: 0,
            last_transition: None,
        }
    }

    /// Process the magnitude of one block
    ///
    /// `time` is the start time of the block. If the key
    /// changes state, returns the transition, stamped at the
    /// midpoint of the block which confirmed it.
    pub fn input(&mut self, magnitude: f32, time: f64) -> Option<KeyEvent> {
        if self.is_calibrating() {
            self.floor.track(magnitude);
            self.peak.track(magnitude);
            self.blocks_seen += 1;
            if !self.is_calibrating() {
                debug!(
                    "keying: calibrated, floor {:.6}, peak {:.6}",
                    self.floor.level(),
                    self.peak.level()
                );
            }
            return None;
        }

        let ratio = self.floor.ratio(magnitude);
        let peak = self.peak.level();
        self.floor.track(magnitude);
        self.peak.track(magnitude);

        let midpoint = time + 0.5 * self.block_duration;
        if self.key_down {
            if ratio < self.off_ratio {
                self.off_count += 1;
            } else {
                self.off_count = 0;
            }

            let dropped = magnitude < self.fast_drop * peak;
            if (self.off_count >= self.confirm_blocks || dropped) && self.debounced(midpoint) {
                trace!(
                    "keying [{:>10.3}]: key up, ratio {:.2}, peak {:.6}",
                    midpoint,
                    ratio,
                    peak
                );
                return Some(self.transition(false, midpoint));
            }
        } else {
            if ratio >= self.on_ratio {
                self.on_count += 1;
            } else {
                self.on_count = 0;
            }

            if self.on_count >= self.confirm_blocks && self.debounced(midpoint) {
                trace!(
                    "keying [{:>10.3}]: key down, ratio {:.2}, floor {:.6}",
                    midpoint,
                    ratio,
                    self.floor.level()
                );
                return Some(self.transition(true, midpoint));
            }
        }

        None
    }

    /// Seed level estimates and end calibration
    ///
    /// Replaces the noise floor and signal peak with the given
    /// levels. Use this when a newly-acquired tone has already
    /// been measured elsewhere.
    pub fn seed(&mut self, floor: f32, peak: f32) {
        self.floor.seed(floor);
        self.peak.seed(peak);
        self.blocks_seen = self.calibration_blocks;
        self.on_count = 0;
        self.off_count = 0;
    }

    /// Force the key up
    ///
    /// If the key is down, releases it at `time` and returns
    /// the transition. Used when the tone itself is lost.
    pub fn release(&mut self, time: f64) -> Option<KeyEvent> {
        if self.key_down {
            Some(self.transition(false, time))
        } else {
            None
        }
    }

    /// Reset to the initial, uncalibrated state
    pub fn reset(&mut self) {
        self.floor.reset();
        self.peak.reset();
        self.blocks_seen = 0;
        self.key_down = false;
        self.on_count = 0;
        self.off_count = 0;
        self.last_transition = None;
    }

    /// True if the key is down
    pub fn is_key_down(&self) -> bool {
        self.key_down
    }

    /// True if still calibrating
    pub fn is_calibrating(&self) -> bool {
        self.blocks_seen < self.calibration_blocks
    }

    /// Noise floor estimate
    pub fn floor(&self) -> f32 {
        self.floor.level()
    }

    /// Signal peak estimate
    pub fn peak(&self) -> f32 {
        self.peak.level()
    }

    #[inline]
    fn debounced(&self, time: f64) -> bool {
        self.last_transition
            .map(|last| time - last >= self.debounce)
            .unwrap_or(true)
    }

    fn transition(&mut self, key_down: bool, time: f64) -> KeyEvent {
        self.key_down = key_down;
        self.on_count = 0;
        self.off_count = 0;
        self.last_transition = Some(time);
        KeyEvent { key_down, time }
    }
}
