//! Frequency tracking and lock
//!
//! The [`FrequencyTracker`] decides *which* tone the rest of the
//! receiver listens to. In [fixed](TrackingMode::Fixed) mode, there
//! is only one choice. In [scanning](TrackingMode::Scanning) mode,
//! a bank of [`ToneFilter`]s covers a range of audio frequencies,
//! and the tracker locks onto whichever one is keyed.
//!
//! ```txt
//!          +--------------+  same candidate dominant   +----------+
//!   ====>  |   Scanning   | ==== for N blocks =======> |  Locked  |
//!          +--------------+                            +----------+
//!                 /\                                        ||
//!                 ||===== tone absent > lock timeout =======||
//! ```
//!
//! A candidate is *present* when its magnitude exceeds its own
//! noise floor by the presence ratio. Among the present
//! candidates, the strongest is *dominant*. Comparing each
//! candidate against its own floor keeps a steady, unkeyed
//! carrier from ever being dominant, no matter how loud it is.
//!
//! Once locked, only the locked filter is evaluated.

#[cfg(not(test))]
use log::{debug, info};

#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as info;

use crate::goertzel::{HammingWindow, ToneFilter};
use crate::level::NoiseFloor;

/// Frequency tracking mode
///
/// Selected at construction time.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum TrackingMode {
    /// Listen to one frequency only
    ///
    /// The receiver is always "locked" to this frequency, in Hz.
    Fixed {
        /// Tone frequency (Hz)
        frequency: f32,
    },

    /// Scan a range of frequencies and lock to the keyed one
    Scanning {
        /// Lowest frequency to scan (Hz)
        low: f32,

        /// Highest frequency to scan (Hz)
        high: f32,

        /// Spacing between candidate frequencies (Hz)
        step: f32,
    },
}

impl Default for TrackingMode {
    fn default() -> Self {
        TrackingMode::Scanning {
            low: 400.0,
            high: 1000.0,
            step: 50.0,
        }
    }
}

/// Frequency lock state
///
/// When `locked` is false, the remaining fields describe the
/// most recent lock (if any) and should be treated as stale.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrequencyLock {
    /// Locked frequency (Hz)
    ///
    /// This is the center frequency of the DFT bin which the
    /// receiver is listening to.
    pub frequency: f32,

    /// Confidence in the lock, from `0.0` to `1.0`
    ///
    /// The fraction by which the locked tone exceeded the
    /// strongest non-adjacent candidate when the lock was
    /// acquired.
    pub confidence: f32,

    /// Time of lock acquisition (s)
    pub acquired_at: f64,

    /// True if locked
    pub locked: bool,
}

impl FrequencyLock {
    /// Locked frequency, if locked
    pub fn active_frequency(&self) -> Option<f32> {
        if self.locked {
            Some(self.frequency)
        } else {
            None
        }
    }
}

/// Lock state change
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LockChange {
    /// A new lock was acquired
    ///
    /// Includes the noise floor and current magnitude of the
    /// locked candidate, which downstream detectors may use to
    /// seed their own estimates.
    Acquired {
        /// The new lock
        lock: FrequencyLock,

        /// Noise floor of the locked candidate
        floor: f32,

        /// Magnitude of the locked candidate
        peak: f32,
    },

    /// The lock was dropped
    Dropped,
}

/// Tracker output for one block
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrackerOut {
    /// Magnitude at the active frequency
    ///
    /// `None` if there is no active frequency.
    pub magnitude: Option<f32>,

    /// Lock state change, if any
    pub change: Option<LockChange>,
}

/// Tone frequency tracker
///
/// Feed one block of audio at a time to
/// [`input()`](#method.input). All blocks must have the
/// block size given at construction.
#[derive(Clone, Debug)]
pub struct FrequencyTracker {
    // fixed or scanning bank
    tracking: Tracking,

    // block taper
    window: HammingWindow,

    // scratch space for the windowed block
    windowed: Vec<f32>,

    // ratio to noise floor for a candidate to be present
    presence_ratio: f32,

    // consecutive dominant blocks needed to lock
    acquire_blocks: u32,

    // maximum tolerated absence of the locked tone (s)
    lock_timeout: f64,

    // current lock
    lock: FrequencyLock,
}

impl FrequencyTracker {
    /// Create tracker
    ///
    /// The tracker operates on blocks of `block_size` samples at
    /// `sample_rate`. A candidate is present when its magnitude
    /// is at least `presence_ratio` times its noise floor. In
    /// scanning mode, `acquire_blocks` consecutive blocks of the
    /// same dominant candidate acquire the lock, and an absence
    /// of more than `lock_timeout` seconds drops it.
    ///
    /// Candidates in a scanning range which round to the same
    /// DFT bin are merged.
    pub fn new(
        mode: TrackingMode,
        sample_rate: u32,
        block_size: usize,
        presence_ratio: f32,
        acquire_blocks: u32,
        lock_timeout: f64,
    ) -> Self {
        let tracking = match mode {
            TrackingMode::Fixed { frequency } => {
                Tracking::Fixed(Candidate::new(frequency, sample_rate, block_size))
            }
            TrackingMode::Scanning { low, high, step } => {
                Tracking::Scanning(ScanBank::new(low, high, step, sample_rate, block_size))
            }
        };

        let mut out = Self {
            tracking,
            window: HammingWindow::new(block_size),
            windowed: vec![0.0f32; block_size],
            presence_ratio,
            acquire_blocks: u32::max(acquire_blocks, 1),
            lock_timeout,
            lock: FrequencyLock::default(),
        };
        out.reset();
        out
    }

    /// Process one block
    ///
    /// `samples` must contain exactly one block. `time` is the
    /// start time of the block, in seconds. While `calibrating`,
    /// noise floors are learned but no lock is acquired.
    pub fn input(&mut self, samples: &[f32], time: f64, calibrating: bool) -> TrackerOut {
        assert_eq!(self.windowed.len(), samples.len());
        self.window.apply(samples, &mut self.windowed);

        match &mut self.tracking {
            Tracking::Fixed(cand) => {
                let (magnitude, _) = cand.measure(&self.windowed, self.presence_ratio);
                TrackerOut {
                    magnitude: Some(magnitude),
                    change: None,
                }
            }
            Tracking::Scanning(bank) => {
                if let Some(locked) = bank.locked {
                    let (magnitude, present) =
                        bank.candidates[locked].measure(&self.windowed, self.presence_ratio);
                    if present {
                        bank.last_present = time;
                    } else if time - bank.last_present > self.lock_timeout {
                        info!(
                            "tracker [{:>10.3}]: dropped lock on {:.1} Hz",
                            time, self.lock.frequency
                        );
                        bank.unlock();
                        self.lock.locked = false;
                        return TrackerOut {
                            magnitude: None,
                            change: Some(LockChange::Dropped),
                        };
                    }

                    return TrackerOut {
                        magnitude: Some(magnitude),
                        change: None,
                    };
                }

                let dominant = bank.scan(&self.windowed, self.presence_ratio);
                if calibrating {
                    bank.streak = None;
                    return TrackerOut::default();
                }

                let count = match (dominant, bank.streak) {
                    (Some(idx), Some((last, count))) if idx == last => count + 1,
                    (Some(_), _) => 1,
                    (None, _) => 0,
                };
                bank.streak = dominant.map(|idx| (idx, count));

                match dominant {
                    Some(idx) if count >= self.acquire_blocks => {
                        let lock = FrequencyLock {
                            frequency: bank.candidates[idx].filter.bin_frequency(),
                            confidence: bank.confidence(idx),
                            acquired_at: time,
                            locked: true,
                        };
                        info!(
                            "tracker [{:>10.3}]: locked to {:.1} Hz, confidence {:.2}",
                            time, lock.frequency, lock.confidence
                        );

                        bank.locked = Some(idx);
                        bank.streak = None;
                        bank.last_present = time;
                        self.lock = lock;

                        let magnitude = bank.magnitudes[idx];
                        TrackerOut {
                            magnitude: Some(magnitude),
                            change: Some(LockChange::Acquired {
                                lock,
                                floor: bank.candidates[idx].floor.level(),
                                peak: magnitude,
                            }),
                        }
                    }
                    _ => TrackerOut::default(),
                }
            }
        }
    }

    /// Clear all tracking state
    ///
    /// Any lock is dropped and noise floors are forgotten. A
    /// fixed-frequency tracker remains locked.
    pub fn reset(&mut self) {
        match &mut self.tracking {
            Tracking::Fixed(cand) => {
                cand.floor.reset();
                self.lock = FrequencyLock {
                    frequency: cand.filter.bin_frequency(),
                    confidence: 1.0,
                    acquired_at: 0.0,
                    locked: true,
                };
            }
            Tracking::Scanning(bank) => {
                bank.unlock();
                for cand in bank.candidates.iter_mut() {
                    cand.floor.reset();
                }
                bank.reseed = false;
                self.lock = FrequencyLock::default();
            }
        }
    }

    /// Current lock state
    pub fn lock(&self) -> &FrequencyLock {
        &self.lock
    }

    /// True if the tracker scans for its frequency
    pub fn is_scanning(&self) -> bool {
        matches!(self.tracking, Tracking::Scanning(_))
    }

    /// Candidate frequencies (Hz)
    ///
    /// Lists the DFT bin center frequencies which the tracker
    /// can listen to.
    pub fn candidates(&self) -> Vec<f32> {
        match &self.tracking {
            Tracking::Fixed(cand) => vec![cand.filter.bin_frequency()],
            Tracking::Scanning(bank) => bank
                .candidates
                .iter()
                .map(|c| c.filter.bin_frequency())
                .collect(),
        }
    }
}

#[derive(Clone, Debug)]
enum Tracking {
    Fixed(Candidate),
    Scanning(ScanBank),
}

// One frequency and its background level
#[derive(Clone, Debug)]
struct Candidate {
    filter: ToneFilter,
    floor: NoiseFloor,
}

impl Candidate {
    fn new(frequency: f32, sample_rate: u32, block_size: usize) -> Self {
        Self {
            filter: ToneFilter::new(frequency, sample_rate, block_size),
            floor: NoiseFloor::default(),
        }
    }

    // Measure magnitude and presence, then update the floor
    //
    // Presence is judged against the floor *before* this
    // block's update.
    #[inline]
    fn measure(&mut self, windowed: &[f32], presence_ratio: f32) -> (f32, bool) {
        let magnitude = self.filter.magnitude(windowed);
        let present = self.floor.is_seeded() && self.floor.ratio(magnitude) >= presence_ratio;
        self.floor.track(magnitude);
        (magnitude, present)
    }
}

#[derive(Clone, Debug)]
struct ScanBank {
    // candidates, in ascending frequency order
    candidates: Vec<Candidate>,

    // last magnitude of each candidate
    magnitudes: Vec<f32>,

    // (dominant candidate, consecutive blocks)
    streak: Option<(usize, u32)>,

    // locked candidate
    locked: Option<usize>,

    // last time the locked candidate was present (s)
    last_present: f64,

    // next scan replaces every floor
    reseed: bool,
}

impl ScanBank {
    fn new(low: f32, high: f32, step: f32, sample_rate: u32, block_size: usize) -> Self {
        let (low, high) = (f32::min(low, high), f32::max(low, high));
        let step = f32::max(step, 1.0);

        let mut candidates: Vec<Candidate> = vec![];
        let mut freq = low;
        while freq <= high {
            let cand = Candidate::new(freq, sample_rate, block_size);
            let duplicate = candidates
                .last()
                .map(|last| last.filter.bin() == cand.filter.bin())
                .unwrap_or(false);
            if !duplicate {
                candidates.push(cand);
            }
            freq += step;
        }
        if candidates.is_empty() {
            candidates.push(Candidate::new(low, sample_rate, block_size));
        }

        debug!(
            "tracker: scanning {} candidates from {:.1} to {:.1} Hz",
            candidates.len(),
            candidates[0].filter.bin_frequency(),
            candidates[candidates.len() - 1].filter.bin_frequency()
        );

        let magnitudes = vec![0.0f32; candidates.len()];
        Self {
            candidates,
            magnitudes,
            streak: None,
            locked: None,
            last_present: 0.0,
            reseed: false,
        }
    }

    // Measure every candidate and return the dominant one
    fn scan(&mut self, windowed: &[f32], presence_ratio: f32) -> Option<usize> {
        if self.reseed {
            for (cand, mag) in self.candidates.iter_mut().zip(self.magnitudes.iter_mut()) {
                *mag = cand.filter.magnitude(windowed);
                cand.floor.seed(*mag);
            }
            self.reseed = false;
            return None;
        }

        let mut dominant: Option<usize> = None;
        for idx in 0..self.candidates.len() {
            let (magnitude, present) = self.candidates[idx].measure(windowed, presence_ratio);
            self.magnitudes[idx] = magnitude;
            if present
                && dominant
                    .map(|best| magnitude > self.magnitudes[best])
                    .unwrap_or(true)
            {
                dominant = Some(idx);
            }
        }
        dominant
    }

    // 1 - (strongest candidate outside the neighborhood of `idx`) / (magnitude of `idx`)
    fn confidence(&self, idx: usize) -> f32 {
        let best = self.magnitudes[idx];
        if best <= 0.0 {
            return 0.0;
        }

        let bin = self.candidates[idx].filter.bin();
        let runner_up = self
            .candidates
            .iter()
            .zip(self.magnitudes.iter())
            .filter(|(cand, _)| cand.filter.bin().abs_diff(bin) > 1)
            .map(|(_, mag)| *mag)
            .fold(0.0f32, f32::max);

        f32::clamp(1.0 - runner_up / best, 0.0, 1.0)
    }

    // Drop the lock and resume scanning with fresh floors
    fn unlock(&mut self) {
        self.locked = None;
        self.streak = None;
        self.reseed = true;
    }
}
