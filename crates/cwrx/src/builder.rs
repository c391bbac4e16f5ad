use crate::decoder::{DecoderTiming, SpeedMode};
use crate::keying::{key_thresholds, MIN_HYSTERESIS};
use crate::receiver::CwReceiver;
use crate::tracker::TrackingMode;
use crate::turns::{Speaker, DEFAULT_TURN_PROSIGNS};

/// Builds a CW receiver
///
/// The builder comes with a sensible set of default options.
/// All you really need to provide is the input sampling
/// rate. The defaults were chosen for 8000 Hz audio, where
/// the default block size of 80 samples gives 10 ms blocks
/// and 100 Hz frequency resolution.
///
/// The API specified by the builder is part of this crate's
/// API. The actual default values are *not*, however, and
/// are subject to revision in any minor release. If you
/// care very strongly about a setting, be sure to configure
/// it here.
#[derive(Clone, Debug, PartialEq)]
pub struct CwReceiverBuilder {
    input_rate: u32,
    block_size: usize,
    tracking: TrackingMode,
    speed: SpeedMode,
    on_ratio: f32,
    off_ratio: f32,
    confirm_blocks: u32,
    calibration_blocks: u32,
    debounce: f64,
    fast_drop: f32,
    timing: DecoderTiming,
    lock_acquire_blocks: u32,
    lock_timeout: f64,
    turn_prosigns: Vec<String>,
    turn_tolerance: f32,
    turn_idle_timeout: f64,
    first_speaker: Speaker,
}

impl CwReceiverBuilder {
    /// New receiver chain with "sensible" defaults
    ///
    /// The only mandatory parameter is the input sampling
    /// rate, in Hz. CW tones live below 3 kHz, so there is
    /// no advantage to rates much above 8000 Hz. Higher
    /// rates need proportionally larger
    /// [blocks](#method.with_block_size) for the same
    /// frequency resolution.
    pub fn new(input_rate: u32) -> Self {
        Self {
            input_rate: u32::max(input_rate, 1),
            block_size: 80,
            tracking: TrackingMode::default(),
            speed: SpeedMode::default(),
            on_ratio: 3.0,
            off_ratio: 2.0,
            confirm_blocks: 2,
            calibration_blocks: 10,
            debounce: 0.015,
            fast_drop: 0.3,
            timing: DecoderTiming::default(),
            lock_acquire_blocks: 3,
            lock_timeout: 3.0,
            turn_prosigns: DEFAULT_TURN_PROSIGNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            turn_tolerance: 50.0,
            turn_idle_timeout: 5.0,
            first_speaker: Speaker::Remote,
        }
    }

    /// Build a receiver chain
    ///
    /// Once built, the receiver chain is immediately ready to
    /// process samples.
    pub fn build(&self) -> CwReceiver {
        CwReceiver::from(self)
    }

    /// Block size (samples)
    ///
    /// Audio is processed in blocks of `size` samples. Each
    /// block yields one magnitude per candidate frequency.
    /// Larger blocks resolve tones more finely, with a
    /// resolution of `input_rate / size` Hz, but they also
    /// blur the timing of short dits. Blocks should be no
    /// longer than about a fifth of a dit at the fastest
    /// speed you expect.
    pub fn with_block_size(&mut self, size: usize) -> &mut Self {
        self.block_size = usize::clamp(size, 8, 8192);
        self
    }

    /// Listen to a single tone frequency (Hz)
    ///
    /// Disables scanning. The receiver is always locked to
    /// the DFT bin nearest `frequency`.
    pub fn with_fixed_frequency(&mut self, frequency: f32) -> &mut Self {
        self.tracking = TrackingMode::Fixed {
            frequency: f32::max(frequency, 0.0),
        };
        self
    }

    /// Scan for the tone frequency (Hz)
    ///
    /// Candidates are spaced `step` Hz apart from `low` to
    /// `high`. Candidates closer together than the frequency
    /// resolution are merged.
    pub fn with_scan_range(&mut self, low: f32, high: f32, step: f32) -> &mut Self {
        let low = f32::max(low, 0.0);
        self.tracking = TrackingMode::Scanning {
            low,
            high: f32::max(high, low),
            step: f32::max(step, 1.0),
        };
        self
    }

    /// Set the frequency tracking mode directly
    pub fn with_tracking_mode(&mut self, mode: TrackingMode) -> &mut Self {
        match mode {
            TrackingMode::Fixed { frequency } => self.with_fixed_frequency(frequency),
            TrackingMode::Scanning { low, high, step } => self.with_scan_range(low, high, step),
        }
    }

    /// Decode at a fixed speed (WPM)
    pub fn with_fixed_wpm(&mut self, wpm: f32) -> &mut Self {
        self.speed = SpeedMode::Fixed {
            wpm: f32::clamp(wpm, 1.0, 100.0),
        };
        self
    }

    /// Adapt to the sender's speed (WPM)
    ///
    /// Starts at `initial_wpm` and adapts within
    /// `[min_wpm, max_wpm]`.
    pub fn with_adaptive_wpm(&mut self, initial_wpm: f32, min_wpm: f32, max_wpm: f32) -> &mut Self {
        let min_wpm = f32::clamp(min_wpm, 1.0, 100.0);
        let max_wpm = f32::clamp(max_wpm, min_wpm, 100.0);
        self.speed = SpeedMode::Adaptive {
            initial_wpm: f32::clamp(initial_wpm, min_wpm, max_wpm),
            min_wpm,
            max_wpm,
        };
        self
    }

    /// Set the speed mode directly
    pub fn with_speed_mode(&mut self, mode: SpeedMode) -> &mut Self {
        match mode {
            SpeedMode::Fixed { wpm } => self.with_fixed_wpm(wpm),
            SpeedMode::Adaptive {
                initial_wpm,
                min_wpm,
                max_wpm,
            } => self.with_adaptive_wpm(initial_wpm, min_wpm, max_wpm),
        }
    }

    /// Key detection thresholds (ratio to noise floor)
    ///
    /// The key goes down when the tone magnitude is at least
    /// `on` times the noise floor, and comes back up when it
    /// falls below `off` times the floor. `on` also decides
    /// when a scanned candidate is present.
    ///
    /// We require `on` > `off` ≥ 1.0, with `on` at least
    /// [`MIN_HYSTERESIS`] times `off`. `off` is lowered to fit.
    pub fn with_key_ratios(&mut self, on: f32, off: f32) -> &mut Self {
        let (on, off) = key_thresholds(on, off);
        self.on_ratio = on;
        self.off_ratio = off;
        self
    }

    /// Blocks needed to confirm a key transition
    pub fn with_confirm_blocks(&mut self, blocks: u32) -> &mut Self {
        self.confirm_blocks = u32::max(blocks, 1);
        self
    }

    /// Blocks of calibration at startup
    ///
    /// During calibration, the receiver only measures the
    /// background noise. No lock is acquired and no key
    /// events are reported.
    pub fn with_calibration_blocks(&mut self, blocks: u32) -> &mut Self {
        self.calibration_blocks = blocks;
        self
    }

    /// Minimum time between key transitions (s)
    pub fn with_debounce(&mut self, seconds: f64) -> &mut Self {
        self.debounce = f64::max(seconds, 0.0);
        self
    }

    /// Fast key-up threshold (fraction of peak)
    ///
    /// The key is released immediately, without waiting for
    /// confirmation, when the tone magnitude drops below
    /// `fraction` of its recent peak. Set to zero to disable.
    pub fn with_fast_drop(&mut self, fraction: f32) -> &mut Self {
        self.fast_drop = f32::clamp(fraction, 0.0, 1.0);
        self
    }

    /// Shortest tone and gap to decode (s)
    ///
    /// Shorter tones and gaps are treated as noise.
    pub fn with_min_durations(&mut self, min_tone: f64, min_gap: f64) -> &mut Self {
        self.timing.min_tone = f64::max(min_tone, 0.0);
        self.timing.min_gap = f64::max(min_gap, 0.0);
        self
    }

    /// Gap classification thresholds (units)
    ///
    /// Gaps of at least `char_gap` units end a character,
    /// and gaps of at least `word_gap` units end a word. The
    /// ideal gaps are one, three, and seven units.
    pub fn with_gap_multipliers(&mut self, char_gap: f32, word_gap: f32) -> &mut Self {
        self.timing.char_gap_units = f32::clamp(char_gap, 1.0, 7.0);
        self.timing.word_gap_units = f32::clamp(word_gap, self.timing.char_gap_units, 20.0);
        self
    }

    /// Idle time which ends a pending character (units)
    pub fn with_char_timeout(&mut self, units: f32) -> &mut Self {
        self.timing.char_timeout_units = f32::max(units, 1.0);
        self
    }

    /// Blocks of dominance needed to lock to a tone
    pub fn with_lock_acquire_blocks(&mut self, blocks: u32) -> &mut Self {
        self.lock_acquire_blocks = u32::max(blocks, 1);
        self
    }

    /// Silence which drops the lock (s)
    ///
    /// Once the locked tone has been absent for longer than
    /// this, the receiver resumes scanning.
    pub fn with_lock_timeout(&mut self, seconds: f64) -> &mut Self {
        self.lock_timeout = f64::max(seconds, 0.0);
        self
    }

    /// Words which end a conversation turn
    ///
    /// Words are matched exactly after conversion to upper
    /// case. Prosigns sent as one character are written in
    /// angle brackets, like `<SK>`.
    pub fn with_turn_prosigns<I, S>(&mut self, prosigns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.turn_prosigns = prosigns
            .into_iter()
            .map(|p| p.as_ref().trim().to_ascii_uppercase())
            .filter(|p| !p.is_empty())
            .collect();
        self
    }

    /// Frequency change which starts a new turn (Hz)
    pub fn with_turn_tolerance(&mut self, hz: f32) -> &mut Self {
        self.turn_tolerance = f32::max(hz, 0.0);
        self
    }

    /// Silence which ends a conversation turn (s)
    pub fn with_turn_idle_timeout(&mut self, seconds: f64) -> &mut Self {
        self.turn_idle_timeout = f64::max(seconds, 0.0);
        self
    }

    /// Speaker of the first turn
    pub fn with_first_speaker(&mut self, speaker: Speaker) -> &mut Self {
        self.first_speaker = speaker;
        self
    }

    /// Input sampling rate (Hz)
    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    /// Block size (samples)
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Frequency tracking mode
    pub fn tracking_mode(&self) -> TrackingMode {
        self.tracking
    }

    /// Speed mode
    pub fn speed_mode(&self) -> SpeedMode {
        self.speed
    }

    /// Key detection thresholds
    ///
    /// Returns tuple of (`on`, `off`) ratios.
    pub fn key_ratios(&self) -> (f32, f32) {
        (self.on_ratio, self.off_ratio)
    }

    /// Blocks needed to confirm a key transition
    pub fn confirm_blocks(&self) -> u32 {
        self.confirm_blocks
    }

    /// Blocks of calibration at startup
    pub fn calibration_blocks(&self) -> u32 {
        self.calibration_blocks
    }

    /// Minimum time between key transitions (s)
    pub fn debounce(&self) -> f64 {
        self.debounce
    }

    /// Fast key-up threshold (fraction of peak)
    pub fn fast_drop(&self) -> f32 {
        self.fast_drop
    }

    /// Decoder timing thresholds
    pub fn decoder_timing(&self) -> DecoderTiming {
        self.timing
    }

    /// Blocks of dominance needed to lock to a tone
    pub fn lock_acquire_blocks(&self) -> u32 {
        self.lock_acquire_blocks
    }

    /// Silence which drops the lock (s)
    pub fn lock_timeout(&self) -> f64 {
        self.lock_timeout
    }

    /// Words which end a conversation turn
    pub fn turn_prosigns(&self) -> &[String] {
        &self.turn_prosigns
    }

    /// Frequency change which starts a new turn (Hz)
    pub fn turn_tolerance(&self) -> f32 {
        self.turn_tolerance
    }

    /// Silence which ends a conversation turn (s)
    pub fn turn_idle_timeout(&self) -> f64 {
        self.turn_idle_timeout
    }

    /// Speaker of the first turn
    pub fn first_speaker(&self) -> Speaker {
        self.first_speaker
    }

    /// Duration of one block (s)
    pub fn block_duration(&self) -> f64 {
        self.block_size as f64 / self.input_rate as f64
    }
}

impl std::default::Default for CwReceiverBuilder {
    fn default() -> Self {
        Self::new(8000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_defaults() {
        let bld = CwReceiverBuilder::default();
        assert_eq!(8000, bld.input_rate());
        assert_eq!(80, bld.block_size());
        assert_approx_eq!(0.01f64, bld.block_duration());
        assert_eq!(
            TrackingMode::Scanning {
                low: 400.0,
                high: 1000.0,
                step: 50.0
            },
            bld.tracking_mode()
        );
        assert!(bld.speed_mode().is_adaptive());
        assert_eq!((3.0, 2.0), bld.key_ratios());
        assert_eq!(&["K", "KN", "BK", "SK", "<SK>", "<BK>"], bld.turn_prosigns());
        assert_eq!(Speaker::Remote, bld.first_speaker());
    }

    #[test]
    fn test_clamping() {
        let mut bld = CwReceiverBuilder::new(8000);
        bld.with_key_ratios(2.0, 5.0)
            .with_block_size(1)
            .with_gap_multipliers(4.0, 3.0)
            .with_adaptive_wpm(100.0, 10.0, 30.0)
            .with_turn_prosigns(["k", "", " <sk> "]);

        let (on, off) = bld.key_ratios();
        assert_eq!(2.0, on);
        assert_approx_eq!(2.0 / MIN_HYSTERESIS, off);
        assert!(off < on);
        assert_eq!(8, bld.block_size());
        assert_eq!(4.0, bld.decoder_timing().char_gap_units);
        assert_eq!(4.0, bld.decoder_timing().word_gap_units);
        assert_eq!(
            SpeedMode::Adaptive {
                initial_wpm: 30.0,
                min_wpm: 10.0,
                max_wpm: 30.0
            },
            bld.speed_mode()
        );
        assert_eq!(&["K", "<SK>"], bld.turn_prosigns());

        bld.with_fixed_frequency(-10.0);
        assert_eq!(TrackingMode::Fixed { frequency: 0.0 }, bld.tracking_mode());
    }
}
