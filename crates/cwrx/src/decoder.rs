//! Morse timing decoder
//!
//! The [`MorseDecoder`] classifies the durations between
//! [`KeyEvent`]s into Morse elements and assembles them into
//! characters and words. All durations are judged against the
//! current *unit* duration, which is the length of one dit.
//!
//! ```txt
//! tone:  |--d--|           dit if |d - u| <= |d - 3u|, else dah
//!
//! gap:   ---u---|-- 2.5u --|---- 5.5u ---->
//!         element |   char   |    word
//! ```
//!
//! A tone is only classified once the gap after it reaches the
//! minimum gap. A shorter dropout is noise: the tones on either
//! side of it are one tone.
//!
//! In [adaptive](SpeedMode::Adaptive) mode, each accepted tone
//! implies a unit duration: `d` for a dit or `d / 3` for a dah.
//! The unit estimate follows the median of recent implications.

use arraydeque::ArrayDeque;
use arrayvec::ArrayVec;

#[cfg(not(test))]
use log::debug;

#[cfg(test)]
use std::println as debug;

use crate::keying::KeyEvent;
use crate::morse::{self, Pattern};
use crate::output::{DecodedOutput, MorseElement};
use crate::waveform::{unit_duration, wpm_from_unit};

/// Decoder outputs from one key event
pub type DecoderOut = ArrayVec<DecodedOutput, 4>;

/// Number of recent tones which inform the unit estimate
pub const WINDOW_LENGTH: usize = 16;

/// Sending speed mode
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum SpeedMode {
    /// Fixed speed
    ///
    /// The unit duration never changes.
    Fixed {
        /// Sending speed (WPM)
        wpm: f32,
    },

    /// Adapt to the sender's speed
    Adaptive {
        /// Speed to assume until the sender is measured (WPM)
        initial_wpm: f32,

        /// Slowest speed to adapt to (WPM)
        min_wpm: f32,

        /// Fastest speed to adapt to (WPM)
        max_wpm: f32,
    },
}

impl SpeedMode {
    /// Initial unit duration (s)
    pub fn initial_unit(&self) -> f64 {
        match self {
            SpeedMode::Fixed { wpm } => unit_duration(*wpm),
            SpeedMode::Adaptive { initial_wpm, .. } => unit_duration(*initial_wpm),
        }
    }

    /// Bounds on the unit duration (s), as `(shortest, longest)`
    pub fn unit_bounds(&self) -> (f64, f64) {
        match self {
            SpeedMode::Fixed { wpm } => {
                let unit = unit_duration(*wpm);
                (unit, unit)
            }
            SpeedMode::Adaptive {
                min_wpm, max_wpm, ..
            } => {
                let (a, b) = (unit_duration(*max_wpm), unit_duration(*min_wpm));
                (f64::min(a, b), f64::max(a, b))
            }
        }
    }

    /// True if the speed adapts to the sender
    pub fn is_adaptive(&self) -> bool {
        matches!(self, SpeedMode::Adaptive { .. })
    }
}

impl Default for SpeedMode {
    fn default() -> Self {
        SpeedMode::Adaptive {
            initial_wpm: 20.0,
            min_wpm: 5.0,
            max_wpm: 60.0,
        }
    }
}

/// Decoder timing thresholds
///
/// Gap thresholds are in multiples of the unit duration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecoderTiming {
    /// Tones shorter than this are ignored (s)
    pub min_tone: f64,

    /// Gaps shorter than this are ignored (s)
    pub min_gap: f64,

    /// Gaps at least this long end a character (units)
    pub char_gap_units: f32,

    /// Gaps at least this long end a word (units)
    pub word_gap_units: f32,

    /// Idle time which ends a pending character (units)
    pub char_timeout_units: f32,
}

impl Default for DecoderTiming {
    fn default() -> Self {
        Self {
            min_tone: 0.010,
            min_gap: 0.010,
            char_gap_units: 2.5,
            word_gap_units: 5.5,
            char_timeout_units: 5.0,
        }
    }
}

/// Morse timing decoder
///
/// Feed key events to [`input()`](#method.input), in time
/// order. Between events, call [`poll()`](#method.poll) so
/// that the last character of a transmission is not held
/// forever.
#[derive(Clone, Debug)]
pub struct MorseDecoder {
    speed: SpeedMode,
    timing: DecoderTiming,

    // current unit estimate (s)
    unit: f64,

    // unit bounds (s)
    min_unit: f64,
    max_unit: f64,

    // recent implied units
    window: ArrayDeque<f64, WINDOW_LENGTH, arraydeque::Wrapping>,

    // dots and dashes of the current character
    pattern: Pattern,

    // key state
    key_down: bool,

    // start of the current tone
    last_down: Option<f64>,

    // (key-down, key-up) of a tone which has not been classified
    held: Option<(f64, f64)>,

    // time of the last accepted key-up
    last_up: Option<f64>,

    // time of the last event
    last_event: Option<f64>,

    // true if no character has been emitted since the last word space
    word_spaced: bool,
}

impl MorseDecoder {
    /// Tones needed before the unit estimate adapts
    pub const MIN_ESTIMATES: usize = 4;

    /// Fraction of the distance to the median moved per tone
    pub const SMOOTHING: f64 = 0.3;

    /// Create decoder
    pub fn new(speed: SpeedMode, timing: DecoderTiming) -> Self {
        let (min_unit, max_unit) = speed.unit_bounds();
        Self {
            speed,
            timing,
            unit: f64::clamp(speed.initial_unit(), min_unit, max_unit),
            min_unit,
            max_unit,
            window: ArrayDeque::new(),
            pattern: Pattern::new(),
            key_down: false,
            last_down: None,
            held: None,
            last_up: None,
            last_event: None,
            word_spaced: true,
        }
    }

    /// Process a key event
    ///
    /// Events must be strictly increasing in time. Repeated
    /// events of the same kind are ignored.
    ///
    /// A key-down emits the dit or dah before it, the gap which
    /// just ended, and the completed character and word space,
    /// if any. A key-down which follows its key-up by less than
    /// the minimum gap emits nothing: the key never came up.
    ///
    /// # Panics
    ///
    /// If events are not in time order.
    pub fn input(&mut self, evt: KeyEvent) -> DecoderOut {
        if let Some(last) = self.last_event {
            assert!(
                evt.time > last,
                "key events out of order: {} after {}",
                evt.time,
                last
            );
        }
        self.last_event = Some(evt.time);

        let mut out = DecoderOut::new();
        match (evt.key_down, self.key_down) {
            (true, false) => self.key_pressed(evt.time, &mut out),
            (false, true) => self.key_released(evt.time),
            _ => {}
        }
        out
    }

    /// Emit elements and characters which time has settled
    ///
    /// If the key is up, a held tone is classified once the
    /// minimum gap has passed. A pending character is emitted
    /// once more than `char_timeout_units` units have passed
    /// since the last key-up. A pending character is emitted
    /// at most once.
    pub fn poll(&mut self, now: f64) -> DecoderOut {
        let mut out = DecoderOut::new();
        if self.key_down {
            return out;
        }

        if let Some((_, up)) = self.held {
            if now - up >= self.timing.min_gap {
                self.commit_tone(&mut out);
            }
        }

        if let Some(last_up) = self.last_up {
            if self.held.is_none()
                && now - last_up > self.timing.char_timeout_units as f64 * self.unit
            {
                out.extend(self.flush_pattern());
            }
        }
        out
    }

    /// Emit the held tone and pending character, if any
    ///
    /// Use at the end of the input stream.
    pub fn flush(&mut self) -> DecoderOut {
        let mut out = DecoderOut::new();
        self.commit_tone(&mut out);
        out.extend(self.flush_pattern());
        out
    }

    /// Discard all decoding state
    ///
    /// Any pending character is lost. The unit estimate
    /// returns to its initial value.
    pub fn reset(&mut self) {
        self.unit = f64::clamp(self.speed.initial_unit(), self.min_unit, self.max_unit);
        self.window.clear();
        self.pattern.clear();
        self.key_down = false;
        self.last_down = None;
        self.held = None;
        self.last_up = None;
        self.last_event = None;
        self.word_spaced = true;
    }

    /// Current unit estimate (s)
    pub fn unit(&self) -> f64 {
        self.unit
    }

    /// Current speed estimate (WPM)
    pub fn wpm(&self) -> f32 {
        wpm_from_unit(self.unit)
    }

    /// Dots and dashes of the pending character
    ///
    /// Includes the held tone, as it would be classified now.
    pub fn pending(&self) -> Pattern {
        let mut out = self.pattern;
        if let Some((down, up)) = self.held {
            if let Some(sym) = classify_tone(up - down, self.unit).symbol() {
                let _ = out.try_push(sym);
            }
        }
        out
    }

    /// Speed mode
    pub fn speed_mode(&self) -> &SpeedMode {
        &self.speed
    }

    // key went down: classify the preceding tone and gap
    fn key_pressed(&mut self, time: f64, out: &mut DecoderOut) {
        self.key_down = true;

        if let Some((down, up)) = self.held {
            if time - up < self.timing.min_gap {
                // dropout: the held tone continues
                self.held = None;
                self.last_down = Some(down);
                return;
            }
        }

        self.commit_tone(out);
        self.last_down = Some(time);

        let gap = match self.last_up {
            Some(up) => time - up,
            None => return,
        };
        if gap < self.timing.min_gap {
            return;
        }

        let element = classify_gap(
            gap,
            self.unit,
            self.timing.char_gap_units,
            self.timing.word_gap_units,
        );
        out.push(element.into());

        match element {
            MorseElement::CharGap => {
                out.extend(self.flush_pattern());
            }
            MorseElement::WordGap => {
                out.extend(self.flush_pattern());
                if !self.word_spaced {
                    self.word_spaced = true;
                    out.push(DecodedOutput::WordSpace);
                }
            }
            _ => {}
        }
    }

    // key came up: hold the tone until its gap is long enough
    fn key_released(&mut self, time: f64) {
        self.key_down = false;

        let down = match self.last_down {
            Some(down) => down,
            None => return,
        };
        if time - down < self.timing.min_tone {
            return;
        }

        self.held = Some((down, time));
    }

    // classify the held tone
    fn commit_tone(&mut self, out: &mut DecoderOut) {
        let (down, up) = match self.held.take() {
            Some(tone) => tone,
            None => return,
        };

        let duration = up - down;
        let element = classify_tone(duration, self.unit);
        if let Some(sym) = element.symbol() {
            // an overlong pattern decodes as unknown anyway
            let _ = self.pattern.try_push(sym);
        }

        if self.speed.is_adaptive() {
            let implied = match element {
                MorseElement::Dah => duration / 3.0,
                _ => duration,
            };
            self.adapt(implied);
        }

        self.last_up = Some(up);
        out.push(element.into());
    }

    // update the unit estimate with an implied unit
    fn adapt(&mut self, implied: f64) {
        if implied < self.min_unit || implied > self.max_unit {
            return;
        }

        self.window.push_back(implied);
        if self.window.len() < Self::MIN_ESTIMATES {
            return;
        }

        let mut sorted: ArrayVec<f64, WINDOW_LENGTH> =
            self.window.iter().copied().collect();
        sorted.sort_unstable_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            0.5 * (sorted[mid - 1] + sorted[mid])
        } else {
            sorted[mid]
        };

        self.unit += Self::SMOOTHING * (median - self.unit);
        self.unit = f64::clamp(self.unit, self.min_unit, self.max_unit);
    }

    // emit the pending character
    fn flush_pattern(&mut self) -> Option<DecodedOutput> {
        if self.pattern.is_empty() {
            return None;
        }

        let character = morse::lookup(&self.pattern);
        debug!(
            "decoder: \"{}\" => \"{}\" at {:.1} WPM",
            self.pattern,
            character,
            self.wpm()
        );
        self.pattern.clear();
        self.word_spaced = false;
        Some(DecodedOutput::Character(character))
    }
}

/// Classify a tone of `duration` seconds
///
/// Returns [`MorseElement::Dit`] if the duration is at least as
/// close to one `unit` as to three; otherwise
/// [`MorseElement::Dah`].
pub fn classify_tone(duration: f64, unit: f64) -> MorseElement {
    if f64::abs(duration - unit) <= f64::abs(duration - 3.0 * unit) {
        MorseElement::Dit
    } else {
        MorseElement::Dah
    }
}

/// Classify a gap of `duration` seconds
pub fn classify_gap(
    duration: f64,
    unit: f64,
    char_gap_units: f32,
    word_gap_units: f32,
) -> MorseElement {
    if duration < char_gap_units as f64 * unit {
        MorseElement::ElementGap
    } else if duration < word_gap_units as f64 * unit {
        MorseElement::CharGap
    } else {
        MorseElement::WordGap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    use crate::morse::Character;
    use crate::waveform::text_to_keying;

    // decode keying to text, flushing at the end
    fn decode(dec: &mut MorseDecoder, keying: &[KeyEvent]) -> String {
        let mut out = String::new();
        for evt in keying {
            for txt in dec.input(*evt).iter().filter(|o| o.is_text()) {
                out.push_str(&txt.to_string());
            }
        }
        for txt in dec.flush().iter().filter(|o| o.is_text()) {
            out.push_str(&txt.to_string());
        }
        out
    }

    #[test]
    fn test_classify_tone() {
        // ties go to dit
        assert_eq!(MorseElement::Dit, classify_tone(1.0, 0.5));
        assert_eq!(MorseElement::Dah, classify_tone(1.001, 0.5));

        // classification is monotonic in duration
        let mut seen_dah = false;
        for ms in 1..400 {
            match classify_tone(ms as f64 / 1000.0, 0.06) {
                MorseElement::Dit => assert!(!seen_dah, "dit after dah at {} ms", ms),
                MorseElement::Dah => seen_dah = true,
                _ => unreachable!(),
            }
        }
        assert!(seen_dah);
        assert_eq!(MorseElement::Dit, classify_tone(0.119, 0.06));
        assert_eq!(MorseElement::Dah, classify_tone(0.121, 0.06));
    }

    #[test]
    fn test_classify_gap() {
        assert_eq!(MorseElement::ElementGap, classify_gap(0.07, 0.06, 2.5, 5.5));
        assert_eq!(MorseElement::CharGap, classify_gap(0.19, 0.06, 2.5, 5.5));
        assert_eq!(MorseElement::WordGap, classify_gap(0.43, 0.06, 2.5, 5.5));
        assert_eq!(MorseElement::WordGap, classify_gap(100.0, 0.06, 2.5, 5.5));
    }

    #[test]
    fn test_fixed_round_trip() {
        for wpm in [5.0f32, 13.0, 20.0, 35.0, 60.0] {
            let mut dec = MorseDecoder::new(SpeedMode::Fixed { wpm }, DecoderTiming::default());
            let keying = text_to_keying("CQ CQ DE W1AW <SK> 73?", wpm, 0.5);
            assert_eq!("CQ CQ DE W1AW <SK> 73?", decode(&mut dec, &keying));
            assert_approx_eq!(wpm, dec.wpm(), 1.0e-3);
        }
    }

    #[test]
    fn test_elements() {
        let mut dec = MorseDecoder::new(SpeedMode::Fixed { wpm: 20.0 }, DecoderTiming::default());

        // "A": each tone is emitted on the next key-down
        let out = dec.input(KeyEvent::down(1.0));
        assert!(out.is_empty());
        let out = dec.input(KeyEvent::up(1.06));
        assert!(out.is_empty());
        assert_eq!(".", dec.pending().as_str());
        let out = dec.input(KeyEvent::down(1.12));
        assert_eq!(
            &[
                DecodedOutput::Element(MorseElement::Dit),
                DecodedOutput::Element(MorseElement::ElementGap)
            ],
            out.as_slice()
        );
        let out = dec.input(KeyEvent::up(1.30));
        assert!(out.is_empty());
        assert_eq!(".-", dec.pending().as_str());

        // word gap: character, then space
        let out = dec.input(KeyEvent::down(1.72));
        assert_eq!(
            &[
                DecodedOutput::Element(MorseElement::Dah),
                DecodedOutput::Element(MorseElement::WordGap),
                DecodedOutput::Character(Character::Known("A")),
                DecodedOutput::WordSpace,
            ],
            out.as_slice()
        );
        assert_eq!("", dec.pending().as_str());
    }

    #[test]
    fn test_glitches_ignored() {
        let mut dec = MorseDecoder::new(SpeedMode::Fixed { wpm: 20.0 }, DecoderTiming::default());

        // a 5 ms tone is not a dit
        dec.input(KeyEvent::down(0.5));
        let out = dec.input(KeyEvent::up(0.505));
        assert!(out.is_empty());
        assert!(dec.poll(0.6).is_empty());
        assert_eq!("", dec.pending().as_str());

        // a 5 ms dropout is not a gap: 90 ms + 85 ms is one dah
        dec.input(KeyEvent::down(1.0));
        dec.input(KeyEvent::up(1.09));
        assert_eq!(".", dec.pending().as_str());
        assert!(dec.poll(1.093).is_empty());
        let out = dec.input(KeyEvent::down(1.095));
        assert!(out.is_empty());
        dec.input(KeyEvent::up(1.18));
        assert_eq!("-", dec.pending().as_str());

        // a real gap, then a dit
        let out = dec.input(KeyEvent::down(1.24));
        assert_eq!(
            &[
                DecodedOutput::Element(MorseElement::Dah),
                DecodedOutput::Element(MorseElement::ElementGap)
            ],
            out.as_slice()
        );
        dec.input(KeyEvent::up(1.30));
        assert_eq!("-.", dec.pending().as_str());

        // gap is measured from the last accepted key-up
        let out = dec.input(KeyEvent::down(1.36));
        assert_eq!(
            &[
                DecodedOutput::Element(MorseElement::Dit),
                DecodedOutput::Element(MorseElement::ElementGap)
            ],
            out.as_slice()
        );
        let out = dec.input(KeyEvent::up(1.365));
        assert!(out.is_empty());
        assert_eq!("-.", dec.pending().as_str());
        let out = dec.input(KeyEvent::down(1.48));
        assert_eq!(
            &[
                DecodedOutput::Element(MorseElement::CharGap),
                DecodedOutput::Character(Character::Known("N")),
            ],
            out.as_slice()
        );
    }

    #[test]
    fn test_single_word_space() {
        let mut dec = MorseDecoder::new(SpeedMode::Fixed { wpm: 20.0 }, DecoderTiming::default());

        // "E", idle flush, then a long pause
        dec.input(KeyEvent::down(0.0));
        dec.input(KeyEvent::up(0.06));
        assert_eq!(
            &[
                DecodedOutput::Element(MorseElement::Dit),
                DecodedOutput::Character(Character::Known("E"))
            ],
            dec.poll(1.0).as_slice()
        );
        let out = dec.input(KeyEvent::down(2.0));
        assert_eq!(
            &[
                DecodedOutput::Element(MorseElement::WordGap),
                DecodedOutput::WordSpace
            ],
            out.as_slice()
        );

        // a second long pause without a character: no space
        dec.input(KeyEvent::up(2.005));
        let out = dec.input(KeyEvent::down(3.0));
        assert_eq!(
            &[DecodedOutput::Element(MorseElement::WordGap)],
            out.as_slice()
        );
    }

    #[test]
    fn test_idle_flush_once() {
        let mut dec = MorseDecoder::new(SpeedMode::Fixed { wpm: 20.0 }, DecoderTiming::default());
        let keying = text_to_keying("K", 20.0, 0.0);
        for evt in &keying {
            dec.input(*evt);
        }
        let last_up = keying[keying.len() - 1].time;

        // the last dah waits out the minimum gap
        assert!(dec.poll(last_up + 0.005).is_empty());
        assert_eq!(
            &[DecodedOutput::Element(MorseElement::Dah)],
            dec.poll(last_up + 0.1).as_slice()
        );

        // five units is 300 ms
        assert!(dec.poll(last_up + 0.29).is_empty());
        assert_eq!(
            &[DecodedOutput::Character(Character::Known("K"))],
            dec.poll(last_up + 0.31).as_slice()
        );

        let mut count = 0;
        for i in 0..100 {
            if !dec.poll(last_up + 0.32 + i as f64 * 0.01).is_empty() {
                count += 1;
            }
        }
        assert_eq!(0, count);
        assert!(dec.flush().is_empty());
    }

    #[test]
    fn test_no_flush_while_key_down() {
        let mut dec = MorseDecoder::new(SpeedMode::Fixed { wpm: 20.0 }, DecoderTiming::default());
        dec.input(KeyEvent::down(0.0));
        dec.input(KeyEvent::up(0.06));
        dec.input(KeyEvent::down(0.12));
        assert!(dec.poll(10.0).is_empty());
    }

    #[test]
    fn test_adaptive_convergence() {
        let mut dec = MorseDecoder::new(SpeedMode::default(), DecoderTiming::default());
        assert_approx_eq!(20.0f32, dec.wpm(), 1.0e-3);

        let keying = text_to_keying("PARIS PARIS PARIS PARIS", 16.0, 0.5);
        assert_eq!("PARIS PARIS PARIS PARIS", decode(&mut dec, &keying));
        assert_approx_eq!(16.0f32, dec.wpm(), 0.1);

        // and back up
        let keying = text_to_keying("PARIS PARIS", 18.0, 100.0);
        assert_eq!(" PARIS PARIS", decode(&mut dec, &keying));
        assert_approx_eq!(18.0f32, dec.wpm(), 0.2);
    }

    #[test]
    fn test_adaptive_bounds() {
        let speed = SpeedMode::Adaptive {
            initial_wpm: 20.0,
            min_wpm: 15.0,
            max_wpm: 25.0,
        };
        let (lo, hi) = speed.unit_bounds();
        assert_approx_eq!(unit_duration(25.0), lo);
        assert_approx_eq!(unit_duration(15.0), hi);

        // too slow to count
        let mut dec = MorseDecoder::new(speed, DecoderTiming::default());
        decode(&mut dec, &text_to_keying("TTTTTTTT", 5.0, 0.0));
        assert_approx_eq!(20.0f32, dec.wpm(), 1.0e-3);

        // slow, but within bounds, is clamped
        for (i, wpm) in [14.0f32, 15.5, 30.0, 24.0].iter().enumerate() {
            decode(
                &mut dec,
                &text_to_keying("TEST TEST", *wpm, 100.0 * (i + 1) as f64),
            );
            assert!(dec.unit() >= lo && dec.unit() <= hi);
        }
    }

    #[test]
    fn test_unknown_and_overflow() {
        let mut dec = MorseDecoder::new(SpeedMode::Fixed { wpm: 20.0 }, DecoderTiming::default());
        let mut time = 0.0;
        for _i in 0..20 {
            dec.input(KeyEvent::down(time));
            dec.input(KeyEvent::up(time + 0.06));
            time += 0.12;
        }
        assert_eq!(MAX_PATTERN, dec.pending().len());
        match dec.flush().last() {
            Some(DecodedOutput::Character(Character::Unknown(pattern))) => {
                assert_eq!(".".repeat(MAX_PATTERN), pattern.as_str())
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_reset() {
        let mut dec = MorseDecoder::new(SpeedMode::default(), DecoderTiming::default());
        decode(&mut dec, &text_to_keying("PARIS PARIS", 16.0, 0.0));
        dec.input(KeyEvent::down(50.0));
        dec.input(KeyEvent::up(50.075));
        assert_eq!(".", dec.pending().as_str());

        dec.reset();
        assert_eq!("", dec.pending().as_str());
        assert!(dec.flush().is_empty());
        assert_approx_eq!(20.0f32, dec.wpm(), 1.0e-3);

        // time may restart
        dec.input(KeyEvent::down(0.0));
        dec.input(KeyEvent::up(0.06));
        assert_eq!(".", dec.pending().as_str());
    }

    #[test]
    #[should_panic]
    fn test_out_of_order() {
        let mut dec = MorseDecoder::new(SpeedMode::default(), DecoderTiming::default());
        dec.input(KeyEvent::down(1.0));
        dec.input(KeyEvent::up(0.5));
    }

    const MAX_PATTERN: usize = crate::morse::MAX_PATTERN_LENGTH;
}
