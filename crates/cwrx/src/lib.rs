//! # cwrx: Morse Code (CW) Reception
//!
//! This crate provides a real-time receiver and decoder for
//! [Morse code](https://en.wikipedia.org/wiki/Morse_code) sent as
//! on-off keyed audio tones, which radio amateurs call *CW*. It
//! finds the tone, follows the key, decodes the text, and groups
//! the text of a two-way contact into conversation turns.
//!
//! ## Example
//!
//! You will first need audio from a receiver tuned to a CW
//! signal: a "line out" jack, a soundcard, or a software-defined
//! radio. Obtaining the audio is beyond the scope of this crate.
//! Mix stereo audio to mono and scale it to about `[-1.0, 1.0]`.
//!
//! ```
//! use cwrx::{CwReceiverBuilder, DecodedOutput};
//!
//! # let some_audio_source_iterator = || std::iter::repeat(0.0f32).take(800);
//! #
//! // create a CwReceiver with your audio sampling rate
//! let mut rx = CwReceiverBuilder::new(8000)
//!     .with_block_size(80)                 // 10 ms blocks, 100 Hz resolution
//!     .with_scan_range(400.0, 1000.0, 50.0) // look for a tone in this range
//!     .with_adaptive_wpm(20.0, 5.0, 60.0)  // follow the sender's speed
//!     .build();
//!
//! // let audiosrc be an iterator which outputs audio samples
//! // in f32 format at the sampling rate (here 8000 Hz)
//! let audiosrc = some_audio_source_iterator();
//! for evt in rx.iter(audiosrc) {
//!     match evt.decoded() {
//!         Some(DecodedOutput::Character(c)) => print!("{}", c),
//!         Some(DecodedOutput::WordSpace) => print!(" "),
//!         _ => {}
//!     }
//! }
//!
//! // at the end of the input, emit anything still pending
//! for evt in rx.flush() {
//!     if let Some(turn) = evt.turn() {
//!         println!("\n{}", turn);
//!     }
//! }
//! ```
//!
//! The receiver is created via a
//! [builder](struct.CwReceiverBuilder.html).
//!
//! The [`CwReceiver`](struct.CwReceiver.html) binds by iterator to
//! any source of `f32` PCM mono (1-channel) audio samples. If you
//! would rather manage the clock yourself, pass it
//! [`AudioBlock`](struct.AudioBlock.html)s with
//! [`process()`](struct.CwReceiver.html#method.process) instead.
//!
//! The receiver reports [events](struct.CwReceiverEvent.html) at
//! three layers:
//!
//! * signal: frequency lock and key transitions;
//! * decoding: Morse elements, characters, and word spaces; and
//! * conversation: closed [turns](struct.ConversationTurn.html).
//!
//! A [telemetry](struct.CwReceiver.html#method.telemetry) snapshot
//! reports the locked frequency and the estimated sending speed.
//!
//! ## Background
//!
//! A Morse *unit* is the length of one dit. A dah is three
//! units long. The silences between the elements of a character,
//! between characters, and between words are one, three, and
//! seven units long. Speed is given in words per minute (WPM), as
//! measured by the fifty-unit word "PARIS". One unit lasts
//! `1.2 / WPM` seconds.
//!
//! Hand-sent Morse is rarely this precise. The decoder
//! classifies each tone and gap against its running estimate of
//! the unit, and updates that estimate as it goes.
//!
//! Operators end a transmission with a *prosign* such as `K`
//! ("go ahead") or `<SK>` (end of contact). The receiver uses
//! these, and changes in the tone frequency, to tell the two
//! sides of a contact apart.

mod builder;
mod decoder;
mod goertzel;
mod keying;
mod level;
mod morse;
mod output;
mod receiver;
mod tracker;
mod turns;
mod waveform;

pub use builder::CwReceiverBuilder;
pub use decoder::{
    classify_gap, classify_tone, DecoderOut, DecoderTiming, MorseDecoder, SpeedMode,
};
pub use goertzel::{goertzel_magnitude, HammingWindow, ToneFilter};
pub use keying::{key_thresholds, KeyDetector, KeyEvent, MIN_HYSTERESIS};
pub use level::{NoiseFloor, PeakTracker};
pub use morse::{lookup, pattern_for, Character, Pattern, MAX_PATTERN_LENGTH};
pub use output::{
    CwEventType, CwReceiverEvent, DecodedOutput, MorseElement, SignalState, Telemetry,
};
pub use receiver::{AudioBlock, BlockError, BlockEvents, CwReceiver, SourceIter, MAX_BLOCK_EVENTS};
pub use tracker::{FrequencyLock, FrequencyTracker, LockChange, TrackerOut, TrackingMode};
pub use turns::{ConversationTurn, Speaker, TurnTracker, DEFAULT_TURN_PROSIGNS};
pub use waveform::{unit_duration, wpm_from_unit, UNIT_SECONDS_AT_1_WPM};
