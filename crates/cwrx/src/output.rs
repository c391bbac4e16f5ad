//! Receiver events and telemetry

use std::fmt;

use crate::morse::Character;
use crate::tracker::FrequencyLock;
use crate::turns::ConversationTurn;

/// Receiver event
///
/// The CW receiver reports events at three layers:
///
/// 1. **Signal**: the frequency tracker acquires or drops its
///    lock on a tone, and the key detector reports key-down
///    and key-up transitions.
///
/// 2. **Decoding**: key timings are classified into Morse
///    elements, characters, and word spaces.
///
/// 3. **Conversation**: decoded text is grouped into
///    [turns](ConversationTurn). A turn event is reported
///    once, when the turn closes.
///
/// The [`what()`](CwReceiverEvent::what) method returns the
/// event. Use [`decoded()`](CwReceiverEvent::decoded) or
/// [`turn()`](CwReceiverEvent::turn) to pick out the
/// events that most clients want.
#[derive(Clone, Debug, PartialEq)]
pub struct CwReceiverEvent {
    what: CwEventType,
    time: f64,
}

impl CwReceiverEvent {
    /// Create from event and time
    pub(crate) fn new<E>(what: E, time: f64) -> Self
    where
        E: Into<CwEventType>,
    {
        Self {
            what: what.into(),
            time,
        }
    }

    /// The event which triggered the output
    pub fn what(&self) -> &CwEventType {
        &self.what
    }

    /// Event time (s)
    ///
    /// For key transitions, this is the time of the transition.
    /// For all other events, it is the time at which the
    /// receiver became aware of the event. All times are on
    /// the clock of the input [`AudioBlock`](crate::AudioBlock)s.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Decoded output, if any
    pub fn decoded(&self) -> Option<&DecodedOutput> {
        match self.what() {
            CwEventType::Decoded(out) => Some(out),
            _ => None,
        }
    }

    /// Closed conversation turn, if any
    pub fn turn(&self) -> Option<&ConversationTurn> {
        match self.what() {
            CwEventType::Turn(turn) => Some(turn),
            _ => None,
        }
    }

    /// Consume event, returning the closed turn, if any
    pub fn into_turn(self) -> Option<ConversationTurn> {
        match self.what {
            CwEventType::Turn(turn) => Some(turn),
            _ => None,
        }
    }
}

impl fmt::Display for CwReceiverEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>10.3}]: event {}", self.time, self.what())
    }
}

impl From<CwReceiverEvent> for Option<ConversationTurn> {
    fn from(rx: CwReceiverEvent) -> Self {
        rx.into_turn()
    }
}

/// Type of event
///
/// See [`CwReceiverEvent`]
#[derive(Clone, Debug, PartialEq)]
pub enum CwEventType {
    /// Signal events: lock and key state
    Signal(SignalState),

    /// Decoder output
    Decoded(DecodedOutput),

    /// A conversation turn has closed
    Turn(ConversationTurn),
}

impl From<SignalState> for CwEventType {
    fn from(inp: SignalState) -> Self {
        Self::Signal(inp)
    }
}

impl From<DecodedOutput> for CwEventType {
    fn from(inp: DecodedOutput) -> Self {
        Self::Decoded(inp)
    }
}

impl From<ConversationTurn> for CwEventType {
    fn from(inp: ConversationTurn) -> Self {
        Self::Turn(inp)
    }
}

impl AsRef<str> for CwEventType {
    fn as_ref(&self) -> &str {
        match self {
            CwEventType::Signal(_) => "signal",
            CwEventType::Decoded(_) => "decoded",
            CwEventType::Turn(_) => "turn",
        }
    }
}

impl fmt::Display for CwEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CwEventType::Signal(evt) => write!(f, "[{}]: {}", self.as_ref(), evt),
            CwEventType::Decoded(evt) => write!(f, "[{}]: \"{}\"", self.as_ref(), evt),
            CwEventType::Turn(evt) => write!(f, "[{}]: {}", self.as_ref(), evt),
        }
    }
}

/// Signal state changes
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SignalState {
    /// Locked to a tone
    ///
    /// Key events will follow for this tone only.
    Locked(FrequencyLock),

    /// Lost the tone
    ///
    /// The tone has been absent for longer than the lock
    /// timeout. The receiver resumes scanning.
    Unlocked,

    /// Key down: the tone is on
    KeyDown,

    /// Key up: the tone is off
    KeyUp,
}

impl fmt::Display for SignalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalState::Locked(lock) => write!(
                f,
                "locked to {:.1} Hz (confidence {:.2})",
                lock.frequency, lock.confidence
            ),
            SignalState::Unlocked => write!(f, "unlocked"),
            SignalState::KeyDown => write!(f, "key down"),
            SignalState::KeyUp => write!(f, "key up"),
        }
    }
}

/// Morse timing element
///
/// Tones are classified as dits or dahs. The silences between
/// them are classified by length: the gap between the elements
/// of one character, between characters, or between words.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::IntoStaticStr,
    strum_macros::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum MorseElement {
    /// Short tone: one unit
    Dit,

    /// Long tone: three units
    Dah,

    /// Silence within a character: one unit
    ElementGap,

    /// Silence between characters: three units
    CharGap,

    /// Silence between words: seven units
    WordGap,
}

impl MorseElement {
    /// True for a tone; false for a silence
    pub fn is_tone(&self) -> bool {
        matches!(self, MorseElement::Dit | MorseElement::Dah)
    }

    /// Pattern symbol for a tone
    ///
    /// `'.'` for a dit and `'-'` for a dah. `None` for gaps.
    pub fn symbol(&self) -> Option<char> {
        match self {
            MorseElement::Dit => Some('.'),
            MorseElement::Dah => Some('-'),
            _ => None,
        }
    }
}

/// Morse decoder output
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DecodedOutput {
    /// A complete character
    Character(Character),

    /// A word break
    ///
    /// Never repeated without an intervening character.
    WordSpace,

    /// A classified timing element
    Element(MorseElement),
}

impl DecodedOutput {
    /// True if this output carries text
    ///
    /// Characters and word spaces are text. Timing elements
    /// are not.
    pub fn is_text(&self) -> bool {
        !matches!(self, DecodedOutput::Element(_))
    }
}

impl From<Character> for DecodedOutput {
    fn from(inp: Character) -> Self {
        Self::Character(inp)
    }
}

impl From<MorseElement> for DecodedOutput {
    fn from(inp: MorseElement) -> Self {
        Self::Element(inp)
    }
}

impl fmt::Display for DecodedOutput {
    /// Displays text: characters as themselves, word spaces
    /// as `' '`. Elements display their name.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedOutput::Character(c) => c.fmt(f),
            DecodedOutput::WordSpace => f.write_str(" "),
            DecodedOutput::Element(e) => write!(f, "<{}>", e),
        }
    }
}

/// Receiver status snapshot
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Telemetry {
    /// True if locked to a tone
    pub locked: bool,

    /// Locked frequency (Hz), if locked
    pub frequency: Option<f32>,

    /// Lock confidence, from `0.0` to `1.0`
    ///
    /// Zero if not locked.
    pub confidence: f32,

    /// Current speed estimate (WPM)
    pub wpm: f32,

    /// True during the initial calibration window
    pub calibrating: bool,

    /// True if the key is down
    pub key_down: bool,
}

impl fmt::Display for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.calibrating {
            return write!(f, "calibrating");
        }

        match self.frequency {
            Some(freq) => write!(
                f,
                "{:.1} Hz ({:.2}), {:.1} WPM, key {}",
                freq,
                self.confidence,
                self.wpm,
                if self.key_down { "down" } else { "up" }
            ),
            None => write!(f, "searching, {:.1} WPM", self.wpm),
        }
    }
}
