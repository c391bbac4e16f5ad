//! Conversation turns
//!
//! A CW contact alternates between two stations. The
//! [`TurnTracker`] groups decoded text into
//! [`ConversationTurn`]s and guesses who sent each one.
//!
//! A turn ends when the sender hands over with a prosign like
//! `K` or `<BK>`, when the tone moves to another frequency, or
//! when the band goes quiet for long enough.

use std::fmt;

#[cfg(not(test))]
use log::info;

#[cfg(test)]
use std::println as info;

use crate::output::DecodedOutput;

/// Words which end a turn, by default
///
/// `DE` is not included: it is part of every call.
pub const DEFAULT_TURN_PROSIGNS: &[&str] = &["K", "KN", "BK", "SK", "<SK>", "<BK>"];

/// Which station sent a turn
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Speaker {
    /// Our own station
    Local,

    /// The other station
    Remote,
}

impl Speaker {
    /// The other station
    pub fn other(&self) -> Self {
        match self {
            Speaker::Local => Speaker::Remote,
            Speaker::Remote => Speaker::Local,
        }
    }

    fn index(&self) -> usize {
        match self {
            Speaker::Local => 0,
            Speaker::Remote => 1,
        }
    }
}

/// One station's turn in a conversation
#[derive(Clone, Debug, PartialEq)]
pub struct ConversationTurn {
    /// Who sent it
    pub speaker: Speaker,

    /// Time of the first character (s)
    pub start: f64,

    /// Time of the last character (s)
    ///
    /// `None` while the turn is still open.
    pub end: Option<f64>,

    /// Tone frequency at the start of the turn (Hz)
    ///
    /// `None` if the receiver was not locked to a tone.
    pub frequency: Option<f32>,

    /// Decoded text
    ///
    /// Words are separated by single spaces. There is no
    /// leading or trailing whitespace.
    pub text: String,
}

impl ConversationTurn {
    /// True if the turn has closed
    pub fn is_closed(&self) -> bool {
        self.end.is_some()
    }
}

impl fmt::Display for ConversationTurn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {:.2}–", self.speaker, self.start)?;
        if let Some(end) = self.end {
            write!(f, "{:.2}", end)?;
        }
        f.write_str(" s")?;
        if let Some(freq) = self.frequency {
            write!(f, " @ {:.0} Hz", freq)?;
        }
        write!(f, "] {}", self.text)
    }
}

/// Groups decoded output into conversation turns
///
/// Feed every decoder output to [`push()`](#method.push),
/// along with the locked tone frequency, and call
/// [`tick()`](#method.tick) periodically. Both methods return
/// a turn when it closes. Closed turns are also kept in the
/// [`history()`](#method.history).
#[derive(Clone, Debug)]
pub struct TurnTracker {
    // words which end a turn
    prosigns: Vec<String>,

    // frequency difference which starts a new turn (Hz)
    tolerance: f32,

    // silence which ends a turn (s)
    idle_timeout: f64,

    // speaker of the very first turn
    first_speaker: Speaker,

    // closed turns, oldest first
    history: Vec<ConversationTurn>,

    // open turn, if any
    open: Option<ConversationTurn>,

    // current word of the open turn
    word: String,

    // a space is owed before the next character
    pending_space: bool,

    // time of the last character
    last_output: f64,

    // speaker of the last closed turn
    last_speaker: Option<Speaker>,

    // the last turn ended with a prosign
    handed_over: bool,

    // last known frequency of each speaker
    speaker_frequency: [Option<f32>; 2],
}

impl TurnTracker {
    /// Create tracker
    ///
    /// A turn ends with any word in `prosigns`, a frequency
    /// change of more than `tolerance` Hz, or more than
    /// `idle_timeout` seconds without a character. The first
    /// turn is attributed to `first_speaker`.
    pub fn new<I, S>(
        prosigns: I,
        tolerance: f32,
        idle_timeout: f64,
        first_speaker: Speaker,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            prosigns: prosigns
                .into_iter()
                .map(|p| p.as_ref().trim().to_ascii_uppercase())
                .filter(|p| !p.is_empty())
                .collect(),
            tolerance: f32::max(tolerance, 0.0),
            idle_timeout,
            first_speaker,
            history: vec![],
            open: None,
            word: String::new(),
            pending_space: false,
            last_output: 0.0,
            last_speaker: None,
            handed_over: false,
            speaker_frequency: [None; 2],
        }
    }

    /// Process one decoder output
    ///
    /// `time` is when the output was decoded, and `frequency`
    /// is the locked tone frequency at that time, if any.
    /// Returns the turn which this output closed, if any.
    pub fn push(
        &mut self,
        output: &DecodedOutput,
        time: f64,
        frequency: Option<f32>,
    ) -> Option<ConversationTurn> {
        match output {
            DecodedOutput::Element(_) => None,
            DecodedOutput::WordSpace => self.word_space(),
            DecodedOutput::Character(c) => {
                let closed = self.check_frequency(frequency);
                if self.open.is_none() {
                    self.open_turn(time, frequency);
                }

                let txt = c.to_string();
                if let Some(turn) = &mut self.open {
                    if self.pending_space && !turn.text.is_empty() {
                        turn.text.push(' ');
                    }
                    turn.text.push_str(&txt);
                }
                self.pending_space = false;
                self.word.push_str(&txt);
                self.last_output = time;
                closed
            }
        }
    }

    /// Close the open turn if it has been idle too long
    ///
    /// A turn is idle when no character has been decoded for
    /// more than the idle timeout.
    pub fn tick(&mut self, now: f64) -> Option<ConversationTurn> {
        if self.open.is_some() && now - self.last_output > self.idle_timeout {
            self.close_turn("idle")
        } else {
            None
        }
    }

    /// Close the open turn, if any
    pub fn close(&mut self) -> Option<ConversationTurn> {
        self.close_turn("closed")
    }

    /// Closed turns, oldest first
    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    /// The open turn, if any
    pub fn current(&self) -> Option<&ConversationTurn> {
        self.open.as_ref()
    }

    /// Words which end a turn
    pub fn prosigns(&self) -> &[String] {
        &self.prosigns
    }

    // a word just ended
    fn word_space(&mut self) -> Option<ConversationTurn> {
        if self.open.is_none() {
            return None;
        }

        if self.prosigns.iter().any(|p| *p == self.word) {
            return self.close_turn("prosign");
        }

        if !self.word.is_empty() {
            self.pending_space = true;
        }
        self.word.clear();
        None
    }

    // close the open turn if the tone has moved
    fn check_frequency(&mut self, frequency: Option<f32>) -> Option<ConversationTurn> {
        let now = frequency?;
        let (speaker, opening) = self.open.as_ref().map(|t| (t.speaker, t.frequency))?;
        match opening {
            Some(freq) if f32::abs(freq - now) > self.tolerance => self.close_turn("frequency"),
            Some(_) => None,
            None => {
                if let Some(turn) = &mut self.open {
                    turn.frequency = Some(now);
                }
                self.speaker_frequency[speaker.index()] = Some(now);
                None
            }
        }
    }

    fn open_turn(&mut self, time: f64, frequency: Option<f32>) {
        let speaker = self.attribute(frequency);
        if frequency.is_some() {
            self.speaker_frequency[speaker.index()] = frequency;
        }

        self.word.clear();
        self.pending_space = false;
        self.open = Some(ConversationTurn {
            speaker,
            start: time,
            end: None,
            frequency,
            text: String::new(),
        });
    }

    // pick the speaker of a new turn
    //
    // A prosign always hands over. Otherwise, the previous
    // speaker keeps going only if the tone is still theirs.
    fn attribute(&self, frequency: Option<f32>) -> Speaker {
        let prev = match self.last_speaker {
            Some(prev) => prev,
            None => return self.first_speaker,
        };
        let alt = prev.other();
        if self.handed_over {
            return alt;
        }

        let near = |speaker: Speaker| match (frequency, self.speaker_frequency[speaker.index()]) {
            (Some(now), Some(known)) => f32::abs(now - known) <= self.tolerance,
            _ => false,
        };

        if near(prev) && !near(alt) {
            prev
        } else {
            alt
        }
    }

    fn close_turn(&mut self, reason: &str) -> Option<ConversationTurn> {
        let mut turn = self.open.take()?;
        turn.end = Some(self.last_output);
        self.word.clear();
        self.pending_space = false;
        self.last_speaker = Some(turn.speaker);
        self.handed_over = reason == "prosign";

        info!("turns: {} ({})", turn, reason);
        self.history.push(turn.clone());
        Some(turn)
    }
}

impl Default for TurnTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TURN_PROSIGNS, 50.0, 5.0, Speaker::Remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::str::FromStr;

    use assert_approx_eq::assert_approx_eq;

    use crate::morse::{self, Character};
    use crate::output::MorseElement;

    // send text as decoder output, one character every 0.1 s
    fn send(
        trk: &mut TurnTracker,
        text: &str,
        start: f64,
        frequency: Option<f32>,
    ) -> (f64, Vec<ConversationTurn>) {
        let mut closed = vec![];
        let mut time = start;
        for (i, word) in text.split(' ').enumerate() {
            if i > 0 {
                closed.extend(trk.push(&DecodedOutput::WordSpace, time, frequency));
            }
            for c in word.chars() {
                let pattern = morse::pattern_for(c.to_string()).expect("bad test char");
                let out = DecodedOutput::Character(morse::lookup(pattern));
                closed.extend(trk.push(&DecodedOutput::Element(MorseElement::Dit), time, frequency));
                closed.extend(trk.push(&out, time, frequency));
                time += 0.1;
            }
        }
        (time, closed)
    }

    #[test]
    fn test_speaker() {
        assert_eq!(Speaker::Local, Speaker::Remote.other());
        assert_eq!("remote", Speaker::Remote.to_string());
        assert_eq!(Speaker::Local, Speaker::from_str("LOCAL").expect("parse"));
    }

    #[test]
    fn test_two_station_exchange() {
        let mut trk = TurnTracker::default();

        // nothing opens a turn but a character
        assert_eq!(None, trk.push(&DecodedOutput::WordSpace, 0.5, Some(700.0)));
        assert!(trk.current().is_none());

        let (time, closed) = send(&mut trk, "CQ DE W1AW K", 1.0, Some(700.0));
        assert!(closed.is_empty());
        assert_eq!("CQ DE W1AW K", trk.current().expect("open").text);

        // the word space after K hands over
        let closed = trk
            .push(&DecodedOutput::WordSpace, time + 2.0, Some(900.0))
            .expect("no close");
        assert_eq!(Speaker::Remote, closed.speaker);
        assert_eq!("CQ DE W1AW K", closed.text);
        assert_approx_eq!(1.0f64, closed.start);
        assert_approx_eq!(time - 0.1, closed.end.expect("end"));
        assert_eq!(Some(700.0), closed.frequency);

        let (time, _) = send(&mut trk, "W1AW DE K1ABC K", time + 2.0, Some(900.0));
        let closed = trk
            .push(&DecodedOutput::WordSpace, time, Some(900.0))
            .expect("no close");
        assert_eq!(Speaker::Local, closed.speaker);
        assert_eq!("W1AW DE K1ABC K", closed.text);

        // back on the first station's frequency
        let (time, _) = send(&mut trk, "R R", time + 1.0, Some(710.0));
        assert_eq!(Speaker::Remote, trk.current().expect("open").speaker);
        assert_eq!(None, trk.tick(time + 4.0));

        // idle
        let closed = trk.tick(time + 5.1).expect("no close");
        assert_eq!("R R", closed.text);
        assert!(closed.is_closed());

        assert_eq!(3, trk.history().len());
        assert_eq!(
            "[remote 1.00–1.80 s @ 700 Hz] CQ DE W1AW K",
            trk.history()[0].to_string()
        );
    }

    #[test]
    fn test_frequency_change() {
        let mut trk = TurnTracker::default();
        send(&mut trk, "CQ CQ", 0.0, Some(700.0));

        // small drift is tolerated
        let (time, closed) = send(&mut trk, " DE", 1.0, Some(740.0));
        assert!(closed.is_empty());

        // a new station; the first character opens the next turn
        let (_, closed) = send(&mut trk, "QRL", time + 0.5, Some(850.0));
        assert_eq!(1, closed.len());
        assert_eq!("CQ CQ DE", closed[0].text);
        assert_approx_eq!(time - 0.1, closed[0].end.expect("end"));

        let open = trk.current().expect("open");
        assert_eq!("QRL", open.text);
        assert_eq!(Speaker::Local, open.speaker);
        assert_eq!(Some(850.0), open.frequency);
    }

    #[test]
    fn test_prosign_hands_over_on_same_frequency() {
        let mut trk = TurnTracker::default();

        // both stations at zero beat
        send(&mut trk, "K", 0.0, Some(700.0));
        let closed = trk
            .push(&DecodedOutput::WordSpace, 0.5, Some(700.0))
            .expect("prosign closes");
        assert_eq!(Speaker::Remote, closed.speaker);

        send(&mut trk, "R", 1.0, Some(700.0));
        let closed = trk.close().expect("open");
        assert_eq!("R", closed.text);
        assert_eq!(Speaker::Local, closed.speaker);
    }

    #[test]
    fn test_idle_keeps_speaker_on_own_frequency() {
        let mut trk = TurnTracker::default();
        send(&mut trk, "CQ K", 0.0, Some(700.0));
        trk.push(&DecodedOutput::WordSpace, 0.5, Some(700.0));
        send(&mut trk, "QRZ", 1.0, Some(900.0));
        assert_eq!(Speaker::Local, trk.current().expect("open").speaker);

        // no prosign: the station on 900 Hz keeps sending
        trk.tick(100.0).expect("idle closes");
        send(&mut trk, "QRZ", 101.0, Some(900.0));
        assert_eq!(Speaker::Local, trk.current().expect("open").speaker);
    }

    #[test]
    fn test_unlocked_turn_adopts_frequency() {
        let mut trk = TurnTracker::default();
        send(&mut trk, "TE", 0.0, None);
        assert_eq!(None, trk.current().expect("open").frequency);
        send(&mut trk, "ST", 0.2, Some(600.0));
        assert_eq!(Some(600.0), trk.current().expect("open").frequency);
        assert_eq!("TEST", trk.current().expect("open").text);
    }

    #[test]
    fn test_idle_ignores_word_space() {
        let mut trk = TurnTracker::default();
        let (time, _) = send(&mut trk, "QRZ", 0.0, Some(700.0));
        assert_eq!(None, trk.push(&DecodedOutput::WordSpace, time + 4.0, Some(700.0)));
        assert_eq!(None, trk.tick(time + 4.5));

        let closed = trk.tick(time + 5.0).expect("no close");
        assert_eq!("QRZ", closed.text);
        assert_eq!(None, trk.tick(time + 100.0));
        assert_eq!(None, trk.close());
    }

    #[test]
    fn test_custom_prosigns() {
        let mut trk = TurnTracker::new(["de", " ar "], 50.0, 5.0, Speaker::Local);
        assert_eq!(&["DE".to_owned(), "AR".to_owned()], trk.prosigns());

        let (time, closed) = send(&mut trk, "W1AW DE", 0.0, Some(700.0));
        assert!(closed.is_empty());
        let closed = trk
            .push(&DecodedOutput::WordSpace, time, Some(700.0))
            .expect("no close");
        assert_eq!(Speaker::Local, closed.speaker);
        assert_eq!("W1AW DE", closed.text);

        // "K" is not a prosign here
        let (time, _) = send(&mut trk, "K", time + 1.0, Some(700.0));
        assert_eq!(None, trk.push(&DecodedOutput::WordSpace, time, Some(700.0)));

        let closed = trk.close().expect("no close");
        assert_eq!("K", closed.text);
        assert_eq!(2, trk.history().len());
    }

    #[test]
    fn test_prosign_characters() {
        let mut trk = TurnTracker::default();
        trk.push(
            &DecodedOutput::Character(Character::Known("7")),
            0.0,
            Some(700.0),
        );
        trk.push(
            &DecodedOutput::Character(Character::Known("3")),
            0.1,
            Some(700.0),
        );
        trk.push(&DecodedOutput::WordSpace, 0.2, Some(700.0));
        trk.push(
            &DecodedOutput::Character(Character::Known("<SK>")),
            0.3,
            Some(700.0),
        );
        let closed = trk
            .push(&DecodedOutput::WordSpace, 0.4, Some(700.0))
            .expect("no close");
        assert_eq!("73 <SK>", closed.text);
    }
}
