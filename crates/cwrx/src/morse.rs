//! # International Morse Code Table
//!
//! | Pattern   | Text | Pattern   | Text | Pattern    | Text   |
//! |-----------|------|-----------|------|------------|--------|
//! | `.-`      | `A`  | `-.--`    | `Y`  | `.-.-.-`   | `.`    |
//! | `-...`    | `B`  | `--..`    | `Z`  | `--..--`   | `,`    |
//! | `-.-.`    | `C`  | `-----`   | `0`  | `..--..`   | `?`    |
//! | `-..`     | `D`  | `.----`   | `1`  | `-..-.`    | `/`    |
//! | `.`       | `E`  | `..---`   | `2`  | `-...-`    | `=`    |
//! | `..-.`    | `F`  | `...--`   | `3`  | `.-.-.`    | `+`    |
//! | `--.`     | `G`  | `....-`   | `4`  | `-....-`   | `-`    |
//! | `....`    | `H`  | `.....`   | `5`  | `.--.-.`   | `@`    |
//! | `..`      | `I`  | `-....`   | `6`  | `-.-.--`   | `!`    |
//! | `.---`    | `J`  | `--...`   | `7`  | `.----.`   | `'`    |
//! | `-.-`     | `K`  | `---..`   | `8`  | `-.--.`    | `(`    |
//! | `.-..`    | `L`  | `----.`   | `9`  | `-.--.-`   | `)`    |
//! | `--`      | `M`  |           |      | `.-...`    | `&`    |
//! | `-.`      | `N`  |           |      | `---...`   | `:`    |
//! | `---`     | `O`  |           |      | `-.-.-.`   | `;`    |
//! | `.--.`    | `P`  |           |      | `.-..-.`   | `"`    |
//! | `--.-`    | `Q`  |           |      | `...-..-`  | `$`    |
//! | `.-.`     | `R`  |           |      | `..--.-`   | `_`    |
//! | `...`     | `S`  |           |      |            |        |
//! | `-`       | `T`  |           |      |            |        |
//! | `..-`     | `U`  |           |      |            |        |
//! | `...-`    | `V`  |           |      |            |        |
//! | `.--`     | `W`  |           |      |            |        |
//! | `-..-`    | `X`  |           |      |            |        |
//!
//! ## Prosigns
//!
//! Prosigns are sent as a single character, without the
//! usual gap between letters. Only prosigns whose run-together
//! pattern does not collide with a punctuation mark have
//! their own entry:
//!
//! | Pattern    | Text   | Meaning                 |
//! |------------|--------|-------------------------|
//! | `...-.-`   | `<SK>` | end of contact          |
//! | `-...-.-`  | `<BK>` | break, back to you      |
//! | `-.-.-`    | `<CT>` | start of transmission   |
//! | `........` | `<HH>` | error                   |
//!
//! `<KN>` is `(`, `<AR>` is `+`, and `<BT>` is `=`.

use std::fmt;

use arrayvec::ArrayString;
use phf::phf_map;

/// Longest dot/dash pattern that can be held
pub const MAX_PATTERN_LENGTH: usize = 16;

/// A dot/dash pattern, like `".-"`
pub type Pattern = ArrayString<MAX_PATTERN_LENGTH>;

/// A decoded Morse character
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Character {
    /// A character from the [code table](crate::morse)
    ///
    /// The text is usually a single letter, digit, or
    /// punctuation mark. Prosigns are rendered in angle
    /// brackets, like `<SK>`.
    Known(&'static str),

    /// A pattern that is not in the table
    ///
    /// Carries the dots (`.`) and dashes (`-`) which were
    /// received.
    Unknown(Pattern),
}

impl Character {
    /// Text of a known character
    ///
    /// `None` if the character is unknown.
    pub fn as_known(&self) -> Option<&'static str> {
        match self {
            Character::Known(txt) => Some(*txt),
            Character::Unknown(_) => None,
        }
    }

    /// True if the character is a known table entry
    pub fn is_known(&self) -> bool {
        matches!(self, Character::Known(_))
    }
}

impl fmt::Display for Character {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Character::Known(txt) => f.write_str(txt),
            Character::Unknown(pattern) => write!(f, "[{}]", pattern),
        }
    }
}

/// Lookup a dot/dash pattern
///
/// The `pattern` must match a table entry exactly. Any other
/// pattern is returned as [`Character::Unknown`], truncated
/// to [`MAX_PATTERN_LENGTH`].
pub fn lookup<S>(pattern: S) -> Character
where
    S: AsRef<str>,
{
    let pattern = pattern.as_ref();
    match CODEBOOK.get(pattern) {
        Some(txt) => Character::Known(*txt),
        None => {
            let mut unknown = Pattern::new();
            for c in pattern.chars() {
                if unknown.try_push(c).is_err() {
                    break;
                }
            }
            Character::Unknown(unknown)
        }
    }
}

/// Find the pattern for the given text
///
/// `text` is one table entry, like `"A"` or `"<SK>"`. Letters
/// may be in either case.
pub fn pattern_for<S>(text: S) -> Option<&'static str>
where
    S: AsRef<str>,
{
    let text = text.as_ref();
    CODEBOOK
        .entries()
        .find(|(_, txt)| txt.eq_ignore_ascii_case(text))
        .map(|(pattern, _)| *pattern)
}

/// Pattern to text
static CODEBOOK: phf::Map<&'static str, &'static str> = phf_map! {
    // letters
    ".-" => "A",
    "-..." => "B",
    "-.-." => "C",
    "-.." => "D",
    "." => "E",
    "..-." => "F",
    "--." => "G",
    "...." => "H",
    ".." => "I",
    ".---" => "J",
    "-.-" => "K",
    ".-.." => "L",
    "--" => "M",
    "-." => "N",
    "---" => "O",
    ".--." => "P",
    "--.-" => "Q",
    ".-." => "R",
    "..." => "S",
    "-" => "T",
    "..-" => "U",
    "...-" => "V",
    ".--" => "W",
    "-..-" => "X",
    "-.--" => "Y",
    "--.." => "Z",

    // digits
    "-----" => "0",
    ".----" => "1",
    "..---" => "2",
    "...--" => "3",
    "....-" => "4",
    "....." => "5",
    "-...." => "6",
    "--..." => "7",
    "---.." => "8",
    "----." => "9",

    // punctuation
    ".-.-.-" => ".",
    "--..--" => ",",
    "..--.." => "?",
    "-..-." => "/",
    "-...-" => "=",
    ".-.-." => "+",
    "-....-" => "-",
    ".--.-." => "@",
    "-.-.--" => "!",
    ".----." => "'",
    "-.--." => "(",
    "-.--.-" => ")",
    ".-..." => "&",
    "---..." => ":",
    "-.-.-." => ";",
    ".-..-." => "\"",
    "...-..-" => "$",
    "..--.-" => "_",

    // prosigns
    "...-.-" => "<SK>",
    "-...-.-" => "<BK>",
    "-.-.-" => "<CT>",
    "........" => "<HH>",
};
