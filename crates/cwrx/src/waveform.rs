//! Morse timing parameters and test waveforms

/// Length of a dit at one word per minute (s)
///
/// Speeds are measured with the word "PARIS," which is fifty
/// units long including its trailing word gap.
pub const UNIT_SECONDS_AT_1_WPM: f64 = 1.2;

/// Duration of one Morse unit at the given speed (s)
pub fn unit_duration(wpm: f32) -> f64 {
    UNIT_SECONDS_AT_1_WPM / f64::max(wpm as f64, f64::MIN_POSITIVE)
}

/// Speed which has the given unit duration (WPM)
pub fn wpm_from_unit(unit: f64) -> f32 {
    (UNIT_SECONDS_AT_1_WPM / f64::max(unit, f64::MIN_POSITIVE)) as f32
}

/// Ideal keying for `text` at `wpm`, starting at `start` seconds
///
/// Words are separated by whitespace. Within a word, prosigns
/// may be written in angle brackets, like `<SK>`. Returns
/// alternating key-down and key-up events with exact timing:
/// dits of one unit, dahs of three, and gaps of one, three,
/// and seven units.
#[cfg(test)]
pub fn text_to_keying(text: &str, wpm: f32, start: f64) -> Vec<crate::keying::KeyEvent> {
    use crate::keying::KeyEvent;

    let unit = unit_duration(wpm);
    let mut out = vec![];
    let mut time = start;

    for (w, word) in text.split_whitespace().enumerate() {
        if w > 0 {
            time += 7.0 * unit;
        }

        for (c, token) in word_tokens(word).iter().enumerate() {
            if c > 0 {
                time += 3.0 * unit;
            }

            let pattern = crate::morse::pattern_for(token).expect("no pattern for token");
            for (s, sym) in pattern.chars().enumerate() {
                if s > 0 {
                    time += unit;
                }
                out.push(KeyEvent::down(time));
                time += if sym == '-' { 3.0 * unit } else { unit };
                out.push(KeyEvent::up(time));
            }
        }
    }

    out
}

/// Split a word into characters and `<XX>` prosigns
#[cfg(test)]
fn word_tokens(word: &str) -> Vec<String> {
    let mut out: Vec<String> = vec![];
    let mut in_prosign = false;
    for c in word.chars() {
        if in_prosign {
            if let Some(last) = out.last_mut() {
                last.push(c);
            }
            in_prosign = c != '>';
        } else {
            out.push(c.to_string());
            in_prosign = c == '<';
        }
    }
    out
}

/// Add a keyed sinusoid to `audio`
///
/// The tone is on between each key-down and the following
/// key-up. Its phase is continuous with sample zero of
/// `audio`.
#[cfg(test)]
pub fn modulate_cw(
    audio: &mut [f32],
    keying: &[crate::keying::KeyEvent],
    frequency: f32,
    amplitude: f32,
    fs: u32,
) {
    let mut down: Option<usize> = None;
    for evt in keying {
        let idx = f64::round(evt.time * fs as f64) as usize;
        match (evt.key_down, down) {
            (true, None) => down = Some(idx),
            (false, Some(start)) => {
                add_tone(audio, start, idx, frequency, amplitude, fs);
                down = None;
            }
            _ => {}
        }
    }
}

/// Add a sinusoid to `audio[start..end]`, with phase continuous from sample zero
#[cfg(test)]
pub fn add_tone(
    audio: &mut [f32],
    start: usize,
    end: usize,
    frequency: f32,
    amplitude: f32,
    fs: u32,
) {
    let end = usize::min(end, audio.len());
    let w = 2.0f64 * std::f64::consts::PI * frequency as f64 / fs as f64;
    for (i, sa) in audio
        .iter_mut()
        .enumerate()
        .take(end)
        .skip(start)
    {
        *sa += amplitude * f64::sin(w * i as f64) as f32;
    }
}

/// Seconds needed to send `keying`, plus `tail`
#[cfg(test)]
pub fn keying_end(keying: &[crate::keying::KeyEvent], tail: f64) -> f64 {
    keying.last().map(|evt| evt.time).unwrap_or(0.0) + tail
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_unit_duration() {
        assert_approx_eq!(0.06f64, unit_duration(20.0));
        assert_approx_eq!(20.0f32, wpm_from_unit(0.06));
        assert!(unit_duration(0.0).is_finite());
    }

    #[test]
    fn test_text_to_keying() {
        // "A" is dit dah; "E" is dit
        let keying = text_to_keying("A E", 20.0, 1.0);
        assert_eq!(6, keying.len());
        assert!(keying[0].key_down);
        assert_approx_eq!(1.0f64, keying[0].time);
        assert_approx_eq!(1.06f64, keying[1].time);
        assert_approx_eq!(1.12f64, keying[2].time);
        assert_approx_eq!(1.30f64, keying[3].time);
        assert_approx_eq!(1.72f64, keying[4].time);
        assert_approx_eq!(1.78f64, keying[5].time);

        assert_eq!(vec!["<SK>", "K"], word_tokens("<SK>K"));
        assert_eq!(6, text_to_keying("<SK>", 20.0, 0.0).len() / 2);
    }

    #[test]
    fn test_modulate_cw() {
        let keying = text_to_keying("E", 20.0, 0.01);
        let mut audio = vec![0.0f32; 800];
        modulate_cw(&mut audio, &keying, 700.0, 0.5, 8000);

        // on for exactly 480 samples
        assert!(audio[0..80].iter().all(|s| *s == 0.0));
        assert!(audio[560..].iter().all(|s| *s == 0.0));
        let peak = audio.iter().fold(0.0f32, |a, s| f32::max(a, s.abs()));
        assert_approx_eq!(0.5f32, peak, 0.01);
    }
}
