//! # Piano Key Table
//!
//! Equal-temperament frequencies for the 88 keys of a piano and the naming used
//! for detected notes.
//!
//! Keys are indexed from A0 = 0 to C8 = 87. Names cycle through the chromatic
//! scale starting at A, and the octave number is `key / 12`, so it changes at A
//! rather than at C: key 39 (261.6 Hz, middle C) is named `C3` here.
use std::fmt;
use std::sync::LazyLock;

pub const PIANO_KEYS: usize = 88;

/// Frequency of key 0 (A0) in Hz.
pub const A0_FREQUENCY: f32 = 27.5;

const NOTE_NAMES: [&str; 12] = [
    "A", "A#", "B", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#",
];

/// `f_i = 27.5 * 2^(i/12)` for every key, computed once.
static KEY_FREQUENCIES: LazyLock<[f32; PIANO_KEYS]> = LazyLock::new(|| {
    let mut freqs = [0.0; PIANO_KEYS];
    for (i, f) in freqs.iter_mut().enumerate() {
        *f = key_frequency(i);
    }
    freqs
});

/// Frequency in Hz of the key at `key` (A0 = 0).
pub fn key_frequency(key: usize) -> f32 {
    A0_FREQUENCY * 2.0_f32.powf(key as f32 / 12.0)
}

pub fn key_frequencies() -> &'static [f32; PIANO_KEYS] {
    &KEY_FREQUENCIES
}

/// Continuous piano pitch, A4 = 49. Key `i` sits at pitch `i + 1`.
///
/// Returns negative infinity for 0 Hz.
pub fn freq_to_pitch(freq: f32) -> f32 {
    12.0 * (freq / 440.0).log2() + 49.0
}

/// Index of the key whose frequency is closest to `freq` in Hz.
///
/// Ties go to the lower key.
pub fn nearest_key(freq: f32) -> usize {
    KEY_FREQUENCIES
        .iter()
        .enumerate()
        .fold((0, f32::INFINITY), |(best, best_diff), (i, &f)| {
            let diff = (f - freq).abs();
            if diff < best_diff { (i, diff) } else { (best, best_diff) }
        })
        .0
}

/// Name of a piano key, e.g. `A4` or `C#3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteName {
    pub key: usize,
    pub letter: &'static str,
    pub octave: u32,
}

impl NoteName {
    pub fn from_key(key: usize) -> Self {
        let key = key.min(PIANO_KEYS - 1);
        Self {
            key,
            letter: NOTE_NAMES[key % 12],
            octave: (key / 12) as u32,
        }
    }

    pub fn from_frequency(freq: f32) -> Self {
        Self::from_key(nearest_key(freq))
    }

    pub fn is_sharp(&self) -> bool {
        self.letter.ends_with('#')
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.letter, self.octave)
    }
}
