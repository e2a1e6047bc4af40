//! Spectral analysis of the samples under the playhead.
//!
//! Each call to [`SpectralAnalyzer::analyze`] reads a fixed-duration window starting
//! at the playback position and produces one [`SpectralFrame`] for the
//! spectrogram, the ranked dominant notes, and a per-key intensity for the
//! keyboard view.
use std::fmt;

use ringbuffer::{AllocRingBuffer, RingBuffer};
use rustfft::FftPlanner;
use serde::Deserialize;

use crate::fft;
use crate::file_reader::WaveformBuffer;
use crate::tuning::{self, NoteName, PIANO_KEYS};

/// Key centres computed in f32 land within this of a whole pitch.
const PITCH_EPSILON: f32 = 1e-3;

/// How the spectrum is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisMode {
    /// Uniform FFT bins.
    #[default]
    Fft,
    /// One row per piano key, correlated directly against the key frequency.
    PianoKeys,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub window_ms: u32,
    pub history_capacity: usize,
    pub top_notes: usize,
    /// Lowest continuous pitch (A0 = 1) kept in spectrogram frames.
    pub min_key: f32,
    /// Highest continuous pitch (C8 = 88) kept in spectrogram frames.
    pub max_key: f32,
    pub mode: AnalysisMode,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            window_ms: 100,
            history_capacity: 100,
            top_notes: 3,
            min_key: 1.0,
            max_key: PIANO_KEYS as f32,
            mode: AnalysisMode::Fft,
        }
    }
}

/// One column of the spectrogram: `(frequency, magnitude)` with frequencies
/// strictly ascending and magnitudes in `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectralFrame {
    bins: Vec<(f32, f32)>,
}

impl SpectralFrame {
    /// Wraps bins that are already normalized and in ascending frequency order.
    pub fn new(bins: Vec<(f32, f32)>) -> Self {
        Self { bins }
    }

    pub fn bins(&self) -> &[(f32, f32)] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn is_silent(&self) -> bool {
        self.bins.iter().all(|&(_, m)| m == 0.0)
    }
}

/// Bounded FIFO of past frames; the oldest is evicted first.
pub struct SpectrogramHistory {
    frames: AllocRingBuffer<SpectralFrame>,
}

impl SpectrogramHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: AllocRingBuffer::new(capacity.max(1)),
        }
    }

    pub fn push(&mut self, frame: SpectralFrame) {
        let _ = self.frames.enqueue(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.frames.capacity()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &SpectralFrame> {
        self.frames.iter()
    }

    pub fn latest(&self) -> Option<&SpectralFrame> {
        self.frames.back()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

impl fmt::Debug for SpectrogramHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrogramHistory")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// A detected note, ranked by spectral peak height (1 = loudest).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub note: NoteName,
    pub rank: usize,
    pub frequency: f32,
    pub magnitude: f32,
}

impl fmt::Display for NoteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.note.fmt(f)
    }
}

/// Everything produced by one analysis tick.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub position: usize,
    pub frame: SpectralFrame,
    pub notes: Vec<NoteEvent>,
    /// Normalized magnitude at each key's frequency, A0 first.
    pub key_intensities: [f32; PIANO_KEYS],
    /// The raw samples that were analysed.
    pub window: Vec<f32>,
}

impl Default for Analysis {
    fn default() -> Self {
        Self {
            position: 0,
            frame: SpectralFrame::default(),
            notes: Vec::new(),
            key_intensities: [0.0; PIANO_KEYS],
            window: Vec::new(),
        }
    }
}

pub struct SpectralAnalyzer {
    config: AnalyzerConfig,
    planner: FftPlanner<f32>,
    history: SpectrogramHistory,
    current: Analysis,
}

impl SpectralAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            history: SpectrogramHistory::new(config.history_capacity),
            config,
            planner: FftPlanner::new(),
            current: Analysis::default(),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Number of samples analysed per tick at `sample_rate`.
    pub fn window_len(&self, sample_rate: u32) -> usize {
        ((sample_rate as u64 * self.config.window_ms as u64) / 1000).max(1) as usize
    }

    /// Analyses the window starting at `position` and appends the frame to the
    /// history.
    pub fn analyze(&mut self, waveform: &WaveformBuffer, position: usize) -> &Analysis {
        let rate = waveform.sample_rate();
        let window_len = self.window_len(rate);
        let window = waveform.slice(position..position.saturating_add(window_len));

        let mut raw = match self.config.mode {
            AnalysisMode::Fft => fft::magnitude_spectrum(&mut self.planner, window, rate),
            AnalysisMode::PianoKeys => fft::key_correlation(window, rate),
        };
        if raw.is_empty() {
            // past the end: keep the frame shape of a full window
            raw = (0..window_len / 2)
                .map(|k| (fft::bin_frequency(k, window_len, rate), 0.0))
                .collect();
        }

        let normalized = normalize(&raw);
        let frame = SpectralFrame {
            bins: normalized
                .iter()
                .copied()
                .filter(|&(freq, _)| self.in_key_range(freq))
                .collect(),
        };
        self.history.push(frame.clone());

        self.current = Analysis {
            position,
            frame,
            notes: dominant_notes(&raw, self.config.top_notes),
            key_intensities: key_intensities(&normalized),
            window: window.to_vec(),
        };
        &self.current
    }

    fn in_key_range(&self, freq: f32) -> bool {
        let pitch = tuning::freq_to_pitch(freq);
        pitch >= self.config.min_key - PITCH_EPSILON && pitch <= self.config.max_key + PITCH_EPSILON
    }

    pub fn current(&self) -> &Analysis {
        &self.current
    }

    pub fn current_dominant_notes(&self) -> &[NoteEvent] {
        &self.current.notes
    }

    pub fn current_spectrogram_history(&self) -> &SpectrogramHistory {
        &self.history
    }

    pub fn key_intensities(&self) -> &[f32; PIANO_KEYS] {
        &self.current.key_intensities
    }

    /// Forgets history and the last result, e.g. when a new file is loaded.
    pub fn reset(&mut self) {
        self.history.clear();
        self.current = Analysis::default();
    }
}

/// Divides every magnitude by the largest one. A silent spectrum stays all zero.
pub fn normalize(spectrum: &[(f32, f32)]) -> Vec<(f32, f32)> {
    let max = spectrum.iter().map(|&(_, m)| m).fold(0.0_f32, f32::max);
    if max <= 0.0 {
        return spectrum.iter().map(|&(f, _)| (f, 0.0)).collect();
    }
    spectrum.iter().map(|&(f, m)| (f, m / max)).collect()
}

/// Indices of local maxima in `x` at least `min_height` tall.
///
/// The first and last samples are never peaks. A flat top counts once, at its
/// middle (rounded down).
pub fn find_peaks(x: &[f32], min_height: f32) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }
    let i_max = x.len() - 1;
    let mut i = 1;
    while i < i_max {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < i_max && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks.retain(|&p| x[p] >= min_height);
    peaks
}

/// The `k` tallest spectral peaks above a tenth of the maximum, named after the
/// nearest piano key.
pub fn dominant_notes(spectrum: &[(f32, f32)], k: usize) -> Vec<NoteEvent> {
    let magnitudes: Vec<f32> = spectrum.iter().map(|&(_, m)| m).collect();
    let max = magnitudes.iter().copied().fold(0.0_f32, f32::max);
    if max <= 0.0 {
        return Vec::new();
    }

    let mut peaks = find_peaks(&magnitudes, max / 10.0);
    peaks.sort_by(|&a, &b| magnitudes[b].total_cmp(&magnitudes[a]));
    peaks
        .into_iter()
        .take(k)
        .enumerate()
        .map(|(i, p)| {
            let (frequency, magnitude) = spectrum[p];
            NoteEvent {
                note: NoteName::from_frequency(frequency),
                rank: i + 1,
                frequency,
                magnitude,
            }
        })
        .collect()
}

/// Looks up each key's frequency in an ascending normalized spectrum.
fn key_intensities(normalized: &[(f32, f32)]) -> [f32; PIANO_KEYS] {
    let mut out = [0.0; PIANO_KEYS];
    if normalized.is_empty() {
        return out;
    }
    for (slot, &freq) in out.iter_mut().zip(tuning::key_frequencies()) {
        *slot = normalized[nearest_bin(normalized, freq)].1;
    }
    out
}

fn nearest_bin(bins: &[(f32, f32)], freq: f32) -> usize {
    let upper = bins.partition_point(|&(f, _)| f < freq);
    if upper == 0 {
        return 0;
    }
    if upper == bins.len() {
        return bins.len() - 1;
    }
    if freq - bins[upper - 1].0 <= bins[upper].0 - freq {
        upper - 1
    } else {
        upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 44100;

    fn tones(parts: &[(f32, f32)], n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| {
                let t = i as f32 / RATE as f32;
                parts
                    .iter()
                    .map(|&(freq, amp)| amp * (2.0 * std::f32::consts::PI * freq * t).sin())
                    .sum::<f32>()
            })
            .collect()
    }

    fn names(notes: &[NoteEvent]) -> Vec<String> {
        notes.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn pure_a440_is_a4() {
        let wf = WaveformBuffer::new(tones(&[(440.0, 0.8)], RATE as usize), RATE);
        let mut analyzer = SpectralAnalyzer::new(AnalyzerConfig::default());
        let analysis = analyzer.analyze(&wf, 0);
        assert_eq!(analysis.notes[0].to_string(), "A4");
        assert_eq!(analysis.notes[0].rank, 1);
        assert_eq!(analysis.window.len(), 4410);
        assert!((analysis.key_intensities[48] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn chord_notes_are_ranked_by_height() {
        let wf = WaveformBuffer::new(
            tones(&[(330.0, 0.45), (550.0, 0.3), (220.0, 0.15)], 4410),
            RATE,
        );
        let mut analyzer = SpectralAnalyzer::new(AnalyzerConfig::default());
        let notes = analyzer.analyze(&wf, 0).notes.clone();
        assert_eq!(names(&notes), ["E3", "C#4", "A3"]);
        assert_eq!(notes.iter().map(|n| n.rank).collect::<Vec<_>>(), [1, 2, 3]);
    }

    #[test]
    fn top_k_limits_the_note_count() {
        let wf = WaveformBuffer::new(
            tones(&[(330.0, 0.45), (550.0, 0.3), (220.0, 0.15)], 4410),
            RATE,
        );
        let mut analyzer = SpectralAnalyzer::new(AnalyzerConfig {
            top_notes: 1,
            ..Default::default()
        });
        assert_eq!(names(&analyzer.analyze(&wf, 0).notes), ["E3"]);
    }

    #[test]
    fn silence_gives_a_zero_frame_and_no_notes() {
        let wf = WaveformBuffer::new(vec![0.0; 8820], RATE);
        let mut analyzer = SpectralAnalyzer::new(AnalyzerConfig::default());
        let analysis = analyzer.analyze(&wf, 0);
        assert!(analysis.notes.is_empty());
        assert!(!analysis.frame.is_empty());
        assert!(analysis.frame.is_silent());
        assert_eq!(analyzer.current_spectrogram_history().len(), 1);
    }

    #[test]
    fn window_past_the_end_is_silent_with_full_shape() {
        let wf = WaveformBuffer::new(tones(&[(440.0, 0.8)], 4410), RATE);
        let mut analyzer = SpectralAnalyzer::new(AnalyzerConfig::default());
        let full = analyzer.analyze(&wf, 0).frame.len();
        let analysis = analyzer.analyze(&wf, 10_000);
        assert!(analysis.window.is_empty());
        assert!(analysis.notes.is_empty());
        assert_eq!(analysis.frame.len(), full);
        assert!(analysis.frame.is_silent());
    }

    #[test]
    fn frames_are_normalized_and_ascending_within_the_key_range() {
        let wf = WaveformBuffer::new(tones(&[(440.0, 0.3), (880.0, 0.6)], 4410), RATE);
        let mut analyzer = SpectralAnalyzer::new(AnalyzerConfig {
            min_key: 48.0,
            max_key: 61.0,
            ..Default::default()
        });
        let frame = analyzer.analyze(&wf, 0).frame.clone();
        assert!(frame.bins().windows(2).all(|w| w[0].0 < w[1].0));
        assert!(frame.bins().iter().all(|&(_, m)| (0.0..=1.0).contains(&m)));
        let (lo, hi) = (frame.bins()[0].0, frame.bins()[frame.len() - 1].0);
        assert!(lo >= tuning::key_frequency(47) && hi <= tuning::key_frequency(60) + 1e-3);
        // 880 Hz is the frame maximum, so the kept 440 Hz bin is about a half
        let a4 = frame.bins().iter().find(|&&(f, _)| f == 440.0).unwrap();
        assert!((a4.1 - 0.5).abs() < 0.01);
    }

    #[test]
    fn history_is_a_bounded_fifo() {
        let mut history = SpectrogramHistory::new(3);
        for i in 0..4 {
            history.push(SpectralFrame {
                bins: vec![(i as f32, 1.0)],
            });
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.capacity(), 3);
        let firsts: Vec<f32> = history.iter().map(|f| f.bins()[0].0).collect();
        assert_eq!(firsts, [1.0, 2.0, 3.0]);
        assert_eq!(history.latest().unwrap().bins()[0].0, 3.0);
    }

    #[test]
    fn analyzer_history_never_exceeds_capacity() {
        let wf = WaveformBuffer::new(tones(&[(440.0, 0.8)], RATE as usize), RATE);
        let mut analyzer = SpectralAnalyzer::new(AnalyzerConfig {
            history_capacity: 5,
            ..Default::default()
        });
        for step in 0..12 {
            analyzer.analyze(&wf, step * 1000);
            assert!(analyzer.current_spectrogram_history().len() <= 5);
        }
        analyzer.reset();
        assert!(analyzer.current_spectrogram_history().is_empty());
        assert!(analyzer.current_dominant_notes().is_empty());
    }

    #[test]
    fn piano_key_mode_has_one_row_per_key() {
        let wf = WaveformBuffer::new(tones(&[(440.0, 0.8)], 4410), RATE);
        let mut analyzer = SpectralAnalyzer::new(AnalyzerConfig {
            mode: AnalysisMode::PianoKeys,
            ..Default::default()
        });
        let analysis = analyzer.analyze(&wf, 0);
        assert_eq!(analysis.frame.len(), PIANO_KEYS);
        assert_eq!(analysis.notes[0].to_string(), "A4");
        assert_eq!(analysis.notes[0].frequency, tuning::key_frequencies()[48]);
    }

    #[test]
    fn peaks_skip_edges_and_collapse_plateaus() {
        let x = [5.0, 1.0, 3.0, 3.0, 3.0, 1.0, 2.0, 0.5, 4.0];
        assert_eq!(find_peaks(&x, 0.0), [3, 6]);
        assert_eq!(find_peaks(&x, 2.5), [3]);
        assert!(find_peaks(&[1.0, 2.0], 0.0).is_empty());
        // a plateau that runs into the last sample is not a peak
        assert!(find_peaks(&[0.0, 1.0, 1.0, 1.0], 0.0).is_empty());
    }

    #[test]
    fn normalize_handles_silence() {
        assert_eq!(normalize(&[(1.0, 0.0), (2.0, 0.0)]), [(1.0, 0.0), (2.0, 0.0)]);
        assert_eq!(normalize(&[(1.0, 2.0), (2.0, 4.0)]), [(1.0, 0.5), (2.0, 1.0)]);
    }
}
