use rustfft::FftPlanner;
use rustfft::num_complex::Complex;

use crate::tuning;

/// Frequency in Hz of bin `k` of an `n`-point transform.
pub fn bin_frequency(k: usize, n: usize, sample_rate: u32) -> f32 {
    (k as f64 * sample_rate as f64 / n as f64) as f32
}

/// Magnitude spectrum of `samples` as `(frequency, |X_k|)` pairs.
///
/// Only the non-negative half is kept: bins `0..n/2`. No window is applied and
/// magnitudes are not scaled, so a full-scale sine of an exact bin frequency
/// reads `n/2`.
pub fn magnitude_spectrum(
    planner: &mut FftPlanner<f32>,
    samples: &[f32],
    sample_rate: u32,
) -> Vec<(f32, f32)> {
    let n = samples.len();
    if n == 0 {
        return Vec::new();
    }
    let fft = planner.plan_fft_forward(n);
    let mut buffer: Vec<Complex<f32>> = samples
        .iter()
        .map(|&sample| Complex { re: sample, im: 0.0 })
        .collect();
    fft.process(&mut buffer);

    buffer
        .iter()
        .take(n / 2)
        .enumerate()
        .map(|(k, c)| (bin_frequency(k, n, sample_rate), c.norm()))
        .collect()
}

/// Correlates `samples` with a complex sinusoid at each piano key frequency.
///
/// Same scale as [`magnitude_spectrum`] (a sine exactly at a key frequency with
/// a whole number of cycles reads `n/2`), but the rows sit on the key centres
/// instead of on uniform bins. Keys above Nyquist read zero.
pub fn key_correlation(samples: &[f32], sample_rate: u32) -> Vec<(f32, f32)> {
    let nyquist = sample_rate as f32 / 2.0;
    tuning::key_frequencies()
        .iter()
        .map(|&freq| {
            if samples.is_empty() || freq >= nyquist {
                return (freq, 0.0);
            }
            // rotate a unit phasor instead of calling sin/cos per sample
            let omega = -2.0 * std::f64::consts::PI * freq as f64 / sample_rate as f64;
            let step = Complex::new(omega.cos(), omega.sin());
            let mut phasor = Complex::new(1.0_f64, 0.0);
            let mut acc = Complex::new(0.0_f64, 0.0);
            for &sample in samples {
                acc += phasor * sample as f64;
                phasor *= step;
            }
            (freq, acc.norm() as f32)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, rate: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn spectrum_has_half_the_bins_in_ascending_order() {
        let mut planner = FftPlanner::new();
        let spec = magnitude_spectrum(&mut planner, &sine(440.0, 44100, 4410), 44100);
        assert_eq!(spec.len(), 2205);
        assert_eq!(spec[0].0, 0.0);
        assert!((spec[1].0 - 10.0).abs() < 1e-4);
        assert!(spec.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let mut planner = FftPlanner::new();
        let spec = magnitude_spectrum(&mut planner, &sine(440.0, 44100, 4410), 44100);
        let (peak, _) = spec
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.1.total_cmp(&b.1.1))
            .unwrap();
        assert_eq!(peak, 44);
        assert!((spec[44].1 - 2205.0).abs() < 5.0);
    }

    #[test]
    fn empty_input_gives_empty_spectrum() {
        let mut planner = FftPlanner::new();
        assert!(magnitude_spectrum(&mut planner, &[], 44100).is_empty());
    }

    #[test]
    fn key_correlation_lights_the_played_key() {
        let corr = key_correlation(&sine(440.0, 44100, 4410), 44100);
        assert_eq!(corr.len(), tuning::PIANO_KEYS);
        let (loudest, _) = corr
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.1.total_cmp(&b.1.1))
            .unwrap();
        assert_eq!(loudest, 48);
        assert!(corr[48].1 > 4.0 * corr[47].1);
    }
}
