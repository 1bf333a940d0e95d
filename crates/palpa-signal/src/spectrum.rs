//! Frequency-domain descriptors of a pulse waveform.
//!
//! The waveform is Hann-windowed, zero-padded to the next power of two and
//! transformed with a forward FFT. Only the one-sided power spectrum up to
//! the band-pass high cutoff is used, split into three physiological bands:
//!
//! - low (0, 2] Hz: fundamental of normal heart rates
//! - mid (2, 5] Hz: first harmonics, dicrotic wave
//! - high (5, 20] Hz: sharp upstroke detail

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Upper edge of the analysed band (Hz)
const MAX_ANALYSIS_HZ: f64 = 20.0;

/// Upper bound on the transform length, about 11 minutes at 200 Hz
pub const MAX_FFT_SIZE: usize = 1 << 17;

/// Summary of the one-sided power spectrum
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralFeatures {
    pub dominant_frequency_hz: f64,
    pub dominant_power: f64,
    pub spectral_centroid_hz: f64,
    pub total_power: f64,
    pub band_low_ratio: f64,
    pub band_mid_ratio: f64,
    pub band_high_ratio: f64,
    /// Shannon entropy of the normalized spectrum, scaled to [0, 1]
    pub spectral_entropy: f64,
}

impl SpectralFeatures {
    fn empty() -> Self {
        Self {
            dominant_frequency_hz: 0.0,
            dominant_power: 0.0,
            spectral_centroid_hz: 0.0,
            total_power: 0.0,
            band_low_ratio: 0.0,
            band_mid_ratio: 0.0,
            band_high_ratio: 0.0,
            spectral_entropy: 0.0,
        }
    }
}

/// FFT plan and window for one waveform length.
///
/// Waveforms longer than [`MAX_FFT_SIZE`] samples are analysed over their
/// first `MAX_FFT_SIZE` samples; see [`SpectrumAnalyzer::truncates`].
pub struct SpectrumAnalyzer {
    fft_size: usize,
    sample_rate: f64,
    fft: Arc<dyn Fft<f64>>,
    window: Vec<f64>,
}

impl SpectrumAnalyzer {
    /// Plan for a waveform of `len` samples
    pub fn for_length(len: usize, sample_rate: f64) -> Self {
        let fft_size = len.max(2).next_power_of_two().min(MAX_FFT_SIZE);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        Self {
            fft_size,
            sample_rate,
            fft,
            window: Self::hanning_window(len.min(fft_size)),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Whether a waveform of `len` samples is cut to fit the transform
    pub fn truncates(len: usize) -> bool {
        len > MAX_FFT_SIZE
    }

    fn hanning_window(size: usize) -> Vec<f64> {
        if size < 2 {
            return vec![1.0; size];
        }
        (0..size)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (size - 1) as f64).cos())
            })
            .collect()
    }

    /// One-sided power spectrum as (frequency, power) pairs, DC excluded
    pub fn power_spectrum(&self, signal: &[f64]) -> Vec<(f64, f64)> {
        let n = self.fft_size;
        let mean = if signal.is_empty() {
            0.0
        } else {
            signal.iter().sum::<f64>() / signal.len() as f64
        };

        let mut buffer: Vec<Complex<f64>> = signal
            .iter()
            .take(self.window.len())
            .zip(self.window.iter())
            .map(|(x, w)| Complex::new((x - mean) * w, 0.0))
            .collect();
        buffer.resize(n, Complex::new(0.0, 0.0));

        self.fft.process(&mut buffer);

        let freq_step = self.sample_rate / n as f64;
        buffer
            .iter()
            .enumerate()
            .skip(1)
            .take(n / 2)
            .map(|(i, c)| (i as f64 * freq_step, c.norm_sqr() / n as f64))
            .collect()
    }

    pub fn analyze(&self, signal: &[f64]) -> SpectralFeatures {
        let spectrum: Vec<(f64, f64)> = self
            .power_spectrum(signal)
            .into_iter()
            .filter(|(f, _)| *f <= MAX_ANALYSIS_HZ)
            .collect();

        let total_power: f64 = spectrum.iter().map(|(_, p)| p).sum();
        if spectrum.is_empty() || total_power <= 0.0 {
            return SpectralFeatures::empty();
        }

        let (dominant_frequency_hz, dominant_power) = spectrum
            .iter()
            .copied()
            .fold((0.0, f64::MIN), |best, (f, p)| if p > best.1 { (f, p) } else { best });

        let band = |lo: f64, hi: f64| -> f64 {
            spectrum
                .iter()
                .filter(|(f, _)| *f > lo && *f <= hi)
                .map(|(_, p)| p)
                .sum::<f64>()
                / total_power
        };

        let spectral_centroid_hz =
            spectrum.iter().map(|(f, p)| f * p).sum::<f64>() / total_power;

        let entropy: f64 = spectrum
            .iter()
            .map(|(_, p)| p / total_power)
            .filter(|p| *p > 0.0)
            .map(|p| -p * p.ln())
            .sum();
        let max_entropy = (spectrum.len() as f64).ln();
        let spectral_entropy = if max_entropy > 0.0 {
            (entropy / max_entropy).clamp(0.0, 1.0)
        } else {
            0.0
        };

        SpectralFeatures {
            dominant_frequency_hz,
            dominant_power,
            spectral_centroid_hz,
            total_power,
            band_low_ratio: band(0.0, 2.0),
            band_mid_ratio: band(2.0, 5.0),
            band_high_ratio: band(5.0, MAX_ANALYSIS_HZ),
            spectral_entropy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_dominant_frequency() {
        let rate = 200.0;
        let signal: Vec<f64> = (0..2000)
            .map(|i| (2.0 * PI * 1.25 * i as f64 / rate).sin())
            .collect();

        let analyzer = SpectrumAnalyzer::for_length(signal.len(), rate);
        assert_eq!(analyzer.fft_size(), 2048);

        let features = analyzer.analyze(&signal);
        let resolution = rate / 2048.0;
        assert!((features.dominant_frequency_hz - 1.25).abs() <= resolution);
        assert!(features.band_low_ratio > 0.95);
        let bands = features.band_low_ratio + features.band_mid_ratio + features.band_high_ratio;
        assert!((bands - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_long_waveforms_truncated() {
        let len = MAX_FFT_SIZE + 1000;
        assert!(SpectrumAnalyzer::truncates(len));
        assert!(!SpectrumAnalyzer::truncates(MAX_FFT_SIZE));
        assert_eq!(SpectrumAnalyzer::for_length(len, 200.0).fft_size(), MAX_FFT_SIZE);
    }

    #[test]
    fn test_silence() {
        let analyzer = SpectrumAnalyzer::for_length(100, 200.0);
        let features = analyzer.analyze(&[0.0; 100]);
        assert_eq!(features, SpectralFeatures::empty());
    }

    #[test]
    fn test_entropy_orders_tone_and_noise() {
        let rate = 200.0;
        let tone: Vec<f64> = (0..1024)
            .map(|i| (2.0 * PI * 3.0 * i as f64 / rate).sin())
            .collect();
        let mut state = 12345u64;
        let noise: Vec<f64> = (0..1024)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
                (state >> 33) as f64 / (1u64 << 31) as f64 - 0.5
            })
            .collect();

        let analyzer = SpectrumAnalyzer::for_length(1024, rate);
        assert!(analyzer.analyze(&tone).spectral_entropy < analyzer.analyze(&noise).spectral_entropy);
    }
}
