//! Filters for pulse waveform conditioning.
//!
//! All batch filters here are zero-phase: causal sections are run forward
//! and then backward over an odd-reflected extension of the signal, so peak
//! timing is preserved for the time-domain features.

use std::f64::consts::{PI, SQRT_2};

/// Second-order Butterworth section (bilinear transform, pre-warped cutoff)
///
/// Runs in direct form II transposed, which stays well conditioned for the
/// very low normalized cutoffs used for drift removal.
#[derive(Debug, Clone)]
pub struct ButterworthFilter {
    b: [f64; 3],
    a: [f64; 3],
    z1: f64,
    z2: f64,
}

impl ButterworthFilter {
    /// # Arguments
    /// * `highpass` - High-pass instead of low-pass response
    /// * `cutoff_hz` - -3 dB frequency
    /// * `sample_rate` - Sampling rate in Hz
    fn new(highpass: bool, cutoff_hz: f64, sample_rate: f64) -> Self {
        let nyquist = sample_rate / 2.0;
        let cutoff = cutoff_hz.clamp(1e-6, nyquist * 0.999);
        let omega = (PI * cutoff / sample_rate).tan();
        let omega_sq = omega * omega;
        let denom = 1.0 + SQRT_2 * omega + omega_sq;

        let a = [
            1.0,
            2.0 * (omega_sq - 1.0) / denom,
            (1.0 - SQRT_2 * omega + omega_sq) / denom,
        ];
        let b = if highpass {
            let k = 1.0 / denom;
            [k, -2.0 * k, k]
        } else {
            let k = omega_sq / denom;
            [k, 2.0 * k, k]
        };

        Self {
            b,
            a,
            z1: 0.0,
            z2: 0.0,
        }
    }

    pub fn lowpass(cutoff_hz: f64, sample_rate: f64) -> Self {
        Self::new(false, cutoff_hz, sample_rate)
    }

    pub fn highpass(cutoff_hz: f64, sample_rate: f64) -> Self {
        Self::new(true, cutoff_hz, sample_rate)
    }

    /// Process a single sample
    #[inline]
    pub fn filter(&mut self, x: f64) -> f64 {
        let y = self.b[0] * x + self.z1;
        self.z1 = self.b[1] * x - self.a[1] * y + self.z2;
        self.z2 = self.b[2] * x - self.a[2] * y;
        y
    }

    /// Causal pass over a whole signal, starting from the steady state for
    /// its first sample
    pub fn filter_signal(&mut self, signal: &[f64]) -> Vec<f64> {
        self.reset();
        if let Some(&first) = signal.first() {
            self.prime(first);
        }
        signal.iter().map(|&x| self.filter(x)).collect()
    }

    /// Forward-backward pass, zero phase and squared magnitude response
    pub fn filter_zero_phase(&mut self, signal: &[f64]) -> Vec<f64> {
        if signal.len() < 3 {
            return signal.to_vec();
        }
        let pad = (3 * 3).max(signal.len() / 4).min(signal.len() - 1);
        let extended = reflect_pad(signal, pad);

        let forward = self.filter_signal(&extended);
        let mut reversed: Vec<f64> = forward.into_iter().rev().collect();
        reversed = self.filter_signal(&reversed);
        reversed.reverse();

        reversed[pad..pad + signal.len()].to_vec()
    }

    /// Set internal state to the response of a constant input `x`
    fn prime(&mut self, x: f64) {
        let dc_gain = (self.b[0] + self.b[1] + self.b[2]) / (1.0 + self.a[1] + self.a[2]);
        let y = dc_gain * x;
        self.z2 = self.b[2] * x - self.a[2] * y;
        self.z1 = self.b[1] * x - self.a[1] * y + self.z2;
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// Band-pass built from a high-pass and a low-pass Butterworth section
#[derive(Debug, Clone)]
pub struct BandpassFilter {
    highpass: ButterworthFilter,
    lowpass: ButterworthFilter,
}

impl BandpassFilter {
    pub fn new(low_cutoff: f64, high_cutoff: f64, sample_rate: f64) -> Self {
        Self {
            highpass: ButterworthFilter::highpass(low_cutoff, sample_rate),
            lowpass: ButterworthFilter::lowpass(high_cutoff, sample_rate),
        }
    }

    /// Zero-phase band-pass
    pub fn filter_signal(&mut self, signal: &[f64]) -> Vec<f64> {
        let hp = self.highpass.filter_zero_phase(signal);
        self.lowpass.filter_zero_phase(&hp)
    }
}

/// Centered moving average (zero phase), window shrinks at the edges
///
/// Uses a prefix sum so cost is linear in signal length.
pub fn centered_moving_average(signal: &[f64], window: usize) -> Vec<f64> {
    let n = signal.len();
    if n == 0 {
        return Vec::new();
    }
    let half = window.max(1) / 2;

    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    let mut acc = 0.0;
    for &x in signal {
        acc += x;
        prefix.push(acc);
    }

    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            (prefix[hi] - prefix[lo]) / (hi - lo) as f64
        })
        .collect()
}

/// Subtract a centered moving-average baseline
pub fn remove_baseline(signal: &[f64], window: usize) -> Vec<f64> {
    let baseline = centered_moving_average(signal, window);
    signal
        .iter()
        .zip(baseline.iter())
        .map(|(x, b)| x - b)
        .collect()
}

/// Linear-interpolation resampler
pub fn resample_linear(signal: &[f64], from_rate: f64, to_rate: f64) -> Vec<f64> {
    if signal.len() < 2 || from_rate <= 0.0 || to_rate <= 0.0 {
        return signal.to_vec();
    }
    if (from_rate - to_rate).abs() < f64::EPSILON {
        return signal.to_vec();
    }

    let duration = (signal.len() - 1) as f64 / from_rate;
    let out_len = (duration * to_rate).floor() as usize + 1;
    let ratio = from_rate / to_rate;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            if idx + 1 >= signal.len() {
                return signal[signal.len() - 1];
            }
            let frac = pos - idx as f64;
            signal[idx] * (1.0 - frac) + signal[idx + 1] * frac
        })
        .collect()
}

/// Odd reflection about both endpoints, as used by forward-backward filtering
fn reflect_pad(signal: &[f64], pad: usize) -> Vec<f64> {
    let n = signal.len();
    let first = signal[0];
    let last = signal[n - 1];

    let mut out = Vec::with_capacity(n + 2 * pad);
    out.extend((1..=pad).rev().map(|i| 2.0 * first - signal[i]));
    out.extend_from_slice(signal);
    out.extend((1..=pad).map(|i| 2.0 * last - signal[n - 1 - i]));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, rate: f64, secs: f64) -> Vec<f64> {
        let n = (rate * secs) as usize;
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / rate).sin())
            .collect()
    }

    fn rms(signal: &[f64]) -> f64 {
        (signal.iter().map(|x| x * x).sum::<f64>() / signal.len() as f64).sqrt()
    }

    #[test]
    fn test_butterworth_dc() {
        let mut filter = ButterworthFilter::lowpass(10.0, 100.0);
        let filtered = filter.filter_signal(&[1.0; 100]);
        let last_10_avg: f64 = filtered[90..].iter().sum::<f64>() / 10.0;
        assert!((last_10_avg - 1.0).abs() < 1e-9, "DC should pass through");
    }

    #[test]
    fn test_highpass_blocks_dc() {
        let mut filter = ButterworthFilter::highpass(0.5, 200.0);
        let filtered = filter.filter_signal(&[5.0; 400]);
        assert!(filtered.iter().all(|y| y.abs() < 1e-9));
    }

    #[test]
    fn test_bandpass_attenuates_out_of_band() {
        let rate = 200.0;
        let passband = sine(1.5, rate, 10.0);
        let noise = sine(60.0, rate, 10.0);

        let mut bp = BandpassFilter::new(0.1, 20.0, rate);
        let kept = bp.filter_signal(&passband);
        let removed = bp.filter_signal(&noise);

        let mid = 200..1800;
        assert!(rms(&kept[mid.clone()]) > 0.6);
        assert!(rms(&removed[mid]) < 0.05);
    }

    #[test]
    fn test_zero_phase_preserves_peak_timing() {
        let rate = 200.0;
        let signal = sine(1.0, rate, 6.0);
        let mut lp = ButterworthFilter::lowpass(20.0, rate);
        let filtered = lp.filter_zero_phase(&signal);

        let argmax = |s: &[f64]| {
            s.iter()
                .enumerate()
                .fold((0, f64::MIN), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc })
                .0
        };
        let window = 400..600;
        let a = argmax(&signal[window.clone()]);
        let b = argmax(&filtered[window]);
        assert!((a as i64 - b as i64).abs() <= 1);
    }

    #[test]
    fn test_centered_moving_average_edges() {
        let out = centered_moving_average(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert!((out[0] - 1.5).abs() < 1e-12);
        assert!((out[2] - 3.0).abs() < 1e-12);
        assert!((out[4] - 4.5).abs() < 1e-12);
        assert!(centered_moving_average(&[], 5).is_empty());
    }

    #[test]
    fn test_remove_baseline_flattens_ramp() {
        let ramp: Vec<f64> = (0..500).map(|i| 50.0 + i as f64 * 0.1).collect();
        let corrected = remove_baseline(&ramp, 101);
        assert!(corrected[100..400].iter().all(|x| x.abs() < 1e-9));
    }

    #[test]
    fn test_resample_linear() {
        let signal: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let out = resample_linear(&signal, 1000.0, 200.0);
        assert_eq!(out.len(), 200);
        assert!((out[1] - 5.0).abs() < 1e-9);
        assert!((out[199] - 995.0).abs() < 1e-9);
    }
}
