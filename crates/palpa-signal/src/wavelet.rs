//! Discrete wavelet decomposition for waveform-shape descriptors.
//!
//! Periodized DWT: at each level the current approximation is convolved
//! with the analysis low-pass / high-pass pair with circular wrap-around and
//! downsampled by two. Sub-band energies relative to the total capture how
//! "smooth" or "rough" a pulse contour is.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Mother wavelet for the decomposition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotherWavelet {
    Haar,
    Daubechies4,
}

impl MotherWavelet {
    /// Analysis low-pass (scaling) filter
    pub fn lowpass(&self) -> Vec<f64> {
        match self {
            MotherWavelet::Haar => {
                let s = std::f64::consts::FRAC_1_SQRT_2;
                vec![s, s]
            }
            MotherWavelet::Daubechies4 => {
                let sqrt3 = 3.0_f64.sqrt();
                let norm = 4.0 * std::f64::consts::SQRT_2;
                vec![
                    (1.0 + sqrt3) / norm,
                    (3.0 + sqrt3) / norm,
                    (3.0 - sqrt3) / norm,
                    (1.0 - sqrt3) / norm,
                ]
            }
        }
    }

    /// Analysis high-pass filter, the quadrature mirror of [`Self::lowpass`]
    pub fn highpass(&self) -> Vec<f64> {
        let h = self.lowpass();
        let len = h.len();
        (0..len)
            .map(|k| {
                let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                sign * h[len - 1 - k]
            })
            .collect()
    }

    pub fn name(&self) -> &'static str {
        match self {
            MotherWavelet::Haar => "haar",
            MotherWavelet::Daubechies4 => "daubechies4",
        }
    }
}

/// Coefficients of a multi-level decomposition
#[derive(Debug, Clone)]
pub struct WaveletDecomposition {
    /// Detail coefficients, finest level first
    pub details: Vec<Array1<f64>>,
    pub approximation: Array1<f64>,
}

impl WaveletDecomposition {
    /// Levels actually computed (may be fewer than requested for short input)
    pub fn levels(&self) -> usize {
        self.details.len()
    }

    /// Energy ratios: one per requested detail level (0 for missing levels),
    /// then the approximation
    pub fn energy_ratios(&self, depth: usize) -> (Vec<f64>, f64) {
        let energy = |c: &Array1<f64>| c.iter().map(|x| x * x).sum::<f64>();
        let detail_energy: Vec<f64> = self.details.iter().map(energy).collect();
        let approx_energy = energy(&self.approximation);
        let total = detail_energy.iter().sum::<f64>() + approx_energy;

        if total <= 0.0 {
            return (vec![0.0; depth], 0.0);
        }

        let mut ratios: Vec<f64> = detail_energy.iter().map(|e| e / total).collect();
        ratios.resize(depth, 0.0);
        (ratios, approx_energy / total)
    }

    /// Shannon entropy (nats) of the relative sub-band energies
    pub fn entropy(&self, depth: usize) -> f64 {
        let (details, approx) = self.energy_ratios(depth);
        details
            .iter()
            .chain(std::iter::once(&approx))
            .filter(|p| **p > 0.0)
            .map(|p| -p * p.ln())
            .sum()
    }
}

pub struct WaveletTransform {
    wavelet: MotherWavelet,
    depth: usize,
    lowpass: Vec<f64>,
    highpass: Vec<f64>,
}

impl WaveletTransform {
    pub fn new(wavelet: MotherWavelet, depth: usize) -> Self {
        Self {
            wavelet,
            depth: depth.max(1),
            lowpass: wavelet.lowpass(),
            highpass: wavelet.highpass(),
        }
    }

    pub fn wavelet(&self) -> MotherWavelet {
        self.wavelet
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Decompose down to `depth` levels, stopping early once the
    /// approximation is shorter than the filter
    pub fn decompose(&self, signal: &[f64]) -> WaveletDecomposition {
        let taps = self.lowpass.len();
        let mut details = Vec::with_capacity(self.depth);
        let mut current = Array1::from_vec(signal.to_vec());

        for _ in 0..self.depth {
            let n = current.len() & !1;
            if n < taps.max(2) {
                break;
            }

            let half = n / 2;
            let mut approx = Array1::zeros(half);
            let mut detail = Array1::zeros(half);

            for i in 0..half {
                let mut a = 0.0;
                let mut d = 0.0;
                for k in 0..taps {
                    let x = current[(2 * i + k) % n];
                    a += self.lowpass[k] * x;
                    d += self.highpass[k] * x;
                }
                approx[i] = a;
                detail[i] = d;
            }

            details.push(detail);
            current = approx;
        }

        WaveletDecomposition {
            details,
            approximation: current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_are_orthonormal() {
        for w in [MotherWavelet::Haar, MotherWavelet::Daubechies4] {
            let h = w.lowpass();
            let g = w.highpass();
            let hh: f64 = h.iter().map(|x| x * x).sum();
            let hg: f64 = h.iter().zip(g.iter()).map(|(a, b)| a * b).sum();
            assert!((hh - 1.0).abs() < 1e-12);
            assert!(hg.abs() < 1e-12);
        }
    }

    #[test]
    fn test_energy_preserved() {
        let signal: Vec<f64> = (0..256).map(|i| ((i * 7919) % 97) as f64 / 97.0 - 0.5).collect();
        let input_energy: f64 = signal.iter().map(|x| x * x).sum();

        let dwt = WaveletTransform::new(MotherWavelet::Daubechies4, 5);
        let dec = dwt.decompose(&signal);
        assert_eq!(dec.levels(), 5);

        let out_energy: f64 = dec
            .details
            .iter()
            .chain(std::iter::once(&dec.approximation))
            .map(|c| c.iter().map(|x| x * x).sum::<f64>())
            .sum();
        assert!((input_energy - out_energy).abs() < 1e-9 * input_energy.max(1.0));
    }

    #[test]
    fn test_constant_signal_has_no_detail() {
        let dwt = WaveletTransform::new(MotherWavelet::Haar, 3);
        let dec = dwt.decompose(&[2.0; 64]);
        let (details, approx) = dec.energy_ratios(3);
        assert!(details.iter().all(|r| r.abs() < 1e-12));
        assert!((approx - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_short_signal_stops_early() {
        let dwt = WaveletTransform::new(MotherWavelet::Daubechies4, 5);
        let dec = dwt.decompose(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(dec.levels(), 2);
        let (details, _) = dec.energy_ratios(5);
        assert_eq!(details.len(), 5);
        assert_eq!(details[4], 0.0);
    }
}
