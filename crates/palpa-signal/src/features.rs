//! Time-domain beat analysis of a conditioned pulse waveform.

use ndarray::Array1;

/// Peak detection parameters
#[derive(Debug, Clone, Copy)]
pub struct PeakDetection {
    /// Threshold above the mean, in standard deviations
    pub threshold_std: f64,
    /// Minimum spacing between beats (seconds)
    pub min_distance_s: f64,
}

/// Shortest inter-beat interval accepted by default (about 180 bpm)
pub const MIN_BEAT_SPACING_S: f64 = 0.33;

impl Default for PeakDetection {
    fn default() -> Self {
        Self {
            threshold_std: 0.3,
            min_distance_s: MIN_BEAT_SPACING_S,
        }
    }
}

/// Beat-level descriptors averaged over a recording
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeFeatures {
    pub peak_count: usize,
    pub heart_rate_bpm: f64,
    pub mean_ibi_s: f64,
    pub ibi_std_s: f64,
    pub rmssd_ms: f64,
    /// `1 / (1 + CV)` of inter-beat intervals
    pub rhythm_regularity: f64,
    /// Fraction of intervals longer than 1.6x the median
    pub missed_beat_ratio: f64,
    pub amplitude_mean: f64,
    pub amplitude_cv: f64,
    /// Secondary (dicrotic) wave height relative to the main wave
    pub dicrotic_ratio: f64,
    pub rise_slope: f64,
    pub fall_slope: f64,
    /// Upstroke time as a fraction of the beat
    pub rise_time_ratio: f64,
    /// Fraction of the beat above half amplitude
    pub pulse_width_ratio: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    /// Mean correlation between consecutive beat shapes
    pub beat_similarity: f64,
}

/// Indices of systolic peaks
pub fn detect_peaks(signal: &[f64], sample_rate: f64, params: PeakDetection) -> Vec<usize> {
    if signal.len() < 3 {
        return Vec::new();
    }
    let arr = Array1::from_vec(signal.to_vec());
    let mean = arr.mean().unwrap_or(0.0);
    let std = arr.std(0.0);
    if std <= 0.0 {
        return Vec::new();
    }
    let threshold = mean + params.threshold_std * std;
    let min_distance = (params.min_distance_s * sample_rate).round().max(1.0) as usize;

    let mut peaks: Vec<usize> = Vec::new();
    for i in 1..signal.len() - 1 {
        let x = signal[i];
        if x < threshold || x <= signal[i - 1] || x < signal[i + 1] {
            continue;
        }
        match peaks.last().copied() {
            Some(last) if i - last < min_distance => {
                if x > signal[last] {
                    if let Some(slot) = peaks.last_mut() {
                        *slot = i;
                    }
                }
            }
            _ => peaks.push(i),
        }
    }
    peaks
}

/// Compute beat features from a waveform sampled at `sample_rate`
pub fn time_features(signal: &[f64], sample_rate: f64, params: PeakDetection) -> TimeFeatures {
    let mut out = TimeFeatures::default();
    if signal.len() < 3 {
        return out;
    }

    let (skewness, kurtosis) = shape_moments(signal);
    out.skewness = skewness;
    out.kurtosis = kurtosis;

    let peaks = detect_peaks(signal, sample_rate, params);
    out.peak_count = peaks.len();
    if peaks.len() < 2 {
        return out;
    }

    let ibis: Vec<f64> = peaks
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64 / sample_rate)
        .collect();
    let ibi_arr = Array1::from_vec(ibis.clone());
    out.mean_ibi_s = ibi_arr.mean().unwrap_or(0.0);
    out.ibi_std_s = ibi_arr.std(0.0);
    out.heart_rate_bpm = if out.mean_ibi_s > 0.0 {
        60.0 / out.mean_ibi_s
    } else {
        0.0
    };
    let cv = if out.mean_ibi_s > 0.0 {
        out.ibi_std_s / out.mean_ibi_s
    } else {
        0.0
    };
    out.rhythm_regularity = 1.0 / (1.0 + cv);
    out.rmssd_ms = if ibis.len() > 1 {
        let sq: f64 = ibis.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
        (sq / (ibis.len() - 1) as f64).sqrt() * 1000.0
    } else {
        0.0
    };

    let median = median(&ibis);
    out.missed_beat_ratio =
        ibis.iter().filter(|ibi| **ibi > 1.6 * median).count() as f64 / ibis.len() as f64;

    // per-beat morphology, each beat bounded by the troughs around its peak
    let mut amplitudes = Vec::new();
    let mut rise_slopes = Vec::new();
    let mut fall_slopes = Vec::new();
    let mut rise_ratios = Vec::new();
    let mut width_ratios = Vec::new();
    let mut dicrotic = Vec::new();
    let mut beats: Vec<&[f64]> = Vec::new();

    for (k, &peak) in peaks.iter().enumerate() {
        let start = if k == 0 {
            peak.saturating_sub((0.4 * sample_rate) as usize)
        } else {
            peaks[k - 1]
        };
        let end = peaks.get(k + 1).copied().unwrap_or(signal.len() - 1);
        if start >= peak || end <= peak {
            continue;
        }

        let onset = argmin(&signal[start..peak]) + start;
        let next = argmin(&signal[peak..=end]) + peak;
        let amplitude = signal[peak] - signal[onset];
        if amplitude <= 0.0 || next <= peak {
            continue;
        }

        let rise_s = (peak - onset) as f64 / sample_rate;
        let fall_s = (next - peak) as f64 / sample_rate;
        let beat_s = (next - onset) as f64 / sample_rate;

        amplitudes.push(amplitude);
        if rise_s > 0.0 {
            rise_slopes.push(amplitude / rise_s);
        }
        if fall_s > 0.0 {
            fall_slopes.push((signal[peak] - signal[next]) / fall_s);
        }
        if beat_s > 0.0 {
            rise_ratios.push(rise_s / beat_s);
        }

        let half = signal[onset] + 0.5 * amplitude;
        let beat = &signal[onset..=next];
        width_ratios.push(beat.iter().filter(|x| **x >= half).count() as f64 / beat.len() as f64);
        dicrotic.push(secondary_wave_ratio(signal, peak, next, signal[onset], amplitude, sample_rate));
        beats.push(beat);
    }

    if !amplitudes.is_empty() {
        let amp = Array1::from_vec(amplitudes);
        out.amplitude_mean = amp.mean().unwrap_or(0.0);
        out.amplitude_cv = if out.amplitude_mean > 0.0 {
            amp.std(0.0) / out.amplitude_mean
        } else {
            0.0
        };
    }
    out.rise_slope = mean(&rise_slopes);
    out.fall_slope = mean(&fall_slopes);
    out.rise_time_ratio = mean(&rise_ratios);
    out.pulse_width_ratio = mean(&width_ratios);
    out.dicrotic_ratio = mean(&dicrotic);
    out.beat_similarity = beat_similarity(&beats);

    out
}

/// Height of the largest secondary maximum between the systolic peak and
/// the following trough, relative to the main wave
fn secondary_wave_ratio(
    signal: &[f64],
    peak: usize,
    trough: usize,
    floor: f64,
    amplitude: f64,
    sample_rate: f64,
) -> f64 {
    let skip = (0.08 * sample_rate) as usize;
    let from = (peak + skip).max(peak + 1);
    if from + 1 >= trough {
        return 0.0;
    }
    let mut best: f64 = 0.0;
    for i in from..trough {
        if signal[i] > signal[i - 1] && signal[i] >= signal[i + 1] {
            best = best.max((signal[i] - floor) / amplitude);
        }
    }
    best.clamp(0.0, 1.0)
}

/// Mean Pearson correlation between consecutive beats, each resampled to a
/// common length
fn beat_similarity(beats: &[&[f64]]) -> f64 {
    const POINTS: usize = 64;
    if beats.len() < 2 {
        return 0.0;
    }
    let normalized: Vec<Vec<f64>> = beats.iter().map(|b| stretch(b, POINTS)).collect();
    let corr: Vec<f64> = normalized
        .windows(2)
        .map(|w| pearson(&w[0], &w[1]))
        .collect();
    mean(&corr)
}

fn stretch(beat: &[f64], points: usize) -> Vec<f64> {
    if beat.len() < 2 {
        return vec![beat.first().copied().unwrap_or(0.0); points];
    }
    let scale = (beat.len() - 1) as f64 / (points - 1) as f64;
    (0..points)
        .map(|i| {
            let pos = i as f64 * scale;
            let idx = pos.floor() as usize;
            if idx + 1 >= beat.len() {
                return beat[beat.len() - 1];
            }
            let frac = pos - idx as f64;
            beat[idx] * (1.0 - frac) + beat[idx + 1] * frac
        })
        .collect()
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let ma = mean(a);
    let mb = mean(b);
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }
    if va <= 0.0 || vb <= 0.0 {
        return 0.0;
    }
    cov / (va * vb).sqrt()
}

/// Skewness and excess kurtosis
fn shape_moments(signal: &[f64]) -> (f64, f64) {
    let arr = Array1::from_vec(signal.to_vec());
    let m = arr.mean().unwrap_or(0.0);
    let std = arr.std(0.0);
    if std <= 0.0 {
        return (0.0, 0.0);
    }
    let n = signal.len() as f64;
    let skew = arr.iter().map(|x| ((x - m) / std).powi(3)).sum::<f64>() / n;
    let kurt = arr.iter().map(|x| ((x - m) / std).powi(4)).sum::<f64>() / n - 3.0;
    (skew, kurt)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn argmin(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::MAX), |best, (i, &v)| if v < best.1 { (i, v) } else { best })
        .0
}
