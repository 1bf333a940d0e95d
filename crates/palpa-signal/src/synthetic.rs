//! Deterministic synthetic pulse recordings.
//!
//! Used by the full health check to exercise the pipeline end to end, by the
//! demo binary and by tests. Noise comes from a fixed-seed xorshift so the
//! same parameters always give the same packets.

use std::f64::consts::PI;

use palpa_core::{PulsePosition, SessionId, Timestamp};

use crate::packet::RawPacket;

/// Parameters of a synthetic radial pulse
#[derive(Debug, Clone)]
pub struct SyntheticPulse {
    pub heart_rate_bpm: f64,
    /// Systolic peak height above the diastolic floor (mmHg)
    pub amplitude_mmhg: f64,
    /// Hold-down pressure the waveform rides on (mmHg)
    pub contact_pressure_mmhg: f64,
    /// Dicrotic wave height relative to the systolic peak
    pub dicrotic_ratio: f64,
    /// Systolic wave width (seconds, gaussian sigma)
    pub systolic_width_s: f64,
    /// Drop every n-th beat; `None` for a regular rhythm
    pub skip_every: Option<usize>,
    /// Uniform noise half-range (mmHg)
    pub noise_mmhg: f64,
    /// Slow respiratory drift amplitude (mmHg)
    pub drift_mmhg: f64,
    pub sample_rate_hz: f64,
    pub samples_per_packet: usize,
    pub skin_temperature: f64,
    pub skin_moisture: Option<f64>,
    pub seed: u64,
}

impl Default for SyntheticPulse {
    fn default() -> Self {
        Self {
            heart_rate_bpm: 72.0,
            amplitude_mmhg: 12.0,
            contact_pressure_mmhg: 80.0,
            dicrotic_ratio: 0.35,
            systolic_width_s: 0.045,
            skip_every: None,
            noise_mmhg: 0.05,
            drift_mmhg: 1.5,
            sample_rate_hz: 1000.0,
            samples_per_packet: 100,
            skin_temperature: 36.4,
            skin_moisture: Some(0.45),
            seed: 0x5eed_cafe,
        }
    }
}

impl SyntheticPulse {
    pub fn with_rate(mut self, bpm: f64) -> Self {
        self.heart_rate_bpm = bpm;
        self
    }

    pub fn with_amplitude(mut self, amplitude_mmhg: f64) -> Self {
        self.amplitude_mmhg = amplitude_mmhg;
        self
    }

    pub fn with_contact_pressure(mut self, mmhg: f64) -> Self {
        self.contact_pressure_mmhg = mmhg;
        self
    }

    pub fn with_skip_every(mut self, n: usize) -> Self {
        self.skip_every = Some(n.max(2));
        self
    }

    pub fn with_sampling(mut self, rate_hz: f64, samples_per_packet: usize) -> Self {
        self.sample_rate_hz = rate_hz;
        self.samples_per_packet = samples_per_packet;
        self
    }

    /// Continuous calibrated pressure trace
    pub fn waveform(&self, duration_s: f64) -> Vec<f64> {
        let n = (duration_s * self.sample_rate_hz).round() as usize;
        let period = 60.0 / self.heart_rate_bpm.max(1.0);
        let beats = (duration_s / period).ceil() as usize + 1;
        let mut rng = XorShift::new(self.seed);

        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let t = i as f64 / self.sample_rate_hz;
            let mut v = self.contact_pressure_mmhg
                + self.drift_mmhg * (2.0 * PI * 0.25 * t).sin();

            // contributions from this beat and the previous one
            let k = (t / period).floor() as usize;
            for beat in k.saturating_sub(1)..=(k + 1).min(beats) {
                if let Some(every) = self.skip_every {
                    if beat % every == every - 1 {
                        continue;
                    }
                }
                let onset = beat as f64 * period;
                let systolic = onset + 0.12;
                let dicrotic = onset + 0.37;
                v += self.amplitude_mmhg * gaussian(t, systolic, self.systolic_width_s);
                v += self.amplitude_mmhg
                    * self.dicrotic_ratio
                    * gaussian(t, dicrotic, self.systolic_width_s * 1.4);
            }

            v += self.noise_mmhg * (2.0 * rng.next_f64() - 1.0);
            out.push(v);
        }
        out
    }

    /// Split the waveform into consecutive packets
    pub fn packets(
        &self,
        session_id: SessionId,
        position: PulsePosition,
        duration_s: f64,
    ) -> Vec<RawPacket> {
        let spp = self.samples_per_packet.max(1);
        let waveform = self.waveform(duration_s);
        let packet_us = spp as f64 / self.sample_rate_hz * 1e6;

        waveform
            .chunks_exact(spp)
            .enumerate()
            .map(|(i, chunk)| {
                RawPacket::new(
                    session_id,
                    Timestamp::from_micros((i as f64 * packet_us).round() as i64),
                    position,
                    chunk.to_vec(),
                    self.sample_rate_hz,
                )
                .with_skin(self.skin_temperature, self.skin_moisture)
            })
            .collect()
    }
}

/// Packets of a healthy-looking pulse at `bpm` for `duration_s` seconds
pub fn synthetic_packets(
    session_id: SessionId,
    position: PulsePosition,
    bpm: f64,
    duration_s: f64,
) -> Vec<RawPacket> {
    SyntheticPulse::default()
        .with_rate(bpm)
        .packets(session_id, position, duration_s)
}

fn gaussian(t: f64, center: f64, sigma: f64) -> f64 {
    let z = (t - center) / sigma;
    (-0.5 * z * z).exp()
}

struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    fn next_f64(&mut self) -> f64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = SyntheticPulse::default().waveform(3.0);
        let b = SyntheticPulse::default().waveform(3.0);
        assert_eq!(a, b);
        assert_eq!(a.len(), 3000);
    }

    #[test]
    fn test_packets_have_fixed_length() {
        let packets = synthetic_packets(SessionId::new(), PulsePosition::LeftCun, 72.0, 2.0);
        assert_eq!(packets.len(), 20);
        assert!(packets.iter().all(|p| p.len() == 100));
        assert_eq!(packets[1].timestamp.as_micros(), 100_000);
    }
}
