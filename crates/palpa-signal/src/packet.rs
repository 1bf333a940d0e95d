//! Canonical wrist-pulse packet shared by every downstream stage.

use palpa_core::{Error, PulsePosition, Result, SamplingConfig, SessionId, Timestamp};
use serde::{Deserialize, Serialize};

/// Accepted range for calibrated pressure (mmHg)
pub const PRESSURE_RANGE_MMHG: (f64, f64) = (-50.0, 500.0);

/// Accepted range for skin temperature (°C)
pub const TEMPERATURE_RANGE_C: (f64, f64) = (15.0, 45.0);

/// Tolerance when comparing a packet's sample rate to the session's
const RATE_TOLERANCE_HZ: f64 = 1e-6;

/// One timestamped sample batch for a single pulse position
///
/// Produced by a device adapter after unit conversion, channel mapping and
/// calibration. Series lengths are fixed per session by
/// [`SamplingConfig::samples_per_packet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPacket {
    pub session_id: SessionId,

    /// Microsecond timestamp of the first sample
    pub timestamp: Timestamp,

    pub position: PulsePosition,

    /// Calibrated pressure (mmHg)
    pub pressure_series: Vec<f64>,

    /// Pressure velocity (mmHg/s)
    pub velocity_series: Vec<f64>,

    /// Skin temperature (°C)
    pub skin_temperature: f64,

    /// Relative skin moisture in [0, 1]; `None` when the device has no
    /// moisture sensor
    pub skin_moisture: Option<f64>,

    /// Native rate of the series
    pub sample_rate_hz: f64,
}

impl RawPacket {
    pub fn new(
        session_id: SessionId,
        timestamp: Timestamp,
        position: PulsePosition,
        pressure_series: Vec<f64>,
        sample_rate_hz: f64,
    ) -> Self {
        let velocity_series = derive_velocity(&pressure_series, sample_rate_hz);
        Self {
            session_id,
            timestamp,
            position,
            pressure_series,
            velocity_series,
            skin_temperature: 36.5,
            skin_moisture: None,
            sample_rate_hz,
        }
    }

    pub fn with_velocity(mut self, velocity_series: Vec<f64>) -> Self {
        self.velocity_series = velocity_series;
        self
    }

    pub fn with_skin(mut self, temperature: f64, moisture: Option<f64>) -> Self {
        self.skin_temperature = temperature;
        self.skin_moisture = moisture;
        self
    }

    pub fn len(&self) -> usize {
        self.pressure_series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pressure_series.is_empty()
    }

    /// Duration covered by this packet
    pub fn duration_us(&self) -> i64 {
        if self.sample_rate_hz <= 0.0 {
            return 0;
        }
        (self.len() as f64 / self.sample_rate_hz * 1e6).round() as i64
    }

    /// Validate against the sampling agreed for the session
    pub fn validate(&self, sampling: &SamplingConfig) -> Result<()> {
        let expected = sampling.samples_per_packet;

        if self.pressure_series.len() != expected {
            return Err(Error::InvalidPacket(format!(
                "pressure series has {} samples, expected {}",
                self.pressure_series.len(),
                expected
            )));
        }
        if self.velocity_series.len() != expected {
            return Err(Error::InvalidPacket(format!(
                "velocity series has {} samples, expected {}",
                self.velocity_series.len(),
                expected
            )));
        }
        if (self.sample_rate_hz - sampling.sample_rate_hz).abs() > RATE_TOLERANCE_HZ {
            return Err(Error::InvalidPacket(format!(
                "sample rate {} Hz does not match session rate {} Hz",
                self.sample_rate_hz, sampling.sample_rate_hz
            )));
        }
        if !sampling.positions.contains(&self.position) {
            return Err(Error::InvalidPacket(format!(
                "position {} is not recorded by this device",
                self.position
            )));
        }
        if self.timestamp.as_micros() < 0 {
            return Err(Error::InvalidPacket("negative timestamp".into()));
        }

        let (lo, hi) = PRESSURE_RANGE_MMHG;
        if let Some(bad) = self
            .pressure_series
            .iter()
            .find(|p| !p.is_finite() || **p < lo || **p > hi)
        {
            return Err(Error::InvalidPacket(format!(
                "pressure sample {} outside [{}, {}] mmHg",
                bad, lo, hi
            )));
        }
        if self.velocity_series.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidPacket("non-finite velocity sample".into()));
        }

        let (tlo, thi) = TEMPERATURE_RANGE_C;
        if !self.skin_temperature.is_finite()
            || self.skin_temperature < tlo
            || self.skin_temperature > thi
        {
            return Err(Error::InvalidPacket(format!(
                "skin temperature {} outside [{}, {}] °C",
                self.skin_temperature, tlo, thi
            )));
        }
        if let Some(m) = self.skin_moisture {
            if !(0.0..=1.0).contains(&m) {
                return Err(Error::InvalidPacket(format!(
                    "skin moisture {} outside [0, 1]",
                    m
                )));
            }
        }

        Ok(())
    }
}

/// First difference scaled to units per second, same length as the input
pub fn derive_velocity(pressure: &[f64], sample_rate_hz: f64) -> Vec<f64> {
    if pressure.is_empty() {
        return Vec::new();
    }
    let mut velocity = Vec::with_capacity(pressure.len());
    velocity.push(0.0);
    velocity.extend(
        pressure
            .windows(2)
            .map(|w| (w[1] - w[0]) * sample_rate_hz),
    );
    velocity
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampling() -> SamplingConfig {
        SamplingConfig {
            sample_rate_hz: 200.0,
            samples_per_packet: 20,
            canonical_rate_hz: 200.0,
            positions: PulsePosition::ALL.to_vec(),
        }
    }

    fn packet() -> RawPacket {
        RawPacket::new(
            SessionId::new(),
            Timestamp::from_micros(0),
            PulsePosition::LeftCun,
            vec![80.0; 20],
            200.0,
        )
    }

    #[test]
    fn test_valid_packet() {
        let p = packet();
        assert!(p.validate(&sampling()).is_ok());
        assert_eq!(p.duration_us(), 100_000);
        assert_eq!(p.velocity_series.len(), 20);
    }

    #[test]
    fn test_wrong_velocity_length_rejected() {
        let p = packet().with_velocity(vec![0.0; 19]);
        let err = p.validate(&sampling()).unwrap_err();
        assert!(matches!(err, Error::InvalidPacket(ref m) if m.contains("velocity")));
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let mut p = packet();
        p.pressure_series[3] = f64::NAN;
        assert!(p.validate(&sampling()).is_err());

        let p = packet().with_skin(60.0, None);
        assert!(p.validate(&sampling()).is_err());

        let p = packet().with_skin(36.0, Some(1.5));
        assert!(p.validate(&sampling()).is_err());
    }

    #[test]
    fn test_derive_velocity() {
        let v = derive_velocity(&[0.0, 1.0, 3.0], 10.0);
        assert_eq!(v, vec![0.0, 10.0, 20.0]);
    }
}
