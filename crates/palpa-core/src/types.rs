//! Fundamental types shared by every stage of the palpation engine.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::taxonomy::{Element, Organ};

/// Unique identifier for one diagnostic encounter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Patient identifier, issued by the external identity service
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp wrapper with microsecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub const MICROS_PER_SEC: i64 = 1_000_000;
    pub const MICROS_PER_DAY: i64 = 86_400 * Self::MICROS_PER_SEC;

    pub fn now() -> Self {
        Self(Utc::now().timestamp_micros())
    }

    pub fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub fn as_micros(&self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / Self::MICROS_PER_SEC as f64
    }

    pub fn as_days_f64(&self) -> f64 {
        self.0 as f64 / Self::MICROS_PER_DAY as f64
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.0)
    }

    pub fn plus_days(&self, days: i64) -> Self {
        Self(self.0 + days * Self::MICROS_PER_DAY)
    }
}

/// The six traditional wrist pulse positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PulsePosition {
    LeftCun,
    LeftGuan,
    LeftChi,
    RightCun,
    RightGuan,
    RightChi,
}

impl PulsePosition {
    pub const ALL: [PulsePosition; 6] = [
        PulsePosition::LeftCun,
        PulsePosition::LeftGuan,
        PulsePosition::LeftChi,
        PulsePosition::RightCun,
        PulsePosition::RightGuan,
        PulsePosition::RightChi,
    ];

    /// Canonical channel order used by six-channel devices
    pub fn from_channel(channel: u8) -> Option<Self> {
        Self::ALL.get(channel as usize).copied()
    }

    pub fn channel(&self) -> u8 {
        match self {
            PulsePosition::LeftCun => 0,
            PulsePosition::LeftGuan => 1,
            PulsePosition::LeftChi => 2,
            PulsePosition::RightCun => 3,
            PulsePosition::RightGuan => 4,
            PulsePosition::RightChi => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PulsePosition::LeftCun => "left cun",
            PulsePosition::LeftGuan => "left guan",
            PulsePosition::LeftChi => "left chi",
            PulsePosition::RightCun => "right cun",
            PulsePosition::RightGuan => "right guan",
            PulsePosition::RightChi => "right chi",
        }
    }

    pub fn is_left(&self) -> bool {
        matches!(
            self,
            PulsePosition::LeftCun | PulsePosition::LeftGuan | PulsePosition::LeftChi
        )
    }

    /// Organ conventionally read at this position.
    ///
    /// Left: heart, liver, kidney (yin). Right: lung, spleen, kidney (yang).
    pub fn organ(&self) -> Organ {
        match self {
            PulsePosition::LeftCun => Organ::Heart,
            PulsePosition::LeftGuan => Organ::Liver,
            PulsePosition::LeftChi => Organ::Kidney,
            PulsePosition::RightCun => Organ::Lung,
            PulsePosition::RightGuan => Organ::Spleen,
            PulsePosition::RightChi => Organ::Kidney,
        }
    }

    pub fn element(&self) -> Element {
        self.organ().element()
    }
}

impl fmt::Display for PulsePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle state of a diagnostic session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Recording,
    FeatureExtracted,
    Analyzed,
    Completed,
    Aborted,
}

impl SessionStatus {
    pub fn name(&self) -> &'static str {
        match self {
            SessionStatus::Created => "created",
            SessionStatus::Recording => "recording",
            SessionStatus::FeatureExtracted => "feature_extracted",
            SessionStatus::Analyzed => "analyzed",
            SessionStatus::Completed => "completed",
            SessionStatus::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Aborted)
    }

    pub fn accepts_packets(&self) -> bool {
        matches!(self, SessionStatus::Created | SessionStatus::Recording)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sensor channels a device may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Pressure,
    Velocity,
    Temperature,
    Moisture,
}

/// Identity of the acquisition hardware for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub model: String,
    pub firmware: String,
    pub sensors: Vec<SensorKind>,
}

impl DeviceDescriptor {
    pub fn new(model: impl Into<String>, firmware: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            firmware: firmware.into(),
            sensors: vec![
                SensorKind::Pressure,
                SensorKind::Temperature,
                SensorKind::Moisture,
            ],
        }
    }

    pub fn with_sensors(mut self, sensors: Vec<SensorKind>) -> Self {
        self.sensors = sensors;
        self
    }

    pub fn has_sensor(&self, kind: SensorKind) -> bool {
        self.sensors.contains(&kind)
    }
}

/// Linear calibration for one pressure sensor: `value = (raw - offset) * scale`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorCalibration {
    pub offset: f64,
    pub scale: f64,
}

impl SensorCalibration {
    pub fn new(offset: f64, scale: f64) -> Self {
        Self { offset, scale }
    }

    pub fn identity() -> Self {
        Self::new(0.0, 1.0)
    }

    #[inline]
    pub fn apply(&self, raw: f64) -> f64 {
        (raw - self.offset) * self.scale
    }
}

/// Per-position calibration captured when a session starts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub sensors: BTreeMap<PulsePosition, SensorCalibration>,
    /// When the device was last calibrated; unknown skips the age check
    #[serde(default)]
    pub calibrated_at: Option<Timestamp>,
}

impl Calibration {
    /// Identity calibration for all six positions
    pub fn identity() -> Self {
        Self {
            sensors: PulsePosition::ALL
                .iter()
                .map(|p| (*p, SensorCalibration::identity()))
                .collect(),
            calibrated_at: None,
        }
    }

    pub fn with_calibrated_at(mut self, at: Timestamp) -> Self {
        self.calibrated_at = Some(at);
        self
    }

    /// Reject calibrations older than `max_age_days` at `now`
    pub fn check_age(&self, now: Timestamp, max_age_days: i64) -> Result<()> {
        let Some(at) = self.calibrated_at else {
            return Ok(());
        };
        let age = now.as_days_f64() - at.as_days_f64();
        if age > max_age_days as f64 {
            return Err(Error::InvalidCalibration(format!(
                "calibration is {:.0} days old, limit is {}",
                age, max_age_days
            )));
        }
        Ok(())
    }

    pub fn with_sensor(mut self, position: PulsePosition, cal: SensorCalibration) -> Self {
        self.sensors.insert(position, cal);
        self
    }

    pub fn get(&self, position: PulsePosition) -> Option<&SensorCalibration> {
        self.sensors.get(&position)
    }

    /// Validate against the positions a device reports
    pub fn validate(&self, positions: &[PulsePosition]) -> Result<()> {
        for position in positions {
            let cal = self.sensors.get(position).ok_or_else(|| {
                Error::InvalidCalibration(format!("no calibration for {}", position))
            })?;
            if !cal.offset.is_finite() {
                return Err(Error::InvalidCalibration(format!(
                    "non-finite offset for {}",
                    position
                )));
            }
            if !cal.scale.is_finite() || cal.scale <= 0.0 {
                return Err(Error::InvalidCalibration(format!(
                    "scale for {} must be positive, got {}",
                    position, cal.scale
                )));
            }
        }
        Ok(())
    }
}

/// Acquisition parameters agreed when a session starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Native device rate
    pub sample_rate_hz: f64,
    /// Length of `pressure_series` and `velocity_series` in every packet
    pub samples_per_packet: usize,
    /// Rate waveforms are resampled to before feature extraction
    pub canonical_rate_hz: f64,
    pub positions: Vec<PulsePosition>,
}

impl SamplingConfig {
    pub fn packet_duration_us(&self) -> i64 {
        (self.samples_per_packet as f64 / self.sample_rate_hz * 1e6).round() as i64
    }
}

/// Analyses a session may request before it can be marked analyzed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Pulse,
    Abdominal,
    Skin,
}

impl AnalysisKind {
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisKind::Pulse => "pulse",
            AnalysisKind::Abdominal => "abdominal",
            AnalysisKind::Skin => "skin",
        }
    }
}
