//! Device adapters for wrist-pulse hardware.
//!
//! Each adapter decodes one vendor's binary frame layout, converts units to
//! mmHg / °C / relative moisture, maps channels onto [`PulsePosition`]s and
//! applies the session calibration. Everything downstream only sees
//! [`RawPacket`]s.
//!
//! Supported models:
//!
//! - `suoke_wp100`: six channels at 1000 Hz, 16-bit ADC counts
//! - `tcm_pulsewave_pro`: six channels at 500 Hz, kPa with velocity
//! - `medsense_pr2000`: three channels per wrist at 250 Hz, no moisture sensor

use palpa_core::{
    Calibration, DeviceDescriptor, Error, PulsePosition, Result, SamplingConfig, SensorKind,
    SessionId, Timestamp,
};

use serde::{Deserialize, Serialize};

use crate::packet::{derive_velocity, RawPacket};

/// mmHg per kPa
const KPA_TO_MMHG: f64 = 7.50062;

/// Registration policy applied to every device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Calibrations older than this are refused
    pub calibration_interval_days: i64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            calibration_interval_days: 30,
        }
    }
}

/// What an adapter can deliver
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCapability {
    pub sample_rate_hz: f64,
    pub samples_per_packet: usize,
    pub positions: Vec<PulsePosition>,
    pub sensors: Vec<SensorKind>,
}

/// Per-session state an adapter needs to normalize frames
#[derive(Debug, Clone)]
pub struct AdapterContext {
    pub session_id: SessionId,
    pub calibration: Calibration,
}

/// Trait implemented once per supported device model
pub trait DeviceAdapter: Send + Sync {
    /// Model identifier matched against [`DeviceDescriptor::model`]
    fn model(&self) -> &'static str;

    /// Oldest firmware whose frame layout this adapter decodes
    fn min_firmware(&self) -> &'static str;

    fn capability(&self) -> DeviceCapability;

    /// Decode one vendor frame into a canonical packet
    fn normalize(&self, ctx: &AdapterContext, frame: &[u8]) -> Result<RawPacket>;
}

/// A registered adapter bound to one session
pub struct AdapterHandle {
    adapter: Box<dyn DeviceAdapter>,
    ctx: AdapterContext,
    sampling: SamplingConfig,
}

impl AdapterHandle {
    pub fn model(&self) -> &'static str {
        self.adapter.model()
    }

    pub fn session_id(&self) -> SessionId {
        self.ctx.session_id
    }

    pub fn sampling(&self) -> &SamplingConfig {
        &self.sampling
    }

    pub fn normalize(&self, frame: &[u8]) -> Result<RawPacket> {
        self.adapter.normalize(&self.ctx, frame)
    }
}

impl std::fmt::Debug for AdapterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterHandle")
            .field("model", &self.adapter.model())
            .field("session_id", &self.ctx.session_id)
            .field("sampling", &self.sampling)
            .finish()
    }
}

/// Resolves device models to adapters
pub struct AdapterFactory;

impl AdapterFactory {
    pub const SUPPORTED_MODELS: [&'static str; 3] =
        ["suoke_wp100", "tcm_pulsewave_pro", "medsense_pr2000"];

    /// Instantiate the adapter for a model
    pub fn create(model: &str) -> Result<Box<dyn DeviceAdapter>> {
        match model {
            "suoke_wp100" => Ok(Box::new(SuokeWp100Adapter)),
            "tcm_pulsewave_pro" => Ok(Box::new(PulseWaveProAdapter)),
            "medsense_pr2000" => Ok(Box::new(MedSensePr2000Adapter)),
            other => Err(Error::DeviceNotSupported {
                model: other.to_string(),
                reason: "unknown model".to_string(),
            }),
        }
    }

    /// Sampling a model would use, without binding it to a session
    pub fn sampling_for(model: &str, canonical_rate_hz: f64) -> Result<SamplingConfig> {
        let capability = Self::create(model)?.capability();
        Ok(SamplingConfig {
            sample_rate_hz: capability.sample_rate_hz,
            samples_per_packet: capability.samples_per_packet,
            canonical_rate_hz,
            positions: capability.positions,
        })
    }

    /// Bind an adapter to a session after checking firmware and calibration
    pub fn register(
        descriptor: &DeviceDescriptor,
        session_id: SessionId,
        calibration: Calibration,
        canonical_rate_hz: f64,
        config: &DeviceConfig,
    ) -> Result<AdapterHandle> {
        let adapter = Self::create(&descriptor.model)?;
        if !firmware_at_least(&descriptor.firmware, adapter.min_firmware()) {
            return Err(Error::DeviceNotSupported {
                model: descriptor.model.clone(),
                reason: format!(
                    "firmware {} is older than {}",
                    descriptor.firmware,
                    adapter.min_firmware()
                ),
            });
        }
        let capability = adapter.capability();
        calibration.validate(&capability.positions)?;
        calibration.check_age(Timestamp::now(), config.calibration_interval_days)?;

        tracing::info!(
            model = adapter.model(),
            firmware = %descriptor.firmware,
            session = %session_id,
            rate_hz = capability.sample_rate_hz,
            "Registered device adapter"
        );

        let sampling = SamplingConfig {
            sample_rate_hz: capability.sample_rate_hz,
            samples_per_packet: capability.samples_per_packet,
            canonical_rate_hz,
            positions: capability.positions,
        };

        Ok(AdapterHandle {
            adapter,
            ctx: AdapterContext {
                session_id,
                calibration,
            },
            sampling,
        })
    }
}

/// Dotted-integer version comparison; missing components count as zero and
/// anything unparseable fails.
fn firmware_at_least(version: &str, min: &str) -> bool {
    fn parse(v: &str) -> Option<Vec<u64>> {
        v.trim().split('.').map(|part| part.parse().ok()).collect()
    }
    let (Some(have), Some(need)) = (parse(version), parse(min)) else {
        return false;
    };
    let len = have.len().max(need.len());
    for i in 0..len {
        let a = have.get(i).copied().unwrap_or(0);
        let b = need.get(i).copied().unwrap_or(0);
        if a != b {
            return a > b;
        }
    }
    true
}

/// Little-endian cursor over a vendor frame
struct FrameReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| Error::InvalidPacket(format!("frame truncated at byte {}", self.pos)))?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.take()?))
    }

    fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take()?))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take()?))
    }
}

fn calibrate(ctx: &AdapterContext, position: PulsePosition, pressure: &mut [f64]) -> Result<()> {
    let cal = ctx.calibration.get(position).ok_or_else(|| {
        Error::InvalidCalibration(format!("no calibration for {}", position))
    })?;
    for p in pressure.iter_mut() {
        *p = cal.apply(*p);
    }
    Ok(())
}

/// Suoke WP-100 six-channel desk unit
///
/// Frame layout (little-endian):
/// `[0..8]` timestamp µs (i64), `[8]` channel, `[9..11]` sample count (u16),
/// `[11..13]` temperature in centi-°C (i16), `[13]` moisture percent,
/// then `count` ADC samples (i16, 0.05 mmHg per count).
pub struct SuokeWp100Adapter;

impl SuokeWp100Adapter {
    pub const SAMPLE_RATE_HZ: f64 = 1000.0;
    pub const SAMPLES_PER_PACKET: usize = 100;
    const MMHG_PER_COUNT: f64 = 0.05;
}

impl DeviceAdapter for SuokeWp100Adapter {
    fn model(&self) -> &'static str {
        "suoke_wp100"
    }

    fn min_firmware(&self) -> &'static str {
        "2.0"
    }

    fn capability(&self) -> DeviceCapability {
        DeviceCapability {
            sample_rate_hz: Self::SAMPLE_RATE_HZ,
            samples_per_packet: Self::SAMPLES_PER_PACKET,
            positions: PulsePosition::ALL.to_vec(),
            sensors: vec![
                SensorKind::Pressure,
                SensorKind::Temperature,
                SensorKind::Moisture,
            ],
        }
    }

    fn normalize(&self, ctx: &AdapterContext, frame: &[u8]) -> Result<RawPacket> {
        let mut r = FrameReader::new(frame);
        let timestamp = r.i64()?;
        let channel = r.u8()?;
        let count = r.u16()? as usize;
        let temperature = r.i16()? as f64 / 100.0;
        let moisture = r.u8()? as f64 / 100.0;

        let position = PulsePosition::from_channel(channel)
            .ok_or_else(|| Error::InvalidPacket(format!("unknown WP-100 channel {}", channel)))?;

        let mut pressure = Vec::with_capacity(count);
        for _ in 0..count {
            pressure.push(r.i16()? as f64 * Self::MMHG_PER_COUNT);
        }
        calibrate(ctx, position, &mut pressure)?;

        Ok(RawPacket::new(
            ctx.session_id,
            Timestamp::from_micros(timestamp),
            position,
            pressure,
            Self::SAMPLE_RATE_HZ,
        )
        .with_skin(temperature, Some(moisture)))
    }
}

/// TCM PulseWave Pro, reports pressure and velocity in kPa
///
/// Frame layout: `[0..8]` timestamp µs, `[8]` channel, `[9..11]` count,
/// `[11..15]` temperature °C (f32), `[15..19]` moisture percent (f32), then
/// `count` pairs of (pressure kPa, velocity kPa/s) as f32.
pub struct PulseWaveProAdapter;

impl PulseWaveProAdapter {
    pub const SAMPLE_RATE_HZ: f64 = 500.0;
    pub const SAMPLES_PER_PACKET: usize = 50;
}

impl DeviceAdapter for PulseWaveProAdapter {
    fn model(&self) -> &'static str {
        "tcm_pulsewave_pro"
    }

    fn min_firmware(&self) -> &'static str {
        "1.2"
    }

    fn capability(&self) -> DeviceCapability {
        DeviceCapability {
            sample_rate_hz: Self::SAMPLE_RATE_HZ,
            samples_per_packet: Self::SAMPLES_PER_PACKET,
            positions: PulsePosition::ALL.to_vec(),
            sensors: vec![
                SensorKind::Pressure,
                SensorKind::Velocity,
                SensorKind::Temperature,
                SensorKind::Moisture,
            ],
        }
    }

    fn normalize(&self, ctx: &AdapterContext, frame: &[u8]) -> Result<RawPacket> {
        let mut r = FrameReader::new(frame);
        let timestamp = r.i64()?;
        let channel = r.u8()?;
        let count = r.u16()? as usize;
        let temperature = r.f32()? as f64;
        let moisture = r.f32()? as f64 / 100.0;

        let position = PulsePosition::from_channel(channel).ok_or_else(|| {
            Error::InvalidPacket(format!("unknown PulseWave Pro channel {}", channel))
        })?;

        let mut pressure = Vec::with_capacity(count);
        let mut velocity = Vec::with_capacity(count);
        for _ in 0..count {
            pressure.push(r.f32()? as f64 * KPA_TO_MMHG);
            velocity.push(r.f32()? as f64 * KPA_TO_MMHG);
        }
        calibrate(ctx, position, &mut pressure)?;
        if let Some(cal) = ctx.calibration.get(position) {
            // offset cancels in a derivative
            velocity.iter_mut().for_each(|v| *v *= cal.scale);
        }

        Ok(RawPacket::new(
            ctx.session_id,
            Timestamp::from_micros(timestamp),
            position,
            pressure,
            Self::SAMPLE_RATE_HZ,
        )
        .with_velocity(velocity)
        .with_skin(temperature, Some(moisture)))
    }
}

/// MedSense PR-2000 portable unit, one three-sensor head moved between wrists
///
/// Frame layout: `[0..8]` timestamp µs, `[8]` wrist (0 left, 1 right),
/// `[9]` sensor (0 cun, 1 guan, 2 chi), `[10..12]` count,
/// `[12..16]` temperature °C (f32), then `count` pressure samples in mmHg (f32).
pub struct MedSensePr2000Adapter;

impl MedSensePr2000Adapter {
    pub const SAMPLE_RATE_HZ: f64 = 250.0;
    pub const SAMPLES_PER_PACKET: usize = 25;
}

impl DeviceAdapter for MedSensePr2000Adapter {
    fn model(&self) -> &'static str {
        "medsense_pr2000"
    }

    fn min_firmware(&self) -> &'static str {
        "0.8"
    }

    fn capability(&self) -> DeviceCapability {
        DeviceCapability {
            sample_rate_hz: Self::SAMPLE_RATE_HZ,
            samples_per_packet: Self::SAMPLES_PER_PACKET,
            positions: PulsePosition::ALL.to_vec(),
            sensors: vec![SensorKind::Pressure, SensorKind::Temperature],
        }
    }

    fn normalize(&self, ctx: &AdapterContext, frame: &[u8]) -> Result<RawPacket> {
        let mut r = FrameReader::new(frame);
        let timestamp = r.i64()?;
        let wrist = r.u8()?;
        let sensor = r.u8()?;
        let count = r.u16()? as usize;
        let temperature = r.f32()? as f64;

        if wrist > 1 || sensor > 2 {
            return Err(Error::InvalidPacket(format!(
                "unknown PR-2000 wrist/sensor {}/{}",
                wrist, sensor
            )));
        }
        let channel = wrist * 3 + sensor;
        let position = PulsePosition::from_channel(channel)
            .ok_or_else(|| Error::InvalidPacket(format!("unknown PR-2000 channel {}", channel)))?;

        let mut pressure = Vec::with_capacity(count);
        for _ in 0..count {
            pressure.push(r.f32()? as f64);
        }
        calibrate(ctx, position, &mut pressure)?;
        let velocity = derive_velocity(&pressure, Self::SAMPLE_RATE_HZ);

        Ok(RawPacket::new(
            ctx.session_id,
            Timestamp::from_micros(timestamp),
            position,
            pressure,
            Self::SAMPLE_RATE_HZ,
        )
        .with_velocity(velocity)
        .with_skin(temperature, None))
    }
}
