//! End-to-end run over synthetic recordings.
//!
//! ```text
//! palpa-demo [config-file]
//! ```
//!
//! Without a file, configuration comes from `PALPA_*` environment variables.

use anyhow::{Context, Result};
use futures::stream;
use tokio_util::sync::CancellationToken;

use palpa_core::{AnalysisKind, Calibration, DeviceDescriptor, Timestamp, UserId};
use palpa_engine::{telemetry, EngineConfig, HealthLevel, PalpationService, PulseAnalysisOptions};
use palpa_signal::SyntheticPulse;
use palpa_tcm::{AbdominalObservation, AbdominalRegion, SkinObservation, SkinRegion, TimeFrame};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init(telemetry::DEFAULT_FILTER).context("installing tracing subscriber")?;

    let mut config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_file(&path).with_context(|| format!("loading {}", path))?,
        None => EngineConfig::from_env().context("loading configuration from environment")?,
    };
    config.session.requested_analyses = vec![AnalysisKind::Pulse, AnalysisKind::Abdominal];

    let service = PalpationService::in_memory(config)?;
    let health = service.health_check(HealthLevel::Full).await;
    tracing::info!(status = ?health.status, "Health check");

    let user = UserId::new();
    let recordings = [
        ("steady", SyntheticPulse::default()),
        ("rapid", SyntheticPulse::default().with_rate(108.0).with_amplitude(14.0)),
    ];

    let mut sessions = Vec::new();
    for (label, generator) in recordings {
        let (id, sampling) = service
            .start_session(user, DeviceDescriptor::new("suoke_wp100", "2.1"), Calibration::identity())
            .await?;

        let packets: Vec<_> = sampling
            .positions
            .iter()
            .flat_map(|p| generator.packets(id, *p, 10.0))
            .collect();
        let ingest = service.ingest_packets(stream::iter(packets)).await?;
        tracing::info!(label, accepted = ingest.accepted_count, rejected = ingest.rejected_count, "Ingested");

        let extraction = service.extract_features(id, false).await?;
        tracing::info!(label, mean_quality = extraction.quality.mean_signal_quality, "Extracted");

        let pulse = service
            .analyze_pulse(
                id,
                PulseAnalysisOptions {
                    symptoms: vec!["irritability".to_string()],
                },
            )
            .await?;
        println!("[{}] {}", label, pulse.summary);

        service
            .analyze_abdominal(
                Some(id),
                &[AbdominalObservation::new(AbdominalRegion::RightHypochondrium).with_tenderness(0.7)],
            )
            .await?;
        service
            .analyze_skin(Some(id), &[SkinObservation::new(SkinRegion::Palm).with_moisture(0.8)])
            .await?;

        let report = service.get_comprehensive_analysis(id, true, true).await?;
        println!("[{}] {}", label, report.overview.summary);
        for alert in &report.alerts {
            println!("[{}] alert {:.2}: {}", label, alert.severity, alert.description);
        }
        for p in report.patterns.iter().take(3) {
            println!("[{}]   {} {:.2}", label, p.name, p.confidence);
        }

        service.complete_session(id).await?;
        sessions.push(id);
    }

    let cmp = service.compare_sessions(sessions[0], sessions[1]).await?;
    println!(
        "comparison: {:?}, {} added, {} resolved, {} persisting",
        cmp.overall,
        cmp.added.len(),
        cmp.resolved.len(),
        cmp.persisting.len()
    );

    let report = service
        .user_trend(user, TimeFrame::last_days(Timestamp::now(), 1), &CancellationToken::new())
        .await?;
    if let Some(trend) = report.trend {
        println!("trend: {:?} - {}", trend.overall, trend.summary);
    }
    Ok(())
}
