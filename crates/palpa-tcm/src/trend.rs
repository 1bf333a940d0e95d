//! Trend and comparison analysis over a user's historical reports.
//!
//! Sessions are rarely evenly spaced, so each metric is fitted by least
//! squares against actual timestamps (in days) rather than session index.
//! The fitted slope times the covered span gives the projected change; a
//! projected change smaller than `min_delta` is reported as stable.

use std::collections::{BTreeMap, BTreeSet};

use palpa_core::{Error, Result, SessionId, Timestamp};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::fusion::ComprehensiveAnalysis;
use crate::patterns::Pattern;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Changes smaller than this are noise
    pub min_delta: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self { min_delta: 0.05 }
    }
}

/// Which way a metric should move for the patient to be doing better
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    LowerIsBetter,
    HigherIsBetter,
    Neutral,
}

impl Polarity {
    pub fn of(metric: &str) -> Self {
        if metric == Pattern::Balanced.key() || metric == "pulse.regularity" {
            Polarity::HigherIsBetter
        } else if metric.starts_with("pattern.")
            || metric.ends_with(".max_severity")
            || metric.ends_with(".finding_count")
        {
            Polarity::LowerIsBetter
        } else {
            Polarity::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Worsening,
    Stable,
    /// Rising metric without a clinical polarity
    Increasing,
    /// Falling metric without a clinical polarity
    Decreasing,
}

impl TrendDirection {
    pub fn classify(metric: &str, change: f64, min_delta: f64) -> Self {
        if !change.is_finite() || change.abs() < min_delta {
            return TrendDirection::Stable;
        }
        match (Polarity::of(metric), change > 0.0) {
            (Polarity::LowerIsBetter, true) | (Polarity::HigherIsBetter, false) => TrendDirection::Worsening,
            (Polarity::LowerIsBetter, false) | (Polarity::HigherIsBetter, true) => TrendDirection::Improving,
            (Polarity::Neutral, true) => TrendDirection::Increasing,
            (Polarity::Neutral, false) => TrendDirection::Decreasing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallTrend {
    Improving,
    Worsening,
    Stable,
    Mixed,
}

impl OverallTrend {
    fn from_directions<'a>(directions: impl Iterator<Item = &'a TrendDirection>) -> Self {
        let (mut improving, mut worsening) = (0, 0);
        for d in directions {
            match d {
                TrendDirection::Improving => improving += 1,
                TrendDirection::Worsening => worsening += 1,
                _ => {}
            }
        }
        match (improving, worsening) {
            (0, 0) => OverallTrend::Stable,
            (_, 0) => OverallTrend::Improving,
            (0, _) => OverallTrend::Worsening,
            _ => OverallTrend::Mixed,
        }
    }
}

/// Inclusive time range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeFrame {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeFrame {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// The `days` days up to `end`
    pub fn last_days(end: Timestamp, days: i64) -> Self {
        Self {
            start: end.plus_days(-days),
            end,
        }
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        self.start <= ts && ts <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTrend {
    pub metric: String,
    pub samples: usize,
    pub first: f64,
    pub last: f64,
    pub slope_per_day: f64,
    /// Fitted change across the covered span
    pub projected_change: f64,
    pub direction: TrendDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub session_count: usize,
    pub start: Timestamp,
    pub end: Timestamp,
    pub span_days: f64,
    pub metrics: Vec<MetricTrend>,
    pub improving: Vec<String>,
    pub worsening: Vec<String>,
    pub overall: OverallTrend,
    pub summary: String,
}

impl TrendAnalysis {
    pub fn metric(&self, name: &str) -> Option<&MetricTrend> {
        self.metrics.iter().find(|m| m.metric == name)
    }
}

/// Values of one metric per session, `(days since first, value)`
type Series = Vec<(f64, f64)>;

/// Pattern confidences are 0 in sessions that did not report the pattern;
/// other metrics are simply absent there.
fn metric_value(analysis: &ComprehensiveAnalysis, key: &str) -> Option<f64> {
    match analysis.metric(key) {
        Some(v) if v.is_finite() => Some(v),
        Some(_) => None,
        None if key.starts_with("pattern.") => Some(0.0),
        None => None,
    }
}

/// Trend across a set of analyses, in any order.
///
/// Checks `cancel` before each session; fails with `Cancelled` once
/// triggered and with `InsufficientData` for fewer than two analyses.
pub fn analyze_trend(
    analyses: &[ComprehensiveAnalysis],
    config: &TrendConfig,
    cancel: &CancellationToken,
) -> Result<TrendAnalysis> {
    if analyses.len() < 2 {
        return Err(Error::InsufficientData {
            context: "trend analysis".to_string(),
            required: 2,
            available: analyses.len(),
        });
    }

    let mut ordered: Vec<&ComprehensiveAnalysis> = analyses.iter().collect();
    ordered.sort_by_key(|a| a.created_at);
    let start = ordered[0].created_at;
    let end = ordered[ordered.len() - 1].created_at;
    let span_days = (end.as_days_f64() - start.as_days_f64()).max(0.0);

    let keys: BTreeSet<&str> = ordered
        .iter()
        .flat_map(|a| a.metrics.keys().map(String::as_str))
        .collect();

    let mut series: BTreeMap<&str, Series> = BTreeMap::new();
    for analysis in &ordered {
        if cancel.is_cancelled() {
            tracing::info!(session_id = ?analysis.session_id, "Trend analysis cancelled");
            return Err(Error::Cancelled);
        }
        let day = analysis.created_at.as_days_f64() - start.as_days_f64();
        for key in &keys {
            if let Some(value) = metric_value(analysis, key) {
                series.entry(*key).or_default().push((day, value));
            }
        }
    }

    let metrics: Vec<MetricTrend> = series
        .into_iter()
        .filter(|(_, points)| points.len() >= 2)
        .map(|(key, points)| {
            let slope = least_squares_slope(&points);
            let covered = points[points.len() - 1].0 - points[0].0;
            let projected_change = slope * covered;
            MetricTrend {
                metric: key.to_string(),
                samples: points.len(),
                first: points[0].1,
                last: points[points.len() - 1].1,
                slope_per_day: slope,
                projected_change,
                direction: TrendDirection::classify(key, projected_change, config.min_delta),
            }
        })
        .collect();

    let overall = OverallTrend::from_directions(metrics.iter().map(|m| &m.direction));
    let improving = names_with(&metrics, TrendDirection::Improving);
    let worsening = names_with(&metrics, TrendDirection::Worsening);
    let summary = format!(
        "{} sessions over {:.1} days: {} improving, {} worsening ({:?})",
        ordered.len(),
        span_days,
        improving.len(),
        worsening.len(),
        overall
    );

    tracing::debug!(
        sessions = ordered.len(),
        metrics = metrics.len(),
        ?overall,
        "Trend analysis complete"
    );

    Ok(TrendAnalysis {
        session_count: ordered.len(),
        start,
        end,
        span_days,
        metrics,
        improving,
        worsening,
        overall,
        summary,
    })
}

fn names_with(metrics: &[MetricTrend], direction: TrendDirection) -> Vec<String> {
    metrics
        .iter()
        .filter(|m| m.direction == direction)
        .map(|m| m.metric.clone())
        .collect()
}

/// Ordinary least squares slope; 0 when every sample shares one timestamp
fn least_squares_slope(points: &[(f64, f64)]) -> f64 {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (x, y) in points {
        sxy += (x - mean_x) * (y - mean_y);
        sxx += (x - mean_x) * (x - mean_x);
    }
    if sxx <= f64::EPSILON {
        0.0
    } else {
        sxy / sxx
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternChange {
    pub pattern: Pattern,
    pub name: String,
    pub baseline_confidence: Option<f64>,
    pub comparison_confidence: Option<f64>,
}

impl PatternChange {
    pub fn delta(&self) -> f64 {
        self.comparison_confidence.unwrap_or(0.0) - self.baseline_confidence.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricChange {
    pub metric: String,
    pub baseline: f64,
    pub comparison: f64,
    pub delta: f64,
    pub direction: TrendDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionComparison {
    pub baseline_id: Option<SessionId>,
    pub comparison_id: Option<SessionId>,
    pub days_between: f64,
    /// Present now, absent at baseline
    pub added: Vec<PatternChange>,
    /// Present at baseline, absent now
    pub resolved: Vec<PatternChange>,
    pub persisting: Vec<PatternChange>,
    pub changed_metrics: Vec<MetricChange>,
    pub overall: OverallTrend,
}

/// Compare two reports; `baseline` is the earlier point of reference
pub fn compare_analyses(
    baseline: &ComprehensiveAnalysis,
    comparison: &ComprehensiveAnalysis,
    config: &TrendConfig,
) -> SessionComparison {
    let before: BTreeMap<Pattern, f64> = baseline.patterns.iter().map(|p| (p.pattern, p.confidence)).collect();
    let after: BTreeMap<Pattern, f64> = comparison.patterns.iter().map(|p| (p.pattern, p.confidence)).collect();

    let (mut added, mut resolved, mut persisting) = (Vec::new(), Vec::new(), Vec::new());
    for pattern in before.keys().chain(after.keys()).collect::<BTreeSet<_>>() {
        let change = PatternChange {
            pattern: *pattern,
            name: pattern.name().to_string(),
            baseline_confidence: before.get(pattern).copied(),
            comparison_confidence: after.get(pattern).copied(),
        };
        match (change.baseline_confidence, change.comparison_confidence) {
            (Some(_), Some(_)) => persisting.push(change),
            (Some(_), None) => resolved.push(change),
            (None, Some(_)) => added.push(change),
            (None, None) => {}
        }
    }

    let keys: BTreeSet<&str> = baseline
        .metrics
        .keys()
        .chain(comparison.metrics.keys())
        .map(String::as_str)
        .collect();
    let changed_metrics: Vec<MetricChange> = keys
        .into_iter()
        .filter_map(|key| {
            let b = metric_value(baseline, key)?;
            let c = metric_value(comparison, key)?;
            let delta = c - b;
            (delta.abs() >= config.min_delta).then(|| MetricChange {
                metric: key.to_string(),
                baseline: b,
                comparison: c,
                delta,
                direction: TrendDirection::classify(key, delta, config.min_delta),
            })
        })
        .collect();

    let overall = OverallTrend::from_directions(changed_metrics.iter().map(|m| &m.direction));
    let days_between = comparison.created_at.as_days_f64() - baseline.created_at.as_days_f64();

    tracing::debug!(
        added = added.len(),
        resolved = resolved.len(),
        persisting = persisting.len(),
        changed = changed_metrics.len(),
        days_between,
        "Compared sessions"
    );

    SessionComparison {
        baseline_id: baseline.session_id,
        comparison_id: comparison.session_id,
        days_between,
        added,
        resolved,
        persisting,
        changed_metrics,
        overall,
    }
}
