//! Session lifecycle.
//!
//! ```text
//! created ──ingest──▶ recording ──extract──▶ feature_extracted ──all requested done──▶ analyzed ──▶ completed
//!    │                    │                       ▲       │                                  │
//!    │                    │                       └─re-extract───────────────────────────────┘
//!    └────────────────────┴───────────────────────┴──────────────── abort ──▶ aborted
//! ```
//!
//! `completed` and `aborted` are terminal.

use std::collections::{BTreeMap, BTreeSet};

use palpa_core::{
    AnalysisKind, Calibration, DeviceDescriptor, Error, PulsePosition, Result, SamplingConfig, SessionId,
    SessionStatus, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;

/// An error surfaced to the caller and kept on the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionError {
    pub kind: String,
    pub message: String,
    pub at: Timestamp,
}

impl From<&Error> for SessionError {
    fn from(error: &Error) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
            at: Timestamp::now(),
        }
    }
}

/// One diagnostic session. Downstream records refer to it by id only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub device: DeviceDescriptor,
    pub calibration: Calibration,
    pub sampling: SamplingConfig,
    pub status: SessionStatus,
    pub created_at: Timestamp,
    pub ended_at: Option<Timestamp>,
    pub requested: BTreeSet<AnalysisKind>,
    pub completed: BTreeSet<AnalysisKind>,
    pub errors: Vec<SessionError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

impl Session {
    pub fn new(
        id: SessionId,
        user_id: UserId,
        device: DeviceDescriptor,
        calibration: Calibration,
        sampling: SamplingConfig,
        requested: impl IntoIterator<Item = AnalysisKind>,
    ) -> Self {
        Self {
            id,
            user_id,
            device,
            calibration,
            sampling,
            status: SessionStatus::Created,
            created_at: Timestamp::now(),
            ended_at: None,
            requested: requested.into_iter().collect(),
            completed: BTreeSet::new(),
            errors: Vec::new(),
            abort_reason: None,
        }
    }

    fn state_error(&self, operation: &str) -> Error {
        Error::SessionState {
            session: self.id,
            status: self.status,
            operation: operation.to_string(),
        }
    }

    fn transition(&mut self, to: SessionStatus, operation: &str) -> Result<()> {
        if !can_transition(self.status, to) {
            return Err(self.state_error(operation));
        }
        if self.status != to {
            tracing::info!(session = %self.id, from = %self.status, to = %to, "Session transition");
        }
        self.status = to;
        Ok(())
    }

    pub fn ensure_accepts_packets(&self) -> Result<()> {
        if self.status.accepts_packets() {
            Ok(())
        } else {
            Err(self.state_error("ingest packets"))
        }
    }

    pub fn ensure_active(&self, operation: &str) -> Result<()> {
        if self.status.is_terminal() {
            Err(self.state_error(operation))
        } else {
            Ok(())
        }
    }

    /// First accepted packet moves a new session to recording
    pub fn begin_recording(&mut self) -> Result<()> {
        match self.status {
            SessionStatus::Created => self.transition(SessionStatus::Recording, "begin recording"),
            SessionStatus::Recording => Ok(()),
            _ => Err(self.state_error("ingest packets")),
        }
    }

    /// Check packet counts before extraction
    pub fn check_extractable(&self, counts: &BTreeMap<PulsePosition, usize>, config: &SessionConfig) -> Result<()> {
        if !matches!(
            self.status,
            SessionStatus::Recording | SessionStatus::FeatureExtracted | SessionStatus::Analyzed
        ) {
            return Err(self.state_error("extract features"));
        }
        let required = config.min_packets_per_position.max(1);
        for position in config
            .required_positions
            .iter()
            .filter(|p| self.sampling.positions.contains(p))
        {
            let available = counts.get(position).copied().unwrap_or(0);
            if available < required {
                return Err(Error::InsufficientData {
                    context: format!("packets at {}", position),
                    required,
                    available,
                });
            }
        }
        Ok(())
    }

    /// Features replaced wholesale; earlier pulse results no longer apply.
    /// Goes straight on to analyzed when nothing requested is pending.
    pub fn mark_extracted(&mut self) -> Result<()> {
        self.transition(SessionStatus::FeatureExtracted, "extract features")?;
        self.completed.remove(&AnalysisKind::Pulse);
        if self.pending_analyses().is_empty() {
            self.transition(SessionStatus::Analyzed, "extract features")?;
        }
        Ok(())
    }

    /// Record a finished sub-analysis and advance once all requested are done
    pub fn record_analysis(&mut self, kind: AnalysisKind) -> Result<()> {
        self.ensure_active("record analysis")?;
        if kind == AnalysisKind::Pulse
            && !matches!(self.status, SessionStatus::FeatureExtracted | SessionStatus::Analyzed)
        {
            return Err(Error::AnalysisDependencyMissing(format!(
                "pulse analysis of session {} requires extracted features",
                self.id
            )));
        }
        self.completed.insert(kind);
        if self.status == SessionStatus::FeatureExtracted && self.requested.is_subset(&self.completed) {
            self.transition(SessionStatus::Analyzed, "record analysis")?;
        }
        Ok(())
    }

    pub fn complete(&mut self) -> Result<()> {
        self.transition(SessionStatus::Completed, "complete session")?;
        self.ended_at = Some(Timestamp::now());
        Ok(())
    }

    pub fn abort(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(SessionStatus::Aborted, "abort session")?;
        let reason = reason.into();
        tracing::warn!(session = %self.id, reason = %reason, "Session aborted");
        self.abort_reason = Some(reason);
        self.ended_at = Some(Timestamp::now());
        Ok(())
    }

    pub fn record_error(&mut self, error: &Error) {
        self.errors.push(SessionError::from(error));
    }

    pub fn pending_analyses(&self) -> Vec<AnalysisKind> {
        self.requested.difference(&self.completed).copied().collect()
    }
}

/// Legal lifecycle edges; a state may always be re-entered except the
/// terminal ones
pub fn can_transition(from: SessionStatus, to: SessionStatus) -> bool {
    use SessionStatus::*;
    match (from, to) {
        (Completed | Aborted, _) => false,
        (_, Aborted) => true,
        (Created, Recording) | (Recording, Recording) => true,
        (Recording | FeatureExtracted | Analyzed, FeatureExtracted) => true,
        (FeatureExtracted | Analyzed, Analyzed) => true,
        (Analyzed, Completed) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(requested: &[AnalysisKind]) -> Session {
        Session::new(
            SessionId::new(),
            UserId::new(),
            DeviceDescriptor::new("suoke_wp100", "1.0"),
            Calibration::identity(),
            SamplingConfig {
                sample_rate_hz: 1000.0,
                samples_per_packet: 100,
                canonical_rate_hz: 200.0,
                positions: PulsePosition::ALL.to_vec(),
            },
            requested.iter().copied(),
        )
    }

    fn full_counts(n: usize) -> BTreeMap<PulsePosition, usize> {
        PulsePosition::ALL.iter().map(|p| (*p, n)).collect()
    }

    #[test]
    fn test_happy_path() {
        let mut s = session(&[AnalysisKind::Pulse]);
        s.begin_recording().unwrap();
        assert_eq!(s.status, SessionStatus::Recording);

        s.check_extractable(&full_counts(3), &SessionConfig::default()).unwrap();
        s.mark_extracted().unwrap();
        s.record_analysis(AnalysisKind::Pulse).unwrap();
        assert_eq!(s.status, SessionStatus::Analyzed);

        s.complete().unwrap();
        assert!(s.status.is_terminal());
        assert!(s.ended_at.is_some());
    }

    #[test]
    fn test_extraction_needs_every_required_position() {
        let mut s = session(&[AnalysisKind::Pulse]);
        s.begin_recording().unwrap();
        let mut counts = full_counts(2);
        counts.remove(&PulsePosition::RightChi);

        let err = s.check_extractable(&counts, &SessionConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InsufficientData { required: 1, available: 0, .. }));
        assert!(err.to_string().contains("right chi"));
    }

    #[test]
    fn test_extraction_before_recording_is_state_error() {
        let s = session(&[AnalysisKind::Pulse]);
        let err = s
            .check_extractable(&full_counts(1), &SessionConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::SessionState { .. }));
    }

    #[test]
    fn test_analyzed_waits_for_all_requested() {
        let mut s = session(&[AnalysisKind::Pulse, AnalysisKind::Abdominal]);
        s.begin_recording().unwrap();
        s.record_analysis(AnalysisKind::Abdominal).unwrap();
        assert_eq!(s.status, SessionStatus::Recording);

        s.mark_extracted().unwrap();
        s.record_analysis(AnalysisKind::Pulse).unwrap();
        assert_eq!(s.status, SessionStatus::Analyzed);
        assert!(s.pending_analyses().is_empty());
    }

    #[test]
    fn test_extraction_completes_analyses_finished_early() {
        let mut s = session(&[AnalysisKind::Abdominal]);
        s.begin_recording().unwrap();
        s.record_analysis(AnalysisKind::Abdominal).unwrap();
        assert_eq!(s.status, SessionStatus::Recording);

        s.mark_extracted().unwrap();
        assert_eq!(s.status, SessionStatus::Analyzed);
        s.complete().unwrap();
        assert_eq!(s.status, SessionStatus::Completed);
    }

    #[test]
    fn test_pulse_analysis_needs_features() {
        let mut s = session(&[AnalysisKind::Pulse]);
        s.begin_recording().unwrap();
        let err = s.record_analysis(AnalysisKind::Pulse).unwrap_err();
        assert!(matches!(err, Error::AnalysisDependencyMissing(_)));
    }

    #[test]
    fn test_re_extraction_resets_pulse() {
        let mut s = session(&[AnalysisKind::Pulse]);
        s.begin_recording().unwrap();
        s.mark_extracted().unwrap();
        s.record_analysis(AnalysisKind::Pulse).unwrap();

        s.mark_extracted().unwrap();
        assert_eq!(s.status, SessionStatus::FeatureExtracted);
        assert_eq!(s.pending_analyses(), vec![AnalysisKind::Pulse]);
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        let mut s = session(&[AnalysisKind::Pulse]);
        s.abort("patient left").unwrap();
        assert_eq!(s.abort_reason.as_deref(), Some("patient left"));

        assert!(s.ensure_accepts_packets().is_err());
        assert!(s.begin_recording().is_err());
        assert!(s.mark_extracted().is_err());
        assert!(s.record_analysis(AnalysisKind::Skin).is_err());
        assert!(s.complete().is_err());
        assert!(s.abort("again").is_err());
    }

    #[test]
    fn test_complete_requires_analyzed() {
        let mut s = session(&[AnalysisKind::Pulse]);
        s.begin_recording().unwrap();
        let err = s.complete().unwrap_err();
        assert!(matches!(
            err,
            Error::SessionState {
                status: SessionStatus::Recording,
                ..
            }
        ));
    }

    #[test]
    fn test_transition_table() {
        use SessionStatus::*;
        let all = [Created, Recording, FeatureExtracted, Analyzed, Completed, Aborted];
        for to in all {
            assert!(!can_transition(Completed, to));
            assert!(!can_transition(Aborted, to));
        }
        assert!(!can_transition(Created, FeatureExtracted));
        assert!(!can_transition(Recording, Analyzed));
        assert!(can_transition(Analyzed, FeatureExtracted));
    }
}
