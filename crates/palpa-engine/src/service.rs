//! Service facade over the session store and the analysis pipeline.
//!
//! Every CPU-bound step (extraction, classification, mapping, the full
//! health check) runs through [`PalpationService::run_blocking`], which takes
//! a worker permit and moves the job to tokio's blocking pool.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, Semaphore};
use tokio_util::sync::CancellationToken;

use palpa_core::{
    AnalysisKind, Calibration, DeviceDescriptor, Error, PulsePosition, Result, SamplingConfig, SessionId,
    SessionStatus, Timestamp, UserId,
};
use palpa_signal::{AdapterFactory, AdapterHandle, FeatureExtractor, FeatureSet, QualityIssue, RawPacket, SyntheticPulse};
use palpa_tcm::{
    analyze_trend, compare_analyses, AbdominalAnalyzer, AbdominalObservation, ComprehensiveAnalysis, Finding,
    FusionEngine, FusionInputs, OrganCondition, Pattern, PatternMapper, PulseClassification, PulseClassifier,
    PulseEvidence, PatternMapping, SessionComparison, SkinAnalysis, SkinAnalyzer, SkinObservation, TcmPattern,
    TimeFrame, TrendAnalysis,
};

use crate::config::EngineConfig;
use crate::session::{Session, SessionError};
use crate::store::{InMemorySessionStore, SessionStore};

/// Why one packet (or undecodable frame) was refused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketRejection {
    /// Position of the packet in the ingested stream
    pub index: usize,
    pub session_id: Option<SessionId>,
    pub position: Option<PulsePosition>,
    pub kind: String,
    pub reason: String,
}

/// Outcome of one ingestion call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub packet_count: usize,
    pub accepted_count: usize,
    pub rejected_count: usize,
    /// False as soon as any packet of this call was rejected
    pub accepted: bool,
    pub rejections: Vec<PacketRejection>,
}

impl IngestSummary {
    fn reject(&mut self, index: usize, packet: Option<&RawPacket>, error: &Error) {
        tracing::warn!(
            index,
            session_id = ?packet.map(|p| p.session_id),
            position = ?packet.map(|p| p.position),
            error = %error,
            "Rejected packet"
        );
        self.rejected_count += 1;
        self.rejections.push(PacketRejection {
            index,
            session_id: packet.map(|p| p.session_id),
            position: packet.map(|p| p.position),
            kind: error.kind().to_string(),
            reason: error.to_string(),
        });
    }
}

/// Quality across every extracted position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateQuality {
    pub mean_signal_quality: f64,
    pub min_signal_quality: f64,
    pub valid_positions: usize,
    pub invalid_positions: Vec<PulsePosition>,
    pub issues: Vec<QualityIssue>,
}

impl AggregateQuality {
    fn from_sets(sets: &[FeatureSet]) -> Self {
        let qualities: Vec<f64> = sets.iter().map(|s| s.quality.signal_quality).collect();
        let mean_signal_quality = if qualities.is_empty() {
            0.0
        } else {
            qualities.iter().sum::<f64>() / qualities.len() as f64
        };
        let min_signal_quality = qualities.iter().copied().fold(f64::INFINITY, f64::min);

        let mut issues = Vec::new();
        for issue in sets.iter().flat_map(|s| s.quality.quality_issues.iter()) {
            if !issues.contains(issue) {
                issues.push(*issue);
            }
        }

        Self {
            mean_signal_quality,
            min_signal_quality: if min_signal_quality.is_finite() { min_signal_quality } else { 0.0 },
            valid_positions: sets.iter().filter(|s| s.is_valid()).count(),
            invalid_positions: sets.iter().filter(|s| !s.is_valid()).map(|s| s.position).collect(),
            issues,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureExtraction {
    pub feature_sets: Vec<FeatureSet>,
    pub quality: AggregateQuality,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseAnalysisOptions {
    /// Free-text symptoms matched against pattern keywords
    pub symptoms: Vec<String>,
}

/// Pulse result of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseAnalysis {
    pub session_id: SessionId,
    pub created_at: Timestamp,
    pub classifications: Vec<PulseClassification>,
    pub patterns: Vec<TcmPattern>,
    pub organ_conditions: Vec<OrganCondition>,
    /// Mean confidence of each position's primary pulse type
    pub confidence: f64,
    pub low_confidence: bool,
    pub summary: String,
}

impl PulseAnalysis {
    fn new(session_id: SessionId, classifications: Vec<PulseClassification>, mapping: PatternMapping) -> Self {
        let primaries: Vec<f64> = classifications
            .iter()
            .filter_map(|c| c.primary().map(|h| h.confidence))
            .collect();
        let confidence = if primaries.is_empty() {
            0.0
        } else {
            primaries.iter().sum::<f64>() / primaries.len() as f64
        };
        let low_confidence = classifications.iter().any(|c| c.low_confidence)
            || mapping.patterns.iter().all(|p| p.low_confidence);

        let summary = match mapping.patterns.first() {
            Some(p) => format!(
                "{} positions classified; primary pattern {} ({:.2})",
                classifications.len(),
                p.name,
                p.confidence
            ),
            None => format!("{} positions classified; no pattern identified", classifications.len()),
        };

        Self {
            session_id,
            created_at: Timestamp::now(),
            classifications,
            patterns: mapping.patterns,
            organ_conditions: mapping.organ_conditions,
            confidence,
            low_confidence,
            summary,
        }
    }

    fn evidence(&self) -> PulseEvidence {
        PulseEvidence {
            classifications: self.classifications.clone(),
            mapping: PatternMapping {
                patterns: self.patterns.clone(),
                organ_conditions: self.organ_conditions.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    /// Service is up
    Minimal,
    /// Store and worker pool respond
    Basic,
    /// A synthetic recording runs through the whole pipeline
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub level: HealthLevel,
    /// Worst component status
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
    pub checked_at: Timestamp,
}

/// One line of a batch report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Option<SessionId>,
    pub created_at: Timestamp,
    pub top_pattern: Option<Pattern>,
    pub pattern_count: usize,
    pub confidence: f64,
    pub alert_count: usize,
    pub critical_alerts: usize,
}

impl From<&ComprehensiveAnalysis> for SessionSummary {
    fn from(analysis: &ComprehensiveAnalysis) -> Self {
        Self {
            session_id: analysis.session_id,
            created_at: analysis.created_at,
            top_pattern: analysis.patterns.first().map(|p| p.pattern),
            pattern_count: analysis.patterns.len(),
            confidence: analysis.confidence,
            alert_count: analysis.alerts.len(),
            critical_alerts: analysis
                .alerts
                .iter()
                .filter(|a| a.requires_immediate_attention)
                .count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchError {
    pub session_id: SessionId,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub summaries: Vec<SessionSummary>,
    /// Present when at least two sessions were analyzed
    pub trend: Option<TrendAnalysis>,
    pub errors: Vec<BatchError>,
    /// Stopped early by the caller's cancellation token
    pub cancelled: bool,
}

/// Entry point of the engine
pub struct PalpationService {
    config: EngineConfig,
    store: Arc<dyn SessionStore>,
    extractor: Arc<FeatureExtractor>,
    classifier: Arc<PulseClassifier>,
    mapper: Arc<PatternMapper>,
    abdominal: AbdominalAnalyzer,
    skin: SkinAnalyzer,
    fusion: FusionEngine,
    adapters: RwLock<HashMap<SessionId, Arc<AdapterHandle>>>,
    /// Held while a lifecycle change and the writes guarded by it happen
    locks: Mutex<HashMap<SessionId, Arc<AsyncMutex<()>>>>,
    workers: Arc<Semaphore>,
}

impl PalpationService {
    pub fn new(config: EngineConfig, store: Arc<dyn SessionStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            extractor: Arc::new(FeatureExtractor::new(
                config.preprocess.clone(),
                config.features.clone(),
            )),
            classifier: Arc::new(PulseClassifier::new(config.classifier.clone())),
            mapper: Arc::new(PatternMapper::new(config.mapper.clone())),
            abdominal: AbdominalAnalyzer::new(config.abdominal.clone()),
            skin: SkinAnalyzer::new(),
            fusion: FusionEngine::new(config.fusion.clone()),
            adapters: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            workers: Arc::new(Semaphore::new(config.workers.max_concurrent_jobs)),
            store,
            config,
        })
    }

    /// Service backed by an [`InMemorySessionStore`]
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        Self::new(config, Arc::new(InMemorySessionStore::new()))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Run a CPU-bound job on the blocking pool, bounded by the worker permits
    async fn run_blocking<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|_| Error::Cancelled)?;
        tokio::task::spawn_blocking(job)
            .await
            .map_err(|e| Error::Signal(format!("worker task failed: {}", e)))?
    }

    async fn lock_session(&self, id: SessionId) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.locks.lock().entry(id).or_default());
        lock.lock_owned().await
    }

    /// Drop a session's device and lock once it can no longer change
    fn release(&self, id: SessionId) {
        self.adapters.write().remove(&id);
        self.locks.lock().remove(&id);
    }

    async fn attach_error(&self, id: SessionId, error: &Error) {
        let entry = SessionError::from(error);
        let update = Box::new(move |s: &mut Session| {
            s.errors.push(entry);
            Ok(())
        });
        if let Err(e) = self.store.modify_session(id, update).await {
            tracing::warn!(session = %id, error = %e, "Failed to attach error to session");
        }
    }

    /// Register the device, validate its calibration and open a session
    pub async fn start_session(
        &self,
        user_id: UserId,
        device: DeviceDescriptor,
        calibration: Calibration,
    ) -> Result<(SessionId, SamplingConfig)> {
        let id = SessionId::new();
        let handle = AdapterFactory::register(
            &device,
            id,
            calibration.clone(),
            self.config.preprocess.canonical_rate_hz,
            &self.config.device,
        )?;
        let sampling = handle.sampling().clone();

        let session = Session::new(
            id,
            user_id,
            device,
            calibration,
            sampling.clone(),
            self.config.session.requested_analyses.iter().copied(),
        );
        self.store.insert_session(session).await?;
        self.adapters.write().insert(id, Arc::new(handle));

        tracing::info!(
            session = %id,
            user = %user_id,
            rate_hz = sampling.sample_rate_hz,
            samples_per_packet = sampling.samples_per_packet,
            "Session started"
        );
        Ok((id, sampling))
    }

    /// Ingest canonical packets, possibly for several sessions.
    ///
    /// Invalid packets are rejected one by one and never abort the call.
    pub async fn ingest_packets<S>(&self, packets: S) -> Result<IngestSummary>
    where
        S: Stream<Item = RawPacket> + Send,
    {
        self.ingest(packets.map(Ok)).await
    }

    /// Decode vendor frames with the session's adapter, then ingest them
    pub async fn ingest_frames(&self, session_id: SessionId, frames: Vec<Vec<u8>>) -> Result<IngestSummary> {
        let handle = self
            .adapters
            .read()
            .get(&session_id)
            .cloned()
            .ok_or(Error::SessionNotFound(session_id))?;
        let decoded: Vec<Result<RawPacket>> = frames.iter().map(|f| handle.normalize(f)).collect();
        self.ingest(stream::iter(decoded)).await
    }

    async fn ingest<S>(&self, items: S) -> Result<IngestSummary>
    where
        S: Stream<Item = Result<RawPacket>> + Send,
    {
        futures::pin_mut!(items);
        let chunk = self.config.session.ingest_chunk_size.max(1);
        let mut summary = IngestSummary::default();
        let mut sessions: HashMap<SessionId, Option<Session>> = HashMap::new();
        let mut pending: HashMap<SessionId, Vec<(usize, RawPacket)>> = HashMap::new();

        let mut index = 0;
        while let Some(item) = items.next().await {
            let i = index;
            index += 1;
            summary.packet_count += 1;

            let packet = match item {
                Ok(packet) => packet,
                Err(e) => {
                    summary.reject(i, None, &e);
                    continue;
                }
            };

            let id = packet.session_id;
            if !sessions.contains_key(&id) {
                let loaded = match self.store.session(id).await {
                    Ok(session) => Some(session),
                    Err(Error::SessionNotFound(_)) => None,
                    Err(e) => return Err(e),
                };
                sessions.insert(id, loaded);
            }

            let verdict = match sessions.get(&id) {
                Some(Some(session)) => session
                    .ensure_accepts_packets()
                    .and_then(|_| packet.validate(&session.sampling)),
                _ => Err(Error::SessionNotFound(id)),
            };

            match verdict {
                Ok(()) => {
                    let buffer = pending.entry(id).or_default();
                    buffer.push((i, packet));
                    if buffer.len() >= chunk {
                        let batch = std::mem::take(buffer);
                        self.flush(id, batch, &mut summary).await?;
                    }
                }
                Err(e) => summary.reject(i, Some(&packet), &e),
            }
        }

        for (id, batch) in pending {
            if !batch.is_empty() {
                self.flush(id, batch, &mut summary).await?;
            }
        }

        summary.accepted = summary.rejected_count == 0;
        tracing::debug!(
            packets = summary.packet_count,
            accepted = summary.accepted_count,
            rejected = summary.rejected_count,
            "Ingested packets"
        );
        Ok(summary)
    }

    /// Append one session's accepted packets, re-checking its state first.
    /// The session cannot be ended between the check and the append.
    async fn flush(&self, id: SessionId, batch: Vec<(usize, RawPacket)>, summary: &mut IngestSummary) -> Result<()> {
        let _guard = self.lock_session(id).await;
        let begin = Box::new(|s: &mut Session| s.begin_recording());
        match self.store.modify_session(id, begin).await {
            Ok(_) => {}
            Err(e @ (Error::SessionState { .. } | Error::SessionNotFound(_))) => {
                for (i, packet) in &batch {
                    summary.reject(*i, Some(packet), &e);
                }
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let count = batch.len();
        self.store
            .append_packets(id, batch.into_iter().map(|(_, p)| p).collect())
            .await?;
        summary.accepted_count += count;
        Ok(())
    }

    /// Compute one feature set per recorded position, replacing earlier ones
    pub async fn extract_features(&self, session_id: SessionId, include_raw: bool) -> Result<FeatureExtraction> {
        let session = self.store.session(session_id).await?;
        let counts = self.store.packet_counts(session_id).await?;
        if let Err(e) = session.check_extractable(&counts, &self.config.session) {
            if matches!(e, Error::InsufficientData { .. }) {
                self.attach_error(session_id, &e).await;
            }
            return Err(e);
        }

        let positions: Vec<PulsePosition> = session
            .sampling
            .positions
            .iter()
            .copied()
            .filter(|p| counts.get(p).copied().unwrap_or(0) > 0)
            .collect();

        let jobs = positions.iter().map(|&position| async move {
            let packets = self.store.packets(session_id, position).await?;
            let extractor = Arc::clone(&self.extractor);
            self.run_blocking(move || extractor.extract(session_id, &packets, include_raw))
                .await
        });

        let mut feature_sets = Vec::with_capacity(positions.len());
        for result in futures::future::join_all(jobs).await {
            match result {
                Ok(set) => feature_sets.push(set),
                Err(e) => {
                    tracing::warn!(session = %session_id, error = %e, "Feature extraction failed");
                    self.attach_error(session_id, &e).await;
                    return Err(e);
                }
            }
        }

        let quality = AggregateQuality::from_sets(&feature_sets);
        {
            let _guard = self.lock_session(session_id).await;
            let mark = Box::new(|s: &mut Session| s.mark_extracted());
            self.store.modify_session(session_id, mark).await?;
            self.store
                .put_feature_sets(session_id, feature_sets.clone())
                .await?;
        }

        tracing::info!(
            session = %session_id,
            positions = feature_sets.len(),
            mean_quality = quality.mean_signal_quality,
            invalid = quality.invalid_positions.len(),
            "Features extracted"
        );
        Ok(FeatureExtraction { feature_sets, quality })
    }

    /// Classify every position and map the result onto patterns
    pub async fn analyze_pulse(&self, session_id: SessionId, options: PulseAnalysisOptions) -> Result<PulseAnalysis> {
        let session = self.store.session(session_id).await?;
        session.ensure_active("analyze pulse")?;

        let sets = self.store.feature_sets(session_id).await?;
        if sets.is_empty()
            || !matches!(session.status, SessionStatus::FeatureExtracted | SessionStatus::Analyzed)
        {
            return Err(Error::AnalysisDependencyMissing(format!(
                "session {} has no extracted features",
                session_id
            )));
        }

        let classifier = Arc::clone(&self.classifier);
        let mapper = Arc::clone(&self.mapper);
        let symptoms = options.symptoms;
        let (classifications, mapping) = self
            .run_blocking(move || {
                let classifications = classifier.classify_all(&sets);
                let mapping = mapper.map(&classifications, &symptoms);
                Ok((classifications, mapping))
            })
            .await?;

        let analysis = PulseAnalysis::new(session_id, classifications, mapping);
        {
            let _guard = self.record_analysis(session_id, AnalysisKind::Pulse).await?;
            self.store
                .put_pulse_analysis(session_id, analysis.clone())
                .await?;
        }

        tracing::info!(
            session = %session_id,
            patterns = analysis.patterns.len(),
            confidence = analysis.confidence,
            low_confidence = analysis.low_confidence,
            "Pulse analyzed"
        );
        Ok(analysis)
    }

    /// Mark `kind` done; the returned guard covers storing its result
    async fn record_analysis(&self, session_id: SessionId, kind: AnalysisKind) -> Result<OwnedMutexGuard<()>> {
        let guard = self.lock_session(session_id).await;
        let record = Box::new(move |s: &mut Session| s.record_analysis(kind));
        self.store.modify_session(session_id, record).await?;
        Ok(guard)
    }

    /// Analyze abdominal palpation; attached to the session when one is given
    pub async fn analyze_abdominal(
        &self,
        session_id: Option<SessionId>,
        observations: &[AbdominalObservation],
    ) -> Result<Vec<Finding>> {
        if let Some(id) = session_id {
            self.store.session(id).await?.ensure_active("analyze abdomen")?;
        }

        let findings = match self.abdominal.analyze(observations) {
            Ok(findings) => findings,
            Err(e) => {
                if let Some(id) = session_id {
                    self.attach_error(id, &e).await;
                }
                return Err(e);
            }
        };

        if let Some(id) = session_id {
            let _guard = self.record_analysis(id, AnalysisKind::Abdominal).await?;
            self.store.put_abdominal_findings(id, findings.clone()).await?;
        }
        tracing::info!(session = ?session_id, findings = findings.len(), "Abdomen analyzed");
        Ok(findings)
    }

    /// Analyze skin palpation; attached to the session when one is given
    pub async fn analyze_skin(
        &self,
        session_id: Option<SessionId>,
        observations: &[SkinObservation],
    ) -> Result<SkinAnalysis> {
        if let Some(id) = session_id {
            self.store.session(id).await?.ensure_active("analyze skin")?;
        }

        let analysis = match self.skin.analyze(observations) {
            Ok(analysis) => analysis,
            Err(e) => {
                if let Some(id) = session_id {
                    self.attach_error(id, &e).await;
                }
                return Err(e);
            }
        };

        if let Some(id) = session_id {
            let _guard = self.record_analysis(id, AnalysisKind::Skin).await?;
            self.store.put_skin_analysis(id, analysis.clone()).await?;
        }
        tracing::info!(
            session = ?session_id,
            findings = analysis.findings.len(),
            patterns = analysis.patterns.len(),
            "Skin analyzed"
        );
        Ok(analysis)
    }

    /// Fuse the session's completed analyses into one report.
    ///
    /// A completed session returns its last report; it is never re-analyzed.
    pub async fn get_comprehensive_analysis(
        &self,
        session_id: SessionId,
        include_abdominal: bool,
        include_skin: bool,
    ) -> Result<ComprehensiveAnalysis> {
        let session = self.store.session(session_id).await?;
        if session.status == SessionStatus::Completed {
            if let Some(existing) = self.store.analysis(session_id).await? {
                return Ok(existing);
            }
        }
        session.ensure_active("build comprehensive analysis")?;
        let analysis = self
            .build_analysis(&session, include_abdominal, include_skin)
            .await?;

        let _guard = self.lock_session(session_id).await;
        self.store
            .session(session_id)
            .await?
            .ensure_active("build comprehensive analysis")?;
        self.store.put_analysis(session_id, analysis.clone()).await?;
        Ok(analysis)
    }

    /// Fuse whatever the session has stored, without persisting the result
    async fn build_analysis(
        &self,
        session: &Session,
        include_abdominal: bool,
        include_skin: bool,
    ) -> Result<ComprehensiveAnalysis> {
        let session_id = session.id;
        let pulse = self
            .store
            .pulse_analysis(session_id)
            .await?
            .map(|p| p.evidence());
        let abdominal = if include_abdominal {
            self.store.abdominal_findings(session_id).await?
        } else {
            None
        };
        let skin = if include_skin {
            self.store.skin_analysis(session_id).await?
        } else {
            None
        };

        let inputs = FusionInputs {
            session_id: Some(session_id),
            created_at: Some(session.created_at),
            pulse,
            abdominal,
            skin,
        };
        if inputs.is_empty() {
            return Err(Error::AnalysisDependencyMissing(format!(
                "session {} has no completed pulse, abdominal or skin analysis",
                session_id
            )));
        }

        self.fusion.fuse(inputs)
    }

    /// Report used by read-side operations. Ended sessions keep their last
    /// stored report; open ones are fused afresh and nothing is written.
    async fn analysis_for(&self, session_id: SessionId) -> Result<ComprehensiveAnalysis> {
        let session = self.store.session(session_id).await?;
        if session.status.is_terminal() {
            if let Some(stored) = self.store.analysis(session_id).await? {
                return Ok(stored);
            }
        }
        if session.status != SessionStatus::Completed {
            session.ensure_active("analyze session")?;
        }
        self.build_analysis(&session, true, true).await
    }

    /// Summaries and trend across sessions.
    ///
    /// Failing sessions are recorded and skipped. `cancel` is honoured
    /// between sessions; a cancelled batch returns what it has, without a
    /// trend.
    pub async fn batch_analyze(
        &self,
        session_ids: &[SessionId],
        timeframe: Option<TimeFrame>,
        cancel: &CancellationToken,
    ) -> Result<BatchReport> {
        let mut analyses = Vec::new();
        let mut summaries = Vec::new();
        let mut errors = Vec::new();
        let mut cancelled = false;

        for &id in session_ids {
            if cancel.is_cancelled() {
                tracing::info!(processed = summaries.len() + errors.len(), "Batch analysis cancelled");
                cancelled = true;
                break;
            }
            match self.analysis_for(id).await {
                Ok(analysis) => {
                    if timeframe.map_or(true, |f| f.contains(analysis.created_at)) {
                        summaries.push(SessionSummary::from(&analysis));
                        analyses.push(analysis);
                    }
                }
                Err(e) => {
                    tracing::warn!(session = %id, error = %e, "Skipping session in batch");
                    errors.push(BatchError {
                        session_id: id,
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                    });
                }
            }
            tokio::task::yield_now().await;
        }

        let trend = if cancelled || analyses.len() < 2 {
            None
        } else {
            match analyze_trend(&analyses, &self.config.trend, cancel) {
                Ok(trend) => Some(trend),
                Err(Error::Cancelled) => {
                    cancelled = true;
                    None
                }
                Err(e) => return Err(e),
            }
        };

        tracing::info!(
            sessions = session_ids.len(),
            analyzed = summaries.len(),
            errors = errors.len(),
            cancelled,
            "Batch analysis finished"
        );
        Ok(BatchReport {
            summaries,
            trend,
            errors,
            cancelled,
        })
    }

    /// Batch analysis over a user's sessions within `frame`
    pub async fn user_trend(
        &self,
        user_id: UserId,
        frame: TimeFrame,
        cancel: &CancellationToken,
    ) -> Result<BatchReport> {
        let ids: Vec<SessionId> = self
            .store
            .sessions_in_range(user_id, frame)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        self.batch_analyze(&ids, Some(frame), cancel).await
    }

    pub async fn compare_sessions(
        &self,
        baseline_id: SessionId,
        comparison_id: SessionId,
    ) -> Result<SessionComparison> {
        let baseline = self.analysis_for(baseline_id).await?;
        let comparison = self.analysis_for(comparison_id).await?;
        Ok(compare_analyses(&baseline, &comparison, &self.config.trend))
    }

    pub async fn complete_session(&self, session_id: SessionId) -> Result<Session> {
        let session = {
            let _guard = self.lock_session(session_id).await;
            let complete = Box::new(|s: &mut Session| s.complete());
            self.store.modify_session(session_id, complete).await?
        };
        self.release(session_id);
        Ok(session)
    }

    pub async fn abort_session(&self, session_id: SessionId, reason: &str) -> Result<Session> {
        let reason = reason.to_string();
        let session = {
            let _guard = self.lock_session(session_id).await;
            let abort = Box::new(move |s: &mut Session| s.abort(reason));
            self.store.modify_session(session_id, abort).await?
        };
        self.release(session_id);
        Ok(session)
    }

    pub async fn session(&self, session_id: SessionId) -> Result<Session> {
        self.store.session(session_id).await
    }

    pub async fn recent_sessions(&self, user_id: UserId, limit: usize) -> Result<Vec<Session>> {
        self.store.recent_sessions(user_id, limit).await
    }

    pub async fn health_check(&self, level: HealthLevel) -> HealthReport {
        let mut components = vec![ComponentHealth {
            name: "service".to_string(),
            status: HealthStatus::Healthy,
            detail: format!("{} active device adapters", self.adapters.read().len()),
        }];

        if matches!(level, HealthLevel::Basic | HealthLevel::Full) {
            components.push(match self.store.ping().await {
                Ok(()) => ComponentHealth {
                    name: "store".to_string(),
                    status: HealthStatus::Healthy,
                    detail: "reachable".to_string(),
                },
                Err(e) => ComponentHealth {
                    name: "store".to_string(),
                    status: HealthStatus::Unhealthy,
                    detail: e.to_string(),
                },
            });

            let available = self.workers.available_permits();
            components.push(ComponentHealth {
                name: "workers".to_string(),
                status: if available == 0 {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                },
                detail: format!(
                    "{} of {} permits free",
                    available, self.config.workers.max_concurrent_jobs
                ),
            });
        }

        if level == HealthLevel::Full {
            components.push(self.check_pipeline().await);
        }

        let status = components
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);
        HealthReport {
            level,
            status,
            components,
            checked_at: Timestamp::now(),
        }
    }

    /// Push a synthetic recording through extraction, classification and mapping
    async fn check_pipeline(&self) -> ComponentHealth {
        let extractor = Arc::clone(&self.extractor);
        let classifier = Arc::clone(&self.classifier);
        let mapper = Arc::clone(&self.mapper);

        let result = self
            .run_blocking(move || {
                let session = SessionId::new();
                let packets = SyntheticPulse::default().packets(session, PulsePosition::LeftGuan, 8.0);
                let set = extractor.extract(session, &packets, false)?;
                let classification = classifier.classify(&set);
                let mapping = mapper.map(std::slice::from_ref(&classification), &[]);
                Ok((classification, mapping))
            })
            .await;

        match result {
            Ok((classification, mapping)) if !classification.is_unknown() && !mapping.patterns.is_empty() => {
                ComponentHealth {
                    name: "pipeline".to_string(),
                    status: HealthStatus::Healthy,
                    detail: format!(
                        "synthetic pulse classified as {}",
                        classification
                            .primary()
                            .map_or("unknown", |h| h.pulse_type.name())
                    ),
                }
            }
            Ok(_) => ComponentHealth {
                name: "pipeline".to_string(),
                status: HealthStatus::Degraded,
                detail: "synthetic pulse could not be classified".to_string(),
            },
            Err(e) => ComponentHealth {
                name: "pipeline".to_string(),
                status: HealthStatus::Unhealthy,
                detail: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use palpa_tcm::{AbdominalRegion, FindingType, SkinRegion};
    use palpa_core::Organ;

    use crate::store::SessionUpdate;

    fn service() -> PalpationService {
        PalpationService::in_memory(EngineConfig::default()).unwrap()
    }

    /// In-memory store whose session reads stall, so that concurrent calls
    /// interleave between reading a session and acting on it
    struct SlowReads {
        inner: InMemorySessionStore,
        delay: Duration,
    }

    #[async_trait]
    impl SessionStore for SlowReads {
        async fn ping(&self) -> Result<()> {
            self.inner.ping().await
        }

        async fn insert_session(&self, session: Session) -> Result<()> {
            self.inner.insert_session(session).await
        }

        async fn session(&self, id: SessionId) -> Result<Session> {
            let session = self.inner.session(id).await;
            tokio::time::sleep(self.delay).await;
            session
        }

        async fn update_session(&self, session: Session) -> Result<()> {
            self.inner.update_session(session).await
        }

        async fn modify_session(&self, id: SessionId, update: SessionUpdate) -> Result<Session> {
            self.inner.modify_session(id, update).await
        }

        async fn append_packets(&self, id: SessionId, packets: Vec<RawPacket>) -> Result<()> {
            self.inner.append_packets(id, packets).await
        }

        async fn packets(&self, id: SessionId, position: PulsePosition) -> Result<Vec<RawPacket>> {
            self.inner.packets(id, position).await
        }

        async fn packet_counts(&self, id: SessionId) -> Result<BTreeMap<PulsePosition, usize>> {
            self.inner.packet_counts(id).await
        }

        async fn put_feature_sets(&self, id: SessionId, sets: Vec<FeatureSet>) -> Result<()> {
            self.inner.put_feature_sets(id, sets).await
        }

        async fn feature_sets(&self, id: SessionId) -> Result<Vec<FeatureSet>> {
            self.inner.feature_sets(id).await
        }

        async fn put_pulse_analysis(&self, id: SessionId, analysis: PulseAnalysis) -> Result<()> {
            self.inner.put_pulse_analysis(id, analysis).await
        }

        async fn pulse_analysis(&self, id: SessionId) -> Result<Option<PulseAnalysis>> {
            self.inner.pulse_analysis(id).await
        }

        async fn put_abdominal_findings(&self, id: SessionId, findings: Vec<Finding>) -> Result<()> {
            self.inner.put_abdominal_findings(id, findings).await
        }

        async fn abdominal_findings(&self, id: SessionId) -> Result<Option<Vec<Finding>>> {
            self.inner.abdominal_findings(id).await
        }

        async fn put_skin_analysis(&self, id: SessionId, analysis: SkinAnalysis) -> Result<()> {
            self.inner.put_skin_analysis(id, analysis).await
        }

        async fn skin_analysis(&self, id: SessionId) -> Result<Option<SkinAnalysis>> {
            self.inner.skin_analysis(id).await
        }

        async fn put_analysis(&self, id: SessionId, analysis: ComprehensiveAnalysis) -> Result<()> {
            self.inner.put_analysis(id, analysis).await
        }

        async fn analysis(&self, id: SessionId) -> Result<Option<ComprehensiveAnalysis>> {
            self.inner.analysis(id).await
        }

        async fn recent_sessions(&self, user_id: UserId, limit: usize) -> Result<Vec<Session>> {
            self.inner.recent_sessions(user_id, limit).await
        }

        async fn sessions_in_range(&self, user_id: UserId, frame: TimeFrame) -> Result<Vec<Session>> {
            self.inner.sessions_in_range(user_id, frame).await
        }
    }

    fn slow_service(config: EngineConfig) -> PalpationService {
        let store = SlowReads {
            inner: InMemorySessionStore::new(),
            delay: Duration::from_millis(50),
        };
        PalpationService::new(config, Arc::new(store)).unwrap()
    }

    async fn start(service: &PalpationService) -> SessionId {
        let (id, _) = service
            .start_session(
                UserId::new(),
                DeviceDescriptor::new("suoke_wp100", "2.1"),
                Calibration::identity(),
            )
            .await
            .unwrap();
        id
    }

    fn recording(id: SessionId) -> Vec<RawPacket> {
        PulsePosition::ALL
            .iter()
            .flat_map(|p| SyntheticPulse::default().packets(id, *p, 8.0))
            .collect()
    }

    async fn recorded(service: &PalpationService) -> SessionId {
        let id = start(service).await;
        let summary = service
            .ingest_packets(stream::iter(recording(id)))
            .await
            .unwrap();
        assert!(summary.accepted);
        id
    }

    #[tokio::test]
    async fn test_unknown_device_rejected() {
        let err = service()
            .start_session(
                UserId::new(),
                DeviceDescriptor::new("acme_pulse_9000", "1.0"),
                Calibration::identity(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNotSupported { .. }));
    }

    #[tokio::test]
    async fn test_outdated_device_rejected_before_session_exists() {
        let service = service();
        let user = UserId::new();
        let err = service
            .start_session(user, DeviceDescriptor::new("medsense_pr2000", "0.7"), Calibration::identity())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNotSupported { .. }));

        let stale = Calibration::identity().with_calibrated_at(Timestamp::now().plus_days(-31));
        let err = service
            .start_session(user, DeviceDescriptor::new("suoke_wp100", "2.1"), stale)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCalibration(_)));
        assert!(service.recent_sessions(user, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_six_good_positions_yield_patterns() {
        let service = service();
        let id = recorded(&service).await;
        assert_eq!(service.session(id).await.unwrap().status, SessionStatus::Recording);

        let extraction = service.extract_features(id, false).await.unwrap();
        assert_eq!(extraction.feature_sets.len(), 6);
        assert_eq!(extraction.quality.valid_positions, 6);

        let pulse = service
            .analyze_pulse(id, PulseAnalysisOptions::default())
            .await
            .unwrap();
        assert_eq!(pulse.classifications.len(), 6);
        assert!(!pulse.patterns.is_empty());
        assert!(pulse.confidence > 0.0 && pulse.confidence <= 1.0);
        assert_eq!(service.session(id).await.unwrap().status, SessionStatus::Analyzed);

        let report = service.get_comprehensive_analysis(id, true, true).await.unwrap();
        assert!(!report.patterns.is_empty());
        assert_eq!(report.session_id, Some(id));
    }

    #[tokio::test]
    async fn test_wrong_velocity_length_rejected_alone() {
        let service = service();
        let id = start(&service).await;

        let mut packets = SyntheticPulse::default().packets(id, PulsePosition::LeftCun, 1.0);
        packets[3].velocity_series.pop();

        let summary = service
            .ingest_packets(stream::iter(packets.clone()))
            .await
            .unwrap();
        assert_eq!(summary.packet_count, packets.len());
        assert_eq!(summary.rejected_count, 1);
        assert_eq!(summary.accepted_count, packets.len() - 1);
        assert!(!summary.accepted);
        assert_eq!(summary.rejections[0].index, 3);
        assert_eq!(summary.rejections[0].kind, "invalid_packet");
        assert!(summary.rejections[0].reason.contains("velocity"));
        assert_eq!(service.session(id).await.unwrap().status, SessionStatus::Recording);

        // the next batch is judged on its own
        let more = SyntheticPulse::default().packets(id, PulsePosition::LeftGuan, 1.0);
        let next = service.ingest_packets(stream::iter(more)).await.unwrap();
        assert!(next.accepted);
        assert_eq!(next.rejected_count, 0);
    }

    #[tokio::test]
    async fn test_no_packets_after_terminal_states() {
        let service = service();
        let id = recorded(&service).await;
        service.extract_features(id, false).await.unwrap();
        service
            .analyze_pulse(id, PulseAnalysisOptions::default())
            .await
            .unwrap();
        service.complete_session(id).await.unwrap();

        let late = SyntheticPulse::default().packets(id, PulsePosition::LeftCun, 1.0);
        let summary = service.ingest_packets(stream::iter(late)).await.unwrap();
        assert_eq!(summary.accepted_count, 0);
        assert!(summary.rejections.iter().all(|r| r.kind == "session_state"));

        let aborted = start(&service).await;
        service.abort_session(aborted, "device fault").await.unwrap();
        let late = SyntheticPulse::default().packets(aborted, PulsePosition::LeftCun, 1.0);
        let summary = service.ingest_packets(stream::iter(late)).await.unwrap();
        assert_eq!(summary.accepted_count, 0);
        assert!(service.ingest_frames(aborted, vec![vec![0u8; 4]]).await.is_err());
    }

    #[tokio::test]
    async fn test_abort_during_ingest_stays_aborted() {
        let service = slow_service(EngineConfig::default());
        let id = start(&service).await;
        let packets = SyntheticPulse::default().packets(id, PulsePosition::LeftCun, 1.0);

        let (ingest, abort) = tokio::join!(
            service.ingest_packets(stream::iter(packets)),
            service.abort_session(id, "patient moved"),
        );
        assert!(abort.is_ok());
        let ingest = ingest.unwrap();

        let session = service.session(id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Aborted);
        assert_eq!(session.abort_reason.as_deref(), Some("patient moved"));
        assert_eq!(ingest.accepted_count, 0);
        let counts = service.store().packet_counts(id).await.unwrap();
        assert!(counts.values().all(|n| *n == 0));

        let late = SyntheticPulse::default().packets(id, PulsePosition::LeftGuan, 1.0);
        let summary = service.ingest_packets(stream::iter(late)).await.unwrap();
        assert_eq!(summary.accepted_count, 0);
    }

    #[tokio::test]
    async fn test_concurrent_palpation_analyses_both_recorded() {
        let mut config = EngineConfig::default();
        config.session.requested_analyses = vec![AnalysisKind::Abdominal, AnalysisKind::Skin];
        let service = slow_service(config);
        let id = start(&service).await;

        let abdomen = [AbdominalObservation::new(AbdominalRegion::Epigastrium).with_tenderness(0.6)];
        let skin = [SkinObservation::new(SkinRegion::Palm).with_moisture(0.8)];
        let (a, b) = tokio::join!(
            service.analyze_abdominal(Some(id), &abdomen),
            service.analyze_skin(Some(id), &skin),
        );
        a.unwrap();
        b.unwrap();

        let session = service.session(id).await.unwrap();
        assert!(session.pending_analyses().is_empty());
        assert!(service.store().abdominal_findings(id).await.unwrap().is_some());
        assert!(service.store().skin_analysis(id).await.unwrap().is_some());

        // both palpations were done before the recording, extraction finishes the set
        service
            .ingest_packets(stream::iter(recording(id)))
            .await
            .unwrap();
        service.extract_features(id, false).await.unwrap();
        assert_eq!(service.session(id).await.unwrap().status, SessionStatus::Analyzed);
        service.complete_session(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_session_packets_rejected() {
        let service = service();
        let packets = SyntheticPulse::default().packets(SessionId::new(), PulsePosition::LeftCun, 0.5);
        let summary = service.ingest_packets(stream::iter(packets)).await.unwrap();
        assert_eq!(summary.accepted_count, 0);
        assert!(summary.rejections.iter().all(|r| r.kind == "session_not_found"));
    }

    #[tokio::test]
    async fn test_undecodable_frame_rejected() {
        let service = service();
        let id = start(&service).await;
        let summary = service.ingest_frames(id, vec![vec![1, 2, 3]]).await.unwrap();
        assert_eq!(summary.rejected_count, 1);
        assert_eq!(summary.rejections[0].session_id, None);
        assert_eq!(service.session(id).await.unwrap().status, SessionStatus::Created);
    }

    #[tokio::test]
    async fn test_insufficient_data_attached_to_session() {
        let service = service();
        let id = start(&service).await;
        let packets = SyntheticPulse::default().packets(id, PulsePosition::LeftCun, 1.0);
        service.ingest_packets(stream::iter(packets)).await.unwrap();

        let err = service.extract_features(id, false).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientData { .. }));
        let session = service.session(id).await.unwrap();
        assert_eq!(session.errors[0].kind, "insufficient_data");
        assert_eq!(session.status, SessionStatus::Recording);
    }

    #[tokio::test]
    async fn test_features_invariant_to_delivery_order() {
        let service = service();
        let first = recorded(&service).await;

        let second = start(&service).await;
        let mut packets = recording(second);
        packets.reverse();
        packets.swap(0, 7);
        service.ingest_packets(stream::iter(packets)).await.unwrap();

        let a = service.extract_features(first, false).await.unwrap();
        let b = service.extract_features(second, false).await.unwrap();
        for (x, y) in a.feature_sets.iter().zip(b.feature_sets.iter()) {
            assert_eq!(x.position, y.position);
            assert_eq!(x.features, y.features);
        }
    }

    #[tokio::test]
    async fn test_analysis_needs_a_modality() {
        let service = service();
        let id = start(&service).await;
        let err = service.get_comprehensive_analysis(id, true, true).await.unwrap_err();
        assert!(matches!(err, Error::AnalysisDependencyMissing(_)));

        let err = service
            .analyze_pulse(id, PulseAnalysisOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AnalysisDependencyMissing(_)));
    }

    #[tokio::test]
    async fn test_uncorroborated_tenderness() {
        let service = service();
        let id = start(&service).await;
        service
            .analyze_abdominal(
                Some(id),
                &[AbdominalObservation::new(AbdominalRegion::RightHypochondrium).with_tenderness(0.9)],
            )
            .await
            .unwrap();

        let report = service.get_comprehensive_analysis(id, true, false).await.unwrap();
        let tenderness = report
            .findings
            .iter()
            .find(|f| f.finding_type == FindingType::Tenderness)
            .unwrap();
        assert!(tenderness.organs.contains(&Organ::Liver));
        assert!(tenderness.confidence < 0.9);
        assert!(report.overview.pulse.is_none());

        // abdominal only: excluding it leaves nothing to fuse
        let err = service.get_comprehensive_analysis(id, false, false).await.unwrap_err();
        assert!(matches!(err, Error::AnalysisDependencyMissing(_)));
    }

    #[tokio::test]
    async fn test_pattern_resolved_after_thirty_days() {
        let service = service();
        let user = UserId::new();
        let device = DeviceDescriptor::new("suoke_wp100", "2.1");

        let (baseline, _) = service
            .start_session(user, device.clone(), Calibration::identity())
            .await
            .unwrap();
        let (follow_up, _) = service
            .start_session(user, device, Calibration::identity())
            .await
            .unwrap();

        // backdate the baseline
        let mut s = service.session(baseline).await.unwrap();
        s.created_at = s.created_at.plus_days(-30);
        service.store().update_session(s).await.unwrap();

        service
            .analyze_abdominal(
                Some(baseline),
                &[AbdominalObservation::new(AbdominalRegion::RightHypochondrium).with_tenderness(0.9)],
            )
            .await
            .unwrap();
        service
            .analyze_skin(
                Some(follow_up),
                &[SkinObservation::new(SkinRegion::Palm).with_moisture(0.1)],
            )
            .await
            .unwrap();

        let cmp = service.compare_sessions(baseline, follow_up).await.unwrap();
        assert!((cmp.days_between - 30.0).abs() < 0.01);
        assert!(cmp.resolved.iter().any(|p| p.pattern == Pattern::LiverQiStagnation));
        assert!(!cmp.added.is_empty());

        let cancel = CancellationToken::new();
        let report = service
            .batch_analyze(&[follow_up, baseline, SessionId::new()], None, &cancel)
            .await
            .unwrap();
        assert_eq!(report.summaries.len(), 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, "session_not_found");
        let trend = report.trend.unwrap();
        assert_eq!(trend.session_count, 2);
        assert_eq!(
            trend.metric("pattern.liver_qi_stagnation").unwrap().direction,
            palpa_tcm::TrendDirection::Improving
        );

        let recent = service.recent_sessions(user, 1).await.unwrap();
        assert_eq!(recent[0].id, follow_up);
    }

    #[tokio::test]
    async fn test_reports_follow_later_analyses_without_writing() {
        let service = service();
        let user = UserId::new();
        let device = DeviceDescriptor::new("suoke_wp100", "2.1");
        let (first, _) = service
            .start_session(user, device.clone(), Calibration::identity())
            .await
            .unwrap();
        let (second, _) = service
            .start_session(user, device, Calibration::identity())
            .await
            .unwrap();

        let tender = [AbdominalObservation::new(AbdominalRegion::RightHypochondrium).with_tenderness(0.9)];
        service.analyze_abdominal(Some(first), &tender).await.unwrap();
        service.analyze_abdominal(Some(second), &tender).await.unwrap();
        let stored = service.get_comprehensive_analysis(second, true, true).await.unwrap();

        service
            .analyze_skin(Some(second), &[SkinObservation::new(SkinRegion::Palm).with_moisture(0.1)])
            .await
            .unwrap();

        let cmp = service.compare_sessions(first, second).await.unwrap();
        assert!(!cmp.added.is_empty());
        let current = service.analysis_for(second).await.unwrap();
        assert!(current.findings.len() > stored.findings.len());

        let report = service
            .batch_analyze(&[first, second], None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.summaries.len(), 2);

        // read-side calls leave stored reports as they were
        assert!(service.store().analysis(first).await.unwrap().is_none());
        assert_eq!(service.store().analysis(second).await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn test_cancelled_batch() {
        let service = service();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = service
            .batch_analyze(&[SessionId::new(), SessionId::new()], None, &cancel)
            .await
            .unwrap();
        assert!(report.cancelled);
        assert!(report.summaries.is_empty() && report.errors.is_empty());
        assert!(report.trend.is_none());
    }

    #[tokio::test]
    async fn test_health_levels() {
        let service = service();
        let minimal = service.health_check(HealthLevel::Minimal).await;
        assert_eq!(minimal.components.len(), 1);

        let basic = service.health_check(HealthLevel::Basic).await;
        assert_eq!(basic.status, HealthStatus::Healthy);
        assert!(basic.components.iter().any(|c| c.name == "store"));

        let full = service.health_check(HealthLevel::Full).await;
        let pipeline = full.components.iter().find(|c| c.name == "pipeline").unwrap();
        assert_eq!(pipeline.status, HealthStatus::Healthy);
    }
}
