//! Persistence boundary.
//!
//! The engine only talks to [`SessionStore`]; [`InMemorySessionStore`] is the
//! reference implementation used by the demo and the tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::RwLock;

use palpa_core::{Error, PulsePosition, Result, SessionId, UserId};
use palpa_signal::{FeatureSet, RawPacket};
use palpa_tcm::{ComprehensiveAnalysis, Finding, SkinAnalysis, TimeFrame};

use crate::service::PulseAnalysis;
use crate::session::Session;

/// Change applied to a stored session by [`SessionStore::modify_session`]
pub type SessionUpdate = Box<dyn FnOnce(&mut Session) -> Result<()> + Send>;

/// Storage for sessions and everything derived from them
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Cheap liveness check used by health reports
    async fn ping(&self) -> Result<()>;

    async fn insert_session(&self, session: Session) -> Result<()>;

    async fn session(&self, id: SessionId) -> Result<Session>;

    async fn update_session(&self, session: Session) -> Result<()>;

    /// Apply `update` atomically and return the result. The stored session is
    /// left untouched when `update` fails.
    async fn modify_session(&self, id: SessionId, update: SessionUpdate) -> Result<Session>;

    /// Append accepted packets; appends to one position are serialized
    async fn append_packets(&self, id: SessionId, packets: Vec<RawPacket>) -> Result<()>;

    /// Packets of one position in arrival order
    async fn packets(&self, id: SessionId, position: PulsePosition) -> Result<Vec<RawPacket>>;

    async fn packet_counts(&self, id: SessionId) -> Result<BTreeMap<PulsePosition, usize>>;

    /// Replace the session's feature sets wholesale
    async fn put_feature_sets(&self, id: SessionId, sets: Vec<FeatureSet>) -> Result<()>;

    async fn feature_sets(&self, id: SessionId) -> Result<Vec<FeatureSet>>;

    async fn put_pulse_analysis(&self, id: SessionId, analysis: PulseAnalysis) -> Result<()>;

    async fn pulse_analysis(&self, id: SessionId) -> Result<Option<PulseAnalysis>>;

    async fn put_abdominal_findings(&self, id: SessionId, findings: Vec<Finding>) -> Result<()>;

    async fn abdominal_findings(&self, id: SessionId) -> Result<Option<Vec<Finding>>>;

    async fn put_skin_analysis(&self, id: SessionId, analysis: SkinAnalysis) -> Result<()>;

    async fn skin_analysis(&self, id: SessionId) -> Result<Option<SkinAnalysis>>;

    /// Store the latest comprehensive analysis, superseding any earlier one
    async fn put_analysis(&self, id: SessionId, analysis: ComprehensiveAnalysis) -> Result<()>;

    async fn analysis(&self, id: SessionId) -> Result<Option<ComprehensiveAnalysis>>;

    /// Latest `limit` sessions of a user, newest first
    async fn recent_sessions(&self, user_id: UserId, limit: usize) -> Result<Vec<Session>>;

    /// Sessions of a user created within `frame`, oldest first
    async fn sessions_in_range(&self, user_id: UserId, frame: TimeFrame) -> Result<Vec<Session>>;
}

/// Packet buffers of one session, one lock per position
struct PacketLog {
    positions: BTreeMap<PulsePosition, Mutex<Vec<RawPacket>>>,
}

impl PacketLog {
    fn new() -> Self {
        Self {
            positions: PulsePosition::ALL
                .iter()
                .map(|p| (*p, Mutex::new(Vec::new())))
                .collect(),
        }
    }

    fn append(&self, packets: Vec<RawPacket>) -> Result<()> {
        let mut grouped: BTreeMap<PulsePosition, Vec<RawPacket>> = BTreeMap::new();
        for packet in packets {
            grouped.entry(packet.position).or_default().push(packet);
        }
        for (position, batch) in grouped {
            let buffer = self
                .positions
                .get(&position)
                .ok_or_else(|| Error::Storage(format!("no packet buffer for {}", position)))?;
            buffer.lock().extend(batch);
        }
        Ok(())
    }

    fn get(&self, position: PulsePosition) -> Vec<RawPacket> {
        self.positions
            .get(&position)
            .map(|b| b.lock().clone())
            .unwrap_or_default()
    }

    fn counts(&self) -> BTreeMap<PulsePosition, usize> {
        self.positions
            .iter()
            .map(|(p, b)| (*p, b.lock().len()))
            .collect()
    }
}

struct SessionRecord {
    session: Session,
    packets: Arc<PacketLog>,
    feature_sets: Vec<FeatureSet>,
    pulse: Option<PulseAnalysis>,
    abdominal: Option<Vec<Finding>>,
    skin: Option<SkinAnalysis>,
    analysis: Option<ComprehensiveAnalysis>,
}

/// Process-local store. Sessions never share a lock while packets are
/// appended: the map lock is only held to look up a session's buffers.
#[derive(Default)]
pub struct InMemorySessionStore {
    records: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn read<T>(&self, id: SessionId, f: impl FnOnce(&SessionRecord) -> T) -> Result<T> {
        let records = self.records.read().await;
        records.get(&id).map(f).ok_or(Error::SessionNotFound(id))
    }

    async fn write<T>(&self, id: SessionId, f: impl FnOnce(&mut SessionRecord) -> T) -> Result<T> {
        let mut records = self.records.write().await;
        records.get_mut(&id).map(f).ok_or(Error::SessionNotFound(id))
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn ping(&self) -> Result<()> {
        let _ = self.records.read().await.len();
        Ok(())
    }

    async fn insert_session(&self, session: Session) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&session.id) {
            return Err(Error::Storage(format!("session {} already exists", session.id)));
        }
        records.insert(
            session.id,
            SessionRecord {
                session,
                packets: Arc::new(PacketLog::new()),
                feature_sets: Vec::new(),
                pulse: None,
                abdominal: None,
                skin: None,
                analysis: None,
            },
        );
        Ok(())
    }

    async fn session(&self, id: SessionId) -> Result<Session> {
        self.read(id, |r| r.session.clone()).await
    }

    async fn update_session(&self, session: Session) -> Result<()> {
        let id = session.id;
        self.write(id, |r| r.session = session).await
    }

    async fn modify_session(&self, id: SessionId, update: SessionUpdate) -> Result<Session> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(Error::SessionNotFound(id))?;
        let mut session = record.session.clone();
        update(&mut session)?;
        record.session = session.clone();
        Ok(session)
    }

    async fn append_packets(&self, id: SessionId, packets: Vec<RawPacket>) -> Result<()> {
        let log = self.read(id, |r| Arc::clone(&r.packets)).await?;
        log.append(packets)
    }

    async fn packets(&self, id: SessionId, position: PulsePosition) -> Result<Vec<RawPacket>> {
        let log = self.read(id, |r| Arc::clone(&r.packets)).await?;
        Ok(log.get(position))
    }

    async fn packet_counts(&self, id: SessionId) -> Result<BTreeMap<PulsePosition, usize>> {
        let log = self.read(id, |r| Arc::clone(&r.packets)).await?;
        Ok(log.counts())
    }

    async fn put_feature_sets(&self, id: SessionId, sets: Vec<FeatureSet>) -> Result<()> {
        self.write(id, |r| r.feature_sets = sets).await
    }

    async fn feature_sets(&self, id: SessionId) -> Result<Vec<FeatureSet>> {
        self.read(id, |r| r.feature_sets.clone()).await
    }

    async fn put_pulse_analysis(&self, id: SessionId, analysis: PulseAnalysis) -> Result<()> {
        self.write(id, |r| r.pulse = Some(analysis)).await
    }

    async fn pulse_analysis(&self, id: SessionId) -> Result<Option<PulseAnalysis>> {
        self.read(id, |r| r.pulse.clone()).await
    }

    async fn put_abdominal_findings(&self, id: SessionId, findings: Vec<Finding>) -> Result<()> {
        self.write(id, |r| r.abdominal = Some(findings)).await
    }

    async fn abdominal_findings(&self, id: SessionId) -> Result<Option<Vec<Finding>>> {
        self.read(id, |r| r.abdominal.clone()).await
    }

    async fn put_skin_analysis(&self, id: SessionId, analysis: SkinAnalysis) -> Result<()> {
        self.write(id, |r| r.skin = Some(analysis)).await
    }

    async fn skin_analysis(&self, id: SessionId) -> Result<Option<SkinAnalysis>> {
        self.read(id, |r| r.skin.clone()).await
    }

    async fn put_analysis(&self, id: SessionId, analysis: ComprehensiveAnalysis) -> Result<()> {
        self.write(id, |r| r.analysis = Some(analysis)).await
    }

    async fn analysis(&self, id: SessionId) -> Result<Option<ComprehensiveAnalysis>> {
        self.read(id, |r| r.analysis.clone()).await
    }

    async fn recent_sessions(&self, user_id: UserId, limit: usize) -> Result<Vec<Session>> {
        let records = self.records.read().await;
        let mut sessions: Vec<Session> = records
            .values()
            .filter(|r| r.session.user_id == user_id)
            .map(|r| r.session.clone())
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn sessions_in_range(&self, user_id: UserId, frame: TimeFrame) -> Result<Vec<Session>> {
        let records = self.records.read().await;
        let mut sessions: Vec<Session> = records
            .values()
            .filter(|r| r.session.user_id == user_id && frame.contains(r.session.created_at))
            .map(|r| r.session.clone())
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }
}
