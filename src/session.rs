//! Sessions
//!
//! Each browser session owns one `GateState`. The state is read and replaced
//! under the session's map entry, then the pipeline runs without holding it.

use crate::chart::PlotlyRenderer;
use crate::config::AppConfig;
use crate::error::Result;
use crate::gate::{Decision, GateState, RequestGate};
use crate::pipeline::{Pipeline, PipelineReport};
use crate::vanna::VannaClient;
use crate::warehouse::SnowflakeWarehouse;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Outcome of one submission
#[derive(Debug)]
pub struct Submission {
    pub question: Option<String>,
    pub decision: Decision,
    /// Present only when the gate accepted the question
    pub report: Option<PipelineReport>,
}

/// Sessions untouched for this long are dropped
pub const SESSION_IDLE_SECS: i64 = 60 * 60;

#[derive(Debug, Clone)]
struct SessionEntry {
    gate: GateState,
    last_seen: DateTime<Utc>,
}

/// Gate state per session id.
///
/// A session is stored only once it has an accepted question; until then its
/// state is the default and nothing needs remembering.
pub struct SessionStore {
    states: DashMap<Uuid, SessionEntry>,
    idle_ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_ttl(Duration::seconds(SESSION_IDLE_SECS))
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            states: DashMap::new(),
            idle_ttl,
        }
    }

    /// Mint a session id
    pub fn create(&self) -> Uuid {
        Uuid::new_v4()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.states.contains_key(id)
    }

    pub fn state(&self, id: &Uuid) -> GateState {
        self.states
            .get(id)
            .map(|entry| entry.gate.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Drop sessions not seen within the idle window
    pub fn prune(&self, now: DateTime<Utc>) {
        let before = self.states.len();
        self.states.retain(|_, entry| now - entry.last_seen < self.idle_ttl);
        let dropped = before.saturating_sub(self.states.len());
        if dropped > 0 {
            debug!("Dropped {} idle sessions", dropped);
        }
    }

    /// Evaluate `candidate` for session `id` and store the successor state
    pub fn admit(
        &self,
        gate: &RequestGate,
        id: Uuid,
        candidate: Option<&str>,
        now: DateTime<Utc>,
    ) -> Decision {
        if let Some(mut entry) = self.states.get_mut(&id) {
            return Self::apply(gate, id, &mut entry, candidate, now);
        }

        // Unknown sessions hold the default state; only an acceptance is worth storing
        let decision = gate.evaluate(candidate, &GateState::default(), now);
        if !decision.is_accepted() {
            debug!("Session {} decision: {}", id, decision);
            return decision;
        }

        self.prune(now);
        let mut entry = self.states.entry(id).or_insert_with(|| SessionEntry {
            gate: GateState::default(),
            last_seen: now,
        });
        Self::apply(gate, id, &mut entry, candidate, now)
    }

    fn apply(
        gate: &RequestGate,
        id: Uuid,
        entry: &mut SessionEntry,
        candidate: Option<&str>,
        now: DateTime<Utc>,
    ) -> Decision {
        let (decision, next) = gate.admit(candidate, entry.gate.clone(), now);
        entry.gate = next;
        entry.last_seen = entry.last_seen.max(now);
        debug!("Session {} decision: {}", id, decision);
        decision
    }
}

/// Gate and pipeline behind one entry point
#[derive(Clone)]
pub struct AskService {
    gate: RequestGate,
    pipeline: Pipeline,
    sessions: Arc<SessionStore>,
}

impl AskService {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            gate: RequestGate::new(),
            pipeline,
            sessions: Arc::new(SessionStore::new()),
        }
    }

    /// Wire the Vanna client, the Snowflake connector and the Plotly renderer
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let vanna = Arc::new(VannaClient::new(&config.vanna)?);
        let pipeline = Pipeline::new(
            vanna.clone(),
            Arc::new(SnowflakeWarehouse::new(config.snowflake.clone())),
            vanna,
            Arc::new(PlotlyRenderer::new()),
            config.snowflake.database.clone(),
        );
        Ok(Self::new(pipeline))
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub async fn submit(&self, session: Uuid, question: Option<&str>) -> Submission {
        self.submit_at(session, question, Utc::now()).await
    }

    /// Submit with an explicit clock reading
    pub async fn submit_at(
        &self,
        session: Uuid,
        question: Option<&str>,
        now: DateTime<Utc>,
    ) -> Submission {
        let decision = self.sessions.admit(&self.gate, session, question, now);

        let report = match (decision, question) {
            (Decision::Accepted, Some(q)) => Some(self.pipeline.run(q).await),
            _ => None,
        };

        Submission {
            question: question.map(|q| q.to_string()),
            decision,
            report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_sessions_are_independent() {
        let store = SessionStore::new();
        let gate = RequestGate::new();
        let a = store.create();
        let b = store.create();

        assert_eq!(store.admit(&gate, a, Some("q"), t(0)), Decision::Accepted);
        assert_eq!(store.admit(&gate, b, Some("q"), t(1)), Decision::Accepted);
        assert_eq!(store.admit(&gate, a, Some("q2"), t(2)), Decision::ThrottledRejected);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_unknown_session_starts_fresh() {
        let store = SessionStore::new();
        let gate = RequestGate::new();
        let id = Uuid::new_v4();

        assert!(!store.contains(&id));
        assert_eq!(store.admit(&gate, id, Some("q"), t(0)), Decision::Accepted);
        assert_eq!(store.state(&id).last_question.as_deref(), Some("q"));
    }

    #[test]
    fn test_only_accepted_sessions_are_stored() {
        let store = SessionStore::new();
        let gate = RequestGate::new();

        for _ in 0..100 {
            let id = store.create();
            assert_eq!(store.admit(&gate, id, None, t(0)), Decision::Idle);
            assert_eq!(store.admit(&gate, Uuid::new_v4(), Some(""), t(0)), Decision::Idle);
        }
        assert!(store.is_empty());

        let id = store.create();
        store.admit(&gate, id, Some("q"), t(0));
        store.admit(&gate, id, Some("q"), t(1));
        store.admit(&gate, id, Some("other"), t(2));
        store.admit(&gate, id, None, t(3));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_idle_sessions_are_dropped() {
        let store = SessionStore::with_idle_ttl(Duration::seconds(60));
        let gate = RequestGate::new();
        let quiet = store.create();
        let active = store.create();

        store.admit(&gate, quiet, Some("q"), t(0));
        store.admit(&gate, active, Some("q"), t(10));
        // A rejected submission still counts as activity
        store.admit(&gate, active, Some("q"), t(50));

        let newcomer = store.create();
        store.admit(&gate, newcomer, Some("q"), t(100));

        assert!(!store.contains(&quiet));
        assert!(store.contains(&active));
        assert!(store.contains(&newcomer));
        assert_eq!(store.state(&quiet), GateState::default());
    }

    #[test]
    fn test_rejected_submission_keeps_state() {
        let store = SessionStore::new();
        let gate = RequestGate::new();
        let id = store.create();

        store.admit(&gate, id, Some("q"), t(0));
        let before = store.state(&id);
        store.admit(&gate, id, Some("other"), t(3));
        assert_eq!(store.state(&id), before);
    }
}
