//! Request Gate
//!
//! Decides whether a submitted question may invoke the external pipeline.
//! The gate never touches ambient state: callers hand in a `GateState` and
//! get the successor state back.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum spacing between two accepted submissions of one session
pub const SUBMISSION_COOLDOWN_SECS: i64 = 20;

/// Per-session gate state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateState {
    /// Most recently accepted question
    pub last_question: Option<String>,

    /// When the most recently accepted question was admitted
    pub last_submission_time: Option<DateTime<Utc>>,
}

/// Outcome of a gate evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Idle,
    DuplicateRejected,
    ThrottledRejected,
    Accepted,
}

impl Decision {
    /// Message shown to the user for this outcome, if any
    pub fn message(&self) -> Option<&'static str> {
        match self {
            Decision::Idle => Some("Enter a question or try one of the examples below"),
            Decision::DuplicateRejected => Some("Try a new question"),
            Decision::ThrottledRejected => Some("Wait 20 seconds before trying again"),
            Decision::Accepted => None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Idle => write!(f, "Idle"),
            Decision::DuplicateRejected => write!(f, "DuplicateRejected"),
            Decision::ThrottledRejected => write!(f, "ThrottledRejected"),
            Decision::Accepted => write!(f, "Accepted"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RequestGate {
    cooldown: Duration,
}

impl Default for RequestGate {
    fn default() -> Self {
        Self {
            cooldown: Duration::seconds(SUBMISSION_COOLDOWN_SECS),
        }
    }
}

impl RequestGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a candidate question against the session state.
    ///
    /// Checks run in fixed priority: empty input, exact repeat of the last
    /// accepted question, cooldown, then acceptance.
    pub fn evaluate(
        &self,
        candidate: Option<&str>,
        state: &GateState,
        now: DateTime<Utc>,
    ) -> Decision {
        let candidate = match candidate {
            Some(q) if !q.is_empty() => q,
            _ => return Decision::Idle,
        };

        if state.last_question.as_deref() == Some(candidate) {
            return Decision::DuplicateRejected;
        }

        if let Some(last) = state.last_submission_time {
            // A clock that went backwards also lands here
            if now - last < self.cooldown {
                return Decision::ThrottledRejected;
            }
        }

        Decision::Accepted
    }

    /// Evaluate and return the successor state.
    ///
    /// The returned state differs from `state` only when the decision is `Accepted`.
    pub fn admit(
        &self,
        candidate: Option<&str>,
        state: GateState,
        now: DateTime<Utc>,
    ) -> (Decision, GateState) {
        let decision = self.evaluate(candidate, &state, now);
        match (decision, candidate) {
            (Decision::Accepted, Some(q)) => (
                decision,
                GateState {
                    last_question: Some(q.to_string()),
                    last_submission_time: Some(now),
                },
            ),
            _ => (decision, state),
        }
    }
}
