//! Dialectic phases, transitions, and the session record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::{DialecticMessage, MessageBody};
use super::resolution::Resolution;
use crate::registry::HealthSnapshot;

/// Phase of a dialectic session.
///
/// The serialized names are a stable schema; external tooling reads the
/// persisted records directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DialecticPhase {
    /// Awaiting the paused agent's account of what went wrong.
    Thesis,
    /// Awaiting the reviewer's concerns.
    Antithesis,
    /// Both parties exchanging joint proposals.
    Synthesis,
    /// Converged and dual-signed.
    Resolved,
    /// Timed out or abandoned.
    Failed,
    /// Synthesis round limit exhausted without convergence.
    Escalated,
}

impl DialecticPhase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Failed | Self::Escalated)
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [DialecticPhase] {
        match self {
            Self::Thesis => &[Self::Antithesis, Self::Failed],
            Self::Antithesis => &[Self::Synthesis, Self::Failed],
            Self::Synthesis => &[Self::Resolved, Self::Escalated, Self::Failed],
            Self::Resolved | Self::Failed | Self::Escalated => &[],
        }
    }
}

impl std::fmt::Display for DialecticPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Thesis => write!(f, "THESIS"),
            Self::Antithesis => write!(f, "ANTITHESIS"),
            Self::Synthesis => write!(f, "SYNTHESIS"),
            Self::Resolved => write!(f, "RESOLVED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Escalated => write!(f, "ESCALATED"),
        }
    }
}

/// Error for invalid phase transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: DialecticPhase,
    pub to: DialecticPhase,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} → {} (allowed: {:?})",
            self.from,
            self.to,
            self.from.valid_transitions()
        )
    }
}

impl std::error::Error for TransitionError {}

/// The unit of negotiation between a paused agent and its reviewer.
///
/// Field names are a stable schema — the persisted JSON is read directly by
/// other tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialecticSession {
    /// Opaque unique identifier, immutable after creation.
    pub session_id: String,
    /// The agent whose circuit breaker tripped.
    pub paused_agent_id: String,
    /// The healthy peer reviewing the pause.
    pub reviewer_agent_id: String,
    /// Current phase.
    pub phase: DialecticPhase,
    /// Append-only ordered message transcript.
    pub transcript: Vec<DialecticMessage>,
    /// Completed synthesis exchanges (both parties spoke).
    pub synthesis_round: u32,
    /// Round limit fixed at creation.
    pub max_synthesis_rounds: u32,
    /// Present only when `phase == Resolved`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    /// Creation time, used for timeout and reviewer-staleness computation.
    pub created_at: DateTime<Utc>,
    /// Set when the session disputes a recorded finding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery_id: Option<String>,
    /// Kind of dispute (e.g. "verification"), when `discovery_id` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispute_type: Option<String>,
    /// Health snapshot of the paused agent captured at creation, when the
    /// metrics engine had one.
    ///
    /// Kept for audit only — hard limits are always evaluated against a
    /// live snapshot, never this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused_agent_state: Option<HealthSnapshot>,
}

impl DialecticSession {
    /// Create a new session in the `Thesis` phase.
    ///
    /// Returns `None` when the paused agent and reviewer are the same
    /// identity — a session must always have two distinct parties.
    pub fn new(
        paused_agent_id: &str,
        reviewer_agent_id: &str,
        paused_agent_state: Option<HealthSnapshot>,
        max_synthesis_rounds: u32,
    ) -> Option<Self> {
        if paused_agent_id == reviewer_agent_id {
            return None;
        }
        Some(Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            paused_agent_id: paused_agent_id.to_string(),
            reviewer_agent_id: reviewer_agent_id.to_string(),
            phase: DialecticPhase::Thesis,
            transcript: Vec::new(),
            synthesis_round: 0,
            max_synthesis_rounds,
            resolution: None,
            created_at: Utc::now(),
            discovery_id: None,
            dispute_type: None,
            paused_agent_state,
        })
    }

    /// Attach a disputed finding to this session.
    pub fn with_dispute(mut self, discovery_id: &str, dispute_type: &str) -> Self {
        self.discovery_id = Some(discovery_id.to_string());
        self.dispute_type = Some(dispute_type.to_string());
        self
    }

    /// Transition to a new phase, enforcing the transition table.
    pub fn transition(&mut self, to: DialecticPhase) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(())
    }

    /// Whether the given agent is one of the two parties.
    pub fn is_party(&self, agent_id: &str) -> bool {
        agent_id == self.paused_agent_id || agent_id == self.reviewer_agent_id
    }

    /// The other party's id, if `agent_id` is a party.
    pub fn counterparty(&self, agent_id: &str) -> Option<&str> {
        if agent_id == self.paused_agent_id {
            Some(&self.reviewer_agent_id)
        } else if agent_id == self.reviewer_agent_id {
            Some(&self.paused_agent_id)
        } else {
            None
        }
    }

    /// Append a message to the transcript. Messages are never reordered or
    /// removed.
    pub fn append(&mut self, message: DialecticMessage) {
        self.transcript.push(message);
    }

    /// Timestamp of the newest transcript entry, or `created_at` for an
    /// empty transcript. Drives stale-session detection.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.transcript
            .last()
            .map(|m| m.timestamp)
            .unwrap_or(self.created_at)
    }

    /// The most recent synthesis message from each party, newest first per
    /// party, as `(paused, reviewer)`.
    pub fn latest_synthesis_pair(&self) -> (Option<&DialecticMessage>, Option<&DialecticMessage>) {
        let latest_from = |agent: &str| {
            self.transcript
                .iter()
                .rev()
                .find(|m| m.agent_id == agent && matches!(m.body, MessageBody::Synthesis { .. }))
        };
        (
            latest_from(&self.paused_agent_id),
            latest_from(&self.reviewer_agent_id),
        )
    }

    /// Convergence rule: both parties' most recent synthesis messages carry
    /// `agrees = true`. Content equality is not required — the resolution is
    /// built from the most recent agreeing proposal.
    pub fn has_converged(&self) -> bool {
        let (paused, reviewer) = self.latest_synthesis_pair();
        matches!(
            (paused.map(|m| m.agrees()), reviewer.map(|m| m.agrees())),
            (Some(Some(true)), Some(Some(true)))
        )
    }

    /// Mutual disagreement: both parties' most recent synthesis messages
    /// carry `agrees = false`.
    pub fn mutual_disagreement(&self) -> bool {
        let (paused, reviewer) = self.latest_synthesis_pair();
        matches!(
            (paused.map(|m| m.agrees()), reviewer.map(|m| m.agrees())),
            (Some(Some(false)), Some(Some(false)))
        )
    }

    /// The most recent agreeing synthesis proposal, as
    /// `(conditions, root_cause, reasoning)`. Present only after
    /// convergence; the resolution is built from it.
    pub fn agreed_proposal(&self) -> Option<(Vec<String>, String, String)> {
        if !self.has_converged() {
            return None;
        }
        self.transcript
            .iter()
            .rev()
            .find(|m| m.agrees() == Some(true))
            .and_then(|m| match &m.body {
                MessageBody::Synthesis {
                    proposed_conditions,
                    root_cause,
                    reasoning,
                    ..
                } => Some((
                    proposed_conditions.clone(),
                    root_cause.clone(),
                    reasoning.clone(),
                )),
                _ => None,
            })
    }

    /// Number of synthesis messages each party has submitted, as
    /// `(paused, reviewer)`.
    pub fn synthesis_counts(&self) -> (u32, u32) {
        let count_for = |agent: &str| {
            self.transcript
                .iter()
                .filter(|m| m.agent_id == agent && matches!(m.body, MessageBody::Synthesis { .. }))
                .count() as u32
        };
        (
            count_for(&self.paused_agent_id),
            count_for(&self.reviewer_agent_id),
        )
    }

    /// Compact status line for logging.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] round {}/{} | {} messages | paused={} reviewer={}",
            self.phase,
            self.synthesis_round,
            self.max_synthesis_rounds,
            self.transcript.len(),
            self.paused_agent_id,
            self.reviewer_agent_id
        )
    }
}
