//! Transcript messages — one tagged variant per negotiation step.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Agent id used for reaper-authored transcript entries.
pub const SYSTEM_AGENT_ID: &str = "system";

/// Phase-specific message content.
///
/// Each step carries its own required fields rather than one struct with
/// many optional ones; the `phase` tag makes the persisted JSON
/// self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum MessageBody {
    /// The paused agent's account of what went wrong.
    Thesis {
        root_cause: String,
        proposed_conditions: Vec<String>,
        reasoning: String,
    },
    /// The reviewer's concerns, with a metric snapshot as observed.
    Antithesis {
        observed_metrics: BTreeMap<String, f64>,
        concerns: Vec<String>,
        reasoning: String,
    },
    /// A joint proposal from either party.
    Synthesis {
        proposed_conditions: Vec<String>,
        root_cause: String,
        reasoning: String,
        /// Tri-state: agreement, disagreement, or not yet stated.
        #[serde(skip_serializing_if = "Option::is_none")]
        agrees: Option<bool>,
    },
    /// Reaper-authored note; never submitted by a party.
    System { note: String },
}

/// One turn in a session transcript. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialecticMessage {
    /// Who produced this message.
    pub agent_id: String,
    /// When it was appended.
    pub timestamp: DateTime<Utc>,
    /// Phase-tagged content.
    #[serde(flatten)]
    pub body: MessageBody,
}

impl DialecticMessage {
    pub fn thesis(
        agent_id: &str,
        root_cause: &str,
        proposed_conditions: Vec<String>,
        reasoning: &str,
    ) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            timestamp: Utc::now(),
            body: MessageBody::Thesis {
                root_cause: root_cause.to_string(),
                proposed_conditions,
                reasoning: reasoning.to_string(),
            },
        }
    }

    pub fn antithesis(
        agent_id: &str,
        observed_metrics: BTreeMap<String, f64>,
        concerns: Vec<String>,
        reasoning: &str,
    ) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            timestamp: Utc::now(),
            body: MessageBody::Antithesis {
                observed_metrics,
                concerns,
                reasoning: reasoning.to_string(),
            },
        }
    }

    pub fn synthesis(
        agent_id: &str,
        proposed_conditions: Vec<String>,
        root_cause: &str,
        reasoning: &str,
        agrees: Option<bool>,
    ) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            timestamp: Utc::now(),
            body: MessageBody::Synthesis {
                proposed_conditions,
                root_cause: root_cause.to_string(),
                reasoning: reasoning.to_string(),
                agrees,
            },
        }
    }

    /// A reaper-authored system note.
    pub fn system(note: &str) -> Self {
        Self {
            agent_id: SYSTEM_AGENT_ID.to_string(),
            timestamp: Utc::now(),
            body: MessageBody::System {
                note: note.to_string(),
            },
        }
    }

    /// The agreement flag, when this is a synthesis message.
    pub fn agrees(&self) -> Option<bool> {
        match &self.body {
            MessageBody::Synthesis { agrees, .. } => *agrees,
            _ => None,
        }
    }

    /// The proposed conditions carried by this message, when any.
    pub fn proposed_conditions(&self) -> Option<&[String]> {
        match &self.body {
            MessageBody::Thesis {
                proposed_conditions, ..
            }
            | MessageBody::Synthesis {
                proposed_conditions, ..
            } => Some(proposed_conditions),
            _ => None,
        }
    }

    /// The stated root cause, when this variant carries one.
    pub fn root_cause(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Thesis { root_cause, .. }
            | MessageBody::Synthesis { root_cause, .. } => Some(root_cause),
            _ => None,
        }
    }

    /// The free-text reasoning, when this variant carries one.
    pub fn reasoning(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Thesis { reasoning, .. }
            | MessageBody::Antithesis { reasoning, .. }
            | MessageBody::Synthesis { reasoning, .. } => Some(reasoning),
            _ => None,
        }
    }
}
