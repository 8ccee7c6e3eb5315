//! External collaborators — agent registry, audit log, finding store, and
//! calibration model.
//!
//! The protocol consumes these as async traits; production backends live
//! outside this crate. The `InMemory*` implementations back tests and
//! single-process deployments.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::resolution;

/// Live health metrics for an agent, as produced by the external
/// metrics engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Internal consistency metric (0.0–1.0, higher is healthier).
    pub coherence: f64,
    /// Attention/risk score (0.0–1.0, lower is healthier).
    pub attention_score: f64,
    /// Instability flag; set when the agent entered the void state.
    pub void_active: bool,
}

impl HealthSnapshot {
    /// Scalar health factor used for reviewer weighting: high coherence and
    /// low attention score score well; a void agent scores zero.
    pub fn health_factor(&self) -> f64 {
        if self.void_active {
            return 0.0;
        }
        (self.coherence * (1.0 - self.attention_score)).max(0.0)
    }
}

/// Lifecycle status of an agent in the external registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Normal operation.
    Active,
    /// Circuit breaker tripped; awaiting recovery.
    Paused,
    /// Permanently decommissioned.
    Retired,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Retired => write!(f, "retired"),
        }
    }
}

/// Review-track record for a candidate reviewer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Reputation {
    pub total_reviews: u64,
    pub successful_reviews: u64,
}

impl Reputation {
    /// Success ratio; an untested reviewer gets the benefit of the doubt at
    /// 0.5 so a fresh pool is never starved.
    pub fn ratio(&self) -> f64 {
        if self.total_reviews == 0 {
            return 0.5;
        }
        self.successful_reviews as f64 / self.total_reviews as f64
    }
}

/// A confidence-bearing decision pulled from the external audit log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RecordedDecision {
    /// Confidence the agent attached to the decision (0.0–1.0).
    pub confidence: f64,
    /// Whether the agent decided to proceed.
    pub decision_was_proceed: bool,
}

/// Status of a recorded finding in the external discovery store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    /// As recorded; not yet disputed or confirmed.
    Recorded,
    /// Dispute upheld; the finding was corrected.
    Corrected,
    /// Dispute rejected; the finding stands.
    DisputeRejected,
}

/// A recorded finding that a dialectic session may dispute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub agent_id: String,
    pub status: FindingStatus,
    pub note: Option<String>,
}

/// Agent identity, credentials, health, and reputation.
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    /// All registered agent ids.
    async fn list_agents(&self) -> Result<Vec<String>>;

    /// Live health snapshot; `None` when the metrics engine has no data.
    async fn health_snapshot(&self, agent_id: &str) -> Result<Option<HealthSnapshot>>;

    /// Current lifecycle status; `None` for an unknown agent.
    async fn lifecycle_status(&self, agent_id: &str) -> Result<Option<AgentStatus>>;

    /// Mutate lifecycle status with an audit note.
    async fn set_lifecycle_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
        reason: &str,
    ) -> Result<()>;

    /// Whether the presented credential belongs to the agent.
    async fn verify_credential(&self, agent_id: &str, credential: &str) -> Result<bool>;

    /// Whether a resolution signature validates against the agent's
    /// registered credential. The registry issues credentials, so it is the
    /// only component that may check signatures against them.
    async fn verify_signature(
        &self,
        agent_id: &str,
        content_hash: &str,
        signature: &str,
    ) -> Result<bool>;

    /// Topic tags for the agent.
    async fn tags(&self, agent_id: &str) -> Result<Vec<String>>;

    /// Review-track record for the agent.
    async fn reputation(&self, agent_id: &str) -> Result<Reputation>;
}

/// Read-only view of the agent decision audit log.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// The agent's most recent confidence-bearing decision within the
    /// trailing window, newest first.
    async fn find_recent_decision(
        &self,
        agent_id: &str,
        window: Duration,
    ) -> Result<Option<RecordedDecision>>;
}

/// Discovery/knowledge store, consulted only for dispute sessions.
#[async_trait]
pub trait FindingStore: Send + Sync {
    async fn finding(&self, id: &str) -> Result<Option<Finding>>;

    async fn update_finding_status(
        &self,
        id: &str,
        status: FindingStatus,
        note: &str,
    ) -> Result<()>;
}

/// External confidence-calibration model.
#[async_trait]
pub trait CalibrationModel: Send + Sync {
    /// Report a weighted correctness observation for an agent decision.
    async fn record_outcome(
        &self,
        agent_id: &str,
        confidence: f64,
        predicted_correct: bool,
        actual_correct: bool,
        weight: f64,
    ) -> Result<()>;

    /// Report a peer-disagreement penalty with the given severity (0.0–1.0).
    async fn record_disagreement(&self, agent_id: &str, severity: f64) -> Result<()>;
}

// ─── In-memory implementations ──────────────────────────────────────────────

#[derive(Debug, Clone)]
struct AgentRecord {
    credential: String,
    status: AgentStatus,
    health: Option<HealthSnapshot>,
    tags: Vec<String>,
    reputation: Reputation,
}

/// In-memory registry for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryAgentRegistry {
    agents: RwLock<HashMap<String, AgentRecord>>,
}

impl InMemoryAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent with a secret credential.
    pub fn register(
        &self,
        agent_id: &str,
        credential: &str,
        status: AgentStatus,
        health: Option<HealthSnapshot>,
        tags: Vec<String>,
        reputation: Reputation,
    ) {
        self.agents.write().unwrap().insert(
            agent_id.to_string(),
            AgentRecord {
                credential: credential.to_string(),
                status,
                health,
                tags,
                reputation,
            },
        );
    }

    /// Update an agent's health snapshot.
    pub fn set_health(&self, agent_id: &str, health: Option<HealthSnapshot>) {
        if let Some(record) = self.agents.write().unwrap().get_mut(agent_id) {
            record.health = health;
        }
    }
}

#[async_trait]
impl AgentRegistry for InMemoryAgentRegistry {
    async fn list_agents(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.agents.read().unwrap().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn health_snapshot(&self, agent_id: &str) -> Result<Option<HealthSnapshot>> {
        Ok(self
            .agents
            .read()
            .unwrap()
            .get(agent_id)
            .and_then(|r| r.health))
    }

    async fn lifecycle_status(&self, agent_id: &str) -> Result<Option<AgentStatus>> {
        Ok(self.agents.read().unwrap().get(agent_id).map(|r| r.status))
    }

    async fn set_lifecycle_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
        _reason: &str,
    ) -> Result<()> {
        let mut agents = self.agents.write().unwrap();
        let record = agents
            .get_mut(agent_id)
            .ok_or_else(|| anyhow!("unknown agent: {}", agent_id))?;
        record.status = status;
        Ok(())
    }

    async fn verify_credential(&self, agent_id: &str, credential: &str) -> Result<bool> {
        Ok(self
            .agents
            .read()
            .unwrap()
            .get(agent_id)
            .map(|r| r.credential == credential)
            .unwrap_or(false))
    }

    async fn verify_signature(
        &self,
        agent_id: &str,
        content_hash: &str,
        signature: &str,
    ) -> Result<bool> {
        let credential = match self.agents.read().unwrap().get(agent_id) {
            Some(record) => record.credential.clone(),
            None => return Ok(false),
        };
        Ok(resolution::verify(&credential, content_hash, signature))
    }

    async fn tags(&self, agent_id: &str) -> Result<Vec<String>> {
        Ok(self
            .agents
            .read()
            .unwrap()
            .get(agent_id)
            .map(|r| r.tags.clone())
            .unwrap_or_default())
    }

    async fn reputation(&self, agent_id: &str) -> Result<Reputation> {
        Ok(self
            .agents
            .read()
            .unwrap()
            .get(agent_id)
            .map(|r| r.reputation)
            .unwrap_or_default())
    }
}

/// In-memory audit log for tests.
#[derive(Default)]
pub struct InMemoryAuditLog {
    decisions: RwLock<Vec<(String, DateTime<Utc>, RecordedDecision)>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, agent_id: &str, at: DateTime<Utc>, decision: RecordedDecision) {
        self.decisions
            .write()
            .unwrap()
            .push((agent_id.to_string(), at, decision));
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn find_recent_decision(
        &self,
        agent_id: &str,
        window: Duration,
    ) -> Result<Option<RecordedDecision>> {
        let cutoff = Utc::now() - window;
        Ok(self
            .decisions
            .read()
            .unwrap()
            .iter()
            .filter(|(id, at, _)| id == agent_id && *at >= cutoff)
            .max_by_key(|(_, at, _)| *at)
            .map(|(_, _, decision)| *decision))
    }
}

/// In-memory finding store for tests.
#[derive(Default)]
pub struct InMemoryFindingStore {
    findings: RwLock<HashMap<String, Finding>>,
}

impl InMemoryFindingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, finding: Finding) {
        self.findings
            .write()
            .unwrap()
            .insert(finding.id.clone(), finding);
    }
}

#[async_trait]
impl FindingStore for InMemoryFindingStore {
    async fn finding(&self, id: &str) -> Result<Option<Finding>> {
        Ok(self.findings.read().unwrap().get(id).cloned())
    }

    async fn update_finding_status(
        &self,
        id: &str,
        status: FindingStatus,
        note: &str,
    ) -> Result<()> {
        let mut findings = self.findings.write().unwrap();
        let finding = findings
            .get_mut(id)
            .ok_or_else(|| anyhow!("unknown finding: {}", id))?;
        finding.status = status;
        finding.note = Some(note.to_string());
        Ok(())
    }
}

/// A single calibration report, retained for inspection in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationReport {
    Outcome {
        agent_id: String,
        confidence: f64,
        predicted_correct: bool,
        actual_correct: bool,
        weight: f64,
    },
    Disagreement {
        agent_id: String,
        severity: f64,
    },
}

/// In-memory calibration model that records every report.
#[derive(Default)]
pub struct InMemoryCalibrationModel {
    reports: RwLock<Vec<CalibrationReport>>,
}

impl InMemoryCalibrationModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<CalibrationReport> {
        self.reports.read().unwrap().clone()
    }
}

#[async_trait]
impl CalibrationModel for InMemoryCalibrationModel {
    async fn record_outcome(
        &self,
        agent_id: &str,
        confidence: f64,
        predicted_correct: bool,
        actual_correct: bool,
        weight: f64,
    ) -> Result<()> {
        self.reports
            .write()
            .unwrap()
            .push(CalibrationReport::Outcome {
                agent_id: agent_id.to_string(),
                confidence,
                predicted_correct,
                actual_correct,
                weight,
            });
        Ok(())
    }

    async fn record_disagreement(&self, agent_id: &str, severity: f64) -> Result<()> {
        self.reports
            .write()
            .unwrap()
            .push(CalibrationReport::Disagreement {
                agent_id: agent_id.to_string(),
                severity,
            });
        Ok(())
    }
}
