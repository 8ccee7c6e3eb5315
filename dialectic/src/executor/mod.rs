//! Resolution executor — applies a converged resolution to the outside
//! world.
//!
//! The agent-status change and the linked-finding update are independent
//! side effects with at-least-once semantics: a finding-update failure is
//! recorded as a warning and never rolls back the status change.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::protocol::{DialecticSession, Resolution, ResolutionAction};
use crate::registry::{AgentRegistry, AgentStatus, FindingStatus, FindingStore};

/// Outcome of executing a resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the paused agent was transitioned back to active.
    pub resumed: bool,
    /// The agent was no longer paused when execution ran; status was left
    /// untouched.
    pub already_active: bool,
    /// Conditions recorded as applied (enforcement is delegated to the
    /// governance layer).
    pub applied_conditions: Vec<String>,
    /// Whether the linked finding, if any, was updated.
    pub finding_updated: bool,
    /// Non-fatal problems encountered along the way.
    pub warnings: Vec<String>,
}

/// Applies converged resolutions: status mutation plus optional finding
/// update.
pub struct ResolutionExecutor {
    registry: Arc<dyn AgentRegistry>,
    findings: Arc<dyn FindingStore>,
}

impl ResolutionExecutor {
    pub fn new(registry: Arc<dyn AgentRegistry>, findings: Arc<dyn FindingStore>) -> Self {
        Self { registry, findings }
    }

    /// Execute a resolution for its session.
    pub async fn execute(
        &self,
        session: &DialecticSession,
        resolution: &Resolution,
    ) -> Result<ExecutionResult> {
        let mut result = ExecutionResult {
            resumed: false,
            already_active: false,
            applied_conditions: Vec::new(),
            finding_updated: false,
            warnings: Vec::new(),
        };

        let status = self
            .registry
            .lifecycle_status(&session.paused_agent_id)
            .await?;

        match resolution.action {
            ResolutionAction::Resume => {
                if status == Some(AgentStatus::Paused) {
                    for condition in &resolution.conditions {
                        // Pass-through record; interpretation is the
                        // governance layer's job.
                        result.applied_conditions.push(condition.clone());
                    }
                    self.registry
                        .set_lifecycle_status(
                            &session.paused_agent_id,
                            AgentStatus::Active,
                            &format!(
                                "peer review resolved session {} (reviewer {})",
                                session.session_id, session.reviewer_agent_id
                            ),
                        )
                        .await?;
                    result.resumed = true;
                    info!(
                        session_id = %session.session_id,
                        agent_id = %session.paused_agent_id,
                        conditions = result.applied_conditions.len(),
                        "paused agent resumed"
                    );
                } else {
                    result.already_active = true;
                    let note = format!(
                        "agent {} is no longer paused (status: {:?}); resume skipped",
                        session.paused_agent_id, status
                    );
                    warn!(session_id = %session.session_id, "{}", note);
                    result.warnings.push(note);
                }
            }
            ResolutionAction::Block => {
                info!(
                    session_id = %session.session_id,
                    agent_id = %session.paused_agent_id,
                    "resolution blocked resumption; agent stays paused"
                );
            }
        }

        if let Some(discovery_id) = &session.discovery_id {
            let (finding_status, note) = match resolution.action {
                ResolutionAction::Resume => (
                    FindingStatus::Corrected,
                    format!("dispute upheld by session {}", session.session_id),
                ),
                ResolutionAction::Block => (
                    FindingStatus::DisputeRejected,
                    format!("dispute rejected by session {}", session.session_id),
                ),
            };
            match self
                .findings
                .update_finding_status(discovery_id, finding_status, &note)
                .await
            {
                Ok(()) => result.finding_updated = true,
                Err(err) => {
                    let note = format!("finding {} update failed: {}", discovery_id, err);
                    warn!(session_id = %session.session_id, "{}", note);
                    result.warnings.push(note);
                }
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::resolution::content_hash;
    use crate::registry::{
        Finding, HealthSnapshot, InMemoryAgentRegistry, InMemoryFindingStore, Reputation,
    };
    use chrono::Utc;

    fn snapshot() -> HealthSnapshot {
        HealthSnapshot {
            coherence: 0.5,
            attention_score: 0.5,
            void_active: false,
        }
    }

    fn make_resolution(session: &DialecticSession, action: ResolutionAction) -> Resolution {
        let conditions = vec!["monitor for 1h".to_string()];
        Resolution {
            action,
            conditions: conditions.clone(),
            root_cause: "drift".to_string(),
            reasoning: "agreed".to_string(),
            signature_a: "sig-a".to_string(),
            signature_b: "sig-b".to_string(),
            timestamp: Utc::now(),
            content_hash: content_hash(&session.session_id, action, &conditions, "drift"),
        }
    }

    fn setup(
        status: AgentStatus,
    ) -> (
        ResolutionExecutor,
        Arc<InMemoryAgentRegistry>,
        Arc<InMemoryFindingStore>,
    ) {
        let registry = Arc::new(InMemoryAgentRegistry::new());
        registry.register(
            "agent-p",
            "secret",
            status,
            Some(snapshot()),
            vec![],
            Reputation::default(),
        );
        let findings = Arc::new(InMemoryFindingStore::new());
        let executor = ResolutionExecutor::new(registry.clone(), findings.clone());
        (executor, registry, findings)
    }

    #[tokio::test]
    async fn test_resume_transitions_agent_to_active() {
        let (executor, registry, _findings) = setup(AgentStatus::Paused);
        let session = DialecticSession::new("agent-p", "agent-r", Some(snapshot()), 3).unwrap();
        let resolution = make_resolution(&session, ResolutionAction::Resume);

        let result = executor.execute(&session, &resolution).await.unwrap();
        assert!(result.resumed);
        assert!(!result.already_active);
        assert_eq!(result.applied_conditions, vec!["monitor for 1h"]);
        assert_eq!(
            registry.lifecycle_status("agent-p").await.unwrap(),
            Some(AgentStatus::Active)
        );
    }

    #[tokio::test]
    async fn test_already_active_is_noop_warning() {
        let (executor, registry, _findings) = setup(AgentStatus::Active);
        let session = DialecticSession::new("agent-p", "agent-r", Some(snapshot()), 3).unwrap();
        let resolution = make_resolution(&session, ResolutionAction::Resume);

        let result = executor.execute(&session, &resolution).await.unwrap();
        assert!(!result.resumed);
        assert!(result.already_active);
        assert!(!result.warnings.is_empty());
        assert_eq!(
            registry.lifecycle_status("agent-p").await.unwrap(),
            Some(AgentStatus::Active)
        );
    }

    #[tokio::test]
    async fn test_block_leaves_agent_paused() {
        let (executor, registry, _findings) = setup(AgentStatus::Paused);
        let session = DialecticSession::new("agent-p", "agent-r", Some(snapshot()), 3).unwrap();
        let resolution = make_resolution(&session, ResolutionAction::Block);

        let result = executor.execute(&session, &resolution).await.unwrap();
        assert!(!result.resumed);
        assert!(result.applied_conditions.is_empty());
        assert_eq!(
            registry.lifecycle_status("agent-p").await.unwrap(),
            Some(AgentStatus::Paused)
        );
    }

    #[tokio::test]
    async fn test_dispute_resume_corrects_finding() {
        let (executor, _registry, findings) = setup(AgentStatus::Paused);
        findings.insert(Finding {
            id: "disc-1".to_string(),
            agent_id: "agent-p".to_string(),
            status: FindingStatus::Recorded,
            note: None,
        });
        let session = DialecticSession::new("agent-p", "agent-r", Some(snapshot()), 3)
            .unwrap()
            .with_dispute("disc-1", "verification");
        let resolution = make_resolution(&session, ResolutionAction::Resume);

        let result = executor.execute(&session, &resolution).await.unwrap();
        assert!(result.finding_updated);
        assert_eq!(
            findings.finding("disc-1").await.unwrap().unwrap().status,
            FindingStatus::Corrected
        );
    }

    #[tokio::test]
    async fn test_dispute_block_rejects_finding() {
        let (executor, _registry, findings) = setup(AgentStatus::Paused);
        findings.insert(Finding {
            id: "disc-1".to_string(),
            agent_id: "agent-p".to_string(),
            status: FindingStatus::Recorded,
            note: None,
        });
        let session = DialecticSession::new("agent-p", "agent-r", Some(snapshot()), 3)
            .unwrap()
            .with_dispute("disc-1", "verification");
        let resolution = make_resolution(&session, ResolutionAction::Block);

        let result = executor.execute(&session, &resolution).await.unwrap();
        assert!(result.finding_updated);
        assert_eq!(
            findings.finding("disc-1").await.unwrap().unwrap().status,
            FindingStatus::DisputeRejected
        );
    }

    #[tokio::test]
    async fn test_finding_failure_does_not_roll_back_resume() {
        let (executor, registry, _findings) = setup(AgentStatus::Paused);
        // Finding store has no such finding; the update errors.
        let session = DialecticSession::new("agent-p", "agent-r", Some(snapshot()), 3)
            .unwrap()
            .with_dispute("ghost-finding", "verification");
        let resolution = make_resolution(&session, ResolutionAction::Resume);

        let result = executor.execute(&session, &resolution).await.unwrap();
        assert!(result.resumed);
        assert!(!result.finding_updated);
        assert!(result.warnings.iter().any(|w| w.contains("ghost-finding")));
        assert_eq!(
            registry.lifecycle_status("agent-p").await.unwrap(),
            Some(AgentStatus::Active)
        );
    }
}
