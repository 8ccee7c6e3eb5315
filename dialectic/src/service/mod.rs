//! Dialectic coordinator — the request-level surface of the recovery
//! protocol.
//!
//! Each mutating operation takes a per-session async mutex around its
//! read-validate-append-persist sequence, so concurrent submissions to one
//! session serialize while different sessions proceed independently. The
//! durable store is the source of truth; every operation re-reads the
//! session under the lock.

pub mod error;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::calibration::CalibrationFeedback;
use crate::config::DialecticConfig;
use crate::executor::ResolutionExecutor;
use crate::protocol::{
    proposal_hash, resolution::content_hash, DialecticMessage, DialecticPhase, DialecticSession,
    Resolution, ResolutionAction,
};
use crate::registry::{AgentRegistry, AuditLog, CalibrationModel, FindingStore};
use crate::selection::ReviewerSelector;
use crate::store::{ReapSummary, SharedSessionStore, StaleSessionReaper};

pub use error::{ProtocolError, ProtocolResult};

/// Thesis submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThesisInput {
    pub root_cause: String,
    pub proposed_conditions: Vec<String>,
    pub reasoning: String,
}

/// Antithesis submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntithesisInput {
    pub observed_metrics: BTreeMap<String, f64>,
    pub concerns: Vec<String>,
    pub reasoning: String,
}

/// Synthesis submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisInput {
    pub proposed_conditions: Vec<String>,
    pub root_cause: String,
    pub reasoning: String,
    pub agrees: Option<bool>,
}

/// Response to a review request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequested {
    pub session_id: String,
    pub reviewer_agent_id: String,
    pub phase: DialecticPhase,
}

/// Outcome of a submit operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub session_id: String,
    /// Authoritative phase after the submission.
    pub phase: DialecticPhase,
    pub synthesis_round: u32,
    /// Both latest proposals agree; the caller should finalize.
    pub converged: bool,
    /// Both latest proposals explicitly disagree.
    pub mutual_disagreement: bool,
}

impl SubmitOutcome {
    fn from_session(session: &DialecticSession) -> Self {
        Self {
            session_id: session.session_id.clone(),
            phase: session.phase,
            synthesis_round: session.synthesis_round,
            converged: session.has_converged(),
            mutual_disagreement: session.mutual_disagreement(),
        }
    }
}

/// Compact session view for callers that do not need the full record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub phase: DialecticPhase,
    pub paused_agent_id: String,
    pub reviewer_agent_id: String,
    pub synthesis_round: u32,
    pub max_synthesis_rounds: u32,
    pub converged: bool,
    pub message_count: usize,
}

impl SessionStatus {
    pub fn from_session(session: &DialecticSession) -> Self {
        Self {
            session_id: session.session_id.clone(),
            phase: session.phase,
            paused_agent_id: session.paused_agent_id.clone(),
            reviewer_agent_id: session.reviewer_agent_id.clone(),
            synthesis_round: session.synthesis_round,
            max_synthesis_rounds: session.max_synthesis_rounds,
            converged: session.has_converged(),
            message_count: session.transcript.len(),
        }
    }
}

/// Shared reference to a DialecticCoordinator.
pub type SharedDialecticCoordinator = Arc<DialecticCoordinator>;

/// Central orchestrator for the dialectic recovery protocol.
pub struct DialecticCoordinator {
    store: SharedSessionStore,
    registry: Arc<dyn AgentRegistry>,
    selector: ReviewerSelector,
    executor: ResolutionExecutor,
    feedback: CalibrationFeedback,
    reaper: StaleSessionReaper,
    config: DialecticConfig,
    session_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DialecticCoordinator {
    pub fn new(
        store: SharedSessionStore,
        registry: Arc<dyn AgentRegistry>,
        audit: Arc<dyn AuditLog>,
        findings: Arc<dyn FindingStore>,
        calibration: Arc<dyn CalibrationModel>,
        config: DialecticConfig,
    ) -> Self {
        let selector = ReviewerSelector::new(store.clone(), registry.clone(), config.selector);
        let executor = ResolutionExecutor::new(registry.clone(), findings);
        let feedback = CalibrationFeedback::new(audit, calibration);
        let reaper = StaleSessionReaper::new(store.clone());
        Self {
            store,
            registry,
            selector,
            executor,
            feedback,
            reaper,
            config,
            session_locks: DashMap::new(),
        }
    }

    /// Create a shared reference to this coordinator.
    pub fn shared(self) -> SharedDialecticCoordinator {
        Arc::new(self)
    }

    // ────────────────────────────────────────────────────────────────────
    // Session lifecycle
    // ────────────────────────────────────────────────────────────────────

    /// Open a review session for a paused (or otherwise stuck) agent.
    ///
    /// Reaps stale sessions first so a session nobody is advancing never
    /// blocks reviewer eligibility, then selects a reviewer and persists
    /// the new session in the `Thesis` phase.
    pub async fn request_review(
        &self,
        paused_agent_id: &str,
        reason: &str,
        discovery_id: Option<&str>,
        dispute_type: Option<&str>,
    ) -> ProtocolResult<ReviewRequested> {
        self.reaper.reap(self.config.inactivity_threshold())?;

        if self
            .registry
            .lifecycle_status(paused_agent_id)
            .await?
            .is_none()
        {
            return Err(ProtocolError::NotFound(format!(
                "agent {}",
                paused_agent_id
            )));
        }

        let paused_tags = self.registry.tags(paused_agent_id).await?;
        let paused_state = self.registry.health_snapshot(paused_agent_id).await?;

        let reviewer = self
            .selector
            .select_reviewer(paused_agent_id, &paused_tags, &[])
            .await?
            .ok_or_else(|| ProtocolError::NoEligibleReviewer(paused_agent_id.to_string()))?;

        let mut session = DialecticSession::new(
            paused_agent_id,
            &reviewer,
            paused_state,
            self.config.max_synthesis_rounds,
        )
        .expect("selector never returns the paused agent itself");

        if let (Some(id), Some(kind)) = (discovery_id, dispute_type) {
            session = session.with_dispute(id, kind);
        }
        session.append(DialecticMessage::system(&format!(
            "review requested by {}: {}",
            paused_agent_id, reason
        )));

        self.store.persist(&session)?;
        info!(
            session_id = %session.session_id,
            paused = paused_agent_id,
            reviewer = %reviewer,
            "dialectic session created"
        );

        Ok(ReviewRequested {
            session_id: session.session_id,
            reviewer_agent_id: reviewer,
            phase: DialecticPhase::Thesis,
        })
    }

    /// Fetch the full session record.
    pub fn get_session(&self, session_id: &str) -> ProtocolResult<DialecticSession> {
        self.load_session(session_id)
    }

    /// All sessions where the agent is either party, newest first.
    pub fn sessions_for_agent(&self, agent_id: &str) -> ProtocolResult<Vec<DialecticSession>> {
        Ok(self.store.sessions_for_agent(agent_id)?)
    }

    /// Manual trigger for the stale-session reaper.
    pub fn cleanup_stale_sessions(&self) -> ProtocolResult<ReapSummary> {
        Ok(self.reaper.reap(self.config.inactivity_threshold())?)
    }

    /// Spawn the periodic background reaper. Returns the task handle; abort
    /// it to stop the cadence.
    pub fn spawn_reaper(coordinator: SharedDialecticCoordinator) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(coordinator.config.reaper_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match coordinator
                    .reaper
                    .reap(coordinator.config.inactivity_threshold())
                {
                    Ok(summary) if summary.reaped > 0 => {
                        info!(reaped = summary.reaped, "background reap pass");
                    }
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "background reap pass failed"),
                }
            }
        })
    }

    // ────────────────────────────────────────────────────────────────────
    // Submit operations
    // ────────────────────────────────────────────────────────────────────

    /// Paused agent submits its account of the failure. `Thesis` →
    /// `Antithesis`.
    pub async fn submit_thesis(
        &self,
        session_id: &str,
        agent_id: &str,
        credential: &str,
        input: ThesisInput,
    ) -> ProtocolResult<SubmitOutcome> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load_session(session_id)?;
        if agent_id != session.paused_agent_id {
            return Err(ProtocolError::WrongParty {
                agent_id: agent_id.to_string(),
                phase: session.phase,
            });
        }
        self.authenticate(agent_id, credential, session.phase).await?;
        if session.phase != DialecticPhase::Thesis {
            return Err(ProtocolError::WrongPhase {
                expected: DialecticPhase::Thesis,
                actual: session.phase,
            });
        }

        session.append(DialecticMessage::thesis(
            agent_id,
            &input.root_cause,
            input.proposed_conditions,
            &input.reasoning,
        ));
        session
            .transition(DialecticPhase::Antithesis)
            .expect("thesis phase always admits antithesis");
        self.store.persist(&session)?;

        info!(session_id, agent_id, "thesis submitted");
        Ok(SubmitOutcome::from_session(&session))
    }

    /// Reviewer submits its concerns. `Antithesis` → `Synthesis`.
    pub async fn submit_antithesis(
        &self,
        session_id: &str,
        agent_id: &str,
        credential: &str,
        input: AntithesisInput,
    ) -> ProtocolResult<SubmitOutcome> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load_session(session_id)?;
        if agent_id != session.reviewer_agent_id {
            return Err(ProtocolError::WrongParty {
                agent_id: agent_id.to_string(),
                phase: session.phase,
            });
        }
        self.authenticate(agent_id, credential, session.phase).await?;
        if session.phase != DialecticPhase::Antithesis {
            return Err(ProtocolError::WrongPhase {
                expected: DialecticPhase::Antithesis,
                actual: session.phase,
            });
        }

        session.append(DialecticMessage::antithesis(
            agent_id,
            input.observed_metrics,
            input.concerns,
            &input.reasoning,
        ));
        session
            .transition(DialecticPhase::Synthesis)
            .expect("antithesis phase always admits synthesis");
        self.store.persist(&session)?;

        info!(session_id, agent_id, "antithesis submitted");
        Ok(SubmitOutcome::from_session(&session))
    }

    /// Either party submits a joint proposal. The round counter advances
    /// once both parties have spoken in the current round; starting a round
    /// beyond the limit without convergence escalates the session.
    pub async fn submit_synthesis(
        &self,
        session_id: &str,
        agent_id: &str,
        credential: &str,
        input: SynthesisInput,
    ) -> ProtocolResult<SubmitOutcome> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load_session(session_id)?;
        if !session.is_party(agent_id) {
            return Err(ProtocolError::WrongParty {
                agent_id: agent_id.to_string(),
                phase: session.phase,
            });
        }
        self.authenticate(agent_id, credential, session.phase).await?;
        if session.phase != DialecticPhase::Synthesis {
            return Err(ProtocolError::WrongPhase {
                expected: DialecticPhase::Synthesis,
                actual: session.phase,
            });
        }

        session.append(DialecticMessage::synthesis(
            agent_id,
            input.proposed_conditions,
            &input.root_cause,
            &input.reasoning,
            input.agrees,
        ));

        let (paused_count, reviewer_count) = session.synthesis_counts();
        let previous_round = session.synthesis_round;
        session.synthesis_round = paused_count.min(reviewer_count);
        let round_completed = session.synthesis_round > previous_round;

        let converged = session.has_converged();
        let attempted_round = paused_count.max(reviewer_count);
        let escalated = !converged && attempted_round > session.max_synthesis_rounds;
        if escalated {
            session
                .transition(DialecticPhase::Escalated)
                .expect("synthesis phase always admits escalation");
        }
        self.store.persist(&session)?;

        if escalated {
            warn!(
                session_id,
                rounds = session.synthesis_round,
                "synthesis round limit exhausted; session escalated"
            );
            self.feedback.report_disagreement(&session).await;
        } else if round_completed && session.mutual_disagreement() {
            info!(session_id, "mutual disagreement in synthesis round");
            self.feedback.report_disagreement(&session).await;
        }

        info!(
            session_id,
            agent_id,
            round = session.synthesis_round,
            converged,
            "synthesis submitted"
        );
        Ok(SubmitOutcome::from_session(&session))
    }

    /// Finalize a converged session into a dual-signed resolution.
    ///
    /// Both signatures must validate against their parties' registered
    /// credentials; an invalid signature leaves the session in `Synthesis`
    /// so finalize can be retried with corrected signatures. The hard-limit
    /// gate runs against the paused agent's live metrics and downgrades an
    /// unsafe resume to `block` — the session still resolves, recorded as
    /// blocked.
    pub async fn finalize(
        &self,
        session_id: &str,
        signature_a: &str,
        signature_b: &str,
    ) -> ProtocolResult<Resolution> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load_session(session_id)?;
        if session.phase != DialecticPhase::Synthesis {
            return Err(ProtocolError::WrongPhase {
                expected: DialecticPhase::Synthesis,
                actual: session.phase,
            });
        }
        let (conditions, root_cause, reasoning) = session
            .agreed_proposal()
            .ok_or(ProtocolError::NotConverged {
                phase: session.phase,
            })?;

        let signed_hash = proposal_hash(&session.session_id, &conditions, &root_cause);
        for (agent_id, signature) in [
            (session.paused_agent_id.clone(), signature_a),
            (session.reviewer_agent_id.clone(), signature_b),
        ] {
            if !self
                .registry
                .verify_signature(&agent_id, &signed_hash, signature)
                .await?
            {
                return Err(ProtocolError::AuthenticationFailed {
                    agent_id,
                    phase: session.phase,
                });
            }
        }

        // Safety gate: live metrics, not the creation-time snapshot.
        let live = self
            .registry
            .health_snapshot(&session.paused_agent_id)
            .await?;
        let (action, violation) = match live {
            Some(snapshot) => {
                let check = self
                    .config
                    .hard_limits
                    .check(ResolutionAction::Resume, &snapshot);
                if check.safe {
                    (ResolutionAction::Resume, None)
                } else {
                    (ResolutionAction::Block, check.violation)
                }
            }
            None => (
                ResolutionAction::Block,
                Some("live health metrics unavailable".to_string()),
            ),
        };
        if let Some(ref violation) = violation {
            warn!(
                session_id,
                violation = %violation,
                "hard limit violated; resolution downgraded to block"
            );
            session.append(DialecticMessage::system(&format!(
                "hard limit violated: {}; action downgraded to block",
                violation
            )));
        }

        let resolution = Resolution {
            action,
            content_hash: content_hash(&session.session_id, action, &conditions, &root_cause),
            conditions,
            root_cause,
            reasoning,
            signature_a: signature_a.to_string(),
            signature_b: signature_b.to_string(),
            timestamp: Utc::now(),
        };
        session.resolution = Some(resolution.clone());
        session
            .transition(DialecticPhase::Resolved)
            .expect("synthesis phase always admits resolution");
        self.store.persist(&session)?;
        info!(session_id, action = %resolution.action, "session resolved");

        // Side effects after the durable transition; failures here are
        // logged and never unwind the resolution.
        match self.executor.execute(&session, &resolution).await {
            Ok(result) => {
                for warning in &result.warnings {
                    warn!(session_id, warning = %warning, "resolution execution warning");
                }
            }
            Err(err) => warn!(session_id, error = %err, "resolution execution failed"),
        }
        self.feedback.report_convergence(&session).await;

        Ok(resolution)
    }

    // ────────────────────────────────────────────────────────────────────
    // Internals
    // ────────────────────────────────────────────────────────────────────

    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.session_locks
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    fn load_session(&self, session_id: &str) -> ProtocolResult<DialecticSession> {
        self.store
            .get(session_id)?
            .ok_or_else(|| ProtocolError::NotFound(format!("session {}", session_id)))
    }

    async fn authenticate(
        &self,
        agent_id: &str,
        credential: &str,
        phase: DialecticPhase,
    ) -> ProtocolResult<()> {
        if !self.registry.verify_credential(agent_id, credential).await? {
            return Err(ProtocolError::AuthenticationFailed {
                agent_id: agent_id.to_string(),
                phase,
            });
        }
        Ok(())
    }
}
