//! Calibration feedback — converts session outcomes into evidence for the
//! external confidence-calibration model.
//!
//! Both report paths are best-effort: an unreachable calibration model is
//! logged and swallowed, never failing or reversing the session transition
//! that triggered the report.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use crate::protocol::DialecticSession;
use crate::registry::{AuditLog, CalibrationModel};

/// Weight attached to peer-agreement evidence. Peer agreement corroborates;
/// it is not ground truth, so it carries less weight than a human label.
pub const PEER_AGREEMENT_WEIGHT: f64 = 0.7;

/// Weight attached to human ground truth (for reference; this crate only
/// ever reports peer evidence).
pub const GROUND_TRUTH_WEIGHT: f64 = 1.0;

/// Extra slack (seconds) added to the audit-log lookup window beyond the
/// session's own lifetime, to catch the decision that led to the pause.
const AUDIT_WINDOW_SLACK_SECS: i64 = 3600;

/// Dispute type whose resolution feeds the calibration model.
pub const VERIFICATION_DISPUTE: &str = "verification";

/// Reports session outcomes to the calibration model.
pub struct CalibrationFeedback {
    audit: Arc<dyn AuditLog>,
    model: Arc<dyn CalibrationModel>,
}

impl CalibrationFeedback {
    pub fn new(audit: Arc<dyn AuditLog>, model: Arc<dyn CalibrationModel>) -> Self {
        Self { audit, model }
    }

    /// Report peer-agreement evidence for a resolved verification dispute.
    ///
    /// Looks up the paused agent's original confidence-bearing decision in
    /// the audit log and reports it as correct with reduced weight. No-op
    /// for sessions that are not verification disputes or when no decision
    /// is found in the window.
    pub async fn report_convergence(&self, session: &DialecticSession) {
        if session.dispute_type.as_deref() != Some(VERIFICATION_DISPUTE) {
            return;
        }

        let window = (Utc::now() - session.created_at) + Duration::seconds(AUDIT_WINDOW_SLACK_SECS);
        let decision = match self
            .audit
            .find_recent_decision(&session.paused_agent_id, window)
            .await
        {
            Ok(Some(decision)) => decision,
            Ok(None) => {
                debug!(
                    session_id = %session.session_id,
                    "no recent decision found; skipping calibration report"
                );
                return;
            }
            Err(err) => {
                warn!(
                    session_id = %session.session_id,
                    error = %err,
                    "audit log lookup failed; skipping calibration report"
                );
                return;
            }
        };

        if let Err(err) = self
            .model
            .record_outcome(
                &session.paused_agent_id,
                decision.confidence,
                decision.decision_was_proceed,
                true,
                PEER_AGREEMENT_WEIGHT,
            )
            .await
        {
            warn!(
                session_id = %session.session_id,
                error = %err,
                "calibration outcome report failed"
            );
        }
    }

    /// Report a disagreement penalty for an escalated session or an explicit
    /// mutual disagreement mid-synthesis. Severity scales with the rounds
    /// consumed, reaching 1.0 at or above the round limit.
    pub async fn report_disagreement(&self, session: &DialecticSession) {
        let severity = disagreement_severity(session.synthesis_round, session.max_synthesis_rounds);
        if let Err(err) = self
            .model
            .record_disagreement(&session.paused_agent_id, severity)
            .await
        {
            warn!(
                session_id = %session.session_id,
                error = %err,
                "calibration disagreement report failed"
            );
        }
    }
}

/// Severity of a disagreement signal: fraction of the round budget consumed,
/// clamped to 1.0.
pub fn disagreement_severity(rounds_consumed: u32, max_rounds: u32) -> f64 {
    if max_rounds == 0 {
        return 1.0;
    }
    (rounds_consumed as f64 / max_rounds as f64).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{
        CalibrationReport, HealthSnapshot, InMemoryAuditLog, InMemoryCalibrationModel,
        RecordedDecision,
    };

    fn snapshot() -> HealthSnapshot {
        HealthSnapshot {
            coherence: 0.5,
            attention_score: 0.5,
            void_active: false,
        }
    }

    fn setup() -> (
        CalibrationFeedback,
        Arc<InMemoryAuditLog>,
        Arc<InMemoryCalibrationModel>,
    ) {
        let audit = Arc::new(InMemoryAuditLog::new());
        let model = Arc::new(InMemoryCalibrationModel::new());
        let feedback = CalibrationFeedback::new(audit.clone(), model.clone());
        (feedback, audit, model)
    }

    #[tokio::test]
    async fn test_convergence_report_for_verification_dispute() {
        let (feedback, audit, model) = setup();
        audit.record(
            "agent-p",
            Utc::now() - Duration::minutes(10),
            RecordedDecision {
                confidence: 0.82,
                decision_was_proceed: true,
            },
        );

        let session = DialecticSession::new("agent-p", "agent-r", Some(snapshot()), 3)
            .unwrap()
            .with_dispute("disc-1", VERIFICATION_DISPUTE);
        feedback.report_convergence(&session).await;

        let reports = model.reports();
        assert_eq!(reports.len(), 1);
        match &reports[0] {
            CalibrationReport::Outcome {
                agent_id,
                confidence,
                predicted_correct,
                actual_correct,
                weight,
            } => {
                assert_eq!(agent_id, "agent-p");
                assert!((confidence - 0.82).abs() < f64::EPSILON);
                assert!(*predicted_correct);
                assert!(*actual_correct);
                assert!((weight - PEER_AGREEMENT_WEIGHT).abs() < f64::EPSILON);
            }
            other => panic!("unexpected report {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_verification_session_reports_nothing() {
        let (feedback, audit, model) = setup();
        audit.record(
            "agent-p",
            Utc::now(),
            RecordedDecision {
                confidence: 0.9,
                decision_was_proceed: true,
            },
        );

        let plain = DialecticSession::new("agent-p", "agent-r", Some(snapshot()), 3).unwrap();
        feedback.report_convergence(&plain).await;
        assert!(model.reports().is_empty());
    }

    #[tokio::test]
    async fn test_missing_decision_is_silent() {
        let (feedback, _audit, model) = setup();
        let session = DialecticSession::new("agent-p", "agent-r", Some(snapshot()), 3)
            .unwrap()
            .with_dispute("disc-1", VERIFICATION_DISPUTE);
        feedback.report_convergence(&session).await;
        assert!(model.reports().is_empty());
    }

    #[tokio::test]
    async fn test_disagreement_severity_scaling() {
        let (feedback, _audit, model) = setup();
        let mut session = DialecticSession::new("agent-p", "agent-r", snapshot(), 4).unwrap();
        session.synthesis_round = 2;
        feedback.report_disagreement(&session).await;

        match &model.reports()[0] {
            CalibrationReport::Disagreement { severity, .. } => {
                assert!((severity - 0.5).abs() < f64::EPSILON);
            }
            other => panic!("unexpected report {:?}", other),
        }
    }

    #[test]
    fn test_severity_clamps_at_limit() {
        assert_eq!(disagreement_severity(3, 3), 1.0);
        assert_eq!(disagreement_severity(5, 3), 1.0);
        assert_eq!(disagreement_severity(0, 3), 0.0);
        assert_eq!(disagreement_severity(1, 0), 1.0);
    }
}
