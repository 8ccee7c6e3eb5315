//! Reviewer selection — eligibility filtering plus weighted-random draw.

use std::sync::Arc;

use chrono::Duration;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::authority::authority_score;
use crate::registry::{AgentRegistry, AgentStatus, HealthSnapshot};
use crate::store::{SharedSessionStore, StoreError};

/// Error type for reviewer selection.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("registry error: {0}")]
    Registry(#[from] anyhow::Error),
}

/// Result type for reviewer selection.
pub type SelectionResult<T> = Result<T, SelectionError>;

/// Thresholds and windows governing reviewer eligibility.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Trailing window during which a reviewer who resolved a session for
    /// the same paused agent cannot be reselected (seconds).
    pub anti_collusion_window_secs: i64,
    /// A candidate below this coherence is too unhealthy to review.
    pub min_reviewer_coherence: f64,
    /// A candidate above this attention score is too unhealthy to review.
    pub max_reviewer_attention: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            anti_collusion_window_secs: 24 * 60 * 60,
            min_reviewer_coherence: 0.25,
            max_reviewer_attention: 0.85,
        }
    }
}

impl SelectorConfig {
    pub fn anti_collusion_window(&self) -> Duration {
        Duration::seconds(self.anti_collusion_window_secs)
    }

    /// Whether a candidate's health disqualifies it. Unknown health is
    /// treated permissively so the pool is not empty by default.
    fn is_unhealthy(&self, health: Option<&HealthSnapshot>) -> bool {
        match health {
            Some(h) => {
                h.void_active
                    || h.coherence < self.min_reviewer_coherence
                    || h.attention_score > self.max_reviewer_attention
            }
            None => false,
        }
    }
}

/// Picks a healthy, reputable, uninvolved peer to review a paused agent.
pub struct ReviewerSelector {
    store: SharedSessionStore,
    registry: Arc<dyn AgentRegistry>,
    config: SelectorConfig,
}

impl ReviewerSelector {
    pub fn new(
        store: SharedSessionStore,
        registry: Arc<dyn AgentRegistry>,
        config: SelectorConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Select a reviewer for `paused_agent_id`, or `None` when no candidate
    /// survives the eligibility filters — callers must fall back to a
    /// single-party recovery path rather than block.
    ///
    /// The in-session and anti-collusion checks read the shared store's
    /// current view, so they hold across concurrently running service
    /// instances, not just this process.
    pub async fn select_reviewer(
        &self,
        paused_agent_id: &str,
        paused_agent_tags: &[String],
        exclude_ids: &[String],
    ) -> SelectionResult<Option<String>> {
        let mut candidates: Vec<(String, f64)> = Vec::new();

        for agent_id in self.registry.list_agents().await? {
            if agent_id == paused_agent_id {
                continue;
            }
            if exclude_ids.contains(&agent_id) {
                debug!(agent_id, "candidate excluded explicitly");
                continue;
            }
            if self.store.in_active_session(&agent_id)? {
                debug!(agent_id, "candidate already party to an active session");
                continue;
            }
            if self.store.recent_resolved_reviewer(
                &agent_id,
                paused_agent_id,
                self.config.anti_collusion_window(),
            )? {
                debug!(agent_id, "candidate inside anti-collusion window");
                continue;
            }
            if self.registry.lifecycle_status(&agent_id).await? != Some(AgentStatus::Active) {
                debug!(agent_id, "candidate not in active lifecycle status");
                continue;
            }
            let health = self.registry.health_snapshot(&agent_id).await?;
            if self.config.is_unhealthy(health.as_ref()) {
                debug!(agent_id, "candidate unhealthy");
                continue;
            }

            let reputation = self.registry.reputation(&agent_id).await?;
            let tags = self.registry.tags(&agent_id).await?;
            let score = authority_score(reputation, health.as_ref(), &tags, paused_agent_tags);
            candidates.push((agent_id, score));
        }

        if candidates.is_empty() {
            return Ok(None);
        }

        let chosen = weighted_draw(&candidates, &mut rand::rng());
        debug!(
            paused_agent_id,
            reviewer = %chosen,
            pool = candidates.len(),
            "reviewer selected"
        );
        Ok(Some(chosen))
    }
}

/// Draw one candidate with probability proportional to its score; uniformly
/// when every score is zero.
fn weighted_draw<R: Rng>(candidates: &[(String, f64)], rng: &mut R) -> String {
    let total: f64 = candidates.iter().map(|(_, score)| score).sum();
    if total <= 0.0 {
        let idx = rng.random_range(0..candidates.len());
        return candidates[idx].0.clone();
    }

    let mut point = rng.random_range(0.0..total);
    for (agent_id, score) in candidates {
        point -= score;
        if point <= 0.0 {
            return agent_id.clone();
        }
    }
    // Floating-point remainder lands on the last candidate.
    candidates.last().unwrap().0.clone()
}
