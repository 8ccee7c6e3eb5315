//! Hard limits — absolute safety thresholds independent of peer agreement.
//!
//! Peer consensus can be wrong; these fixed thresholds are the structural
//! second safety net. They are always evaluated against the paused agent's
//! live health snapshot, never the snapshot captured at session creation.

use serde::{Deserialize, Serialize};

use super::resolution::ResolutionAction;
use crate::registry::HealthSnapshot;

/// Fixed absolute thresholds a resume must clear.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HardLimits {
    /// Resume is unsafe below this coherence.
    pub min_coherence: f64,
    /// Resume is unsafe above this attention/risk score.
    pub max_attention_score: f64,
    /// Resume is unsafe while the void instability flag is set.
    pub block_on_void: bool,
}

impl Default for HardLimits {
    fn default() -> Self {
        Self {
            min_coherence: 0.3,
            max_attention_score: 0.9,
            block_on_void: true,
        }
    }
}

/// Outcome of a hard-limit evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitCheck {
    /// Whether the proposed action is safe to apply.
    pub safe: bool,
    /// Human-readable violation, when not safe.
    pub violation: Option<String>,
}

impl LimitCheck {
    fn safe() -> Self {
        Self {
            safe: true,
            violation: None,
        }
    }

    fn violated(violation: String) -> Self {
        Self {
            safe: false,
            violation: Some(violation),
        }
    }
}

impl HardLimits {
    /// Evaluate a proposed action against the agent's current metrics.
    ///
    /// `block` is always safe — declining to resume cannot make the agent
    /// less safe. A `resume` must clear every threshold.
    pub fn check(&self, action: ResolutionAction, current: &HealthSnapshot) -> LimitCheck {
        if action == ResolutionAction::Block {
            return LimitCheck::safe();
        }

        if self.block_on_void && current.void_active {
            return LimitCheck::violated("void instability flag is active".to_string());
        }
        if current.coherence < self.min_coherence {
            return LimitCheck::violated(format!(
                "coherence {:.3} below hard floor {:.3}",
                current.coherence, self.min_coherence
            ));
        }
        if current.attention_score > self.max_attention_score {
            return LimitCheck::violated(format!(
                "attention score {:.3} above hard ceiling {:.3}",
                current.attention_score, self.max_attention_score
            ));
        }

        LimitCheck::safe()
    }
}
