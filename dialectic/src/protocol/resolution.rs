//! Terminal artifact of a converged session: the dual-signed resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the converged parties decided to do with the paused agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    /// Resume the paused agent under the agreed conditions.
    Resume,
    /// Keep the agent paused; peer review did not clear it.
    Block,
}

impl std::fmt::Display for ResolutionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resume => write!(f, "resume"),
            Self::Block => write!(f, "block"),
        }
    }
}

/// The terminal artifact of a converged session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Agreed action.
    pub action: ResolutionAction,
    /// Agreed resumption conditions, in proposal order.
    pub conditions: Vec<String>,
    /// Agreed root cause.
    pub root_cause: String,
    /// Agreed reasoning.
    pub reasoning: String,
    /// Paused agent's signature over `content_hash`.
    pub signature_a: String,
    /// Reviewer's signature over `content_hash`.
    pub signature_b: String,
    /// When the resolution was finalized.
    pub timestamp: DateTime<Utc>,
    /// BLAKE3 hash of the agreed content; audit and idempotent
    /// re-execution key.
    pub content_hash: String,
}

/// Domain-separation context for credential-derived signing keys.
const SIGNING_CONTEXT: &str = "dialectic resolution signature v1";

/// Hash the agreed content of a resolution-to-be.
///
/// The hash covers the session identity and the agreed proposal so that a
/// signature from one session can never validate in another.
pub fn content_hash(
    session_id: &str,
    action: ResolutionAction,
    conditions: &[String],
    root_cause: &str,
) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(session_id.as_bytes());
    hasher.update(&[0]);
    hasher.update(action.to_string().as_bytes());
    hasher.update(&[0]);
    for condition in conditions {
        hasher.update(condition.as_bytes());
        hasher.update(&[0]);
    }
    hasher.update(root_cause.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Hash the agreed proposal — what the parties sign.
///
/// Excludes the action: hard limits may still downgrade a resume to a block
/// after both parties have signed, and that downgrade must not invalidate
/// their signatures over the agreed content.
pub fn proposal_hash(session_id: &str, conditions: &[String], root_cause: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(session_id.as_bytes());
    hasher.update(&[0]);
    for condition in conditions {
        hasher.update(condition.as_bytes());
        hasher.update(&[0]);
    }
    hasher.update(root_cause.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Sign a content hash with a party's secret credential.
///
/// The key is derived from the credential with a fixed context string, so
/// the credential itself never appears in any stored artifact.
pub fn sign(credential: &str, content_hash: &str) -> String {
    let key = blake3::derive_key(SIGNING_CONTEXT, credential.as_bytes());
    blake3::keyed_hash(&key, content_hash.as_bytes())
        .to_hex()
        .to_string()
}

/// Verify a signature against a credential and content hash.
///
/// Constant-time comparison via `blake3::Hash` equality.
pub fn verify(credential: &str, content_hash: &str, signature: &str) -> bool {
    let key = blake3::derive_key(SIGNING_CONTEXT, credential.as_bytes());
    let expected = blake3::keyed_hash(&key, content_hash.as_bytes());
    match blake3::Hash::from_hex(signature) {
        Ok(provided) => expected == provided,
        Err(_) => false,
    }
}
