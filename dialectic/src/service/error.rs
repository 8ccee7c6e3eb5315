//! Error taxonomy for the request-level operations.
//!
//! Protocol-misuse errors always carry the session's current authoritative
//! phase so the caller can self-correct without a separate query.
//! Infrastructure errors from the calibration model or finding store are
//! never surfaced here — they are logged and swallowed by the operations
//! that trigger them.

use crate::protocol::DialecticPhase;
use crate::selection::SelectionError;
use crate::store::StoreError;

/// Error type for the dialectic service surface.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Unknown session or agent; recoverable by re-querying.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation invoked in the wrong phase; re-fetch and retry correctly.
    #[error("wrong phase: operation requires {expected}, session is in {actual}")]
    WrongPhase {
        expected: DialecticPhase,
        actual: DialecticPhase,
    },

    /// Operation invoked by an agent that may not act here.
    #[error("wrong party: {agent_id} may not perform this step (session phase {phase})")]
    WrongParty {
        agent_id: String,
        phase: DialecticPhase,
    },

    /// Invalid credential or signature; never silently ignored.
    #[error("authentication failed for {agent_id} (session phase {phase})")]
    AuthenticationFailed {
        agent_id: String,
        phase: DialecticPhase,
    },

    /// The reviewer pool is empty; fall back to a non-peer recovery path
    /// rather than retrying blindly.
    #[error("no eligible reviewer for {0}")]
    NoEligibleReviewer(String),

    /// Finalize called before both parties' latest proposals agree.
    #[error("synthesis has not converged (session phase {phase})")]
    NotConverged { phase: DialecticPhase },

    /// Durable write failed; the mutation did not happen.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    /// Reviewer selection machinery failed.
    #[error("selection failure: {0}")]
    Selection(#[from] SelectionError),

    /// External registry call failed.
    #[error("registry failure: {0}")]
    Registry(#[from] anyhow::Error),
}

/// Result type for the dialectic service surface.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
