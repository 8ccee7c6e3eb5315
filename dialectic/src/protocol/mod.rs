//! Dialectic protocol core — phases, messages, convergence, resolutions,
//! and the hard-limit safety gate.

pub mod limits;
pub mod message;
pub mod phase;
pub mod resolution;

pub use limits::{HardLimits, LimitCheck};
pub use message::{DialecticMessage, MessageBody, SYSTEM_AGENT_ID};
pub use phase::{DialecticPhase, DialecticSession, TransitionError};
pub use resolution::{content_hash, proposal_hash, sign, verify, Resolution, ResolutionAction};
