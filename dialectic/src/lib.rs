//! Dialectic Recovery Protocol
//!
//! Peer-review consensus for autonomous agents whose circuit breaker has
//! tripped. A paused agent cannot resume itself; instead a healthy peer is
//! selected to review it, and the two negotiate a resumption decision
//! through a structured thesis → antithesis → synthesis exchange that ends
//! in a dual-signed, safety-checked resolution — or escalates.
//!
//! # Components
//!
//! - [`protocol`]: phases, tagged transcript messages, convergence
//!   detection, resolutions, and the hard-limit safety gate
//! - [`store`]: durable RocksDB-backed session persistence shared across
//!   service instances, plus the stale-session reaper
//! - [`selection`]: authority scoring and the reviewer eligibility pipeline
//! - [`registry`]: async traits for the external agent registry, audit log,
//!   finding store, and calibration model
//! - [`executor`]: applies converged resolutions to agent lifecycle status
//!   and disputed findings
//! - [`calibration`]: best-effort feedback into the external
//!   confidence-calibration model
//! - [`service`]: the request-level coordinator tying it all together
//!
//! # Usage
//!
//! ```rust,ignore
//! use dialectic::{DialecticConfig, DialecticCoordinator, SessionStore};
//!
//! let config = DialecticConfig::default();
//! let store = SessionStore::open(&config.store_path, config.cache_ttl())?.shared();
//! let coordinator =
//!     DialecticCoordinator::new(store, registry, audit, findings, calibration, config).shared();
//! DialecticCoordinator::spawn_reaper(coordinator.clone());
//!
//! let review = coordinator.request_review("agent-7", "breaker tripped", None, None).await?;
//! ```

pub mod calibration;
pub mod config;
pub mod executor;
pub mod protocol;
pub mod registry;
pub mod selection;
pub mod service;
pub mod store;
pub mod telemetry;

// Re-export key protocol types
pub use protocol::{
    DialecticMessage, DialecticPhase, DialecticSession, HardLimits, LimitCheck, MessageBody,
    Resolution, ResolutionAction, SYSTEM_AGENT_ID,
};

// Re-export key store types
pub use store::{ReapSummary, SessionStore, SharedSessionStore, StaleSessionReaper, StoreError};

// Re-export key selection types
pub use selection::{authority_score, ReviewerSelector, SelectorConfig};

// Re-export external interface traits
pub use registry::{
    AgentRegistry, AgentStatus, AuditLog, CalibrationModel, FindingStore, HealthSnapshot,
    RecordedDecision, Reputation,
};

// Re-export executor and calibration types
pub use calibration::{CalibrationFeedback, PEER_AGREEMENT_WEIGHT};
pub use executor::{ExecutionResult, ResolutionExecutor};

// Re-export the service surface
pub use config::DialecticConfig;
pub use service::{
    AntithesisInput, DialecticCoordinator, ProtocolError, ProtocolResult, ReviewRequested,
    SessionStatus, SharedDialecticCoordinator, SubmitOutcome, SynthesisInput, ThesisInput,
};
