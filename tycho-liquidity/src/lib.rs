//! Opens and grows concentrated liquidity positions with all-or-nothing custody.
//!
//! [`PositionOrchestrator`] pulls the caller's assets, approves the position manager, mints or
//! increases the position with slippage-bounded minimums and refunds whatever was not consumed.
//! [`sandbox::SandboxChain`] provides in-memory collaborators, and [`scenario`] drives both from
//! YAML files for the `tycho-liquidity` binary.

pub mod cli;
pub mod config;
pub mod errors;
pub mod orchestrator;
pub mod sandbox;
pub mod scenario;

pub use config::{OrchestratorConfig, SlippageModel};
pub use errors::{CustodyFailure, OrchestratorError, SlippageViolation, ValidationError};
pub use orchestrator::{
    Collaborators, Funding, IncreaseReceipt, LegSettlement, NewPositionReceipt,
    PositionOrchestrator,
};
