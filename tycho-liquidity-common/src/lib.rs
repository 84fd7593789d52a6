//! Shared models and collaborator interfaces for concentrated liquidity provisioning.
//!
//! The orchestrator never talks to a chain directly. Every contract it depends on (fungible
//! assets, the wrapped native asset, the position manager and the pool factory) is described
//! by a trait in [`traits`], so the same orchestration code runs against an RPC backed client
//! or against an in-memory chain.

pub mod models;
pub mod traits;
pub mod units;

pub use alloy_primitives::{Address, U256};
