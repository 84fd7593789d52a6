use thiserror::Error;
use tycho_liquidity_common::{
    models::{ContractError, FeeTier, Leg, Liquidity, PositionId, Tick},
    Address, U256,
};

use crate::orchestrator::LegSettlement;

/// Malformed requests, always detected before any asset moves.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid tick range: lower tick {lower} must be below upper tick {upper}")]
    InvalidTickRange { lower: Tick, upper: Tick },
    #[error("Tick range [{lower}, {upper}) exceeds the supported tick bounds")]
    TickOutOfBounds { lower: Tick, upper: Tick },
    #[error("Tick range [{lower}, {upper}) is not aligned to tick spacing {spacing}")]
    TickNotAligned { lower: Tick, upper: Tick, spacing: i32 },
    #[error("Both legs reference the same token {0}")]
    IdenticalTokens(Address),
    #[error("The zero address is not a token")]
    ZeroAddress,
    #[error("Fee tier {0} is not enabled")]
    UnknownFeeTier(FeeTier),
    #[error("No pool deployed for {token0}/{token1} at fee tier {fee}")]
    PoolNotFound { token0: Address, token1: Address, fee: FeeTier },
    #[error("Both requested amounts are zero")]
    EmptyRequest,
    #[error("Slippage {slippage} exceeds the maximum of {max}")]
    SlippageOutOfRange { slippage: u32, max: u32 },
    #[error("Native value {0} attached but no leg is the wrapped native token")]
    UnexpectedNativeValue(U256),
    #[error("Native value {value} attached but the wrapped native leg requests {amount}")]
    NativeValueMismatch { value: U256, amount: U256 },
    #[error("Position {0} does not exist")]
    UnknownPosition(PositionId),
    #[error("Position {position_id} has a different {field} than requested")]
    PositionMismatch { position_id: PositionId, field: &'static str },
}

/// Why taking custody of a leg failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustodyFailure {
    #[error("allowance {available} is below the required {required}")]
    InsufficientAllowance { available: U256, required: U256 },
    #[error("balance {available} is below the required {required}")]
    InsufficientBalance { available: U256, required: U256 },
    #[error("the token rejected the transfer")]
    TransferRejected,
    #[error(transparent)]
    Contract(#[from] ContractError),
}

/// How the consumed amounts broke the slippage bounds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlippageViolation {
    #[error("the position manager rejected minimums {amount0_min}/{amount1_min}")]
    RejectedByPositionManager { amount0_min: U256, amount1_min: U256 },
    /// The position manager committed, then reported a consumption outside of the bounds.
    ///
    /// The position exists and holds `liquidity`, leftovers have already been refunded as
    /// described by `legs`.
    #[error(
        "position {position_id} committed but {token} consumed {used}, outside of \
         [{minimum}, {desired}]"
    )]
    ConsumptionOutOfBounds {
        position_id: PositionId,
        liquidity: Liquidity,
        token: Address,
        used: U256,
        minimum: U256,
        desired: U256,
        legs: [LegSettlement; 2],
    },
}

/// Outer-level error of the orchestrator.
///
/// Every variant except `Settlement`, `RollbackFailed` and a `SlippageExceeded` carrying
/// `ConsumptionOutOfBounds` guarantees that no asset taken from the caller during the failed
/// call is left with the orchestrator or committed to a position. In the consumption case the
/// call did commit: see [`OrchestratorError::committed_position`].
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Custody of {leg} ({token}) failed: {reason}")]
    Custody { leg: Leg, token: Address, reason: CustodyFailure },
    #[error("Approval of {token} for {spender} failed: {reason}")]
    Approval { token: Address, spender: Address, reason: String },
    #[error("Slippage exceeded: {0}")]
    SlippageExceeded(SlippageViolation),
    #[error("Deadline {deadline} passed before execution")]
    DeadlineExpired { deadline: u64 },
    #[error("Position {position_id} is owned by {owner}, not by {caller}")]
    Ownership { position_id: PositionId, owner: Address, caller: Address },
    #[error("Position manager rejected the call: {0}")]
    Execution(ContractError),
    #[error("Refund of {amount} {token} to {recipient} failed: {source}")]
    Settlement {
        token: Address,
        recipient: Address,
        amount: U256,
        #[source]
        source: ContractError,
    },
    #[error(
        "Rollback after '{cause}' left {} compensation(s) undone: {failures:?}",
        .failures.len()
    )]
    RollbackFailed { cause: Box<OrchestratorError>, failures: Vec<String> },
    #[error("Chain query failed: {0}")]
    Chain(#[from] ContractError),
}

impl OrchestratorError {
    /// Whether the caller may not have been restored to its starting balances, either because
    /// assets remain with the orchestrator or because they were committed to a position.
    pub fn leaves_residue(&self) -> bool {
        matches!(
            self,
            Self::Settlement { .. } |
                Self::RollbackFailed { .. } |
                Self::SlippageExceeded(SlippageViolation::ConsumptionOutOfBounds { .. })
        )
    }

    /// The position the failed call still minted or increased, if any.
    pub fn committed_position(&self) -> Option<PositionId> {
        match self {
            Self::SlippageExceeded(SlippageViolation::ConsumptionOutOfBounds {
                position_id,
                ..
            }) => Some(*position_id),
            _ => None,
        }
    }
}
