use std::time::Duration;

use tracing::{debug, warn};
use tycho_liquidity_common::{
    models::{
        error::revert_reasons, ContractError, IncreaseLiquidityParams, Leg, Liquidity,
        MintParams, PositionId,
    },
    Address, U256,
};

use super::{settlement::LegSettlement, validator::CanonicalRequest, Collaborators};
use crate::{
    config::SlippageModel,
    errors::{OrchestratorError, SlippageViolation, ValidationError},
};

/// What the position manager is asked to do with the committed amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    /// Mint a new position owned by `recipient`.
    Mint { recipient: Address },
    /// Add liquidity to an existing position.
    Increase { position_id: PositionId },
}

/// Result of a successful position manager call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Execution {
    pub position_id: PositionId,
    /// Liquidity of a new position, or the liquidity added to an existing one.
    pub liquidity: Liquidity,
    /// Amounts the position manager reports as consumed, in canonical order.
    pub used: [U256; 2],
    pub minimums: [U256; 2],
    pub deadline: u64,
}

impl Execution {
    /// Checks the reported consumption against `minimum <= used <= desired` for both legs.
    ///
    /// The position manager is external, its report is not trusted. Runs after settlement, so
    /// a violation carries the legs as they were settled.
    pub fn check_consumption(
        &self,
        request: &CanonicalRequest,
        legs: &[LegSettlement; 2],
    ) -> Result<(), SlippageViolation> {
        for leg in Leg::BOTH {
            let used = self.used[leg.index()];
            let minimum = self.minimums[leg.index()];
            let desired = request.amount(leg);
            if used < minimum || used > desired {
                return Err(SlippageViolation::ConsumptionOutOfBounds {
                    position_id: self.position_id,
                    liquidity: self.liquidity,
                    token: request.token(leg),
                    used,
                    minimum,
                    desired,
                    legs: legs.clone(),
                });
            }
        }
        Ok(())
    }
}

pub(crate) struct ExecutionEngine<'a> {
    slippage_model: SlippageModel,
    deadline_buffer: Duration,
    collaborators: &'a Collaborators,
}

impl<'a> ExecutionEngine<'a> {
    pub fn new(
        slippage_model: SlippageModel,
        deadline_buffer: Duration,
        collaborators: &'a Collaborators,
    ) -> Self {
        Self { slippage_model, deadline_buffer, collaborators }
    }

    pub fn minimums(&self, request: &CanonicalRequest) -> Result<[U256; 2], ValidationError> {
        Ok([
            self.slippage_model
                .min_amount(request.amounts[0], request.slippage)?,
            self.slippage_model
                .min_amount(request.amounts[1], request.slippage)?,
        ])
    }

    /// Deadline for a call executing now, derived fresh from the current block.
    pub async fn deadline(&self) -> Result<u64, OrchestratorError> {
        let now = self.collaborators.clock.block_timestamp().await?;
        Ok(now.saturating_add(self.deadline_buffer.as_secs()))
    }

    /// Calls the position manager, acting as `sender`, which holds the custody.
    pub async fn execute(
        &self,
        sender: Address,
        target: Target,
        request: &CanonicalRequest,
    ) -> Result<Execution, OrchestratorError> {
        let minimums = self.minimums(request)?;
        let deadline = self.deadline().await?;
        let position_manager = &self.collaborators.position_manager;
        debug!(?target, ?minimums, deadline, "Calling position manager");

        let outcome = match target {
            Target::Mint { recipient } => {
                let params = MintParams {
                    token0: request.pair.token0,
                    token1: request.pair.token1,
                    fee: request.fee_tier,
                    tick_lower: request.tick_range.tick_lower,
                    tick_upper: request.tick_range.tick_upper,
                    amount0_desired: request.amounts[0],
                    amount1_desired: request.amounts[1],
                    amount0_min: minimums[0],
                    amount1_min: minimums[1],
                    recipient,
                    deadline,
                };
                position_manager
                    .mint(sender, params)
                    .await
                    .map(|outcome| Execution {
                        position_id: outcome.token_id,
                        liquidity: outcome.liquidity,
                        used: [outcome.amount0, outcome.amount1],
                        minimums,
                        deadline,
                    })
            }
            Target::Increase { position_id } => {
                let params = IncreaseLiquidityParams {
                    token_id: position_id,
                    amount0_desired: request.amounts[0],
                    amount1_desired: request.amounts[1],
                    amount0_min: minimums[0],
                    amount1_min: minimums[1],
                    deadline,
                };
                position_manager
                    .increase_liquidity(sender, params)
                    .await
                    .map(|outcome| Execution {
                        position_id,
                        liquidity: outcome.liquidity,
                        used: [outcome.amount0, outcome.amount1],
                        minimums,
                        deadline,
                    })
            }
        };

        outcome.map_err(|err| {
            warn!(%err, "Position manager rejected the call");
            classify(err, target, minimums, deadline)
        })
    }
}

/// Maps a position manager revert to the orchestrator's error taxonomy.
fn classify(
    err: ContractError,
    target: Target,
    minimums: [U256; 2],
    deadline: u64,
) -> OrchestratorError {
    match (err.revert_reason(), target) {
        (Some(revert_reasons::PRICE_SLIPPAGE_CHECK), _) => {
            OrchestratorError::SlippageExceeded(SlippageViolation::RejectedByPositionManager {
                amount0_min: minimums[0],
                amount1_min: minimums[1],
            })
        }
        (Some(revert_reasons::TRANSACTION_TOO_OLD), _) => {
            OrchestratorError::DeadlineExpired { deadline }
        }
        (Some(revert_reasons::INVALID_TOKEN_ID), Target::Increase { position_id }) => {
            ValidationError::UnknownPosition(position_id).into()
        }
        _ => OrchestratorError::Execution(err),
    }
}
