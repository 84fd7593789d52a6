//! Parameters and results of the position manager's liquidity entry points.

use alloy_primitives::{Address, U256};

use super::{FeeTier, Liquidity, PositionId, Tick};

/// Arguments of `NonfungiblePositionManager.mint`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintParams {
    pub token0: Address,
    pub token1: Address,
    pub fee: FeeTier,
    pub tick_lower: Tick,
    pub tick_upper: Tick,
    pub amount0_desired: U256,
    pub amount1_desired: U256,
    pub amount0_min: U256,
    pub amount1_min: U256,
    /// Receiver of the position NFT.
    pub recipient: Address,
    /// Unix timestamp after which the call must be rejected.
    pub deadline: u64,
}

/// Arguments of `NonfungiblePositionManager.increaseLiquidity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncreaseLiquidityParams {
    pub token_id: PositionId,
    pub amount0_desired: U256,
    pub amount1_desired: U256,
    pub amount0_min: U256,
    pub amount1_min: U256,
    pub deadline: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintOutcome {
    pub token_id: PositionId,
    pub liquidity: Liquidity,
    /// Amount of token0 actually pulled by the pool.
    pub amount0: U256,
    /// Amount of token1 actually pulled by the pool.
    pub amount1: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncreaseOutcome {
    /// Liquidity added to the position.
    pub liquidity: Liquidity,
    pub amount0: U256,
    pub amount1: U256,
}

/// Record returned by `NonfungiblePositionManager.positions(tokenId)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionInfo {
    pub nonce: u128,
    pub operator: Address,
    pub token0: Address,
    pub token1: Address,
    pub fee: FeeTier,
    pub tick_lower: Tick,
    pub tick_upper: Tick,
    pub liquidity: Liquidity,
    pub fee_growth_inside0_last_x128: U256,
    pub fee_growth_inside1_last_x128: U256,
    pub tokens_owed0: u128,
    pub tokens_owed1: u128,
}
