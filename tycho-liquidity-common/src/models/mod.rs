pub mod chain;
pub mod error;
pub mod position;
pub mod request;

use std::fmt;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

pub use chain::{Chain, UniswapV3Deployment};
pub use error::ContractError;
pub use position::{
    IncreaseLiquidityParams, IncreaseOutcome, MintOutcome, MintParams, PositionInfo,
};
pub use request::{IncreaseRequest, PositionRequest, TickRange, TokenPair};

/// Identifier of a position NFT minted by the position manager.
pub type PositionId = U256;

/// Liquidity units as tracked by the pool (uint128 on chain).
pub type Liquidity = u128;

/// Pool tick index (int24 on chain).
pub type Tick = i32;

/// Fee tier of a pool in hundredths of a basis point, e.g. `3000` is 0.3%.
///
/// The value is a uint24 on chain, anything above `0xFFFFFF` can not address a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeeTier(pub u32);

impl FeeTier {
    pub const LOWEST: FeeTier = FeeTier(100);
    pub const LOW: FeeTier = FeeTier(500);
    pub const MEDIUM: FeeTier = FeeTier(3000);
    pub const HIGH: FeeTier = FeeTier(10000);

    /// Largest value representable as uint24.
    pub const MAX: u32 = 0x00FF_FFFF;

    pub fn is_representable(&self) -> bool {
        self.0 <= Self::MAX
    }
}

impl From<u32> for FeeTier {
    fn from(value: u32) -> Self {
        FeeTier(value)
    }
}

impl fmt::Display for FeeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the two legs of a canonically ordered token pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Leg {
    Token0,
    Token1,
}

impl Leg {
    pub const BOTH: [Leg; 2] = [Leg::Token0, Leg::Token1];

    pub fn index(&self) -> usize {
        match self {
            Leg::Token0 => 0,
            Leg::Token1 => 1,
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::Token0 => write!(f, "token0"),
            Leg::Token1 => write!(f, "token1"),
        }
    }
}

/// The account issuing a call and the native value attached to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub value: U256,
}

impl CallContext {
    pub fn new(caller: Address) -> Self {
        Self { caller, value: U256::ZERO }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}
