//! Position requests as submitted by a caller.

use alloy_primitives::{Address, U256};

use super::{FeeTier, Leg, PositionId, Tick};

/// Price range of a concentrated liquidity position, `[tick_lower, tick_upper)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickRange {
    /// Lower price tick boundary.
    pub tick_lower: Tick,
    /// Upper price tick boundary.
    pub tick_upper: Tick,
}

impl TickRange {
    /// Smallest tick a pool supports.
    pub const MIN_TICK: Tick = -887272;
    /// Largest tick a pool supports.
    pub const MAX_TICK: Tick = 887272;

    pub fn new(tick_lower: Tick, tick_upper: Tick) -> Self {
        Self { tick_lower, tick_upper }
    }

    pub fn is_ordered(&self) -> bool {
        self.tick_lower < self.tick_upper
    }

    /// Check if a tick is within this range.
    pub fn contains_tick(&self, tick: Tick) -> bool {
        tick >= self.tick_lower && tick < self.tick_upper
    }

    pub fn within_bounds(&self) -> bool {
        self.tick_lower >= Self::MIN_TICK && self.tick_upper <= Self::MAX_TICK
    }

    pub fn is_aligned(&self, tick_spacing: i32) -> bool {
        tick_spacing > 0 &&
            self.tick_lower % tick_spacing == 0 &&
            self.tick_upper % tick_spacing == 0
    }
}

/// Two tokens in the order pools are addressed by: `token0 < token1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenPair {
    pub token0: Address,
    pub token1: Address,
}

impl TokenPair {
    /// Orders two tokens canonically.
    ///
    /// Returns the ordered pair and whether the inputs had to be swapped to get there.
    pub fn canonical(token_a: Address, token_b: Address) -> (Self, bool) {
        if token_a <= token_b {
            (Self { token0: token_a, token1: token_b }, false)
        } else {
            (Self { token0: token_b, token1: token_a }, true)
        }
    }

    pub fn token(&self, leg: Leg) -> Address {
        match leg {
            Leg::Token0 => self.token0,
            Leg::Token1 => self.token1,
        }
    }

    /// The leg holding `token`, if it is part of this pair.
    pub fn leg_of(&self, token: Address) -> Option<Leg> {
        if token == self.token0 {
            Some(Leg::Token0)
        } else if token == self.token1 {
            Some(Leg::Token1)
        } else {
            None
        }
    }
}

/// Request to open a new position.
///
/// `token0`/`token1` may be given in any order, the orchestrator sorts them (and the amounts
/// with them) before anything else happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionRequest {
    pub token0: Address,
    pub token1: Address,
    /// Desired amount of `token0` in its smallest unit.
    pub amount0: U256,
    /// Desired amount of `token1` in its smallest unit.
    pub amount1: U256,
    pub fee_tier: FeeTier,
    pub tick_lower: Tick,
    pub tick_upper: Tick,
    /// Tolerated shortfall of the consumed amounts, interpreted by the orchestrator's
    /// slippage model (percent by default).
    pub slippage: u32,
}

impl PositionRequest {
    pub fn tick_range(&self) -> TickRange {
        TickRange::new(self.tick_lower, self.tick_upper)
    }

    /// The same request with the two legs given in the opposite order.
    pub fn reversed(&self) -> Self {
        Self {
            token0: self.token1,
            token1: self.token0,
            amount0: self.amount1,
            amount1: self.amount0,
            ..self.clone()
        }
    }
}

/// Request to add liquidity to an existing position.
///
/// The pair, fee tier and ticks echo the position's configuration; they are checked against
/// the position manager's record and never alter it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncreaseRequest {
    pub position_id: PositionId,
    pub position: PositionRequest,
}

impl IncreaseRequest {
    pub fn new(position_id: PositionId, position: PositionRequest) -> Self {
        Self { position_id, position }
    }
}
