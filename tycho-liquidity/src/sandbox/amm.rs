//! Pools, the factory and the position manager of the sandbox.
//!
//! Consumption follows the concentrated liquidity formulas on `f64` square root prices. The
//! results are close to, not bit-equal with, the on-chain fixed point math.

use std::collections::{BTreeMap, HashMap};

use alloy_primitives::keccak256;
use tycho_liquidity_common::{
    models::{
        error::revert_reasons, ContractError, FeeTier, IncreaseLiquidityParams, IncreaseOutcome,
        Liquidity, MintOutcome, MintParams, PositionId, PositionInfo, Tick, TickRange, TokenPair,
    },
    Address, U256,
};

use super::ledger::Ledger;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Pool {
    pub address: Address,
    pub tick_spacing: i32,
    pub tick: Tick,
    /// Liquidity in range at the current tick.
    pub liquidity: Liquidity,
}

#[derive(Debug, Clone)]
struct StoredPosition {
    owner: Address,
    info: PositionInfo,
}

/// Amounts a liquidity addition consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Consumption {
    pub liquidity: Liquidity,
    pub amounts: [U256; 2],
}

fn sqrt_price_at_tick(tick: Tick) -> f64 {
    1.0001f64.powf(f64::from(tick) / 2.0)
}

fn to_f64(amount: U256) -> Result<f64, ContractError> {
    u128::try_from(amount)
        .map(|value| value as f64)
        .map_err(|_| ContractError::reverted("amount exceeds uint128"))
}

/// Rounds down and clamps to `[0, cap]`.
fn floor_amount(value: f64, cap: U256) -> U256 {
    if !value.is_finite() || value <= 0.0 {
        return U256::ZERO;
    }
    U256::from(value.floor() as u128).min(cap)
}

/// Liquidity bought by `desired` amounts in `range` at `current` tick, and the amounts it uses.
///
/// The leg limiting the liquidity is consumed in full, the other one only as far as needed.
pub(crate) fn consumption(
    current: Tick,
    range: TickRange,
    desired: [U256; 2],
) -> Result<Consumption, ContractError> {
    let (amount0, amount1) = (to_f64(desired[0])?, to_f64(desired[1])?);
    let sqrt_lower = sqrt_price_at_tick(range.tick_lower);
    let sqrt_upper = sqrt_price_at_tick(range.tick_upper);
    let sqrt_current = sqrt_price_at_tick(current);

    let (liquidity, amounts) = if current < range.tick_lower {
        let liquidity = amount0 * sqrt_lower * sqrt_upper / (sqrt_upper - sqrt_lower);
        (liquidity, [desired[0], U256::ZERO])
    } else if current >= range.tick_upper {
        let liquidity = amount1 / (sqrt_upper - sqrt_lower);
        (liquidity, [U256::ZERO, desired[1]])
    } else {
        let liquidity0 = amount0 * sqrt_current * sqrt_upper / (sqrt_upper - sqrt_current);
        let liquidity1 = amount1 / (sqrt_current - sqrt_lower);
        if liquidity0 <= liquidity1 {
            let used1 = floor_amount(liquidity0 * (sqrt_current - sqrt_lower), desired[1]);
            (liquidity0, [desired[0], used1])
        } else {
            let used0 = floor_amount(
                liquidity1 * (sqrt_upper - sqrt_current) / (sqrt_current * sqrt_upper),
                desired[0],
            );
            (liquidity1, [used0, desired[1]])
        }
    };

    let liquidity = if liquidity.is_finite() && liquidity >= 1.0 {
        liquidity.floor() as Liquidity
    } else {
        0
    };
    if liquidity == 0 {
        return Err(ContractError::reverted("zero liquidity"));
    }
    Ok(Consumption { liquidity, amounts })
}

/// Factory and position manager state.
#[derive(Debug)]
pub(crate) struct Amm {
    factory: Address,
    position_manager: Address,
    fee_tiers: HashMap<FeeTier, i32>,
    pools: HashMap<(TokenPair, FeeTier), Pool>,
    positions: BTreeMap<PositionId, StoredPosition>,
    owned: HashMap<Address, Vec<PositionId>>,
    next_position_id: u64,
}

impl Amm {
    /// An AMM with the fee tiers the Uniswap V3 factory enables at deployment.
    pub fn new(factory: Address, position_manager: Address) -> Self {
        let fee_tiers = [
            (FeeTier::LOWEST, 1),
            (FeeTier::LOW, 10),
            (FeeTier::MEDIUM, 60),
            (FeeTier::HIGH, 200),
        ]
        .into_iter()
        .collect();
        Self {
            factory,
            position_manager,
            fee_tiers,
            pools: HashMap::new(),
            positions: BTreeMap::new(),
            owned: HashMap::new(),
            next_position_id: 1,
        }
    }

    pub fn tick_spacing(&self, fee: FeeTier) -> Option<i32> {
        self.fee_tiers.get(&fee).copied()
    }

    pub fn create_pool(
        &mut self,
        token_a: Address,
        token_b: Address,
        fee: FeeTier,
        tick: Tick,
    ) -> Result<Address, ContractError> {
        let (pair, _) = TokenPair::canonical(token_a, token_b);
        if pair.token0 == pair.token1 || pair.token0 == Address::ZERO {
            return Err(ContractError::reverted("invalid pool tokens"));
        }
        let tick_spacing = self
            .tick_spacing(fee)
            .ok_or_else(|| ContractError::reverted("fee tier not enabled"))?;
        if self.pools.contains_key(&(pair, fee)) {
            return Err(ContractError::reverted("pool exists"));
        }

        let mut preimage = Vec::with_capacity(63);
        preimage.extend_from_slice(self.factory.as_slice());
        preimage.extend_from_slice(pair.token0.as_slice());
        preimage.extend_from_slice(pair.token1.as_slice());
        preimage.extend_from_slice(&fee.0.to_be_bytes()[1..]);
        let address = Address::from_slice(&keccak256(&preimage)[12..]);

        self.pools
            .insert((pair, fee), Pool { address, tick_spacing, tick, liquidity: 0 });
        Ok(address)
    }

    pub fn pool(&self, token_a: Address, token_b: Address, fee: FeeTier) -> Option<&Pool> {
        let (pair, _) = TokenPair::canonical(token_a, token_b);
        self.pools.get(&(pair, fee))
    }

    pub fn set_pool_tick(
        &mut self,
        token_a: Address,
        token_b: Address,
        fee: FeeTier,
        tick: Tick,
    ) -> Result<(), ContractError> {
        let (pair, _) = TokenPair::canonical(token_a, token_b);
        let pool = self
            .pools
            .get_mut(&(pair, fee))
            .ok_or_else(|| ContractError::reverted("no pool"))?;
        pool.tick = tick;
        Ok(())
    }

    pub fn mint(
        &mut self,
        ledger: &mut Ledger,
        now: u64,
        sender: Address,
        params: &MintParams,
    ) -> Result<MintOutcome, ContractError> {
        check_deadline(now, params.deadline)?;
        let pair = TokenPair { token0: params.token0, token1: params.token1 };
        if pair.token0 >= pair.token1 {
            // Unsorted tokens address a pool that does not exist.
            return Err(ContractError::reverted(""));
        }
        let range = TickRange::new(params.tick_lower, params.tick_upper);
        let consumption = self.add_liquidity(
            ledger,
            sender,
            pair,
            params.fee,
            range,
            [params.amount0_desired, params.amount1_desired],
            [params.amount0_min, params.amount1_min],
        )?;

        let token_id = PositionId::from(self.next_position_id);
        self.next_position_id += 1;
        let info = PositionInfo {
            nonce: 0,
            operator: Address::ZERO,
            token0: pair.token0,
            token1: pair.token1,
            fee: params.fee,
            tick_lower: range.tick_lower,
            tick_upper: range.tick_upper,
            liquidity: consumption.liquidity,
            fee_growth_inside0_last_x128: U256::ZERO,
            fee_growth_inside1_last_x128: U256::ZERO,
            tokens_owed0: 0,
            tokens_owed1: 0,
        };
        self.positions
            .insert(token_id, StoredPosition { owner: params.recipient, info });
        self.owned
            .entry(params.recipient)
            .or_default()
            .push(token_id);

        Ok(MintOutcome {
            token_id,
            liquidity: consumption.liquidity,
            amount0: consumption.amounts[0],
            amount1: consumption.amounts[1],
        })
    }

    pub fn increase_liquidity(
        &mut self,
        ledger: &mut Ledger,
        now: u64,
        sender: Address,
        params: &IncreaseLiquidityParams,
    ) -> Result<IncreaseOutcome, ContractError> {
        check_deadline(now, params.deadline)?;
        let info = self.positions(params.token_id)?;
        let pair = TokenPair { token0: info.token0, token1: info.token1 };
        let consumption = self.add_liquidity(
            ledger,
            sender,
            pair,
            info.fee,
            TickRange::new(info.tick_lower, info.tick_upper),
            [params.amount0_desired, params.amount1_desired],
            [params.amount0_min, params.amount1_min],
        )?;

        if let Some(position) = self.positions.get_mut(&params.token_id) {
            position.info.liquidity += consumption.liquidity;
        }
        Ok(IncreaseOutcome {
            liquidity: consumption.liquidity,
            amount0: consumption.amounts[0],
            amount1: consumption.amounts[1],
        })
    }

    /// Adds liquidity to a pool, pulling the consumed amounts from `sender` into the pool.
    ///
    /// Nothing changes unless every check passes.
    #[allow(clippy::too_many_arguments)]
    fn add_liquidity(
        &mut self,
        ledger: &mut Ledger,
        sender: Address,
        pair: TokenPair,
        fee: FeeTier,
        range: TickRange,
        desired: [U256; 2],
        minimums: [U256; 2],
    ) -> Result<Consumption, ContractError> {
        let pool = self
            .pools
            .get_mut(&(pair, fee))
            .ok_or_else(|| ContractError::reverted(""))?;
        if !range.is_ordered() {
            return Err(ContractError::reverted("TLU"));
        }
        if range.tick_lower < TickRange::MIN_TICK {
            return Err(ContractError::reverted("TLM"));
        }
        if range.tick_upper > TickRange::MAX_TICK {
            return Err(ContractError::reverted("TUM"));
        }
        if !range.is_aligned(pool.tick_spacing) {
            return Err(ContractError::reverted("tick not aligned to spacing"));
        }

        let consumption = consumption(pool.tick, range, desired)?;
        if consumption.amounts[0] < minimums[0] || consumption.amounts[1] < minimums[1] {
            return Err(ContractError::reverted(revert_reasons::PRICE_SLIPPAGE_CHECK));
        }

        let position_manager = self.position_manager;
        let tokens = [pair.token0, pair.token1];
        for (token, amount) in tokens.iter().zip(consumption.amounts) {
            if !amount.is_zero() &&
                !ledger.can_transfer_from(*token, position_manager, sender, amount)
            {
                return Err(ContractError::reverted(revert_reasons::SAFE_TRANSFER_FROM));
            }
        }
        for (token, amount) in tokens.iter().zip(consumption.amounts) {
            if !amount.is_zero() {
                ledger.transfer_from(*token, position_manager, sender, pool.address, amount)?;
            }
        }

        if range.contains_tick(pool.tick) {
            pool.liquidity += consumption.liquidity;
        }
        Ok(consumption)
    }

    pub fn positions(&self, token_id: PositionId) -> Result<PositionInfo, ContractError> {
        self.positions
            .get(&token_id)
            .map(|position| position.info.clone())
            .ok_or_else(|| ContractError::reverted(revert_reasons::INVALID_TOKEN_ID))
    }

    pub fn owner_of(&self, token_id: PositionId) -> Result<Address, ContractError> {
        self.positions
            .get(&token_id)
            .map(|position| position.owner)
            .ok_or_else(|| ContractError::reverted("ERC721: owner query for nonexistent token"))
    }

    pub fn position_balance(&self, owner: Address) -> U256 {
        U256::from(self.owned.get(&owner).map_or(0, Vec::len))
    }

    pub fn token_of_owner_by_index(
        &self,
        owner: Address,
        index: U256,
    ) -> Result<PositionId, ContractError> {
        let out_of_bounds =
            || ContractError::reverted("ERC721Enumerable: owner index out of bounds");
        let index = usize::try_from(index).map_err(|_| out_of_bounds())?;
        self.owned
            .get(&owner)
            .and_then(|ids| ids.get(index))
            .copied()
            .ok_or_else(out_of_bounds)
    }
}

fn check_deadline(now: u64, deadline: u64) -> Result<(), ContractError> {
    if now > deadline {
        return Err(ContractError::reverted(revert_reasons::TRANSACTION_TOO_OLD));
    }
    Ok(())
}
