//! An in-memory chain implementing every collaborator of the orchestrator.
//!
//! The sandbox models ERC20 tokens, the wrapped native token, native balances, the pool
//! factory and the position manager closely enough to exercise the orchestrator end to end,
//! including reverts with the reasons the real contracts use.

mod amm;
mod ledger;

use std::sync::{Arc, Mutex, MutexGuard};

use alloy_primitives::keccak256;
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use tycho_liquidity_common::{
    models::{
        Chain, ContractError, FeeTier, IncreaseLiquidityParams, IncreaseOutcome, MintOutcome,
        MintParams, PositionId, PositionInfo, Tick, UniswapV3Deployment,
    },
    traits::{
        BlockClock, FungibleAsset, NativeCurrency, PoolFactory, PositionManager,
        WrappedNativeAsset,
    },
    Address, U256,
};

pub use ledger::TokenBehaviour;

use self::{amm::Amm, ledger::Ledger};

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("No canonical Uniswap V3 deployment known for {0}")]
    UnsupportedChain(Chain),
    #[error("Token {0} is already registered")]
    DuplicateToken(Address),
    #[error(transparent)]
    Contract(#[from] ContractError),
}

#[derive(Debug)]
struct ChainState {
    ledger: Ledger,
    amm: Amm,
    wrapped_native: Address,
    timestamp: u64,
    deployments: u64,
}

/// Shared handle to an in-memory chain. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct SandboxChain {
    deployment: UniswapV3Deployment,
    state: Arc<Mutex<ChainState>>,
}

impl SandboxChain {
    /// A chain with the given periphery and wrapped native token, starting at `timestamp`.
    pub fn new(
        chain: Chain,
        deployment: UniswapV3Deployment,
        wrapped_native: Address,
        timestamp: u64,
    ) -> Self {
        let mut ledger = Ledger::default();
        ledger.register_token(wrapped_native, chain.wrapped_native_symbol(), 18);
        let state = ChainState {
            ledger,
            amm: Amm::new(deployment.factory, deployment.position_manager),
            wrapped_native,
            timestamp,
            deployments: 0,
        };
        Self { deployment, state: Arc::new(Mutex::new(state)) }
    }

    /// A chain using the canonical deployment and wrapped native token of `chain`.
    pub fn for_chain(chain: Chain, timestamp: u64) -> Result<Self, SandboxError> {
        let deployment = chain
            .uniswap_v3()
            .ok_or(SandboxError::UnsupportedChain(chain))?;
        Ok(Self::new(chain, deployment, chain.wrapped_native(), timestamp))
    }

    pub fn deployment(&self) -> UniswapV3Deployment {
        self.deployment
    }

    fn state(&self) -> Result<MutexGuard<'_, ChainState>, ContractError> {
        self.state
            .lock()
            .map_err(|_| ContractError::Unavailable("sandbox state lock poisoned".into()))
    }

    pub fn register_token(
        &self,
        token: Address,
        symbol: &str,
        decimals: u8,
    ) -> Result<(), SandboxError> {
        if !self
            .state()?
            .ledger
            .register_token(token, symbol, decimals)
        {
            return Err(SandboxError::DuplicateToken(token));
        }
        debug!(%token, symbol, decimals, "Token registered");
        Ok(())
    }

    /// Address of the registered token with `symbol`, if any.
    pub fn token_by_symbol(&self, symbol: &str) -> Result<Option<Address>, SandboxError> {
        Ok(self
            .state()?
            .ledger
            .tokens()
            .find(|(_, state)| state.symbol.eq_ignore_ascii_case(symbol))
            .map(|(address, _)| *address))
    }

    pub fn symbol(&self, token: Address) -> Result<String, SandboxError> {
        Ok(self
            .state()?
            .ledger
            .token(token)?
            .symbol
            .clone())
    }

    /// Credits freshly minted tokens to `to`.
    pub fn mint_tokens(
        &self,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), SandboxError> {
        Ok(self
            .state()?
            .ledger
            .mint(token, to, amount)?)
    }

    pub fn set_native_balance(&self, owner: Address, amount: U256) -> Result<(), SandboxError> {
        self.state()?
            .ledger
            .set_native_balance(owner, amount);
        Ok(())
    }

    pub fn set_token_behaviour(
        &self,
        token: Address,
        behaviour: TokenBehaviour,
    ) -> Result<(), SandboxError> {
        Ok(self
            .state()?
            .ledger
            .set_behaviour(token, behaviour)?)
    }

    /// Deploys a pool for the pair at `fee`, initialized at `tick`.
    pub fn create_pool(
        &self,
        token_a: Address,
        token_b: Address,
        fee: FeeTier,
        tick: Tick,
    ) -> Result<Address, SandboxError> {
        let address = self
            .state()?
            .amm
            .create_pool(token_a, token_b, fee, tick)?;
        debug!(%token_a, %token_b, %fee, tick, pool = %address, "Pool created");
        Ok(address)
    }

    /// Moves a pool's price, as swaps by other accounts would.
    pub fn set_pool_tick(
        &self,
        token_a: Address,
        token_b: Address,
        fee: FeeTier,
        tick: Tick,
    ) -> Result<(), SandboxError> {
        Ok(self
            .state()?
            .amm
            .set_pool_tick(token_a, token_b, fee, tick)?)
    }

    pub fn pool_tick(
        &self,
        token_a: Address,
        token_b: Address,
        fee: FeeTier,
    ) -> Result<Option<Tick>, SandboxError> {
        Ok(self
            .state()?
            .amm
            .pool(token_a, token_b, fee)
            .map(|pool| pool.tick))
    }

    /// Moves the chain's block timestamp, as mining later blocks would.
    pub fn set_timestamp(&self, timestamp: u64) -> Result<(), SandboxError> {
        self.state()?.timestamp = timestamp;
        Ok(())
    }

    /// Address of the next contract deployed by `deployer`.
    pub fn deploy_address(&self, deployer: Address) -> Result<Address, SandboxError> {
        let mut state = self.state()?;
        state.deployments += 1;
        let mut preimage = deployer.to_vec();
        preimage.extend_from_slice(&state.deployments.to_be_bytes());
        Ok(Address::from_slice(&keccak256(&preimage)[12..]))
    }
}

#[async_trait]
impl FungibleAsset for SandboxChain {
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ContractError> {
        self.state()?.ledger.balance_of(token, owner)
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ContractError> {
        self.state()?
            .ledger
            .allowance(token, owner, spender)
    }

    async fn decimals(&self, token: Address) -> Result<u8, ContractError> {
        Ok(self.state()?.ledger.token(token)?.decimals)
    }

    async fn transfer(
        &self,
        token: Address,
        sender: Address,
        recipient: Address,
        amount: U256,
    ) -> Result<bool, ContractError> {
        self.state()?
            .ledger
            .transfer(token, sender, recipient, amount)
    }

    async fn transfer_from(
        &self,
        token: Address,
        spender: Address,
        owner: Address,
        recipient: Address,
        amount: U256,
    ) -> Result<bool, ContractError> {
        self.state()?
            .ledger
            .transfer_from(token, spender, owner, recipient, amount)
    }

    async fn approve(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<bool, ContractError> {
        self.state()?
            .ledger
            .approve(token, owner, spender, amount)
    }
}

#[async_trait]
impl WrappedNativeAsset for SandboxChain {
    async fn deposit(&self, sender: Address, value: U256) -> Result<(), ContractError> {
        let mut state = self.state()?;
        let wrapped_native = state.wrapped_native;
        state
            .ledger
            .send_native(sender, wrapped_native, value)?;
        state
            .ledger
            .mint(wrapped_native, sender, value)
    }

    async fn withdraw(&self, sender: Address, amount: U256) -> Result<(), ContractError> {
        let mut state = self.state()?;
        let wrapped_native = state.wrapped_native;
        state
            .ledger
            .burn(wrapped_native, sender, amount)?;
        state
            .ledger
            .send_native(wrapped_native, sender, amount)
    }
}

#[async_trait]
impl NativeCurrency for SandboxChain {
    async fn native_balance(&self, owner: Address) -> Result<U256, ContractError> {
        Ok(self.state()?.ledger.native_balance(owner))
    }

    async fn send(&self, from: Address, to: Address, amount: U256) -> Result<(), ContractError> {
        self.state()?
            .ledger
            .send_native(from, to, amount)
    }
}

#[async_trait]
impl PositionManager for SandboxChain {
    async fn mint(
        &self,
        sender: Address,
        params: MintParams,
    ) -> Result<MintOutcome, ContractError> {
        let mut guard = self.state()?;
        let state = &mut *guard;
        let outcome = state
            .amm
            .mint(&mut state.ledger, state.timestamp, sender, &params)?;
        debug!(token_id = %outcome.token_id, liquidity = outcome.liquidity, "Position minted");
        Ok(outcome)
    }

    async fn increase_liquidity(
        &self,
        sender: Address,
        params: IncreaseLiquidityParams,
    ) -> Result<IncreaseOutcome, ContractError> {
        let mut guard = self.state()?;
        let state = &mut *guard;
        state
            .amm
            .increase_liquidity(&mut state.ledger, state.timestamp, sender, &params)
    }

    async fn positions(&self, token_id: PositionId) -> Result<PositionInfo, ContractError> {
        self.state()?.amm.positions(token_id)
    }

    async fn owner_of(&self, token_id: PositionId) -> Result<Address, ContractError> {
        self.state()?.amm.owner_of(token_id)
    }

    async fn position_balance(&self, owner: Address) -> Result<U256, ContractError> {
        Ok(self.state()?.amm.position_balance(owner))
    }

    async fn token_of_owner_by_index(
        &self,
        owner: Address,
        index: U256,
    ) -> Result<PositionId, ContractError> {
        self.state()?
            .amm
            .token_of_owner_by_index(owner, index)
    }
}

#[async_trait]
impl PoolFactory for SandboxChain {
    async fn get_pool(
        &self,
        token_a: Address,
        token_b: Address,
        fee: FeeTier,
    ) -> Result<Option<Address>, ContractError> {
        Ok(self
            .state()?
            .amm
            .pool(token_a, token_b, fee)
            .map(|pool| pool.address))
    }

    async fn fee_amount_tick_spacing(&self, fee: FeeTier) -> Result<Option<i32>, ContractError> {
        Ok(self.state()?.amm.tick_spacing(fee))
    }
}

#[async_trait]
impl BlockClock for SandboxChain {
    async fn block_timestamp(&self) -> Result<u64, ContractError> {
        Ok(self.state()?.timestamp)
    }
}
