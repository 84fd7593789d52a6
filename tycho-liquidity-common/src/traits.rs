//! Interfaces of the contracts the orchestrator collaborates with.
//!
//! Methods that change state take the acting account (`sender`, `owner`, `spender`) explicitly,
//! because implementations are not bound to a single signer the way a contract's
//! `msg.sender` is.

use async_trait::async_trait;

use crate::{
    models::{
        ContractError, FeeTier, IncreaseLiquidityParams, IncreaseOutcome, MintOutcome,
        MintParams, PositionId, PositionInfo,
    },
    Address, U256,
};

/// ERC20 style fungible assets, addressed by token contract.
///
/// Mutating calls return `Ok(false)` when the token signals failure without reverting. Callers
/// must treat that exactly like a revert.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait FungibleAsset: Send + Sync {
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ContractError>;

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ContractError>;

    async fn decimals(&self, token: Address) -> Result<u8, ContractError>;

    /// Moves `amount` from `sender` to `recipient`.
    async fn transfer(
        &self,
        token: Address,
        sender: Address,
        recipient: Address,
        amount: U256,
    ) -> Result<bool, ContractError>;

    /// Moves `amount` from `owner` to `recipient`, spending `spender`'s allowance.
    async fn transfer_from(
        &self,
        token: Address,
        spender: Address,
        owner: Address,
        recipient: Address,
        amount: U256,
    ) -> Result<bool, ContractError>;

    /// Sets the allowance of `spender` over `owner`'s balance to exactly `amount`.
    async fn approve(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<bool, ContractError>;
}

/// The wrapped native token (WETH on Ethereum).
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait WrappedNativeAsset: Send + Sync {
    /// Wraps `value` of `sender`'s native balance into the same amount of wrapped tokens.
    async fn deposit(&self, sender: Address, value: U256) -> Result<(), ContractError>;

    /// Burns `amount` of `sender`'s wrapped tokens and credits the native currency back.
    async fn withdraw(&self, sender: Address, amount: U256) -> Result<(), ContractError>;
}

/// Native currency balances.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait NativeCurrency: Send + Sync {
    async fn native_balance(&self, owner: Address) -> Result<U256, ContractError>;

    async fn send(&self, from: Address, to: Address, amount: U256) -> Result<(), ContractError>;
}

/// The position manager minting and tracking concentrated liquidity positions as NFTs.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait PositionManager: Send + Sync {
    /// Creates a position. Funds are pulled from `sender`, which must have approved the
    /// position manager for the desired amounts.
    async fn mint(&self, sender: Address, params: MintParams)
        -> Result<MintOutcome, ContractError>;

    /// Adds liquidity to an existing position, pulling funds from `sender`.
    async fn increase_liquidity(
        &self,
        sender: Address,
        params: IncreaseLiquidityParams,
    ) -> Result<IncreaseOutcome, ContractError>;

    async fn positions(&self, token_id: PositionId) -> Result<PositionInfo, ContractError>;

    async fn owner_of(&self, token_id: PositionId) -> Result<Address, ContractError>;

    /// Number of positions held by `owner`.
    async fn position_balance(&self, owner: Address) -> Result<U256, ContractError>;

    async fn token_of_owner_by_index(
        &self,
        owner: Address,
        index: U256,
    ) -> Result<PositionId, ContractError>;
}

/// The pool factory, addressing pools by `(token0, token1, fee)`.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait PoolFactory: Send + Sync {
    /// Address of the pool for the pair and fee tier, in either token order.
    async fn get_pool(
        &self,
        token_a: Address,
        token_b: Address,
        fee: FeeTier,
    ) -> Result<Option<Address>, ContractError>;

    /// Tick spacing of an enabled fee tier, `None` if the tier is not enabled.
    async fn fee_amount_tick_spacing(&self, fee: FeeTier) -> Result<Option<i32>, ContractError>;
}

#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait BlockClock: Send + Sync {
    /// Timestamp of the block the next call executes in.
    async fn block_timestamp(&self) -> Result<u64, ContractError>;
}
