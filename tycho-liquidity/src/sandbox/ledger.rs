use std::collections::HashMap;

use serde::Deserialize;
use tycho_liquidity_common::{models::ContractError, Address, U256};

/// How a sandbox token reacts to mutating calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenBehaviour {
    #[default]
    Standard,
    /// `transfer`, `transferFrom` and `approve` return `false` without doing anything.
    ReturnsFalse,
    /// Every mutating call reverts.
    Reverts,
}

#[derive(Debug, Clone)]
pub(crate) struct TokenState {
    pub symbol: String,
    pub decimals: u8,
    pub behaviour: TokenBehaviour,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
}

impl TokenState {
    fn new(symbol: String, decimals: u8) -> Self {
        Self {
            symbol,
            decimals,
            behaviour: TokenBehaviour::default(),
            balances: HashMap::new(),
            allowances: HashMap::new(),
        }
    }

    fn balance(&self, owner: &Address) -> U256 {
        self.balances
            .get(owner)
            .copied()
            .unwrap_or_default()
    }

    fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default()
    }

    /// `Ok(false)` or a revert if the token refuses mutating calls.
    fn check_mutation(&self) -> Result<bool, ContractError> {
        match self.behaviour {
            TokenBehaviour::Standard => Ok(true),
            TokenBehaviour::ReturnsFalse => Ok(false),
            TokenBehaviour::Reverts => Err(ContractError::reverted("Pausable: paused")),
        }
    }

    fn move_balance(
        &mut self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), ContractError> {
        let from_balance = self.balance(&from);
        if from_balance < amount {
            return Err(ContractError::reverted("ERC20: transfer amount exceeds balance"));
        }
        self.balances
            .insert(from, from_balance - amount);
        let to_balance = self.balance(&to);
        self.balances
            .insert(to, to_balance + amount);
        Ok(())
    }
}

/// Token balances, allowances and native currency of the sandbox.
#[derive(Debug, Default)]
pub(crate) struct Ledger {
    tokens: HashMap<Address, TokenState>,
    native: HashMap<Address, U256>,
}

impl Ledger {
    pub fn register_token(&mut self, token: Address, symbol: &str, decimals: u8) -> bool {
        if self.tokens.contains_key(&token) {
            return false;
        }
        self.tokens
            .insert(token, TokenState::new(symbol.to_string(), decimals));
        true
    }

    pub fn token(&self, token: Address) -> Result<&TokenState, ContractError> {
        self.tokens
            .get(&token)
            .ok_or_else(|| ContractError::reverted(format!("call to non-contract {token}")))
    }

    fn token_mut(&mut self, token: Address) -> Result<&mut TokenState, ContractError> {
        self.tokens
            .get_mut(&token)
            .ok_or_else(|| ContractError::reverted(format!("call to non-contract {token}")))
    }

    pub fn tokens(&self) -> impl Iterator<Item = (&Address, &TokenState)> {
        self.tokens.iter()
    }

    pub fn set_behaviour(
        &mut self,
        token: Address,
        behaviour: TokenBehaviour,
    ) -> Result<(), ContractError> {
        self.token_mut(token)?.behaviour = behaviour;
        Ok(())
    }

    pub fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ContractError> {
        Ok(self.token(token)?.balance(&owner))
    }

    pub fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ContractError> {
        Ok(self.token(token)?.allowance(owner, spender))
    }

    /// Credits newly created tokens, bypassing the token's behaviour.
    pub fn mint(&mut self, token: Address, to: Address, amount: U256) -> Result<(), ContractError> {
        let state = self.token_mut(token)?;
        let balance = state.balance(&to);
        state.balances.insert(
            to,
            balance
                .checked_add(amount)
                .ok_or_else(|| ContractError::reverted("balance overflow"))?,
        );
        Ok(())
    }

    /// Destroys tokens, bypassing the token's behaviour.
    pub fn burn(
        &mut self,
        token: Address,
        from: Address,
        amount: U256,
    ) -> Result<(), ContractError> {
        let state = self.token_mut(token)?;
        let balance = state.balance(&from);
        if balance < amount {
            return Err(ContractError::reverted("burn amount exceeds balance"));
        }
        state
            .balances
            .insert(from, balance - amount);
        Ok(())
    }

    pub fn transfer(
        &mut self,
        token: Address,
        sender: Address,
        recipient: Address,
        amount: U256,
    ) -> Result<bool, ContractError> {
        let state = self.token_mut(token)?;
        if !state.check_mutation()? {
            return Ok(false);
        }
        state.move_balance(sender, recipient, amount)?;
        Ok(true)
    }

    /// Whether `transfer_from` with these arguments would succeed and return `true`.
    pub fn can_transfer_from(
        &self,
        token: Address,
        spender: Address,
        owner: Address,
        amount: U256,
    ) -> bool {
        self.token(token)
            .map(|state| {
                state.behaviour == TokenBehaviour::Standard &&
                    state.allowance(owner, spender) >= amount &&
                    state.balance(&owner) >= amount
            })
            .unwrap_or(false)
    }

    pub fn transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        owner: Address,
        recipient: Address,
        amount: U256,
    ) -> Result<bool, ContractError> {
        let state = self.token_mut(token)?;
        if !state.check_mutation()? {
            return Ok(false);
        }
        let allowance = state.allowance(owner, spender);
        if allowance < amount {
            return Err(ContractError::reverted("ERC20: insufficient allowance"));
        }
        state.move_balance(owner, recipient, amount)?;
        state
            .allowances
            .insert((owner, spender), allowance - amount);
        Ok(true)
    }

    pub fn approve(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<bool, ContractError> {
        let state = self.token_mut(token)?;
        if !state.check_mutation()? {
            return Ok(false);
        }
        state
            .allowances
            .insert((owner, spender), amount);
        Ok(true)
    }

    pub fn native_balance(&self, owner: Address) -> U256 {
        self.native
            .get(&owner)
            .copied()
            .unwrap_or_default()
    }

    pub fn set_native_balance(&mut self, owner: Address, amount: U256) {
        self.native.insert(owner, amount);
    }

    pub fn send_native(
        &mut self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), ContractError> {
        let from_balance = self.native_balance(from);
        if from_balance < amount {
            return Err(ContractError::reverted("insufficient native balance"));
        }
        self.native
            .insert(from, from_balance - amount);
        let to_balance = self.native_balance(to);
        self.native
            .insert(to, to_balance + amount);
        Ok(())
    }
}
