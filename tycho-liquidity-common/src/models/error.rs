use thiserror::Error;

/// Revert reasons emitted by the Uniswap V3 position manager that callers need to tell apart.
pub mod revert_reasons {
    /// Consumption would fall below `amount0Min` or `amount1Min`.
    pub const PRICE_SLIPPAGE_CHECK: &str = "Price slippage check";
    /// The call was mined after its deadline.
    pub const TRANSACTION_TOO_OLD: &str = "Transaction too old";
    /// The position NFT does not exist.
    pub const INVALID_TOKEN_ID: &str = "Invalid token ID";
    /// `safeTransferFrom` failed while pulling funds.
    pub const SAFE_TRANSFER_FROM: &str = "STF";
}

/// Failure of a call into an external contract.
///
/// Variants:
/// - `Reverted`: the contract rejected the call, nothing it would have done took effect.
/// - `Unavailable`: the contract could not be reached or queried at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("Execution reverted: {0}")]
    Reverted(String),
    #[error("Contract unavailable: {0}")]
    Unavailable(String),
}

impl ContractError {
    pub fn reverted(reason: impl Into<String>) -> Self {
        ContractError::Reverted(reason.into())
    }

    /// The revert reason, if the call reverted.
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            ContractError::Reverted(reason) => Some(reason.as_str()),
            ContractError::Unavailable(_) => None,
        }
    }

    pub fn is_revert_with(&self, reason: &str) -> bool {
        self.revert_reason() == Some(reason)
    }
}
