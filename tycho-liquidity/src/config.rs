use std::time::Duration;

use serde::Deserialize;
use tycho_liquidity_common::{models::Chain, Address, U256};

use crate::errors::ValidationError;

/// How the integer `slippage` of a request translates into minimum amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlippageModel {
    /// `slippage` is in percent: `min = amount * (100 - slippage) / 100`.
    #[default]
    Percent,
    /// `slippage` is in basis points: `min = amount * (10_000 - slippage) / 10_000`.
    BasisPoints,
}

impl SlippageModel {
    pub fn denominator(&self) -> u32 {
        match self {
            SlippageModel::Percent => 100,
            SlippageModel::BasisPoints => 10_000,
        }
    }

    /// Smallest acceptable consumption of `amount` under the given tolerance, rounded down.
    pub fn min_amount(&self, amount: U256, slippage: u32) -> Result<U256, ValidationError> {
        let denominator = self.denominator();
        if slippage > denominator {
            return Err(ValidationError::SlippageOutOfRange { slippage, max: denominator });
        }
        let kept = U256::from(denominator - slippage);
        // amount * kept only overflows for amounts close to 2^256, use the division first then.
        let min = match amount.checked_mul(kept) {
            Some(scaled) => scaled / U256::from(denominator),
            None => amount / U256::from(denominator) * kept,
        };
        Ok(min)
    }
}

fn default_deadline_buffer_secs() -> u64 {
    60
}

/// Construction time configuration of a [`crate::PositionOrchestrator`].
///
/// The collaborator addresses are fixed once the orchestrator is built.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrchestratorConfig {
    /// Pool factory used to resolve `(token0, token1, fee)` to a pool.
    pub factory: Address,
    /// The wrapped native token. Legs on this token may be funded with native currency.
    pub wrapped_native: Address,
    /// Position manager that is approved to pull the committed amounts.
    pub position_manager: Address,
    /// Swap router of the deployment. Position calls never route through it.
    pub swap_router: Address,
    #[serde(default)]
    pub slippage_model: SlippageModel,
    /// Seconds added to the current block timestamp to form each call's deadline.
    #[serde(default = "default_deadline_buffer_secs")]
    pub deadline_buffer_secs: u64,
}

impl OrchestratorConfig {
    pub fn new(
        factory: Address,
        wrapped_native: Address,
        position_manager: Address,
        swap_router: Address,
    ) -> Self {
        Self {
            factory,
            wrapped_native,
            position_manager,
            swap_router,
            slippage_model: SlippageModel::default(),
            deadline_buffer_secs: default_deadline_buffer_secs(),
        }
    }

    /// Configuration pointing at the canonical Uniswap V3 deployment of `chain`, if any.
    pub fn for_chain(chain: Chain) -> Option<Self> {
        let deployment = chain.uniswap_v3()?;
        Some(Self::new(
            deployment.factory,
            chain.wrapped_native(),
            deployment.position_manager,
            deployment.swap_router,
        ))
    }

    pub fn with_slippage_model(mut self, slippage_model: SlippageModel) -> Self {
        self.slippage_model = slippage_model;
        self
    }

    pub fn with_deadline_buffer(mut self, buffer: Duration) -> Self {
        self.deadline_buffer_secs = buffer.as_secs();
        self
    }

    pub fn deadline_buffer(&self) -> Duration {
        Duration::from_secs(self.deadline_buffer_secs)
    }
}
