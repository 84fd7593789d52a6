//! YAML scenarios: a sandbox genesis plus a list of steps run against an orchestrator.

use std::{fs::File, io::Read, path::Path, str::FromStr};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use tycho_liquidity_common::{
    models::{
        CallContext, Chain, ContractError, FeeTier, IncreaseRequest, PositionId, PositionInfo,
        PositionRequest, Tick,
    },
    traits::{FungibleAsset, PoolFactory, PositionManager, WrappedNativeAsset},
    units::{format_units, parse_units, UnitsError},
    Address, U256,
};

use crate::{
    config::{OrchestratorConfig, SlippageModel},
    errors::OrchestratorError,
    orchestrator::{
        Collaborators, IncreaseReceipt, LegSettlement, NewPositionReceipt, PositionOrchestrator,
    },
    sandbox::{SandboxChain, SandboxError, TokenBehaviour},
};

const NATIVE_DECIMALS: u8 = 18;

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Failed to read scenario file {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("Invalid scenario: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Unknown token {0}")]
    UnknownToken(String),
    #[error(transparent)]
    Units(#[from] UnitsError),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("Chain call failed: {0}")]
    Contract(#[from] ContractError),
    #[error("No position was opened before step {0}")]
    NoPosition(usize),
    #[error("Step {index} ({action}) failed: {source}")]
    StepFailed {
        index: usize,
        action: &'static str,
        #[source]
        source: OrchestratorError,
    },
    #[error("Step {index} ({action}) was expected to fail but succeeded")]
    UnexpectedSuccess { index: usize, action: &'static str },
}

/// A token deployed at genesis.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGenesis {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
    /// Balance of the deployer, as a decimal amount.
    #[serde(default)]
    pub balance: Option<String>,
    #[serde(default)]
    pub behaviour: TokenBehaviour,
}

/// A pool deployed at genesis.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolGenesis {
    pub token_a: String,
    pub token_b: String,
    pub fee: FeeTier,
    pub tick: Tick,
}

/// Overrides of the orchestrator's default configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrchestratorSettings {
    #[serde(default)]
    pub slippage_model: Option<SlippageModel>,
    #[serde(default)]
    pub deadline_buffer_secs: Option<u64>,
}

/// A position request with token references and decimal amounts.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionStep {
    pub token0: String,
    pub token1: String,
    pub amount0: String,
    pub amount1: String,
    pub fee: FeeTier,
    pub tick_lower: Tick,
    pub tick_upper: Tick,
    pub slippage: u32,
    /// Fund the wrapped native leg by attaching native currency instead of an approval.
    #[serde(default)]
    pub native: bool,
    #[serde(default)]
    pub expect_failure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncreaseStep {
    /// Position to grow, defaults to the last one opened by the scenario.
    #[serde(default)]
    pub position: Option<u64>,
    pub request: PositionStep,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Approve the orchestrator to pull `amount` of `token` from the deployer.
    Approve { token: String, amount: String },
    /// Wrap native currency of the deployer.
    Wrap { amount: String },
    NewPosition(PositionStep),
    IncreaseLiquidity(IncreaseStep),
    ShowPosition {
        #[serde(default)]
        position: Option<u64>,
    },
    /// Move a pool's price, as other traders would.
    SetPoolTick { token_a: String, token_b: String, fee: FeeTier, tick: Tick },
}

impl Step {
    pub fn action(&self) -> &'static str {
        match self {
            Step::Approve { .. } => "approve",
            Step::Wrap { .. } => "wrap",
            Step::NewPosition(_) => "new_position",
            Step::IncreaseLiquidity(_) => "increase_liquidity",
            Step::ShowPosition { .. } => "show_position",
            Step::SetPoolTick { .. } => "set_pool_tick",
        }
    }

    fn expects_failure(&self) -> bool {
        match self {
            Step::NewPosition(step) => step.expect_failure,
            Step::IncreaseLiquidity(step) => step.request.expect_failure,
            _ => false,
        }
    }
}

fn default_chain() -> Chain {
    Chain::Ethereum
}

fn default_native_balance() -> String {
    "10000".to_string()
}

/// Sandbox genesis and the steps to run on it.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_chain")]
    pub chain: Chain,
    pub timestamp: u64,
    /// Account deploying the orchestrator and issuing every step.
    pub deployer: Address,
    /// Native balance of the deployer, as a decimal amount.
    #[serde(default = "default_native_balance")]
    pub native_balance: String,
    #[serde(default)]
    pub tokens: Vec<TokenGenesis>,
    #[serde(default)]
    pub pools: Vec<PoolGenesis>,
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_yaml(path: &Path) -> Result<Self, ScenarioError> {
        let io_error = |source| ScenarioError::Io { path: path.display().to_string(), source };
        let mut file = File::open(path).map_err(io_error)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(io_error)?;
        Self::from_str(&contents)
    }

    /// Builds the sandbox from the genesis and deploys an orchestrator from the deployer.
    pub fn deploy(&self) -> Result<Deployment, ScenarioError> {
        let sandbox = SandboxChain::for_chain(self.chain, self.timestamp)?;
        sandbox.set_native_balance(
            self.deployer,
            parse_units(&self.native_balance, NATIVE_DECIMALS)?,
        )?;

        for token in &self.tokens {
            sandbox.register_token(token.address, &token.symbol, token.decimals)?;
            sandbox.set_token_behaviour(token.address, token.behaviour)?;
            if let Some(balance) = &token.balance {
                sandbox.mint_tokens(
                    token.address,
                    self.deployer,
                    parse_units(balance, token.decimals)?,
                )?;
            }
        }

        let deployment = Deployment::new(sandbox, self.deployer, |sandbox| {
            let deployment = sandbox.deployment();
            let mut config = OrchestratorConfig::new(
                deployment.factory,
                self.chain.wrapped_native(),
                deployment.position_manager,
                deployment.swap_router,
            );
            if let Some(model) = self.orchestrator.slippage_model {
                config = config.with_slippage_model(model);
            }
            if let Some(buffer) = self.orchestrator.deadline_buffer_secs {
                config.deadline_buffer_secs = buffer;
            }
            config
        })?;

        for pool in &self.pools {
            let token_a = deployment.resolve_token(&pool.token_a)?;
            let token_b = deployment.resolve_token(&pool.token_b)?;
            deployment
                .sandbox
                .create_pool(token_a, token_b, pool.fee, pool.tick)?;
        }
        Ok(deployment)
    }
}

impl FromStr for Scenario {
    type Err = ScenarioError;

    fn from_str(yaml: &str) -> Result<Self, Self::Err> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

/// What a step did.
#[derive(Debug)]
pub enum StepOutcome {
    Approved { token: Address, amount: U256 },
    Wrapped { amount: U256 },
    Opened(NewPositionReceipt),
    Increased(IncreaseReceipt),
    Position { position_id: PositionId, owner: Address, info: PositionInfo },
    PoolMoved { pool: Address, tick: Tick },
    /// The step failed, as the scenario expected.
    Failed(OrchestratorError),
}

#[derive(Debug)]
pub struct StepReport {
    pub index: usize,
    pub action: &'static str,
    pub outcome: StepOutcome,
    /// Human readable summary using token symbols and decimal amounts.
    pub summary: String,
}

/// An orchestrator deployed on a sandbox chain.
pub struct Deployment {
    pub sandbox: SandboxChain,
    pub orchestrator: PositionOrchestrator,
    pub deployer: Address,
    last_position: Option<PositionId>,
}

impl Deployment {
    pub fn new(
        sandbox: SandboxChain,
        deployer: Address,
        config: impl FnOnce(&SandboxChain) -> OrchestratorConfig,
    ) -> Result<Self, ScenarioError> {
        let address = sandbox.deploy_address(deployer)?;
        let config = config(&sandbox);
        let orchestrator =
            PositionOrchestrator::new(address, config, Collaborators::from_chain(sandbox.clone()));
        Ok(Self { sandbox, orchestrator, deployer, last_position: None })
    }

    /// Resolves a `0x` address or a registered token symbol.
    pub fn resolve_token(&self, reference: &str) -> Result<Address, ScenarioError> {
        if reference.starts_with("0x") {
            return Address::from_str(reference)
                .map_err(|_| ScenarioError::UnknownToken(reference.to_string()));
        }
        self.sandbox
            .token_by_symbol(reference)?
            .ok_or_else(|| ScenarioError::UnknownToken(reference.to_string()))
    }

    async fn amount(&self, token: Address, amount: &str) -> Result<U256, ScenarioError> {
        let decimals = self.sandbox.decimals(token).await?;
        Ok(parse_units(amount, decimals)?)
    }

    async fn describe(&self, token: Address, amount: U256) -> Result<String, ScenarioError> {
        let decimals = self.sandbox.decimals(token).await?;
        let symbol = self.sandbox.symbol(token)?;
        Ok(format!("{} {symbol}", format_units(amount, decimals)))
    }

    async fn describe_legs(&self, legs: &[LegSettlement; 2]) -> Result<String, ScenarioError> {
        let mut parts = Vec::with_capacity(2);
        for leg in legs {
            parts.push(format!(
                "used {} refunded {}",
                self.describe(leg.token, leg.used).await?,
                self.describe(leg.token, leg.refunded).await?
            ));
        }
        Ok(parts.join(", "))
    }

    async fn position_request(
        &self,
        step: &PositionStep,
    ) -> Result<(CallContext, PositionRequest), ScenarioError> {
        let token0 = self.resolve_token(&step.token0)?;
        let token1 = self.resolve_token(&step.token1)?;
        let request = PositionRequest {
            token0,
            token1,
            amount0: self.amount(token0, &step.amount0).await?,
            amount1: self.amount(token1, &step.amount1).await?,
            fee_tier: step.fee,
            tick_lower: step.tick_lower,
            tick_upper: step.tick_upper,
            slippage: step.slippage,
        };

        let mut ctx = CallContext::new(self.deployer);
        if step.native {
            let wrapped_native = self.orchestrator.config().wrapped_native;
            let value = if token0 == wrapped_native {
                request.amount0
            } else if token1 == wrapped_native {
                request.amount1
            } else {
                U256::ZERO
            };
            ctx = ctx.with_value(value);
        }
        Ok((ctx, request))
    }

    /// The explicit position, else the last one opened by the scenario, else the newest
    /// position the deployer owns.
    async fn target_position(
        &self,
        position: Option<u64>,
        index: usize,
    ) -> Result<PositionId, ScenarioError> {
        if let Some(position_id) = position
            .map(PositionId::from)
            .or(self.last_position)
        {
            return Ok(position_id);
        }
        let owned = self
            .sandbox
            .position_balance(self.deployer)
            .await?;
        if owned.is_zero() {
            return Err(ScenarioError::NoPosition(index));
        }
        Ok(self
            .sandbox
            .token_of_owner_by_index(self.deployer, owned - U256::from(1u64))
            .await?)
    }

    /// Runs one step. Orchestrator failures are returned as `Ok(Err(..))`.
    async fn execute(
        &mut self,
        index: usize,
        step: &Step,
    ) -> Result<Result<(StepOutcome, String), OrchestratorError>, ScenarioError> {
        let executed = match step {
            Step::Approve { token, amount } => {
                let token = self.resolve_token(token)?;
                let amount = self.amount(token, amount).await?;
                if !self
                    .sandbox
                    .approve(token, self.deployer, self.orchestrator.address(), amount)
                    .await?
                {
                    return Err(ContractError::reverted("approve returned false").into());
                }
                let summary = format!("approved {}", self.describe(token, amount).await?);
                (StepOutcome::Approved { token, amount }, summary)
            }
            Step::Wrap { amount } => {
                let amount = parse_units(amount, NATIVE_DECIMALS)?;
                self.sandbox
                    .deposit(self.deployer, amount)
                    .await?;
                let wrapped = self.orchestrator.config().wrapped_native;
                let summary = format!("wrapped {}", self.describe(wrapped, amount).await?);
                (StepOutcome::Wrapped { amount }, summary)
            }
            Step::NewPosition(step) => {
                let (ctx, request) = self.position_request(step).await?;
                match self.orchestrator.new_position(ctx, request).await {
                    Ok(receipt) => {
                        self.last_position = Some(receipt.position_id);
                        let summary = format!(
                            "opened position {} with liquidity {}: {}",
                            receipt.position_id,
                            receipt.liquidity,
                            self.describe_legs(&receipt.legs).await?
                        );
                        (StepOutcome::Opened(receipt), summary)
                    }
                    Err(err) => return Ok(Err(err)),
                }
            }
            Step::IncreaseLiquidity(step) => {
                let position_id = self
                    .target_position(step.position, index)
                    .await?;
                let (ctx, request) = self.position_request(&step.request).await?;
                match self
                    .orchestrator
                    .increase_liquidity(ctx, IncreaseRequest::new(position_id, request))
                    .await
                {
                    Ok(receipt) => {
                        let summary = format!(
                            "added liquidity {} to position {}: {}",
                            receipt.liquidity_delta,
                            receipt.position_id,
                            self.describe_legs(&receipt.legs).await?
                        );
                        (StepOutcome::Increased(receipt), summary)
                    }
                    Err(err) => return Ok(Err(err)),
                }
            }
            Step::ShowPosition { position } => {
                let position_id = self
                    .target_position(*position, index)
                    .await?;
                let info = self.sandbox.positions(position_id).await?;
                let owner = self.sandbox.owner_of(position_id).await?;
                let summary = format!(
                    "position {position_id} owned by {owner}: liquidity {} in [{}, {})",
                    info.liquidity, info.tick_lower, info.tick_upper
                );
                (StepOutcome::Position { position_id, owner, info }, summary)
            }
            Step::SetPoolTick { token_a, token_b, fee, tick } => {
                let token_a = self.resolve_token(token_a)?;
                let token_b = self.resolve_token(token_b)?;
                self.sandbox
                    .set_pool_tick(token_a, token_b, *fee, *tick)?;
                let pool = self
                    .sandbox
                    .get_pool(token_a, token_b, *fee)
                    .await?
                    .unwrap_or_default();
                let summary = format!("pool {pool} moved to tick {tick}");
                (StepOutcome::PoolMoved { pool, tick: *tick }, summary)
            }
        };
        Ok(Ok(executed))
    }

    /// Runs `steps` in order, checking each step's expected outcome.
    pub async fn run(&mut self, steps: &[Step]) -> Result<Vec<StepReport>, ScenarioError> {
        let mut reports = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            let action = step.action();
            let report = match (self.execute(index, step).await?, step.expects_failure()) {
                (Ok((outcome, summary)), false) => {
                    info!(index, action, %summary, "Step succeeded");
                    StepReport { index, action, outcome, summary }
                }
                (Ok(_), true) => return Err(ScenarioError::UnexpectedSuccess { index, action }),
                (Err(err), true) => {
                    warn!(index, action, %err, "Step failed as expected");
                    let summary = format!("failed as expected: {err}");
                    StepReport { index, action, outcome: StepOutcome::Failed(err), summary }
                }
                (Err(source), false) => {
                    return Err(ScenarioError::StepFailed { index, action, source })
                }
            };
            reports.push(report);
        }
        Ok(reports)
    }
}
