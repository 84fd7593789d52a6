//! The position orchestrator.
//!
//! Every call runs the same pipeline: validation, custody, approval, execution and
//! settlement. Each asset movement before execution is journaled, and any failure up to and
//! including execution replays the journal so the caller ends up where it started.

mod approval;
mod custody;
mod execution;
mod journal;
mod settlement;
mod validator;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};
use tycho_liquidity_common::{
    models::{
        CallContext, IncreaseRequest, Liquidity, PositionId, PositionRequest, TokenPair,
    },
    traits::{
        BlockClock, FungibleAsset, NativeCurrency, PoolFactory, PositionManager,
        WrappedNativeAsset,
    },
    Address,
};

pub use custody::Funding;
pub use settlement::LegSettlement;

use self::{
    approval::ApprovalBridge,
    custody::{CustodyManager, LegCustody},
    execution::{Execution, ExecutionEngine, Target},
    journal::CompensationJournal,
    settlement::SettlementHandler,
    validator::{CanonicalRequest, RequestValidator},
};
use crate::{config::OrchestratorConfig, errors::OrchestratorError};

/// The external contracts an orchestrator works with.
#[derive(Clone)]
pub struct Collaborators {
    pub assets: Arc<dyn FungibleAsset>,
    pub wrapped_native: Arc<dyn WrappedNativeAsset>,
    pub native: Arc<dyn NativeCurrency>,
    pub position_manager: Arc<dyn PositionManager>,
    pub factory: Arc<dyn PoolFactory>,
    pub clock: Arc<dyn BlockClock>,
}

impl Collaborators {
    /// Uses a single backend for every collaborator, e.g. one chain client.
    pub fn from_chain<C>(chain: C) -> Self
    where
        C: FungibleAsset
            + WrappedNativeAsset
            + NativeCurrency
            + PositionManager
            + PoolFactory
            + BlockClock
            + Clone
            + 'static,
    {
        Self {
            assets: Arc::new(chain.clone()),
            wrapped_native: Arc::new(chain.clone()),
            native: Arc::new(chain.clone()),
            position_manager: Arc::new(chain.clone()),
            factory: Arc::new(chain.clone()),
            clock: Arc::new(chain),
        }
    }
}

/// Result of opening a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPositionReceipt {
    pub position_id: PositionId,
    pub liquidity: Liquidity,
    pub pair: TokenPair,
    /// Accounting of both legs, in canonical order.
    pub legs: [LegSettlement; 2],
}

/// Result of growing a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncreaseReceipt {
    pub position_id: PositionId,
    /// Liquidity added to the position.
    pub liquidity_delta: Liquidity,
    pub pair: TokenPair,
    pub legs: [LegSettlement; 2],
}

/// Looks up the accounting of `token` in a receipt's legs.
fn leg_for(legs: &[LegSettlement; 2], token: Address) -> Option<&LegSettlement> {
    legs.iter().find(|leg| leg.token == token)
}

impl NewPositionReceipt {
    pub fn leg_for(&self, token: Address) -> Option<&LegSettlement> {
        leg_for(&self.legs, token)
    }
}

impl IncreaseReceipt {
    pub fn leg_for(&self, token: Address) -> Option<&LegSettlement> {
        leg_for(&self.legs, token)
    }
}

/// Opens and grows concentrated liquidity positions on behalf of callers.
///
/// Calls are executed one at a time. Between calls the orchestrator holds no assets of its
/// own: whatever a call takes from its caller is either committed to the position manager
/// or handed back before the call returns.
pub struct PositionOrchestrator {
    address: Address,
    config: OrchestratorConfig,
    collaborators: Collaborators,
    call_guard: Mutex<()>,
}

/// Outcome of a call once the journal was committed.
struct Committed {
    execution: Execution,
    legs: [LegSettlement; 2],
}

impl PositionOrchestrator {
    /// Creates an orchestrator acting as `address`.
    pub fn new(address: Address, config: OrchestratorConfig, collaborators: Collaborators) -> Self {
        Self { address, config, collaborators, call_guard: Mutex::new(()) }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Opens a new position owned by the caller.
    ///
    /// If the wrapped native token is one of the legs, the caller may attach exactly that leg's
    /// amount as native value instead of approving the token.
    #[instrument(skip_all, fields(caller = %ctx.caller))]
    pub async fn new_position(
        &self,
        ctx: CallContext,
        request: PositionRequest,
    ) -> Result<NewPositionReceipt, OrchestratorError> {
        let _guard = self.call_guard.lock().await;
        info!(?request, value = %ctx.value, "New position requested");

        let canonical = self.validator().validate_new(&ctx, &request).await?;
        let committed = self
            .run(&ctx, Target::Mint { recipient: ctx.caller }, &canonical)
            .await?;

        let receipt = NewPositionReceipt {
            position_id: committed.execution.position_id,
            liquidity: committed.execution.liquidity,
            pair: canonical.pair,
            legs: committed.legs,
        };
        info!(position_id = %receipt.position_id, liquidity = receipt.liquidity, "Position opened");
        Ok(receipt)
    }

    /// Adds liquidity to a position the caller owns.
    #[instrument(skip_all, fields(caller = %ctx.caller, position_id = %request.position_id))]
    pub async fn increase_liquidity(
        &self,
        ctx: CallContext,
        request: IncreaseRequest,
    ) -> Result<IncreaseReceipt, OrchestratorError> {
        let _guard = self.call_guard.lock().await;
        info!(request = ?request.position, value = %ctx.value, "Liquidity increase requested");

        let canonical = self
            .validator()
            .validate_increase(&ctx, &request)
            .await?;
        let committed = self
            .run(&ctx, Target::Increase { position_id: request.position_id }, &canonical)
            .await?;

        let receipt = IncreaseReceipt {
            position_id: request.position_id,
            liquidity_delta: committed.execution.liquidity,
            pair: canonical.pair,
            legs: committed.legs,
        };
        info!(liquidity_delta = receipt.liquidity_delta, "Liquidity increased");
        Ok(receipt)
    }

    fn validator(&self) -> RequestValidator<'_> {
        RequestValidator::new(&self.config, &self.collaborators)
    }

    /// Custody, approval, execution and settlement of a validated request.
    async fn run(
        &self,
        ctx: &CallContext,
        target: Target,
        request: &CanonicalRequest,
    ) -> Result<Committed, OrchestratorError> {
        let custody = CustodyManager::new(self.address, &self.collaborators);
        custody.preflight(ctx, request).await?;

        let mut journal = CompensationJournal::new(self.address, ctx.caller);
        let (holdings, execution) = match self
            .commit(ctx, target, request, &mut journal)
            .await
        {
            Ok(staged) => staged,
            Err(err) => return Err(self.unwind(journal, err).await),
        };
        journal.commit();

        let approvals =
            ApprovalBridge::new(self.address, self.config.position_manager, &self.collaborators);
        let settlement = SettlementHandler::new(self.address, &self.collaborators);
        let settled = settlement
            .settle(ctx.caller, &holdings, execution.used)
            .await;
        approvals
            .revoke_residual(&request.pair)
            .await;
        let legs = settled?;

        if let Err(violation) = execution.check_consumption(request, &legs) {
            warn!(
                position_id = %execution.position_id,
                %violation,
                "Position committed with consumption outside of the requested bounds"
            );
            return Err(OrchestratorError::SlippageExceeded(violation));
        }
        Ok(Committed { execution, legs })
    }

    /// The journaled part of a call: everything up to and including the position manager call.
    async fn commit(
        &self,
        ctx: &CallContext,
        target: Target,
        request: &CanonicalRequest,
        journal: &mut CompensationJournal,
    ) -> Result<([LegCustody; 2], Execution), OrchestratorError> {
        let holdings = CustodyManager::new(self.address, &self.collaborators)
            .take(ctx, request, journal)
            .await?;
        ApprovalBridge::new(self.address, self.config.position_manager, &self.collaborators)
            .grant(request, journal)
            .await?;
        let execution = ExecutionEngine::new(
            self.config.slippage_model,
            self.config.deadline_buffer(),
            &self.collaborators,
        )
        .execute(self.address, target, request)
        .await?;
        Ok((holdings, execution))
    }

    async fn unwind(
        &self,
        journal: CompensationJournal,
        cause: OrchestratorError,
    ) -> OrchestratorError {
        warn!(%cause, "Call failed, unwinding custody");
        let failures = journal.unwind(&self.collaborators).await;
        if failures.is_empty() {
            return cause;
        }
        error!(%cause, ?failures, "Unwinding left assets behind");
        OrchestratorError::RollbackFailed { cause: Box::new(cause), failures }
    }
}
