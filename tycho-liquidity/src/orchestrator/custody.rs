use tracing::debug;
use tycho_liquidity_common::{
    models::{CallContext, Leg},
    Address, U256,
};

use super::{
    journal::{Compensation, CompensationJournal},
    validator::CanonicalRequest,
    Collaborators,
};
use crate::errors::{CustodyFailure, OrchestratorError};

/// How a leg came into custody, which is also how its leftover is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Funding {
    /// Pulled from the caller's token balance.
    Token,
    /// Attached as native currency and wrapped.
    Native,
}

/// Holdings of one leg taken from the caller during a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LegCustody {
    pub token: Address,
    pub amount: U256,
    pub funding: Funding,
}

pub(crate) struct CustodyManager<'a> {
    orchestrator: Address,
    collaborators: &'a Collaborators,
}

impl<'a> CustodyManager<'a> {
    pub fn new(orchestrator: Address, collaborators: &'a Collaborators) -> Self {
        Self { orchestrator, collaborators }
    }

    /// Read only check that every leg can be taken into custody.
    ///
    /// Runs before anything moves, so a failure here leaves balances and allowances untouched.
    pub async fn preflight(
        &self,
        ctx: &CallContext,
        request: &CanonicalRequest,
    ) -> Result<(), OrchestratorError> {
        for leg in request.funded_legs() {
            let token = request.token(leg);
            let required = request.amount(leg);
            let custody_error =
                |reason: CustodyFailure| OrchestratorError::Custody { leg, token, reason };

            if request.native_leg == Some(leg) {
                let available = self
                    .collaborators
                    .native
                    .native_balance(ctx.caller)
                    .await
                    .map_err(|err| custody_error(err.into()))?;
                if available < required {
                    return Err(custody_error(CustodyFailure::InsufficientBalance {
                        available,
                        required,
                    }));
                }
                continue;
            }

            let assets = &self.collaborators.assets;
            let allowance = assets
                .allowance(token, ctx.caller, self.orchestrator)
                .await
                .map_err(|err| custody_error(err.into()))?;
            if allowance < required {
                return Err(custody_error(CustodyFailure::InsufficientAllowance {
                    available: allowance,
                    required,
                }));
            }
            let balance = assets
                .balance_of(token, ctx.caller)
                .await
                .map_err(|err| custody_error(err.into()))?;
            if balance < required {
                return Err(custody_error(CustodyFailure::InsufficientBalance {
                    available: balance,
                    required,
                }));
            }
        }
        Ok(())
    }

    /// Takes both legs into custody, recording how to give each back.
    pub async fn take(
        &self,
        ctx: &CallContext,
        request: &CanonicalRequest,
        journal: &mut CompensationJournal,
    ) -> Result<[LegCustody; 2], OrchestratorError> {
        let mut holdings = Leg::BOTH.map(|leg| LegCustody {
            token: request.token(leg),
            amount: U256::ZERO,
            funding: if request.native_leg == Some(leg) { Funding::Native } else { Funding::Token },
        });

        for leg in request.funded_legs() {
            let token = request.token(leg);
            let amount = request.amount(leg);
            let funding = holdings[leg.index()].funding;
            let custody_error =
                |reason: CustodyFailure| OrchestratorError::Custody { leg, token, reason };

            match funding {
                Funding::Native => {
                    self.collaborators
                        .native
                        .send(ctx.caller, self.orchestrator, amount)
                        .await
                        .map_err(|err| custody_error(err.into()))?;
                    journal.record(Compensation::ReturnNative { amount });

                    self.collaborators
                        .wrapped_native
                        .deposit(self.orchestrator, amount)
                        .await
                        .map_err(|err| custody_error(err.into()))?;
                    journal.record(Compensation::Unwrap { amount });
                }
                Funding::Token => {
                    let pulled = self
                        .collaborators
                        .assets
                        .transfer_from(
                            token,
                            self.orchestrator,
                            ctx.caller,
                            self.orchestrator,
                            amount,
                        )
                        .await;
                    match pulled {
                        Ok(true) => {}
                        Ok(false) => return Err(custody_error(CustodyFailure::TransferRejected)),
                        Err(err) => return Err(custody_error(err.into())),
                    }
                    journal.record(Compensation::ReturnToken { token, amount });
                }
            }
            debug!(%leg, %token, %amount, ?funding, "Leg in custody");
            holdings[leg.index()].amount = amount;
        }
        Ok(holdings)
    }
}
