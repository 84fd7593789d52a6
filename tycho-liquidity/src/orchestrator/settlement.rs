use tracing::{debug, error};
use tycho_liquidity_common::{
    models::{ContractError, Leg},
    Address, U256,
};

use super::{
    custody::{Funding, LegCustody},
    Collaborators,
};
use crate::errors::OrchestratorError;

/// Final accounting of one leg of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegSettlement {
    pub token: Address,
    /// Amount taken into custody.
    pub pulled: U256,
    /// Amount committed to the position.
    pub used: U256,
    /// Amount returned to the caller.
    pub refunded: U256,
    pub funding: Funding,
}

pub(crate) struct SettlementHandler<'a> {
    orchestrator: Address,
    collaborators: &'a Collaborators,
}

impl<'a> SettlementHandler<'a> {
    pub fn new(orchestrator: Address, collaborators: &'a Collaborators) -> Self {
        Self { orchestrator, collaborators }
    }

    /// Returns `pulled - used` of every leg to `recipient`, in the form it was supplied.
    ///
    /// Both legs are attempted even if one refund fails, the first failure is returned.
    pub async fn settle(
        &self,
        recipient: Address,
        holdings: &[LegCustody; 2],
        used: [U256; 2],
    ) -> Result<[LegSettlement; 2], OrchestratorError> {
        let (leg0, failure0) = self
            .settle_leg(Leg::Token0, recipient, &holdings[0], used[0])
            .await;
        let (leg1, failure1) = self
            .settle_leg(Leg::Token1, recipient, &holdings[1], used[1])
            .await;
        match failure0.or(failure1) {
            Some(err) => Err(err),
            None => Ok([leg0, leg1]),
        }
    }

    async fn settle_leg(
        &self,
        leg: Leg,
        recipient: Address,
        custody: &LegCustody,
        used: U256,
    ) -> (LegSettlement, Option<OrchestratorError>) {
        // Overconsumption is reported by the caller, there is nothing left to refund then.
        let used = used.min(custody.amount);
        let leftover = custody.amount - used;

        let (refunded, failure) = match self.refund(recipient, custody, leftover).await {
            Ok(()) => (leftover, None),
            Err(source) => {
                error!(%leg, token = %custody.token, %leftover, %source, "Refund failed");
                let failure = OrchestratorError::Settlement {
                    token: custody.token,
                    recipient,
                    amount: leftover,
                    source,
                };
                (U256::ZERO, Some(failure))
            }
        };
        let settlement = LegSettlement {
            token: custody.token,
            pulled: custody.amount,
            used,
            refunded,
            funding: custody.funding,
        };
        (settlement, failure)
    }

    async fn refund(
        &self,
        recipient: Address,
        custody: &LegCustody,
        leftover: U256,
    ) -> Result<(), ContractError> {
        if leftover.is_zero() {
            return Ok(());
        }
        match custody.funding {
            Funding::Native => {
                self.collaborators
                    .wrapped_native
                    .withdraw(self.orchestrator, leftover)
                    .await?;
                self.collaborators
                    .native
                    .send(self.orchestrator, recipient, leftover)
                    .await?;
            }
            Funding::Token => {
                let sent = self
                    .collaborators
                    .assets
                    .transfer(custody.token, self.orchestrator, recipient, leftover)
                    .await?;
                if !sent {
                    return Err(ContractError::reverted("transfer returned false"));
                }
            }
        }
        debug!(token = %custody.token, %leftover, funding = ?custody.funding, "Leftover refunded");
        Ok(())
    }
}
