use tracing::{debug, warn};
use tycho_liquidity_common::{models::TokenPair, Address, U256};

use super::{
    journal::{Compensation, CompensationJournal},
    validator::CanonicalRequest,
    Collaborators,
};
use crate::errors::OrchestratorError;

/// Grants the position manager access to exactly the amounts about to be committed.
pub(crate) struct ApprovalBridge<'a> {
    orchestrator: Address,
    spender: Address,
    collaborators: &'a Collaborators,
}

impl<'a> ApprovalBridge<'a> {
    pub fn new(orchestrator: Address, spender: Address, collaborators: &'a Collaborators) -> Self {
        Self { orchestrator, spender, collaborators }
    }

    /// Approves every funded leg, on every call, regardless of what allowance is left over.
    pub async fn grant(
        &self,
        request: &CanonicalRequest,
        journal: &mut CompensationJournal,
    ) -> Result<(), OrchestratorError> {
        let assets = &self.collaborators.assets;
        for leg in request.funded_legs() {
            let token = request.token(leg);
            let amount = request.amount(leg);
            let approval_error = |reason: String| OrchestratorError::Approval {
                token,
                spender: self.spender,
                reason,
            };

            let previous = assets
                .allowance(token, self.orchestrator, self.spender)
                .await
                .map_err(|err| approval_error(err.to_string()))?;
            match assets
                .approve(token, self.orchestrator, self.spender, amount)
                .await
            {
                Ok(true) => {}
                Ok(false) => return Err(approval_error("approve returned false".to_string())),
                Err(err) => return Err(approval_error(err.to_string())),
            }
            journal.record(Compensation::RestoreAllowance {
                token,
                spender: self.spender,
                previous,
            });
            debug!(%leg, %token, %amount, "Position manager approved");
        }
        Ok(())
    }

    /// Resets whatever allowance the position manager did not consume back to zero.
    ///
    /// A failing revoke leaves an allowance over an empty balance, it is logged and skipped.
    pub async fn revoke_residual(&self, pair: &TokenPair) {
        let assets = &self.collaborators.assets;
        for token in [pair.token0, pair.token1] {
            let residual = match assets
                .allowance(token, self.orchestrator, self.spender)
                .await
            {
                Ok(residual) => residual,
                Err(err) => {
                    warn!(%token, %err, "Failed to read residual allowance");
                    continue;
                }
            };
            if residual.is_zero() {
                continue;
            }
            match assets
                .approve(token, self.orchestrator, self.spender, U256::ZERO)
                .await
            {
                Ok(true) => debug!(%token, %residual, "Residual allowance revoked"),
                Ok(false) => warn!(%token, %residual, "Revoking residual allowance was rejected"),
                Err(err) => warn!(%token, %residual, %err, "Failed to revoke residual allowance"),
            }
        }
    }
}
