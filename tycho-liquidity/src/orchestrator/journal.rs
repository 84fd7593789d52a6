//! Compensating actions recorded while a call moves assets.
//!
//! Collaborators are plain contract calls without a shared transaction, so every movement
//! that has to be undone on failure is recorded here and replayed in reverse order.

use tracing::{debug, error};
use tycho_liquidity_common::{Address, U256};

use super::Collaborators;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Compensation {
    /// `amount` of `token` was pulled from the caller.
    ReturnToken { token: Address, amount: U256 },
    /// `amount` of native currency was received from the caller.
    ReturnNative { amount: U256 },
    /// `amount` of native currency was wrapped.
    Unwrap { amount: U256 },
    /// The allowance of `spender` over the orchestrator's `token` was changed from `previous`.
    RestoreAllowance { token: Address, spender: Address, previous: U256 },
}

impl Compensation {
    async fn apply(
        &self,
        orchestrator: Address,
        beneficiary: Address,
        collaborators: &Collaborators,
    ) -> Result<(), String> {
        match self {
            Compensation::ReturnToken { token, amount } => {
                match collaborators
                    .assets
                    .transfer(*token, orchestrator, beneficiary, *amount)
                    .await
                {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(format!("return of {amount} {token} was rejected")),
                    Err(err) => Err(format!("return of {amount} {token} failed: {err}")),
                }
            }
            Compensation::ReturnNative { amount } => collaborators
                .native
                .send(orchestrator, beneficiary, *amount)
                .await
                .map_err(|err| format!("return of {amount} native failed: {err}")),
            Compensation::Unwrap { amount } => collaborators
                .wrapped_native
                .withdraw(orchestrator, *amount)
                .await
                .map_err(|err| format!("unwrap of {amount} failed: {err}")),
            Compensation::RestoreAllowance { token, spender, previous } => {
                match collaborators
                    .assets
                    .approve(*token, orchestrator, *spender, *previous)
                    .await
                {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(format!("restoring allowance of {token} was rejected")),
                    Err(err) => Err(format!("restoring allowance of {token} failed: {err}")),
                }
            }
        }
    }
}

/// Journal of a single orchestrator call.
#[derive(Debug)]
pub(crate) struct CompensationJournal {
    orchestrator: Address,
    beneficiary: Address,
    entries: Vec<Compensation>,
}

impl CompensationJournal {
    pub fn new(orchestrator: Address, beneficiary: Address) -> Self {
        Self { orchestrator, beneficiary, entries: Vec::new() }
    }

    pub fn record(&mut self, compensation: Compensation) {
        debug!(?compensation, "Recorded compensation");
        self.entries.push(compensation);
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[Compensation] {
        &self.entries
    }

    /// Drops all entries once the position manager committed the assets.
    pub fn commit(self) {
        debug!(entries = self.entries.len(), "Journal committed");
    }

    /// Applies every compensation in reverse order.
    ///
    /// Unwinding does not stop at the first failure, the remaining entries are still applied.
    /// Returns a description of each compensation that could not be applied.
    pub async fn unwind(self, collaborators: &Collaborators) -> Vec<String> {
        let mut failures = Vec::new();
        for compensation in self.entries.into_iter().rev() {
            if let Err(failure) = compensation
                .apply(self.orchestrator, self.beneficiary, collaborators)
                .await
            {
                error!(?compensation, %failure, "Compensation failed");
                failures.push(failure);
            }
        }
        failures
    }
}
