//! Checkpointing a [`CarbonMarket`] into a [`SnapshotDb`] and resuming it.

use carbon_ledger::storage::StateRoot;
use carbon_ledger::{Clock, MarketConfig, PaymentGateway, SnapshotDb, StorageError};
use thiserror::Error;
use tracing::info;

use crate::engine::{CarbonMarket, LedgerSnapshot};
use crate::error::MarketError;

/// Failure while writing or reading a checkpoint.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The snapshot store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The stored snapshot could not be restored.
    #[error("snapshot rejected: {0}")]
    Restore(#[from] MarketError),
}

impl<P: PaymentGateway, C: Clock> CarbonMarket<P, C> {
    /// Writes the current state under `sequence` and returns its state root.
    ///
    /// Sequences must strictly increase per store.
    pub fn checkpoint(&self, db: &SnapshotDb, sequence: u64) -> Result<StateRoot, PersistError> {
        let root = self.state_root()?;
        db.save(sequence, &self.snapshot())?;
        info!(sequence, state_root = %root, "checkpoint written");
        Ok(root)
    }

    /// Restores the newest checkpoint in `db`. `Ok(None)` if the store is
    /// empty.
    pub fn resume(
        db: &SnapshotDb,
        config: MarketConfig,
        payments: P,
        clock: C,
    ) -> Result<Option<(u64, Self)>, PersistError> {
        let Some((sequence, snapshot)) = db.load_latest::<LedgerSnapshot>()? else {
            return Ok(None);
        };
        let market = Self::restore(snapshot, config, payments, clock)?;
        info!(sequence, "resumed from checkpoint");
        Ok(Some((sequence, market)))
    }
}
