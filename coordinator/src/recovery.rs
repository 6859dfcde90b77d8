//! Rebuilds projections from the durable log after a restart.
//!
//! Recovery folds every event in append order through
//! [`FunctionalCore::reduce`] alone. State machines must not run and no
//! new commands may be produced - replaying a past transaction's trigger
//! chain would re-run side effects (and, worse, could diverge from what
//! actually happened if a state machine's logic has since changed).

use txn_core::{FunctionalCore, OrderId};
use txn_lss::{LssError, LssReader};

/// Replays the entire durable log into `core`, starting from the bootstrap
/// record at order id 0. Call this once, before handing `core` to a
/// [`crate::Coordinator`].
///
/// # Errors
///
/// Propagates [`LssError`] if the underlying read fails.
#[tracing::instrument(skip(core, reader))]
pub async fn recover(core: &mut FunctionalCore, reader: &dyn LssReader) -> Result<(), LssError> {
    let events = reader.physical_read(OrderId::BOOTSTRAP).await?;
    let replayed = events.len();
    for event in &events {
        core.reduce(event);
    }
    // Recovery folds straight into live state; there is nothing to roll
    // back to, so bookkeeping is discarded rather than restored.
    core.discard_transaction_bookkeeping();
    tracing::info!(replayed, "recovery complete");
    Ok(())
}
