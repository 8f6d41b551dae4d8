use std::sync::Arc;
use uuid::Uuid;

use crate::error::{EngineError, StockShortfall};
use crate::metrics::Metrics;
use crate::store::{ReserveOutcome, StoreTx};

// ============================================================================
// Inventory Ledger - stock reservation and release
// ============================================================================
//
// Reservations are a single conditional decrement at the storage layer. They
// belong to the caller's transaction: if it is dropped or rolled back, every
// reservation taken through it is undone with it.
//
// ============================================================================

#[derive(Clone)]
pub struct InventoryLedger {
    metrics: Arc<Metrics>,
}

impl InventoryLedger {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }

    /// Reserve `quantity` units, returning what is left.
    pub async fn reserve(
        &self,
        tx: &mut dyn StoreTx,
        product_id: Uuid,
        quantity: u32,
    ) -> Result<i64, EngineError> {
        match self.try_reserve(tx, product_id, quantity).await? {
            Ok(remaining) => Ok(remaining),
            Err(shortfall) => {
                self.metrics.stock_reservation_failures.inc();
                Err(EngineError::InsufficientStock(vec![shortfall]))
            }
        }
    }

    /// Reserve every line. All shortfalls are reported together; the caller
    /// abandons the transaction on error.
    pub async fn reserve_lines(
        &self,
        tx: &mut dyn StoreTx,
        lines: &[(Uuid, u32)],
    ) -> Result<(), EngineError> {
        let mut shortfalls = Vec::new();

        for (product_id, quantity) in in_lock_order(lines) {
            if let Err(shortfall) = self.try_reserve(tx, product_id, quantity).await? {
                shortfalls.push(shortfall);
            }
        }

        if shortfalls.is_empty() {
            return Ok(());
        }

        self.metrics.stock_reservation_failures.inc();
        tracing::info!(lines = shortfalls.len(), "Reservation failed, checkout aborted");
        Err(EngineError::InsufficientStock(shortfalls))
    }

    /// Return units to stock. Each release must match an earlier reservation.
    pub async fn release(
        &self,
        tx: &mut dyn StoreTx,
        product_id: Uuid,
        quantity: u32,
    ) -> Result<i64, EngineError> {
        let stock = tx.release(product_id, quantity).await?;
        tracing::debug!(%product_id, quantity, stock, "Stock released");
        Ok(stock)
    }

    pub async fn release_lines(&self, tx: &mut dyn StoreTx, lines: &[(Uuid, u32)]) -> Result<(), EngineError> {
        for (product_id, quantity) in in_lock_order(lines) {
            self.release(tx, product_id, quantity).await?;
        }
        Ok(())
    }

    async fn try_reserve(
        &self,
        tx: &mut dyn StoreTx,
        product_id: Uuid,
        quantity: u32,
    ) -> Result<Result<i64, StockShortfall>, EngineError> {
        if quantity == 0 {
            return Err(EngineError::Validation(format!(
                "quantity for product {} must be positive",
                product_id
            )));
        }

        match tx.try_reserve(product_id, quantity).await? {
            ReserveOutcome::Reserved { remaining } => {
                tracing::debug!(%product_id, quantity, remaining, "Stock reserved");
                Ok(Ok(remaining))
            }
            ReserveOutcome::Insufficient { available } => Ok(Err(StockShortfall {
                product_id,
                requested: quantity,
                available,
            })),
        }
    }
}

/// Stock rows are always touched in product id order so that concurrent
/// transactions over overlapping carts cannot deadlock.
fn in_lock_order(lines: &[(Uuid, u32)]) -> Vec<(Uuid, u32)> {
    let mut ordered = lines.to_vec();
    ordered.sort_by_key(|(product_id, _)| *product_id);
    ordered
}
