use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::*;

// ============================================================================
// Memory Store - whole-state unit of work behind one async mutex
// ============================================================================
//
// A transaction holds the lock for its lifetime and writes to a private
// copy of the state; commit swaps the copy in. The active-return index is
// the one-active-return-per-order constraint.
//
// ============================================================================

#[derive(Debug, Clone, Default)]
struct MemoryState {
    stock: HashMap<Uuid, i64>,
    orders: HashMap<Uuid, Order>,
    returns: HashMap<Uuid, ReturnRequest>,
    /// order id -> non-terminal return id
    active_returns: HashMap<Uuid, Uuid>,
    idempotency: HashMap<(Uuid, String), Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page<T: Clone>(mut items: Vec<T>, page: &Page, newest_first: impl Fn(&T, &T) -> std::cmp::Ordering) -> Vec<T> {
    items.sort_by(newest_first);
    items
        .into_iter()
        .skip(page.offset as usize)
        .take(page.limit as usize)
        .collect()
}

#[async_trait]
impl CommerceStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.state.lock().await.orders.get(&order_id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let state = self.state.lock().await;
        let matching = state.orders.values().filter(|o| filter.matches(o)).cloned().collect();
        Ok(page(matching, &filter.page, |a, b| b.created_at.cmp(&a.created_at)))
    }

    async fn get_return(&self, return_id: Uuid) -> Result<Option<ReturnRequest>, StoreError> {
        Ok(self.state.lock().await.returns.get(&return_id).cloned())
    }

    async fn list_returns(&self, filter: &ReturnFilter) -> Result<Vec<ReturnRequest>, StoreError> {
        let state = self.state.lock().await;
        let matching = state.returns.values().filter(|r| filter.matches(r)).cloned().collect();
        Ok(page(matching, &filter.page, |a, b| b.created_at.cmp(&a.created_at)))
    }

    async fn stock_level(&self, product_id: Uuid) -> Result<Option<StockLevel>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.stock.get(&product_id).map(|stock| StockLevel::new(product_id, *stock)))
    }

    async fn set_stock(&self, product_id: Uuid, stock: i64) -> Result<StockLevel, StoreError> {
        let stock = stock.max(0);
        self.state.lock().await.stock.insert(product_id, stock);
        Ok(StockLevel::new(product_id, stock))
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn try_reserve(&mut self, product_id: Uuid, quantity: u32) -> Result<ReserveOutcome, StoreError> {
        let Some(stock) = self.working.stock.get_mut(&product_id) else {
            return Ok(ReserveOutcome::Insufficient { available: 0 });
        };

        let quantity = i64::from(quantity);
        if *stock >= quantity {
            *stock -= quantity;
            Ok(ReserveOutcome::Reserved { remaining: *stock })
        } else {
            Ok(ReserveOutcome::Insufficient { available: *stock })
        }
    }

    async fn release(&mut self, product_id: Uuid, quantity: u32) -> Result<i64, StoreError> {
        let stock = self
            .working
            .stock
            .get_mut(&product_id)
            .ok_or(StoreError::UnknownProduct(product_id))?;
        *stock += i64::from(quantity);
        Ok(*stock)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        if let Some(key) = &order.idempotency_key {
            let slot = (order.user_id, key.clone());
            if let Some(existing) = self.working.idempotency.get(&slot) {
                return Err(StoreError::DuplicateIdempotencyKey(*existing));
            }
            self.working.idempotency.insert(slot, order.id);
        }
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn load_order(&mut self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.working.orders.get(&order_id).cloned())
    }

    async fn save_order(&mut self, order: &Order, expected_version: i64) -> Result<(), StoreError> {
        match self.working.orders.get(&order.id) {
            Some(stored) if stored.version == expected_version => {
                self.working.orders.insert(order.id, order.clone());
                Ok(())
            }
            _ => Err(StoreError::VersionConflict {
                entity: "Order",
                id: order.id,
                expected: expected_version,
            }),
        }
    }

    async fn find_order_by_idempotency_key(
        &mut self,
        user_id: Uuid,
        key: &str,
    ) -> Result<Option<Order>, StoreError> {
        let existing = self
            .working
            .idempotency
            .get(&(user_id, key.to_string()))
            .and_then(|id| self.working.orders.get(id))
            .cloned();
        Ok(existing)
    }

    async fn insert_return(&mut self, ret: &ReturnRequest) -> Result<(), StoreError> {
        if !ret.status.is_terminal() {
            if self.working.active_returns.contains_key(&ret.order_id) {
                return Err(StoreError::DuplicateActiveReturn(ret.order_id));
            }
            self.working.active_returns.insert(ret.order_id, ret.id);
        }
        self.working.returns.insert(ret.id, ret.clone());
        Ok(())
    }

    async fn load_return(&mut self, return_id: Uuid) -> Result<Option<ReturnRequest>, StoreError> {
        Ok(self.working.returns.get(&return_id).cloned())
    }

    async fn save_return(&mut self, ret: &ReturnRequest, expected_version: i64) -> Result<(), StoreError> {
        match self.working.returns.get(&ret.id) {
            Some(stored) if stored.version == expected_version => {}
            _ => {
                return Err(StoreError::VersionConflict {
                    entity: "Return",
                    id: ret.id,
                    expected: expected_version,
                })
            }
        }

        if ret.status.is_terminal() && self.working.active_returns.get(&ret.order_id) == Some(&ret.id) {
            self.working.active_returns.remove(&ret.order_id);
        }
        self.working.returns.insert(ret.id, ret.clone());
        Ok(())
    }

    async fn returns_for_order(&mut self, order_id: Uuid) -> Result<Vec<ReturnRequest>, StoreError> {
        Ok(self
            .working
            .returns
            .values()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
