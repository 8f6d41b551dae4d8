use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::{Order, OrderStatus};
use crate::domain::returns::{ReturnRequest, ReturnStatus};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

// ============================================================================
// Storage - transactional unit of work over orders, returns and stock
// ============================================================================
//
// Every engine operation opens one `StoreTx`, does all of its reads and
// writes through it and commits once. Dropping a transaction without
// committing discards everything it wrote.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Order {0} already has an active return")]
    DuplicateActiveReturn(Uuid),

    #[error("Idempotency key already used by order {0}")]
    DuplicateIdempotencyKey(Uuid),

    #[error("{entity} {id} was modified concurrently (expected version {expected})")]
    VersionConflict {
        entity: &'static str,
        id: Uuid,
        expected: i64,
    },

    #[error("Unknown product {0}")]
    UnknownProduct(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved { remaining: i64 },
    Insufficient { available: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: Uuid,
    pub stock: i64,
    pub in_stock: bool,
}

impl StockLevel {
    pub fn new(product_id: Uuid, stock: i64) -> Self {
        Self {
            product_id,
            stock,
            in_stock: stock > 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u32,
    pub limit: u32,
}

impl Page {
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: u32, limit: u32) -> Self {
        let limit = limit.clamp(1, Self::MAX_LIMIT);
        Self {
            offset: page.max(1).saturating_sub(1).saturating_mul(limit),
            limit,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

/// Orders come back newest first.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub user_id: Option<Uuid>,
    /// Orders with at least one line sold by this seller
    pub seller_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub page: Page,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.user_id.map_or(true, |user| order.user_id == user)
            && self.seller_id.map_or(true, |seller| order.has_seller(seller))
            && self.status.map_or(true, |status| order.status == status)
    }
}

/// Returns come back newest first.
#[derive(Debug, Clone, Default)]
pub struct ReturnFilter {
    pub user_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub status: Option<ReturnStatus>,
    pub page: Page,
}

impl ReturnFilter {
    pub fn matches(&self, ret: &ReturnRequest) -> bool {
        self.user_id.map_or(true, |user| ret.user_id == user)
            && self.order_id.map_or(true, |order| ret.order_id == order)
            && self.status.map_or(true, |status| ret.status == status)
    }
}

#[async_trait]
pub trait CommerceStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError>;
    async fn get_return(&self, return_id: Uuid) -> Result<Option<ReturnRequest>, StoreError>;
    async fn list_returns(&self, filter: &ReturnFilter) -> Result<Vec<ReturnRequest>, StoreError>;
    async fn stock_level(&self, product_id: Uuid) -> Result<Option<StockLevel>, StoreError>;

    /// Administrative stock count, outside any checkout
    async fn set_stock(&self, product_id: Uuid, stock: i64) -> Result<StockLevel, StoreError>;
}

#[async_trait]
pub trait StoreTx: Send {
    /// Decrement stock by `quantity` only if at least that much is left.
    async fn try_reserve(&mut self, product_id: Uuid, quantity: u32) -> Result<ReserveOutcome, StoreError>;

    /// Put `quantity` units back; returns the new stock count.
    async fn release(&mut self, product_id: Uuid, quantity: u32) -> Result<i64, StoreError>;

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;

    /// Load an order for update; other writers wait until this transaction ends.
    async fn load_order(&mut self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn save_order(&mut self, order: &Order, expected_version: i64) -> Result<(), StoreError>;

    async fn find_order_by_idempotency_key(
        &mut self,
        user_id: Uuid,
        key: &str,
    ) -> Result<Option<Order>, StoreError>;

    /// Fails with `DuplicateActiveReturn` if the order already has a
    /// non-terminal return.
    async fn insert_return(&mut self, ret: &ReturnRequest) -> Result<(), StoreError>;

    async fn load_return(&mut self, return_id: Uuid) -> Result<Option<ReturnRequest>, StoreError>;

    async fn save_return(&mut self, ret: &ReturnRequest, expected_version: i64) -> Result<(), StoreError>;

    async fn returns_for_order(&mut self, order_id: Uuid) -> Result<Vec<ReturnRequest>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds() {
        assert_eq!(Page::new(0, 0), Page { offset: 0, limit: 1 });
        assert_eq!(Page::new(3, 10), Page { offset: 20, limit: 10 });
        assert_eq!(Page::new(1, 1000).limit, Page::MAX_LIMIT);
    }

    #[test]
    fn test_huge_page_number_saturates() {
        let page = Page::new(u32::MAX, 100);
        assert_eq!(page.offset, u32::MAX);
        assert_eq!(page.limit, 100);
    }

    #[test]
    fn test_stock_level_derives_in_stock() {
        assert!(StockLevel::new(Uuid::new_v4(), 1).in_stock);
        assert!(!StockLevel::new(Uuid::new_v4(), 0).in_stock);
    }
}
