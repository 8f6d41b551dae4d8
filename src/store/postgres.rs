use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::*;

// ============================================================================
// Postgres Store
// ============================================================================
//
// Orders and returns are JSONB documents with their queryable fields
// (status, version, owner, sellers) lifted into columns.
// - Reservations are a single conditional UPDATE on product_stock
// - load_* take row locks (SELECT ... FOR UPDATE)
// - A partial unique index allows one non-terminal return per order
//
// ============================================================================

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS product_stock (
        product_id UUID PRIMARY KEY,
        stock BIGINT NOT NULL CHECK (stock >= 0),
        in_stock BOOLEAN NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL,
        status TEXT NOT NULL,
        version BIGINT NOT NULL,
        idempotency_key TEXT,
        seller_ids UUID[] NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        document JSONB NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS orders_user_created ON orders (user_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS orders_sellers ON orders USING GIN (seller_ids)",
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS orders_user_idempotency
        ON orders (user_id, idempotency_key) WHERE idempotency_key IS NOT NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS returns (
        id UUID PRIMARY KEY,
        order_id UUID NOT NULL REFERENCES orders (id),
        user_id UUID NOT NULL,
        status TEXT NOT NULL,
        version BIGINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        document JSONB NOT NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS returns_one_active_per_order
        ON returns (order_id) WHERE status NOT IN ('refund_completed', 'rejected', 'cancelled')
    "#,
];

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Order engine schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn seller_ids(order: &Order) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = order.items.iter().map(|item| item.seller_id).collect();
    ids.sort();
    ids.dedup();
    ids
}

#[async_trait]
impl CommerceStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let order = sqlx::query_scalar::<_, Json<Order>>("SELECT document FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order.map(|Json(order)| order))
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT document FROM orders WHERE 1=1");

        if let Some(user_id) = filter.user_id {
            query_builder.push(" AND user_id = ");
            query_builder.push_bind(user_id);
        }
        if let Some(seller_id) = filter.seller_id {
            query_builder.push(" AND ");
            query_builder.push_bind(seller_id);
            query_builder.push(" = ANY(seller_ids)");
        }
        if let Some(status) = filter.status {
            query_builder.push(" AND status = ");
            query_builder.push_bind(status.as_str());
        }

        query_builder.push(" ORDER BY created_at DESC LIMIT ");
        query_builder.push_bind(i64::from(filter.page.limit));
        query_builder.push(" OFFSET ");
        query_builder.push_bind(i64::from(filter.page.offset));

        let orders = query_builder
            .build_query_scalar::<Json<Order>>()
            .fetch_all(&self.pool)
            .await?;
        Ok(orders.into_iter().map(|Json(order)| order).collect())
    }

    async fn get_return(&self, return_id: Uuid) -> Result<Option<ReturnRequest>, StoreError> {
        let ret = sqlx::query_scalar::<_, Json<ReturnRequest>>("SELECT document FROM returns WHERE id = $1")
            .bind(return_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ret.map(|Json(ret)| ret))
    }

    async fn list_returns(&self, filter: &ReturnFilter) -> Result<Vec<ReturnRequest>, StoreError> {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT document FROM returns WHERE 1=1");

        if let Some(user_id) = filter.user_id {
            query_builder.push(" AND user_id = ");
            query_builder.push_bind(user_id);
        }
        if let Some(order_id) = filter.order_id {
            query_builder.push(" AND order_id = ");
            query_builder.push_bind(order_id);
        }
        if let Some(status) = filter.status {
            query_builder.push(" AND status = ");
            query_builder.push_bind(status.as_str());
        }

        query_builder.push(" ORDER BY created_at DESC LIMIT ");
        query_builder.push_bind(i64::from(filter.page.limit));
        query_builder.push(" OFFSET ");
        query_builder.push_bind(i64::from(filter.page.offset));

        let returns = query_builder
            .build_query_scalar::<Json<ReturnRequest>>()
            .fetch_all(&self.pool)
            .await?;
        Ok(returns.into_iter().map(|Json(ret)| ret).collect())
    }

    async fn stock_level(&self, product_id: Uuid) -> Result<Option<StockLevel>, StoreError> {
        let stock = sqlx::query_scalar::<_, i64>("SELECT stock FROM product_stock WHERE product_id = $1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(stock.map(|stock| StockLevel::new(product_id, stock)))
    }

    async fn set_stock(&self, product_id: Uuid, stock: i64) -> Result<StockLevel, StoreError> {
        let stock = stock.max(0);
        sqlx::query(
            r#"
            INSERT INTO product_stock (product_id, stock, in_stock, updated_at)
            VALUES ($1, $2, $2 > 0, now())
            ON CONFLICT (product_id)
            DO UPDATE SET stock = EXCLUDED.stock, in_stock = EXCLUDED.in_stock, updated_at = now()
            "#,
        )
        .bind(product_id)
        .bind(stock)
        .execute(&self.pool)
        .await?;
        Ok(StockLevel::new(product_id, stock))
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn try_reserve(&mut self, product_id: Uuid, quantity: u32) -> Result<ReserveOutcome, StoreError> {
        let quantity = i64::from(quantity);
        let remaining = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE product_stock
            SET stock = stock - $2, in_stock = stock - $2 > 0, updated_at = now()
            WHERE product_id = $1 AND stock >= $2
            RETURNING stock
            "#,
        )
        .bind(product_id)
        .bind(quantity)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(remaining) = remaining {
            return Ok(ReserveOutcome::Reserved { remaining });
        }

        let available = sqlx::query_scalar::<_, i64>("SELECT stock FROM product_stock WHERE product_id = $1")
            .bind(product_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .unwrap_or(0);
        Ok(ReserveOutcome::Insufficient { available })
    }

    async fn release(&mut self, product_id: Uuid, quantity: u32) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE product_stock
            SET stock = stock + $2, in_stock = stock + $2 > 0, updated_at = now()
            WHERE product_id = $1
            RETURNING stock
            "#,
        )
        .bind(product_id)
        .bind(i64::from(quantity))
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(StoreError::UnknownProduct(product_id))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let inserted = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO orders (id, user_id, status, version, idempotency_key, seller_ids, created_at, document)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, idempotency_key) WHERE idempotency_key IS NOT NULL DO NOTHING
            RETURNING id
            "#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.status.as_str())
        .bind(order.version)
        .bind(order.idempotency_key.as_deref())
        .bind(seller_ids(order))
        .bind(order.created_at)
        .bind(Json(order))
        .fetch_optional(&mut *self.tx)
        .await?;

        if inserted.is_some() {
            return Ok(());
        }

        let key = order.idempotency_key.as_deref().unwrap_or_default();
        let existing = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM orders WHERE user_id = $1 AND idempotency_key = $2",
        )
        .bind(order.user_id)
        .bind(key)
        .fetch_one(&mut *self.tx)
        .await?;
        Err(StoreError::DuplicateIdempotencyKey(existing))
    }

    async fn load_order(&mut self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let order = sqlx::query_scalar::<_, Json<Order>>("SELECT document FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(order.map(|Json(order)| order))
    }

    async fn save_order(&mut self, order: &Order, expected_version: i64) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET status = $2, version = $3, document = $4
            WHERE id = $1 AND version = $5
            "#,
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(order.version)
        .bind(Json(order))
        .bind(expected_version)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::VersionConflict {
                entity: "Order",
                id: order.id,
                expected: expected_version,
            });
        }
        Ok(())
    }

    async fn find_order_by_idempotency_key(
        &mut self,
        user_id: Uuid,
        key: &str,
    ) -> Result<Option<Order>, StoreError> {
        let order = sqlx::query_scalar::<_, Json<Order>>(
            "SELECT document FROM orders WHERE user_id = $1 AND idempotency_key = $2",
        )
        .bind(user_id)
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(order.map(|Json(order)| order))
    }

    async fn insert_return(&mut self, ret: &ReturnRequest) -> Result<(), StoreError> {
        let inserted = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO returns (id, order_id, user_id, status, version, created_at, document)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (order_id) WHERE status NOT IN ('refund_completed', 'rejected', 'cancelled')
            DO NOTHING
            RETURNING id
            "#,
        )
        .bind(ret.id)
        .bind(ret.order_id)
        .bind(ret.user_id)
        .bind(ret.status.as_str())
        .bind(ret.version)
        .bind(ret.created_at)
        .bind(Json(ret))
        .fetch_optional(&mut *self.tx)
        .await?;

        match inserted {
            Some(_) => Ok(()),
            None => Err(StoreError::DuplicateActiveReturn(ret.order_id)),
        }
    }

    async fn load_return(&mut self, return_id: Uuid) -> Result<Option<ReturnRequest>, StoreError> {
        let ret = sqlx::query_scalar::<_, Json<ReturnRequest>>(
            "SELECT document FROM returns WHERE id = $1 FOR UPDATE",
        )
        .bind(return_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(ret.map(|Json(ret)| ret))
    }

    async fn save_return(&mut self, ret: &ReturnRequest, expected_version: i64) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE returns SET status = $2, version = $3, document = $4
            WHERE id = $1 AND version = $5
            "#,
        )
        .bind(ret.id)
        .bind(ret.status.as_str())
        .bind(ret.version)
        .bind(Json(ret))
        .bind(expected_version)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::VersionConflict {
                entity: "Return",
                id: ret.id,
                expected: expected_version,
            });
        }
        Ok(())
    }

    async fn returns_for_order(&mut self, order_id: Uuid) -> Result<Vec<ReturnRequest>, StoreError> {
        let returns = sqlx::query_scalar::<_, Json<ReturnRequest>>(
            "SELECT document FROM returns WHERE order_id = $1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(returns.into_iter().map(|Json(ret)| ret).collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
