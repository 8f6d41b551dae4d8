use std::sync::Arc;
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::collaborators::{
    CartLine, CartProvider, CatalogProvider, CollaboratorGuard, StatusNotification,
};
use crate::dispatch::publishable;
use crate::domain::refund::RefundSource;
use crate::domain::{Actor, Address};
use crate::engine::EngineContext;
use crate::error::EngineError;
use crate::store::{OrderFilter, Page, StoreError, StoreTx};
use super::aggregate::Order;
use super::commands::OrderCommand;
use super::events::{OrderEvent, OrderPlaced};
use super::invoice::InvoiceView;
use super::numbering;
use super::value_objects::*;

// ============================================================================
// Order Lifecycle Manager
// ============================================================================
//
// Checkout, fulfillment transitions, cancellation and invoicing. Each
// operation runs in one store transaction; notifications and audit events
// go out only after it commits.
//
// ============================================================================

pub const ORDER_TOPIC: &str = "orders";

/// Everything checkout needs besides the cart itself.
#[derive(Debug, Clone)]
pub struct PlaceOrderInput {
    pub customer: CustomerContact,
    pub shipping_address: Address,
    /// Defaults to the shipping address
    pub billing_address: Option<Address>,
    pub payment_method: String,
    pub shipping_method: ShippingMethod,
    pub discount_code: Option<String>,
    /// Repeating a checkout with the same key returns the original order
    pub idempotency_key: Option<String>,
}

pub struct OrderLifecycleManager {
    ctx: EngineContext,
    carts: Arc<dyn CartProvider>,
    catalog: Arc<dyn CatalogProvider>,
    cart_guard: CollaboratorGuard,
    catalog_guard: CollaboratorGuard,
}

impl OrderLifecycleManager {
    pub fn new(
        ctx: EngineContext,
        carts: Arc<dyn CartProvider>,
        catalog: Arc<dyn CatalogProvider>,
        cart_guard: CollaboratorGuard,
        catalog_guard: CollaboratorGuard,
    ) -> Self {
        Self {
            ctx,
            carts,
            catalog,
            cart_guard,
            catalog_guard,
        }
    }

    // ========================================================================
    // Checkout
    // ========================================================================

    pub async fn create_order_from_cart(
        &self,
        user_id: Uuid,
        input: PlaceOrderInput,
    ) -> Result<Order, EngineError> {
        let timer = self.ctx.metrics.order_creation_duration.start_timer();
        validate_input(&input)?;

        if let Some(key) = &input.idempotency_key {
            let mut tx = self.ctx.store.begin().await?;
            if let Some(existing) = tx.find_order_by_idempotency_key(user_id, key).await? {
                tracing::info!(order_id = %existing.id, %user_id, "Checkout repeated, returning existing order");
                return Ok(existing);
            }
        }

        let cart = self
            .cart_guard
            .call(self.carts.get_cart(user_id))
            .await
            .map_err(EngineError::external("cart provider"))?;

        if cart.items.is_empty() {
            return Err(EngineError::Validation("cart is empty".to_string()));
        }
        if let Some(line) = cart.items.iter().find(|line| line.quantity == 0) {
            return Err(EngineError::Validation(format!(
                "quantity for product {} must be positive",
                line.product_id
            )));
        }
        let expected = Order::expected_total(cart.subtotal, cart.discount_amount, cart.shipping_cost, cart.tax_amount);
        if cart.final_amount != expected {
            return Err(EngineError::Validation(format!(
                "cart total {} does not match its breakdown {}",
                cart.final_amount, expected
            )));
        }

        let lines = merge_cart_lines(&cart.items)?;

        // Snapshot every line at the price the cart was priced with
        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = self
                .catalog_guard
                .call(self.catalog.get_product(line.product_id))
                .await
                .map_err(EngineError::external("catalog"))?
                .ok_or_else(|| EngineError::Validation(format!("product {} is not in the catalog", line.product_id)))?;

            items.push(OrderItem {
                product_id: line.product_id,
                name: product.name,
                sku: product.sku,
                image_ref: product.image_ref,
                quantity: line.quantity,
                unit_price: line.unit_price,
                line_total: line.unit_price * Money::from(line.quantity),
                seller_id: product.seller_id,
                seller_name: product.seller_name,
            });
        }

        let now = self.ctx.clock.now();
        let remote = self.ctx.config.is_remote_region(&input.shipping_address.state);
        let billing_address = input
            .billing_address
            .clone()
            .unwrap_or_else(|| input.shipping_address.clone());

        let (order, placed) = Order::place(OrderPlaced {
            order_id: Uuid::now_v7(),
            user_id,
            customer: input.customer,
            items,
            subtotal: cart.subtotal,
            discount_amount: cart.discount_amount,
            discount_code: input.discount_code.or(cart.discount_code),
            shipping_cost: cart.shipping_cost,
            tax_amount: cart.tax_amount,
            total_amount: cart.final_amount,
            payment_method: input.payment_method,
            shipping_method: input.shipping_method,
            estimated_delivery_date: input.shipping_method.estimate_delivery(now, remote),
            shipping_address: input.shipping_address,
            billing_address,
            idempotency_key: input.idempotency_key,
            placed_at: now,
        })?;

        let lines: Vec<(Uuid, u32)> = order.items.iter().map(|i| (i.product_id, i.quantity)).collect();

        let mut tx = self.ctx.store.begin().await?;
        self.ctx.inventory.reserve_lines(tx.as_mut(), &lines).await?;

        match tx.insert_order(&order).await {
            Ok(()) => {}
            Err(StoreError::DuplicateIdempotencyKey(existing)) => {
                drop(tx);
                tracing::info!(order_id = %existing, %user_id, "Concurrent checkout with same key, returning existing order");
                return self.get_order_admin(existing).await;
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit().await?;

        self.ctx.metrics.orders_created.inc();
        timer.observe_duration();
        tracing::info!(
            order_id = %order.id,
            %user_id,
            items = order.items.len(),
            total = %order.total_amount,
            "Order created"
        );

        // The order is durable now; a failed cart clear only leaves a stale cart
        if let Err(e) = self.cart_guard.call(self.carts.clear_cart(user_id)).await {
            tracing::warn!(order_id = %order.id, %user_id, error = %e, "Cart not cleared after checkout");
        }

        self.publish(&order, vec![placed], Actor::User(user_id)).await;
        Ok(order)
    }

    // ========================================================================
    // Status transitions
    // ========================================================================

    /// Move an order along the fulfillment table. A move to `cancelled`
    /// runs the full cancellation.
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        actor: Actor,
        notes: Option<String>,
        location: Option<String>,
    ) -> Result<Order, EngineError> {
        if new_status == OrderStatus::Cancelled {
            let reason = notes.unwrap_or_else(|| "cancelled via status update".to_string());
            let mut tx = self.ctx.store.begin().await?;
            let order = load_order(tx.as_mut(), order_id).await?;
            if !order.status.can_transition_to(OrderStatus::Cancelled) {
                return Err(EngineError::InvalidTransition {
                    from: order.status.to_string(),
                    to: OrderStatus::Cancelled.to_string(),
                });
            }
            return self.cancel_in_tx(tx, order, actor, reason).await;
        }

        let now = self.ctx.clock.now();
        let tracking_candidate = if new_status == OrderStatus::Shipped {
            let mut rng = rand::thread_rng();
            Some(numbering::tracking_number(&self.ctx.config.tracking_prefix, now, &mut rng))
        } else {
            None
        };

        let mut tx = self.ctx.store.begin().await?;
        let mut order = load_order(tx.as_mut(), order_id).await?;
        let expected = order.version;

        let events = order.execute(OrderCommand::ChangeStatus {
            to: new_status,
            actor,
            notes,
            location,
            tracking_number: tracking_candidate,
            at: now,
        })?;

        tx.save_order(&order, expected).await?;
        tx.commit().await?;

        self.ctx.metrics.record_order_transition(new_status.as_str());
        tracing::info!(
            %order_id,
            status = %new_status,
            %actor,
            tracking_number = order.tracking_number.as_deref().unwrap_or(""),
            "Order status updated"
        );

        self.publish(&order, events, actor).await;
        Ok(order)
    }

    /// Cancel an order on behalf of its owner.
    pub async fn cancel_order(&self, order_id: Uuid, user_id: Uuid, reason: &str) -> Result<Order, EngineError> {
        if reason.trim().is_empty() {
            return Err(EngineError::Validation("cancellation reason is required".to_string()));
        }

        let mut tx = self.ctx.store.begin().await?;
        let order = load_order(tx.as_mut(), order_id).await?;
        if order.user_id != user_id {
            return Err(EngineError::NotAuthorized(format!(
                "order {} does not belong to user {}",
                order_id, user_id
            )));
        }

        self.cancel_in_tx(tx, order, Actor::User(user_id), reason.to_string()).await
    }

    /// Restock, refund what was paid and mark the order cancelled, all in
    /// `tx`. Any failure drops the transaction with nothing applied.
    async fn cancel_in_tx(
        &self,
        mut tx: Box<dyn StoreTx>,
        mut order: Order,
        actor: Actor,
        reason: String,
    ) -> Result<Order, EngineError> {
        let now = self.ctx.clock.now();
        let expected = order.version;

        let mut events = order.execute(OrderCommand::Cancel {
            reason: reason.clone(),
            actor,
            at: now,
        })?;

        let lines: Vec<(Uuid, u32)> = order.items.iter().map(|i| (i.product_id, i.quantity)).collect();
        self.ctx.inventory.release_lines(tx.as_mut(), &lines).await?;

        let mut refunded = None;
        let balance = order.refundable_balance();
        if order.payment_details.status.is_captured() && balance > Money::ZERO {
            let refund_key = format!("cancel-{}", order.id);
            let (transaction_id, refund_events) = self
                .ctx
                .refunds
                .refund_through_gateway(&mut order, balance, "order cancellation", &refund_key, now)
                .await?;
            events.extend(refund_events);
            refunded = Some((balance, transaction_id));
        }

        tx.save_order(&order, expected).await?;
        if let Err(e) = tx.commit().await {
            if let Some((amount, transaction_id)) = &refunded {
                tracing::error!(
                    order_id = %order.id,
                    %amount,
                    %transaction_id,
                    error = %e,
                    "Cancellation not committed after gateway refund"
                );
            }
            return Err(e.into());
        }

        self.ctx.metrics.record_order_transition(OrderStatus::Cancelled.as_str());
        if let Some((amount, _)) = &refunded {
            self.ctx.metrics.record_refund(RefundSource::Cancellation, *amount);
        }
        tracing::info!(
            order_id = %order.id,
            %actor,
            %reason,
            refunded = %refunded.as_ref().map(|(a, _)| *a).unwrap_or(Money::ZERO),
            "Order cancelled"
        );

        self.publish(&order, events, actor).await;
        Ok(order)
    }

    // ========================================================================
    // Payment & invoicing
    // ========================================================================

    /// Record the captured payment reported by the payment collaborator.
    pub async fn record_payment(&self, order_id: Uuid, amount: Money, reference: &str) -> Result<Order, EngineError> {
        let mut tx = self.ctx.store.begin().await?;
        let mut order = load_order(tx.as_mut(), order_id).await?;
        let expected = order.version;

        let events = order.execute(OrderCommand::RecordPayment {
            amount,
            reference: reference.to_string(),
            at: self.ctx.clock.now(),
        })?;

        tx.save_order(&order, expected).await?;
        tx.commit().await?;

        tracing::info!(%order_id, %amount, reference, "Payment recorded");
        self.publish_events(&order, events, Actor::System).await;
        Ok(order)
    }

    /// Assign an invoice number once and render the invoice.
    pub async fn generate_invoice(&self, order_id: Uuid) -> Result<InvoiceView, EngineError> {
        let now = self.ctx.clock.now();
        let candidate = {
            let mut rng = rand::thread_rng();
            numbering::invoice_number(&self.ctx.config.invoice_prefix, now, &mut rng)
        };

        let mut tx = self.ctx.store.begin().await?;
        let mut order = load_order(tx.as_mut(), order_id).await?;
        let expected = order.version;

        let events = order.execute(OrderCommand::IssueInvoice {
            invoice_number: candidate,
            at: now,
        })?;

        if events.is_empty() {
            tx.rollback().await?;
        } else {
            tx.save_order(&order, expected).await?;
            tx.commit().await?;
            tracing::info!(
                %order_id,
                invoice_number = order.invoice_number.as_deref().unwrap_or(""),
                "Invoice issued"
            );
            self.publish_events(&order, events, Actor::System).await;
        }

        InvoiceView::from_order(&order)
            .ok_or_else(|| EngineError::Validation(format!("order {} has no invoice number", order_id)))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Fetch an order for its owner.
    pub async fn get_order(&self, order_id: Uuid, requester: Uuid) -> Result<Order, EngineError> {
        let order = self.get_order_admin(order_id).await?;
        if order.user_id != requester {
            return Err(EngineError::NotAuthorized(format!(
                "order {} does not belong to user {}",
                order_id, requester
            )));
        }
        Ok(order)
    }

    pub async fn get_order_admin(&self, order_id: Uuid) -> Result<Order, EngineError> {
        self.ctx
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| EngineError::order_not_found(order_id))
    }

    pub async fn list_orders_for_user(&self, user_id: Uuid, page: Page) -> Result<Vec<Order>, EngineError> {
        let filter = OrderFilter {
            user_id: Some(user_id),
            page,
            ..Default::default()
        };
        Ok(self.ctx.store.list_orders(&filter).await?)
    }

    /// Orders with at least one line sold by `seller_id`, newest first.
    pub async fn list_orders_for_seller(&self, seller_id: Uuid, page: Page) -> Result<Vec<Order>, EngineError> {
        let filter = OrderFilter {
            seller_id: Some(seller_id),
            page,
            ..Default::default()
        };
        Ok(self.ctx.store.list_orders(&filter).await?)
    }

    // ========================================================================
    // Dispatch helpers
    // ========================================================================

    async fn publish(&self, order: &Order, events: Vec<OrderEvent>, actor: Actor) {
        let events = publishable(
            ORDER_TOPIC,
            order.id,
            order.version,
            events,
            actor,
            Uuid::now_v7(),
            self.ctx.clock.now(),
        );
        self.ctx.dispatcher.dispatch(Some(order_notification(order)), events).await;
    }

    async fn publish_events(&self, order: &Order, events: Vec<OrderEvent>, actor: Actor) {
        let events = publishable(
            ORDER_TOPIC,
            order.id,
            order.version,
            events,
            actor,
            Uuid::now_v7(),
            self.ctx.clock.now(),
        );
        self.ctx.dispatcher.dispatch(None, events).await;
    }
}

pub(crate) fn order_notification(order: &Order) -> StatusNotification {
    StatusNotification::Order {
        order_id: order.id,
        user_id: order.user_id,
        email: order.customer.email.clone(),
        status: order.status,
        tracking_number: order.tracking_number.clone(),
    }
}

pub(crate) async fn load_order(tx: &mut dyn StoreTx, order_id: Uuid) -> Result<Order, EngineError> {
    tx.load_order(order_id)
        .await?
        .ok_or_else(|| EngineError::order_not_found(order_id))
}

/// Fold lines for the same product into one, keeping first-seen order.
/// The same product at two different prices is refused.
fn merge_cart_lines(lines: &[CartLine]) -> Result<Vec<CartLine>, EngineError> {
    let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
    for line in lines {
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) if existing.unit_price != line.unit_price => {
                return Err(EngineError::Validation(format!(
                    "product {} is priced both {} and {} in the cart",
                    line.product_id, existing.unit_price, line.unit_price
                )));
            }
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(line.quantity).ok_or_else(|| {
                    EngineError::Validation(format!("quantity for product {} is too large", line.product_id))
                })?;
            }
            None => merged.push(line.clone()),
        }
    }
    Ok(merged)
}

fn validate_input(input: &PlaceOrderInput) -> Result<(), EngineError> {
    if input.payment_method.trim().is_empty() {
        return Err(EngineError::Validation("payment method is required".to_string()));
    }
    if input.customer.email.trim().is_empty() {
        return Err(EngineError::Validation("customer email is required".to_string()));
    }
    if let Some(field) = input.shipping_address.missing_field() {
        return Err(EngineError::Validation(format!("shipping address {} is required", field)));
    }
    if let Some(field) = input.billing_address.as_ref().and_then(Address::missing_field) {
        return Err(EngineError::Validation(format!("billing address {} is required", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::harness::{checkout_input, Harness};

    #[tokio::test]
    async fn test_checkout_snapshots_catalog_and_clears_cart() {
        let h = Harness::new().await;
        let product = h.product("Kettle", 5, 100).await;
        let user = Uuid::new_v4();
        h.cart(user, &[(product, 2, 100)]).await;

        let order = h.engine.orders.create_order_from_cart(user, checkout_input()).await.unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.items[0].name, "Kettle");
        assert_eq!(order.total_amount, Money::from(200));
        assert_eq!(order.status_history.len(), 1);
        assert_eq!(h.stock(product).await, 3);
        assert!(h.carts.cart(user).await.is_none());

        // Catalog price changes do not reach the stored order
        h.product_with_id(product, "Kettle v2", 150).await;
        let stored = h.engine.orders.get_order(order.id, user).await.unwrap();
        assert_eq!(stored.items[0].unit_price, Money::from(100));
        assert_eq!(stored.items[0].name, "Kettle");
    }

    #[tokio::test]
    async fn test_remote_destination_adds_two_days() {
        let h = Harness::with_config(|c| c.remote_regions = vec!["Karnataka".to_string()]).await;
        let product = h.product("Lamp", 5, 40).await;
        let user = Uuid::new_v4();
        h.cart(user, &[(product, 1, 40)]).await;

        let mut input = checkout_input();
        input.shipping_method = ShippingMethod::Express;
        let order = h.engine.orders.create_order_from_cart(user, input).await.unwrap();

        assert_eq!(order.estimated_delivery_date - order.created_at, chrono::Duration::days(5));
    }

    #[tokio::test]
    async fn test_idempotency_key_returns_original_order() {
        let h = Harness::new().await;
        let product = h.product("Mug", 10, 20).await;
        let user = Uuid::new_v4();
        h.cart(user, &[(product, 2, 20)]).await;

        let mut input = checkout_input();
        input.idempotency_key = Some("attempt-1".to_string());
        let first = h.engine.orders.create_order_from_cart(user, input.clone()).await.unwrap();
        let second = h.engine.orders.create_order_from_cart(user, input).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(h.stock(product).await, 8);
    }

    #[tokio::test]
    async fn test_split_cart_lines_become_one_item() {
        let h = Harness::new().await;
        let product = h.product("Mug", 10, 20).await;
        let user = Uuid::new_v4();
        h.cart(user, &[(product, 1, 20), (product, 2, 20)]).await;

        let order = h.engine.orders.create_order_from_cart(user, checkout_input()).await.unwrap();

        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].quantity, 3);
        assert_eq!(order.items[0].line_total, Money::from(60));
        assert_eq!(order.total_amount, Money::from(60));
        assert_eq!(h.stock(product).await, 7);
    }

    #[tokio::test]
    async fn test_same_product_at_two_prices_is_rejected() {
        let h = Harness::new().await;
        let product = h.product("Mug", 10, 20).await;
        let user = Uuid::new_v4();
        h.cart(user, &[(product, 1, 20), (product, 1, 25)]).await;

        let err = h.engine.orders.create_order_from_cart(user, checkout_input()).await.unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert_eq!(h.stock(product).await, 10);
    }

    #[tokio::test]
    async fn test_cart_total_mismatch_is_rejected() {
        let h = Harness::new().await;
        let product = h.product("Mug", 10, 20).await;
        let user = Uuid::new_v4();
        h.cart(user, &[(product, 1, 20)]).await;
        let mut cart = h.carts.cart(user).await.unwrap();
        cart.final_amount = Money::from(5);
        h.carts.put(user, cart).await;

        let err = h.engine.orders.create_order_from_cart(user, checkout_input()).await.unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert_eq!(h.stock(product).await, 10);
    }

    #[tokio::test]
    async fn test_tracking_number_assigned_once() {
        let h = Harness::new().await;
        let (order, _) = h.placed_order(&[(5, 1, 100)]).await;
        let orders = &h.engine.orders;

        for status in [OrderStatus::Confirmed, OrderStatus::Processing, OrderStatus::Shipped] {
            orders.update_order_status(order.id, status, Actor::System, None, None).await.unwrap();
        }
        let shipped = orders.get_order_admin(order.id).await.unwrap();
        let tracking = shipped.tracking_number.clone().unwrap();
        assert!(tracking.starts_with("TRK"));

        let delivered = orders
            .update_order_status(order.id, OrderStatus::Delivered, Actor::System, None, Some("Pune".into()))
            .await
            .unwrap();
        assert_eq!(delivered.tracking_number.as_deref(), Some(tracking.as_str()));
        assert_eq!(delivered.status_history.last().unwrap().location.as_deref(), Some("Pune"));
    }

    #[tokio::test]
    async fn test_invalid_transition_leaves_order_unchanged() {
        let h = Harness::new().await;
        let (order, _) = h.placed_order(&[(5, 1, 100)]).await;

        let err = h
            .engine
            .orders
            .update_order_status(order.id, OrderStatus::Delivered, Actor::System, None, None)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "invalid_transition");
        let stored = h.engine.orders.get_order_admin(order.id).await.unwrap();
        assert_eq!(stored, order);
    }

    #[tokio::test]
    async fn test_cancel_via_status_update_restocks_and_refunds() {
        let h = Harness::new().await;
        let (order, product) = h.placed_order(&[(10, 3, 100)]).await;
        h.engine.orders.record_payment(order.id, Money::from(300), "pay_1").await.unwrap();
        let admin = Uuid::new_v4();

        let cancelled = h
            .engine
            .orders
            .update_order_status(order.id, OrderStatus::Cancelled, Actor::User(admin), Some("fraud check".into()), None)
            .await
            .unwrap();

        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.cancelled_by, Some(Actor::User(admin)));
        assert_eq!(cancelled.payment_details.refunded_amount, Money::from(300));
        assert_eq!(cancelled.payment_details.status, PaymentStatus::Refunded);
        assert_eq!(h.stock(product[0]).await, 10);
        assert_eq!(h.gateway.refunds().await.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_via_status_update_off_table_is_invalid_transition() {
        let h = Harness::new().await;
        let (order, product) = h.delivered_order(&[(5, 1, 100)]).await;

        let err = h
            .engine
            .orders
            .update_order_status(order.id, OrderStatus::Cancelled, Actor::System, None, None)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "invalid_transition");
        let stored = h.engine.orders.get_order_admin(order.id).await.unwrap();
        assert_eq!(stored, order);
        assert_eq!(h.stock(product[0]).await, 4);
        assert!(h.gateway.refunds().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_cancellation_refund_rolls_back_restock() {
        let h = Harness::new().await;
        let (order, product) = h.placed_order(&[(10, 3, 100)]).await;
        h.engine.orders.record_payment(order.id, Money::from(300), "pay_1").await.unwrap();
        h.gateway.fail_next(1);

        let err = h.engine.orders.cancel_order(order.id, order.user_id, "too slow").await.unwrap_err();

        assert_eq!(err.code(), "external_service_error");
        assert_eq!(h.stock(product[0]).await, 7);
        let stored = h.engine.orders.get_order_admin(order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_other_users_cannot_read_or_cancel() {
        let h = Harness::new().await;
        let (order, _) = h.placed_order(&[(5, 1, 100)]).await;
        let stranger = Uuid::new_v4();

        let err = h.engine.orders.get_order(order.id, stranger).await.unwrap_err();
        assert_eq!(err.code(), "not_authorized");
        let err = h.engine.orders.cancel_order(order.id, stranger, "nope").await.unwrap_err();
        assert_eq!(err.code(), "not_authorized");
    }

    #[tokio::test]
    async fn test_status_change_notifies_customer() {
        let h = Harness::new().await;
        let (order, _) = h.placed_order(&[(5, 1, 100)]).await;
        h.engine
            .orders
            .update_order_status(order.id, OrderStatus::Confirmed, Actor::System, None, None)
            .await
            .unwrap();
        h.engine.dispatcher.drain().await;

        let statuses: Vec<OrderStatus> = h
            .notifier
            .sent()
            .await
            .into_iter()
            .filter_map(|n| match n {
                StatusNotification::Order { status, .. } => Some(status),
                _ => None,
            })
            .collect();
        assert_eq!(statuses.len(), 2);
        assert!(statuses.contains(&OrderStatus::Pending));
        assert!(statuses.contains(&OrderStatus::Confirmed));

        let mut event_types = h.publisher.event_types().await;
        event_types.sort();
        assert_eq!(event_types, vec!["OrderPlaced".to_string(), "OrderStatusChanged".to_string()]);
    }
}
