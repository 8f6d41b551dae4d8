use chrono::Duration;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::collaborators::{CollaboratorGuard, FulfillmentCarrier, StatusNotification};
use crate::dispatch::publishable;
use crate::domain::order::{
    load_order, Money, Order, OrderCommand, OrderEvent, OrderReturnStatus, OrderStatus, PaymentStatus,
    ORDER_TOPIC,
};
use crate::domain::refund::{RefundLedger, RefundSource};
use crate::domain::{Actor, Address};
use crate::engine::EngineContext;
use crate::error::EngineError;
use crate::store::{ReturnFilter, StoreError, StoreTx};
use super::aggregate::ReturnRequest;
use super::commands::ReturnCommand;
use super::events::{ReturnEvent, ReturnRequested};
use super::value_objects::*;

// ============================================================================
// Return Lifecycle Manager
// ============================================================================
//
// request -> review -> pickup -> carrier progress -> inspection -> refund
//
// Operations touching both a return and its order lock the order first,
// then the return. The order mirrors the return outcome in `return_status`.
//
// ============================================================================

pub const RETURN_TOPIC: &str = "returns";

#[derive(Debug, Clone)]
pub struct ReturnLineInput {
    pub product_id: Uuid,
    pub quantity: u32,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateReturnInput {
    pub order_id: Uuid,
    pub items: Vec<ReturnLineInput>,
    pub reason: ReturnReason,
    pub description: String,
    pub images: Vec<String>,
    pub pickup_address: Address,
}

pub struct ReturnLifecycleManager {
    ctx: EngineContext,
    carrier: Arc<dyn FulfillmentCarrier>,
    carrier_guard: CollaboratorGuard,
}

/// Events produced by one operation, published together after commit.
#[derive(Default)]
struct Changes {
    order_events: Vec<OrderEvent>,
    return_events: Vec<ReturnEvent>,
}

impl ReturnLifecycleManager {
    pub fn new(ctx: EngineContext, carrier: Arc<dyn FulfillmentCarrier>, carrier_guard: CollaboratorGuard) -> Self {
        Self {
            ctx,
            carrier,
            carrier_guard,
        }
    }

    // ========================================================================
    // Request
    // ========================================================================

    pub async fn create_return_request(
        &self,
        user_id: Uuid,
        input: CreateReturnInput,
    ) -> Result<ReturnRequest, EngineError> {
        if input.items.is_empty() {
            return Err(EngineError::Validation("at least one item must be returned".to_string()));
        }
        if input.description.trim().is_empty() {
            return Err(EngineError::Validation("return description is required".to_string()));
        }
        if let Some(field) = input.pickup_address.missing_field() {
            return Err(EngineError::Validation(format!("pickup address {} is required", field)));
        }

        let now = self.ctx.clock.now();
        let mut tx = self.ctx.store.begin().await?;
        let mut order = load_order(tx.as_mut(), input.order_id).await?;

        if order.user_id != user_id {
            return Err(EngineError::NotAuthorized(format!(
                "order {} does not belong to user {}",
                order.id, user_id
            )));
        }
        if order.status != OrderStatus::Delivered {
            return Err(EngineError::NotReturnable {
                order_id: order.id,
                reason: format!("order is {}", order.status),
            });
        }
        let delivered_at = order.delivered_at().ok_or_else(|| EngineError::NotReturnable {
            order_id: order.id,
            reason: "order has no delivery record".to_string(),
        })?;
        let eligible_until = delivered_at + Duration::days(self.ctx.config.return_window_days);
        if now > eligible_until {
            return Err(EngineError::NotReturnable {
                order_id: order.id,
                reason: format!("return window closed at {}", eligible_until.to_rfc3339()),
            });
        }

        let previous = tx.returns_for_order(order.id).await?;
        let items = returnable_items(&order, &previous, &input.items)?;

        let (ret, requested) = ReturnRequest::open(ReturnRequested {
            return_id: Uuid::now_v7(),
            order_id: order.id,
            user_id,
            user_email: order.customer.email.clone(),
            user_name: order.customer.name.clone(),
            items,
            return_reason: input.reason,
            return_description: input.description,
            images: input.images,
            pickup_address: input.pickup_address,
            return_eligible_until: eligible_until,
            requested_at: now,
        })?;

        match tx.insert_return(&ret).await {
            Ok(()) => {}
            Err(StoreError::DuplicateActiveReturn(order_id)) => return Err(EngineError::DuplicateReturn(order_id)),
            Err(e) => return Err(e.into()),
        }

        let expected = order.version;
        let order_events = order.execute(OrderCommand::SetReturnStatus {
            return_status: OrderReturnStatus::Requested,
            at: now,
        })?;
        tx.save_order(&order, expected).await?;
        tx.commit().await?;

        self.ctx.metrics.returns_opened.inc();
        tracing::info!(
            return_id = %ret.id,
            order_id = %order.id,
            %user_id,
            items = ret.items.len(),
            "Return requested"
        );

        let changes = Changes {
            order_events,
            return_events: vec![requested],
        };
        self.publish(&order, &ret, changes, Actor::User(user_id)).await;
        Ok(ret)
    }

    // ========================================================================
    // Admin review
    // ========================================================================

    pub async fn approve_return(
        &self,
        return_id: Uuid,
        admin_id: Uuid,
        notes: Option<String>,
    ) -> Result<ReturnRequest, EngineError> {
        self.review(return_id, ReviewDecision::Approved, admin_id, notes).await
    }

    pub async fn reject_return(
        &self,
        return_id: Uuid,
        admin_id: Uuid,
        notes: Option<String>,
    ) -> Result<ReturnRequest, EngineError> {
        self.review(return_id, ReviewDecision::Rejected, admin_id, notes).await
    }

    async fn review(
        &self,
        return_id: Uuid,
        decision: ReviewDecision,
        admin_id: Uuid,
        notes: Option<String>,
    ) -> Result<ReturnRequest, EngineError> {
        let now = self.ctx.clock.now();
        let mirror = match decision {
            ReviewDecision::Approved => OrderReturnStatus::Approved,
            ReviewDecision::Rejected => OrderReturnStatus::Rejected,
        };

        self.update_with_order(return_id, Actor::User(admin_id), |order, ret| {
            let return_events = ret.execute(ReturnCommand::Review {
                decision,
                reviewer: admin_id,
                notes,
                at: now,
            })?;
            let order_events = order.execute(OrderCommand::SetReturnStatus {
                return_status: mirror,
                at: now,
            })?;
            Ok(Changes {
                order_events,
                return_events,
            })
        })
        .await
    }

    // ========================================================================
    // Pickup and carrier progress
    // ========================================================================

    /// Book the reverse pickup. The carrier is called outside the
    /// transaction; if it fails the return stays `approved`.
    pub async fn schedule_pickup(&self, return_id: Uuid, actor: Actor) -> Result<ReturnRequest, EngineError> {
        let current = self.get_return(return_id).await?;
        if !current.status.can_transition_to(ReturnStatus::PickupScheduled) {
            return Err(EngineError::InvalidTransition {
                from: current.status.to_string(),
                to: ReturnStatus::PickupScheduled.to_string(),
            });
        }

        let booking = self
            .carrier_guard
            .call(self.carrier.book_return_pickup(current.order_id, &current.pickup_address))
            .await
            .map_err(EngineError::external("fulfillment carrier"))?;

        tracing::info!(
            %return_id,
            carrier_return_id = %booking.carrier_return_id,
            tracking_code = %booking.tracking_code,
            "Reverse pickup booked"
        );

        let now = self.ctx.clock.now();
        let carrier_return_id = booking.carrier_return_id.clone();
        let result = self
            .update(return_id, actor, |ret| {
                ret.execute(ReturnCommand::SchedulePickup { booking, actor, at: now })
                    .map_err(EngineError::from)
            })
            .await;

        if let Err(e) = &result {
            tracing::error!(
                %return_id,
                %carrier_return_id,
                error = %e,
                "Pickup booked with carrier but not recorded"
            );
        }
        result
    }

    /// Record carrier-reported progress: picked up, in transit, received.
    pub async fn advance_return_status(
        &self,
        return_id: Uuid,
        new_status: ReturnStatus,
        notes: Option<String>,
        actor: Actor,
    ) -> Result<ReturnRequest, EngineError> {
        let now = self.ctx.clock.now();
        self.update(return_id, actor, |ret| {
            ret.execute(ReturnCommand::Advance {
                to: new_status,
                notes,
                actor,
                at: now,
            })
            .map_err(EngineError::from)
        })
        .await
    }

    pub async fn inspect_return(
        &self,
        return_id: Uuid,
        inspector_id: Uuid,
        condition: ItemCondition,
        notes: Option<String>,
        images: Vec<String>,
    ) -> Result<ReturnRequest, EngineError> {
        let now = self.ctx.clock.now();
        self.update(return_id, Actor::User(inspector_id), |ret| {
            ret.execute(ReturnCommand::Inspect {
                inspector: inspector_id,
                condition,
                notes,
                images,
                at: now,
            })
            .map_err(EngineError::from)
        })
        .await
    }

    // ========================================================================
    // Refund
    // ========================================================================

    /// Start the refund. The order's refunded amount is untouched until
    /// `complete_refund`, but the amount must already fit under it.
    pub async fn initiate_refund(
        &self,
        return_id: Uuid,
        amount: Money,
        method: &str,
        actor: Actor,
    ) -> Result<ReturnRequest, EngineError> {
        let now = self.ctx.clock.now();
        self.update_with_order(return_id, actor, |order, ret| {
            RefundLedger::check_cap(order, amount)?;
            let items_value = ret.items_value();
            if amount > items_value {
                // Allowed while it fits under the paid amount, e.g. shipping refunded too
                tracing::warn!(
                    %return_id,
                    %amount,
                    %items_value,
                    "Refund exceeds the value of the returned items"
                );
            } else {
                tracing::info!(%return_id, %amount, %items_value, "Refund initiated");
            }
            let return_events = ret.execute(ReturnCommand::InitiateRefund {
                amount,
                method: method.to_string(),
                actor,
                at: now,
            })?;
            Ok(Changes {
                return_events,
                ..Default::default()
            })
        })
        .await
    }

    /// Settle the refund and apply it everywhere at once: the order's
    /// refunded amount, restocking of the returned units and the order's
    /// progression toward `returned` / `refunded`.
    ///
    /// Without a `transaction_id` the payment gateway is asked for the
    /// refund first.
    pub async fn complete_refund(
        &self,
        return_id: Uuid,
        transaction_id: Option<String>,
        actor: Actor,
    ) -> Result<ReturnRequest, EngineError> {
        let now = self.ctx.clock.now();
        let (mut tx, mut order, mut ret) = self.lock_pair(return_id).await?;

        if !ret.status.can_transition_to(ReturnStatus::RefundCompleted) {
            return Err(EngineError::InvalidTransition {
                from: ret.status.to_string(),
                to: ReturnStatus::RefundCompleted.to_string(),
            });
        }
        let amount = ret
            .refund
            .as_ref()
            .map(|refund| refund.amount)
            .ok_or_else(|| EngineError::Validation(format!("return {} has no initiated refund", return_id)))?;
        RefundLedger::check_cap(&order, amount)?;

        let transaction_id = match transaction_id {
            Some(id) => id,
            None => {
                self.ctx
                    .refunds
                    .settle(order.id, amount, &format!("return-{}", ret.id))
                    .await?
            }
        };

        let (order_expected, return_expected) = (order.version, ret.version);
        let return_events = ret.execute(ReturnCommand::CompleteRefund {
            transaction_id: transaction_id.clone(),
            actor,
            at: now,
        })?;

        let reason = format!("return {}", ret.id);
        let mut order_events = self.ctx.refunds.record(&mut order, amount, &reason, &transaction_id, now)?;

        let lines: Vec<(Uuid, u32)> = ret.items.iter().map(|i| (i.product_id, i.quantity)).collect();
        self.ctx.inventory.release_lines(tx.as_mut(), &lines).await?;

        order_events.extend(order.execute(OrderCommand::SetReturnStatus {
            return_status: OrderReturnStatus::Approved,
            at: now,
        })?);

        // Completed returns including this one, which is not saved yet
        let mut completed = tx.returns_for_order(order.id).await?;
        completed.retain(|r| r.id != ret.id && r.status == ReturnStatus::RefundCompleted);
        completed.push(ret.clone());

        let mut progressed = Vec::new();
        if order.status == OrderStatus::Delivered && all_units_returned(&order, &completed) {
            order_events.extend(order.execute(OrderCommand::ChangeStatus {
                to: OrderStatus::Returned,
                actor,
                notes: Some("all items returned".to_string()),
                location: None,
                tracking_number: None,
                at: now,
            })?);
            progressed.push(OrderStatus::Returned);
        }
        if order.status == OrderStatus::Returned && order.payment_details.status == PaymentStatus::Refunded {
            order_events.extend(order.execute(OrderCommand::ChangeStatus {
                to: OrderStatus::Refunded,
                actor,
                notes: Some("payment fully refunded".to_string()),
                location: None,
                tracking_number: None,
                at: now,
            })?);
            progressed.push(OrderStatus::Refunded);
        }

        tx.save_return(&ret, return_expected).await?;
        tx.save_order(&order, order_expected).await?;
        if let Err(e) = tx.commit().await {
            tracing::error!(
                %return_id,
                order_id = %order.id,
                %amount,
                %transaction_id,
                error = %e,
                "Refund completion not committed"
            );
            return Err(e.into());
        }

        self.ctx.metrics.record_refund(RefundSource::Return, amount);
        self.ctx.metrics.record_return_transition(ret.status.as_str());
        for status in &progressed {
            self.ctx.metrics.record_order_transition(status.as_str());
        }
        tracing::info!(
            %return_id,
            order_id = %order.id,
            %amount,
            %transaction_id,
            refunded_total = %order.payment_details.refunded_amount,
            order_status = %order.status,
            "Return refund completed"
        );

        let changes = Changes {
            order_events,
            return_events,
        };
        self.publish(&order, &ret, changes, actor).await;
        Ok(ret)
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    /// Withdraw a return; only its requester may, and only before pickup.
    pub async fn cancel_return(&self, return_id: Uuid, user_id: Uuid, reason: &str) -> Result<ReturnRequest, EngineError> {
        if reason.trim().is_empty() {
            return Err(EngineError::Validation("cancellation reason is required".to_string()));
        }

        let now = self.ctx.clock.now();
        self.update_with_order(return_id, Actor::User(user_id), |order, ret| {
            let return_events = ret.execute(ReturnCommand::Cancel {
                user_id,
                reason: reason.to_string(),
                at: now,
            })?;
            let order_events = order.execute(OrderCommand::SetReturnStatus {
                return_status: OrderReturnStatus::None,
                at: now,
            })?;
            Ok(Changes {
                order_events,
                return_events,
            })
        })
        .await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get_return(&self, return_id: Uuid) -> Result<ReturnRequest, EngineError> {
        self.ctx
            .store
            .get_return(return_id)
            .await?
            .ok_or_else(|| EngineError::return_not_found(return_id))
    }

    pub async fn list_returns(&self, filter: &ReturnFilter) -> Result<Vec<ReturnRequest>, EngineError> {
        Ok(self.ctx.store.list_returns(filter).await?)
    }

    // ========================================================================
    // Plumbing
    // ========================================================================

    /// Open a transaction holding the return's order and then the return.
    async fn lock_pair(&self, return_id: Uuid) -> Result<(Box<dyn StoreTx>, Order, ReturnRequest), EngineError> {
        let order_id = self.get_return(return_id).await?.order_id;

        let mut tx = self.ctx.store.begin().await?;
        let order = load_order(tx.as_mut(), order_id).await?;
        let ret = tx
            .load_return(return_id)
            .await?
            .ok_or_else(|| EngineError::return_not_found(return_id))?;
        Ok((tx, order, ret))
    }

    /// Apply a return-only change in its own transaction.
    async fn update<F>(&self, return_id: Uuid, actor: Actor, change: F) -> Result<ReturnRequest, EngineError>
    where
        F: FnOnce(&mut ReturnRequest) -> Result<Vec<ReturnEvent>, EngineError>,
    {
        let mut tx = self.ctx.store.begin().await?;
        let mut ret = tx
            .load_return(return_id)
            .await?
            .ok_or_else(|| EngineError::return_not_found(return_id))?;
        let expected = ret.version;

        let return_events = change(&mut ret)?;
        tx.save_return(&ret, expected).await?;
        tx.commit().await?;

        self.after_commit(&ret, actor);
        let events = self.return_events(&ret, return_events, actor, Uuid::now_v7());
        self.ctx
            .dispatcher
            .dispatch(Some(return_notification(&ret)), events)
            .await;
        Ok(ret)
    }

    /// Apply a change to a return and its order in one transaction.
    async fn update_with_order<F>(&self, return_id: Uuid, actor: Actor, change: F) -> Result<ReturnRequest, EngineError>
    where
        F: FnOnce(&mut Order, &mut ReturnRequest) -> Result<Changes, EngineError>,
    {
        let (mut tx, mut order, mut ret) = self.lock_pair(return_id).await?;
        let (order_expected, return_expected) = (order.version, ret.version);

        let changes = change(&mut order, &mut ret)?;

        tx.save_return(&ret, return_expected).await?;
        if !changes.order_events.is_empty() {
            tx.save_order(&order, order_expected).await?;
        }
        tx.commit().await?;

        self.after_commit(&ret, actor);
        self.publish(&order, &ret, changes, actor).await;
        Ok(ret)
    }

    fn after_commit(&self, ret: &ReturnRequest, actor: Actor) {
        self.ctx.metrics.record_return_transition(ret.status.as_str());
        tracing::info!(
            return_id = %ret.id,
            order_id = %ret.order_id,
            status = %ret.status,
            %actor,
            "Return status updated"
        );
    }

    async fn publish(&self, order: &Order, ret: &ReturnRequest, changes: Changes, actor: Actor) {
        let correlation_id = Uuid::now_v7();
        let mut events = publishable(
            ORDER_TOPIC,
            order.id,
            order.version,
            changes.order_events,
            actor,
            correlation_id,
            self.ctx.clock.now(),
        );
        events.extend(self.return_events(ret, changes.return_events, actor, correlation_id));
        self.ctx
            .dispatcher
            .dispatch(Some(return_notification(ret)), events)
            .await;
    }

    fn return_events(
        &self,
        ret: &ReturnRequest,
        events: Vec<ReturnEvent>,
        actor: Actor,
        correlation_id: Uuid,
    ) -> Vec<crate::collaborators::PublishedEvent> {
        publishable(
            RETURN_TOPIC,
            ret.id,
            ret.version,
            events,
            actor,
            correlation_id,
            self.ctx.clock.now(),
        )
    }
}

fn return_notification(ret: &ReturnRequest) -> StatusNotification {
    StatusNotification::Return {
        return_id: ret.id,
        order_id: ret.order_id,
        user_id: ret.user_id,
        email: ret.user_email.clone(),
        status: ret.status,
    }
}

/// Units per product already refunded by completed returns.
fn returned_units(returns: &[ReturnRequest]) -> HashMap<Uuid, u32> {
    let mut units = HashMap::new();
    for ret in returns.iter().filter(|r| r.status == ReturnStatus::RefundCompleted) {
        for item in &ret.items {
            *units.entry(item.product_id).or_insert(0) += item.quantity;
        }
    }
    units
}

fn all_units_returned(order: &Order, completed: &[ReturnRequest]) -> bool {
    let returned = returned_units(completed);
    let mut ordered: HashMap<Uuid, u32> = HashMap::new();
    for item in &order.items {
        *ordered.entry(item.product_id).or_insert(0) += item.quantity;
    }
    ordered
        .iter()
        .all(|(product_id, quantity)| returned.get(product_id).copied().unwrap_or(0) >= *quantity)
}

/// Snapshot the requested lines from the order, bounded by what earlier
/// completed returns have not already taken back.
fn returnable_items(
    order: &Order,
    previous: &[ReturnRequest],
    requested: &[ReturnLineInput],
) -> Result<Vec<ReturnItem>, EngineError> {
    let already_returned = returned_units(previous);
    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(requested.len());

    for line in requested {
        if !seen.insert(line.product_id) {
            return Err(EngineError::Validation(format!(
                "product {} appears more than once",
                line.product_id
            )));
        }
        let ordered = order.item(line.product_id).ok_or_else(|| {
            EngineError::Validation(format!("product {} is not part of order {}", line.product_id, order.id))
        })?;
        if line.quantity == 0 {
            return Err(EngineError::Validation(format!(
                "return quantity for product {} must be positive",
                line.product_id
            )));
        }

        let returnable = ordered
            .quantity
            .saturating_sub(already_returned.get(&line.product_id).copied().unwrap_or(0));
        if line.quantity > returnable {
            return Err(EngineError::Validation(format!(
                "cannot return {} of product {}, {} returnable",
                line.quantity, line.product_id, returnable
            )));
        }

        items.push(ReturnItem {
            product_id: line.product_id,
            name: ordered.name.clone(),
            sku: ordered.sku.clone(),
            quantity: line.quantity,
            price: ordered.unit_price,
            reason: line.reason.clone(),
        });
    }

    Ok(items)
}
