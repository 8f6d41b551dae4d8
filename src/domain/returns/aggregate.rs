use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::domain::order::Money;
use crate::domain::{Actor, Address};
use super::commands::ReturnCommand;
use super::errors::ReturnError;
use super::events::*;
use super::value_objects::*;

// ============================================================================
// Return Aggregate - post-delivery return request and its refund
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub id: Uuid,
    pub version: i64,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub user_email: String,
    pub user_name: String,

    pub items: Vec<ReturnItem>,
    pub return_reason: ReturnReason,
    pub return_description: String,
    pub images: Vec<String>,
    pub pickup_address: Address,

    pub status: ReturnStatus,
    pub admin_review: Option<AdminReview>,
    pub pickup: Option<PickupDetails>,
    pub inspection: Option<Inspection>,
    pub refund: Option<RefundInfo>,
    pub timeline: Vec<TimelineEntry>,
    pub return_eligible_until: DateTime<Utc>,

    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReturnRequest {
    pub fn open(requested: ReturnRequested) -> Result<(Self, ReturnEvent), ReturnError> {
        if requested.items.is_empty() {
            return Err(ReturnError::EmptyItems);
        }
        if let Some(item) = requested.items.iter().find(|item| item.quantity == 0) {
            return Err(ReturnError::InvalidQuantity(item.product_id));
        }
        if requested.return_description.trim().is_empty() {
            return Err(ReturnError::MissingField("return description"));
        }

        let ret = Self::apply_first_event(&requested);
        Ok((ret, ReturnEvent::Requested(requested)))
    }

    /// Value of the returned lines at the prices paid.
    pub fn items_value(&self) -> Money {
        self.items
            .iter()
            .map(|item| item.price * Money::from(item.quantity))
            .sum()
    }

    fn apply_first_event(e: &ReturnRequested) -> Self {
        Self {
            id: e.return_id,
            version: 1,
            order_id: e.order_id,
            user_id: e.user_id,
            user_email: e.user_email.clone(),
            user_name: e.user_name.clone(),
            items: e.items.clone(),
            return_reason: e.return_reason,
            return_description: e.return_description.clone(),
            images: e.images.clone(),
            pickup_address: e.pickup_address.clone(),
            status: ReturnStatus::Requested,
            admin_review: None,
            pickup: None,
            inspection: None,
            refund: None,
            timeline: vec![TimelineEntry {
                status: ReturnStatus::Requested,
                timestamp: e.requested_at,
                notes: Some("return requested".to_string()),
                updated_by: Actor::User(e.user_id),
            }],
            return_eligible_until: e.return_eligible_until,
            cancellation_reason: None,
            cancelled_by: None,
            cancelled_at: None,
            created_at: e.requested_at,
            updated_at: e.requested_at,
        }
    }

    fn require_transition(&self, to: ReturnStatus) -> Result<(), ReturnError> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(ReturnError::InvalidTransition { from: self.status, to })
        }
    }

    fn enter(&mut self, status: ReturnStatus, at: DateTime<Utc>, notes: Option<String>, by: Actor) {
        self.status = status;
        self.timeline.push(TimelineEntry {
            status,
            timestamp: at,
            notes,
            updated_by: by,
        });
        self.updated_at = at;
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for ReturnRequest {
    type Event = ReturnEvent;
    type Command = ReturnCommand;
    type Error = ReturnError;

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ReturnCommand::Review { decision, reviewer, notes, at } => {
                let target = match decision {
                    ReviewDecision::Approved => ReturnStatus::Approved,
                    ReviewDecision::Rejected => ReturnStatus::Rejected,
                };
                self.require_transition(target)?;

                Ok(vec![ReturnEvent::Reviewed(ReturnReviewed {
                    review: AdminReview {
                        reviewed_by: *reviewer,
                        reviewed_at: *at,
                        decision: *decision,
                        notes: notes.clone(),
                    },
                })])
            }

            ReturnCommand::SchedulePickup { booking, actor, at } => {
                self.require_transition(ReturnStatus::PickupScheduled)?;
                if booking.carrier_return_id.trim().is_empty() {
                    return Err(ReturnError::MissingField("carrier return id"));
                }

                Ok(vec![ReturnEvent::PickupScheduled(ReturnPickupScheduled {
                    pickup: PickupDetails {
                        carrier_return_id: booking.carrier_return_id.clone(),
                        tracking_code: booking.tracking_code.clone(),
                        scheduled_at: *at,
                    },
                    actor: *actor,
                })])
            }

            ReturnCommand::Advance { to, notes, actor, at } => {
                if !ReturnStatus::CARRIER_REPORTED.contains(to) {
                    return Err(ReturnError::NotCarrierReported(*to));
                }
                self.require_transition(*to)?;

                Ok(vec![ReturnEvent::StatusAdvanced(ReturnStatusAdvanced {
                    from: self.status,
                    to: *to,
                    notes: notes.clone(),
                    actor: *actor,
                    advanced_at: *at,
                })])
            }

            ReturnCommand::Inspect { inspector, condition, notes, images, at } => {
                self.require_transition(ReturnStatus::Inspected)?;

                Ok(vec![ReturnEvent::Inspected(ReturnInspected {
                    inspection: Inspection {
                        inspected_by: *inspector,
                        inspected_at: *at,
                        condition: *condition,
                        notes: notes.clone(),
                        images: images.clone(),
                    },
                })])
            }

            ReturnCommand::InitiateRefund { amount, method, actor, at } => {
                self.require_transition(ReturnStatus::RefundInitiated)?;
                if *amount <= Money::ZERO {
                    return Err(ReturnError::NonPositiveRefund);
                }
                if method.trim().is_empty() {
                    return Err(ReturnError::MissingField("refund method"));
                }

                Ok(vec![ReturnEvent::RefundInitiated(ReturnRefundInitiated {
                    amount: *amount,
                    method: method.clone(),
                    actor: *actor,
                    initiated_at: *at,
                })])
            }

            ReturnCommand::CompleteRefund { transaction_id, actor, at } => {
                self.require_transition(ReturnStatus::RefundCompleted)?;
                let refund = self.refund.as_ref().ok_or(ReturnError::NoRefundInitiated)?;
                if transaction_id.trim().is_empty() {
                    return Err(ReturnError::MissingField("transaction id"));
                }

                Ok(vec![ReturnEvent::RefundCompleted(ReturnRefundCompleted {
                    amount: refund.amount,
                    transaction_id: transaction_id.clone(),
                    actor: *actor,
                    completed_at: *at,
                })])
            }

            ReturnCommand::Cancel { user_id, reason, at } => {
                if *user_id != self.user_id {
                    return Err(ReturnError::NotRequester);
                }
                if !matches!(self.status, ReturnStatus::Requested | ReturnStatus::Approved) {
                    return Err(ReturnError::NotCancellable { return_id: self.id, status: self.status });
                }
                if reason.trim().is_empty() {
                    return Err(ReturnError::MissingField("cancellation reason"));
                }

                Ok(vec![ReturnEvent::Cancelled(ReturnCancelled {
                    reason: reason.clone(),
                    cancelled_by: *user_id,
                    cancelled_at: *at,
                })])
            }
        }
    }

    fn apply_event(&mut self, event: &Self::Event) {
        match event {
            ReturnEvent::Requested(_) => return,
            ReturnEvent::Reviewed(e) => {
                let status = match e.review.decision {
                    ReviewDecision::Approved => ReturnStatus::Approved,
                    ReviewDecision::Rejected => ReturnStatus::Rejected,
                };
                self.admin_review = Some(e.review.clone());
                self.enter(status, e.review.reviewed_at, e.review.notes.clone(), Actor::User(e.review.reviewed_by));
            }
            ReturnEvent::PickupScheduled(e) => {
                self.pickup = Some(e.pickup.clone());
                let notes = format!("pickup booked, tracking {}", e.pickup.tracking_code);
                self.enter(ReturnStatus::PickupScheduled, e.pickup.scheduled_at, Some(notes), e.actor);
            }
            ReturnEvent::StatusAdvanced(e) => {
                self.enter(e.to, e.advanced_at, e.notes.clone(), e.actor);
            }
            ReturnEvent::Inspected(e) => {
                self.inspection = Some(e.inspection.clone());
                self.enter(
                    ReturnStatus::Inspected,
                    e.inspection.inspected_at,
                    e.inspection.notes.clone(),
                    Actor::User(e.inspection.inspected_by),
                );
            }
            ReturnEvent::RefundInitiated(e) => {
                self.refund = Some(RefundInfo {
                    amount: e.amount,
                    method: e.method.clone(),
                    status: RefundStatus::Processing,
                    transaction_id: None,
                    processed_at: Some(e.initiated_at),
                    completed_at: None,
                });
                self.enter(ReturnStatus::RefundInitiated, e.initiated_at, None, e.actor);
            }
            ReturnEvent::RefundCompleted(e) => {
                if let Some(refund) = self.refund.as_mut() {
                    refund.status = RefundStatus::Completed;
                    refund.transaction_id = Some(e.transaction_id.clone());
                    refund.completed_at = Some(e.completed_at);
                }
                let notes = format!("refund {} completed", e.transaction_id);
                self.enter(ReturnStatus::RefundCompleted, e.completed_at, Some(notes), e.actor);
            }
            ReturnEvent::Cancelled(e) => {
                self.cancellation_reason = Some(e.reason.clone());
                self.cancelled_by = Some(e.cancelled_by);
                self.cancelled_at = Some(e.cancelled_at);
                self.enter(
                    ReturnStatus::Cancelled,
                    e.cancelled_at,
                    Some(e.reason.clone()),
                    Actor::User(e.cancelled_by),
                );
            }
        }

        self.version += 1;
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::domain::fixtures::address;
    use chrono::Duration;

    pub fn requested(order_id: Uuid, user_id: Uuid, items: Vec<ReturnItem>) -> ReturnRequested {
        let now = Utc::now();
        ReturnRequested {
            return_id: Uuid::new_v4(),
            order_id,
            user_id,
            user_email: "asha@example.com".to_string(),
            user_name: "Asha Rao".to_string(),
            items,
            return_reason: ReturnReason::Defective,
            return_description: "Stopped working after a day".to_string(),
            images: vec![],
            pickup_address: address(),
            return_eligible_until: now + Duration::days(7),
            requested_at: now,
        }
    }

    pub fn line(product_id: Uuid, quantity: u32, price: i64) -> ReturnItem {
        ReturnItem {
            product_id,
            name: "Kettle".to_string(),
            sku: None,
            quantity,
            price: Money::from(price),
            reason: None,
        }
    }

    pub fn opened(user_id: Uuid) -> ReturnRequest {
        ReturnRequest::open(requested(Uuid::new_v4(), user_id, vec![line(Uuid::new_v4(), 1, 200)]))
            .expect("valid return")
            .0
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::collaborators::PickupBooking;

    fn review(decision: ReviewDecision) -> ReturnCommand {
        ReturnCommand::Review {
            decision,
            reviewer: Uuid::new_v4(),
            notes: Some("ok".to_string()),
            at: Utc::now(),
        }
    }

    fn advance(to: ReturnStatus) -> ReturnCommand {
        ReturnCommand::Advance {
            to,
            notes: None,
            actor: Actor::System,
            at: Utc::now(),
        }
    }

    fn walk_to_received(ret: &mut ReturnRequest) {
        ret.execute(review(ReviewDecision::Approved)).unwrap();
        ret.execute(ReturnCommand::SchedulePickup {
            booking: PickupBooking {
                carrier_return_id: "RS-1".to_string(),
                tracking_code: "RT-1".to_string(),
            },
            actor: Actor::System,
            at: Utc::now(),
        })
        .unwrap();
        for status in ReturnStatus::CARRIER_REPORTED {
            ret.execute(advance(status)).unwrap();
        }
    }

    #[test]
    fn test_open_starts_requested_with_timeline() {
        let user = Uuid::new_v4();
        let ret = opened(user);
        assert_eq!(ret.status, ReturnStatus::Requested);
        assert_eq!(ret.timeline.len(), 1);
        assert_eq!(ret.timeline[0].updated_by, Actor::User(user));
    }

    #[test]
    fn test_open_validates_items_and_description() {
        let order = Uuid::new_v4();
        let user = Uuid::new_v4();
        assert!(matches!(
            ReturnRequest::open(requested(order, user, vec![])),
            Err(ReturnError::EmptyItems)
        ));

        let mut blank = requested(order, user, vec![line(Uuid::new_v4(), 1, 10)]);
        blank.return_description = " ".to_string();
        assert!(matches!(ReturnRequest::open(blank), Err(ReturnError::MissingField(_))));
    }

    #[test]
    fn test_review_only_from_requested() {
        let mut ret = opened(Uuid::new_v4());
        ret.execute(review(ReviewDecision::Rejected)).unwrap();
        assert_eq!(ret.status, ReturnStatus::Rejected);
        assert_eq!(ret.admin_review.as_ref().unwrap().decision, ReviewDecision::Rejected);

        let err = ret.execute(review(ReviewDecision::Approved)).unwrap_err();
        assert!(matches!(err, ReturnError::InvalidTransition { from: ReturnStatus::Rejected, .. }));
    }

    #[test]
    fn test_advance_accepts_only_carrier_states_in_order() {
        let mut ret = opened(Uuid::new_v4());
        ret.execute(review(ReviewDecision::Approved)).unwrap();

        assert!(matches!(
            ret.execute(advance(ReturnStatus::PickedUp)),
            Err(ReturnError::InvalidTransition { .. })
        ));
        assert!(matches!(
            ret.execute(advance(ReturnStatus::RefundCompleted)),
            Err(ReturnError::NotCarrierReported(ReturnStatus::RefundCompleted))
        ));
    }

    #[test]
    fn test_full_refund_path_keeps_timeline_in_step() {
        let mut ret = opened(Uuid::new_v4());
        walk_to_received(&mut ret);

        ret.execute(ReturnCommand::Inspect {
            inspector: Uuid::new_v4(),
            condition: ItemCondition::Good,
            notes: None,
            images: vec![],
            at: Utc::now(),
        })
        .unwrap();
        ret.execute(ReturnCommand::InitiateRefund {
            amount: Money::from(200),
            method: "original_payment".to_string(),
            actor: Actor::System,
            at: Utc::now(),
        })
        .unwrap();
        assert_eq!(ret.refund.as_ref().unwrap().status, RefundStatus::Processing);

        ret.execute(ReturnCommand::CompleteRefund {
            transaction_id: "rf_42".to_string(),
            actor: Actor::System,
            at: Utc::now(),
        })
        .unwrap();

        let refund = ret.refund.as_ref().unwrap();
        assert_eq!(refund.status, RefundStatus::Completed);
        assert_eq!(refund.transaction_id.as_deref(), Some("rf_42"));
        assert_eq!(ret.status, ReturnStatus::RefundCompleted);
        assert!(ret.status.is_terminal());

        for pair in ret.timeline.windows(2) {
            assert!(pair[0].status.can_transition_to(pair[1].status));
        }
        assert_eq!(ret.timeline.last().unwrap().status, ret.status);
    }

    #[test]
    fn test_cancel_rules() {
        let user = Uuid::new_v4();
        let mut ret = opened(user);

        let cancel = |by: Uuid| ReturnCommand::Cancel {
            user_id: by,
            reason: "found a fix".to_string(),
            at: Utc::now(),
        };

        assert!(matches!(ret.execute(cancel(Uuid::new_v4())), Err(ReturnError::NotRequester)));
        ret.execute(cancel(user)).unwrap();
        assert_eq!(ret.status, ReturnStatus::Cancelled);
        assert_eq!(ret.cancelled_by, Some(user));

        let mut shipped = opened(user);
        walk_to_received(&mut shipped);
        assert!(matches!(
            shipped.execute(cancel(user)),
            Err(ReturnError::NotCancellable { status: ReturnStatus::Received, .. })
        ));
    }

    #[test]
    fn test_items_value() {
        let ret = ReturnRequest::open(requested(
            Uuid::new_v4(),
            Uuid::new_v4(),
            vec![line(Uuid::new_v4(), 2, 150), line(Uuid::new_v4(), 1, 100)],
        ))
        .unwrap()
        .0;
        assert_eq!(ret.items_value(), Money::from(400));
    }
}
