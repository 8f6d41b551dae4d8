use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::*;

// ============================================================================
// In-process collaborators
// ============================================================================
//
// Used by the demo binary and the test suites. The recording variants keep
// every call so assertions can inspect them, and can be told to fail the
// next N calls or to stall.
//
// ============================================================================

#[derive(Default)]
pub struct InMemoryCarts {
    carts: RwLock<HashMap<Uuid, Cart>>,
}

impl InMemoryCarts {
    pub async fn put(&self, user_id: Uuid, cart: Cart) {
        self.carts.write().await.insert(user_id, cart);
    }

    pub async fn cart(&self, user_id: Uuid) -> Option<Cart> {
        self.carts.read().await.get(&user_id).cloned()
    }
}

#[async_trait]
impl CartProvider for InMemoryCarts {
    async fn get_cart(&self, user_id: Uuid) -> Result<Cart, CollaboratorError> {
        Ok(self.carts.read().await.get(&user_id).cloned().unwrap_or_default())
    }

    async fn clear_cart(&self, user_id: Uuid) -> Result<(), CollaboratorError> {
        self.carts.write().await.remove(&user_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct StaticCatalog {
    products: RwLock<HashMap<Uuid, ProductSnapshot>>,
}

impl StaticCatalog {
    pub async fn insert(&self, product_id: Uuid, product: ProductSnapshot) {
        self.products.write().await.insert(product_id, product);
    }
}

#[async_trait]
impl CatalogProvider for StaticCatalog {
    async fn get_product(&self, product_id: Uuid) -> Result<Option<ProductSnapshot>, CollaboratorError> {
        Ok(self.products.read().await.get(&product_id).cloned())
    }
}

/// Failure injection shared by the recording collaborators.
#[derive(Default)]
struct Faults {
    fail_next: AtomicU32,
    delay: Mutex<Option<Duration>>,
}

impl Faults {
    async fn apply(&self, service: &str) -> Result<(), CollaboratorError> {
        if let Some(delay) = *self.delay.lock().await {
            tokio::time::sleep(delay).await;
        }
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(CollaboratorError::Unavailable(format!("{} injected failure", service)));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingCarrier {
    bookings: Mutex<Vec<(Uuid, Address)>>,
    sequence: AtomicU64,
    faults: Faults,
}

impl RecordingCarrier {
    pub fn fail_next(&self, calls: u32) {
        self.faults.fail_next.store(calls, Ordering::SeqCst);
    }

    pub async fn stall_for(&self, delay: Option<Duration>) {
        *self.faults.delay.lock().await = delay;
    }

    pub async fn bookings(&self) -> Vec<(Uuid, Address)> {
        self.bookings.lock().await.clone()
    }
}

#[async_trait]
impl FulfillmentCarrier for RecordingCarrier {
    async fn book_return_pickup(
        &self,
        order_ref: Uuid,
        pickup_address: &Address,
    ) -> Result<PickupBooking, CollaboratorError> {
        self.faults.apply("carrier").await?;

        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.bookings.lock().await.push((order_ref, pickup_address.clone()));
        Ok(PickupBooking {
            carrier_return_id: format!("RS{:08}", n),
            tracking_code: format!("RT{:010}", n),
        })
    }
}

#[derive(Default)]
pub struct RecordingGateway {
    refunds: Mutex<Vec<(Uuid, Money, String)>>,
    receipts: Mutex<HashMap<String, String>>,
    sequence: AtomicU64,
    faults: Faults,
}

impl RecordingGateway {
    pub fn fail_next(&self, calls: u32) {
        self.faults.fail_next.store(calls, Ordering::SeqCst);
    }

    pub async fn stall_for(&self, delay: Option<Duration>) {
        *self.faults.delay.lock().await = delay;
    }

    pub async fn refunds(&self) -> Vec<(Uuid, Money, String)> {
        self.refunds.lock().await.clone()
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn refund(
        &self,
        order_ref: Uuid,
        amount: Money,
        idempotency_key: &str,
    ) -> Result<RefundReceipt, CollaboratorError> {
        self.faults.apply("payment").await?;

        let mut receipts = self.receipts.lock().await;
        if let Some(transaction_id) = receipts.get(idempotency_key) {
            return Ok(RefundReceipt {
                transaction_id: transaction_id.clone(),
            });
        }

        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let transaction_id = format!("rf_{:08}", n);
        receipts.insert(idempotency_key.to_string(), transaction_id.clone());
        self.refunds.lock().await.push((order_ref, amount, transaction_id.clone()));
        Ok(RefundReceipt { transaction_id })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<StatusNotification>>,
    faults: Faults,
}

impl RecordingNotifier {
    pub fn fail_next(&self, calls: u32) {
        self.faults.fail_next.store(calls, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<StatusNotification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationService for RecordingNotifier {
    async fn notify_status_change(&self, notification: &StatusNotification) -> Result<(), CollaboratorError> {
        self.faults.apply("notification").await?;
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<PublishedEvent>>,
}

impl RecordingPublisher {
    pub async fn events(&self) -> Vec<PublishedEvent> {
        self.events.lock().await.clone()
    }

    pub async fn event_types(&self) -> Vec<String> {
        self.events.lock().await.iter().map(|e| e.event_type.clone()).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &PublishedEvent) -> Result<(), CollaboratorError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

/// Notification sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationService for TracingNotifier {
    async fn notify_status_change(&self, notification: &StatusNotification) -> Result<(), CollaboratorError> {
        match notification {
            StatusNotification::Order { order_id, email, status, .. } => {
                tracing::info!(%order_id, %email, %status, "📨 Order status notification");
            }
            StatusNotification::Return { return_id, email, status, .. } => {
                tracing::info!(%return_id, %email, %status, "📨 Return status notification");
            }
        }
        Ok(())
    }
}

/// Event sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPublisher;

#[async_trait]
impl EventPublisher for TracingPublisher {
    async fn publish(&self, event: &PublishedEvent) -> Result<(), CollaboratorError> {
        tracing::debug!(
            topic = event.topic,
            key = %event.key,
            event_type = %event.event_type,
            "Published audit event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::address;

    #[tokio::test]
    async fn test_carts_clear() {
        let carts = InMemoryCarts::default();
        let user = Uuid::new_v4();
        carts.put(user, Cart::priced(vec![])).await;

        carts.clear_cart(user).await.unwrap();
        assert!(carts.cart(user).await.is_none());
        assert!(carts.get_cart(user).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let carrier = RecordingCarrier::default();
        carrier.fail_next(1);

        let order = Uuid::new_v4();
        assert!(carrier.book_return_pickup(order, &address()).await.is_err());
        let booking = carrier.book_return_pickup(order, &address()).await.unwrap();

        assert_eq!(booking.carrier_return_id, "RS00000001");
        assert_eq!(carrier.bookings().await.len(), 1);
    }

    #[tokio::test]
    async fn test_gateway_issues_distinct_transactions() {
        let gateway = RecordingGateway::default();
        let a = gateway.refund(Uuid::new_v4(), Money::from(10), "key-a").await.unwrap();
        let b = gateway.refund(Uuid::new_v4(), Money::from(20), "key-b").await.unwrap();
        assert_ne!(a.transaction_id, b.transaction_id);
        assert_eq!(gateway.refunds().await.len(), 2);
    }

    #[tokio::test]
    async fn test_gateway_replays_receipt_for_repeated_key() {
        let gateway = RecordingGateway::default();
        let order = Uuid::new_v4();
        let first = gateway.refund(order, Money::from(10), "return-1").await.unwrap();
        let retry = gateway.refund(order, Money::from(10), "return-1").await.unwrap();

        assert_eq!(first.transaction_id, retry.transaction_id);
        assert_eq!(gateway.refunds().await.len(), 1);
    }
}
