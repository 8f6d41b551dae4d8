#![allow(dead_code)]

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use order_returns_engine::collaborators::{
    Cart, CartLine, InMemoryCarts, ProductSnapshot, RecordingCarrier, RecordingGateway, RecordingNotifier,
    RecordingPublisher, StaticCatalog,
};
use order_returns_engine::domain::order::{
    CustomerContact, Money, Order, OrderStatus, PlaceOrderInput, ShippingMethod,
};
use order_returns_engine::domain::returns::{CreateReturnInput, ReturnLineInput, ReturnReason};
use order_returns_engine::domain::{Actor, Address};
use order_returns_engine::store::{CommerceStore, MemoryStore};
use order_returns_engine::{Collaborators, Engine, EngineConfig, ManualClock};

/// Engine over the in-memory store with every collaborator observable.
pub struct TestEngine {
    pub engine: Arc<Engine>,
    pub store: Arc<MemoryStore>,
    pub carts: Arc<InMemoryCarts>,
    pub catalog: Arc<StaticCatalog>,
    pub carrier: Arc<RecordingCarrier>,
    pub gateway: Arc<RecordingGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub publisher: Arc<RecordingPublisher>,
    pub clock: Arc<ManualClock>,
}

pub fn address() -> Address {
    Address {
        full_name: "Ravi Menon".to_string(),
        phone: Some("+91 98450 00000".to_string()),
        line1: "4 Residency Road".to_string(),
        line2: None,
        city: "Bengaluru".to_string(),
        state: "Karnataka".to_string(),
        postal_code: "560025".to_string(),
        country: "IN".to_string(),
    }
}

pub fn checkout() -> PlaceOrderInput {
    PlaceOrderInput {
        customer: CustomerContact {
            name: "Ravi Menon".to_string(),
            email: "ravi@example.com".to_string(),
        },
        shipping_address: address(),
        billing_address: None,
        payment_method: "card".to_string(),
        shipping_method: ShippingMethod::Standard,
        discount_code: None,
        idempotency_key: None,
    }
}

pub fn return_input(order_id: Uuid, lines: &[(Uuid, u32)]) -> CreateReturnInput {
    CreateReturnInput {
        order_id,
        items: lines
            .iter()
            .map(|(product_id, quantity)| ReturnLineInput {
                product_id: *product_id,
                quantity: *quantity,
                reason: None,
            })
            .collect(),
        reason: ReturnReason::Defective,
        description: "Stopped working after a day".to_string(),
        images: vec!["https://img.example.com/r1.jpg".to_string()],
        pickup_address: address(),
    }
}

impl TestEngine {
    pub async fn new() -> Self {
        let mut config = EngineConfig {
            collaborator_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        config.notification_retry.initial_delay = Duration::from_millis(1);

        let store = Arc::new(MemoryStore::new());
        let carts = Arc::new(InMemoryCarts::default());
        let catalog = Arc::new(StaticCatalog::default());
        let carrier = Arc::new(RecordingCarrier::default());
        let gateway = Arc::new(RecordingGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let clock = Arc::new(ManualClock::new(Utc::now()));

        let engine = Engine::new(
            config,
            store.clone(),
            Collaborators {
                carts: carts.clone(),
                catalog: catalog.clone(),
                carrier: carrier.clone(),
                payments: gateway.clone(),
                notifier: notifier.clone(),
                publisher: publisher.clone(),
            },
            clock.clone(),
        )
        .expect("engine");

        Self {
            engine: Arc::new(engine),
            store,
            carts,
            catalog,
            carrier,
            gateway,
            notifier,
            publisher,
            clock,
        }
    }

    pub async fn product(&self, stock: i64, price: i64) -> Uuid {
        let product_id = Uuid::new_v4();
        self.catalog
            .insert(
                product_id,
                ProductSnapshot {
                    name: format!("Product {}", &product_id.to_string()[..8]),
                    sku: None,
                    image_ref: None,
                    price: Money::from(price),
                    seller_id: Uuid::nil(),
                    seller_name: "Acme Traders".to_string(),
                },
            )
            .await;
        self.store.set_stock(product_id, stock).await.expect("stock");
        product_id
    }

    pub async fn cart(&self, user_id: Uuid, lines: &[(Uuid, u32, i64)]) {
        let items = lines
            .iter()
            .map(|(product_id, quantity, price)| CartLine {
                product_id: *product_id,
                quantity: *quantity,
                unit_price: Money::from(*price),
            })
            .collect();
        self.carts.put(user_id, Cart::priced(items)).await;
    }

    pub async fn stock(&self, product_id: Uuid) -> i64 {
        self.store
            .stock_level(product_id)
            .await
            .expect("stock level")
            .expect("known product")
            .stock
    }

    pub async fn place(&self, user_id: Uuid, lines: &[(Uuid, u32, i64)]) -> Order {
        self.cart(user_id, lines).await;
        self.engine
            .orders
            .create_order_from_cart(user_id, checkout())
            .await
            .expect("order placed")
    }

    /// Pay the full total and walk the order to `delivered`.
    pub async fn deliver(&self, order: &Order) -> Order {
        let orders = &self.engine.orders;
        orders
            .record_payment(order.id, order.total_amount, "pay_it")
            .await
            .expect("payment");
        for status in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            orders
                .update_order_status(order.id, status, Actor::System, None, None)
                .await
                .expect("status change");
        }
        orders.get_order_admin(order.id).await.expect("order")
    }
}
