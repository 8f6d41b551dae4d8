use std::sync::Arc;

use crate::clock::Clock;
use crate::collaborators::{
    CartProvider, CatalogProvider, CollaboratorGuard, EventPublisher, FulfillmentCarrier,
    NotificationService, PaymentGateway,
};
use crate::config::EngineConfig;
use crate::dispatch::Dispatcher;
use crate::domain::inventory::InventoryLedger;
use crate::domain::order::OrderLifecycleManager;
use crate::domain::refund::RefundLedger;
use crate::domain::returns::ReturnLifecycleManager;
use crate::metrics::Metrics;
use crate::store::CommerceStore;
use crate::utils::CircuitBreakerConfig;

// ============================================================================
// Engine - wires store, collaborators and both lifecycle managers
// ============================================================================

/// External services the engine consumes.
#[derive(Clone)]
pub struct Collaborators {
    pub carts: Arc<dyn CartProvider>,
    pub catalog: Arc<dyn CatalogProvider>,
    pub carrier: Arc<dyn FulfillmentCarrier>,
    pub payments: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn NotificationService>,
    pub publisher: Arc<dyn EventPublisher>,
}

/// State shared by the order and return managers.
#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn CommerceStore>,
    pub inventory: InventoryLedger,
    pub refunds: RefundLedger,
    pub dispatcher: Arc<Dispatcher>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<EngineConfig>,
    pub metrics: Arc<Metrics>,
}

pub struct Engine {
    pub orders: OrderLifecycleManager,
    pub returns: ReturnLifecycleManager,
    pub dispatcher: Arc<Dispatcher>,
    pub metrics: Arc<Metrics>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn CommerceStore>,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let metrics = Arc::new(Metrics::new()?);
        let config = Arc::new(config);
        let timeout = config.collaborator_timeout;

        let guard = |service: &'static str, breaker: CircuitBreakerConfig| {
            CollaboratorGuard::new(service, timeout, breaker, metrics.clone())
        };

        let dispatcher = Arc::new(Dispatcher::new(
            collaborators.notifier,
            collaborators.publisher,
            config.notification_retry.clone(),
            metrics.clone(),
        ));

        let ctx = EngineContext {
            store,
            inventory: InventoryLedger::new(metrics.clone()),
            refunds: RefundLedger::new(
                collaborators.payments,
                guard("payment", config.payment_breaker.clone()),
            ),
            dispatcher: dispatcher.clone(),
            clock,
            config: config.clone(),
            metrics: metrics.clone(),
        };

        let orders = OrderLifecycleManager::new(
            ctx.clone(),
            collaborators.carts,
            collaborators.catalog,
            guard("cart", CircuitBreakerConfig::default()),
            guard("catalog", CircuitBreakerConfig::default()),
        );
        let returns = ReturnLifecycleManager::new(
            ctx,
            collaborators.carrier,
            guard("carrier", config.carrier_breaker.clone()),
        );

        tracing::info!(
            return_window_days = config.return_window_days,
            collaborator_timeout_ms = timeout.as_millis() as u64,
            "Order engine ready"
        );

        Ok(Self {
            orders,
            returns,
            dispatcher,
            metrics,
        })
    }
}

#[cfg(test)]
pub(crate) mod harness {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collaborators::{
        Cart, CartLine, InMemoryCarts, ProductSnapshot, RecordingCarrier, RecordingGateway,
        RecordingNotifier, RecordingPublisher, StaticCatalog,
    };
    use crate::domain::fixtures::address;
    use crate::domain::order::{
        CustomerContact, Money, Order, OrderStatus, PlaceOrderInput, ShippingMethod,
    };
    use crate::domain::Actor;
    use crate::store::MemoryStore;
    use chrono::Utc;
    use std::time::Duration;
    use uuid::Uuid;

    pub struct Harness {
        pub engine: Engine,
        pub store: Arc<MemoryStore>,
        pub carts: Arc<InMemoryCarts>,
        pub catalog: Arc<StaticCatalog>,
        pub carrier: Arc<RecordingCarrier>,
        pub gateway: Arc<RecordingGateway>,
        pub notifier: Arc<RecordingNotifier>,
        pub publisher: Arc<RecordingPublisher>,
        pub clock: Arc<ManualClock>,
    }

    pub fn checkout_input() -> PlaceOrderInput {
        PlaceOrderInput {
            customer: CustomerContact {
                name: "Asha Rao".to_string(),
                email: "asha@example.com".to_string(),
            },
            shipping_address: address(),
            billing_address: None,
            payment_method: "card".to_string(),
            shipping_method: ShippingMethod::Standard,
            discount_code: None,
            idempotency_key: None,
        }
    }

    impl Harness {
        pub async fn new() -> Self {
            Self::with_config(|_| {}).await
        }

        pub async fn with_config(tweak: impl FnOnce(&mut EngineConfig)) -> Self {
            let mut config = EngineConfig {
                collaborator_timeout: Duration::from_millis(200),
                ..Default::default()
            };
            config.notification_retry.initial_delay = Duration::from_millis(1);
            tweak(&mut config);

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
                engine,
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

        pub async fn product(&self, name: &str, stock: i64, price: i64) -> Uuid {
            let product_id = Uuid::new_v4();
            self.product_with_id(product_id, name, price).await;
            self.store.set_stock(product_id, stock).await.unwrap();
            product_id
        }

        pub async fn product_with_id(&self, product_id: Uuid, name: &str, price: i64) {
            self.catalog
                .insert(
                    product_id,
                    ProductSnapshot {
                        name: name.to_string(),
                        sku: Some(format!("SKU-{}", &product_id.to_string()[..6])),
                        image_ref: None,
                        price: Money::from(price),
                        seller_id: Uuid::nil(),
                        seller_name: "Acme Traders".to_string(),
                    },
                )
                .await;
        }

        /// `(product, quantity, unit price)` lines
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
            self.store.stock_level(product_id).await.unwrap().unwrap().stock
        }

        /// Place an order for a fresh user, one product per
        /// `(stock, quantity, unit price)` line.
        pub async fn placed_order(&self, lines: &[(i64, u32, i64)]) -> (Order, Vec<Uuid>) {
            let user = Uuid::new_v4();
            let mut products = Vec::new();
            let mut cart = Vec::new();
            for (stock, quantity, price) in lines {
                let product = self.product("Item", *stock, *price).await;
                products.push(product);
                cart.push((product, *quantity, *price));
            }
            self.cart(user, &cart).await;
            let order = self
                .engine
                .orders
                .create_order_from_cart(user, checkout_input())
                .await
                .unwrap();
            (order, products)
        }

        /// Placed, paid in full and walked to `delivered`.
        pub async fn delivered_order(&self, lines: &[(i64, u32, i64)]) -> (Order, Vec<Uuid>) {
            let (order, products) = self.placed_order(lines).await;
            let orders = &self.engine.orders;
            orders.record_payment(order.id, order.total_amount, "pay_test").await.unwrap();
            for status in [
                OrderStatus::Confirmed,
                OrderStatus::Processing,
                OrderStatus::Shipped,
                OrderStatus::Delivered,
            ] {
                orders.update_order_status(order.id, status, Actor::System, None, None).await.unwrap();
            }
            let order = orders.get_order_admin(order.id).await.unwrap();
            (order, products)
        }
    }
}
