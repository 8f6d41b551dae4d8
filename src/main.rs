use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use order_returns_engine::collaborators::{
    Cart, CartLine, InMemoryCarts, ProductSnapshot, RecordingCarrier, RecordingGateway, StaticCatalog,
    TracingNotifier, TracingPublisher,
};
use order_returns_engine::domain::order::{CustomerContact, Money, OrderStatus, PlaceOrderInput, ShippingMethod};
use order_returns_engine::domain::returns::{
    CreateReturnInput, ItemCondition, ReturnLineInput, ReturnReason, ReturnStatus,
};
use order_returns_engine::domain::{Actor, Address};
use order_returns_engine::store::{CommerceStore, MemoryStore};
use order_returns_engine::{Collaborators, Engine, EngineConfig, SystemClock};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_returns_engine=debug")),
        )
        .init();

    tracing::info!("🚀 Starting order lifecycle and returns demo");

    // === 1. Configuration and in-process collaborators ===
    let config = EngineConfig::from_env()?;
    let store = Arc::new(MemoryStore::new());
    let carts = Arc::new(InMemoryCarts::default());
    let catalog = Arc::new(StaticCatalog::default());

    let engine = Engine::new(
        config,
        store.clone(),
        Collaborators {
            carts: carts.clone(),
            catalog: catalog.clone(),
            carrier: Arc::new(RecordingCarrier::default()),
            payments: Arc::new(RecordingGateway::default()),
            notifier: Arc::new(TracingNotifier),
            publisher: Arc::new(TracingPublisher),
        },
        Arc::new(SystemClock),
    )?;

    // === 2. Seed one product and a cart ===
    let product_id = Uuid::new_v4();
    let seller_id = Uuid::new_v4();
    let price = Money::new(49900, 2);
    catalog
        .insert(
            product_id,
            ProductSnapshot {
                name: "Trail Running Shoes".to_string(),
                sku: Some("TRS-42".to_string()),
                image_ref: None,
                price,
                seller_id,
                seller_name: "Peak Outfitters".to_string(),
            },
        )
        .await;
    store.set_stock(product_id, 10).await?;

    let user_id = Uuid::new_v4();
    carts
        .put(
            user_id,
            Cart::priced(vec![CartLine {
                product_id,
                quantity: 2,
                unit_price: price,
            }]),
        )
        .await;

    // === 3. Checkout ===
    let address = Address {
        full_name: "Asha Rao".to_string(),
        phone: None,
        line1: "12 MG Road".to_string(),
        line2: None,
        city: "Bengaluru".to_string(),
        state: "Karnataka".to_string(),
        postal_code: "560001".to_string(),
        country: "IN".to_string(),
    };
    let order = engine
        .orders
        .create_order_from_cart(
            user_id,
            PlaceOrderInput {
                customer: CustomerContact {
                    name: "Asha Rao".to_string(),
                    email: "asha@example.com".to_string(),
                },
                shipping_address: address.clone(),
                billing_address: None,
                payment_method: "card".to_string(),
                shipping_method: ShippingMethod::Express,
                discount_code: None,
                idempotency_key: Some("demo-checkout-1".to_string()),
            },
        )
        .await?;
    tracing::info!(order_id = %order.id, total = %order.total_amount, "Order placed");

    // === 4. Payment and fulfillment ===
    engine
        .orders
        .record_payment(order.id, order.total_amount, "pay_demo_001")
        .await?;
    for status in [
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
    ] {
        engine
            .orders
            .update_order_status(order.id, status, Actor::System, None, None)
            .await?;
    }
    let invoice = engine.orders.generate_invoice(order.id).await?;
    tracing::info!(invoice_number = %invoice.invoice_number, "Invoice generated");

    // === 5. Return one of the two pairs ===
    let admin = Uuid::new_v4();
    let ret = engine
        .returns
        .create_return_request(
            user_id,
            CreateReturnInput {
                order_id: order.id,
                items: vec![ReturnLineInput {
                    product_id,
                    quantity: 1,
                    reason: Some("Too small".to_string()),
                }],
                reason: ReturnReason::SizeIssue,
                description: "Half a size too small".to_string(),
                images: vec![],
                pickup_address: address,
            },
        )
        .await?;

    let returns = &engine.returns;
    returns.approve_return(ret.id, admin, Some("Within policy".to_string())).await?;
    returns.schedule_pickup(ret.id, Actor::User(admin)).await?;
    for status in ReturnStatus::CARRIER_REPORTED {
        returns.advance_return_status(ret.id, status, None, Actor::System).await?;
    }
    returns
        .inspect_return(ret.id, admin, ItemCondition::Good, None, vec![])
        .await?;
    returns
        .initiate_refund(ret.id, price, "original_payment", Actor::User(admin))
        .await?;
    let ret = returns.complete_refund(ret.id, None, Actor::User(admin)).await?;

    let order = engine.orders.get_order_admin(order.id).await?;
    tracing::info!(
        return_status = %ret.status,
        order_status = %order.status,
        refunded = %order.payment_details.refunded_amount,
        stock = store.stock_level(product_id).await?.map(|s| s.stock).unwrap_or_default(),
        "✅ Lifecycle complete"
    );

    // === 6. Let best-effort dispatch finish, then dump metrics ===
    engine.dispatcher.drain().await;
    println!("{}", engine.metrics.render()?);

    Ok(())
}
