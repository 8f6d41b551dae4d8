mod common;

use futures_util::future::join_all;
use uuid::Uuid;

use common::{checkout, TestEngine};
use order_returns_engine::domain::order::{Money, OrderStatus, PaymentStatus};
use order_returns_engine::domain::Actor;
use order_returns_engine::store::Page;
use order_returns_engine::EngineError;

#[tokio::test]
async fn test_concurrent_checkouts_for_last_unit_sell_it_once() {
    let t = TestEngine::new().await;
    let product = t.product(1, 250).await;

    let users: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
    for user in &users {
        t.cart(*user, &[(product, 1, 250)]).await;
    }

    let attempts = users.iter().map(|user| {
        let engine = t.engine.clone();
        let user = *user;
        tokio::spawn(async move { engine.orders.create_order_from_cart(user, checkout()).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.expect("task"))
        .collect();

    let placed = results.iter().filter(|r| r.is_ok()).count();
    let short = results
        .iter()
        .filter(|r| matches!(r, Err(EngineError::InsufficientStock(_))))
        .count();
    assert_eq!(placed, 1);
    assert_eq!(short, 3);
    assert_eq!(t.stock(product).await, 0);
}

#[tokio::test]
async fn test_shortfall_on_one_line_reserves_nothing() {
    let t = TestEngine::new().await;
    let plenty = t.product(10, 100).await;
    let scarce = t.product(1, 300).await;
    let user = Uuid::new_v4();
    t.cart(user, &[(plenty, 3, 100), (scarce, 2, 300)]).await;

    let err = t
        .engine
        .orders
        .create_order_from_cart(user, checkout())
        .await
        .unwrap_err();

    match err {
        EngineError::InsufficientStock(shortfalls) => {
            assert_eq!(shortfalls.len(), 1);
            assert_eq!(shortfalls[0].product_id, scarce);
            assert_eq!(shortfalls[0].requested, 2);
            assert_eq!(shortfalls[0].available, 1);
        }
        other => panic!("expected insufficient stock, got {other:?}"),
    }
    assert_eq!(t.stock(plenty).await, 10);
    assert_eq!(t.stock(scarce).await, 1);
    assert!(t
        .engine
        .orders
        .list_orders_for_user(user, Page::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_cancellation_restores_stock_and_refunds_payment() {
    let t = TestEngine::new().await;
    let product = t.product(10, 400).await;
    let user = Uuid::new_v4();

    let order = t.place(user, &[(product, 3, 400)]).await;
    assert_eq!(t.stock(product).await, 7);
    t.engine
        .orders
        .record_payment(order.id, order.total_amount, "pay_1")
        .await
        .unwrap();

    let cancelled = t
        .engine
        .orders
        .cancel_order(order.id, user, "ordered by mistake")
        .await
        .unwrap();

    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("ordered by mistake"));
    assert_eq!(cancelled.payment_details.status, PaymentStatus::Refunded);
    assert_eq!(cancelled.payment_details.refunded_amount, Money::from(1200));
    assert_eq!(t.stock(product).await, 10);

    let refunds = t.gateway.refunds().await;
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].1, Money::from(1200));
}

#[tokio::test]
async fn test_other_users_cannot_cancel_or_read() {
    let t = TestEngine::new().await;
    let product = t.product(5, 100).await;
    let owner = Uuid::new_v4();
    let order = t.place(owner, &[(product, 1, 100)]).await;
    let stranger = Uuid::new_v4();

    let err = t
        .engine
        .orders
        .cancel_order(order.id, stranger, "not mine")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "not_authorized");

    let err = t.engine.orders.get_order(order.id, stranger).await.unwrap_err();
    assert_eq!(err.code(), "not_authorized");
    assert_eq!(t.stock(product).await, 4);
}

#[tokio::test]
async fn test_delivered_order_is_not_cancellable() {
    let t = TestEngine::new().await;
    let product = t.product(5, 100).await;
    let user = Uuid::new_v4();
    let order = t.place(user, &[(product, 1, 100)]).await;
    t.deliver(&order).await;

    let err = t
        .engine
        .orders
        .cancel_order(order.id, user, "too late")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "not_cancellable");
    assert_eq!(t.stock(product).await, 4);
}

#[tokio::test]
async fn test_status_walk_assigns_tracking_and_rejects_skips() {
    let t = TestEngine::new().await;
    let product = t.product(5, 100).await;
    let order = t.place(Uuid::new_v4(), &[(product, 1, 100)]).await;
    let orders = &t.engine.orders;

    let err = orders
        .update_order_status(order.id, OrderStatus::Shipped, Actor::System, None, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_transition");

    for status in [OrderStatus::Confirmed, OrderStatus::Processing, OrderStatus::Shipped] {
        orders
            .update_order_status(order.id, status, Actor::System, None, Some("Hub A".to_string()))
            .await
            .unwrap();
    }

    let shipped = orders.get_order_admin(order.id).await.unwrap();
    assert_eq!(shipped.status, OrderStatus::Shipped);
    assert!(shipped.tracking_number.is_some());
    assert_eq!(shipped.status_history.len(), 4);
    assert_eq!(shipped.status_history[3].location.as_deref(), Some("Hub A"));
}

#[tokio::test]
async fn test_invoice_is_generated_once() {
    let t = TestEngine::new().await;
    let product = t.product(5, 100).await;
    let order = t.place(Uuid::new_v4(), &[(product, 2, 100)]).await;

    let first = t.engine.orders.generate_invoice(order.id).await.unwrap();
    let second = t.engine.orders.generate_invoice(order.id).await.unwrap();

    assert_eq!(first.invoice_number, second.invoice_number);
    assert_eq!(first.invoice_date, second.invoice_date);
    assert_eq!(first.total_amount, Money::from(200));
}

#[tokio::test]
async fn test_repeated_checkout_with_same_key_returns_first_order() {
    let t = TestEngine::new().await;
    let product = t.product(5, 100).await;
    let user = Uuid::new_v4();
    let input = order_returns_engine::domain::order::PlaceOrderInput {
        idempotency_key: Some("checkout-7".to_string()),
        ..checkout()
    };

    t.cart(user, &[(product, 2, 100)]).await;
    let first = t.engine.orders.create_order_from_cart(user, input.clone()).await.unwrap();
    t.cart(user, &[(product, 2, 100)]).await;
    let second = t.engine.orders.create_order_from_cart(user, input).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(t.stock(product).await, 3);
}

#[tokio::test]
async fn test_status_changes_notify_customer() {
    let t = TestEngine::new().await;
    let product = t.product(5, 100).await;
    let order = t.place(Uuid::new_v4(), &[(product, 1, 100)]).await;
    t.engine
        .orders
        .update_order_status(order.id, OrderStatus::Confirmed, Actor::System, None, None)
        .await
        .unwrap();

    t.engine.dispatcher.drain().await;
    let sent = t.notifier.sent().await;
    assert!(sent.iter().all(|n| n.subject_id() == order.id));
    assert!(!sent.is_empty());

    let types = t.publisher.event_types().await;
    assert!(types.iter().any(|t| t == "OrderPlaced"));
    assert!(types.iter().any(|t| t == "OrderStatusChanged"));
}
