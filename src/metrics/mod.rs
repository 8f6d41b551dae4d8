use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use rust_decimal::prelude::ToPrimitive;

use crate::domain::order::Money;
use crate::domain::refund::RefundSource;

// ============================================================================
// Metrics Module - Prometheus metrics for the engine
// ============================================================================
//
// Tracks:
// - Order creation (count, latency) and stock reservation failures
// - Order and return status transitions
// - Refunds recorded (count and amount in minor units)
// - Collaborator failures and best-effort dispatch failures
//
// `render` produces the text exposition for whatever HTTP layer hosts the
// engine.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Orders
    pub orders_created: IntCounter,
    pub order_creation_duration: Histogram,
    pub stock_reservation_failures: IntCounter,
    pub order_transitions: IntCounterVec,

    // Returns
    pub returns_opened: IntCounter,
    pub return_transitions: IntCounterVec,

    // Refunds
    pub refunds_recorded: IntCounterVec,
    pub refunded_amount_minor: IntCounterVec,

    // Collaborators
    pub collaborator_failures: IntCounterVec,
    pub dispatch_failures: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Orders
        let orders_created = IntCounter::new("orders_created_total", "Total orders created")?;
        registry.register(Box::new(orders_created.clone()))?;

        let order_creation_duration = Histogram::with_opts(
            HistogramOpts::new("order_creation_duration_seconds", "Cart to order conversion duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(order_creation_duration.clone()))?;

        let stock_reservation_failures = IntCounter::new(
            "stock_reservation_failures_total",
            "Checkout attempts rejected for insufficient stock",
        )?;
        registry.register(Box::new(stock_reservation_failures.clone()))?;

        let order_transitions = IntCounterVec::new(
            Opts::new("order_transitions_total", "Order status transitions"),
            &["to"],
        )?;
        registry.register(Box::new(order_transitions.clone()))?;

        // Returns
        let returns_opened = IntCounter::new("returns_opened_total", "Return requests created")?;
        registry.register(Box::new(returns_opened.clone()))?;

        let return_transitions = IntCounterVec::new(
            Opts::new("return_transitions_total", "Return status transitions"),
            &["to"],
        )?;
        registry.register(Box::new(return_transitions.clone()))?;

        // Refunds
        let refunds_recorded = IntCounterVec::new(
            Opts::new("refunds_recorded_total", "Refunds applied to orders"),
            &["source"],
        )?;
        registry.register(Box::new(refunds_recorded.clone()))?;

        let refunded_amount_minor = IntCounterVec::new(
            Opts::new("refunded_amount_minor_total", "Refunded amount in minor currency units"),
            &["source"],
        )?;
        registry.register(Box::new(refunded_amount_minor.clone()))?;

        // Collaborators
        let collaborator_failures = IntCounterVec::new(
            Opts::new("collaborator_failures_total", "Failed calls to external collaborators"),
            &["service", "kind"],
        )?;
        registry.register(Box::new(collaborator_failures.clone()))?;

        let dispatch_failures = IntCounterVec::new(
            Opts::new("dispatch_failures_total", "Notifications or events dropped after retries"),
            &["channel"],
        )?;
        registry.register(Box::new(dispatch_failures.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            order_creation_duration,
            stock_reservation_failures,
            order_transitions,
            returns_opened,
            return_transitions,
            refunds_recorded,
            refunded_amount_minor,
            collaborator_failures,
            dispatch_failures,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition of every registered metric
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub fn record_order_transition(&self, to: &str) {
        self.order_transitions.with_label_values(&[to]).inc();
    }

    pub fn record_return_transition(&self, to: &str) {
        self.return_transitions.with_label_values(&[to]).inc();
    }

    pub fn record_refund(&self, source: RefundSource, amount: Money) {
        let source = source.as_str();
        self.refunds_recorded.with_label_values(&[source]).inc();
        let minor = (amount * Money::ONE_HUNDRED).round().to_u64().unwrap_or(0);
        self.refunded_amount_minor.with_label_values(&[source]).inc_by(minor);
    }

    pub fn record_collaborator_failure(&self, service: &str, kind: &str) {
        self.collaborator_failures.with_label_values(&[service, kind]).inc();
    }

    pub fn record_dispatch_failure(&self, channel: &str) {
        self.dispatch_failures.with_label_values(&[channel]).inc();
    }
}
