use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::Address;
use super::aggregate::Order;
use super::value_objects::{CustomerContact, Money, OrderItem, OrderStatus, PaymentStatus};

/// Read view rendered from an order that already carries an invoice number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceView {
    pub invoice_number: String,
    pub invoice_date: DateTime<Utc>,
    pub order_id: Uuid,
    pub order_date: DateTime<Utc>,
    pub order_status: OrderStatus,
    pub customer: CustomerContact,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub discount_amount: Money,
    pub discount_code: Option<String>,
    pub shipping_cost: Money,
    pub tax_amount: Money,
    pub total_amount: Money,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
    pub paid_amount: Money,
    pub refunded_amount: Money,
}

impl InvoiceView {
    /// `None` until the order has been invoiced.
    pub fn from_order(order: &Order) -> Option<Self> {
        let invoice_number = order.invoice_number.clone()?;
        let invoice_date = order.invoice_date?;

        Some(Self {
            invoice_number,
            invoice_date,
            order_id: order.id,
            order_date: order.created_at,
            order_status: order.status,
            customer: order.customer.clone(),
            shipping_address: order.shipping_address.clone(),
            billing_address: order.billing_address.clone(),
            items: order.items.clone(),
            subtotal: order.subtotal,
            discount_amount: order.discount_amount,
            discount_code: order.discount_code.clone(),
            shipping_cost: order.shipping_cost,
            tax_amount: order.tax_amount,
            total_amount: order.total_amount,
            payment_method: order.payment_details.method.clone(),
            payment_status: order.payment_details.status,
            paid_amount: order.payment_details.paid_amount,
            refunded_amount: order.payment_details.refunded_amount,
        })
    }
}
