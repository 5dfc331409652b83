//! Order emails: subject, HTML and plain-text bodies.

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write;

use crate::domain::aggregates::{Order, OrderStatus, PaymentStatus};
use crate::domain::events::OrderEvent;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipient {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub to: Recipient,
    pub subject: String,
    pub html: String,
    pub text: String,
}

pub fn status_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "Pending",
        OrderStatus::Processing => "Processing",
        OrderStatus::Shipped => "Shipped",
        OrderStatus::Delivered => "Delivered",
        OrderStatus::Cancelled => "Cancelled",
        OrderStatus::Refunded => "Refunded",
    }
}

pub fn payment_status_label(status: PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Pending => "Awaiting payment",
        PaymentStatus::Paid => "Paid",
        PaymentStatus::Failed => "Payment failed",
        PaymentStatus::Refunded => "Refunded",
    }
}

fn payment_method_label(method: Option<&str>) -> String {
    match method {
        Some(crate::domain::aggregates::CASH_ON_DELIVERY) => "Cash on delivery".to_string(),
        Some("card") => "Card".to_string(),
        Some(other) => other.replace('_', " "),
        None => "Not specified".to_string(),
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn money(amount: Decimal) -> String { format!("{:.2} €", amount.round_dp(2)) }

struct Line {
    name: String,
    quantity: Option<i64>,
    amount: Decimal,
}

/// Items are opaque JSON; the common field spellings are read and anything else is ignored.
fn lines(items: &Value) -> Vec<Line> {
    let Some(items) = items.as_array() else { return Vec::new() };
    items
        .iter()
        .map(|item| {
            let name = ["name", "product_name"]
                .iter()
                .find_map(|k| item.get(*k).and_then(Value::as_str))
                .unwrap_or("Item")
                .to_string();
            let amount = ["price", "total"]
                .iter()
                .find_map(|k| item.get(*k))
                .and_then(|v| -> Option<Decimal> {
                    match v {
                        Value::Number(n) => n.to_string().parse().ok(),
                        Value::String(s) => s.parse().ok(),
                        _ => None,
                    }
                })
                .unwrap_or_default();
            Line { name, quantity: item.get("quantity").and_then(Value::as_i64), amount }
        })
        .collect()
}

fn address_line(address: &Value) -> String {
    let parts: Vec<&str> = ["street", "city", "postal_code", "country"]
        .iter()
        .filter_map(|k| address.get(*k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() { "Not specified".to_string() } else { parts.join(", ") }
}

fn greeting(to: &Recipient) -> String { format!("Hello {},", to.name.as_deref().unwrap_or("valued customer")) }

fn html_page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"UTF-8\"></head>\
         <body style=\"font-family: Arial, sans-serif; color: #333;\">\
         <div style=\"max-width: 600px; margin: 0 auto; padding: 20px;\">\
         <h1 style=\"background: #4CAF50; color: #fff; padding: 20px; text-align: center;\">{}</h1>{}\
         <p style=\"color: #666; font-size: 12px; text-align: center;\">This email was sent automatically, please do not reply.</p>\
         </div></body></html>",
        escape(title),
        body
    )
}

pub fn order_confirmation(order: &Order, to: Recipient) -> EmailMessage {
    let lines = lines(&order.items);
    let address = address_line(&order.shipping_address);
    let date = order.created_at.format("%Y-%m-%d %H:%M UTC");
    let method = payment_method_label(order.payment_method.as_deref());

    let mut rows = String::new();
    let mut text_items = String::new();
    for line in &lines {
        let qty = line.quantity.map(|q| format!(" x{q}")).unwrap_or_default();
        _ = write!(
            rows,
            "<tr><td style=\"padding: 8px;\">{}{}</td><td style=\"padding: 8px; text-align: right;\">{}</td></tr>",
            escape(&line.name),
            qty,
            money(line.amount)
        );
        _ = writeln!(text_items, "- {}{}: {}", line.name, qty, money(line.amount));
    }
    if lines.is_empty() {
        rows.push_str("<tr><td colspan=\"2\">No items</td></tr>");
        text_items.push_str("No items\n");
    }

    let mut totals = format!("<p><strong>Subtotal:</strong> {}</p>", money(order.subtotal));
    for (label, amount) in [("Discount", -order.discount), ("Tax", order.tax), ("Shipping", order.shipping)] {
        if !amount.is_zero() {
            _ = write!(totals, "<p><strong>{label}:</strong> {}</p>", money(amount));
        }
    }
    _ = write!(totals, "<p style=\"font-size: 18px;\"><strong>Total:</strong> {}</p>", money(order.total));

    let body = format!(
        "<p>{hello}</p><p>We have received your order, thank you!</p>\
         <h2>Order details</h2>\
         <p><strong>Order number:</strong> {number}</p><p><strong>Date:</strong> {date}</p>\
         <p><strong>Status:</strong> {status}</p><p><strong>Payment method:</strong> {method}</p>\
         <p><strong>Payment status:</strong> {payment}</p>\
         <table style=\"width: 100%; border-collapse: collapse;\">{rows}</table>{totals}\
         <h3>Shipping address</h3><p>{address}</p>",
        hello = escape(&greeting(&to)),
        number = escape(&order.order_number),
        status = status_label(order.status),
        method = escape(&method),
        payment = payment_status_label(order.payment_status),
        address = escape(&address),
    );

    let text = format!(
        "Order confirmation\n\n{hello}\n\nWe have received your order, thank you!\n\n\
         Order number: {number}\nDate: {date}\nStatus: {status}\nPayment method: {method}\n\
         Payment status: {payment}\n\nItems:\n{text_items}\nTotal: {total}\n\nShipping address: {address}\n",
        hello = greeting(&to),
        number = order.order_number,
        status = status_label(order.status),
        payment = payment_status_label(order.payment_status),
        total = money(order.total),
    );

    EmailMessage {
        subject: format!("Order confirmation - {}", order.order_number),
        html: html_page("Order confirmation", &body),
        text,
        to,
    }
}

pub fn status_update(order: &Order, from: OrderStatus, to_status: OrderStatus, to: Recipient) -> EmailMessage {
    let tracking = order
        .tracking_number
        .as_deref()
        .filter(|_| to_status == OrderStatus::Shipped);
    let mut body = format!(
        "<p>{}</p><p>The status of your order <strong>{}</strong> changed from <strong>{}</strong> to <strong>{}</strong>.</p>",
        escape(&greeting(&to)),
        escape(&order.order_number),
        status_label(from),
        status_label(to_status)
    );
    let mut text = format!(
        "{}\n\nThe status of your order {} changed from {} to {}.\n",
        greeting(&to),
        order.order_number,
        status_label(from),
        status_label(to_status)
    );
    if let Some(tracking) = tracking {
        _ = write!(body, "<p><strong>Tracking number:</strong> {}</p>", escape(tracking));
        _ = writeln!(text, "Tracking number: {tracking}");
    }

    EmailMessage {
        subject: format!("Order {} - {}", order.order_number, status_label(to_status)),
        html: html_page("Order update", &body),
        text,
        to,
    }
}

pub fn payment_update(order: &Order, from: PaymentStatus, to_status: PaymentStatus, to: Recipient) -> EmailMessage {
    let body = format!(
        "<p>{}</p><p>The payment status of your order <strong>{}</strong> changed from <strong>{}</strong> to <strong>{}</strong>.</p>\
         <p><strong>Amount:</strong> {}</p>",
        escape(&greeting(&to)),
        escape(&order.order_number),
        payment_status_label(from),
        payment_status_label(to_status),
        money(order.total)
    );
    let text = format!(
        "{}\n\nThe payment status of your order {} changed from {} to {}.\nAmount: {}\n",
        greeting(&to),
        order.order_number,
        payment_status_label(from),
        payment_status_label(to_status),
        money(order.total)
    );

    EmailMessage {
        subject: format!("Payment update for order {}", order.order_number),
        html: html_page("Payment update", &body),
        text,
        to,
    }
}

/// The email announcing `event`.
pub fn render(event: &OrderEvent, order: &Order, to: Recipient) -> EmailMessage {
    match *event {
        OrderEvent::Placed { .. } => order_confirmation(order, to),
        OrderEvent::StatusChanged { from, to: next, .. } => status_update(order, from, next, to),
        OrderEvent::PaymentStatusChanged { from, to: next, .. } => payment_update(order, from, next, to),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::tests::new_order;
    use serde_json::json;

    fn recipient() -> Recipient { Recipient { email: "a@b.c".into(), name: Some("Awa <Diop>".into()) } }

    #[test]
    fn test_confirmation_lists_items_and_escapes() {
        let (order, placed) = Order::place(new_order(Some("cash_on_delivery")), None);
        let email = render(&placed, &order, recipient());
        assert_eq!(email.subject, format!("Order confirmation - {}", order.order_number));
        assert!(email.html.contains("Widget x2"));
        assert!(email.html.contains("Awa &lt;Diop&gt;"));
        assert!(email.text.contains("Payment method: Cash on delivery"));
        assert!(email.text.contains("Total: 27.00 €"));
        assert!(email.text.contains("1 Main St, Dakar, SN"));
    }

    #[test]
    fn test_status_update_mentions_tracking_when_shipped() {
        let (mut order, _) = Order::place(new_order(None), None);
        order.tracking_number = Some("TRK-9".into());
        let email = status_update(&order, OrderStatus::Processing, OrderStatus::Shipped, recipient());
        assert!(email.text.contains("from Processing to Shipped"));
        assert!(email.text.contains("TRK-9"));
        let email = status_update(&order, OrderStatus::Pending, OrderStatus::Processing, recipient());
        assert!(!email.text.contains("TRK-9"));
    }

    #[test]
    fn test_lines_tolerate_odd_items() {
        let parsed = lines(&json!([{"product_name": "Mug", "total": "4.5"}, {"quantity": 1}, 7]));
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].name, "Mug");
        assert_eq!(parsed[0].amount, Decimal::new(45, 1));
        assert_eq!(parsed[1].name, "Item");
        assert!(lines(&json!({"not": "a list"})).is_empty());
    }
}
