use crate::error::{ApiError, Result};
use crate::models::{value_text, ApplicationEvent, OrderDetail, OrderEvent, OrderItem};
use askama::Template;
use serde_json::Value;

pub const DEFAULT_ORDER_URL: &str = "https://ass74.ru/order/";

const NOT_GIVEN: &str = "not given";

/// URL button attached below a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub label: String,
    pub url: String,
}

/// Chat message ready for delivery. `text` is HTML, with all backend values escaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub text: String,
    pub link: Option<Link>,
}

#[derive(Template)]
#[template(path = "order.html")]
struct OrderCard<'a> {
    heading: &'a str,
    status: &'a str,
    total: String,
    units: u64,
    address: &'a str,
    name: String,
    email: &'a str,
    phone: &'a str,
    items: Vec<ItemCard<'a>>,
}

struct ItemCard<'a> {
    name: &'a str,
    item_number: String,
    price: String,
    quantity: u64,
    stock: Vec<StockLine<'a>>,
}

struct StockLine<'a> {
    supplier: &'a str,
    quantity: String,
    purchase_price: String,
    extra_charge_price: String,
}

#[derive(Template)]
#[template(path = "application.html")]
struct ApplicationCard<'a> {
    heading: &'a str,
    status: &'a str,
    email: &'a str,
    phone: &'a str,
    comment: &'a str,
    created: &'a str,
}

fn or_default<'a>(val: Option<&'a str>, fallback: &'a str) -> &'a str {
    match val.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => fallback,
    }
}

pub fn parse_order_event(payload: Value) -> Result<OrderEvent> {
    serde_json::from_value(payload)
        .map_err(|e| ApiError::MalformedPayload(format!("order event: {}", e)))
}

pub fn parse_application_event(payload: Value) -> Result<ApplicationEvent> {
    serde_json::from_value(payload)
        .map_err(|e| ApiError::MalformedPayload(format!("application event: {}", e)))
}

impl<'a> ItemCard<'a> {
    fn new(item: &'a OrderItem) -> Self {
        let product = &item.product;
        let stock = product
            .product_supplier_info
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|s| StockLine {
                supplier: or_default(
                    s.supplier_info.as_ref().and_then(|i| i.name.as_deref()),
                    "Unknown supplier",
                ),
                quantity: value_text(&s.quantity),
                purchase_price: value_text(&s.purchase_price),
                extra_charge_price: value_text(&s.extra_charge_price),
            })
            .collect();
        ItemCard {
            name: &product.name,
            item_number: value_text(&product.item_number),
            price: value_text(&item.price),
            quantity: item.quantity,
            stock,
        }
    }
}

/// Full order card. `heading` is the first bold line, eg "NEW ORDER #12".
pub fn order_text(heading: &str, detail: &OrderDetail) -> Result<String> {
    let card = OrderCard {
        heading,
        status: &detail.status.status_name,
        total: value_text(&detail.total_price_with_discount),
        units: detail.unit_count(),
        address: or_default(detail.address.as_deref(), NOT_GIVEN),
        name: detail.customer_name(),
        email: or_default(detail.email.as_deref(), NOT_GIVEN),
        phone: or_default(detail.tel.as_deref(), NOT_GIVEN),
        items: detail.items.iter().map(ItemCard::new).collect(),
    };
    Ok(card.render()?)
}

/// Storefront page of an order; `order_url` is the prefix the unique token is appended to.
pub fn order_link(order_url: &str, detail: &OrderDetail) -> Link {
    let sep = if order_url.ends_with('/') { "" } else { "/" };
    Link {
        label: "Open order".to_string(),
        url: format!("{}{}{}", order_url, sep, detail.unique_token),
    }
}

pub fn order_notification(event: &OrderEvent, order_url: &str) -> Result<Notification> {
    let detail = &event.detail;
    Ok(Notification {
        text: order_text(&format!("NEW ORDER #{}", detail.id), detail)?,
        link: Some(order_link(order_url, detail)),
    })
}

pub fn application_text(heading: &str, app: &ApplicationEvent) -> Result<String> {
    let card = ApplicationCard {
        heading,
        status: &app.status,
        email: or_default(app.email.as_deref(), NOT_GIVEN),
        phone: or_default(app.tel.as_deref(), NOT_GIVEN),
        comment: or_default(app.comment.as_deref(), "none"),
        created: &app.created,
    };
    Ok(card.render()?)
}

pub fn application_notification(app: &ApplicationEvent) -> Result<Notification> {
    Ok(Notification {
        text: application_text(&format!("NEW APPLICATION #{}", app.id), app)?,
        link: None,
    })
}
