/// Token pair, pagination envelope, and storefront webhook payloads (manually entered)
use crate::error::{ApiError, Result};
use serde_json::Value;
use std::fmt;

/// Access and refresh token as issued by the backend.
#[derive(serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        TokenPair {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Both halves present. Only complete pairs are ever stored.
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }
}

// tokens end up in debug logs otherwise
impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

fn first_page() -> u32 {
    1
}

/// One page of a list endpoint: `{data, current_page, total_pages}`.
///
/// Items are left as raw JSON; callers pick out the fields they display.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct Page {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default = "first_page")]
    pub current_page: u32,
    #[serde(default = "first_page")]
    pub total_pages: u32,
}

impl Page {
    pub fn from_value(val: Value) -> Result<Self> {
        serde_json::from_value(val)
            .map_err(|e| ApiError::MalformedPayload(format!("expected a page of results: {}", e)))
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn previous(&self) -> Option<u32> {
        if self.current_page > 1 {
            Some(clamp_page(self.current_page - 1, self.total_pages))
        } else {
            None
        }
    }

    pub fn next(&self) -> Option<u32> {
        if self.current_page < self.total_pages {
            Some(self.current_page + 1)
        } else {
            None
        }
    }
}

/// Keeps page navigation inside `[1, total_pages]`. An empty listing still has page 1.
pub fn clamp_page(page: u32, total_pages: u32) -> u32 {
    page.clamp(1, total_pages.max(1))
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct OrderEvent {
    pub detail: OrderDetail,
}

/// Order as returned by `order/detail/<id>/` and pushed by the new-order webhook.
///
/// Prices arrive either as JSON numbers or as decimal strings, so they are kept as `Value`.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct OrderDetail {
    pub id: u64,
    pub unique_token: String,
    pub status: OrderStatus,
    pub total_price_with_discount: Value,
    pub address: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub patronymic: Option<String>,
    pub email: Option<String>,
    pub tel: Option<String>,
    pub items: Vec<OrderItem>,
}

impl OrderDetail {
    /// Total number of units across all positions.
    pub fn unit_count(&self) -> u64 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    pub fn customer_name(&self) -> String {
        [
            Some(self.first_name.as_str()),
            self.last_name.as_deref(),
            self.patronymic.as_deref(),
        ]
        .iter()
        .flatten()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<&str>>()
        .join(" ")
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct OrderStatus {
    pub status_name: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct OrderItem {
    pub price: Value,
    pub quantity: u64,
    pub product: Product,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct Product {
    pub name: String,
    pub item_number: Value,
    #[serde(default)]
    pub product_supplier_info: Option<Vec<SupplierStock>>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct SupplierStock {
    pub quantity: Value,
    pub purchase_price: Value,
    pub extra_charge_price: Value,
    #[serde(default)]
    pub supplier_info: Option<SupplierInfo>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct SupplierInfo {
    pub name: Option<String>,
}

/// Feedback application, as pushed by the new-application webhook and returned by
/// `feedback/request/<id>/`.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct ApplicationEvent {
    pub id: u64,
    pub status: String,
    pub email: Option<String>,
    pub tel: Option<String>,
    pub comment: Option<String>,
    pub created: String,
}

/// Renders a loosely-typed JSON scalar for display. Strings are shown without quotes.
pub fn value_text(val: &Value) -> String {
    match val {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
