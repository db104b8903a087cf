/// Storefront back-office operations: orders, feedback applications, dashboard, supplier
/// imports.
///
/// All of these endpoints expect the token pair as cookies rather than a bearer header.
use crate::client::{AuthScheme, Endpoint, SessionClient};
use crate::dashboard::DateSpan;
use crate::error::{ApiError, Result};
use crate::identifiers::Identity;
use crate::models::Page;
use crate::supplier::ExtraCharge;
use serde_json::{json, Value};

pub const DASHBOARD_PATH: &str = "/settings_site/dashboard/";
pub const SUPPLIER_IMPORT_PATH: &str = "/product_import_manager/supplier_import/";

impl SessionClient {
    /// Page numbers start at 1; 0 is treated as 1.
    pub async fn list_orders(&self, identity: Identity, page: u32) -> Result<Page> {
        let endpoint = Endpoint::get(
            format!("/order/list/{}/", page.max(1)),
            AuthScheme::CookiePair,
        );
        Page::from_value(self.call(identity, &endpoint, None).await?)
    }

    pub async fn order_detail(&self, identity: Identity, order_id: u64) -> Result<Value> {
        let endpoint = Endpoint::get(
            format!("/order/detail/{}/", order_id),
            AuthScheme::CookiePair,
        );
        self.call(identity, &endpoint, None).await
    }

    /// Page numbers start at 1; 0 is treated as 1.
    pub async fn list_applications(&self, identity: Identity, page: u32) -> Result<Page> {
        let endpoint = Endpoint::get(
            format!("/feedback/list/{}/", page.max(1)),
            AuthScheme::CookiePair,
        );
        Page::from_value(self.call(identity, &endpoint, None).await?)
    }

    pub async fn application_detail(&self, identity: Identity, application_id: u64) -> Result<Value> {
        let endpoint = Endpoint::get(
            format!("/feedback/request/{}/", application_id),
            AuthScheme::CookiePair,
        );
        self.call(identity, &endpoint, None).await
    }

    pub async fn dashboard(&self, identity: Identity, span: &DateSpan) -> Result<Value> {
        let body = json!({
            "date_in": span.date_in()?,
            "date_out": span.date_out()?,
        });
        let endpoint = Endpoint::post(DASHBOARD_PATH, AuthScheme::CookiePair);
        self.call(identity, &endpoint, Some(&body)).await
    }

    pub async fn supplier_import(&self, identity: Identity, supplier_slug: &str) -> Result<Value> {
        let body = json!({ "slug": supplier_slug });
        let endpoint = Endpoint::post(SUPPLIER_IMPORT_PATH, AuthScheme::CookiePair);
        self.call(identity, &endpoint, Some(&body)).await
    }

    /// Sets a supplier's markup. A reply of `{"status": "error", ...}` is a refused update.
    pub async fn update_supplier_charge(
        &self,
        identity: Identity,
        supplier_slug: &str,
        extra_charge: ExtraCharge,
    ) -> Result<Value> {
        let body = json!({
            "slug": supplier_slug,
            "extra_charge": extra_charge,
        });
        let endpoint = Endpoint::put(SUPPLIER_IMPORT_PATH, AuthScheme::CookiePair);
        let resp = self.call(identity, &endpoint, Some(&body)).await?;
        if resp["status"].as_str() == Some("error") {
            return Err(ApiError::Rejected(
                resp["message"]
                    .as_str()
                    .unwrap_or("unknown error")
                    .to_string(),
            ));
        }
        Ok(resp)
    }
}
