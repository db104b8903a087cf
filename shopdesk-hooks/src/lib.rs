use anyhow::Result;
use log::{debug, error, info, warn};
use rouille::{router, Request, Response};
use serde_json::{json, Value};
use shopdesk::render::{
    application_notification, order_notification, parse_application_event, parse_order_event,
};
use shopdesk::{deliver_all, CredentialStore, Notification, Notifier};
use std::io::Read;
use std::sync::Arc;

/// Everything a webhook request needs. Shared by all server threads.
pub struct HookContext {
    pub store: CredentialStore,
    pub notifier: Arc<dyn Notifier>,
    /// Deliveries are spawned here and outlive the request that triggered them
    pub runtime: tokio::runtime::Handle,
    pub order_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookKind {
    Order,
    Application,
}

impl WebhookKind {
    fn render(&self, payload: Value, order_url: &str) -> shopdesk::error::Result<Notification> {
        match self {
            WebhookKind::Order => order_notification(&parse_order_event(payload)?, order_url),
            WebhookKind::Application => {
                application_notification(&parse_application_event(payload)?)
            }
        }
    }
}

pub fn run_server(host: &str, port: u16, ctx: HookContext) -> Result<()> {
    let log_ok = |req: &Request, resp: &Response, elap: std::time::Duration| {
        info!(
            "{} {} {} ({:?})",
            req.method(),
            req.raw_url(),
            resp.status_code,
            elap
        );
    };
    let log_err = |req: &Request, elap: std::time::Duration| {
        error!(
            "HTTP handler panicked: {} {} ({:?})",
            req.method(),
            req.raw_url(),
            elap
        );
    };
    info!("listening for webhooks on {}:{}", host, port);
    rouille::start_server(format!("{}:{}", host, port), move |request| {
        rouille::log_custom(request, log_ok, log_err, || handle_request(&ctx, request))
    });
}

pub fn handle_request(ctx: &HookContext, request: &Request) -> Response {
    router!(request,
        (POST) ["/webhook/orders"] => {
            handle_webhook(ctx, request, WebhookKind::Order)
        },
        (POST) ["/webhook/feedback"] => {
            handle_webhook(ctx, request, WebhookKind::Application)
        },
        _ => Response::empty_404()
    )
}

fn error_response(status: u16, msg: &str) -> Response {
    Response::json(&json!({ "error": msg })).with_status_code(status)
}

/// JSON body of the request, or None if it is missing, unparseable, or an empty value.
fn read_json_body(request: &Request) -> Option<Value> {
    let mut raw = Vec::new();
    request.data()?.read_to_end(&mut raw).ok()?;
    let val: Value = serde_json::from_slice(&raw).ok()?;
    let empty = match &val {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Bool(b) => !b,
        Value::Number(_) => false,
    };
    if empty {
        None
    } else {
        Some(val)
    }
}

/// Accepts an event, then notifies every authorized identity in the background.
///
/// The response only reflects whether the event was accepted; delivery failures are logged
/// and never reach the caller.
fn handle_webhook(ctx: &HookContext, request: &Request, kind: WebhookKind) -> Response {
    let payload = match read_json_body(request) {
        Some(v) => v,
        None => return error_response(400, "Invalid data"),
    };
    let notification = match kind.render(payload, &ctx.order_url) {
        Ok(n) => n,
        Err(e) => {
            warn!("could not render {:?} webhook: {}", kind, e);
            return error_response(500, &e.to_string());
        }
    };
    let recipients = match ctx.runtime.block_on(ctx.store.list_authorized()) {
        Ok(r) => r,
        Err(e) => {
            error!("could not list authorized identities: {:#}", e);
            return error_response(500, &e.to_string());
        }
    };
    debug!("{:?} webhook: notifying {} identities", kind, recipients.len());
    let notifier = ctx.notifier.clone();
    ctx.runtime.spawn(async move {
        let report = deliver_all(notifier.as_ref(), &recipients, &notification).await;
        info!(
            "{:?} notification: {} delivered, {} failed",
            kind, report.delivered, report.failed
        );
    });
    Response::json(&json!({ "status": "success" }))
}
