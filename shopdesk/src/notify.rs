use crate::identifiers::Identity;
use crate::render::Notification;
use crate::store::CredentialStore;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_BOT_API: &str = "https://api.telegram.org";

/// Delivers a notification to one recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, recipient: Identity, notification: &Notification) -> Result<()>;
}

/// Sends notifications as Telegram bot messages; the recipient identity is the chat id.
pub struct TelegramNotifier {
    http_client: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl TelegramNotifier {
    pub fn new(api_base: &str, bot_token: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(TelegramNotifier {
            http_client,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
        })
    }

    fn message_body(recipient: Identity, notification: &Notification) -> Value {
        let mut body = json!({
            "chat_id": recipient,
            "text": notification.text,
            "parse_mode": "HTML",
        });
        if let Some(link) = &notification.link {
            body["reply_markup"] = json!({
                "inline_keyboard": [[{"text": link.label, "url": link.url}]]
            });
        }
        body
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, recipient: Identity, notification: &Notification) -> Result<()> {
        // the URL embeds the bot token, so it is not logged
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let res = self
            .http_client
            .post(url)
            .json(&Self::message_body(recipient, notification))
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            let body: Value = res.json().await.unwrap_or(Value::Null);
            return Err(anyhow!(
                "sendMessage to {} failed (HTTP {}): {}",
                recipient,
                status,
                body["description"].as_str().unwrap_or("no description")
            ));
        }
        debug!("delivered notification to {}", recipient);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FanOutReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Sends to every recipient concurrently. A failed delivery is logged and counted, and does
/// not affect the others.
pub async fn deliver_all(
    notifier: &dyn Notifier,
    recipients: &[Identity],
    notification: &Notification,
) -> FanOutReport {
    let results = join_all(
        recipients
            .iter()
            .map(|r| async move { (*r, notifier.deliver(*r, notification).await) }),
    )
    .await;
    let mut report = FanOutReport::default();
    for (recipient, res) in results {
        match res {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!("notification to {} not delivered: {:#}", recipient, e);
                report.failed += 1;
            }
        }
    }
    report
}

/// Notifies every currently authorized identity.
pub async fn fan_out(
    store: &CredentialStore,
    notifier: &dyn Notifier,
    notification: &Notification,
) -> crate::error::Result<FanOutReport> {
    let recipients = store.list_authorized().await?;
    let report = deliver_all(notifier, &recipients, notification).await;
    info!(
        "notification fan-out: {} delivered, {} failed",
        report.delivered, report.failed
    );
    Ok(report)
}

#[test]
fn test_message_body() {
    use crate::render::Link;

    let plain = Notification {
        text: "<b>hi</b>".to_string(),
        link: None,
    };
    let body = TelegramNotifier::message_body(Identity(42), &plain);
    assert_eq!(
        body,
        json!({"chat_id": 42, "text": "<b>hi</b>", "parse_mode": "HTML"})
    );

    let linked = Notification {
        text: "order".to_string(),
        link: Some(Link {
            label: "Open order".to_string(),
            url: "https://ass74.ru/order/abc".to_string(),
        }),
    };
    let body = TelegramNotifier::message_body(Identity(7), &linked);
    assert_eq!(
        body["reply_markup"]["inline_keyboard"][0][0]["url"],
        "https://ass74.ru/order/abc"
    );
}
