use crate::error::{DeliveryError, Result};
use crate::traits::ChatTransport;
use crate::types::{CommandSpec, InboundEvent, OutboundMessage, UserId};
use chrono::Utc;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;

const TELEGRAM_TRANSPORT_ID: &str = "telegram";
const TELEGRAM_LONG_POLL_TIMEOUT_SECS: &str = "30";
const TELEGRAM_ALLOWED_UPDATES: &str = r#"["message"]"#;
const TELEGRAM_NON_TRANSIENT_DELAY: Duration = Duration::from_secs(10);
const TELEGRAM_RETRY_BASE_MS: u64 = 250;
const TELEGRAM_RETRY_MAX_MS: u64 = 30_000;

#[derive(Clone)]
pub struct TelegramTransport {
    http: reqwest::Client,
    bot_token: String,
    admin_chat_id: i64,
}

impl TelegramTransport {
    pub fn new(bot_token: &str, admin_chat_id: i64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            bot_token: bot_token.to_string(),
            admin_chat_id,
        })
    }

    fn api_url(&self, method: &str) -> Result<Url> {
        Url::parse(&format!(
            "https://api.telegram.org/bot{}/{}",
            self.bot_token, method
        ))
        .map_err(|e| DeliveryError::Http(e.to_string()))
    }

    async fn post_message(&self, chat_id: &str, message: &OutboundMessage) -> Result<()> {
        let url = self.api_url("sendMessage")?;
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": message.content,
        });
        if message.formatted {
            body["parse_mode"] = serde_json::Value::String("Markdown".to_string());
        }
        let resp = self.http.post(url).json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|error| format!("<failed to read telegram error body: {error}>"));
            return Err(DeliveryError::Rejected { status, body });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChatTransport for TelegramTransport {
    fn transport_id(&self) -> &str {
        TELEGRAM_TRANSPORT_ID
    }

    async fn start(&self, tx: mpsc::Sender<InboundEvent>) -> Result<()> {
        let transport = self.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.run_poll_loop(tx).await {
                tracing::error!(%e, "telegram poll loop exited");
            }
        });
        Ok(())
    }

    async fn send_to_user(&self, user_id: &UserId, message: OutboundMessage) -> Result<()> {
        self.post_message(user_id.as_str(), &message).await
    }

    async fn send_to_admin(&self, message: OutboundMessage) -> Result<()> {
        self.post_message(&self.admin_chat_id.to_string(), &message)
            .await
    }

    async fn register_commands(&self, commands: &[CommandSpec]) -> Result<()> {
        let url = self.api_url("setMyCommands")?;
        let body = serde_json::json!({ "commands": commands });
        let resp = self.http.post(url).json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|error| format!("<failed to read telegram error body: {error}>"));
            return Err(DeliveryError::Rejected { status, body });
        }
        Ok(())
    }
}

impl TelegramTransport {
    #[tracing::instrument(level = "info", skip_all)]
    async fn run_poll_loop(&self, tx: mpsc::Sender<InboundEvent>) -> Result<()> {
        let mut offset: i64 = 0;
        let mut consecutive_failures: u32 = 0;

        loop {
            let url = self.api_url("getUpdates")?;
            let response = match self
                .http
                .get(url)
                .query(&[
                    ("timeout", TELEGRAM_LONG_POLL_TIMEOUT_SECS),
                    ("offset", &offset.to_string()),
                    ("allowed_updates", TELEGRAM_ALLOWED_UPDATES),
                ])
                .send()
                .await
            {
                Ok(response) => response,
                Err(error) => {
                    consecutive_failures += 1;
                    let delay = transient_retry_delay(consecutive_failures);
                    tracing::warn!(
                        %error,
                        attempt = consecutive_failures,
                        ?delay,
                        "telegram getUpdates request failed; retrying with backoff"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_else(|error| {
                    format!("<failed to read telegram error body: {error}>")
                });
                if is_transient_status(status) {
                    consecutive_failures += 1;
                    let delay = transient_retry_delay(consecutive_failures);
                    tracing::warn!(
                        %status,
                        %body,
                        attempt = consecutive_failures,
                        ?delay,
                        "telegram getUpdates transient failure; retrying with backoff"
                    );
                    tokio::time::sleep(delay).await;
                } else {
                    consecutive_failures = 0;
                    tracing::error!(
                        %status,
                        %body,
                        ?TELEGRAM_NON_TRANSIENT_DELAY,
                        "telegram getUpdates non-transient failure; keeping poll loop alive"
                    );
                    tokio::time::sleep(TELEGRAM_NON_TRANSIENT_DELAY).await;
                }
                continue;
            }

            let parsed = match response.json::<TelegramGetUpdatesResponse>().await {
                Ok(parsed) => parsed,
                Err(error) => {
                    consecutive_failures += 1;
                    let delay = transient_retry_delay(consecutive_failures);
                    tracing::warn!(
                        %error,
                        attempt = consecutive_failures,
                        ?delay,
                        "telegram getUpdates payload parse failed; retrying with backoff"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            consecutive_failures = 0;

            let mut updates = parsed.result;
            updates.sort_by_key(|update| update.update_id);
            for update in updates {
                // Advance offset before conversion to avoid poison-update replay loops.
                if update.update_id < offset {
                    continue;
                }
                offset = update.update_id.saturating_add(1);

                if let Some(inbound) = build_inbound_event(&update, self.admin_chat_id) {
                    tx.send(inbound)
                        .await
                        .map_err(|e| DeliveryError::QueueClosed(e.to_string()))?;
                }
            }
        }
    }
}

fn transient_retry_delay(attempt: u32) -> Duration {
    let multiplier = 1_u64 << attempt.saturating_sub(1).min(10);
    Duration::from_millis((TELEGRAM_RETRY_BASE_MS * multiplier).min(TELEGRAM_RETRY_MAX_MS))
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn build_inbound_event(update: &TelegramUpdate, admin_chat_id: i64) -> Option<InboundEvent> {
    let message = update.message.as_ref()?;
    let chat = message.chat.as_ref()?;
    let text = message
        .text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())?;
    let user_id = message
        .from
        .as_ref()
        .map(|user| user.id.to_string())
        .unwrap_or_else(|| format!("chat:{}", chat.id));
    let sender_display = message
        .from
        .as_ref()
        .and_then(|user| user.username.as_deref())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| user_id.clone());
    let message_id = message
        .message_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| format!("update:{}", update.update_id));

    Some(InboundEvent {
        message_id: message_id.into(),
        user_id: user_id.into(),
        is_admin_channel: chat.id == admin_chat_id,
        sender_display,
        text: text.to_string(),
        received_at: Utc::now(),
    })
}

#[derive(Debug, Deserialize)]
struct TelegramGetUpdatesResponse {
    #[serde(default)]
    result: Vec<TelegramUpdate>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    #[serde(default)]
    message_id: Option<i64>,
    #[serde(default)]
    from: Option<TelegramUser>,
    #[serde(default)]
    chat: Option<TelegramChat>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: i64,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

#[cfg(test)]
mod tests {
    use super::{
        TelegramChat, TelegramMessage, TelegramUpdate, TelegramUser, build_inbound_event,
        transient_retry_delay,
    };

    const ADMIN_CHAT_ID: i64 = -100;

    fn text_update(update_id: i64, chat_id: i64, text: Option<&str>) -> TelegramUpdate {
        TelegramUpdate {
            update_id,
            message: Some(TelegramMessage {
                message_id: Some(update_id * 10),
                from: Some(TelegramUser {
                    id: 42,
                    username: Some("sender".to_string()),
                }),
                chat: Some(TelegramChat { id: chat_id }),
                text: text.map(ToOwned::to_owned),
            }),
        }
    }

    #[test]
    fn retry_delay_grows_exponentially_and_caps() {
        assert_eq!(transient_retry_delay(1).as_millis(), 250);
        assert_eq!(transient_retry_delay(2).as_millis(), 500);
        assert_eq!(transient_retry_delay(3).as_millis(), 1000);
        assert_eq!(transient_retry_delay(20).as_millis(), 30000);
    }

    #[test]
    fn inbound_builder_tags_admin_channel_by_chat_id() {
        let from_user = build_inbound_event(&text_update(1, 42, Some("hi")), ADMIN_CHAT_ID)
            .expect("user message");
        assert!(!from_user.is_admin_channel);
        assert_eq!(from_user.user_id.as_str(), "42");
        assert_eq!(from_user.sender_display, "sender");

        let from_admin =
            build_inbound_event(&text_update(2, ADMIN_CHAT_ID, Some("on it")), ADMIN_CHAT_ID)
                .expect("admin message");
        assert!(from_admin.is_admin_channel);
        assert_eq!(from_admin.text, "on it");
    }

    #[test]
    fn inbound_builder_skips_non_text_and_blank_messages() {
        assert!(build_inbound_event(&text_update(1, 42, None), ADMIN_CHAT_ID).is_none());
        assert!(build_inbound_event(&text_update(2, 42, Some("   ")), ADMIN_CHAT_ID).is_none());
    }

    #[test]
    fn inbound_builder_trims_text_and_falls_back_to_numeric_display() {
        let mut update = text_update(5, 42, Some("  hello  "));
        update.message.as_mut().unwrap().from = Some(TelegramUser {
            id: 42,
            username: None,
        });
        let inbound = build_inbound_event(&update, ADMIN_CHAT_ID).expect("text message");
        assert_eq!(inbound.text, "hello");
        assert_eq!(inbound.sender_display, "42");
        assert_eq!(inbound.message_id.as_str(), "50");
    }
}
