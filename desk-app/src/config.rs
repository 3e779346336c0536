//! RelayDesk configuration loader.

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayDeskConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub support: SupportConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Chat id of the shared admin channel. Group chat ids are negative.
    #[serde(default)]
    pub admin_chat_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupportConfig {
    /// Sent once to every new user, and in reply to /start.
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,
    /// Sent to a user whose message matched no FAQ entry.
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
    /// Canned question/answer catalog. Declaration order breaks ties.
    #[serde(default = "default_faq_entries")]
    pub faq: Vec<FaqEntryConfig>,
}

impl Default for SupportConfig {
    fn default() -> Self {
        Self {
            welcome_message: default_welcome_message(),
            fallback_message: default_fallback_message(),
            faq: default_faq_entries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaqEntryConfig {
    pub question: String,
    pub answer: String,
}

fn default_welcome_message() -> String {
    "Good day 👋\n\n\
     Welcome to support, how may we be of service to you?\n\n\
     For any complaints or issues please send the following:\n\n\
     1. Account/order details\n\
     2. Category of the problem\n\
     3. A screenshot or screen recording of the issue\n\n\
     With these we will be able to respond to you accordingly. Thank you ✅"
        .to_string()
}

fn default_fallback_message() -> String {
    "I'm not sure how to answer that. Let me connect you with a support agent.".to_string()
}

fn default_faq_entries() -> Vec<FaqEntryConfig> {
    vec![
        FaqEntryConfig {
            question: "how to reset password".to_string(),
            answer: "You can reset your password here: https://example.com/reset".to_string(),
        },
        FaqEntryConfig {
            question: "where is my order".to_string(),
            answer: "Track your order here: https://example.com/orders".to_string(),
        },
        FaqEntryConfig {
            question: "how to fund".to_string(),
            answer: "**To fund your account go through the following steps:**\n\n\
                     1. Log into your account, or create one first.\n\
                     2. Open the menu on the left and tap *Add funds*.\n\
                     3. Enter the amount you would like to fund.\n\
                     4. Pick manual or online payment and pay the exact amount shown \
                     (for manual payment include the reference given to you).\n\n\
                     Your payment is credited automatically within seconds. \
                     If you still need help, reach out here and an agent will assist you."
                .to_string(),
        },
    ]
}

impl RelayDeskConfig {
    /// Load from `path`, or from the default location. A missing file at
    /// the default location is not an error: the original deployment is
    /// configured purely through the environment.
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut cfg = match path {
            Some(path) => {
                let contents = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;
                toml::from_str(&contents)
                    .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?
            }
            None => {
                let path = default_config_path();
                match tokio::fs::read_to_string(&path).await {
                    Ok(contents) => toml::from_str(&contents)
                        .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
                    Err(e) => {
                        return Err(anyhow::anyhow!("read config {}: {e}", path.display()));
                    }
                }
            }
        };

        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(v) = std::env::var("TELEGRAM_BOT_TOKEN") {
            if !v.trim().is_empty() {
                self.telegram.bot_token = v;
            }
        }
        if let Ok(v) = std::env::var("RELAYDESK_ADMIN_CHAT_ID") {
            if !v.trim().is_empty() {
                self.telegram.admin_chat_id = v
                    .trim()
                    .parse()
                    .map_err(|e| anyhow::anyhow!("parse RELAYDESK_ADMIN_CHAT_ID {v:?}: {e}"))?;
            }
        }
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "telegram.bot_token is required (or set TELEGRAM_BOT_TOKEN)"
            ));
        }
        if self.telegram.admin_chat_id == 0 {
            return Err(anyhow::anyhow!(
                "telegram.admin_chat_id is required (or set RELAYDESK_ADMIN_CHAT_ID)"
            ));
        }
        if let Some(entry) = self
            .support
            .faq
            .iter()
            .find(|entry| entry.question.trim().is_empty())
        {
            return Err(anyhow::anyhow!(
                "support.faq entry with empty question (answer: {:?})",
                entry.answer
            ));
        }
        Ok(())
    }
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".relaydesk").join("config.toml")
}
