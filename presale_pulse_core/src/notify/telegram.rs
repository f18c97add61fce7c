use super::Channel;
use crate::error::CoreError;
use crate::models::NotificationPayload;
use crate::settings::Settings;
use async_trait::async_trait;
use log::debug;
use serde_json::json;

/// Telegram Bot API channel. Sends the purchase broadcast as a Markdown
/// message, or as a photo caption when a media URL is configured; an
/// optional inline "Buy Now" button carries the action link.
pub struct TelegramChannel {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
    media_url: Option<String>,
    action_url: Option<String>,
}

impl TelegramChannel {
    pub fn new(
        bot_token: &str,
        chat_id: &str,
        media_url: Option<String>,
        action_url: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
            media_url,
            action_url,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.telegram_bot_token,
            &settings.telegram_chat_id,
            settings.media_url.clone(),
            settings.action_url.clone(),
        )
    }

    fn render(payload: &NotificationPayload) -> String {
        format!(
            "⚡⚡⚡⚡⚡⚡⚡⚡⚡⚡⚡⚡⚡⚡⚡\n\
             🔥 *NEW PRESALE BUY!* 🔥\n\
             ⚡⚡⚡⚡⚡⚡⚡⚡⚡⚡⚡⚡⚡⚡⚡\n\
             \n\
             💰 *Amount:* {usd} USDT\n\
             📊 *Price Per Token:* ${price}\n\
             📈 *Total Raised:* ${raised}\n\
             👥 *Total Holders:* {holders}\n\
             🔗 [View Transaction]({link})",
            usd = payload.usd_display(),
            price = payload.price_display(),
            raised = payload.total_raised_display(),
            holders = payload.total_holders,
            link = payload.explorer_link,
        )
    }
}

#[async_trait(?Send)]
impl Channel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, payload: &NotificationPayload) -> Result<(), CoreError> {
        let text = Self::render(payload);
        let (method, mut body) = match &self.media_url {
            Some(media) => (
                "sendPhoto",
                json!({
                    "chat_id": self.chat_id,
                    "photo": media,
                    "caption": text,
                    "parse_mode": "Markdown"
                }),
            ),
            None => (
                "sendMessage",
                json!({
                    "chat_id": self.chat_id,
                    "text": text,
                    "parse_mode": "Markdown"
                }),
            ),
        };
        if let Some(action) = &self.action_url {
            body["reply_markup"] = json!({
                "inline_keyboard": [[{ "text": "Buy Now", "url": action }]]
            });
        }

        let url = format!("https://api.telegram.org/bot{}/{}", self.bot_token, method);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Channel(format!("telegram request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(CoreError::Channel(format!(
                "telegram API returned {}: {}",
                status, detail
            )));
        }
        debug!("telegram message accepted for chat {}", self.chat_id);
        Ok(())
    }
}
