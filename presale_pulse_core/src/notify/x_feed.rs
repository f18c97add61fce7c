use super::Channel;
use crate::error::CoreError;
use crate::models::NotificationPayload;
use crate::settings::Settings;
use async_trait::async_trait;
use log::debug;
use serde_json::json;

const POST_URL: &str = "https://api.x.com/2/tweets";

/// Social feed channel: posts a plain-text rendering of the purchase to
/// X via the v2 API with an app bearer token.
pub struct XChannel {
    client: reqwest::Client,
    bearer_token: String,
}

impl XChannel {
    pub fn new(bearer_token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            bearer_token: bearer_token.to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Option<Self> {
        settings
            .x_bearer_token
            .as_deref()
            .map(Self::new)
    }

    fn render(payload: &NotificationPayload) -> String {
        format!(
            "🔥 NEW PRESALE BUY! 🔥\n\
             \n\
             💰 {usd} USDT at ${price} per token\n\
             📈 Total raised: ${raised}\n\
             👥 Holders: {holders}\n\
             🔗 {link}",
            usd = payload.usd_display(),
            price = payload.price_display(),
            raised = payload.total_raised_display(),
            holders = payload.total_holders,
            link = payload.explorer_link,
        )
    }
}

#[async_trait(?Send)]
impl Channel for XChannel {
    fn name(&self) -> &'static str {
        "x"
    }

    async fn send(&self, payload: &NotificationPayload) -> Result<(), CoreError> {
        let body = json!({ "text": Self::render(payload) });
        let response = self
            .client
            .post(POST_URL)
            .bearer_auth(&self.bearer_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Channel(format!("x request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(CoreError::Channel(format!(
                "x API returned {}: {}",
                status, detail
            )));
        }
        debug!("x post accepted");
        Ok(())
    }
}
