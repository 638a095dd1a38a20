use super::{DeliveryError, Messenger, RenderedChart};
use crate::config::TelegramConfig;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Telegram answers an edit with identical content with this description
const NOT_MODIFIED: &str = "message is not modified";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

/// Telegram Bot API sender
pub struct TelegramMessenger {
    client: Client,
    /// `{api_url}/bot{token}`; methods are appended to it
    base_url: String,
}

impl TelegramMessenger {
    pub fn new(config: &TelegramConfig, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: format!(
                "{}/bot{}",
                config.api_url.trim_end_matches('/'),
                config.token
            ),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }
}

/// Non-2xx or `ok: false` becomes `Rejected` with Telegram's description.
async fn check_response(response: Response) -> Result<(), DeliveryError> {
    let status = response.status();
    let body = response
        .json::<ApiResponse>()
        .await
        .map_err(|e| DeliveryError::Rejected(format!("status {}: {}", status, e)))?;

    if !status.is_success() || !body.ok {
        return Err(DeliveryError::Rejected(format!(
            "status {}: {}",
            status,
            body.description.unwrap_or_else(|| "no description".to_string())
        )));
    }

    Ok(())
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "Markdown",
                "disable_web_page_preview": true,
            }))
            .send()
            .await?;

        check_response(response).await
    }

    /// `editMessageMedia` on message `chart_id`, uploading the chart as a document.
    /// Telegram refusing an unchanged image counts as success.
    async fn update_chart(
        &self,
        chat_id: &str,
        chart_id: &str,
        chart: &RenderedChart,
        caption: &str,
    ) -> Result<(), DeliveryError> {
        let media = serde_json::json!({
            "type": "document",
            "media": "attach://chart",
            "caption": caption,
            "parse_mode": "Markdown",
        });
        let file = Part::bytes(chart.bytes.clone())
            .file_name(chart.file_name.clone())
            .mime_str(&chart.content_type)?;
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("message_id", chart_id.to_string())
            .text("media", media.to_string())
            .part("chart", file);

        let response = self
            .client
            .post(self.method_url("editMessageMedia"))
            .multipart(form)
            .send()
            .await?;

        match check_response(response).await {
            Err(DeliveryError::Rejected(reason)) if reason.contains(NOT_MODIFIED) => {
                debug!(chat_id, chart_id, "Chart already up to date");
                Ok(())
            }
            other => other,
        }
    }
}
