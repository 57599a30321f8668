use async_trait::async_trait;
use log::debug;
use miette::Diagnostic;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ChatSendError {
    #[error("error building chat transport client")]
    ClientBuildError(#[source] reqwest::Error),

    #[error("error executing chat transport request")]
    RequestError(#[source] reqwest::Error),

    #[error("chat transport rejected the message: {description}")]
    ApiError { description: String },
}

/// The two capabilities the delivery consumer needs from the chat side.
/// Both may fail transiently; the consumer owns the retry policy.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat_id: &str, html: &str) -> Result<(), ChatSendError>;

    async fn send_photo(
        &self,
        chat_id: &str,
        photo_url: &str,
        caption_html: &str,
    ) -> Result<(), ChatSendError>;
}

pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramClient {
    pub fn new(token: &str, timeout: Duration) -> Result<Self, ChatSendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ChatSendError::ClientBuildError)?;

        Ok(Self {
            client,
            base_url: format!("https://api.telegram.org/bot{token}"),
        })
    }

    async fn call(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<(), ChatSendError> {
        let response = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(ChatSendError::RequestError)?;

        let parsed: TelegramResponse = response
            .json()
            .await
            .map_err(ChatSendError::RequestError)?;

        if !parsed.ok {
            return Err(ChatSendError::ApiError {
                description: parsed
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            });
        }

        debug!("Telegram {method} succeeded");
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_text(&self, chat_id: &str, html: &str) -> Result<(), ChatSendError> {
        self.call(
            "sendMessage",
            &serde_json::json!({
                "chat_id": chat_id,
                "text": html,
                "parse_mode": "HTML",
            }),
        )
        .await
    }

    async fn send_photo(
        &self,
        chat_id: &str,
        photo_url: &str,
        caption_html: &str,
    ) -> Result<(), ChatSendError> {
        self.call(
            "sendPhoto",
            &serde_json::json!({
                "chat_id": chat_id,
                "photo": photo_url,
                "caption": caption_html,
                "parse_mode": "HTML",
            }),
        )
        .await
    }
}
