//! Alert delivery

use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AlertingConfig;

/// Notification errors
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// Request failed or the endpoint answered with an error status
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Sink settings are unusable
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Destination for alert and clear messages
#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver a message.
    ///
    /// `urgent` asks the destination to notify people, `is_problem` tells a new
    /// problem apart from a recovery.
    async fn send(&self, message: &str, urgent: bool, is_problem: bool)
        -> Result<(), NotificationError>;
}

/// Posts alerts to a Slack-compatible incoming webhook
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: Client,
    webhook_url: String,
    channel: Option<String>,
    username: String,
}

impl WebhookSink {
    /// Create a sink posting to `webhook_url`
    pub fn new(webhook_url: impl Into<String>, config: &AlertingConfig) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NotificationError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
            channel: config.channel.clone(),
            username: config.username.clone(),
        })
    }

    /// Build a sink from configuration, `None` when no webhook is configured
    pub fn from_config(config: &AlertingConfig) -> Result<Option<Self>, NotificationError> {
        config
            .webhook_url
            .as_deref()
            .map(|url| Self::new(url, config))
            .transpose()
    }
}

#[async_trait::async_trait]
impl AlertSink for WebhookSink {
    async fn send(
        &self,
        message: &str,
        urgent: bool,
        is_problem: bool,
    ) -> Result<(), NotificationError> {
        let color = if is_problem { "#dc3545" } else { "#28a745" };
        let text = if urgent {
            format!("<!channel> {message}")
        } else {
            message.to_string()
        };

        let payload = SlackPayload {
            channel: self.channel.clone(),
            username: Some(self.username.clone()),
            icon_emoji: Some(":moneybag:".to_string()),
            attachments: vec![SlackAttachment {
                color: color.to_string(),
                text,
                footer: Some("BalanceWatch".to_string()),
            }],
        };

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::HttpError(format!(
                "Webhook returned {}: {}",
                status, body
            )));
        }

        info!(is_problem, "Webhook notification sent");
        Ok(())
    }
}

/// Writes alerts to the log only
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait::async_trait]
impl AlertSink for LogSink {
    async fn send(
        &self,
        message: &str,
        urgent: bool,
        is_problem: bool,
    ) -> Result<(), NotificationError> {
        warn!(urgent, is_problem, "Balance warning: {}", message);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SlackPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_emoji: Option<String>,
    attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    color: String,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<String>,
}
