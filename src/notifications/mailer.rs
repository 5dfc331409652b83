//! Mail transports.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use super::templates::EmailMessage;
use crate::config::MailConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Mail API rejected the message (status {status}): {body}")]
    Rejected { status: u16, body: String },
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// Logs each message instead of sending it.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        info!(to = %message.to.email, subject = %message.subject, "Email (log transport)");
        Ok(())
    }
}

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    sender: Address<'a>,
    to: [Address<'a>; 1],
    subject: &'a str,
    html_content: &'a str,
    text_content: &'a str,
}

/// Posts messages as JSON to a transactional-mail HTTP API, authenticated by an `api-key`
/// header.
#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    sender_email: String,
    sender_name: String,
}

impl HttpMailer {
    pub fn new(config: &MailConfig, sender_email: String, sender_name: String) -> Result<Self, MailError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            sender_email,
            sender_name,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        let request = SendRequest {
            sender: Address { email: &self.sender_email, name: Some(&self.sender_name) },
            to: [Address { email: &message.to.email, name: message.to.name.as_deref() }],
            subject: &message.subject,
            html_content: &message.html,
            text_content: &message.text,
        };
        let response = self
            .client
            .post(&self.api_url)
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected { status: status.as_u16(), body });
        }
        info!(to = %message.to.email, subject = %message.subject, "Email sent");
        Ok(())
    }
}
