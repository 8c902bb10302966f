use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::infra::queue::{MailJob, MailQueue};

/// A templated email. Rendering happens downstream; this only names the
/// template and carries the values it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub template: String,
    pub context: Value,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Hands mail to the renderer's queue.
pub struct QueueMailer {
    queue: MailQueue,
    from: String,
}

impl QueueMailer {
    pub fn new(queue: MailQueue, from: String) -> Self {
        Self { queue, from }
    }
}

#[async_trait]
impl Mailer for QueueMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let job = MailJob {
            from: self.from.clone(),
            message: message.clone(),
        };
        self.queue.enqueue(&job).await
    }
}

/// Used when no mail queue is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        tracing::info!(
            to = %message.to,
            template = %message.template,
            subject = %message.subject,
            "mail queue not configured, email logged only"
        );
        Ok(())
    }
}
