use async_trait::async_trait;

/// Outbound email handoff. Delivery itself happens elsewhere.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Records the handoff in the log instead of sending mail.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        tracing::info!(to = %to, subject = %subject, body = %body, "Email notification handed off");
        Ok(())
    }
}
