//! Outbound email
//!
//! The API never talks to a mail provider directly. It renders a
//! [`MailJob`] and hands it to a [`MailOutbox`]; the worker does delivery.

use async_trait::async_trait;
use bookly_shared::{MailJob, MAIL_QUEUE_KEY};
use redis::{aio::ConnectionManager, AsyncCommands};

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mail queue unavailable: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Mail job could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait MailOutbox: Send + Sync {
    async fn enqueue(&self, job: MailJob) -> Result<(), MailError>;
}

/// Pushes jobs onto the Redis list consumed by the worker
#[derive(Clone)]
pub struct RedisMailOutbox {
    conn: ConnectionManager,
}

impl RedisMailOutbox {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl MailOutbox for RedisMailOutbox {
    async fn enqueue(&self, job: MailJob) -> Result<(), MailError> {
        let payload = job.to_json()?;
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(MAIL_QUEUE_KEY, payload).await?;

        tracing::info!(job_id = %job.id, recipients = job.recipients.len(), "Mail job queued");
        Ok(())
    }
}

/// Used when no Redis is configured: the mail is logged and dropped
#[derive(Debug, Clone, Default)]
pub struct LoggingOutbox;

#[async_trait]
impl MailOutbox for LoggingOutbox {
    async fn enqueue(&self, job: MailJob) -> Result<(), MailError> {
        tracing::warn!(
            job_id = %job.id,
            recipients = ?job.recipients,
            subject = %job.subject,
            "Mail queue not configured, mail not sent"
        );
        tracing::debug!(body = %job.html_body, "Unsent mail body");
        Ok(())
    }
}

/// Email asking a new account to confirm its address
pub fn verification_mail(email: &str, link: &str) -> MailJob {
    MailJob::new(
        vec![email.to_string()],
        "Verify your email",
        format!(
            "<h1>Verify your email</h1>\
             <p>Please click this <a href=\"{}\">link</a> to verify your email.</p>",
            link
        ),
    )
}

/// Email carrying a password reset link
pub fn password_reset_mail(email: &str, link: &str) -> MailJob {
    MailJob::new(
        vec![email.to_string()],
        "Reset your password",
        format!(
            "<h1>Reset your password</h1>\
             <p>Please click this <a href=\"{}\">link</a> to reset your password.</p>\
             <p>If you did not ask for a reset you can ignore this email.</p>",
            link
        ),
    )
}

/// Enqueue without failing the caller. A mail that cannot be queued is logged.
pub async fn send_best_effort(outbox: &dyn MailOutbox, job: MailJob) {
    let job_id = job.id;
    if let Err(e) = outbox.enqueue(job).await {
        tracing::error!(job_id = %job_id, error = %e, "Failed to queue mail");
    }
}
