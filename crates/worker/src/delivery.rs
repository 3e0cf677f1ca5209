//! Mail delivery
//!
//! A [`MailTransport`] sends one job. [`deliver_with_retry`] wraps it with a
//! fixed-interval retry before the job is given up on.

use std::time::Duration;

use async_trait::async_trait;
use bookly_shared::MailJob;
use serde::Serialize;
use tokio_retry::{strategy::FixedInterval, Retry};
use tracing::{info, warn};

/// Retries after the first failed send
pub const MAX_RETRIES: usize = 3;

/// Pause between sends of the same job
pub const RETRY_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Mail API request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Mail API rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, job: &MailJob) -> Result<(), DeliveryError>;
}

#[derive(Serialize)]
struct ResendEmail<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    html: &'a str,
}

/// Sends through a Resend-compatible HTTP API
pub struct ResendTransport {
    client: reqwest::Client,
    api_key: String,
    from: String,
    url: String,
}

impl ResendTransport {
    pub fn new(api_key: String, from: String, url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            from,
            url,
        }
    }
}

#[async_trait]
impl MailTransport for ResendTransport {
    async fn send(&self, job: &MailJob) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&ResendEmail {
                from: &self.from,
                to: &job.recipients,
                subject: &job.subject,
                html: &job.html_body,
            })
            .timeout(Duration::from_secs(15))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(job_id = %job.id, recipients = job.recipients.len(), "Mail delivered");
        Ok(())
    }
}

/// Used when no API key is configured
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, job: &MailJob) -> Result<(), DeliveryError> {
        info!(
            job_id = %job.id,
            recipients = ?job.recipients,
            subject = %job.subject,
            "RESEND_API_KEY not set, logging mail instead of sending"
        );
        Ok(())
    }
}

pub fn retry_strategy() -> impl Iterator<Item = Duration> {
    FixedInterval::new(RETRY_INTERVAL).take(MAX_RETRIES)
}

/// Send `job`, retrying with the delays yielded by `strategy`
pub async fn deliver_with_retry<T, S>(
    transport: &T,
    job: &MailJob,
    strategy: S,
) -> Result<(), DeliveryError>
where
    T: MailTransport + ?Sized,
    S: IntoIterator<Item = Duration>,
{
    let mut attempt = 0u32;
    Retry::spawn(strategy, || {
        attempt += 1;
        let current = attempt;
        async move {
            transport.send(job).await.map_err(|e| {
                warn!(job_id = %job.id, attempt = current, error = %e, "Mail send failed");
                e
            })
        }
    })
    .await
}
