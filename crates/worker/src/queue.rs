//! Redis mail queue operations

use async_trait::async_trait;
use bookly_shared::{MailJob, MAIL_DEAD_LETTER_KEY, MAIL_QUEUE_KEY};
use redis::{aio::ConnectionManager, AsyncCommands};
use tracing::{error, info, warn};

/// Delivery rounds a job gets before it stays in the dead-letter list
pub const MAX_ATTEMPTS: u32 = 3;

/// Seconds a blocking pop waits before returning empty
pub const POP_TIMEOUT_SECS: f64 = 5.0;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Mail job could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Where a dead letter goes on the next requeue pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterAction {
    Requeue,
    Keep,
}

pub fn dead_letter_action(job: &MailJob) -> DeadLetterAction {
    if job.attempts < MAX_ATTEMPTS {
        DeadLetterAction::Requeue
    } else {
        DeadLetterAction::Keep
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RequeueSummary {
    pub requeued: usize,
    pub kept: usize,
    pub discarded: usize,
}

/// Source of mail jobs and sink for the ones that could not be delivered
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Block until a job arrives or the pop times out
    async fn pop(&self) -> Result<Option<MailJob>, QueueError>;

    async fn dead_letter(&self, job: &MailJob) -> Result<(), QueueError>;
}

#[derive(Clone)]
pub struct MailQueue {
    conn: ConnectionManager,
}

impl MailQueue {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Move retryable dead letters back onto the main queue.
    ///
    /// Only the entries present when the pass starts are visited, so jobs
    /// that are kept back do not loop.
    pub async fn requeue_dead_letters(&self) -> Result<RequeueSummary, QueueError> {
        let mut conn = self.conn.clone();
        let pending: usize = conn.llen(MAIL_DEAD_LETTER_KEY).await?;
        let mut summary = RequeueSummary::default();

        for _ in 0..pending {
            let raw: Option<String> = conn.rpop(MAIL_DEAD_LETTER_KEY, None).await?;
            let Some(raw) = raw else {
                break;
            };

            let job = match MailJob::from_json(&raw) {
                Ok(job) => job,
                Err(e) => {
                    error!(error = %e, "Discarding malformed dead letter");
                    summary.discarded += 1;
                    continue;
                }
            };

            match dead_letter_action(&job) {
                DeadLetterAction::Requeue => {
                    let _: () = conn.lpush(MAIL_QUEUE_KEY, raw).await?;
                    summary.requeued += 1;
                }
                DeadLetterAction::Keep => {
                    let _: () = conn.lpush(MAIL_DEAD_LETTER_KEY, raw).await?;
                    summary.kept += 1;
                }
            }
        }

        info!(
            requeued = summary.requeued,
            kept = summary.kept,
            discarded = summary.discarded,
            "Dead-letter pass complete"
        );
        Ok(summary)
    }
}

#[async_trait]
impl JobQueue for MailQueue {
    /// Entries that are not valid jobs are logged and dropped.
    async fn pop(&self) -> Result<Option<MailJob>, QueueError> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = conn.brpop(MAIL_QUEUE_KEY, POP_TIMEOUT_SECS).await?;

        let Some((_, raw)) = popped else {
            return Ok(None);
        };

        match MailJob::from_json(&raw) {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                error!(error = %e, "Dropping malformed mail job");
                Ok(None)
            }
        }
    }

    async fn dead_letter(&self, job: &MailJob) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(MAIL_DEAD_LETTER_KEY, job.to_json()?).await?;
        warn!(job_id = %job.id, attempts = job.attempts, "Mail job moved to dead-letter list");
        Ok(())
    }
}
