//! Mail queue consumer loop
//!
//! Shutdown is only observed between pops. A job that has been popped is
//! always delivered or dead-lettered before the loop returns, because a
//! cancelled BRPOP or delivery would drop a job that is no longer in Redis.

use std::time::Duration;

use bookly_shared::MailJob;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::delivery::{deliver_with_retry, MailTransport};
use crate::queue::JobQueue;

/// Delay after a failed pop before trying again
const POP_BACKOFF: Duration = Duration::from_secs(1);

/// Run one delivery round for `job`, dead-lettering it on failure
pub async fn process_job<Q, S>(queue: &Q, transport: &dyn MailTransport, mut job: MailJob, strategy: S)
where
    Q: JobQueue + ?Sized,
    S: IntoIterator<Item = Duration>,
{
    job.attempts += 1;
    info!(job_id = %job.id, attempt = job.attempts, "Delivering mail job");

    if let Err(e) = deliver_with_retry(transport, &job, strategy).await {
        error!(job_id = %job.id, error = %e, "Mail delivery failed after retries");
        if let Err(e) = queue.dead_letter(&job).await {
            error!(job_id = %job.id, error = %e, "Failed to dead-letter mail job, job lost");
        }
    }
}

/// Pop and deliver jobs until `shutdown` turns true
pub async fn consume<Q, F, S>(
    queue: &Q,
    transport: &dyn MailTransport,
    mut shutdown: watch::Receiver<bool>,
    strategy: F,
) where
    Q: JobQueue + ?Sized,
    F: Fn() -> S,
    S: IntoIterator<Item = Duration>,
{
    loop {
        if *shutdown.borrow() {
            info!("Mail consumer stopped");
            return;
        }

        match queue.pop().await {
            Ok(Some(job)) => process_job(queue, transport, job, strategy()).await,
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Mail queue pop failed, backing off");
                tokio::select! {
                    _ = tokio::time::sleep(POP_BACKOFF) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::DeliveryError;
    use crate::queue::QueueError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryQueue {
        pending: Mutex<VecDeque<MailJob>>,
        dead: Mutex<Vec<MailJob>>,
    }

    impl InMemoryQueue {
        fn with_jobs(jobs: Vec<MailJob>) -> Self {
            Self {
                pending: Mutex::new(jobs.into()),
                dead: Mutex::default(),
            }
        }

        fn pending(&self) -> Vec<MailJob> {
            self.pending.lock().unwrap().iter().cloned().collect()
        }

        fn dead(&self) -> Vec<MailJob> {
            self.dead.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobQueue for InMemoryQueue {
        async fn pop(&self) -> Result<Option<MailJob>, QueueError> {
            Ok(self.pending.lock().unwrap().pop_front())
        }

        async fn dead_letter(&self, job: &MailJob) -> Result<(), QueueError> {
            self.dead.lock().unwrap().push(job.clone());
            Ok(())
        }
    }

    /// Fails every send. Optionally raises the shutdown flag on the first one,
    /// as ctrl-c arriving mid-delivery would.
    struct DownTransport {
        calls: AtomicU32,
        shutdown_on_send: Option<watch::Sender<bool>>,
    }

    impl DownTransport {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
                shutdown_on_send: None,
            }
        }

        fn signalling(shutdown: watch::Sender<bool>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                shutdown_on_send: Some(shutdown),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MailTransport for DownTransport {
        async fn send(&self, _job: &MailJob) -> Result<(), DeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(shutdown) = &self.shutdown_on_send {
                shutdown.send_replace(true);
            }
            Err(DeliveryError::Rejected {
                status: 503,
                body: "service unavailable".to_string(),
            })
        }
    }

    fn job(subject: &str) -> MailJob {
        MailJob::new(vec!["alice@example.com".into()], subject, "<p>hi</p>")
    }

    fn no_wait() -> impl Iterator<Item = Duration> {
        std::iter::repeat(Duration::ZERO).take(2)
    }

    async fn run_until_stopped(queue: &InMemoryQueue, transport: &DownTransport, rx: watch::Receiver<bool>) {
        tokio::time::timeout(
            Duration::from_secs(5),
            consume(queue, transport, rx, no_wait),
        )
        .await
        .expect("consumer did not stop after shutdown");
    }

    #[tokio::test]
    async fn test_failed_delivery_is_dead_lettered() {
        let queue = InMemoryQueue::default();
        let transport = DownTransport::new();

        process_job(&queue, &transport, job("Verify your email"), no_wait()).await;

        let dead = queue.dead();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].subject, "Verify your email");
        assert_eq!(dead[0].attempts, 1);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_dead_letter_records_cumulative_attempts() {
        let queue = InMemoryQueue::default();
        let transport = DownTransport::new();
        let mut requeued = job("Reset your password");
        requeued.attempts = 2;

        process_job(&queue, &transport, requeued, no_wait()).await;

        assert_eq!(queue.dead()[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_shutdown_mid_delivery_keeps_popped_job() {
        let queue = InMemoryQueue::with_jobs(vec![job("Verify your email")]);
        let (tx, rx) = watch::channel(false);
        let transport = DownTransport::signalling(tx);

        run_until_stopped(&queue, &transport, rx).await;

        let dead = queue.dead();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].subject, "Verify your email");
        assert!(queue.pending().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_leaves_unpopped_jobs_queued() {
        let queue = InMemoryQueue::with_jobs(vec![job("first"), job("second")]);
        let (tx, rx) = watch::channel(false);
        let transport = DownTransport::signalling(tx);

        run_until_stopped(&queue, &transport, rx).await;

        assert_eq!(queue.dead().len(), 1);
        let pending = queue.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].subject, "second");
        assert_eq!(pending[0].attempts, 0);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_pops_nothing() {
        let queue = InMemoryQueue::with_jobs(vec![job("first")]);
        let (tx, rx) = watch::channel(false);
        tx.send_replace(true);
        let transport = DownTransport::new();

        run_until_stopped(&queue, &transport, rx).await;

        assert_eq!(queue.pending().len(), 1);
        assert_eq!(transport.calls(), 0);
    }
}
