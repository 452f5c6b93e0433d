//! Background email delivery.
//!
//! Request handlers enqueue rendered messages and move on. A single worker
//! task drains the queue, retrying each message with backoff, and reports
//! the final outcome through the [`DeliveryHandle`] returned at enqueue time.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::email::{EmailMessage, MailError, Mailer};
use crate::retry::RetryPolicy;

/// Default number of messages that can wait for the worker.
pub const DEFAULT_CAPACITY: usize = 256;

/// Final outcome of a queued message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryReport {
    Delivered { attempts: u32 },
    Failed { attempts: u32, error: String },
}

impl DeliveryReport {
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Resolves once the worker has finished with a message.
#[derive(Debug)]
pub struct DeliveryHandle {
    rx: oneshot::Receiver<DeliveryReport>,
}

impl DeliveryHandle {
    /// Wait for the outcome.
    pub async fn outcome(self) -> DeliveryReport {
        self.rx.await.unwrap_or_else(|_| DeliveryReport::Failed {
            attempts: 0,
            error: "mail worker stopped before delivery".to_string(),
        })
    }
}

struct Job {
    message: EmailMessage,
    done: oneshot::Sender<DeliveryReport>,
}

/// Sending side of the mail queue. Cheap to clone.
#[derive(Clone)]
pub struct MailQueue {
    tx: mpsc::Sender<Job>,
}

impl std::fmt::Debug for MailQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailQueue")
            .field("capacity", &self.tx.max_capacity())
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl MailQueue {
    /// Spawn the worker and return the queue feeding it.
    ///
    /// The worker exits once every `MailQueue` clone has been dropped and the
    /// remaining messages are drained.
    #[must_use]
    pub fn start(
        mailer: Arc<dyn Mailer>,
        policy: RetryPolicy,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(rx, mailer, policy));
        (Self { tx }, worker)
    }

    /// Queue a message without waiting for delivery.
    ///
    /// # Errors
    ///
    /// Returns `MailError::QueueFull` when the queue is at capacity and
    /// `MailError::QueueClosed` when the worker has stopped.
    pub fn enqueue(&self, message: EmailMessage) -> Result<DeliveryHandle, MailError> {
        let (done, rx) = oneshot::channel();
        self.tx
            .try_send(Job { message, done })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => MailError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => MailError::QueueClosed,
            })?;
        Ok(DeliveryHandle { rx })
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<Job>,
    mailer: Arc<dyn Mailer>,
    policy: RetryPolicy,
) {
    while let Some(job) = rx.recv().await {
        let report = deliver(mailer.as_ref(), &policy, &job.message).await;
        // The enqueuer may not care about the outcome.
        let _ = job.done.send(report);
    }
    tracing::debug!("Mail queue closed, worker exiting");
}

async fn deliver(mailer: &dyn Mailer, policy: &RetryPolicy, message: &EmailMessage) -> DeliveryReport {
    let mut attempts = 0;
    let result = policy
        .run("send email", |attempt| {
            attempts = attempt;
            mailer.send(message)
        })
        .await;

    match result {
        Ok(()) => {
            tracing::info!(to = %message.to, subject = %message.subject, attempts, "Queued email delivered");
            DeliveryReport::Delivered { attempts }
        }
        Err(exhausted) => {
            tracing::error!(
                to = %message.to,
                subject = %message.subject,
                attempts = exhausted.attempts,
                error = %exhausted.last_error,
                "Queued email could not be delivered"
            );
            DeliveryReport::Failed {
                attempts: exhausted.attempts,
                error: exhausted.last_error.to_string(),
            }
        }
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::testing::RecordingMailer;
    use super::*;

    fn message() -> EmailMessage {
        EmailMessage {
            to: "ada@example.com".to_string(),
            subject: "Order Confirmation".to_string(),
            text_body: "thanks".to_string(),
            html_body: "<p>thanks</p>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_delivers_after_transient_failures() {
        let mailer = Arc::new(RecordingMailer {
            failures: 2,
            ..RecordingMailer::default()
        });
        let (queue, _worker) = MailQueue::start(mailer.clone(), RetryPolicy::immediate(3), 4);

        let report = queue.enqueue(message()).unwrap().outcome().await;

        assert_eq!(report, DeliveryReport::Delivered { attempts: 3 });
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_reports_failure_after_budget() {
        let mailer = Arc::new(RecordingMailer {
            failures: 10,
            ..RecordingMailer::default()
        });
        let (queue, _worker) = MailQueue::start(mailer.clone(), RetryPolicy::immediate(3), 4);

        let report = queue.enqueue(message()).unwrap().outcome().await;

        assert!(matches!(report, DeliveryReport::Failed { attempts: 3, .. }));
        assert_eq!(mailer.calls.load(Ordering::SeqCst), 3);
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_permanent_rejection_not_retried() {
        let mailer = Arc::new(RecordingMailer {
            failures: 10,
            permanent: true,
            ..RecordingMailer::default()
        });
        let (queue, _worker) = MailQueue::start(mailer.clone(), RetryPolicy::immediate(3), 4);

        let report = queue.enqueue(message()).unwrap().outcome().await;

        assert!(matches!(report, DeliveryReport::Failed { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_worker_drains_then_exits() {
        let mailer = Arc::new(RecordingMailer::default());
        let (queue, worker) = MailQueue::start(mailer.clone(), RetryPolicy::immediate(1), 8);

        let handles: Vec<_> = (0..3).map(|_| queue.enqueue(message()).unwrap()).collect();
        drop(queue);

        for handle in handles {
            assert!(handle.outcome().await.is_delivered());
        }
        worker.await.unwrap();
        assert_eq!(mailer.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_closed_queue_rejects() {
        let mailer = Arc::new(RecordingMailer::default());
        let (queue, worker) = MailQueue::start(mailer, RetryPolicy::immediate(1), 1);
        worker.abort();
        let _ = worker.await;

        assert!(matches!(queue.enqueue(message()), Err(MailError::QueueClosed)));
    }
}
