//! Out-of-band delivery for work that cannot finish inside the response deadline.
//!
//! A handler wraps its long-running work in a [`DeferredJob`] and enqueues it; the
//! request path returns immediately. The queue worker runs each job on its own task
//! and posts the job's result to the command's `response_url`. At most `capacity`
//! jobs run at once and at most `capacity` more wait in the channel; past that,
//! `enqueue` reports [`QueueError::Full`].

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::{
    sync::{mpsc, Semaphore},
    task::{JoinHandle, JoinSet},
};
use tracing::{info, warn};

use crate::dispatch::CommandResult;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FollowUpMessage {
    #[serde(skip)]
    pub response_url: String,
    #[serde(flatten)]
    pub result: CommandResult,
    pub replace_original: bool,
}

impl FollowUpMessage {
    pub fn new(response_url: impl Into<String>, result: CommandResult) -> Self {
        Self { response_url: response_url.into(), result, replace_original: false }
    }
}

#[derive(Debug, Error)]
pub enum FollowUpError {
    #[error("follow-up client could not be built: {0}")]
    Client(String),
    #[error("follow-up delivery failed: {0}")]
    Delivery(String),
    #[error("follow-up rejected with status {0}")]
    Status(u16),
}

#[async_trait]
pub trait FollowUpSender: Send + Sync {
    async fn send(&self, message: &FollowUpMessage) -> Result<(), FollowUpError>;
}

/// Posts follow-ups to the platform-issued `response_url`.
pub struct ResponseUrlSender {
    client: reqwest::Client,
}

impl ResponseUrlSender {
    pub fn new(timeout: Duration) -> Result<Self, FollowUpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| FollowUpError::Client(error.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FollowUpSender for ResponseUrlSender {
    async fn send(&self, message: &FollowUpMessage) -> Result<(), FollowUpError> {
        let response = self
            .client
            .post(&message.response_url)
            .json(message)
            .send()
            .await
            .map_err(|error| FollowUpError::Delivery(error.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FollowUpError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Records follow-ups in the log only.
#[derive(Default)]
pub struct LoggingSender;

#[async_trait]
impl FollowUpSender for LoggingSender {
    async fn send(&self, message: &FollowUpMessage) -> Result<(), FollowUpError> {
        info!(
            event_name = "slack.followup.logged",
            response_type = ?message.result.response_type,
            text_len = message.result.text.len(),
            "follow-up recorded without delivery"
        );
        Ok(())
    }
}

pub type DeferredWork = Pin<Box<dyn Future<Output = CommandResult> + Send + 'static>>;

pub struct DeferredJob {
    pub label: String,
    pub correlation_id: String,
    pub response_url: Option<String>,
    work: DeferredWork,
}

impl DeferredJob {
    pub fn new<F>(
        label: impl Into<String>,
        correlation_id: impl Into<String>,
        response_url: Option<String>,
        work: F,
    ) -> Self
    where
        F: Future<Output = CommandResult> + Send + 'static,
    {
        Self {
            label: label.into(),
            correlation_id: correlation_id.into(),
            response_url,
            work: Box::pin(work),
        }
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("follow-up queue is full")]
    Full,
    #[error("follow-up queue is closed")]
    Closed,
}

#[derive(Clone)]
pub struct FollowUpQueue {
    jobs: mpsc::Sender<DeferredJob>,
}

impl FollowUpQueue {
    /// Spawns the worker. It exits once every queue handle is dropped and in-flight jobs
    /// have finished.
    pub fn start(capacity: usize, sender: Arc<dyn FollowUpSender>) -> (Self, JoinHandle<()>) {
        let capacity = capacity.max(1);
        let (jobs, receiver) = mpsc::channel(capacity);
        let worker = tokio::spawn(run_worker(receiver, sender, capacity));
        (Self { jobs }, worker)
    }

    /// Never waits: a full queue is reported instead of stalling the request path.
    pub fn enqueue(&self, job: DeferredJob) -> Result<(), QueueError> {
        self.jobs.try_send(job).map_err(|error| match error {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<DeferredJob>,
    sender: Arc<dyn FollowUpSender>,
    max_running: usize,
) {
    let running = Arc::new(Semaphore::new(max_running));
    let mut in_flight = JoinSet::new();

    while let Some(job) = receiver.recv().await {
        // Stop pulling from the channel while every slot is busy so it can fill up.
        let Ok(permit) = Arc::clone(&running).acquire_owned().await else {
            break;
        };
        let sender = Arc::clone(&sender);
        in_flight.spawn(async move {
            run_job(job, sender).await;
            drop(permit);
        });
        while in_flight.try_join_next().is_some() {}
    }

    while in_flight.join_next().await.is_some() {}
}

async fn run_job(job: DeferredJob, sender: Arc<dyn FollowUpSender>) {
    let DeferredJob { label, correlation_id, response_url, work } = job;
    let result = work.await;

    let Some(response_url) = response_url else {
        info!(
            event_name = "slack.followup.no_response_url",
            correlation_id = %correlation_id,
            job = %label,
            "deferred job finished without a response_url"
        );
        return;
    };

    let message = FollowUpMessage::new(response_url, result);
    match sender.send(&message).await {
        Ok(()) => info!(
            event_name = "slack.followup.delivered",
            correlation_id = %correlation_id,
            job = %label,
            "follow-up delivered"
        ),
        Err(error) => warn!(
            event_name = "slack.followup.failed",
            correlation_id = %correlation_id,
            job = %label,
            error = %error,
            "follow-up delivery failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::oneshot;

    use super::{
        DeferredJob, FollowUpError, FollowUpMessage, FollowUpQueue, FollowUpSender, QueueError,
    };
    use crate::dispatch::CommandResult;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<FollowUpMessage>>,
    }

    #[async_trait]
    impl FollowUpSender for RecordingSender {
        async fn send(&self, message: &FollowUpMessage) -> Result<(), FollowUpError> {
            self.sent.lock().expect("lock").push(message.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn worker_posts_result_to_response_url() {
        let sender = Arc::new(RecordingSender::default());
        let (queue, worker) = FollowUpQueue::start(4, sender.clone());

        queue
            .enqueue(DeferredJob::new(
                "specify",
                "req-1",
                Some("https://hooks.example/1".to_owned()),
                async { CommandResult::in_channel("draft ready") },
            ))
            .expect("enqueue");
        drop(queue);
        worker.await.expect("worker");

        let sent = sender.sent.lock().expect("lock");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].response_url, "https://hooks.example/1");
        assert_eq!(sent[0].result, CommandResult::in_channel("draft ready"));
    }

    #[tokio::test]
    async fn jobs_without_response_url_still_run() {
        let sender = Arc::new(RecordingSender::default());
        let (queue, worker) = FollowUpQueue::start(4, sender.clone());
        let (ran_tx, ran_rx) = oneshot::channel();

        queue
            .enqueue(DeferredJob::new("specify", "req-2", None, async move {
                let _ = ran_tx.send(());
                CommandResult::in_channel("unused")
            }))
            .expect("enqueue");
        drop(queue);
        worker.await.expect("worker");

        assert!(ran_rx.await.is_ok());
        assert!(sender.sent.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn full_queue_is_reported_without_waiting() {
        let sender = Arc::new(RecordingSender::default());
        let (queue, _worker) = FollowUpQueue::start(1, sender);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        // The worker picks the first job up, so fill past capacity with stalled jobs.
        let stalled = DeferredJob::new("stall", "req-3", None, async move {
            let _ = release_rx.await;
            CommandResult::ephemeral("done")
        });
        queue.enqueue(stalled).expect("first job");

        let mut saw_full = false;
        for index in 0..8 {
            let job = DeferredJob::new("extra", format!("req-extra-{index}"), None, async {
                std::future::pending::<CommandResult>().await
            });
            if queue.enqueue(job) == Err(QueueError::Full) {
                saw_full = true;
                break;
            }
        }

        assert!(saw_full);
        let _ = release_tx.send(());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn running_jobs_are_capped_and_backlog_overflows_to_full() {
        let sender = Arc::new(RecordingSender::default());
        let (queue, _worker) = FollowUpQueue::start(1, sender);
        let started = Arc::new(AtomicUsize::new(0));

        let mut accepted = 0;
        let mut full = 0;
        for index in 0..50 {
            let started = Arc::clone(&started);
            let job = DeferredJob::new("stall", format!("req-{index}"), None, async move {
                started.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<CommandResult>().await
            });
            match queue.enqueue(job) {
                Ok(()) => accepted += 1,
                Err(QueueError::Full) => full += 1,
                Err(QueueError::Closed) => panic!("queue closed while the worker is alive"),
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        // One running, one held by the worker waiting for a slot, one buffered.
        assert!(accepted <= 3, "accepted {accepted} jobs with capacity 1");
        assert!(full >= 47);
        assert!(started.load(Ordering::SeqCst) <= 1);
    }

    #[test]
    fn follow_up_payload_flattens_command_result() {
        let message =
            FollowUpMessage::new("https://hooks.example/1", CommandResult::in_channel("hi"));
        let json = serde_json::to_value(&message).expect("serialize");

        assert_eq!(
            json,
            serde_json::json!({
                "response_type": "in_channel",
                "text": "hi",
                "replace_original": false,
            })
        );
    }
}
