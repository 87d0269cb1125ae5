//! Audit outbox
//!
//! The engine enqueues audit intents on an unbounded channel and moves on. A
//! background tokio task owns the sink and delivers intents in order, bounding
//! each attempt with a timeout and retrying a fixed number of times with a
//! linear backoff. An intent that still fails is logged and dropped.
//!
//! `flush` enqueues a marker and waits for the worker to reach it, which
//! means every intent enqueued before the call has been delivered or given up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::{AuditError, AuditRecord, AuditSink, AuditStatus};
use crate::types::{ParticipantCode, TransactionId};

/// Timeout and retry settings for sink calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    pub attempt_timeout: Duration,
    pub max_attempts: u32,
    /// Delay before retry `n` is `backoff * n`
    pub backoff: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_millis(2000),
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Delivery counters
#[derive(Debug, Default)]
pub struct AuditStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
    retries: AtomicU64,
}

impl AuditStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Intents abandoned after the last attempt failed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }
}

enum AuditIntent {
    Record(AuditRecord),
    Update {
        transaction_id: TransactionId,
        participant: ParticipantCode,
        status: AuditStatus,
    },
    Flush(oneshot::Sender<()>),
}

struct Active {
    sender: mpsc::UnboundedSender<AuditIntent>,
    sink: Arc<dyn AuditSink>,
    policy: DeliveryPolicy,
    stats: Arc<AuditStats>,
}

/// Handle for enqueuing audit intents
///
/// Cloning shares the same worker. The worker stops once every handle is
/// dropped and the queue is drained.
#[derive(Clone)]
pub struct AuditOutbox {
    inner: Option<Arc<Active>>,
}

impl std::fmt::Debug for AuditOutbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditOutbox")
            .field("enabled", &self.inner.is_some())
            .finish()
    }
}

impl AuditOutbox {
    /// Start the delivery worker on the current tokio runtime
    pub fn spawn(sink: Arc<dyn AuditSink>, policy: DeliveryPolicy) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let stats = Arc::new(AuditStats::default());

        tokio::spawn(run_worker(
            receiver,
            Arc::clone(&sink),
            policy,
            Arc::clone(&stats),
        ));

        Self {
            inner: Some(Arc::new(Active {
                sender,
                sink,
                policy,
                stats,
            })),
        }
    }

    /// Outbox that discards every intent
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn record(&self, record: AuditRecord) {
        self.enqueue(AuditIntent::Record(record));
    }

    pub fn update_status(
        &self,
        transaction_id: TransactionId,
        participant: &str,
        status: AuditStatus,
    ) {
        self.enqueue(AuditIntent::Update {
            transaction_id,
            participant: participant.to_string(),
            status,
        });
    }

    fn enqueue(&self, intent: AuditIntent) {
        if let Some(active) = &self.inner {
            if active.sender.send(intent).is_err() {
                warn!("audit worker stopped, intent dropped");
                active.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Wait until everything enqueued so far has been handled
    pub async fn flush(&self) {
        let Some(active) = &self.inner else {
            return;
        };
        let (ack, done) = oneshot::channel();
        if active.sender.send(AuditIntent::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }

    /// Query the sink directly; failures and timeouts yield an empty list
    pub async fn query_by_participant(&self, participant: &str) -> Vec<AuditRecord> {
        let Some(active) = &self.inner else {
            return Vec::new();
        };

        let timeout = active.policy.attempt_timeout;
        match tokio::time::timeout(timeout, active.sink.query_by_participant(participant)).await
        {
            Ok(Ok(records)) => records,
            Ok(Err(err)) => {
                warn!(participant, error = %err, "audit query failed");
                Vec::new()
            }
            Err(_) => {
                warn!(participant, timeout_ms = timeout.as_millis() as u64, "audit query timed out");
                Vec::new()
            }
        }
    }

    pub fn stats(&self) -> Option<Arc<AuditStats>> {
        self.inner.as_ref().map(|active| Arc::clone(&active.stats))
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<AuditIntent>,
    sink: Arc<dyn AuditSink>,
    policy: DeliveryPolicy,
    stats: Arc<AuditStats>,
) {
    while let Some(intent) = receiver.recv().await {
        match intent {
            AuditIntent::Flush(ack) => {
                let _ = ack.send(());
            }
            AuditIntent::Record(record) => {
                let transaction_id = record.transaction_id;
                deliver(&policy, &stats, transaction_id, || {
                    sink.record_transaction(&record)
                })
                .await;
            }
            AuditIntent::Update {
                transaction_id,
                participant,
                status,
            } => {
                deliver(&policy, &stats, transaction_id, || {
                    sink.update_status(transaction_id, &participant, status)
                })
                .await;
            }
        }
    }
    debug!("audit worker stopped");
}

async fn deliver<F, Fut>(
    policy: &DeliveryPolicy,
    stats: &AuditStats,
    transaction_id: TransactionId,
    mut attempt: F,
) where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), AuditError>>,
{
    let max_attempts = policy.max_attempts.max(1);

    for n in 1..=max_attempts {
        let error = match tokio::time::timeout(policy.attempt_timeout, attempt()).await {
            Ok(Ok(())) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Ok(Err(err)) => err,
            Err(_) => AuditError::Timeout(policy.attempt_timeout.as_millis() as u64),
        };

        if n == max_attempts {
            warn!(
                transaction_id = %transaction_id,
                attempts = n,
                error = %error,
                "audit delivery abandoned"
            );
            stats.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        debug!(transaction_id = %transaction_id, attempt = n, error = %error, "audit delivery retry");
        stats.retries.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(policy.backoff * n).await;
    }
}
