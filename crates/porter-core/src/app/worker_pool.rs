//! WorkerPool - N pollers sharing one registry, broker and result sink.
//!
//! Each poller loops: poll -> decode -> lookup -> dispatch -> ack -> store.
//! The poll is the only place a poller waits on the broker, and it is raced
//! against the shutdown channel so a shutdown does not hang on a poll that
//! never returns.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;

use super::dispatch::{self, DispatchError};
use super::retry::RetryPolicy;
use crate::domain::{JobResponse, NormalizedValue};
use crate::ports::{Acknowledgement, Broker, BrokerError, ResultSink};
use crate::typed::{CodecError, TaskRegistry, codec};

/// A configured result sink and the TTL every record gets.
#[derive(Clone)]
pub struct SinkHandle {
    pub sink: Arc<dyn ResultSink>,
    pub ttl: Duration,
}

impl SinkHandle {
    pub fn new(sink: Arc<dyn ResultSink>, ttl: Duration) -> Self {
        Self { sink, ttl }
    }
}

/// Why a poller stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    Shutdown,
    /// Gave up after `attempts` consecutive failed polls.
    BrokerUnavailable { attempts: u32, last_error: String },
    Panicked(String),
}

/// What happened to one job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Succeeded(Vec<NormalizedValue>),
    /// Ran and was acknowledged, but the result store rejected the record.
    StoreFailed {
        results: Vec<NormalizedValue>,
        error: String,
    },
    /// Ran, returned an error, and was acknowledged.
    TaskFailed(String),
    /// Arguments did not decode; not acknowledged.
    Undecodable(CodecError),
    /// Arity or type check failed; not acknowledged.
    Invalid(DispatchError),
    /// No task with that name; not acknowledged.
    Unregistered,
}

/// State shared by every poller of one pool.
pub struct PollerContext {
    pub registry: Arc<TaskRegistry>,
    pub broker: Arc<dyn Broker>,
    pub sink: Option<SinkHandle>,
    pub queue: String,
    pub subscriber: String,
    pub retry: RetryPolicy,
}

impl PollerContext {
    /// Run one job through lookup, decode, dispatch, ack and store.
    pub async fn process_job(&self, worker: &str, job: JobResponse) -> JobOutcome {
        let Some(task) = self.registry.lookup(&job.job_name) else {
            tracing::warn!(worker, job = %job.job_name, id = job.id, "unregistered task");
            return JobOutcome::Unregistered;
        };

        let args = match codec::decode_all(&job.args) {
            Ok(args) => args,
            Err(err) => {
                tracing::error!(worker, job = %job.job_name, id = job.id, error = %err, "could not decode job arguments");
                return JobOutcome::Undecodable(err);
            }
        };

        let results = match dispatch::dispatch(worker, &job, &task, args) {
            Ok(results) => results,
            Err(err) if err.invoked() => {
                tracing::error!(worker, job = %job.job_name, id = job.id, error = %err, "task failed");
                self.acknowledge(worker).await;
                return JobOutcome::TaskFailed(err.to_string());
            }
            Err(err) => {
                tracing::error!(worker, job = %job.job_name, id = job.id, error = %err, "job rejected");
                return JobOutcome::Invalid(err);
            }
        };

        self.acknowledge(worker).await;

        if let Some(handle) = &self.sink
            && let Err(err) = handle.sink.store(&job, &results, handle.ttl).await
        {
            tracing::error!(worker, key = %job.result_key(), error = %err, "failed to store result");
            return JobOutcome::StoreFailed {
                results,
                error: err.to_string(),
            };
        }

        JobOutcome::Succeeded(results)
    }

    /// Best effort: failures are logged, never retried.
    async fn acknowledge(&self, worker: &str) {
        let ack = Acknowledgement::new(&self.queue, &self.subscriber);
        if let Err(err) = self.broker.acknowledge(&ack).await {
            tracing::warn!(worker, error = %err, "ack failed");
        }
    }
}

/// Handle to a running set of pollers.
/// - `shutdown()` で全 poller に停止を通知
/// - `join()` で全 poller の終了を待てる
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    workers: JoinSet<WorkerExit>,
}

impl WorkerPool {
    /// Spawn `n` pollers.
    pub fn spawn(n: usize, ctx: Arc<PollerContext>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut workers = JoinSet::new();
        for poller_id in 1..=n {
            let ctx = Arc::clone(&ctx);
            let rx = shutdown_rx.clone();
            workers.spawn(poller_loop(poller_id, ctx, rx));
        }

        Self {
            shutdown_tx,
            workers,
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Ask every poller to stop. Polls in flight are abandoned; a job already
    /// being dispatched finishes first.
    pub fn shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for every poller to stop on its own.
    pub async fn join(mut self) -> Vec<WorkerExit> {
        let mut exits = Vec::new();
        while let Some(joined) = self.workers.join_next().await {
            exits.push(record_exit(joined));
        }
        exits
    }

    pub async fn shutdown_and_join(self) -> Vec<WorkerExit> {
        self.shutdown();
        self.join().await
    }

    /// Run until `signal` resolves or every poller has stopped, whichever
    /// comes first, then shut the rest down.
    pub async fn run_until<F>(mut self, signal: F) -> Vec<WorkerExit>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(signal);
        let mut exits = Vec::new();
        loop {
            tokio::select! {
                _ = &mut signal => {
                    tracing::info!("shutdown requested");
                    break;
                }
                joined = self.workers.join_next() => match joined {
                    Some(joined) => exits.push(record_exit(joined)),
                    None => {
                        tracing::warn!("all pollers have stopped");
                        return exits;
                    }
                },
            }
        }
        exits.extend(self.shutdown_and_join().await);
        exits
    }
}

fn record_exit(joined: Result<WorkerExit, tokio::task::JoinError>) -> WorkerExit {
    match joined {
        Ok(exit) => exit,
        Err(err) => {
            tracing::error!(error = %err, "poller panicked");
            WorkerExit::Panicked(err.to_string())
        }
    }
}

async fn poller_loop(
    poller_id: usize,
    ctx: Arc<PollerContext>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> WorkerExit {
    let worker = format!("{}:{}", ctx.subscriber, poller_id);
    let mut failures: u32 = 0;

    loop {
        if *shutdown_rx.borrow() {
            tracing::debug!(worker = %worker, "poller stopping");
            return WorkerExit::Shutdown;
        }

        // poll は無期限に待つ可能性があるので shutdown と競合させる
        let polled = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    // pool handle dropped
                    return WorkerExit::Shutdown;
                }
                continue;
            }
            polled = ctx.broker.poll(&ctx.queue, &ctx.subscriber) => polled,
        };

        let error = match polled {
            Ok(job) if !job.is_empty() => {
                failures = 0;
                ctx.process_job(&worker, job).await;
                continue;
            }
            Ok(_) => BrokerError::Decode("response carried no job name".to_string()),
            Err(err) => err,
        };

        failures += 1;
        let Some(delay) = ctx.retry.delay_for(failures) else {
            tracing::error!(worker = %worker, attempts = failures, error = %error, "broker unavailable; poller giving up");
            return WorkerExit::BrokerUnavailable {
                attempts: failures,
                last_error: error.to_string(),
            };
        };

        tracing::warn!(
            worker = %worker,
            attempt = failures,
            delay = ?delay,
            error = %error,
            "poll failed; backing off"
        );
        tokio::select! {
            _ = shutdown_rx.changed() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Argument, TypeTag};
    use crate::impls::{InMemoryBroker, InMemoryResultSink};
    use crate::ports::{PublishRequest, QueueDeclaration, Subscription, TaskRegistration};
    use crate::typed::Tasks;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry_with_add(calls: Arc<AtomicUsize>) -> Arc<TaskRegistry> {
        let registry = TaskRegistry::new();
        registry.register(Tasks::new().add("add", move |a: i64, b: i64| {
            calls.fetch_add(1, Ordering::SeqCst);
            a + b
        }));
        Arc::new(registry)
    }

    fn context(
        registry: Arc<TaskRegistry>,
        broker: Arc<dyn Broker>,
        sink: Option<SinkHandle>,
    ) -> PollerContext {
        PollerContext {
            registry,
            broker,
            sink,
            queue: "math".to_string(),
            subscriber: "tester".to_string(),
            retry: RetryPolicy::fixed(Duration::from_millis(1), 3),
        }
    }

    fn add_job(id: i64, args: Vec<Argument>) -> JobResponse {
        JobResponse::new(id, "add", args)
    }

    #[tokio::test]
    async fn successful_job_is_acked_and_stored() {
        let calls = Arc::new(AtomicUsize::new(0));
        let broker = Arc::new(InMemoryBroker::new());
        let sink = Arc::new(InMemoryResultSink::new());
        sink.connect().await.unwrap();
        let ctx = context(
            registry_with_add(calls.clone()),
            broker.clone(),
            Some(SinkHandle::new(sink.clone(), Duration::from_secs(60))),
        );

        let job = add_job(
            1,
            vec![
                Argument::new(2.0, TypeTag::Int),
                Argument::new(3.0, TypeTag::Int),
            ],
        );
        let outcome = ctx.process_job("tester:1", job).await;

        assert_eq!(outcome, JobOutcome::Succeeded(vec![NormalizedValue::Int(5)]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(broker.acks().await, vec![Acknowledgement::new("math", "tester")]);
        let record = sink.get("add_1").await.unwrap();
        assert_eq!(record.result, vec![NormalizedValue::Int(5)]);
    }

    #[tokio::test]
    async fn unregistered_task_is_dropped_without_ack() {
        let calls = Arc::new(AtomicUsize::new(0));
        let broker = Arc::new(InMemoryBroker::new());
        let ctx = context(registry_with_add(calls.clone()), broker.clone(), None);

        let outcome = ctx
            .process_job("tester:1", JobResponse::new(9, "resize", vec![]))
            .await;

        assert_eq!(outcome, JobOutcome::Unregistered);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(broker.acks().await.is_empty());
    }

    #[tokio::test]
    async fn arity_mismatch_is_reported_and_not_acked() {
        let calls = Arc::new(AtomicUsize::new(0));
        let broker = Arc::new(InMemoryBroker::new());
        let ctx = context(registry_with_add(calls.clone()), broker.clone(), None);

        let outcome = ctx
            .process_job("tester:1", add_job(2, vec![Argument::new(2.0, TypeTag::Int)]))
            .await;

        assert_eq!(
            outcome,
            JobOutcome::Invalid(DispatchError::ArityMismatch { expected: 2, got: 1 })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(broker.acks().await.is_empty());
    }

    #[tokio::test]
    async fn fractional_integer_is_undecodable() {
        let calls = Arc::new(AtomicUsize::new(0));
        let broker = Arc::new(InMemoryBroker::new());
        let ctx = context(registry_with_add(calls.clone()), broker.clone(), None);

        let outcome = ctx
            .process_job(
                "tester:1",
                add_job(
                    3,
                    vec![
                        Argument::new(2.5, TypeTag::Int),
                        Argument::new(3.0, TypeTag::Int),
                    ],
                ),
            )
            .await;

        assert!(matches!(outcome, JobOutcome::Undecodable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn untagged_argument_is_rejected_by_name() {
        let calls = Arc::new(AtomicUsize::new(0));
        let broker = Arc::new(InMemoryBroker::new());
        let ctx = context(registry_with_add(calls.clone()), broker.clone(), None);

        let job: JobResponse = serde_json::from_value(serde_json::json!({
            "id": 3,
            "job_name": "add",
            "args": [{ "value": 2.0 }, { "value": 3.0, "type": "int" }]
        }))
        .unwrap();
        let outcome = ctx.process_job("tester:1", job).await;

        assert_eq!(
            outcome,
            JobOutcome::Invalid(DispatchError::ArgumentTypeMismatch {
                position: 0,
                expected: crate::domain::ValueKind::I64,
                got: crate::domain::ValueKind::Other,
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(broker.acks().await.is_empty());
    }

    #[tokio::test]
    async fn task_error_is_still_acked() {
        let registry = TaskRegistry::new();
        registry.register(Tasks::new().add("boom", || Err::<(), _>("exploded")));
        let broker = Arc::new(InMemoryBroker::new());
        let ctx = context(Arc::new(registry), broker.clone(), None);

        let outcome = ctx
            .process_job("tester:1", JobResponse::new(4, "boom", vec![]))
            .await;

        assert!(matches!(outcome, JobOutcome::TaskFailed(_)));
        assert_eq!(broker.acks().await.len(), 1);
    }

    #[tokio::test]
    async fn store_failure_does_not_undo_the_ack() {
        let calls = Arc::new(AtomicUsize::new(0));
        let broker = Arc::new(InMemoryBroker::new());
        // never connected, so every store fails
        let sink = Arc::new(InMemoryResultSink::new());
        let ctx = context(
            registry_with_add(calls.clone()),
            broker.clone(),
            Some(SinkHandle::new(sink, Duration::from_secs(60))),
        );

        let outcome = ctx
            .process_job(
                "tester:1",
                add_job(
                    5,
                    vec![
                        Argument::new(1, TypeTag::Int),
                        Argument::new(1, TypeTag::Int),
                    ],
                ),
            )
            .await;

        assert!(matches!(outcome, JobOutcome::StoreFailed { .. }));
        assert_eq!(broker.acks().await.len(), 1);
    }

    /// Broker whose polls always fail at the transport level.
    struct DownBroker {
        polls: AtomicUsize,
    }

    #[async_trait]
    impl Broker for DownBroker {
        async fn declare_queue(&self, _: &QueueDeclaration) -> Result<(), BrokerError> {
            Ok(())
        }
        async fn publish(&self, _: &PublishRequest) -> Result<(), BrokerError> {
            Ok(())
        }
        async fn register_tasks(&self, _: &TaskRegistration) -> Result<(), BrokerError> {
            Ok(())
        }
        async fn subscribe(&self, _: &Subscription) -> Result<(), BrokerError> {
            Ok(())
        }
        async fn poll(&self, _: &str, _: &str) -> Result<JobResponse, BrokerError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Err(BrokerError::Transport("connection refused".to_string()))
        }
        async fn acknowledge(&self, _: &Acknowledgement) -> Result<(), BrokerError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn pollers_give_up_after_retries() {
        let broker = Arc::new(DownBroker {
            polls: AtomicUsize::new(0),
        });
        let ctx = Arc::new(context(Arc::new(TaskRegistry::new()), broker.clone(), None));

        let exits = WorkerPool::spawn(2, ctx).join().await;

        assert_eq!(exits.len(), 2);
        for exit in &exits {
            assert!(matches!(exit, WorkerExit::BrokerUnavailable { attempts: 3, .. }));
        }
        assert_eq!(broker.polls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn shutdown_interrupts_blocked_polls() {
        let broker = Arc::new(InMemoryBroker::new());
        let ctx = Arc::new(context(Arc::new(TaskRegistry::new()), broker, None));

        let pool = WorkerPool::spawn(3, ctx);
        assert_eq!(pool.len(), 3);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let exits = tokio::time::timeout(Duration::from_secs(2), pool.shutdown_and_join())
            .await
            .expect("pollers did not stop");
        assert_eq!(exits, vec![WorkerExit::Shutdown; 3]);
    }

    #[tokio::test]
    async fn pool_drains_published_jobs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let broker = Arc::new(InMemoryBroker::new());
        let ctx = Arc::new(context(registry_with_add(calls.clone()), broker.clone(), None));

        for i in 0..10 {
            broker
                .publish(&PublishRequest {
                    task: "add".to_string(),
                    args: vec![
                        Argument::new(i, TypeTag::Int),
                        Argument::new(1, TypeTag::Int),
                    ],
                    qname: "math".to_string(),
                })
                .await
                .unwrap();
        }

        let pool = WorkerPool::spawn(4, ctx);
        tokio::time::timeout(Duration::from_secs(2), async {
            while broker.acks().await.len() < 10 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("jobs were not drained");
        pool.shutdown_and_join().await;

        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn run_until_returns_on_signal() {
        let broker = Arc::new(InMemoryBroker::new());
        let ctx = Arc::new(context(Arc::new(TaskRegistry::new()), broker, None));

        let pool = WorkerPool::spawn(2, ctx);
        let exits = pool
            .run_until(tokio::time::sleep(Duration::from_millis(10)))
            .await;
        assert_eq!(exits, vec![WorkerExit::Shutdown; 2]);
    }
}
