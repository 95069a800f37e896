//! Server / Worker - the public entry points.
//!
//! `Server` owns the configuration, the task registry and the broker client.
//! Producers use it to declare queues and publish signatures; consumers
//! register tasks on it and start a `Worker`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ulid::Ulid;

use super::retry::RetryPolicy;
use super::worker_pool::{PollerContext, SinkHandle, WorkerExit, WorkerPool};
use crate::config::Config;
use crate::domain::Signature;
use crate::error::PorterError;
use crate::impls::{HttpBroker, build_sink};
use crate::ports::{
    Broker, PublishRequest, QueueDeclaration, ResultSink, Subscription, TaskRegistration,
};
use crate::typed::{TaskRegistry, Tasks};

pub struct Server {
    config: Config,
    registry: Arc<TaskRegistry>,
    broker: Arc<dyn Broker>,
    sink: Option<SinkHandle>,
}

impl Server {
    /// HTTP broker from `config`, plus the configured result store if any.
    pub fn new(config: Config) -> Result<Self, PorterError> {
        let sink = match &config.results_backend {
            Some(backend) => Some(SinkHandle::new(
                build_sink(backend)?,
                backend.results_expire_in,
            )),
            None => None,
        };
        let broker = Arc::new(HttpBroker::from_config(&config));
        Ok(Self {
            config,
            registry: Arc::new(TaskRegistry::new()),
            broker,
            sink,
        })
    }

    /// Swap the broker client, e.g. for an [`InMemoryBroker`](crate::impls::InMemoryBroker).
    pub fn with_broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = broker;
        self
    }

    pub fn with_result_sink(mut self, sink: Arc<dyn ResultSink>, ttl: Duration) -> Self {
        self.sink = Some(SinkHandle::new(sink, ttl));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn queue_name(&self) -> &str {
        &self.config.queue_name
    }

    /// Declare `name` on the broker and make it this server's queue.
    pub async fn declare_queue(
        &mut self,
        name: impl Into<String>,
        cap: usize,
        durable: bool,
    ) -> Result<(), PorterError> {
        let declaration = QueueDeclaration {
            name: name.into(),
            cap,
            durable,
        };
        self.broker.declare_queue(&declaration).await?;
        tracing::info!(queue = %declaration.name, cap, durable, "queue declared");
        self.config.queue_name = declaration.name;
        Ok(())
    }

    pub async fn publish(&self, signature: &Signature) -> Result<(), PorterError> {
        let request = PublishRequest {
            task: signature.name.clone(),
            args: signature.args.clone(),
            qname: self.require_queue()?.to_string(),
        };
        self.broker.publish(&request).await?;
        tracing::debug!(task = %request.task, queue = %request.qname, "published");
        Ok(())
    }

    /// Replace the local registry with `tasks`, then announce their names.
    pub async fn register_tasks(&self, tasks: Tasks) -> Result<(), PorterError> {
        let qname = self.require_queue()?.to_string();
        self.registry.register(tasks);
        let task_names = self.registry.task_names();

        let registration = TaskRegistration { task_names, qname };
        self.broker.register_tasks(&registration).await?;
        tracing::info!(
            queue = %registration.qname,
            tasks = ?registration.task_names,
            "tasks registered"
        );
        Ok(())
    }

    pub fn new_worker(&self, name: impl Into<String>, concurrency: usize) -> Worker {
        Worker {
            name: name.into(),
            concurrency: concurrency.max(1),
            queue: self.config.queue_name.clone(),
            broker_uri: self.config.broker_uri(),
            retry: self.config.poll_retry.clone(),
            registry: Arc::clone(&self.registry),
            broker: Arc::clone(&self.broker),
            sink: self.sink.clone(),
        }
    }

    fn require_queue(&self) -> Result<&str, PorterError> {
        if self.config.queue_name.is_empty() {
            return Err(PorterError::NoQueue);
        }
        Ok(&self.config.queue_name)
    }
}

/// A named consumer. Runs `concurrency` pollers once fetched.
pub struct Worker {
    name: String,
    concurrency: usize,
    queue: String,
    broker_uri: String,
    retry: RetryPolicy,
    registry: Arc<TaskRegistry>,
    broker: Arc<dyn Broker>,
    sink: Option<SinkHandle>,
}

impl Worker {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Subscribe and consume until `shutdown` resolves or every poller has
    /// stopped.
    pub async fn fetch<F>(self, shutdown: F) -> Result<Vec<WorkerExit>, PorterError>
    where
        F: Future<Output = ()>,
    {
        if self.queue.is_empty() {
            return Err(PorterError::NoQueue);
        }
        if let Some(handle) = &self.sink {
            handle.sink.connect().await?;
        }

        let subscription = Subscription {
            id: Ulid::new().to_string(),
            name: self.name.clone(),
            qname: self.queue.clone(),
        };
        self.broker.subscribe(&subscription).await?;

        let ctx = Arc::new(PollerContext {
            registry: self.registry,
            broker: self.broker,
            sink: self.sink,
            queue: self.queue,
            subscriber: self.name,
            retry: self.retry,
        });
        let pool = WorkerPool::spawn(self.concurrency, Arc::clone(&ctx));

        tracing::info!(
            worker = %ctx.subscriber,
            subscription = %subscription.id,
            concurrency = self.concurrency,
            broker = %self.broker_uri,
            queue = %ctx.queue,
            tasks = ?ctx.registry.task_names(),
            "worker started"
        );

        let exits = pool.run_until(shutdown).await;
        tracing::info!(worker = %ctx.subscriber, "worker stopped");
        Ok(exits)
    }
}
