//! InMemoryBroker - 開発用・テスト用のブローカー
//!
//! HashMap<String, VecDeque<JobResponse>> でキューごとにジョブを保持し、
//! `Notify` で待機中の poll を起こす。
//! ack / subscribe / register はすべて記録され、テストから参照できる。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::domain::JobResponse;
use crate::ports::{
    Acknowledgement, Broker, BrokerError, PublishRequest, QueueDeclaration, Subscription,
    TaskRegistration,
};

#[derive(Default)]
struct State {
    queues: HashMap<String, VecDeque<JobResponse>>,
    declarations: Vec<QueueDeclaration>,
    registrations: Vec<TaskRegistration>,
    subscriptions: Vec<Subscription>,
    acks: Vec<Acknowledgement>,
}

/// Process-local broker. Publish ids start at 1.
pub struct InMemoryBroker {
    state: Mutex<State>,
    notify: Notify,
    next_id: AtomicI64,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            next_id: AtomicI64::new(1),
        }
    }

    /// Enqueue a job exactly as given, bypassing id assignment.
    pub async fn push(&self, queue: &str, job: JobResponse) {
        let mut state = self.state.lock().await;
        state
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(job);
        drop(state);
        self.notify.notify_waiters();
    }

    pub async fn pending(&self, queue: &str) -> usize {
        let state = self.state.lock().await;
        state.queues.get(queue).map_or(0, VecDeque::len)
    }

    pub async fn acks(&self) -> Vec<Acknowledgement> {
        self.state.lock().await.acks.clone()
    }

    pub async fn subscriptions(&self) -> Vec<Subscription> {
        self.state.lock().await.subscriptions.clone()
    }

    pub async fn registrations(&self) -> Vec<TaskRegistration> {
        self.state.lock().await.registrations.clone()
    }

    pub async fn declarations(&self) -> Vec<QueueDeclaration> {
        self.state.lock().await.declarations.clone()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_queue(&self, declaration: &QueueDeclaration) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        state.queues.entry(declaration.name.clone()).or_default();
        state.declarations.push(declaration.clone());
        Ok(())
    }

    async fn publish(&self, request: &PublishRequest) -> Result<(), BrokerError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let job = JobResponse::new(id, request.task.clone(), request.args.clone());
        self.push(&request.qname, job).await;
        Ok(())
    }

    async fn register_tasks(&self, registration: &TaskRegistration) -> Result<(), BrokerError> {
        self.state
            .lock()
            .await
            .registrations
            .push(registration.clone());
        Ok(())
    }

    async fn subscribe(&self, subscription: &Subscription) -> Result<(), BrokerError> {
        self.state
            .lock()
            .await
            .subscriptions
            .push(subscription.clone());
        Ok(())
    }

    /// Blocks until a job is available on `queue`.
    async fn poll(&self, queue: &str, _subscriber: &str) -> Result<JobResponse, BrokerError> {
        loop {
            // push 前に登録しておかないと通知を取りこぼす
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if let Some(job) = state.queues.get_mut(queue).and_then(VecDeque::pop_front) {
                    return Ok(job);
                }
            }

            notified.await;
        }
    }

    async fn acknowledge(&self, ack: &Acknowledgement) -> Result<(), BrokerError> {
        self.state.lock().await.acks.push(ack.clone());
        Ok(())
    }
}
