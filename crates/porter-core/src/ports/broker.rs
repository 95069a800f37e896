//! Broker port - the remote queue service this client talks to.
//!
//! The broker owns queueing, durability and delivery. This side only
//! declares, publishes, subscribes, polls and acknowledges.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Argument, JobResponse};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    #[error("broker unreachable: {0}")]
    Transport(String),

    #[error("broker answered {status} on {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("malformed job body: {0}")]
    Decode(String),
}

/// `{name, cap, durable}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueDeclaration {
    pub name: String,
    pub cap: usize,
    pub durable: bool,
}

/// `{task, args, qname}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub task: String,
    pub args: Vec<Argument>,
    pub qname: String,
}

/// `{task_names, qname}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRegistration {
    pub task_names: Vec<String>,
    pub qname: String,
}

/// `{id, name, qname}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub name: String,
    pub qname: String,
}

/// `{ack, qname, subscriber}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub ack: bool,
    pub qname: String,
    pub subscriber: String,
}

impl Acknowledgement {
    pub fn new(qname: impl Into<String>, subscriber: impl Into<String>) -> Self {
        Self {
            ack: true,
            qname: qname.into(),
            subscriber: subscriber.into(),
        }
    }
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn declare_queue(&self, declaration: &QueueDeclaration) -> Result<(), BrokerError>;

    async fn publish(&self, request: &PublishRequest) -> Result<(), BrokerError>;

    async fn register_tasks(&self, registration: &TaskRegistration) -> Result<(), BrokerError>;

    async fn subscribe(&self, subscription: &Subscription) -> Result<(), BrokerError>;

    /// Wait for the next job addressed to `subscriber` on `queue`.
    ///
    /// May block indefinitely; callers race it against shutdown.
    async fn poll(&self, queue: &str, subscriber: &str) -> Result<JobResponse, BrokerError>;

    async fn acknowledge(&self, ack: &Acknowledgement) -> Result<(), BrokerError>;
}
