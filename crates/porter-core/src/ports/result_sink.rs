//! ResultSink port - durable record of a job's arguments and results.
//!
//! Any backend that can `connect` once and `store` a record under a TTL is
//! substitutable. Records are keyed `<job_name>_<id>` and serialized as
//! [`ResultRecord`](crate::domain::ResultRecord) JSON.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{JobResponse, NormalizedValue};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("result backend connection failed: {0}")]
    Connect(String),

    #[error("result backend is not connected")]
    NotConnected,

    #[error("failed to encode result record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("result backend write failed for {key}: {reason}")]
    Write { key: String, reason: String },
}

#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Called once, before any worker starts.
    async fn connect(&self) -> Result<(), SinkError>;

    /// Persist `job.args` and `results`. A zero `ttl` means no expiry.
    async fn store(
        &self,
        job: &JobResponse,
        results: &[NormalizedValue],
        ttl: Duration,
    ) -> Result<(), SinkError>;
}
