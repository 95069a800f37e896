//! Redis result store.
//!
//! One multiplexed connection is opened in `connect` and cloned per write.
//! Records are written with `SET key json EX ttl`, or a plain `SET` when the
//! TTL is zero.

use std::time::Duration;

use ::redis::AsyncCommands;
use ::redis::aio::MultiplexedConnection;
use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::domain::{JobResponse, NormalizedValue, ResultRecord};
use crate::ports::{ResultSink, SinkError};

pub struct RedisResultSink {
    url: String,
    conn: OnceCell<MultiplexedConnection>,
}

impl RedisResultSink {
    /// `url` has the form `redis://[user][:password@]host:port/db`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            conn: OnceCell::new(),
        }
    }

    /// Wrap a connection the caller already opened.
    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self {
            url: String::new(),
            conn: OnceCell::new_with(Some(conn)),
        }
    }
}

// url may carry a password
impl std::fmt::Debug for RedisResultSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisResultSink")
            .field("connected", &self.conn.initialized())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ResultSink for RedisResultSink {
    async fn connect(&self) -> Result<(), SinkError> {
        self.conn
            .get_or_try_init(|| async {
                let client = ::redis::Client::open(self.url.as_str())
                    .map_err(|e| SinkError::Connect(format!("invalid redis url: {e}")))?;
                let mut conn = client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(|e| SinkError::Connect(e.to_string()))?;
                ::redis::cmd("PING")
                    .query_async::<String>(&mut conn)
                    .await
                    .map_err(|e| SinkError::Connect(format!("ping failed: {e}")))?;
                Ok::<_, SinkError>(conn)
            })
            .await?;
        tracing::info!("connected to redis result backend");
        Ok(())
    }

    async fn store(
        &self,
        job: &JobResponse,
        results: &[NormalizedValue],
        ttl: Duration,
    ) -> Result<(), SinkError> {
        let mut conn = self.conn.get().cloned().ok_or(SinkError::NotConnected)?;

        let key = job.result_key();
        let body = serde_json::to_string(&ResultRecord::new(job, results))?;

        let written = if ttl.is_zero() {
            conn.set::<_, _, ()>(&key, body).await
        } else {
            // EX は秒単位 (切り捨て、最低 1 秒)
            let secs = ttl.as_secs().max(1);
            conn.set_ex::<_, _, ()>(&key, body, secs).await
        };

        written.map_err(|e| SinkError::Write {
            key,
            reason: e.to_string(),
        })
    }
}
