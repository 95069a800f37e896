//! Process-local result store with TTL, keyed like the Redis sink.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{JobResponse, NormalizedValue, ResultRecord};
use crate::ports::{Clock, ResultSink, SinkError, SystemClock};

struct Entry {
    record: ResultRecord,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

pub struct InMemoryResultSink<C = SystemClock> {
    clock: C,
    connected: AtomicBool,
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryResultSink<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for InMemoryResultSink<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemoryResultSink<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            connected: AtomicBool::new(false),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The stored record, unless it has expired.
    pub async fn get(&self, key: &str) -> Option<ResultRecord> {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|entry| entry.live(now))
            .map(|entry| entry.record.clone())
    }

    /// Live keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl<C: Clock> ResultSink for InMemoryResultSink<C> {
    async fn connect(&self) -> Result<(), SinkError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn store(
        &self,
        job: &JobResponse,
        results: &[NormalizedValue],
        ttl: Duration,
    ) -> Result<(), SinkError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SinkError::NotConnected);
        }

        let key = job.result_key();
        let expires_at = if ttl.is_zero() {
            None
        } else {
            let ttl = chrono::Duration::from_std(ttl).map_err(|e| SinkError::Write {
                key: key.clone(),
                reason: e.to_string(),
            })?;
            Some(self.clock.now() + ttl)
        };

        let entry = Entry {
            record: ResultRecord::new(job, results),
            expires_at,
        };
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.live(now));
        entries.insert(key, entry);
        Ok(())
    }
}
