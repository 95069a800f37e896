//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **HttpBroker**: 本番用のブローカークライアント (reqwest)
//! - **InMemoryBroker**: 開発用・テスト用のブローカー
//! - **RedisResultSink**: 本番用の結果ストア (feature `redis`)
//! - **InMemoryResultSink**: 開発用の結果ストア

pub mod http_broker;
pub mod inmem_broker;
pub mod memory_sink;
#[cfg(feature = "redis")]
pub mod redis_sink;

use std::sync::Arc;

use crate::config::{BackendKind, ResultBackendConfig};
use crate::error::ConfigError;
use crate::ports::ResultSink;

pub use self::http_broker::HttpBroker;
pub use self::inmem_broker::InMemoryBroker;
pub use self::memory_sink::InMemoryResultSink;
#[cfg(feature = "redis")]
pub use self::redis_sink::RedisResultSink;

/// Result store for a backend descriptor. Does not connect.
pub fn build_sink(config: &ResultBackendConfig) -> Result<Arc<dyn ResultSink>, ConfigError> {
    match config.kind {
        #[cfg(feature = "redis")]
        BackendKind::Redis => Ok(Arc::new(RedisResultSink::new(config.redis_url()))),
        #[cfg(not(feature = "redis"))]
        BackendKind::Redis => Err(ConfigError::UnsupportedBackend(
            "redis (built without the `redis` feature)".to_string(),
        )),
        BackendKind::Memory => Ok(Arc::new(InMemoryResultSink::new())),
    }
}
