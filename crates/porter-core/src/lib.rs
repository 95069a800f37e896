//! porter-core
//!
//! Client runtime for an HTTP task-queue broker.
//!
//! # モジュール構成
//! - **domain**: ワイヤ形式と値の型（Argument, JobResponse, Value, ...）
//! - **typed**: 型付き Task API（IntoTask, TaskRegistry, codec）
//! - **ports**: 抽象化レイヤー（Broker, ResultSink, Clock）
//! - **impls**: 実装（HttpBroker, RedisResultSink, in-memory 版）
//! - **app**: Server / Worker / WorkerPool
//!
//! ```ignore
//! let mut server = Server::new(Config::from_env()?)?;
//! server.declare_queue("math", 100, true).await?;
//! server
//!     .register_tasks(Tasks::new().add("add", |a: i64, b: i64| a + b))
//!     .await?;
//! server.new_worker("adder", 4).fetch(shutdown).await?;
//! ```

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod typed;

pub use app::{RetryPolicy, Server, Worker, WorkerExit};
pub use config::{BackendKind, Config, ResultBackendConfig};
pub use domain::{Argument, JobResponse, NormalizedValue, Signature, TypeTag, Value};
pub use error::{ConfigError, PorterError};
pub use typed::{TaskRegistry, Tasks};
