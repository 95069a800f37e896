//! App - アプリケーション層
//!
//! ports を組み合わせてクライアントの振る舞いを実装する。
//!
//! # 主要コンポーネント
//! - **Server / Worker**: 公開 API (declare / publish / register / fetch)
//! - **WorkerPool**: poll → decode → dispatch → ack → store のループ
//! - **dispatch**: 引数検証とタスク呼び出し
//! - **RetryPolicy**: poll 失敗時のバックオフ

pub mod dispatch;
pub mod retry;
pub mod server;
pub mod worker_pool;

pub use self::dispatch::DispatchError;
pub use self::retry::RetryPolicy;
pub use self::server::{Server, Worker};
pub use self::worker_pool::{JobOutcome, PollerContext, SinkHandle, WorkerExit, WorkerPool};
