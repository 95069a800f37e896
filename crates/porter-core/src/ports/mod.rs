//! Ports - 抽象化レイヤー
//!
//! Each trait is the seam to an external system. Implementations live in
//! `impls`.
//!
//! - **Broker**: the remote queue (HTTP in production)
//! - **ResultSink**: where finished jobs are recorded
//! - **Clock**: current time, replaceable in tests

pub mod broker;
pub mod clock;
pub mod result_sink;

pub use self::broker::{
    Acknowledgement, Broker, BrokerError, PublishRequest, QueueDeclaration, Subscription,
    TaskRegistration,
};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::result_sink::{ResultSink, SinkError};
