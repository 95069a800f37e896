use thiserror::Error;

use crate::app::dispatch::DispatchError;
use crate::ports::{BrokerError, SinkError};
use crate::typed::CodecError;

#[derive(Debug, Error)]
pub enum PorterError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("result backend error: {0}")]
    Sink(#[from] SinkError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("no queue declared; call declare_queue or set a queue name")]
    NoQueue,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unsupported result backend `{0}`")]
    UnsupportedBackend(String),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}
