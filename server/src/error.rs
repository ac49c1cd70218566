use mobile_protocol::CodecError;

use crate::monitor::MonitorError;

#[derive(Debug, thiserror::Error)]
pub enum MobileServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Could not resolve bind address '{0}'")]
    UnresolvedAddress(String),

    #[error("Blocking task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, MobileServerError>;
