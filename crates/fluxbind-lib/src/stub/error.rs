//! Transport errors.

use super::ttrpc::MESSAGE_LENGTH_MAX;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StubError>;

#[derive(Debug, Error)]
pub enum StubError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("message of {0} bytes exceeds the {MESSAGE_LENGTH_MAX} byte limit")]
    MessageTooLarge(usize),

    #[error("unexpected ttrpc message type {0}")]
    UnexpectedMessageType(u8),

    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("{method} failed with status {code}: {message}")]
    Status {
        method: String,
        code: i32,
        message: String,
    },

    #[error("{0} timed out")]
    Timeout(String),

    #[error("session task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for StubError {
    fn from(err: tokio::task::JoinError) -> Self {
        StubError::Task(err.to_string())
    }
}
