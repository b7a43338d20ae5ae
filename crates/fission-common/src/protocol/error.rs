use std::time::Duration;

use thiserror::Error;

use crate::protocol::status::Status;

#[derive(Error, Debug)]
pub enum FissionError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame of {got} bytes exceeds the {max} byte limit")]
    FrameTooLarge { got: usize, max: usize },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("no worker pool for target: {0}")]
    UnknownTarget(String),

    #[error("pool {0} has no active workers")]
    NoWorkers(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("handler error: {0}")]
    Handler(Status),

    #[error("request failed after {attempts} attempts, last error: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("no node is attached to this context")]
    NoNode,
}

pub type Result<T> = std::result::Result<T, FissionError>;
