use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("failed to parse source: {0}")]
    Parse(#[from] syn::Error),

    #[error("no service methods found")]
    NoMethods,

    #[error("no service type found (expected an impl on a type ending in \"Service\")")]
    NoService,

    #[error("could not resolve the message import for request type {0}")]
    UnresolvedMessagePath(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CodegenError>;
