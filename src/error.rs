use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("corruption detected: {0}")]
    Corruption(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0} already exists")]
    AlreadyExists(&'static str),
    #[error("key length {len} exceeds maximum {max}")]
    KeyTooLong { len: usize, max: usize },
    #[error("mutation attempted on a read-only handle")]
    ReadOnly,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
