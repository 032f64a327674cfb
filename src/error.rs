use thiserror::Error;

pub type VellumResult<T, E = VellumError> = Result<T, E>;

#[derive(Debug, Error)]
pub enum VellumError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Buffer pool exhausted: every frame is pinned")]
    BufferPoolFull,
}
