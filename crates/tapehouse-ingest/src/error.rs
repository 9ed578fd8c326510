use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] tapehouse_storage::Error),

    #[error("No tokio runtime available; call from within a runtime")]
    NoRuntime,

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
