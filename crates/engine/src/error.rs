use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("wal: {0}")]
    Wal(#[from] wal::WalError),
    #[error("sstable: {0}")]
    Sst(#[from] sstable::SstError),
    #[error("key not found")]
    NotFound,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
