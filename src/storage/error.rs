/// The storage-layer error family. Handlers convert this into
/// `AppError` with `From`; it deliberately does not carry `Validation` or
/// `Authentication`/`Authorization` variants — those are caller-side
/// concerns the storage trait never needs to express.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Internal(String),
}

pub type StorageResult<T> = Result<T, StorageError>;
