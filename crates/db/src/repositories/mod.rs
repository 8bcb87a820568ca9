use rolecall_core::StoreError;
use thiserror::Error;

pub mod json_file;
pub mod sql;

pub use json_file::JsonFileBindingStore;
pub use sql::SqlBindingStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        StoreError::Database(error.to_string())
    }
}
