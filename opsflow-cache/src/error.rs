//! Cache error type.

use opsflow_core::{OpsError, StorageError};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// A thread panicked while holding the store lock.
    #[error("Cache lock poisoned")]
    LockPoisoned,
}

impl From<CacheError> for OpsError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::LockPoisoned => OpsError::Storage(StorageError::LockPoisoned),
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
