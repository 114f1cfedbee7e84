//! Persistence boundary for auth session state.
//!
//! Backends implement [`StateStorage`]:
//! - [`MemoryStorage`]: in-process map, for tests and embedding
//! - [`FileStorage`]: one JSON file per key in a directory
//!
//! [`SessionStateStore`] sits on top and stores a single serializable blob
//! under the key `<session name>-<auth type>`.

mod file;
mod memory;
mod store;
mod traits;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use store::SessionStateStore;
pub use traits::StateStorage;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Encoding(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
