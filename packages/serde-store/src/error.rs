//! Errors for typed access.

use structkv_core_store::Error as StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The node could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A Rust value could not be turned into a tree value.
    #[error("serialize failed: {0}")]
    Serialize(#[source] serde_json::Error),

    /// A tree value does not fit the requested Rust type.
    #[error("deserialize failed at {path}: {source}")]
    Deserialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
