//! Error types for the LL layer.
//!
//! Errors at this level are backend-focused. No semantic errors like
//! "type mismatch" or "index out of range" - those belong in higher layers.

use crate::Revision;

/// Errors at the LL (low-level) layer.
///
/// These are transport and storage-level errors only. Semantic errors
/// (invalid paths, kind mismatches, codec failures) belong in higher layers.
#[derive(Debug, thiserror::Error)]
pub enum LLError {
    /// Generic I/O or transport failure.
    ///
    /// Use this for network errors, file I/O errors, RPC failures, etc.
    #[error("transport error: {0}")]
    Transport(Box<dyn std::error::Error + Send + Sync>),

    /// The operation is not supported by this backend.
    #[error("operation not supported")]
    NotSupported,

    /// The backend cannot serve requests right now (poisoned lock, closed
    /// connection, ...).
    #[error("backend unavailable: {message}")]
    Unavailable { message: String },

    /// A read asked for a revision the backend has not reached yet.
    #[error("revision {requested} is newer than current revision {current}")]
    FutureRevision { requested: Revision, current: Revision },

    /// An optimistic transaction kept conflicting until its attempt budget
    /// ran out.
    #[error("transaction conflicted {attempts} times, giving up")]
    Conflict { attempts: u32 },
}

impl From<std::io::Error> for LLError {
    fn from(e: std::io::Error) -> Self {
        LLError::Transport(Box::new(e))
    }
}
