//! Error types for the core layer.

use structkv_ll_store::LLError;
use thiserror::Error;

use crate::Kind;

/// Errors at the core layer.
///
/// These are the semantic errors of path translation, encoding and tagging,
/// plus the backend errors from the LL layer, which pass through unchanged.
#[derive(Debug, Error)]
pub enum Error {
    /// A path or name the caller supplied is not allowed.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    /// Deleting from a container whose recorded length is zero.
    #[error("directory {path} is empty")]
    EmptyDir { path: String },

    #[error("tag {name:?} already exists under {root}")]
    TagExists { root: String, name: String },

    #[error("unsupported operation: {message}")]
    UnsupportedOperation { message: String },

    /// Stored data whose kind cannot be determined.
    #[error("unknown type at {path}: {message}")]
    UnknownType { path: String, message: String },

    /// A value the encoder has no stored representation for.
    #[error("unsupported type: {type_name}")]
    UnsupportedType { type_name: &'static str },

    /// Writing a value whose kind differs from the stored node's kind.
    #[error("kind mismatch at {path}: stored {stored}, writing {writing}")]
    KindMismatch {
        path: String,
        stored: Kind,
        writing: Kind,
    },

    #[error("index {index} out of range for {path} (length {len})")]
    IndexOutOfRange { path: String, index: u64, len: u64 },

    #[error("tag {name:?} not found under {root}")]
    TagNotFound { root: String, name: String },

    #[error("template error: {message}")]
    Template { message: String },

    /// The check hook rejected a reference.
    #[error("reference {reference:?} rejected: {source}")]
    Hook {
        reference: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A metadata field that does not parse.
    #[error("corrupt metadata at {key}: {message}")]
    Metadata { key: String, message: String },

    #[error(transparent)]
    Backend(#[from] LLError),

    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Coarse classification of [`Error`] values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    InvalidOperation,
    UnsupportedOperation,
    UnknownType,
    UnsupportedType,
    IndexOutOfRange,
    TagNotFound,
    Template,
    Hook,
    Metadata,
    Backend,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Error::InvalidOperation { .. } | Error::EmptyDir { .. } | Error::TagExists { .. } => {
                ErrorKind::InvalidOperation
            }
            Error::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            Error::UnknownType { .. } => ErrorKind::UnknownType,
            Error::UnsupportedType { .. } | Error::KindMismatch { .. } => {
                ErrorKind::UnsupportedType
            }
            Error::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            Error::TagNotFound { .. } => ErrorKind::TagNotFound,
            Error::Template { .. } => ErrorKind::Template,
            Error::Hook { .. } => ErrorKind::Hook,
            Error::Metadata { .. } => ErrorKind::Metadata,
            Error::Backend(_) => ErrorKind::Backend,
            Error::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    pub(crate) fn unsupported_operation(message: impl Into<String>) -> Self {
        Error::UnsupportedOperation {
            message: message.into(),
        }
    }

    pub(crate) fn template(message: impl Into<String>) -> Self {
        Error::Template {
            message: message.into(),
        }
    }
}
