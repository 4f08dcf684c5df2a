use crate::store::DocId;
use serde::Serialize;
use thiserror::Error;

/// Errors raised while building, loading or querying an index.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("duplicate document location {location:?}")]
    DuplicateLocation { location: String },

    #[error("failed to tokenize document {location:?}: {reason}")]
    TokenizationFailure { location: String, reason: String },

    #[error("query has no searchable terms")]
    EmptyQuery,

    #[error("unsupported index format version {found} (supported: {supported})")]
    VersionMismatch { found: u32, supported: u32 },

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("document {0} not found")]
    NotFound(DocId),

    #[error("tokenizer configuration does not match the one the index was built with")]
    TokenizerMismatch,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Payload-free discriminant of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidInput,
    DuplicateLocation,
    TokenizationFailure,
    EmptyQuery,
    VersionMismatch,
    CorruptIndex,
    NotFound,
    TokenizerMismatch,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::DuplicateLocation { .. } => ErrorKind::DuplicateLocation,
            Error::TokenizationFailure { .. } => ErrorKind::TokenizationFailure,
            Error::EmptyQuery => ErrorKind::EmptyQuery,
            Error::VersionMismatch { .. } => ErrorKind::VersionMismatch,
            Error::CorruptIndex(_) => ErrorKind::CorruptIndex,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::TokenizerMismatch => ErrorKind::TokenizerMismatch,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Error::CorruptIndex(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
