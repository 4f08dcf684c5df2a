//! Full-text search over generated documentation.
//!
//! Documents go into a [`DocumentStore`], get analyzed by a [`Tokenizer`] and
//! merged into an [`InvertedIndex`]. The index is served through an immutable
//! [`Snapshot`] held by an [`IndexHandle`], and travels to clients via
//! [`persist`].

pub mod documenter;
pub mod error;
pub mod index;
pub mod persist;
pub mod query;
pub mod snapshot;
pub mod store;
pub mod tokenizer;

pub use error::{Error, ErrorKind, Result};
pub use index::{BuildConfig, InvertedIndex, Posting};
pub use query::{Query, ScoringConfig, SearchHit, SearchOptions, SearchResponse, SearchResult};
pub use snapshot::{IndexHandle, Snapshot};
pub use store::{Category, DocId, Document, DocumentStore, DuplicatePolicy, NewDocument};
pub use tokenizer::{StemmerChoice, Token, Tokenizer, TokenizerConfig};
