use crate::error::Result;
use crate::index::InvertedIndex;
use crate::persist;
use crate::query::{self, Query, ScoringConfig, SearchOptions, SearchResponse, SearchResult};
use crate::store::{Document, DocId, DocumentStore};
use crate::tokenizer::Tokenizer;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

/// An immutable index together with its documents, queried without locks.
#[derive(Debug, Clone)]
pub struct Snapshot {
    index: InvertedIndex,
    store: DocumentStore,
    tokenizer: Tokenizer,
    scoring: ScoringConfig,
}

impl Snapshot {
    /// The query tokenizer is derived from the configuration recorded in the
    /// index, never supplied separately.
    pub fn new(index: InvertedIndex, store: DocumentStore) -> Self {
        let tokenizer = Tokenizer::new(index.tokenizer_config().clone());
        Self { index, store, tokenizer, scoring: ScoringConfig::default() }
    }

    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (index, store) = persist::deserialize_with_documents(bytes)?;
        Ok(Self::new(index, store))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let (index, store) = persist::load_index(path)?;
        Ok(Self::new(index, store))
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn document(&self, id: DocId) -> Result<&Document> {
        self.store.get_document(id)
    }

    pub fn parse(&self, raw: &str) -> Result<Query> {
        Query::parse(raw, &self.tokenizer)
    }

    pub fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        query::search_with_tokenizer(query, &self.tokenizer, &self.index, &self.store, options, &self.scoring)
    }

    pub fn respond(&self, query: &str, options: &SearchOptions) -> Result<SearchResponse> {
        query::respond(query, &self.tokenizer, &self.index, &self.store, options, &self.scoring)
    }
}

/// Shared pointer to the live snapshot. Rebuilds happen off to the side and
/// become visible through a single swap; readers holding an older `Arc` keep
/// using it until they drop it.
#[derive(Debug)]
pub struct IndexHandle {
    current: RwLock<Arc<Snapshot>>,
}

impl IndexHandle {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { current: RwLock::new(Arc::new(snapshot)) }
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    /// Publish `snapshot` and return the one it replaced.
    pub fn swap(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let next = Arc::new(snapshot);
        let prev = std::mem::replace(&mut *self.current.write(), next);
        tracing::info!(num_docs = prev.index.num_docs(), "index snapshot swapped");
        prev
    }

    /// Decode `bytes` and publish them. On failure the current snapshot stays
    /// live and the error is returned.
    pub fn reload(&self, bytes: &[u8]) -> Result<Arc<Snapshot>> {
        match Snapshot::from_bytes(bytes) {
            Ok(snapshot) => {
                self.swap(snapshot);
                Ok(self.current())
            }
            Err(e) => {
                tracing::warn!(error = %e, "index reload failed; keeping previous snapshot");
                Err(e)
            }
        }
    }

    pub fn reload_from_path(&self, path: &Path) -> Result<Arc<Snapshot>> {
        match Snapshot::load(path) {
            Ok(snapshot) => {
                self.swap(snapshot);
                Ok(self.current())
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "index reload failed; keeping previous snapshot");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::BuildConfig;
    use crate::persist::SerializeOptions;
    use crate::store::{Category, NewDocument};
    use crate::ErrorKind;

    fn snapshot(body: &str) -> Snapshot {
        let mut store = DocumentStore::new();
        store.add_document(NewDocument::new("#doc", "Doc", body, Category::Page)).unwrap();
        let index = InvertedIndex::build_from_store(&store, &Tokenizer::default(), &BuildConfig::default()).unwrap();
        Snapshot::new(index, store)
    }

    #[test]
    fn in_flight_readers_keep_old_snapshot() {
        let handle = IndexHandle::new(snapshot("orchid"));
        let held = handle.current();
        handle.swap(snapshot("tulip"));
        let opts = SearchOptions::default();
        assert_eq!(held.search("orchid", &opts).unwrap().len(), 1);
        assert!(handle.current().search("orchid", &opts).unwrap().is_empty());
        assert_eq!(handle.current().search("tulip", &opts).unwrap().len(), 1);
    }

    #[test]
    fn failed_reload_keeps_serving() {
        let handle = IndexHandle::new(snapshot("orchid"));
        let err = handle.reload(b"{\"version\": 42}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::VersionMismatch);
        let err = handle.reload(b"garbage").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptIndex);
        assert_eq!(handle.current().search("orchid", &SearchOptions::default()).unwrap().len(), 1);
    }

    #[test]
    fn reload_publishes_new_index() {
        let handle = IndexHandle::new(snapshot("orchid"));
        let next = snapshot("tulip");
        let bytes = persist::serialize(next.index(), Some(next.store()), &SerializeOptions::default()).unwrap();
        handle.reload(&bytes).unwrap();
        assert_eq!(handle.current().search("tulip", &SearchOptions::default()).unwrap().len(), 1);
    }

    #[test]
    fn concurrent_queries_share_a_snapshot() {
        let handle = Arc::new(IndexHandle::new(snapshot("orchid garden")));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let handle = Arc::clone(&handle);
                std::thread::spawn(move || handle.current().search("garden", &SearchOptions::default()).unwrap().len())
            })
            .collect();
        for t in threads {
            assert_eq!(t.join().unwrap(), 1);
        }
    }
}
