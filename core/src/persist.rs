//! Portable encoding of an index and its document table.
//!
//! Layout (JSON shown; the binary encoding is the same structure through
//! bincode, behind a 4-byte magic):
//!
//! ```text
//! { "version": 1,
//!   "tokenizerConfig": {...}, "build": {...}, "numDocs": N,
//!   "terms": { "term": [[docId, tf, [positions...]], ...] },
//!   "documents": { "docId": {"location", "page", "title", "category", "text"} } }
//! ```

use crate::error::{Error, Result};
use crate::index::{BuildConfig, InvertedIndex, Posting};
use crate::store::{Category, DocId, Document, DocumentStore};
use crate::tokenizer::TokenizerConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;
const BINARY_MAGIC: &[u8; 4] = b"DSIX";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encoding {
    #[default]
    Json,
    Binary,
}

#[derive(Debug, Clone)]
pub struct SerializeOptions {
    pub encoding: Encoding,
    /// Embed each document's body so clients can show excerpts.
    pub include_text: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self { encoding: Encoding::Json, include_text: true }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexFile {
    version: u32,
    tokenizer_config: TokenizerConfig,
    build: BuildConfig,
    num_docs: u32,
    terms: BTreeMap<String, Vec<WirePosting>>,
    documents: Option<BTreeMap<DocId, DocumentRecord>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WirePosting(DocId, u32, Vec<u32>);

#[derive(Debug, Serialize, Deserialize)]
struct DocumentRecord {
    location: String,
    #[serde(default)]
    page: Option<String>,
    title: String,
    category: Category,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

/// Encode `index`, optionally with the document table of `store`.
pub fn serialize(index: &InvertedIndex, store: Option<&DocumentStore>, options: &SerializeOptions) -> Result<Vec<u8>> {
    let terms = index
        .terms()
        .map(|(term, postings)| {
            let wire = postings.iter().map(|p| WirePosting(p.doc_id, p.term_frequency, p.positions.clone())).collect();
            (term.to_string(), wire)
        })
        .collect();
    let documents = store.map(|s| {
        s.all_documents()
            .map(|d| {
                let record = DocumentRecord {
                    location: d.location.clone(),
                    page: d.page.clone(),
                    title: d.title.clone(),
                    category: d.category.clone(),
                    text: options.include_text.then(|| d.body.clone()),
                };
                (d.id, record)
            })
            .collect()
    });
    let file = IndexFile {
        version: FORMAT_VERSION,
        tokenizer_config: index.tokenizer_config().clone(),
        build: index.build_config().clone(),
        num_docs: index.num_docs(),
        terms,
        documents,
    };
    match options.encoding {
        Encoding::Json => serde_json::to_vec(&file).map_err(|e| Error::InvalidInput(format!("failed to encode index: {e}"))),
        Encoding::Binary => {
            let mut out = BINARY_MAGIC.to_vec();
            let body = bincode::serialize(&file).map_err(|e| Error::InvalidInput(format!("failed to encode index: {e}")))?;
            out.extend_from_slice(&body);
            Ok(out)
        }
    }
}

/// Decode an index, discarding any embedded document table.
pub fn deserialize(bytes: &[u8]) -> Result<InvertedIndex> {
    decode(bytes).map(|(index, _)| index)
}

/// Decode an index together with its embedded document table.
pub fn deserialize_with_documents(bytes: &[u8]) -> Result<(InvertedIndex, DocumentStore)> {
    let (index, store) = decode(bytes)?;
    let store = store.ok_or_else(|| Error::corrupt("index has no document table"))?;
    Ok((index, store))
}

fn decode(bytes: &[u8]) -> Result<(InvertedIndex, Option<DocumentStore>)> {
    let file: IndexFile = match bytes.strip_prefix(BINARY_MAGIC.as_slice()) {
        Some(body) => {
            let header: u32 = bincode::deserialize(body).map_err(|e| Error::corrupt(format!("unreadable header: {e}")))?;
            check_version(header)?;
            bincode::deserialize(body).map_err(|e| Error::corrupt(e.to_string()))?
        }
        None => {
            let header: VersionHeader = serde_json::from_slice(bytes).map_err(|e| Error::corrupt(format!("unreadable header: {e}")))?;
            check_version(header.version)?;
            serde_json::from_slice(bytes).map_err(|e| Error::corrupt(e.to_string()))?
        }
    };
    validate(file)
}

fn check_version(found: u32) -> Result<()> {
    if found != FORMAT_VERSION {
        return Err(Error::VersionMismatch { found, supported: FORMAT_VERSION });
    }
    Ok(())
}

fn validate(file: IndexFile) -> Result<(InvertedIndex, Option<DocumentStore>)> {
    let store = match file.documents {
        Some(table) => {
            if table.len() != file.num_docs as usize {
                return Err(Error::corrupt(format!("numDocs is {} but the document table has {} entries", file.num_docs, table.len())));
            }
            let docs = table
                .into_iter()
                .map(|(id, r)| Document {
                    id,
                    location: r.location,
                    page: r.page,
                    title: r.title,
                    body: r.text.unwrap_or_default(),
                    category: r.category,
                })
                .collect();
            let mut store = DocumentStore::from_documents(docs)?;
            store.set_policy(file.build.duplicate_policy);
            Some(store)
        }
        None => None,
    };

    let mut terms = BTreeMap::new();
    for (term, wire) in file.terms {
        if wire.is_empty() {
            return Err(Error::corrupt(format!("term {term:?} has no postings")));
        }
        let mut postings: Vec<Posting> = Vec::with_capacity(wire.len());
        for WirePosting(doc_id, term_frequency, positions) in wire {
            if doc_id >= file.num_docs {
                return Err(Error::corrupt(format!("term {term:?} references unknown document {doc_id}")));
            }
            if postings.last().is_some_and(|prev| prev.doc_id >= doc_id) {
                return Err(Error::corrupt(format!("postings for {term:?} are not ordered by document id")));
            }
            if term_frequency == 0 || positions.is_empty() {
                return Err(Error::corrupt(format!("empty posting for {term:?} in document {doc_id}")));
            }
            if positions.windows(2).any(|w| w[0] >= w[1]) {
                return Err(Error::corrupt(format!("positions for {term:?} in document {doc_id} are not ascending")));
            }
            postings.push(Posting { doc_id, term_frequency, positions });
        }
        terms.insert(term, postings);
    }

    let index = InvertedIndex::from_parts(terms, file.tokenizer_config, file.build, file.num_docs);
    tracing::debug!(num_docs = index.num_docs(), num_terms = index.num_terms(), "decoded index");
    Ok((index, store))
}

/// Write `bytes` next to `path` and rename into place, so readers see either
/// the old file or the complete new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let tmp = tmp_path(path);
    {
        let mut f = File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

pub fn save_index(path: &Path, index: &InvertedIndex, store: &DocumentStore, options: &SerializeOptions) -> Result<()> {
    let bytes = serialize(index, Some(store), options)?;
    write_atomic(path, &bytes)?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "index written");
    Ok(())
}

pub fn load_index(path: &Path) -> Result<(InvertedIndex, DocumentStore)> {
    let mut f = File::open(path)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    deserialize_with_documents(&buf)
}

/// Build metadata kept beside the index rather than inside it, so the index
/// bytes depend only on its inputs.
#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub num_terms: usize,
    pub created_at: String,
    pub version: u32,
}

pub fn meta_path(index_path: &Path) -> PathBuf {
    let mut name = index_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".meta.json");
    index_path.with_file_name(name)
}

pub fn save_meta(path: &Path, meta: &MetaFile) -> Result<()> {
    let json = serde_json::to_string_pretty(meta).map_err(|e| Error::InvalidInput(e.to_string()))?;
    write_atomic(path, json.as_bytes())
}

pub fn load_meta(path: &Path) -> Result<MetaFile> {
    let mut f = File::open(path)?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    serde_json::from_str(&buf).map_err(|e| Error::corrupt(e.to_string()))
}
