use crate::error::{Error, Result};
use crate::store::{DocId, Document, DocumentStore, DuplicatePolicy};
use crate::tokenizer::{Tokenizer, TokenizerConfig};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One (term, document) occurrence record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    /// Weighted occurrence count; title hits count `title_weight` times.
    pub term_frequency: u32,
    /// Word offsets, strictly ascending. Body offsets follow the title's
    /// with a one-word gap so phrases never span the two fields.
    pub positions: Vec<u32>,
}

/// Settings that shape the index contents and travel with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    /// Multiplier applied to the term frequency of title occurrences.
    pub title_weight: u32,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self { title_weight: 3, duplicate_policy: DuplicatePolicy::Reject }
    }
}

/// Term to postings mapping, plus the analysis settings it was built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvertedIndex {
    terms: BTreeMap<String, Vec<Posting>>, // postings sorted by doc_id
    tokenizer_config: TokenizerConfig,
    build_config: BuildConfig,
    num_docs: u32,
}

#[derive(Debug, Default)]
struct TermStats {
    tf: u32,
    positions: Vec<u32>,
}

impl InvertedIndex {
    /// Index `documents` with `tokenizer`. Per-document analysis runs on the
    /// rayon pool; merging into postings lists happens on the calling thread.
    pub fn build<'a, I>(documents: I, tokenizer: &Tokenizer, config: &BuildConfig) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        if config.title_weight == 0 {
            return Err(Error::InvalidInput("title weight must be at least 1".into()));
        }
        let docs: Vec<&Document> = documents.into_iter().collect();
        let num_docs = u32::try_from(docs.len())
            .map_err(|_| Error::InvalidInput("too many documents".into()))?;
        let mut seen = vec![false; docs.len()];
        for doc in &docs {
            match seen.get_mut(doc.id as usize) {
                Some(slot) if !*slot => *slot = true,
                _ => return Err(Error::InvalidInput(format!("document ids must be unique and below {num_docs}, got {}", doc.id))),
            }
        }

        let analyzed: Vec<(DocId, BTreeMap<String, TermStats>)> = docs
            .par_iter()
            .map(|doc| analyze_document(doc, tokenizer, config.title_weight).map(|stats| (doc.id, stats)))
            .collect::<Result<_>>()?;

        let mut terms: BTreeMap<String, Vec<Posting>> = BTreeMap::new();
        for (doc_id, stats) in analyzed {
            tracing::debug!(doc_id, num_terms = stats.len(), "merging document");
            for (term, s) in stats {
                terms.entry(term).or_default().push(Posting { doc_id, term_frequency: s.tf, positions: s.positions });
            }
        }
        for postings in terms.values_mut() {
            postings.sort_by_key(|p| p.doc_id);
        }

        tracing::info!(num_docs, num_terms = terms.len(), "index build complete");
        Ok(Self { terms, tokenizer_config: tokenizer.config().clone(), build_config: config.clone(), num_docs })
    }

    pub fn build_from_store(store: &DocumentStore, tokenizer: &Tokenizer, config: &BuildConfig) -> Result<Self> {
        Self::build(store.all_documents(), tokenizer, config)
    }

    pub(crate) fn from_parts(
        terms: BTreeMap<String, Vec<Posting>>,
        tokenizer_config: TokenizerConfig,
        build_config: BuildConfig,
        num_docs: u32,
    ) -> Self {
        Self { terms, tokenizer_config, build_config, num_docs }
    }

    pub fn postings(&self, term: &str) -> Option<&[Posting]> {
        self.terms.get(term).map(Vec::as_slice)
    }

    /// Number of documents containing `term`.
    pub fn document_frequency(&self, term: &str) -> u32 {
        self.terms.get(term).map(|p| p.len() as u32).unwrap_or(0)
    }

    /// Terms in lexicographic order with their postings.
    pub fn terms(&self) -> impl Iterator<Item = (&str, &[Posting])> + '_ {
        self.terms.iter().map(|(t, p)| (t.as_str(), p.as_slice()))
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    pub fn tokenizer_config(&self) -> &TokenizerConfig {
        &self.tokenizer_config
    }

    pub fn build_config(&self) -> &BuildConfig {
        &self.build_config
    }
}

fn analyze_document(doc: &Document, tokenizer: &Tokenizer, title_weight: u32) -> Result<BTreeMap<String, TermStats>> {
    let failure = |reason: String| Error::TokenizationFailure { location: doc.location.clone(), reason };
    let title = tokenizer.analyze(&doc.title).map_err(|e| failure(e.to_string()))?;
    let body = tokenizer.analyze(&doc.body).map_err(|e| failure(e.to_string()))?;
    let body_offset = tokenizer.word_count(&doc.title) + 1;

    let mut stats: BTreeMap<String, TermStats> = BTreeMap::new();
    let fields = title.into_iter().map(|t| (t, 0, title_weight)).chain(body.into_iter().map(|t| (t, body_offset, 1)));
    for (token, offset, weight) in fields {
        let position = token
            .position
            .checked_add(offset)
            .and_then(|p| u32::try_from(p).ok())
            .ok_or_else(|| failure("word position overflows u32".into()))?;
        let entry = stats.entry(token.term).or_default();
        entry.tf = entry.tf.saturating_add(weight);
        entry.positions.push(position);
    }
    Ok(stats)
}
