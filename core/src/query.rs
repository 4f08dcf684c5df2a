use crate::error::{Error, Result};
use crate::index::{InvertedIndex, Posting};
use crate::store::{Category, DocId, DocumentStore};
use crate::tokenizer::Tokenizer;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant};

/// Ranking knobs applied at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringConfig {
    /// idf = ln(idf_smoothing + N / df)
    pub idf_smoothing: f32,
    /// Each extra distinct query term a document matches adds this fraction
    /// of its base score.
    pub coverage_boost: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self { idf_smoothing: 1.0, coverage_boost: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub top_k: usize,
    /// Stop scanning further postings lists once this much time has passed.
    pub timeout: Option<Duration>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { top_k: 10, timeout: None }
    }
}

impl SearchOptions {
    pub fn top_k(top_k: usize) -> Self {
        Self { top_k, ..Self::default() }
    }
}

/// A normalized query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub raw_text: String,
    pub terms: Vec<String>,
    /// Word offset of each term within the query text, parallel to `terms`.
    pub offsets: Vec<usize>,
    pub is_phrase: bool,
}

impl Query {
    /// Normalize `raw` with `tokenizer`. Input wrapped in double quotes is a
    /// phrase query.
    pub fn parse(raw: &str, tokenizer: &Tokenizer) -> Result<Self> {
        let trimmed = raw.trim();
        let (text, is_phrase) = match trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
            Some(inner) => (inner, true),
            None => (trimmed, false),
        };
        let tokens = tokenizer.analyze(text)?;
        if tokens.is_empty() {
            return Err(Error::EmptyQuery);
        }
        let (terms, offsets) = tokens.into_iter().map(|t| (t.term, t.position)).unzip();
        Ok(Self { raw_text: raw.to_string(), terms, offsets, is_phrase })
    }

    /// Terms in first-seen order, without repeats.
    pub fn distinct_terms(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.terms.iter().map(String::as_str).filter(|t| seen.insert(*t)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub doc_id: DocId,
    pub score: f32,
    pub matched_terms: BTreeSet<String>,
}

/// One hit of the public query interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub document_id: DocId,
    pub location: String,
    pub title: String,
    pub category: Category,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
    pub total_hits: usize,
    pub took_ms: f64,
}

/// Every matching document, best first.
pub(crate) struct Ranking {
    pub results: Vec<SearchResult>,
    pub timed_out: bool,
}

/// Search with the tokenizer configuration recorded in the index.
pub fn search(query: &str, index: &InvertedIndex, store: &DocumentStore, top_k: usize) -> Result<Vec<SearchResult>> {
    let tokenizer = Tokenizer::new(index.tokenizer_config().clone());
    search_with_tokenizer(query, &tokenizer, index, store, &SearchOptions::top_k(top_k), &ScoringConfig::default())
}

/// Search with a caller-provided tokenizer, which must be configured exactly
/// like the one that built the index.
pub fn search_with_tokenizer(
    query: &str,
    tokenizer: &Tokenizer,
    index: &InvertedIndex,
    store: &DocumentStore,
    options: &SearchOptions,
    scoring: &ScoringConfig,
) -> Result<Vec<SearchResult>> {
    if tokenizer.config() != index.tokenizer_config() {
        return Err(Error::TokenizerMismatch);
    }
    let query = Query::parse(query, tokenizer)?;
    let mut ranking = rank(&query, index, store, options, scoring);
    ranking.results.truncate(options.top_k);
    Ok(ranking.results)
}

/// Run `query` and build the response payload with document metadata.
pub fn respond(
    query: &str,
    tokenizer: &Tokenizer,
    index: &InvertedIndex,
    store: &DocumentStore,
    options: &SearchOptions,
    scoring: &ScoringConfig,
) -> Result<SearchResponse> {
    let start = Instant::now();
    if tokenizer.config() != index.tokenizer_config() {
        return Err(Error::TokenizerMismatch);
    }
    let parsed = Query::parse(query, tokenizer)?;
    let ranking = rank(&parsed, index, store, options, scoring);
    if ranking.timed_out {
        tracing::warn!(query, "search timed out; results are partial");
    }
    let total_hits = ranking.results.len();
    let mut results = Vec::with_capacity(options.top_k.min(total_hits));
    for r in ranking.results.into_iter().take(options.top_k) {
        let doc = store.get_document(r.doc_id)?;
        results.push(SearchHit {
            document_id: doc.id,
            location: doc.location.clone(),
            title: doc.title.clone(),
            category: doc.category.clone(),
            score: r.score,
        });
    }
    let took_ms = start.elapsed().as_secs_f64() * 1000.0;
    Ok(SearchResponse { query: query.to_string(), results, total_hits, took_ms })
}

pub(crate) fn rank(
    query: &Query,
    index: &InvertedIndex,
    store: &DocumentStore,
    options: &SearchOptions,
    scoring: &ScoringConfig,
) -> Ranking {
    let start = Instant::now();
    let n = index.num_docs().max(1) as f32;
    let terms = query.distinct_terms();

    let mut scores: HashMap<DocId, (f32, BTreeSet<String>)> = HashMap::new();
    let mut timed_out = false;
    for term in &terms {
        if options.timeout.is_some_and(|t| start.elapsed() >= t) {
            tracing::debug!(query = %query.raw_text, "query timed out, ranking partial matches");
            timed_out = true;
            break;
        }
        let Some(postings) = index.postings(term) else { continue };
        let df = postings.len().max(1) as f32;
        let idf = (scoring.idf_smoothing + n / df).ln();
        for p in postings {
            let entry = scores.entry(p.doc_id).or_default();
            entry.0 += p.term_frequency as f32 * idf;
            entry.1.insert(term.to_string());
        }
    }

    if query.is_phrase {
        scores.retain(|doc_id, (_, matched)| matched.len() == terms.len() && phrase_matches(query, index, *doc_id));
    }

    let mut results: Vec<SearchResult> = scores
        .into_iter()
        .filter(|(doc_id, _)| store.contains(*doc_id))
        .map(|(doc_id, (base, matched_terms))| {
            let extra = matched_terms.len().saturating_sub(1) as f32;
            let score = base * (1.0 + scoring.coverage_boost * extra);
            SearchResult { doc_id, score, matched_terms }
        })
        .collect();
    results.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.doc_id.cmp(&b.doc_id)));
    Ranking { results, timed_out }
}

/// True when the query terms occur in `doc_id` at the same relative offsets
/// they have in the query.
fn phrase_matches(query: &Query, index: &InvertedIndex, doc_id: DocId) -> bool {
    let mut lists: Vec<&[u32]> = Vec::with_capacity(query.terms.len());
    for term in &query.terms {
        match index.postings(term).and_then(|p| posting_for(p, doc_id)) {
            Some(posting) => lists.push(&posting.positions),
            None => return false,
        }
    }
    let base = query.offsets[0];
    lists[0].iter().any(|&start| {
        query.offsets.iter().zip(&lists).skip(1).all(|(&offset, positions)| {
            let want = start as usize + (offset - base);
            u32::try_from(want).is_ok_and(|w| positions.binary_search(&w).is_ok())
        })
    })
}

fn posting_for(postings: &[Posting], doc_id: DocId) -> Option<&Posting> {
    postings.binary_search_by_key(&doc_id, |p| p.doc_id).ok().map(|i| &postings[i])
}
