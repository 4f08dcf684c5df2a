use anyhow::{Context, Result};
use axum::{extract::{Path, Query, State}, http::{HeaderMap, StatusCode}, response::{IntoResponse, Response}, routing::{get, post}, Json, Router};
use docsearch_core::{Category, DocId, Error, ErrorKind, IndexHandle, SearchHit, SearchOptions, Snapshot};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub query: String,
    pub took_ms: f64,
    pub total_hits: usize,
    pub results: Vec<HitWithSnippet>,
}

#[derive(Serialize)]
pub struct HitWithSnippet {
    #[serde(flatten)]
    pub hit: SearchHit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocResponse {
    pub document_id: DocId,
    pub location: String,
    pub page: Option<String>,
    pub title: String,
    pub category: Category,
    pub text: String,
}

#[derive(Clone, Debug)]
pub struct AppState {
    pub index_path: PathBuf,
    pub handle: Arc<IndexHandle>,
    pub admin_token: Option<String>,
}

/// Error body returned for every failed request.
pub struct ApiError {
    status: StatusCode,
    kind: Option<ErrorKind>,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, kind: None, message: message.into() }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let status = match e.kind() {
            ErrorKind::EmptyQuery | ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::VersionMismatch | ErrorKind::CorruptIndex => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, kind: Some(e.kind()), message: e.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message, "kind": self.kind });
        (self.status, Json(body)).into_response()
    }
}

impl AppState {
    /// Load the initial snapshot from `index_path`; later reloads swap it out.
    /// The admin token comes from `ADMIN_TOKEN`.
    pub fn load(index_path: impl Into<PathBuf>) -> Result<Self> {
        let index_path = index_path.into();
        let snapshot = Snapshot::load(&index_path).with_context(|| format!("loading index {}", index_path.display()))?;
        tracing::info!(
            path = %index_path.display(),
            num_docs = snapshot.store().len(),
            num_terms = snapshot.index().num_terms(),
            "index loaded"
        );
        let admin_token = std::env::var("ADMIN_TOKEN").ok();
        Ok(Self { index_path, handle: Arc::new(IndexHandle::new(snapshot)), admin_token })
    }

    pub fn num_docs(&self) -> usize {
        self.handle.current().store().len()
    }
}

pub fn build_app(index_path: impl Into<PathBuf>) -> Result<Router> {
    Ok(router(AppState::load(index_path)?))
}

pub fn router(app_state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/index/reload", post(reload_handler))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    // Pin the snapshot for the whole request; a concurrent reload does not affect it
    let snapshot = state.handle.current();
    let k = params.k.clamp(1, 100);
    let resp = snapshot.respond(&params.q, &SearchOptions::top_k(k))?;

    let raw_terms: Vec<String> = params
        .q
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();
    let results = resp
        .results
        .into_iter()
        .map(|hit| {
            let snippet = snapshot
                .document(hit.document_id)
                .ok()
                .and_then(|doc| snippet_from_text(&doc.body, &raw_terms));
            HitWithSnippet { hit, snippet }
        })
        .collect();

    Ok(Json(SearchResponse { query: resp.query, took_ms: resp.took_ms, total_hits: resp.total_hits, results }))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<DocId>) -> Result<Json<DocResponse>, ApiError> {
    let snapshot = state.handle.current();
    let doc = snapshot.document(doc_id)?;
    Ok(Json(DocResponse {
        document_id: doc.id,
        location: doc.location.clone(),
        page: doc.page.clone(),
        title: doc.title.clone(),
        category: doc.category.clone(),
        text: doc.body.clone(),
    }))
}

async fn reload_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let path = state.index_path.clone();
    let handle = Arc::clone(&state.handle);
    let snapshot = tokio::task::spawn_blocking(move || handle.reload_from_path(&path))
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))??;
    Ok(Json(serde_json::json!({
        "numDocs": snapshot.index().num_docs(),
        "numTerms": snapshot.index().num_terms(),
    })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err(ApiError::new(StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set")),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(ApiError::new(StatusCode::UNAUTHORIZED, "invalid admin token"))
    }
}

fn snippet_from_text(text: &str, raw_terms: &[String]) -> Option<String> {
    if text.is_empty() { return None; }
    let pattern = terms_pattern(raw_terms);
    // window around the first match (case-insensitive) of any raw term
    let first_idx = pattern.as_ref().and_then(|p| p.find(text)).map(|m| m.start());
    let snippet: &str = match first_idx {
        Some(idx) => {
            let start = floor_char_boundary(text, idx.saturating_sub(100));
            let end = floor_char_boundary(text, (idx + 200).min(text.len()));
            &text[start..end]
        }
        None => {
            let end = text.char_indices().nth(200).map_or(text.len(), |(i, _)| i);
            &text[..end]
        }
    };
    Some(highlight_terms(snippet, pattern.as_ref()))
}

/// One case-insensitive alternation over every term, longest first so that a
/// term never loses to one of its own prefixes.
fn terms_pattern(terms: &[String]) -> Option<regex::Regex> {
    let mut terms: Vec<&str> = terms.iter().map(String::as_str).filter(|t| !t.is_empty()).collect();
    if terms.is_empty() { return None; }
    terms.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    terms.dedup();
    let alternation = terms.iter().map(|t| regex::escape(t)).collect::<Vec<_>>().join("|");
    regex::RegexBuilder::new(&alternation).case_insensitive(true).build().ok()
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Wrap matches in `<em>`; everything taken from the document is HTML-escaped.
fn highlight_terms(snippet: &str, pattern: Option<&regex::Regex>) -> String {
    let Some(pattern) = pattern else { return escape_html(snippet) };
    let mut out = String::with_capacity(snippet.len() + 16);
    let mut last = 0;
    for m in pattern.find_iter(snippet) {
        out.push_str(&escape_html(&snippet[last..m.start()]));
        out.push_str("<em>");
        out.push_str(&escape_html(m.as_str()));
        out.push_str("</em>");
        last = m.end();
    }
    out.push_str(&escape_html(&snippet[last..]));
    out
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_highlights_terms() {
        let terms = vec!["mapoptions".to_string()];
        let s = snippet_from_text("Takes the fields from MParT's MapOptions as keyword arguments", &terms).unwrap();
        assert!(s.contains("<em>MapOptions</em>"));
    }

    #[test]
    fn snippet_respects_char_boundaries() {
        let text = format!("{}needle", "é".repeat(120));
        let s = snippet_from_text(&text, &["needle".to_string()]).unwrap();
        assert!(s.ends_with("<em>needle</em>"));
    }

    #[test]
    fn snippet_escapes_document_markup() {
        let text = "ComposedMap(maps::Vector{<:SharedPtr{<:ConditionalMapBase}}) <script>x</script> & 'more'";
        let s = snippet_from_text(text, &["composedmap".to_string()]).unwrap();
        assert_eq!(
            s,
            "<em>ComposedMap</em>(maps::Vector{&lt;:SharedPtr{&lt;:ConditionalMapBase}}) &lt;script&gt;x&lt;/script&gt; &amp; &#39;more&#39;"
        );
    }

    #[test]
    fn highlighting_never_matches_inside_inserted_tags() {
        let terms = vec!["map".to_string(), "em".to_string()];
        let s = snippet_from_text("<em>map</em> the em value", &terms).unwrap();
        assert_eq!(s, "&lt;<em>em</em>&gt;<em>map</em>&lt;/<em>em</em>&gt; the <em>em</em> value");
    }

    #[test]
    fn longer_term_wins_over_its_prefix() {
        let terms = vec!["map".to_string(), "mapoptions".to_string()];
        let s = snippet_from_text("see MapOptions", &terms).unwrap();
        assert_eq!(s, "see <em>MapOptions</em>");
    }

    #[test]
    fn empty_text_has_no_snippet() {
        assert!(snippet_from_text("", &["x".to_string()]).is_none());
    }
}
