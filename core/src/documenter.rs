//! Reading and writing Documenter-style `search_index.js` payloads.
//!
//! The payload is a JavaScript assignment around a JSON object:
//! `var documenterSearchIndex = {"docs": [{"location", "page", "title", "text", "category"}, ...]}`.
//! Bare JSON (the object, a record array or a single record) and JSON Lines
//! are accepted too.

use crate::error::{Error, Result};
use crate::store::{Category, DocumentStore, NewDocument};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const JS_PREFIX: &str = "var documenterSearchIndex = ";

/// A record as it appears in the payload. Every field is optional here so
/// that missing ones can be reported by name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceRecord {
    pub location: Option<String>,
    pub page: Option<String>,
    pub title: Option<String>,
    #[serde(alias = "body")]
    pub text: Option<String>,
    pub category: Option<String>,
}

impl SourceRecord {
    /// Validate required fields. `index` is used in the error message.
    pub fn into_document(self, index: usize) -> Result<NewDocument> {
        let missing = |field: &str| Error::InvalidInput(format!("record {index} is missing {field:?}"));
        let location = self.location.ok_or_else(|| missing("location"))?;
        let title = self.title.ok_or_else(|| missing("title"))?;
        let category = self.category.ok_or_else(|| missing("category"))?;
        Ok(NewDocument {
            location,
            page: self.page,
            title,
            body: self.text.unwrap_or_default(),
            category: Category::from(category),
        })
    }
}

/// Parse a `search_index.js` file or plain JSON into documents.
pub fn parse(payload: &str) -> Result<Vec<NewDocument>> {
    let trimmed = payload.trim_start_matches('\u{feff}').trim();
    let json = if trimmed.starts_with('{') || trimmed.starts_with('[') {
        trimmed
    } else {
        let (_, rhs) = trimmed
            .split_once('=')
            .ok_or_else(|| Error::InvalidInput("expected a JSON value or a `var x = {...}` assignment".into()))?;
        rhs.trim().trim_end_matches(';').trim_end()
    };
    let value: Value = serde_json::from_str(json).map_err(|e| Error::InvalidInput(format!("malformed search index: {e}")))?;
    let records = match value {
        Value::Object(mut obj) if obj.contains_key("docs") => match obj.remove("docs") {
            Some(Value::Array(arr)) => arr,
            _ => return Err(Error::InvalidInput("\"docs\" must be an array".into())),
        },
        Value::Array(arr) => arr,
        obj @ Value::Object(_) => vec![obj],
        _ => return Err(Error::InvalidInput("search index must be an object or an array".into())),
    };
    records.into_iter().enumerate().map(|(i, v)| record_from_value(i, v)).collect()
}

/// Parse one JSON record per non-blank line.
pub fn parse_jsonl(payload: &str) -> Result<Vec<NewDocument>> {
    payload
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            let v: Value = serde_json::from_str(line).map_err(|e| Error::InvalidInput(format!("record {i}: {e}")))?;
            record_from_value(i, v)
        })
        .collect()
}

fn record_from_value(index: usize, value: Value) -> Result<NewDocument> {
    let record: SourceRecord =
        serde_json::from_value(value).map_err(|e| Error::InvalidInput(format!("record {index}: {e}")))?;
    record.into_document(index)
}

/// Add `docs` to `store` in order, stopping at the first rejected record.
pub fn load_into(store: &mut DocumentStore, docs: Vec<NewDocument>) -> Result<usize> {
    let mut added = 0;
    for doc in docs {
        store.add_document(doc)?;
        added += 1;
    }
    Ok(added)
}

#[derive(Serialize)]
struct ExportRecord<'a> {
    location: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<&'a str>,
    title: &'a str,
    text: &'a str,
    category: &'a str,
}

#[derive(Serialize)]
struct ExportPayload<'a> {
    docs: Vec<ExportRecord<'a>>,
}

/// Render the store as a `search_index.js` payload.
pub fn export(store: &DocumentStore) -> Result<String> {
    let docs = store
        .all_documents()
        .map(|d| ExportRecord {
            location: &d.location,
            page: d.page.as_deref(),
            title: &d.title,
            text: &d.body,
            category: d.category.as_str(),
        })
        .collect();
    let json = serde_json::to_string(&ExportPayload { docs }).map_err(|e| Error::InvalidInput(e.to_string()))?;
    Ok(format!("{JS_PREFIX}{json}\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"var documenterSearchIndex = {"docs":
[{"location":"","page":"Home","title":"Home","text":"Documentation for MParT.","category":"page"},{"location":"#MParT","page":"Home","title":"MParT","text":"","category":"section"},{"location":"#MParT.MapOptions-Tuple{}","page":"Home","title":"MParT.MapOptions","text":"Takes the fields from MParT's MapOptions as keyword arguments","category":"method"}]
}
"##;

    #[test]
    fn parses_documenter_payload() {
        let docs = parse(SAMPLE).unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[1].location, "#MParT");
        assert_eq!(docs[1].category, Category::Section);
        assert_eq!(docs[2].page.as_deref(), Some("Home"));
        assert_eq!(docs[2].category, Category::Method);
    }

    #[test]
    fn parses_bare_array_and_body_alias() {
        let docs = parse(r##"[{"location":"#x","title":"X","body":"some text","category":"function"}]"##).unwrap();
        assert_eq!(docs[0].body, "some text");
        assert_eq!(docs[0].category, Category::Function);
    }

    #[test]
    fn missing_required_field_names_record() {
        let err = parse(r##"[{"location":"#a","title":"A","category":"page"},{"location":"#b","category":"page"}]"##).unwrap_err();
        match err {
            Error::InvalidInput(msg) => assert!(msg.contains("record 1") && msg.contains("title"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_text_is_empty_body() {
        let docs = parse(r##"{"location":"#a","title":"A","category":"page"}"##).unwrap();
        assert_eq!(docs[0].body, "");
    }

    #[test]
    fn rejects_non_json() {
        assert!(parse("hello world").is_err());
        assert!(parse("var x = 42;").is_err());
    }

    #[test]
    fn parses_jsonl() {
        let docs = parse_jsonl("{\"location\":\"#a\",\"title\":\"A\",\"category\":\"page\"}\n\n{\"location\":\"#b\",\"title\":\"B\",\"category\":\"type\"}\n").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].category, Category::Type);
    }

    #[test]
    fn export_parses_back() {
        let mut store = DocumentStore::new();
        load_into(&mut store, parse(SAMPLE).unwrap()).unwrap();
        let js = export(&store).unwrap();
        assert!(js.starts_with("var documenterSearchIndex = {\"docs\":["));
        let again = parse(&js).unwrap();
        assert_eq!(again, parse(SAMPLE).unwrap());
    }

    #[test]
    fn duplicate_locations_follow_store_policy() {
        let payload = r##"[{"location":"","title":"Home","text":"one","category":"page"},{"location":"","title":"Home","text":"two","category":"page"}]"##;
        let mut strict = DocumentStore::new();
        assert!(matches!(load_into(&mut strict, parse(payload).unwrap()), Err(Error::DuplicateLocation { .. })));
        let mut lenient = DocumentStore::with_policy(crate::store::DuplicatePolicy::Replace);
        assert_eq!(load_into(&mut lenient, parse(payload).unwrap()).unwrap(), 2);
        assert_eq!(lenient.len(), 1);
        assert_eq!(lenient.get_by_location("").unwrap().body, "two");
    }

    #[test]
    fn suffix_policy_keeps_repeated_page_records() {
        use crate::{BuildConfig, InvertedIndex, SearchOptions, Snapshot, Tokenizer};

        let payload = r##"[{"location":"","page":"Home","title":"Home","text":"Documentation for MParT.","category":"page"},{"location":"","page":"Home","title":"Home","text":"Modules = [MParT]","category":"page"},{"location":"#MParT","page":"Home","title":"MParT","text":"","category":"section"}]"##;
        let mut store = DocumentStore::with_policy(crate::store::DuplicatePolicy::Suffix);
        assert_eq!(load_into(&mut store, parse(payload).unwrap()).unwrap(), 3);
        let locations: Vec<&str> = store.all_documents().map(|d| d.location.as_str()).collect();
        assert_eq!(locations, vec!["", "#1", "#MParT"]);

        let index = InvertedIndex::build_from_store(&store, &Tokenizer::default(), &BuildConfig::default()).unwrap();
        let snapshot = Snapshot::new(index, store);
        let hits = snapshot.search("Documentation", &SearchOptions::default()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, 0);
    }
}
