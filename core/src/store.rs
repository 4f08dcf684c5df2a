use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub type DocId = u32;

/// Kind of documentation unit a record describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Page,
    Section,
    Method,
    Function,
    Type,
    Module,
    Macro,
    Constant,
    Other(String),
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Category::Page => "page",
            Category::Section => "section",
            Category::Method => "method",
            Category::Function => "function",
            Category::Type => "type",
            Category::Module => "module",
            Category::Macro => "macro",
            Category::Constant => "constant",
            Category::Other(tag) => tag,
        }
    }
}

impl From<String> for Category {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "page" => Category::Page,
            "section" => Category::Section,
            "method" => Category::Method,
            "function" => Category::Function,
            "type" => Category::Type,
            "module" => Category::Module,
            "macro" => Category::Macro,
            "constant" => Category::Constant,
            _ => Category::Other(tag),
        }
    }
}

impl From<&str> for Category {
    fn from(tag: &str) -> Self {
        Category::from(tag.to_string())
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record as handed over by the documentation generator, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    pub title: String,
    pub body: String,
    pub category: Category,
}

impl NewDocument {
    pub fn new(location: impl Into<String>, title: impl Into<String>, body: impl Into<String>, category: Category) -> Self {
        Self { location: location.into(), page: None, title: title.into(), body: body.into(), category }
    }

    pub fn with_page(mut self, page: impl Into<String>) -> Self {
        self.page = Some(page.into());
        self
    }
}

/// An indexed unit of documentation. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    /// Page path plus optional in-page anchor, unique within a store.
    pub location: String,
    pub page: Option<String>,
    pub title: String,
    pub body: String,
    pub category: Category,
}

/// What to do when a document arrives with a location already in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Fail with `DuplicateLocation`.
    #[default]
    Reject,
    /// Overwrite the earlier record, keeping its id.
    Replace,
    /// Keep every record; repeats get the first free `#1`, `#2`, ... suffix.
    Suffix,
}

/// Owns every document of one build. Ids are dense and assigned in insertion
/// order; a rebuild starts from a fresh store.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    docs: Vec<Document>,
    by_location: HashMap<String, DocId>,
    policy: DuplicatePolicy,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: DuplicatePolicy) -> Self {
        Self { policy, ..Self::default() }
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    pub(crate) fn set_policy(&mut self, policy: DuplicatePolicy) {
        self.policy = policy;
    }

    pub fn add_document(&mut self, mut doc: NewDocument) -> Result<DocId> {
        if let Some(&existing) = self.by_location.get(&doc.location) {
            match self.policy {
                DuplicatePolicy::Reject => return Err(Error::DuplicateLocation { location: doc.location }),
                DuplicatePolicy::Replace => {
                    tracing::debug!(location = %doc.location, doc_id = existing, "replacing document");
                    self.docs[existing as usize] = into_document(existing, doc);
                    return Ok(existing);
                }
                DuplicatePolicy::Suffix => {
                    let location = self.free_suffix(&doc.location);
                    tracing::debug!(from = %doc.location, to = %location, "renaming repeated location");
                    doc.location = location;
                }
            }
        }
        let id = DocId::try_from(self.docs.len())
            .map_err(|_| Error::InvalidInput("document store is full".into()))?;
        self.by_location.insert(doc.location.clone(), id);
        self.docs.push(into_document(id, doc));
        Ok(id)
    }

    fn free_suffix(&self, location: &str) -> String {
        (1u32..)
            .map(|n| format!("{location}#{n}"))
            .find(|candidate| !self.by_location.contains_key(candidate))
            .unwrap_or_else(|| location.to_string())
    }

    pub fn get_document(&self, id: DocId) -> Result<&Document> {
        self.docs.get(id as usize).ok_or(Error::NotFound(id))
    }

    pub fn get_by_location(&self, location: &str) -> Option<&Document> {
        self.by_location.get(location).and_then(|&id| self.docs.get(id as usize))
    }

    pub fn contains(&self, id: DocId) -> bool {
        (id as usize) < self.docs.len()
    }

    /// Documents in id order.
    pub fn all_documents(&self) -> impl Iterator<Item = &Document> + '_ {
        self.docs.iter()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Rebuild a store from records whose ids were assigned elsewhere. Ids
    /// must be dense and start at zero.
    pub(crate) fn from_documents(docs: Vec<Document>) -> Result<Self> {
        let mut store = DocumentStore::new();
        for (expected, doc) in docs.into_iter().enumerate() {
            if doc.id as usize != expected {
                return Err(Error::corrupt(format!("document table has a gap before id {}", doc.id)));
            }
            if store.by_location.insert(doc.location.clone(), doc.id).is_some() {
                return Err(Error::corrupt(format!("document table repeats location {:?}", doc.location)));
            }
            store.docs.push(doc);
        }
        Ok(store)
    }
}

fn into_document(id: DocId, doc: NewDocument) -> Document {
    Document { id, location: doc.location, page: doc.page, title: doc.title, body: doc.body, category: doc.category }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(location: &str, title: &str) -> NewDocument {
        NewDocument::new(location, title, "", Category::Method)
    }

    #[test]
    fn add_then_get_returns_same_location() {
        let mut store = DocumentStore::new();
        let a = store.add_document(doc("#MParT.MapOptions", "MapOptions")).unwrap();
        let b = store.add_document(doc("#MParT.TrainOptions", "TrainOptions")).unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(store.get_document(a).unwrap().location, "#MParT.MapOptions");
        assert_eq!(store.get_document(b).unwrap().location, "#MParT.TrainOptions");
    }

    #[test]
    fn missing_id_is_not_found() {
        let store = DocumentStore::new();
        assert_eq!(store.get_document(7).unwrap_err().kind(), crate::ErrorKind::NotFound);
    }

    #[test]
    fn duplicate_location_rejected_by_default() {
        let mut store = DocumentStore::new();
        store.add_document(doc("#a", "first")).unwrap();
        let err = store.add_document(doc("#a", "second")).unwrap_err();
        assert!(matches!(err, Error::DuplicateLocation { ref location } if location == "#a"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn duplicate_location_replaced_in_place() {
        let mut store = DocumentStore::with_policy(DuplicatePolicy::Replace);
        store.add_document(doc("#a", "first")).unwrap();
        store.add_document(doc("#b", "other")).unwrap();
        let id = store.add_document(doc("#a", "second")).unwrap();
        assert_eq!(id, 0);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get_by_location("#a").unwrap().title, "second");
    }

    #[test]
    fn duplicate_location_gets_ordinal_suffix() {
        let mut store = DocumentStore::with_policy(DuplicatePolicy::Suffix);
        store.add_document(doc("", "Home")).unwrap();
        store.add_document(doc("#1", "anchor")).unwrap();
        let second = store.add_document(doc("", "Home")).unwrap();
        let third = store.add_document(doc("", "Home")).unwrap();
        assert_eq!(store.len(), 4);
        assert_eq!(store.get_document(second).unwrap().location, "#2");
        assert_eq!(store.get_document(third).unwrap().location, "#3");
        assert_eq!(store.get_by_location("#1").unwrap().title, "anchor");
    }

    #[test]
    fn all_documents_in_id_order() {
        let mut store = DocumentStore::new();
        for loc in ["#c", "#a", "#b"] {
            store.add_document(doc(loc, loc)).unwrap();
        }
        let ids: Vec<DocId> = store.all_documents().map(|d| d.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn category_round_trips_through_strings() {
        assert_eq!(Category::from("method"), Category::Method);
        assert_eq!(Category::from("keyword"), Category::Other("keyword".into()));
        assert_eq!(String::from(Category::Section), "section");
        let json = serde_json::to_string(&Category::Other("keyword".into())).unwrap();
        assert_eq!(json, "\"keyword\"");
    }
}
