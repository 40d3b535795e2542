//! Schema-agnostic document storage.
//!
//! Every collection holds [`Document`]s: a store-owned identifier and
//! timestamp pair plus an open map of caller fields. Backends implement
//! [`DocumentStore`]; the rest of the crate only ever sees the trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

/// Keys owned by the store. Never accepted from callers.
pub const RESERVED_KEYS: [&str; 4] = ["id", "_id", "created_at", "updated_at"];

/// Logical entity → collection name, declared once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Messages,
}

impl Collection {
    pub const fn name(self) -> &'static str {
        match self {
            Collection::Users => "user",
            Collection::Messages => "message",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Exact-match filter: field name → expected value. Empty matches everything.
///
/// `id`, `created_at` and `updated_at` address the store-owned fields
/// (timestamps compared in RFC 3339 form); other keys compare the extension
/// field by full JSON equality, with numbers compared by value (`1 == 1.0`)
/// the way `jsonb` equality does.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(Map<String, Value>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self::new().eq("id", id.into())
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.0.iter().all(|(key, expected)| match key.as_str() {
            "id" => expected.as_str() == Some(doc.id.as_str()),
            "created_at" => timestamp_eq(doc.created_at, expected),
            "updated_at" => timestamp_eq(doc.updated_at, expected),
            _ => doc.fields.get(key).is_some_and(|have| json_eq(have, expected)),
        })
    }
}

fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| json_eq(x, y)))
        }
        _ => a == b,
    }
}

impl From<Map<String, Value>> for Filter {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn timestamp_eq(ts: OffsetDateTime, expected: &Value) -> bool {
    match (expected.as_str(), ts.format(&Rfc3339)) {
        (Some(want), Ok(have)) => want == have,
        _ => false,
    }
}

/// Drop store-owned keys from a caller-supplied field map.
pub fn strip_reserved(mut fields: Map<String, Value>) -> Map<String, Value> {
    for key in RESERVED_KEYS {
        fields.remove(key);
    }
    fields
}

/// `Some(0)` means no cap.
pub fn effective_limit(limit: Option<usize>) -> Option<usize> {
    limit.filter(|n| *n > 0)
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    #[error("document store error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert `fields` with a fresh id and `created_at == updated_at == now`.
    async fn create(
        &self,
        collection: &str,
        fields: Map<String, Value>,
    ) -> Result<Document, StoreError>;

    /// Matching documents in insertion order, at most `limit` of them.
    async fn list(
        &self,
        collection: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError>;

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self.list(collection, filter, Some(1)).await?.into_iter().next())
    }

    /// Shallow-merge `fields` into the first match and bump `updated_at`.
    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        fields: Map<String, Value>,
    ) -> Result<Option<Document>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(fields: Value) -> Document {
        let now = OffsetDateTime::UNIX_EPOCH;
        Document {
            id: "abc".into(),
            created_at: now,
            updated_at: now,
            fields: fields.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::new().matches(&doc(json!({"a": 1}))));
    }

    #[test]
    fn filter_compares_fields_exactly() {
        let d = doc(json!({"role": "admin", "n": 1, "tags": ["x", "y"]}));
        assert!(Filter::new().eq("role", "admin").matches(&d));
        assert!(!Filter::new().eq("role", "user").matches(&d));
        assert!(!Filter::new().eq("n", 1.5).matches(&d));
        assert!(!Filter::new().eq("tags", json!(["x"])).matches(&d));
        assert!(!Filter::new().eq("missing", Value::Null).matches(&d));
    }

    #[test]
    fn filter_compares_numbers_by_value() {
        let d = doc(json!({"n": 1, "nested": {"xs": [2.0, 3]}}));
        assert!(Filter::new().eq("n", 1.0).matches(&d));
        assert!(Filter::new().eq("nested", json!({"xs": [2, 3.0]})).matches(&d));
        assert!(!Filter::new().eq("n", "1").matches(&d));
    }

    #[test]
    fn filter_addresses_id_and_timestamps() {
        let d = doc(json!({}));
        assert!(Filter::by_id("abc").matches(&d));
        assert!(!Filter::by_id("abd").matches(&d));
        assert!(Filter::new()
            .eq("created_at", "1970-01-01T00:00:00Z")
            .matches(&d));
    }

    #[test]
    fn document_serializes_flat() {
        let d = doc(json!({"email": "a@b.co"}));
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["id"], "abc");
        assert_eq!(v["email"], "a@b.co");
        assert_eq!(v["created_at"], "1970-01-01T00:00:00Z");
    }

    #[test]
    fn reserved_keys_are_stripped() {
        let fields = json!({"id": "x", "_id": 1, "created_at": "t", "updated_at": "t", "a": 1});
        let clean = strip_reserved(fields.as_object().cloned().unwrap());
        assert_eq!(clean.len(), 1);
        assert_eq!(clean["a"], 1);
    }

    #[test]
    fn zero_limit_is_uncapped() {
        assert_eq!(effective_limit(Some(0)), None);
        assert_eq!(effective_limit(Some(3)), Some(3));
        assert_eq!(effective_limit(None), None);
    }
}
