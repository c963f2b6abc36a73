//!
//! Storage interfaces for named queries.
//!
//! Defines:
//! - the record a panel keeps per editable query (`QueryRecord`),
//! - the read-only seam the interpolator consumes (`QuerySource`),
//! - an in-memory, insertion-ordered registry (`QueryRegistry`).
//!
//! Dashboard/panel persistence lives outside this crate; a caller with its own
//! store only needs to implement `QuerySource`.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// One editable query.
///
/// `expr` may contain reference tokens (`@A`) naming other queries by `ref_id`.
pub struct QueryRecord {
    pub ref_id: String,
    pub expr: String,
}

impl QueryRecord {
    pub fn new(ref_id: impl Into<String>, expr: impl Into<String>) -> Self {
        Self { ref_id: ref_id.into(), expr: expr.into() }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("query not found: {0}")]
    NotFound(String),
}

/// Read access to a snapshot of named queries.
pub trait QuerySource {
    fn get_query(&self, ref_id: &str) -> Option<&QueryRecord>;
    fn list_queries(&self) -> Vec<&QueryRecord>;

    /// Like `get_query`, but absence is an error.
    fn require_query(&self, ref_id: &str) -> Result<&QueryRecord, RegistryError> {
        self.get_query(ref_id).ok_or_else(|| RegistryError::NotFound(ref_id.to_string()))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
/// In-memory registry keyed by `ref_id`, listing queries in insertion order.
///
/// Overwriting an id keeps the position it was first inserted at.
pub struct QueryRegistry {
    queries: IndexMap<String, QueryRecord>,
}

impl QueryRegistry {
    pub fn new() -> Self { Self { queries: IndexMap::new() } }

    /// Inserts or overwrites by `ref_id`, returning the replaced record.
    pub fn set_query(&mut self, record: QueryRecord) -> Option<QueryRecord> {
        trace!(ref_id = %record.ref_id, "set query");
        self.queries.insert(record.ref_id.clone(), record)
    }

    /// Removes a query, keeping the order of the remaining ones.
    pub fn remove_query(&mut self, ref_id: &str) -> Option<QueryRecord> {
        trace!(ref_id, "remove query");
        self.queries.shift_remove(ref_id)
    }

    pub fn contains(&self, ref_id: &str) -> bool { self.queries.contains_key(ref_id) }
    pub fn len(&self) -> usize { self.queries.len() }
    pub fn is_empty(&self) -> bool { self.queries.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = &QueryRecord> { self.queries.values() }
}

impl QuerySource for QueryRegistry {
    fn get_query(&self, ref_id: &str) -> Option<&QueryRecord> { self.queries.get(ref_id) }
    fn list_queries(&self) -> Vec<&QueryRecord> { self.queries.values().collect() }
}

impl FromIterator<QueryRecord> for QueryRegistry {
    fn from_iter<I: IntoIterator<Item = QueryRecord>>(iter: I) -> Self {
        let mut r = Self::new();
        r.extend(iter);
        r
    }
}

impl Extend<QueryRecord> for QueryRegistry {
    fn extend<I: IntoIterator<Item = QueryRecord>>(&mut self, iter: I) {
        for q in iter {
            self.set_query(q);
        }
    }
}

// The panel model stores its queries as a JSON array, so the registry does too.
impl Serialize for QueryRegistry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.queries.values())
    }
}

impl<'de> Deserialize<'de> for QueryRegistry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Vec::<QueryRecord>::deserialize(deserializer)?.into_iter().collect())
    }
}
