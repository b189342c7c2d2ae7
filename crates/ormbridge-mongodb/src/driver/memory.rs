//! In-process document store
//!
//! Collections are vectors of BSON documents behind a lock. Queries are the
//! same documents the MongoDB driver receives, evaluated by the matcher, so
//! adapter behavior can be exercised without a server.

use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use super::matcher::{compare_by_sort, matches, truthy, values_equal};
use super::{DocumentCollection, Driver, FindDirectives, MergeOutcome, WriteAck};
use crate::identifier::NATIVE_ID_FIELD;
use crate::{AdapterError, Result};

/// Driver backed by process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    collections: Arc<DashMap<String, MemoryCollection>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of collections opened so far, sorted
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    type Collection = MemoryCollection;

    fn name(&self) -> &'static str {
        "memory"
    }

    fn collection(&self, name: &str) -> MemoryCollection {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| MemoryCollection::new(name))
            .clone()
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// One in-memory collection; clones share storage
#[derive(Debug, Clone)]
pub struct MemoryCollection {
    name: String,
    docs: Arc<RwLock<Vec<Document>>>,
}

impl MemoryCollection {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            docs: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Copy of every stored document, in insertion order
    pub fn snapshot(&self) -> Vec<Document> {
        self.docs.read().clone()
    }

    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    fn position(docs: &[Document], filter: &Document) -> Result<Option<usize>> {
        for (i, doc) in docs.iter().enumerate() {
            if matches(doc, filter)? {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    fn duplicate_key(&self, id: &Bson) -> AdapterError {
        AdapterError::Driver(format!(
            "E11000 duplicate key error collection: {} index: _id_ dup key: {{ _id: {} }}",
            self.name, id
        ))
    }
}

/// `_id` first, then the remaining fields in order
fn with_id_first(id: Bson, doc: Document) -> Document {
    let mut out = Document::new();
    out.insert(NATIVE_ID_FIELD, id);
    for (key, value) in doc {
        if key != NATIVE_ID_FIELD {
            out.insert(key, value);
        }
    }
    out
}

/// Apply a projection. Any truthy field makes it an inclusion projection;
/// `_id` counts only when it is the sole field.
fn project(doc: &Document, projection: &Document) -> Document {
    let only_id = projection.keys().all(|k| k == NATIVE_ID_FIELD);
    let inclusion = projection
        .iter()
        .any(|(k, v)| truthy(v) && (only_id || k != NATIVE_ID_FIELD));

    let mut out = Document::new();
    if !inclusion {
        for (key, value) in doc {
            let excluded = projection.get(key).map_or(false, |v| !truthy(v));
            if !excluded {
                out.insert(key.clone(), value.clone());
            }
        }
        return out;
    }

    let keep_id = projection.get(NATIVE_ID_FIELD).map_or(true, truthy);
    if keep_id {
        if let Some(id) = doc.get(NATIVE_ID_FIELD) {
            out.insert(NATIVE_ID_FIELD, id.clone());
        }
    }
    for (key, value) in projection {
        if key == NATIVE_ID_FIELD || !truthy(value) {
            continue;
        }
        if let Some(field) = doc.get(key) {
            out.insert(key.clone(), field.clone());
        }
    }
    out
}

/// Equality fields of a filter seed an upserted document
fn upsert_seed(filter: &Document) -> Document {
    let mut seed = Document::new();
    for (key, value) in filter {
        if key.starts_with('$') || key.contains('.') {
            continue;
        }
        match value {
            Bson::Document(ops) if ops.keys().next().map_or(false, |k| k.starts_with('$')) => {
                if let Some(eq) = ops.get("$eq") {
                    seed.insert(key.clone(), eq.clone());
                }
            }
            other => {
                seed.insert(key.clone(), other.clone());
            }
        }
    }
    seed
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_one(&self, doc: Document, _ack: WriteAck) -> Result<Bson> {
        let id = doc
            .get(NATIVE_ID_FIELD)
            .cloned()
            .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));

        let mut docs = self.docs.write();
        if docs.iter().any(|d| d.get(NATIVE_ID_FIELD).map_or(false, |e| values_equal(e, &id))) {
            return Err(self.duplicate_key(&id));
        }
        docs.push(with_id_first(id.clone(), doc));
        debug!(collection = %self.name, "Inserted document");
        Ok(id)
    }

    async fn replace_one(&self, filter: Document, replacement: Document) -> Result<u64> {
        let mut docs = self.docs.write();
        let Some(i) = Self::position(&docs, &filter)? else {
            return Ok(0);
        };
        let id = docs[i].get(NATIVE_ID_FIELD).cloned().unwrap_or(Bson::Null);
        if let Some(new_id) = replacement.get(NATIVE_ID_FIELD) {
            if !values_equal(new_id, &id) {
                return Err(AdapterError::Driver(
                    "the (immutable) field '_id' was found to have been altered".to_string(),
                ));
            }
        }
        docs[i] = with_id_first(id, replacement);
        Ok(1)
    }

    async fn merge_one(&self, filter: Document, fields: Document, upsert: bool) -> Result<MergeOutcome> {
        let mut docs = self.docs.write();
        if let Some(i) = Self::position(&docs, &filter)? {
            for (key, value) in fields {
                docs[i].insert(key, value);
            }
            return Ok(MergeOutcome {
                matched: 1,
                upserted_id: None,
            });
        }

        if !upsert {
            return Ok(MergeOutcome::default());
        }

        let mut seed = upsert_seed(&filter);
        for (key, value) in fields {
            seed.insert(key, value);
        }
        let id = seed
            .get(NATIVE_ID_FIELD)
            .cloned()
            .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));
        docs.push(with_id_first(id.clone(), seed));
        debug!(collection = %self.name, "Upserted document");

        Ok(MergeOutcome {
            matched: 0,
            upserted_id: Some(id),
        })
    }

    async fn find_one(&self, filter: Document, projection: Option<Document>) -> Result<Option<Document>> {
        let docs = self.docs.read();
        let found = Self::position(&docs, &filter)?.map(|i| match &projection {
            Some(p) => project(&docs[i], p),
            None => docs[i].clone(),
        });
        Ok(found)
    }

    async fn find(&self, filter: Document, directives: FindDirectives) -> Result<Vec<Document>> {
        let mut hits = Vec::new();
        for doc in self.docs.read().iter() {
            if matches(doc, &filter)? {
                hits.push(doc.clone());
            }
        }

        if let Some(sort) = &directives.sort {
            hits.sort_by(|a, b| compare_by_sort(a, b, sort));
        }

        let skip = directives.skip.unwrap_or(0) as usize;
        let mut page: Vec<Document> = hits.into_iter().skip(skip).collect();
        match directives.limit {
            Some(limit) if limit != 0 => page.truncate(limit.unsigned_abs() as usize),
            _ => {}
        }

        if let Some(projection) = &directives.projection {
            page = page.iter().map(|d| project(d, projection)).collect();
        }
        Ok(page)
    }

    async fn delete_many(&self, filter: Document) -> Result<u64> {
        let mut docs = self.docs.write();
        let mut doomed = Vec::with_capacity(docs.len());
        for doc in docs.iter() {
            doomed.push(matches(doc, &filter)?);
        }
        let mut flags = doomed.iter();
        docs.retain(|_| !flags.next().copied().unwrap_or(false));
        Ok(doomed.iter().filter(|d| **d).count() as u64)
    }

    async fn count(&self, filter: Document) -> Result<u64> {
        let mut n = 0;
        for doc in self.docs.read().iter() {
            if matches(doc, &filter)? {
                n += 1;
            }
        }
        Ok(n)
    }

    async fn find_one_and_merge(
        &self,
        filter: Document,
        fields: Document,
        sort: Option<Document>,
    ) -> Result<Option<Document>> {
        let mut docs = self.docs.write();
        let mut candidates = Vec::new();
        for (i, doc) in docs.iter().enumerate() {
            if matches(doc, &filter)? {
                candidates.push(i);
            }
        }
        if let Some(sort) = &sort {
            candidates.sort_by(|a, b| compare_by_sort(&docs[*a], &docs[*b], sort));
        }

        let Some(&i) = candidates.first() else {
            return Ok(None);
        };
        for (key, value) in fields {
            docs[i].insert(key, value);
        }
        Ok(Some(docs[i].clone()))
    }
}
