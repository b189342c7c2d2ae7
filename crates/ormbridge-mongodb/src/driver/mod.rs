//! Driver seam between the adapter and a document store.
//!
//! The adapter never talks to the `mongodb` crate directly; every storage
//! call goes through [`DocumentCollection`]. Two implementations ship with
//! the crate:
//!
//! - [`MongoDriver`]: the official MongoDB driver
//! - [`MemoryDriver`]: an in-process store that evaluates the same query
//!   documents, used by tests and local development

mod matcher;
mod memory;
mod mongo;

pub use memory::{MemoryCollection, MemoryDriver};
pub use mongo::{MongoCollection, MongoDriver};

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::filter::TranslatedQuery;
use crate::Result;

/// Write acknowledgement requested for inserts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAck {
    /// Fire and forget (`w: 0`)
    Unacknowledged,
    /// Acknowledged by this many replica set members
    Nodes(u32),
    /// Acknowledged by a majority of voting members
    Majority,
}

impl WriteAck {
    pub fn is_acknowledged(&self) -> bool {
        !matches!(self, WriteAck::Unacknowledged | WriteAck::Nodes(0))
    }
}

impl Default for WriteAck {
    fn default() -> Self {
        WriteAck::Nodes(1)
    }
}

/// Cursor directives for `find`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindDirectives {
    pub sort: Option<Document>,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
    pub projection: Option<Document>,
}

impl From<&TranslatedQuery> for FindDirectives {
    fn from(query: &TranslatedQuery) -> Self {
        Self {
            sort: query.sort.clone(),
            limit: query.limit,
            skip: query.skip,
            projection: None,
        }
    }
}

/// Result of a single-document merge
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub matched: u64,
    pub upserted_id: Option<Bson>,
}

/// Operations the adapter issues against one collection
#[async_trait]
pub trait DocumentCollection: Clone + Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Insert a document, returning its `_id` (generated when absent)
    async fn insert_one(&self, doc: Document, ack: WriteAck) -> Result<Bson>;

    /// Replace the first matching document; returns the matched count
    async fn replace_one(&self, filter: Document, replacement: Document) -> Result<u64>;

    /// `$set` the given fields on the first matching document
    async fn merge_one(&self, filter: Document, fields: Document, upsert: bool) -> Result<MergeOutcome>;

    async fn find_one(&self, filter: Document, projection: Option<Document>) -> Result<Option<Document>>;

    async fn find(&self, filter: Document, directives: FindDirectives) -> Result<Vec<Document>>;

    async fn delete_many(&self, filter: Document) -> Result<u64>;

    async fn count(&self, filter: Document) -> Result<u64>;

    /// `$set` the given fields on the first document in `sort` order and
    /// return it after modification
    async fn find_one_and_merge(
        &self,
        filter: Document,
        fields: Document,
        sort: Option<Document>,
    ) -> Result<Option<Document>>;
}

/// A connected store that hands out collection handles
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    type Collection: DocumentCollection;

    /// Short backend name
    fn name(&self) -> &'static str;

    fn collection(&self, name: &str) -> Self::Collection;

    async fn shutdown(&self) -> Result<()>;
}
