//! MongoDB-backed driver

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::options::{
    Acknowledgment, FindOneAndUpdateOptions, FindOneOptions, FindOptions, InsertOneOptions,
    ReturnDocument, UpdateOptions, WriteConcern,
};
use mongodb::Collection;
use std::sync::Arc;

use super::{DocumentCollection, Driver, FindDirectives, MergeOutcome, WriteAck};
use crate::config::AdapterSettings;
use crate::connection::Connection;
use crate::Result;

/// Driver over a live MongoDB connection
#[derive(Debug, Clone)]
pub struct MongoDriver {
    connection: Arc<Connection>,
}

impl MongoDriver {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection: Arc::new(connection),
        }
    }

    /// Parse the settings, connect, and verify the server is reachable
    pub async fn connect(settings: &AdapterSettings) -> Result<Self> {
        let url = settings.connection_url()?;
        let connection = Connection::connect(&url, &settings.pool).await?;
        Ok(Self::new(connection))
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

#[async_trait]
impl Driver for MongoDriver {
    type Collection = MongoCollection;

    fn name(&self) -> &'static str {
        "mongodb"
    }

    fn collection(&self, name: &str) -> MongoCollection {
        MongoCollection {
            inner: self.connection.get_collection(name),
        }
    }

    async fn shutdown(&self) -> Result<()> {
        self.connection.shutdown().await;
        Ok(())
    }
}

/// Untyped MongoDB collection handle
#[derive(Debug, Clone)]
pub struct MongoCollection {
    inner: Collection<Document>,
}

fn write_concern(ack: WriteAck) -> WriteConcern {
    let w = match ack {
        WriteAck::Unacknowledged => Acknowledgment::Nodes(0),
        WriteAck::Nodes(n) => Acknowledgment::Nodes(n),
        WriteAck::Majority => Acknowledgment::Majority,
    };
    WriteConcern::builder().w(w).build()
}

#[async_trait]
impl DocumentCollection for MongoCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn insert_one(&self, doc: Document, ack: WriteAck) -> Result<Bson> {
        let mut options = InsertOneOptions::default();
        options.write_concern = Some(write_concern(ack));

        let result = self.inner.insert_one(doc).with_options(options).await?;
        Ok(result.inserted_id)
    }

    async fn replace_one(&self, filter: Document, replacement: Document) -> Result<u64> {
        let result = self.inner.replace_one(filter, replacement).await?;
        Ok(result.matched_count)
    }

    async fn merge_one(&self, filter: Document, fields: Document, upsert: bool) -> Result<MergeOutcome> {
        let mut options = UpdateOptions::default();
        options.upsert = Some(upsert);

        let result = self
            .inner
            .update_one(filter, doc! { "$set": fields })
            .with_options(options)
            .await?;

        Ok(MergeOutcome {
            matched: result.matched_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn find_one(&self, filter: Document, projection: Option<Document>) -> Result<Option<Document>> {
        let mut options = FindOneOptions::default();
        options.projection = projection;

        let found = self.inner.find_one(filter).with_options(options).await?;
        Ok(found)
    }

    async fn find(&self, filter: Document, directives: FindDirectives) -> Result<Vec<Document>> {
        let mut find_options = FindOptions::default();
        if let Some(sort) = directives.sort {
            find_options.sort = Some(sort);
        }
        if let Some(skip) = directives.skip {
            find_options.skip = Some(skip);
        }
        if let Some(limit) = directives.limit {
            find_options.limit = Some(limit);
        }
        if let Some(projection) = directives.projection {
            find_options.projection = Some(projection);
        }

        let cursor = self.inner.find(filter).with_options(find_options).await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        Ok(docs)
    }

    async fn delete_many(&self, filter: Document) -> Result<u64> {
        let result = self.inner.delete_many(filter).await?;
        Ok(result.deleted_count)
    }

    async fn count(&self, filter: Document) -> Result<u64> {
        let count = self.inner.count_documents(filter).await?;
        Ok(count)
    }

    async fn find_one_and_merge(
        &self,
        filter: Document,
        fields: Document,
        sort: Option<Document>,
    ) -> Result<Option<Document>> {
        let mut options = FindOneAndUpdateOptions::default();
        options.sort = sort;
        options.return_document = Some(ReturnDocument::After);

        let updated = self
            .inner
            .find_one_and_update(filter, doc! { "$set": fields })
            .with_options(options)
            .await?;
        Ok(updated)
    }
}
