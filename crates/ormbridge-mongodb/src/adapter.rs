//! Operation dispatcher
//!
//! [`Adapter`] implements the ORM persistence contract on top of a
//! [`Driver`]. Every operation normalizes identifiers, resolves the target
//! collection, translates filters where it reads, and shapes driver results
//! back into ORM records.

use bson::{doc, oid::ObjectId, Bson, Document};
use tracing::{debug, info, instrument, warn};

use crate::collection::CollectionResolver;
use crate::config::AdapterSettings;
use crate::driver::{DocumentCollection, Driver, FindDirectives, MongoDriver, WriteAck};
use crate::filter::{self, FilterDescriptor, WhereClause};
use crate::identifier::{self, NATIVE_ID_FIELD, ORM_ID_FIELD};
use crate::model::{ModelDefinition, ModelRegistry, PropertyDef, PropertyType, Record};
use crate::{AdapterError, Result};

/// Options for [`Adapter::create`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Write acknowledgement; unacknowledged inserts report no identifier
    pub write_ack: WriteAck,
}

impl CreateOptions {
    pub fn unacknowledged() -> Self {
        Self {
            write_ack: WriteAck::Unacknowledged,
        }
    }
}

/// ORM adapter over a document store
pub struct Adapter<D: Driver> {
    driver: D,
    models: ModelRegistry,
    collections: CollectionResolver<D::Collection>,
}

impl Adapter<MongoDriver> {
    /// Connect to MongoDB with the given settings.
    ///
    /// # Errors
    /// - `InvalidConfiguration` for a missing or malformed URL
    /// - `Connection` if the server cannot be reached
    pub async fn connect(settings: &AdapterSettings) -> Result<Self> {
        let driver = MongoDriver::connect(settings).await?;
        Ok(Self::new(driver))
    }
}

impl<D: Driver> Adapter<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            models: ModelRegistry::new(),
            collections: CollectionResolver::new(),
        }
    }

    /// Backend name
    pub fn name(&self) -> &'static str {
        self.driver.name()
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn define(&self, model: ModelDefinition) {
        self.models.define(model);
    }

    pub fn define_property(&self, model: &str, property: &str, def: PropertyDef) {
        self.models.define_property(model, property, def);
    }

    pub fn define_foreign_key(&self, model: &str, key: &str) -> PropertyType {
        self.models.define_foreign_key(model, key)
    }

    /// Collection handle for a model, created on first use
    pub fn collection(&self, model: &str) -> D::Collection {
        let name = self.models.collection_name(model);
        self.collections.resolve(&name, |name| self.driver.collection(name))
    }

    /// Physical collections touched so far
    pub fn cached_collections(&self) -> Vec<String> {
        self.collections.cached_names()
    }

    /// Insert a record and return its identifier.
    ///
    /// A supplied `id` becomes the native `_id`; an absent or null one is
    /// generated by the store. Unacknowledged writes return `Ok(None)`.
    #[instrument(skip(self, data, options), fields(model = %model))]
    pub async fn create(&self, model: &str, mut data: Record, options: CreateOptions) -> Result<Option<Bson>> {
        let id = identifier::normalize_optional(data.remove(ORM_ID_FIELD))?;
        if let Some(id) = id {
            data.insert(NATIVE_ID_FIELD, id);
        }
        self.models.coerce_identifiers(model, &mut data)?;

        let inserted = self.collection(model).insert_one(data, options.write_ack).await?;
        debug!(id = %inserted, "Created record");

        if options.write_ack.is_acknowledged() {
            Ok(Some(inserted))
        } else {
            Ok(None)
        }
    }

    /// Replace the stored record carrying the payload's identifier.
    ///
    /// # Errors
    /// `InvalidIdentifier` when the payload carries no identifier.
    #[instrument(skip(self, data), fields(model = %model))]
    pub async fn save(&self, model: &str, mut data: Record) -> Result<()> {
        let id = take_identifier(&mut data, IdPrecedence::NativeFirst)?.ok_or_else(|| {
            AdapterError::InvalidIdentifier(format!("Cannot save {} without an id", model))
        })?;
        self.models.coerce_identifiers(model, &mut data)?;

        let matched = self
            .collection(model)
            .replace_one(doc! { NATIVE_ID_FIELD: id.clone() }, data)
            .await?;
        debug!(id = %id, matched, "Saved record");
        Ok(())
    }

    /// Merge the payload into the record with its identifier, creating it
    /// when it does not exist. The returned record carries the identifier
    /// as `id`.
    #[instrument(skip(self, data), fields(model = %model))]
    pub async fn update_or_create(&self, model: &str, mut data: Record) -> Result<Record> {
        let id = take_identifier(&mut data, IdPrecedence::OrmFirst)?
            .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));
        self.models.coerce_identifiers(model, &mut data)?;

        let outcome = self
            .collection(model)
            .merge_one(doc! { NATIVE_ID_FIELD: id.clone() }, data.clone(), true)
            .await?;
        debug!(id = %id, matched = outcome.matched, "Upserted record");

        data.insert(ORM_ID_FIELD, id);
        Ok(data)
    }

    /// Fetch one record by identifier. A null identifier finds nothing.
    #[instrument(skip(self), fields(model = %model))]
    pub async fn find(&self, model: &str, id: impl Into<Bson> + std::fmt::Debug) -> Result<Option<Record>> {
        let Some(id) = identifier::normalize_optional(Some(id.into()))? else {
            return Ok(None);
        };

        let found = self
            .collection(model)
            .find_one(doc! { NATIVE_ID_FIELD: id.clone() }, None)
            .await?;
        Ok(found.map(|mut record| {
            record.insert(ORM_ID_FIELD, id);
            record
        }))
    }

    #[instrument(skip(self), fields(model = %model))]
    pub async fn exists(&self, model: &str, id: impl Into<Bson> + std::fmt::Debug) -> Result<bool> {
        let Some(id) = identifier::normalize_optional(Some(id.into()))? else {
            return Ok(false);
        };

        let found = self
            .collection(model)
            .find_one(doc! { NATIVE_ID_FIELD: id }, Some(doc! { NATIVE_ID_FIELD: 1 }))
            .await?;
        Ok(found
            .and_then(|record| record.get(NATIVE_ID_FIELD).map(identifier::is_truthy))
            .unwrap_or(false))
    }

    /// Delete the record with this identifier; returns the deleted count.
    #[instrument(skip(self), fields(model = %model))]
    pub async fn destroy(&self, model: &str, id: impl Into<Bson> + std::fmt::Debug) -> Result<u64> {
        let id = identifier::normalize_optional(Some(id.into()))?.ok_or_else(|| {
            AdapterError::InvalidIdentifier(format!("Cannot destroy {} without an id", model))
        })?;

        let deleted = self
            .collection(model)
            .delete_many(doc! { NATIVE_ID_FIELD: id })
            .await?;
        debug!(deleted, "Destroyed record");
        Ok(deleted)
    }

    /// Delete every record of the model
    #[instrument(skip(self), fields(model = %model))]
    pub async fn destroy_all(&self, model: &str) -> Result<u64> {
        let deleted = self.collection(model).delete_many(Document::new()).await?;
        info!(deleted, "Destroyed all records");
        Ok(deleted)
    }

    /// Query records with a filter descriptor.
    ///
    /// Each record carries its `_id` copied onto `id`. When the descriptor
    /// asks for `include`, the model's relation resolver fills the related
    /// records in.
    #[instrument(skip(self, descriptor), fields(model = %model))]
    pub async fn all(&self, model: &str, descriptor: &FilterDescriptor) -> Result<Vec<Record>> {
        let query = filter::translate(descriptor)?;
        let directives = FindDirectives::from(&query);

        let mut records = self.collection(model).find(query.filter, directives).await?;
        for record in records.iter_mut() {
            if let Some(id) = record.get(NATIVE_ID_FIELD).cloned() {
                record.insert(ORM_ID_FIELD, id);
            }
        }
        debug!(count = records.len(), "Fetched records");

        let Some(include) = &descriptor.include else {
            return Ok(records);
        };
        match self.models.relations(model) {
            Some(resolver) => resolver.include(records, include).await,
            None => {
                warn!(model = %model, "include requested but the model has no relation resolver");
                Ok(records)
            }
        }
    }

    /// Count records matching a where clause
    #[instrument(skip(self, clause), fields(model = %model))]
    pub async fn count(&self, model: &str, clause: &WhereClause) -> Result<u64> {
        let filter = filter::translate_where(clause)?;
        self.collection(model).count(filter).await
    }

    /// Merge attributes into one record and return it after modification,
    /// or `None` when no record has that identifier.
    #[instrument(skip(self, data), fields(model = %model))]
    pub async fn update_attributes(
        &self,
        model: &str,
        id: impl Into<Bson> + std::fmt::Debug,
        mut data: Record,
    ) -> Result<Option<Record>> {
        let id = identifier::normalize_optional(Some(id.into()))?.ok_or_else(|| {
            AdapterError::InvalidIdentifier(format!("Cannot update {} without an id", model))
        })?;
        data.remove(ORM_ID_FIELD);
        data.remove(NATIVE_ID_FIELD);
        self.models.coerce_identifiers(model, &mut data)?;

        let updated = self
            .collection(model)
            .find_one_and_merge(
                doc! { NATIVE_ID_FIELD: id.clone() },
                data,
                Some(doc! { NATIVE_ID_FIELD: 1 }),
            )
            .await?;
        Ok(updated.map(|mut record| {
            record.insert(ORM_ID_FIELD, id);
            record
        }))
    }

    /// Shut the driver down; pooled connections are closed
    pub async fn disconnect(self) -> Result<()> {
        info!(driver = self.driver.name(), "Disconnecting adapter");
        self.driver.shutdown().await
    }
}

/// Which identifier wins when the payload's `id` is neither a string nor null
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdPrecedence {
    /// An existing `_id` wins over a non-string `id` (replace)
    NativeFirst,
    /// A non-string `id` wins over `_id` (upsert)
    OrmFirst,
}

/// Remove `id` and `_id` from a payload and resolve its identifier.
///
/// A string `id` is always parsed and used. A missing or null `id` falls
/// back to `_id`. Otherwise `precedence` decides between the two.
fn take_identifier(data: &mut Record, precedence: IdPrecedence) -> Result<Option<Bson>> {
    let orm_id = data.remove(ORM_ID_FIELD);
    let native_id = data
        .remove(NATIVE_ID_FIELD)
        .filter(|id| !matches!(id, Bson::Null));

    match orm_id {
        Some(Bson::String(hex)) => identifier::parse_object_id(&hex).map(|oid| Some(Bson::ObjectId(oid))),
        Some(Bson::Null) | None => Ok(native_id),
        Some(other) => Ok(match precedence {
            IdPrecedence::NativeFirst => native_id.or(Some(other)),
            IdPrecedence::OrmFirst => Some(other),
        }),
    }
}
