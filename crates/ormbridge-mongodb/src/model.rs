//! Model registration for the adapter
//!
//! The ORM registers each model once through `define`, optionally refining
//! it with `define_property` and `define_foreign_key`. The adapter only
//! needs three things from a definition:
//! - the physical collection override (`table` setting)
//! - which properties hold native identifiers, so hex strings written to
//!   them are stored as `ObjectId`
//! - the relation resolver used when a query asks for `include`

use async_trait::async_trait;
use bson::{Bson, Document};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::identifier::{self, NATIVE_ID_FIELD, ORM_ID_FIELD};
use crate::Result;

/// One persisted entity, as exchanged with the ORM
pub type Record = Document;

/// Declared type of a model property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Date,
    /// Native document identifier
    ObjectId,
    Json,
    Any,
}

/// Property declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDef {
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default)]
    pub index: bool,
}

impl PropertyDef {
    pub fn new(property_type: PropertyType) -> Self {
        Self {
            property_type,
            index: false,
        }
    }

    pub fn indexed(mut self) -> Self {
        self.index = true;
        self
    }
}

/// Per-model adapter settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Physical collection name overriding the model name
    #[serde(default)]
    pub table: Option<String>,
}

/// Resolves relation inclusion for records returned by `all`
///
/// Relation loading belongs to the ORM; the adapter only hands over the
/// materialized records and the descriptor's `include` spec.
#[async_trait]
pub trait RelationResolver: Send + Sync {
    async fn include(&self, records: Vec<Record>, include: &Bson) -> Result<Vec<Record>>;
}

/// A registered model
#[derive(Clone)]
pub struct ModelDefinition {
    pub name: String,
    pub properties: BTreeMap<String, PropertyDef>,
    pub settings: ModelSettings,
    pub relations: Option<Arc<dyn RelationResolver>>,
}

impl fmt::Debug for ModelDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDefinition")
            .field("name", &self.name)
            .field("properties", &self.properties)
            .field("settings", &self.settings)
            .field("relations", &self.relations.is_some())
            .finish()
    }
}

impl ModelDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
            settings: ModelSettings::default(),
            relations: None,
        }
    }

    pub fn property(mut self, name: impl Into<String>, def: PropertyDef) -> Self {
        self.properties.insert(name.into(), def);
        self
    }

    /// Store this model's records in `table` instead of a collection named
    /// after the model
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.settings.table = Some(table.into());
        self
    }

    pub fn relations(mut self, resolver: Arc<dyn RelationResolver>) -> Self {
        self.relations = Some(resolver);
        self
    }

    /// Physical collection name for this model
    pub fn collection_name(&self) -> &str {
        self.settings.table.as_deref().unwrap_or(&self.name)
    }

    fn object_id_fields(&self) -> impl Iterator<Item = &str> {
        self.properties
            .iter()
            .filter(|(name, def)| {
                def.property_type == PropertyType::ObjectId
                    && name.as_str() != ORM_ID_FIELD
                    && name.as_str() != NATIVE_ID_FIELD
            })
            .map(|(name, _)| name.as_str())
    }
}

/// Registry of defined models, owned by one adapter instance
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: DashMap<String, ModelDefinition>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model; every model gets an `id` property of native
    /// identifier type unless it declares its own.
    pub fn define(&self, mut model: ModelDefinition) {
        model
            .properties
            .entry(ORM_ID_FIELD.to_string())
            .or_insert_with(|| PropertyDef::new(PropertyType::ObjectId));
        debug!(model = %model.name, collection = model.collection_name(), "Defined model");
        self.models.insert(model.name.clone(), model);
    }

    /// Add or replace a property on an already defined model.
    ///
    /// Properties of unknown models are registered on an implicit definition.
    pub fn define_property(&self, model: &str, property: &str, def: PropertyDef) {
        self.models
            .entry(model.to_string())
            .or_insert_with(|| ModelDefinition::new(model))
            .properties
            .insert(property.to_string(), def);
    }

    /// Declare a foreign key; foreign keys hold native identifiers.
    pub fn define_foreign_key(&self, model: &str, key: &str) -> PropertyType {
        self.define_property(model, key, PropertyDef::new(PropertyType::ObjectId));
        PropertyType::ObjectId
    }

    pub fn get(&self, model: &str) -> Option<ModelDefinition> {
        self.models.get(model).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    /// Physical collection name; undefined models map to themselves
    pub fn collection_name(&self, model: &str) -> String {
        self.models
            .get(model)
            .map(|entry| entry.collection_name().to_string())
            .unwrap_or_else(|| model.to_string())
    }

    pub fn relations(&self, model: &str) -> Option<Arc<dyn RelationResolver>> {
        self.models.get(model).and_then(|entry| entry.relations.clone())
    }

    /// Convert hex strings held by identifier-typed properties into `ObjectId`s
    pub fn coerce_identifiers(&self, model: &str, data: &mut Document) -> Result<()> {
        let Some(entry) = self.models.get(model) else {
            return Ok(());
        };
        for field in entry.object_id_fields() {
            if let Some(value) = data.get_mut(field) {
                if let Bson::String(hex) = value {
                    let native = identifier::parse_object_id(hex)?;
                    *value = Bson::ObjectId(native);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};

    #[test]
    fn test_define_adds_object_id_property() {
        let registry = ModelRegistry::new();
        registry.define(ModelDefinition::new("Post"));
        let post = registry.get("Post").unwrap();
        assert_eq!(post.properties["id"].property_type, PropertyType::ObjectId);
    }

    #[test]
    fn test_define_keeps_declared_id() {
        let registry = ModelRegistry::new();
        registry.define(ModelDefinition::new("Slug").property("id", PropertyDef::new(PropertyType::String)));
        assert_eq!(registry.get("Slug").unwrap().properties["id"].property_type, PropertyType::String);
    }

    #[test]
    fn test_collection_name_override() {
        let registry = ModelRegistry::new();
        registry.define(ModelDefinition::new("Test").table("test_collection"));
        registry.define(ModelDefinition::new("User"));
        assert_eq!(registry.collection_name("Test"), "test_collection");
        assert_eq!(registry.collection_name("User"), "User");
        assert_eq!(registry.collection_name("Unknown"), "Unknown");
    }

    #[test]
    fn test_define_property() {
        let registry = ModelRegistry::new();
        registry.define(ModelDefinition::new("User"));
        registry.define_property("User", "email", PropertyDef::new(PropertyType::String).indexed());
        let user = registry.get("User").unwrap();
        assert!(user.properties["email"].index);
    }

    #[test]
    fn test_define_foreign_key_returns_object_id() {
        let registry = ModelRegistry::new();
        registry.define(ModelDefinition::new("Chapter"));
        assert_eq!(registry.define_foreign_key("Chapter", "bookId"), PropertyType::ObjectId);
        assert_eq!(
            registry.get("Chapter").unwrap().properties["bookId"].property_type,
            PropertyType::ObjectId
        );
    }

    #[test]
    fn test_coerce_identifiers() {
        let registry = ModelRegistry::new();
        registry.define(ModelDefinition::new("Chapter"));
        registry.define_foreign_key("Chapter", "bookId");

        let book = ObjectId::new();
        let mut data = doc! { "title": "One", "bookId": book.to_hex() };
        registry.coerce_identifiers("Chapter", &mut data).unwrap();
        assert_eq!(data.get_object_id("bookId").unwrap(), book);
        assert_eq!(data.get_str("title").unwrap(), "One");
    }

    #[test]
    fn test_coerce_identifiers_rejects_bad_hex() {
        let registry = ModelRegistry::new();
        registry.define(ModelDefinition::new("Chapter"));
        registry.define_foreign_key("Chapter", "bookId");

        let mut data = doc! { "bookId": "not-hex" };
        let err = registry.coerce_identifiers("Chapter", &mut data).unwrap_err();
        assert!(err.is_identifier_error());
    }

    #[test]
    fn test_property_def_deserializes() {
        let def: PropertyDef = serde_json::from_value(serde_json::json!({ "type": "objectid" })).unwrap();
        assert_eq!(def, PropertyDef::new(PropertyType::ObjectId));
    }
}
