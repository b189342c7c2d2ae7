//! MongoDB adapter for an ORM persistence contract
//!
//! This crate maps the ORM's generic operations (create, find, upsert,
//! filtered queries, counts, deletes) onto MongoDB collections.
//!
//! # Features
//! - Identifier normalization between ORM `id` strings and native `ObjectId`s
//! - Filter translation: where-clauses, range/membership/pattern operators,
//!   ordering and pagination
//! - Lazily cached collection handles with per-model collection overrides
//! - Foreign-key coercion to `ObjectId` on writes
//! - Pluggable driver: the official MongoDB driver, or an in-memory store
//!   for tests
//!
//! # Example
//! ```ignore
//! use ormbridge_mongodb::{Adapter, AdapterSettings, CreateOptions, FilterDescriptor};
//! use bson::doc;
//!
//! let adapter = Adapter::connect(&AdapterSettings::from_env()?).await?;
//! let id = adapter.create("User", doc! { "name": "Ann" }, CreateOptions::default()).await?;
//! let users = adapter.all("User", &FilterDescriptor::new().order("name DESC")).await?;
//! adapter.disconnect().await?;
//! ```

pub mod adapter;
pub mod collection;
pub mod config;
pub mod connection;
pub mod driver;
pub mod filter;
pub mod identifier;
pub mod model;

pub use adapter::{Adapter, CreateOptions};
pub use collection::CollectionResolver;
pub use config::{AdapterSettings, ConnectionUrl, PoolConfig};
pub use connection::Connection;
pub use driver::{
    DocumentCollection, Driver, FindDirectives, MemoryCollection, MemoryDriver, MergeOutcome,
    MongoCollection, MongoDriver, WriteAck,
};
pub use filter::{Condition, FilterDescriptor, OperatorKind, Order, TranslatedQuery, WhereClause};
pub use model::{ModelDefinition, ModelRegistry, PropertyDef, PropertyType, Record, RelationResolver};
pub use ormbridge_common::{AdapterError, Result};
