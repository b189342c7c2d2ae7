//! Filter translation for ORM query descriptors.
//!
//! Converts a [`FilterDescriptor`] (where / order / limit / skip / offset)
//! into a MongoDB query document plus cursor directives.
//!
//! # Example
//!
//! ```ignore
//! use ormbridge_mongodb::filter::{translate, FilterDescriptor, OperatorKind};
//! use bson::bson;
//!
//! let descriptor = FilterDescriptor::new()
//!     .where_op("age", OperatorKind::Between, bson!([18, 30]))
//!     .where_eq("deletedAt", bson::Bson::Null)
//!     .order("name DESC, age")
//!     .limit(10)
//!     .skip(20);
//!
//! let query = translate(&descriptor)?;
//! // filter: { age: { $gte: 18, $lte: 30 }, deletedAt: { $in: [null] } }
//! // sort:   { name: -1, age: 1 }
//! ```

mod translate;
mod types;


pub use translate::{parse_order, sort_document, translate, translate_where};
pub use types::{
    Condition, FilterDescriptor, OperatorKind, Order, OrderDirection, SortKey, TranslatedQuery,
    WhereClause,
};
