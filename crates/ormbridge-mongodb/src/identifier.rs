//! Identifier normalization between the ORM boundary and MongoDB
//!
//! The ORM hands identifiers around as opaque values: usually the hex string
//! form of an `ObjectId`, sometimes the native `ObjectId` itself after a
//! round trip through the adapter. Everything that crosses into a storage
//! query or write as an identifier goes through [`to_native`].
//!
//! Strings that are not valid hex encodings are rejected. The adapter never
//! falls back to treating them as string-typed keys.

use bson::{oid::ObjectId, Bson};
use chrono::{DateTime, Utc};

use crate::{AdapterError, Result};

/// Native identifier field name at the storage boundary
pub const NATIVE_ID_FIELD: &str = "_id";

/// Identifier field name at the ORM boundary
pub const ORM_ID_FIELD: &str = "id";

/// Parse a hex string into an `ObjectId`
///
/// # Errors
/// Returns `InvalidIdentifier` if the string is not 24 hex characters.
pub fn parse_object_id(value: &str) -> Result<ObjectId> {
    ObjectId::parse_str(value).map_err(|e| {
        AdapterError::InvalidIdentifier(format!("'{}' is not a valid ObjectId: {}", value, e))
    })
}

/// Convert an identifier value into its native form
///
/// - `ObjectId` is returned unchanged
/// - strings are parsed as hex `ObjectId`s
/// - any other value is treated as already native and returned unchanged
pub fn to_native(value: Bson) -> Result<Bson> {
    match value {
        Bson::String(s) => parse_object_id(&s).map(Bson::ObjectId),
        other => Ok(other),
    }
}

/// Like [`to_native`], but `None` and `Bson::Null` both mean "no identifier
/// supplied" and yield `Ok(None)`
pub fn normalize_optional(value: Option<Bson>) -> Result<Option<Bson>> {
    match value {
        None | Some(Bson::Null) => Ok(None),
        Some(v) => to_native(v).map(Some),
    }
}

/// Creation time embedded in an `ObjectId`
pub fn created_at(id: &ObjectId) -> DateTime<Utc> {
    id.timestamp().to_chrono()
}

/// String form of an identifier as the ORM sees it
pub fn to_orm_string(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Truthiness of a stored identifier, as used by existence checks
pub(crate) fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined => false,
        Bson::Boolean(b) => *b,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(f) => *f != 0.0 && !f.is_nan(),
        Bson::String(s) => !s.is_empty(),
        _ => true,
    }
}
