//! Translation of filter descriptors into MongoDB queries.

use bson::{doc, Bson, Document};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::types::{
    Condition, FilterDescriptor, OperatorKind, Order, OrderDirection, SortKey, TranslatedQuery,
    WhereClause,
};
use crate::identifier::{self, NATIVE_ID_FIELD, ORM_ID_FIELD};
use crate::{AdapterError, Result};

/// Trailing direction suffix of an ordering token (case-sensitive)
static DIRECTION_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+(A|DE)SC$").unwrap());

/// Translates a full descriptor into a native query and cursor directives.
pub fn translate(descriptor: &FilterDescriptor) -> Result<TranslatedQuery> {
    let filter = translate_where(&descriptor.where_clause)?;

    let sort = descriptor
        .order
        .as_ref()
        .map(|order| sort_document(&parse_order(order)))
        .filter(|sort| !sort.is_empty());

    // Zero means "no bound" for every cursor directive.
    let limit = descriptor.limit.filter(|l| *l != 0);
    let skip = descriptor
        .skip
        .filter(|s| *s > 0)
        .or_else(|| descriptor.offset.filter(|o| *o > 0));

    debug!(?filter, ?sort, ?limit, ?skip, "Translated filter descriptor");

    Ok(TranslatedQuery {
        filter,
        sort,
        limit,
        skip,
    })
}

/// Translates a where clause into a native query document.
pub fn translate_where(clause: &WhereClause) -> Result<Document> {
    let mut entries: Vec<(String, Condition)> = clause
        .iter()
        .map(|(field, cond)| (field.to_string(), cond.clone()))
        .collect();

    // The id rename has to come first: operator handling below does not
    // know which field is the identifier.
    if let Some(pos) = entries
        .iter()
        .position(|(field, cond)| field == ORM_ID_FIELD && !cond.is_null_literal())
    {
        let (_, cond) = entries.remove(pos);
        let cond = match cond {
            Condition::Literal(value) => Condition::Literal(identifier::to_native(value)?),
            op => op,
        };
        entries.retain(|(field, _)| field != NATIVE_ID_FIELD);
        entries.push((NATIVE_ID_FIELD.to_string(), cond));
    }

    let mut query = Document::new();
    for (field, cond) in entries {
        let native = translate_condition(&field, cond)?;
        query.insert(field, native);
    }
    Ok(query)
}

fn translate_condition(field: &str, condition: Condition) -> Result<Bson> {
    match condition {
        // `$in: [null]` matches both explicit nulls and missing fields.
        Condition::Literal(Bson::Null) => Ok(Bson::Document(doc! { "$in": [Bson::Null] })),
        Condition::Literal(value) => Ok(value),
        Condition::Operator(kind, value) => translate_operator(field, kind, value).map(Bson::Document),
    }
}

fn translate_operator(field: &str, kind: OperatorKind, value: Bson) -> Result<Document> {
    let native = match kind {
        OperatorKind::Between => {
            let (low, high) = range_bounds(field, value)?;
            return Ok(doc! { "$gte": low, "$lte": high });
        }
        OperatorKind::Inq => return Ok(doc! { "$in": membership_set(value)? }),
        OperatorKind::Nlike => return Ok(doc! { "$not": { "$regex": value } }),
        OperatorKind::Nin => "$nin".to_string(),
        OperatorKind::Gt => "$gt".to_string(),
        OperatorKind::Gte => "$gte".to_string(),
        OperatorKind::Lt => "$lt".to_string(),
        OperatorKind::Lte => "$lte".to_string(),
        OperatorKind::Neq => "$ne".to_string(),
        OperatorKind::Like => "$regex".to_string(),
        OperatorKind::Other(key) => {
            warn!(field, operator = %key, "Forwarding unrecognized operator verbatim");
            format!("${}", key)
        }
    };

    let mut op = Document::new();
    op.insert(native, value);
    Ok(op)
}

fn range_bounds(field: &str, value: Bson) -> Result<(Bson, Bson)> {
    match value {
        Bson::Array(bounds) if bounds.len() == 2 => {
            let mut bounds = bounds.into_iter();
            match (bounds.next(), bounds.next()) {
                (Some(low), Some(high)) => Ok((low, high)),
                _ => Err(between_error(field)),
            }
        }
        _ => Err(between_error(field)),
    }
}

fn between_error(field: &str) -> AdapterError {
    AdapterError::InvalidFilter(format!(
        "'between' on '{}' expects an array of exactly two bounds",
        field
    ))
}

/// Every string element is normalized as an identifier; other elements are
/// already native.
fn membership_set(value: Bson) -> Result<Vec<Bson>> {
    let elements = match value {
        Bson::Array(items) => items,
        single => vec![single],
    };
    elements.into_iter().map(identifier::to_native).collect()
}

/// Parses ordering tokens into sort keys, preserving input order.
pub fn parse_order(order: &Order) -> Vec<SortKey> {
    let tokens: Vec<&str> = match order {
        Order::Text(text) => text.split(',').collect(),
        Order::Tokens(tokens) => tokens.iter().map(String::as_str).collect(),
    };

    tokens
        .into_iter()
        .filter_map(|token| {
            let token = token.trim();
            let direction = match DIRECTION_SUFFIX.captures(token) {
                Some(caps) if &caps[1] == "DE" => OrderDirection::Desc,
                _ => OrderDirection::Asc,
            };
            let field = DIRECTION_SUFFIX.replace(token, "").trim().to_string();
            if field.is_empty() {
                None
            } else {
                Some(SortKey { field, direction })
            }
        })
        .collect()
}

/// Builds the native sort document. A repeated field keeps its first
/// position and takes the last direction.
pub fn sort_document(keys: &[SortKey]) -> Document {
    let mut sort = Document::new();
    for key in keys {
        sort.insert(key.field.clone(), key.direction.to_native());
    }
    sort
}
