//! Query evaluation for the in-memory driver.
//!
//! Evaluates MongoDB query documents against BSON documents. Covers the
//! operators the filter translator emits plus the common comparison,
//! membership, existence and logical operators. Unknown operators are
//! rejected the way the server rejects them.

use bson::{Bson, Document};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;

use crate::{AdapterError, Result};

/// Does `doc` satisfy `filter`?
pub(crate) fn matches(doc: &Document, filter: &Document) -> Result<bool> {
    for (key, cond) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, cond)? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(key, cond)? {
                    if matches(doc, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for clause in clauses(key, cond)? {
                    if matches(doc, clause)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            op if op.starts_with('$') => return Err(unknown_operator(op)),
            field => matches_field(lookup(doc, field), cond)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(op: &str, value: &'a Bson) -> Result<Vec<&'a Document>> {
    match value {
        Bson::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| match item {
                Bson::Document(d) => Ok(d),
                _ => Err(AdapterError::Driver(format!("{} argument's entries must be objects", op))),
            })
            .collect(),
        _ => Err(AdapterError::Driver(format!("{} must be a nonempty array", op))),
    }
}

fn unknown_operator(op: &str) -> AdapterError {
    AdapterError::Driver(format!("unknown operator: {}", op))
}

/// Resolve a dotted field path
pub(crate) fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

fn is_operator_document(doc: &Document) -> bool {
    doc.keys().next().map_or(false, |k| k.starts_with('$'))
}

fn matches_field(value: Option<&Bson>, cond: &Bson) -> Result<bool> {
    match cond {
        Bson::Document(ops) if is_operator_document(ops) => {
            for (op, arg) in ops {
                if !apply_operator(value, op, arg, ops)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Bson::RegularExpression(re) => {
            let regex = compile(&re.pattern, &re.options)?;
            Ok(any_value(value, |v| regex_matches(&regex, v)))
        }
        literal => Ok(equals_or_contains(value, literal)),
    }
}

fn apply_operator(value: Option<&Bson>, op: &str, arg: &Bson, ops: &Document) -> Result<bool> {
    Ok(match op {
        "$eq" => equals_or_contains(value, arg),
        "$ne" => !equals_or_contains(value, arg),
        "$gt" => compares(value, arg, |o| o == Ordering::Greater),
        "$gte" => compares(value, arg, |o| o != Ordering::Less),
        "$lt" => compares(value, arg, |o| o == Ordering::Less),
        "$lte" => compares(value, arg, |o| o != Ordering::Greater),
        "$in" => in_set(value, op, arg)?,
        "$nin" => !in_set(value, op, arg)?,
        "$exists" => value.is_some() == truthy(arg),
        "$type" => value.map_or(Ok(false), |v| type_matches(v, arg))?,
        "$regex" => {
            let regex = match arg {
                Bson::String(pattern) => {
                    let options = ops.get_str("$options").unwrap_or("");
                    compile(pattern, options)?
                }
                Bson::RegularExpression(re) => compile(&re.pattern, &re.options)?,
                _ => return Err(AdapterError::Driver("$regex has to be a string".to_string())),
            };
            any_value(value, |v| regex_matches(&regex, v))
        }
        // consumed by $regex
        "$options" => true,
        "$not" => match arg {
            Bson::Document(inner) if is_operator_document(inner) => !matches_field(value, arg)?,
            Bson::RegularExpression(_) => !matches_field(value, arg)?,
            _ => return Err(AdapterError::Driver("$not needs a regex or a document".to_string())),
        },
        "$size" => match (value, arg) {
            (Some(Bson::Array(items)), size) => as_i64(size) == Some(items.len() as i64),
            _ => false,
        },
        other => return Err(unknown_operator(other)),
    })
}

fn in_set(value: Option<&Bson>, op: &str, arg: &Bson) -> Result<bool> {
    let Bson::Array(candidates) = arg else {
        return Err(AdapterError::Driver(format!("{} needs an array", op)));
    };
    for candidate in candidates {
        let hit = match candidate {
            Bson::RegularExpression(re) => {
                let regex = compile(&re.pattern, &re.options)?;
                any_value(value, |v| regex_matches(&regex, v))
            }
            other => equals_or_contains(value, other),
        };
        if hit {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Equality with array-element semantics; a null literal also matches a
/// missing field
fn equals_or_contains(value: Option<&Bson>, literal: &Bson) -> bool {
    match value {
        None => matches!(literal, Bson::Null),
        Some(v) => {
            values_equal(v, literal)
                || matches!(v, Bson::Array(items) if items.iter().any(|i| values_equal(i, literal)))
        }
    }
}

pub(crate) fn values_equal(a: &Bson, b: &Bson) -> bool {
    type_rank(a) == type_rank(b) && compare_values(a, b) == Ordering::Equal
}

/// Comparison operators only match values of the same type bracket
fn compares(value: Option<&Bson>, arg: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    any_value(value, |v| type_rank(v) == type_rank(arg) && accept(compare_values(v, arg)))
}

fn any_value(value: Option<&Bson>, pred: impl Fn(&Bson) -> bool) -> bool {
    match value {
        None => false,
        Some(Bson::Array(items)) => items.iter().any(&pred),
        Some(v) => pred(v),
    }
}

pub(crate) fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null | Bson::Undefined => false,
        other => as_f64(other).map_or(true, |n| n != 0.0),
    }
}

fn type_matches(value: &Bson, spec: &Bson) -> Result<bool> {
    if let Bson::Array(specs) = spec {
        for s in specs {
            if type_matches(value, s)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    let alias = match spec {
        Bson::String(alias) => alias.clone(),
        other => match as_i64(other) {
            Some(1) => "double".to_string(),
            Some(2) => "string".to_string(),
            Some(3) => "object".to_string(),
            Some(4) => "array".to_string(),
            Some(5) => "binData".to_string(),
            Some(6) => "undefined".to_string(),
            Some(7) => "objectId".to_string(),
            Some(8) => "bool".to_string(),
            Some(9) => "date".to_string(),
            Some(10) => "null".to_string(),
            Some(11) => "regex".to_string(),
            Some(16) => "int".to_string(),
            Some(17) => "timestamp".to_string(),
            Some(18) => "long".to_string(),
            Some(19) => "decimal".to_string(),
            _ => return Err(AdapterError::Driver(format!("Invalid $type value: {}", other))),
        },
    };

    Ok(match alias.as_str() {
        "double" => matches!(value, Bson::Double(_)),
        "string" => matches!(value, Bson::String(_)),
        "object" => matches!(value, Bson::Document(_)),
        "array" => matches!(value, Bson::Array(_)),
        "binData" => matches!(value, Bson::Binary(_)),
        "undefined" => matches!(value, Bson::Undefined),
        "objectId" => matches!(value, Bson::ObjectId(_)),
        "bool" => matches!(value, Bson::Boolean(_)),
        "date" => matches!(value, Bson::DateTime(_)),
        "null" => matches!(value, Bson::Null),
        "regex" => matches!(value, Bson::RegularExpression(_)),
        "int" => matches!(value, Bson::Int32(_)),
        "timestamp" => matches!(value, Bson::Timestamp(_)),
        "long" => matches!(value, Bson::Int64(_)),
        "decimal" => matches!(value, Bson::Decimal128(_)),
        "number" => matches!(value, Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Decimal128(_)),
        other => return Err(AdapterError::Driver(format!("Unknown type name alias: {}", other))),
    })
}

fn compile(pattern: &str, options: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| AdapterError::Driver(format!("Regular expression is invalid: {}", e)))
}

fn regex_matches(regex: &Regex, value: &Bson) -> bool {
    match value {
        Bson::String(s) => regex.is_match(s),
        Bson::Symbol(s) => regex.is_match(s),
        _ => false,
    }
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(i) => Some(*i as i64),
        Bson::Int64(i) => Some(*i),
        Bson::Double(f) if f.fract() == 0.0 => Some(*f as i64),
        _ => None,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(*i as f64),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

/// Canonical type bracket, in MongoDB's cross-type sort order
pub(crate) fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 13,
        _ => 12,
    }
}

/// Total order over BSON values following MongoDB's comparison rules
pub(crate) fn compare_values(a: &Bson, b: &Bson) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }

    match (a, b) {
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            as_i64(a).cmp(&as_i64(b))
        }
        (Bson::Decimal128(x), Bson::Decimal128(y)) => x.bytes().cmp(&y.bytes()),
        _ if ra == 2 => match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Symbol(x), Bson::Symbol(y)) => x.cmp(y),
        (Bson::String(x), Bson::Symbol(y)) | (Bson::Symbol(x), Bson::String(y)) => x.cmp(y),
        (Bson::Document(x), Bson::Document(y)) => compare_documents(x, y),
        (Bson::Array(x), Bson::Array(y)) => compare_sequences(x.iter(), y.iter()),
        (Bson::Binary(x), Bson::Binary(y)) => x.bytes.len().cmp(&y.bytes.len()).then_with(|| x.bytes.cmp(&y.bytes)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.timestamp_millis().cmp(&y.timestamp_millis()),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => (x.time, x.increment).cmp(&(y.time, y.increment)),
        (Bson::RegularExpression(x), Bson::RegularExpression(y)) => {
            (&x.pattern, &x.options).cmp(&(&y.pattern, &y.options))
        }
        _ => Ordering::Equal,
    }
}

fn compare_documents(a: &Document, b: &Document) -> Ordering {
    for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
        let ord = compare_values(va, vb).then_with(|| ka.cmp(kb));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

fn compare_sequences<'a>(
    a: impl ExactSizeIterator<Item = &'a Bson>,
    b: impl ExactSizeIterator<Item = &'a Bson>,
) -> Ordering {
    let (la, lb) = (a.len(), b.len());
    for (x, y) in a.zip(b) {
        let ord = compare_values(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    la.cmp(&lb)
}

/// Compare two documents by a sort specification; missing fields sort as null
pub(crate) fn compare_by_sort(a: &Document, b: &Document, sort: &Document) -> Ordering {
    for (field, direction) in sort {
        let va = lookup(a, field).unwrap_or(&Bson::Null);
        let vb = lookup(b, field).unwrap_or(&Bson::Null);
        let ord = compare_values(va, vb);
        let ord = if as_i64(direction).map_or(false, |d| d < 0) {
            ord.reverse()
        } else {
            ord
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
