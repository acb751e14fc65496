//! Evaluation of the store's filter/update language over in-memory documents.
//!
//! Covers the subset the repositories and their callers use: equality,
//! `$eq/$ne/$in/$nin/$exists/$gt/$gte/$lt/$lte`, `$and/$or`, and the update
//! operators `$set/$unset/$addToSet/$pull`.

use std::cmp::Ordering;

use bson::{Bson, Document};

use docrepo_core::StoreError;

/// Effect of applying one update document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct UpdateEffect {
    pub modified: bool,
    /// An array field changed (bumps the version marker).
    pub arrays_changed: bool,
}

pub(crate) fn matches(doc: &Document, filter: &Document) -> Result<bool, StoreError> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    all &= matches(doc, clause)?;
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    any |= matches(doc, clause)?;
                }
                any
            }
            op if op.starts_with('$') => return Err(StoreError::UnsupportedOperator(op.to_string())),
            path => matches_condition(lookup(doc, path), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(op: &str, condition: &'a Bson) -> Result<Vec<&'a Document>, StoreError> {
    let Bson::Array(items) = condition else {
        return Err(StoreError::InvalidRequest(format!("{op} expects an array")));
    };
    items
        .iter()
        .map(|item| match item {
            Bson::Document(doc) => Ok(doc),
            other => Err(StoreError::InvalidRequest(format!(
                "{op} clause must be a document, found {other}"
            ))),
        })
        .collect()
}

/// Resolve a dotted path (`owner.name`) against a document.
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

fn is_operator_document(condition: &Bson) -> bool {
    match condition {
        Bson::Document(doc) => doc.keys().next().is_some_and(|k| k.starts_with('$')),
        _ => false,
    }
}

fn matches_condition(value: Option<&Bson>, condition: &Bson) -> Result<bool, StoreError> {
    let Bson::Document(ops) = condition else {
        return Ok(equals(value, condition));
    };
    if !is_operator_document(condition) {
        return Ok(equals(value, condition));
    }

    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => equals(value, arg),
            "$ne" => !equals(value, arg),
            "$in" => in_list(value, op, arg)?,
            "$nin" => !in_list(value, op, arg)?,
            "$exists" => value.is_some() == truthy(arg),
            "$gt" => ordered(value, arg, |o| o == Ordering::Greater),
            "$gte" => ordered(value, arg, |o| o != Ordering::Less),
            "$lt" => ordered(value, arg, |o| o == Ordering::Less),
            "$lte" => ordered(value, arg, |o| o != Ordering::Greater),
            other => return Err(StoreError::UnsupportedOperator(other.to_string())),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn in_list(value: Option<&Bson>, op: &str, arg: &Bson) -> Result<bool, StoreError> {
    let Bson::Array(candidates) = arg else {
        return Err(StoreError::InvalidRequest(format!("{op} expects an array")));
    };
    Ok(candidates.iter().any(|candidate| equals(value, candidate)))
}

fn ordered(value: Option<&Bson>, arg: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    value
        .and_then(|v| compare(v, arg))
        .is_some_and(accept)
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null => false,
        _ => true,
    }
}

/// Equality with the store's array semantics: a scalar target matches an
/// array field containing it, and `null` matches a missing field.
fn equals(value: Option<&Bson>, target: &Bson) -> bool {
    match value {
        None => matches!(target, Bson::Null),
        Some(Bson::Array(items)) if !matches!(target, Bson::Array(_)) => {
            items.iter().any(|item| same(item, target))
        }
        Some(v) => same(v, target),
    }
}

fn same(a: &Bson, b: &Bson) -> bool {
    a == b || compare(a, b) == Some(Ordering::Equal)
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Ordering between comparable values of the same BSON family.
pub(crate) fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.timestamp_millis().cmp(&y.timestamp_millis())),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Apply an operator update document in place.
pub(crate) fn apply_update(doc: &mut Document, update: &Document) -> Result<UpdateEffect, StoreError> {
    if update.is_empty() {
        return Err(StoreError::InvalidRequest("empty update document".into()));
    }

    let mut effect = UpdateEffect::default();
    for (op, arg) in update {
        let Bson::Document(fields) = arg else {
            return Err(StoreError::InvalidRequest(format!(
                "{op} expects a document, found {arg}"
            )));
        };
        for (field, value) in fields {
            if field == "_id" {
                return Err(StoreError::InvalidRequest("`_id` is immutable".into()));
            }
            match op.as_str() {
                "$set" => {
                    if doc.get(field) != Some(value) {
                        doc.insert(field.clone(), value.clone());
                        effect.modified = true;
                    }
                }
                "$unset" => {
                    if doc.remove(field).is_some() {
                        effect.modified = true;
                    }
                }
                "$addToSet" => match doc.get_mut(field) {
                    None => {
                        doc.insert(field.clone(), Bson::Array(vec![value.clone()]));
                        effect.modified = true;
                        effect.arrays_changed = true;
                    }
                    Some(Bson::Array(items)) => {
                        if !items.iter().any(|item| same(item, value)) {
                            items.push(value.clone());
                            effect.modified = true;
                            effect.arrays_changed = true;
                        }
                    }
                    Some(other) => {
                        return Err(StoreError::InvalidRequest(format!(
                            "cannot $addToSet on non-array field `{field}` ({other})"
                        )));
                    }
                },
                "$pull" => match doc.get_mut(field) {
                    None => {}
                    Some(Bson::Array(items)) => {
                        let before = items.len();
                        items.retain(|item| !same(item, value));
                        if items.len() != before {
                            effect.modified = true;
                            effect.arrays_changed = true;
                        }
                    }
                    Some(other) => {
                        return Err(StoreError::InvalidRequest(format!(
                            "cannot $pull from non-array field `{field}` ({other})"
                        )));
                    }
                },
                other if other.starts_with('$') => {
                    return Err(StoreError::UnsupportedOperator(other.to_string()));
                }
                _ => {
                    return Err(StoreError::InvalidRequest(
                        "replacement documents are not supported; use update operators".into(),
                    ));
                }
            }
        }
    }
    Ok(effect)
}

/// Apply an inclusion or exclusion projection.
pub(crate) fn project(doc: &Document, projection: &Document) -> Document {
    if projection.is_empty() {
        return doc.clone();
    }
    let keep_id = projection.get("_id").is_none_or(truthy);
    let mut others = projection.iter().filter(|(k, _)| k.as_str() != "_id").peekable();
    let include = if others.peek().is_none() {
        keep_id
    } else {
        others.any(|(_, v)| truthy(v))
    };

    if include {
        doc.iter()
            .filter(|(k, _)| {
                (k.as_str() == "_id" && keep_id) || projection.get(k.as_str()).is_some_and(truthy)
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    } else {
        doc.iter()
            .filter(|(k, _)| {
                if k.as_str() == "_id" {
                    keep_id
                } else {
                    !projection.contains_key(k.as_str())
                }
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Stable sort by `{field: 1 | -1, ...}`; missing values sort first.
pub(crate) fn sort(docs: &mut [Document], spec: &Document) {
    docs.sort_by(|a, b| {
        for (field, direction) in spec {
            let ordering = match (lookup(a, field), lookup(b, field)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
            };
            let ordering = if as_number(direction).is_some_and(|d| d < 0.0) {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use bson::oid::ObjectId;

    #[test]
    fn equality_and_operators() {
        let d = doc! { "name": "ada", "age": 36, "tags": ["a", "b"], "owner": { "plan": "pro" } };

        assert!(matches(&d, &doc! { "name": "ada" }).unwrap());
        assert!(matches(&d, &doc! { "tags": "b" }).unwrap());
        assert!(matches(&d, &doc! { "owner.plan": "pro" }).unwrap());
        assert!(matches(&d, &doc! { "age": { "$gte": 36_i64, "$lt": 40.0 } }).unwrap());
        assert!(matches(&d, &doc! { "name": { "$in": ["x", "ada"] } }).unwrap());
        assert!(matches(&d, &doc! { "missing": { "$exists": false } }).unwrap());
        assert!(matches(&d, &doc! { "missing": Bson::Null }).unwrap());
        assert!(!matches(&d, &doc! { "name": { "$ne": "ada" } }).unwrap());
        assert!(matches(&d, &doc! { "$or": [ { "name": "x" }, { "age": 36 } ] }).unwrap());
    }

    #[test]
    fn unknown_operator_is_an_error() {
        let err = matches(&doc! { "a": 1 }, &doc! { "a": { "$regex": "x" } }).unwrap_err();
        assert_eq!(err, StoreError::UnsupportedOperator("$regex".into()));
    }

    #[test]
    fn add_to_set_and_pull_report_array_changes() {
        let member = ObjectId::new();
        let mut d = doc! { "members": [] };

        let effect = apply_update(&mut d, &doc! { "$addToSet": { "members": member } }).unwrap();
        assert!(effect.modified && effect.arrays_changed);

        let again = apply_update(&mut d, &doc! { "$addToSet": { "members": member } }).unwrap();
        assert!(!again.modified);

        let pulled = apply_update(&mut d, &doc! { "$pull": { "members": member } }).unwrap();
        assert!(pulled.arrays_changed);
        assert_eq!(d, doc! { "members": [] });
    }

    #[test]
    fn set_is_a_no_op_when_value_is_unchanged() {
        let mut d = doc! { "a": 1 };
        assert!(!apply_update(&mut d, &doc! { "$set": { "a": 1 } }).unwrap().modified);
        assert!(apply_update(&mut d, &doc! { "$set": { "a": 2 } }).unwrap().modified);
    }

    #[test]
    fn replacement_and_id_changes_are_rejected() {
        let mut d = doc! { "_id": ObjectId::new() };
        assert!(apply_update(&mut d, &doc! { "a": 1 }).is_err());
        assert!(apply_update(&mut d, &doc! { "$set": { "_id": ObjectId::new() } }).is_err());
    }

    #[test]
    fn projection_modes() {
        let id = ObjectId::new();
        let d = doc! { "_id": id, "a": 1, "b": 2 };
        assert_eq!(project(&d, &doc! { "_id": 1 }), doc! { "_id": id });
        assert_eq!(project(&d, &doc! { "a": 1 }), doc! { "_id": id, "a": 1 });
        assert_eq!(project(&d, &doc! { "b": 0 }), doc! { "_id": id, "a": 1 });
    }

    #[test]
    fn sort_orders_by_spec() {
        let mut docs = vec![doc! { "n": 2 }, doc! { "n": 1 }, doc! {}, doc! { "n": 3 }];
        sort(&mut docs, &doc! { "n": -1 });
        assert_eq!(docs[0], doc! { "n": 3 });
        assert_eq!(docs[3], doc! {});
    }
}
