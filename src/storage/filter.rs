//! Query predicate evaluation over stored documents.
//!
//! Supported: implicit equality, `$eq $ne $gt $gte $lt $lte $in $nin $exists` per field and
//! `$and $or $nor` at any document level. Dotted paths reach into nested documents. A
//! condition on a field holding an array matches when any element satisfies it.

use crate::core::{Document, StoreError, StoreResult, Value, lookup_path};
use std::cmp::Ordering;

pub fn matches(doc: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let clauses = clauses(key, condition)?;
                let mut all = true;
                for clause in clauses {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_clause(doc, clauses(key, condition)?)?,
            "$nor" => !any_clause(doc, clauses(key, condition)?)?,
            op if op.starts_with('$') => {
                return Err(StoreError::BadQuery(format!("unknown top level operator: {op}")));
            }
            path => field_matches(lookup_path(doc, path), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Validate the whole filter: every key, every logical clause and every operator, whatever
/// the data. Callers run this before `matches`, which stops at the first failing condition.
pub fn check(filter: &Document) -> StoreResult<()> {
    for (key, condition) in filter {
        match key.as_str() {
            "$and" | "$or" | "$nor" => {
                for clause in clauses(key, condition)? {
                    check(clause)?;
                }
            }
            op if op.starts_with('$') => {
                return Err(StoreError::BadQuery(format!("unknown top level operator: {op}")));
            }
            _ => check_condition(condition)?,
        }
    }
    Ok(())
}

fn check_condition(condition: &Value) -> StoreResult<()> {
    let Some(operators) = is_operator_document(condition) else {
        return Ok(());
    };
    for (op, operand) in operators {
        match op.as_str() {
            "$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" => {}
            "$in" | "$nin" => {
                if !matches!(operand, Value::Array(_)) {
                    return Err(StoreError::BadQuery(format!("{op} needs an array")));
                }
            }
            "$exists" => {
                if !matches!(operand, Value::Boolean(_)) {
                    return Err(StoreError::BadQuery("$exists expects a boolean".into()));
                }
            }
            other => return Err(StoreError::BadQuery(format!("unknown operator: {other}"))),
        }
    }
    Ok(())
}

fn clauses<'a>(op: &str, condition: &'a Value) -> StoreResult<Vec<&'a Document>> {
    let Value::Array(items) = condition else {
        return Err(StoreError::BadQuery(format!("{op} must be an array")));
    };
    if items.is_empty() {
        return Err(StoreError::BadQuery(format!("{op} must be a nonempty array")));
    }
    items
        .iter()
        .map(|item| {
            item.as_document()
                .ok_or_else(|| StoreError::BadQuery(format!("{op} entries must be objects")))
        })
        .collect()
}

fn any_clause(doc: &Document, clauses: Vec<&Document>) -> StoreResult<bool> {
    for clause in clauses {
        if matches(doc, clause)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn is_operator_document(value: &Value) -> Option<&Document> {
    match value {
        Value::Document(doc) if !doc.is_empty() && doc.keys().all(|k| k.starts_with('$')) => Some(doc),
        _ => None,
    }
}

fn field_matches(actual: Option<&Value>, condition: &Value) -> StoreResult<bool> {
    let Some(operators) = is_operator_document(condition) else {
        return Ok(equals(actual, condition));
    };

    for (op, operand) in operators {
        let ok = match op.as_str() {
            "$eq" => equals(actual, operand),
            "$ne" => !equals(actual, operand),
            "$gt" => compares(actual, operand, |o| o == Ordering::Greater),
            "$gte" => compares(actual, operand, |o| o != Ordering::Less),
            "$lt" => compares(actual, operand, |o| o == Ordering::Less),
            "$lte" => compares(actual, operand, |o| o != Ordering::Greater),
            "$in" => in_list(actual, op, operand)?,
            "$nin" => !in_list(actual, op, operand)?,
            "$exists" => match operand {
                Value::Boolean(expected) => actual.is_some() == *expected,
                _ => return Err(StoreError::BadQuery("$exists expects a boolean".into())),
            },
            other => return Err(StoreError::BadQuery(format!("unknown operator: {other}"))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(value) if value == expected => true,
        Some(Value::Array(items)) => items.iter().any(|item| item == expected),
        Some(_) => false,
    }
}

fn compares(actual: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |value: &Value| value.compare_same_kind(operand).is_some_and(&accept);
    match actual {
        None => false,
        Some(Value::Array(items)) if !matches!(operand, Value::Array(_)) => items.iter().any(check),
        Some(value) => check(value),
    }
}

fn in_list(actual: Option<&Value>, op: &str, operand: &Value) -> StoreResult<bool> {
    let Value::Array(candidates) = operand else {
        return Err(StoreError::BadQuery(format!("{op} needs an array")));
    };
    Ok(candidates.iter().any(|candidate| equals(actual, candidate)))
}
