use crate::core::{Document, KEY_FIELD, StoreError, StoreResult, Value};
use std::cmp::Ordering;

/// Modifiers the store understands.
pub const UPDATE_OPERATORS: &[&str] = &["$set", "$unset", "$inc", "$min", "$max", "$push"];

/// Apply a modifier document (`{"$set": {...}, "$inc": {...}}`) to `doc` in place.
///
/// The whole update is checked before any field changes, so a rejected update leaves
/// the document untouched.
pub fn apply_update(doc: &mut Document, update: &Document) -> StoreResult<()> {
    validate_update(update)?;

    let mut working = doc.clone();
    for (op, fields) in update {
        let Value::Document(fields) = fields else {
            continue;
        };
        for (path, operand) in fields {
            match op.as_str() {
                "$set" => set_path(&mut working, path, operand.clone())?,
                "$unset" => unset_path(&mut working, path),
                "$inc" => increment(&mut working, path, operand)?,
                "$min" => keep_extreme(&mut working, path, operand, Ordering::Less)?,
                "$max" => keep_extreme(&mut working, path, operand, Ordering::Greater)?,
                "$push" => push(&mut working, path, operand)?,
                other => return Err(StoreError::InvalidUpdate(format!("unknown modifier: {other}"))),
            }
        }
    }
    *doc = working;
    Ok(())
}

/// Structural checks shared by every update path.
pub fn validate_update(update: &Document) -> StoreResult<()> {
    if update.is_empty() {
        return Err(StoreError::InvalidUpdate("update document must not be empty".into()));
    }
    for (op, fields) in update {
        if !op.starts_with('$') {
            return Err(StoreError::InvalidUpdate(format!(
                "update document requires atomic operators, found '{op}'"
            )));
        }
        if !UPDATE_OPERATORS.contains(&op.as_str()) {
            return Err(StoreError::InvalidUpdate(format!("unknown modifier: {op}")));
        }
        let Value::Document(fields) = fields else {
            return Err(StoreError::InvalidUpdate(format!("modifier {op} expects an object")));
        };
        for path in fields.keys() {
            if path == KEY_FIELD || path.starts_with("_id.") {
                return Err(StoreError::ImmutableField(KEY_FIELD.to_string()));
            }
            if path.is_empty() || path.split('.').any(str::is_empty) {
                return Err(StoreError::InvalidUpdate(format!("empty path segment in '{path}'")));
            }
        }
    }
    Ok(())
}

fn parent_mut<'a>(doc: &'a mut Document, path: &str, create: bool) -> StoreResult<Option<(&'a mut Document, String)>> {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(last) = segments.pop() else {
        return Ok(None);
    };
    let mut current = doc;
    for segment in segments {
        if !current.contains_key(segment) {
            if !create {
                return Ok(None);
            }
            current.insert(segment.to_string(), Value::Document(Document::new()));
        }
        current = match current.get_mut(segment) {
            Some(Value::Document(inner)) => inner,
            Some(other) if create => {
                return Err(StoreError::InvalidUpdate(format!(
                    "cannot create field '{last}' in element {{{segment}: {other}}}"
                )));
            }
            _ => return Ok(None),
        };
    }
    Ok(Some((current, last.to_string())))
}

fn set_path(doc: &mut Document, path: &str, value: Value) -> StoreResult<()> {
    if let Some((parent, field)) = parent_mut(doc, path, true)? {
        parent.insert(field, value);
    }
    Ok(())
}

fn unset_path(doc: &mut Document, path: &str) {
    if let Ok(Some((parent, field))) = parent_mut(doc, path, false) {
        parent.remove(&field);
    }
}

fn current_value<'a>(doc: &'a mut Document, path: &str) -> StoreResult<(&'a mut Document, String)> {
    parent_mut(doc, path, true)?
        .ok_or_else(|| StoreError::InvalidUpdate(format!("cannot resolve path '{path}'")))
}

fn increment(doc: &mut Document, path: &str, operand: &Value) -> StoreResult<()> {
    if !operand.is_numeric() {
        return Err(StoreError::InvalidUpdate(format!(
            "cannot increment with non-numeric argument: {{{path}: {operand}}}"
        )));
    }
    let (parent, field) = current_value(doc, path)?;
    let next = match (parent.get(&field), operand) {
        (None, _) => operand.clone(),
        (Some(Value::Integer(a)), Value::Integer(b)) => match a.checked_add(*b) {
            Some(sum) => Value::Integer(sum),
            None => Value::Float(*a as f64 + *b as f64),
        },
        (Some(existing), _) if existing.is_numeric() => {
            Value::Float(existing.as_f64().unwrap_or_default() + operand.as_f64().unwrap_or_default())
        }
        (Some(existing), _) => {
            return Err(StoreError::InvalidUpdate(format!(
                "cannot apply $inc to a value of non-numeric type {}",
                existing.type_name()
            )));
        }
    };
    parent.insert(field, next);
    Ok(())
}

fn keep_extreme(doc: &mut Document, path: &str, operand: &Value, wanted: Ordering) -> StoreResult<()> {
    let (parent, field) = current_value(doc, path)?;
    let replace = match parent.get(&field) {
        None => true,
        Some(existing) => operand.cmp(existing) == wanted,
    };
    if replace {
        parent.insert(field, operand.clone());
    }
    Ok(())
}

fn push(doc: &mut Document, path: &str, operand: &Value) -> StoreResult<()> {
    let items: Vec<Value> = match operand {
        Value::Document(spec) if spec.len() == 1 && spec.contains_key("$each") => match &spec["$each"] {
            Value::Array(each) => each.clone(),
            _ => return Err(StoreError::InvalidUpdate("$each requires an array".into())),
        },
        other => vec![other.clone()],
    };
    let (parent, field) = current_value(doc, path)?;
    match parent.get_mut(&field) {
        None => {
            parent.insert(field, Value::Array(items));
        }
        Some(Value::Array(existing)) => existing.extend(items),
        Some(other) => {
            return Err(StoreError::InvalidUpdate(format!(
                "the field '{path}' must be an array but is of type {}",
                other.type_name()
            )));
        }
    }
    Ok(())
}
