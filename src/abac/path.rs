//! Dotted-path access into nested JSON objects.
//!
//! Paths use `.` as the separator (`"profile.address.city"`). Only objects are
//! traversed; a segment that lands on anything else ends the walk.

use serde_json::Value;

/// Walk `obj` along `path`. Returns `None` as soon as a segment is missing.
///
/// A key that exists with a `null` value is found (`Some(&Value::Null)`).
pub fn get_attribute_by_path<'a>(obj: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = obj;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Create or overwrite the leaf at `path`.
///
/// Every segment before the leaf must already exist and be an object; returns
/// `false` without touching `obj` otherwise.
pub fn set_attribute_by_path(obj: &mut Value, path: &str, value: Value) -> bool {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (parent_mut(obj, parent), leaf),
        None => (Some(obj), path),
    };

    match parent.and_then(Value::as_object_mut) {
        Some(map) => {
            map.insert(leaf.to_string(), value);
            true
        }
        None => false,
    }
}

/// Remove the leaf at `path`, or replace it with `null` when `keep_key_as_nil`
/// is set. Returns the previous value if the leaf existed.
pub fn remove_map_attribute_by_path(
    obj: &mut Value,
    path: &str,
    keep_key_as_nil: bool,
) -> Option<Value> {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (parent_mut(obj, parent)?, leaf),
        None => (obj, path),
    };
    let map = parent.as_object_mut()?;

    if keep_key_as_nil {
        let slot = map.get_mut(leaf)?;
        Some(std::mem::replace(slot, Value::Null))
    } else {
        map.shift_remove(leaf)
    }
}

/// Returns the subset of `mask` paths that resolve inside `obj`.
pub fn check_mask(obj: &Value, mask: &[String]) -> Vec<String> {
    mask.iter()
        .filter(|path| get_attribute_by_path(obj, path).is_some())
        .cloned()
        .collect()
}

fn parent_mut<'a>(obj: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = obj;
    for segment in path.split('.') {
        current = current.as_object_mut()?.get_mut(segment)?;
    }
    Some(current)
}
