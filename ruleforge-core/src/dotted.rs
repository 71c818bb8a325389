//! Dotted-path addressing into JSON values (`check.inputs.threshold`).

use serde_json::{Map, Value};

/// Look up `path` inside `value`. An empty path returns `value` itself.
pub fn get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.')
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

/// Set `path` to `new`, creating intermediate objects as needed.
///
/// Fails when an intermediate segment exists but is not an object.
pub fn set(value: &mut Value, path: &str, new: Value) -> Result<(), String> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(format!("empty segment in path '{path}'"));
    }
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| "empty path".to_string())?;

    let mut current = value;
    for (depth, segment) in parents.iter().enumerate() {
        let object = current.as_object_mut().ok_or_else(|| {
            format!(
                "'{}' is not an object",
                segments[..depth].join(".")
            )
        })?;
        current = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
    }

    let object = current
        .as_object_mut()
        .ok_or_else(|| format!("'{}' is not an object", parents.join(".")))?;
    object.insert(last.to_string(), new);
    Ok(())
}

/// Remove `path`, returning the removed value. Missing paths are a no-op.
pub fn remove(value: &mut Value, path: &str) -> Option<Value> {
    let (parent_path, last) = match path.rsplit_once('.') {
        Some((parent, last)) => (Some(parent), last),
        None => (None, path),
    };
    let parent = match parent_path {
        Some(p) => get_mut(value, p)?,
        None => value,
    };
    parent.as_object_mut()?.shift_remove(last)
}

fn get_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.as_object_mut()?.get_mut(segment))
}
