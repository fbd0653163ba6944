//! Path parsing and JSON-tree addressing for the store.

use calm_common::StoreError;
use serde_json::{Map, Value};

/// Split a `/`-separated path into validated segments.
///
/// Leading and trailing slashes are ignored. Segments must be non-empty and
/// free of `.`, `#`, `$`, `[`, `]` and control characters.
pub fn split_path(path: &str) -> Result<Vec<&str>, StoreError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    let segments: Vec<&str> = trimmed.split('/').collect();
    for segment in &segments {
        if segment.is_empty()
            || segment
                .chars()
                .any(|c| matches!(c, '.' | '#' | '$' | '[' | ']') || c.is_control())
        {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
    }
    Ok(segments)
}

/// Normalized form of a path, used as a map key.
pub fn normalize(path: &str) -> Result<String, StoreError> {
    Ok(split_path(path)?.join("/"))
}

/// True when one path is an ancestor of (or equal to) the other.
pub fn related(a: &[&str], b: &[&str]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

pub fn get_at<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments {
        node = node.as_object()?.get(*segment)?;
    }
    if node.is_null() {
        None
    } else {
        Some(node)
    }
}

/// Replace the value at `segments`. `Value::Null` removes it and prunes any
/// parents left empty.
pub fn set_at(root: &mut Value, segments: &[&str], value: Value) {
    if segments.is_empty() {
        return;
    }
    if value.is_null() {
        remove_at(root, segments);
        return;
    }
    let mut node = root;
    for segment in &segments[..segments.len() - 1] {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        node = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let (Value::Object(map), Some(last)) = (node, segments.last()) {
        map.insert(last.to_string(), value);
    }
}

fn remove_at(node: &mut Value, segments: &[&str]) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return false;
    };
    let Value::Object(map) = node else {
        return false;
    };
    if rest.is_empty() {
        map.remove(*first);
    } else if let Some(child) = map.get_mut(*first) {
        if remove_at(child, rest) {
            map.remove(*first);
        }
    }
    map.is_empty()
}
