//! record.rs - Flattening nested records into field paths and back.
//!
//! A record is a `serde_json::Value`. Its string, number, boolean and null
//! leaves are addressed by a `FieldPath` whose dotted form (`Model.0.email`) is
//! what policy rules match against. Empty objects and arrays are leaves too, so
//! `expand(flatten(v))` reproduces `v`.
//!
//! License: MIT OR APACHE 2.0

use serde_json::{Map, Value};
use std::fmt;

/// One step into a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => f.write_str(k),
            PathSegment::Index(i) => write!(f, "{}", i),
        }
    }
}

/// The location of a leaf inside a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath {
    pub segments: Vec<PathSegment>,
}

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// A new path one level deeper.
    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (n, segment) in self.segments.iter().enumerate() {
            if n > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

/// Lists every leaf of `record` with its path, in the map iteration order.
///
/// A scalar record is a single leaf at the root path.
pub fn flatten(record: &Value) -> Vec<(FieldPath, &Value)> {
    let mut leaves = Vec::new();
    flatten_into(record, FieldPath::root(), &mut leaves);
    leaves
}

fn flatten_into<'a>(value: &'a Value, path: FieldPath, leaves: &mut Vec<(FieldPath, &'a Value)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                flatten_into(child, path.child(PathSegment::Key(key.clone())), leaves);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(child, path.child(PathSegment::Index(index)), leaves);
            }
        }
        _ => leaves.push((path, value)),
    }
}

/// Rebuilds a record from `(path, leaf)` pairs.
///
/// `Key` segments create objects and `Index` segments arrays; gaps in an array
/// are filled with `null`. An empty list yields `null`.
pub fn expand(leaves: Vec<(FieldPath, Value)>) -> Value {
    let mut root = Value::Null;
    for (path, leaf) in leaves {
        insert(&mut root, &path.segments, leaf);
    }
    root
}

fn insert(slot: &mut Value, segments: &[PathSegment], leaf: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *slot = leaf;
        return;
    };
    match head {
        PathSegment::Key(key) => {
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(map) = slot {
                let child = map.entry(key.clone()).or_insert(Value::Null);
                insert(child, rest, leaf);
            }
        }
        PathSegment::Index(index) => {
            if !slot.is_array() {
                *slot = Value::Array(Vec::new());
            }
            if let Value::Array(items) = slot {
                if items.len() <= *index {
                    items.resize(index + 1, Value::Null);
                }
                insert(&mut items[*index], rest, leaf);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_paths() {
        let record = json!({
            "abc": "abc",
            "Model": {"name": "x", "tags": ["a", "b"], "empty": {}, "none": []},
        });
        let paths: Vec<String> = flatten(&record).iter().map(|(p, _)| p.to_string()).collect();
        assert_eq!(
            paths,
            vec!["Model.empty", "Model.name", "Model.none", "Model.tags.0", "Model.tags.1", "abc"]
        );
    }

    #[test]
    fn test_scalar_record_is_root_leaf() {
        let record = json!("x");
        let leaves = flatten(&record);
        assert_eq!(leaves.len(), 1);
        assert!(leaves[0].0.is_root());
        assert_eq!(leaves[0].0.to_string(), "");
    }

    #[test]
    fn test_expand_restores_shape() {
        let record = json!({
            "Model": {"list": [{"email": "a@b.c"}, null, 3], "flag": true, "empty": []},
            "n": 1.5,
        });
        let leaves: Vec<(FieldPath, Value)> = flatten(&record)
            .into_iter()
            .map(|(p, v)| (p, v.clone()))
            .collect();
        assert_eq!(expand(leaves), record);
    }

    #[test]
    fn test_expand_pads_sparse_arrays() {
        let path = FieldPath::root()
            .child(PathSegment::Key("a".into()))
            .child(PathSegment::Index(2));
        assert_eq!(expand(vec![(path, json!("x"))]), json!({"a": [null, null, "x"]}));
        assert_eq!(expand(Vec::new()), Value::Null);
    }
}
