//! Field-level diff between two flat snapshots.
//!
//! Keys are classified as added, removed or modified; keys whose values are
//! canonically equal are left out. Canonical equality ignores object key order
//! and compares numbers by value, so `{"a":1,"b":2}` equals `{"b":2,"a":1.0}`.

use crate::Snapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::btree_map::{self, BTreeMap};
use std::collections::BTreeSet;

/// Classification of one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DiffEntry {
    Added { new: Value },
    Removed { old: Value },
    Modified { old: Value, new: Value },
}

impl DiffEntry {
    pub fn kind(&self) -> DiffKind {
        match self {
            DiffEntry::Added { .. } => DiffKind::Added,
            DiffEntry::Removed { .. } => DiffKind::Removed,
            DiffEntry::Modified { .. } => DiffKind::Modified,
        }
    }

    pub fn old_value(&self) -> Option<&Value> {
        match self {
            DiffEntry::Added { .. } => None,
            DiffEntry::Removed { old } | DiffEntry::Modified { old, .. } => Some(old),
        }
    }

    pub fn new_value(&self) -> Option<&Value> {
        match self {
            DiffEntry::Removed { .. } => None,
            DiffEntry::Added { new } | DiffEntry::Modified { new, .. } => Some(new),
        }
    }
}

/// Row tag for side-by-side rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Added,
    Removed,
    Modified,
    Unchanged,
}

/// One row of a side-by-side comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SideBySideRow<'a> {
    pub key: &'a str,
    pub kind: DiffKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<&'a Value>,
}

/// Result of [`compute_diff`], keyed by field name in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diff {
    entries: BTreeMap<String, DiffEntry>,
}

impl Diff {
    pub fn get(&self, key: &str) -> Option<&DiffEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vertical listing: changed keys only, sorted.
    pub fn inline(&self) -> btree_map::Iter<'_, String, DiffEntry> {
        self.entries.iter()
    }

    /// Side-by-side rows over the sorted key union of both snapshots,
    /// unchanged keys included.
    ///
    /// `old` and `new` must be the snapshots this diff was computed from.
    pub fn side_by_side<'a>(&'a self, old: &'a Snapshot, new: &'a Snapshot) -> Vec<SideBySideRow<'a>> {
        let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
        keys.into_iter()
            .map(|key| SideBySideRow {
                key: key.as_str(),
                kind: self
                    .entries
                    .get(key)
                    .map_or(DiffKind::Unchanged, DiffEntry::kind),
                old: old.get(key),
                new: new.get(key),
            })
            .collect()
    }
}

impl IntoIterator for Diff {
    type Item = (String, DiffEntry);
    type IntoIter = btree_map::IntoIter<String, DiffEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Compare two flat snapshots key by key.
pub fn compute_diff(old_values: &Snapshot, new_values: &Snapshot) -> Diff {
    let mut entries = BTreeMap::new();

    for (key, old) in old_values {
        match new_values.get(key) {
            None => {
                entries.insert(key.clone(), DiffEntry::Removed { old: old.clone() });
            }
            Some(new) if !canonical_eq(old, new) => {
                entries.insert(
                    key.clone(),
                    DiffEntry::Modified {
                        old: old.clone(),
                        new: new.clone(),
                    },
                );
            }
            Some(_) => {}
        }
    }

    for (key, new) in new_values {
        if !old_values.contains_key(key) {
            entries.insert(key.clone(), DiffEntry::Added { new: new.clone() });
        }
    }

    Diff { entries }
}

/// Structural equality that ignores object key order and numeric representation.
pub fn canonical_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return x == y;
            }
            if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                return x == y;
            }
            x.as_f64() == y.as_f64()
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| canonical_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| canonical_eq(x, y)))
        }
        _ => a == b,
    }
}

/// Display text for a value: strings unquoted, everything else compact JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
    }
}
