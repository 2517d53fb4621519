//! Flattening of nested statistics payloads into metric paths.
//!
//! Daemon admin interfaces and pool statistics come back as trees of named
//! values. Metric sinks identify a series by a flat dotted name. This module is
//! the translation layer between the two:
//!
//! ```text
//! {"get": 60910, "wait": {"avgcount": 0, "sum": 0}}
//!
//!   (["get"], 60910)
//!   (["wait", "avgcount"], 0)
//!   (["wait", "sum"], 0)
//! ```
//!
//! Keys are always visited in ascending lexicographic order (byte order of the
//! key string), never in input order. Two runs over the same payload produce
//! the same sequence, so tests can assert exact lists.
//!
//! Payloads enter as JSON. [`NestedValue::from_json_lossy`] is the scoped
//! conversion used by collectors: a malformed subtree (array, bool, null) is
//! dropped and reported while its siblings are kept.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Segment used for a bare leaf flattened without any prefix.
pub const ROOT_LEAF_SEGMENT: &str = "value";

/// A leaf value of a statistics payload.
///
/// The flattener never converts between variants; coercion to `f64` happens
/// only when a metric is published (see [`Scalar::as_f64`]).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Numeric string, e.g. `"0.000125"` as reported by some admin commands.
    Text(String),
}

impl Scalar {
    /// Numeric value of this scalar, or `None` for text that is not a finite
    /// number (`"NaN"` and `"inf"` included).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(*v as f64),
            Scalar::UInt(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            Scalar::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::UInt(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<u64> for Scalar {
    fn from(v: u64) -> Self {
        Scalar::UInt(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

/// Ordered key segments from the root of a payload to one of its leaves.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path(Vec<String>);

impl Path {
    /// Creates an empty path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a path from a list of segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Returns a new path with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.extend(self.0.iter().cloned());
        segments.push(segment.into());
        Self(segments)
    }

    /// Appends `segment` in place.
    pub fn push(&mut self, segment: impl Into<String>) {
        self.0.push(segment.into());
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Joins the segments with `sep` (`.` for metric names).
    pub fn join(&self, sep: &str) -> String {
        self.0.join(sep)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.join("."))
        }
    }
}

impl<S: Into<String>> FromIterator<S> for Path {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_segments(iter)
    }
}

/// Ordered `(path, leaf)` pairs produced by [`flatten`].
pub type FlattenResult = Vec<(Path, Scalar)>;

/// JSON value kinds that cannot be represented as a [`NestedValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedKind {
    Array,
    Bool,
    Null,
}

impl fmt::Display for MalformedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedKind::Array => f.write_str("array"),
            MalformedKind::Bool => f.write_str("boolean"),
            MalformedKind::Null => f.write_str("null"),
        }
    }
}

/// Error raised for a value that is neither a scalar leaf nor a mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum FlattenError {
    /// The value at `path` is out of contract; its subtree is skipped.
    MalformedInput { path: Path, kind: MalformedKind },
}

impl fmt::Display for FlattenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlattenError::MalformedInput { path, kind } => {
                write!(f, "malformed input at {}: unexpected {}", path, kind)
            }
        }
    }
}

impl std::error::Error for FlattenError {}

/// A statistics payload: either a scalar leaf or a mapping of named children.
///
/// Branch keys are held in a `BTreeMap`, so iteration is lexicographic by
/// construction regardless of the order keys arrived in.
#[derive(Debug, Clone, PartialEq)]
pub enum NestedValue {
    Leaf(Scalar),
    Branch(BTreeMap<String, NestedValue>),
}

impl Default for NestedValue {
    fn default() -> Self {
        NestedValue::Branch(BTreeMap::new())
    }
}

impl NestedValue {
    /// Creates an empty branch.
    pub fn branch() -> Self {
        Self::default()
    }

    /// Builds a payload from JSON, failing on the first out-of-contract value.
    pub fn from_json(value: &Value) -> Result<Self, FlattenError> {
        let (nested, mut errors) = Self::from_json_lossy(value);
        if errors.is_empty() {
            Ok(nested)
        } else {
            Err(errors.swap_remove(0))
        }
    }

    /// Builds a payload from JSON, dropping malformed subtrees.
    ///
    /// Every dropped subtree is reported in the returned list, in
    /// lexicographic traversal order. A malformed root yields an empty branch.
    pub fn from_json_lossy(value: &Value) -> (Self, Vec<FlattenError>) {
        let mut errors = Vec::new();
        let nested = convert_json(value, &Path::new(), &mut errors).unwrap_or_default();
        (nested, errors)
    }

    /// Returns the child stored under `key`, if this is a branch.
    pub fn get(&self, key: &str) -> Option<&NestedValue> {
        match self {
            NestedValue::Branch(children) => children.get(key),
            NestedValue::Leaf(_) => None,
        }
    }

    /// Removes and returns the child stored under `key`, if this is a branch.
    pub fn remove(&mut self, key: &str) -> Option<NestedValue> {
        match self {
            NestedValue::Branch(children) => children.remove(key),
            NestedValue::Leaf(_) => None,
        }
    }

    /// Inserts a child. Returns `false` (and does nothing) on a leaf.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<NestedValue>) -> bool {
        match self {
            NestedValue::Branch(children) => {
                children.insert(key.into(), value.into());
                true
            }
            NestedValue::Leaf(_) => false,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            NestedValue::Leaf(s) => Some(s),
            NestedValue::Branch(_) => None,
        }
    }

}

impl From<Scalar> for NestedValue {
    fn from(value: Scalar) -> Self {
        NestedValue::Leaf(value)
    }
}

impl<K: Into<String>, V: Into<NestedValue>> FromIterator<(K, V)> for NestedValue {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        NestedValue::Branch(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

fn convert_json(value: &Value, path: &Path, errors: &mut Vec<FlattenError>) -> Option<NestedValue> {
    let malformed = |kind| FlattenError::MalformedInput {
        path: path.clone(),
        kind,
    };

    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            let mut children = BTreeMap::new();
            for (key, child) in entries {
                if let Some(nested) = convert_json(child, &path.child(key.as_str()), errors) {
                    children.insert(key.clone(), nested);
                }
            }
            Some(NestedValue::Branch(children))
        }
        Value::Number(n) => {
            let scalar = if let Some(v) = n.as_u64() {
                Scalar::UInt(v)
            } else if let Some(v) = n.as_i64() {
                Scalar::Int(v)
            } else {
                Scalar::Float(n.as_f64().unwrap_or(f64::NAN))
            };
            Some(NestedValue::Leaf(scalar))
        }
        Value::String(s) => Some(NestedValue::Leaf(Scalar::Text(s.clone()))),
        Value::Array(_) => {
            errors.push(malformed(MalformedKind::Array));
            None
        }
        Value::Bool(_) => {
            errors.push(malformed(MalformedKind::Bool));
            None
        }
        Value::Null => {
            errors.push(malformed(MalformedKind::Null));
            None
        }
    }
}

/// Flattens `value` into ordered `(path, leaf)` pairs, each path prefixed
/// with `prefix`.
///
/// A bare leaf yields a single pair whose path is `prefix`, or
/// `[ROOT_LEAF_SEGMENT]` when the prefix is empty. An empty branch yields
/// nothing.
pub fn flatten(value: &NestedValue, prefix: &Path) -> FlattenResult {
    let mut out = Vec::new();
    match value {
        NestedValue::Leaf(scalar) => {
            let path = if prefix.is_empty() {
                Path::from_segments([ROOT_LEAF_SEGMENT])
            } else {
                prefix.clone()
            };
            out.push((path, scalar.clone()));
        }
        NestedValue::Branch(children) => flatten_branch(children, prefix, &mut out),
    }
    out
}

/// Flattens `value` with an empty prefix.
pub fn flatten_root(value: &NestedValue) -> FlattenResult {
    flatten(value, &Path::new())
}

/// Converts a JSON payload and flattens whatever is well-formed.
///
/// Malformed subtrees are reported with their full path, including `prefix`.
pub fn flatten_json(value: &Value, prefix: &Path) -> (FlattenResult, Vec<FlattenError>) {
    let (nested, errors) = NestedValue::from_json_lossy(value);
    let errors = errors
        .into_iter()
        .map(|FlattenError::MalformedInput { path, kind }| {
            let mut full = prefix.clone();
            for segment in path.segments() {
                full.push(segment.as_str());
            }
            FlattenError::MalformedInput { path: full, kind }
        })
        .collect();
    (flatten(&nested, prefix), errors)
}

fn flatten_branch(
    children: &BTreeMap<String, NestedValue>,
    prefix: &Path,
    out: &mut FlattenResult,
) {
    for (key, child) in children {
        let path = prefix.child(key.as_str());
        match child {
            NestedValue::Leaf(scalar) => out.push((path, scalar.clone())),
            NestedValue::Branch(grandchildren) => flatten_branch(grandchildren, &path, out),
        }
    }
}
