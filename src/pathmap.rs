use std::fmt;

use serde_json::Value;

use crate::error::MergeError;

/// Dotted-path read over a JSON tree. Returns `None` when any key along
/// the path is absent; a present-but-null leaf is returned as `Null`.
pub fn get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for key in path.split('.') {
        current = current.as_object()?.get(key)?;
    }
    Some(current)
}

pub fn get_str<'a>(value: &'a Value, path: &str) -> Option<&'a str> {
    get(value, path).and_then(Value::as_str)
}

/// One step of a merge-target path: either a mapping key or a sequence
/// index. Indexed segments are what let enrichments address a numbered
/// container slot inside a rendered pod spec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A typed merge-target path, e.g. `spec.template.spec.containers[0]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathSpec {
    segments: Vec<Segment>,
}

impl PathSpec {
    pub fn root() -> Self {
        PathSpec::default()
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.segments.push(Segment::Key(key.into()));
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.segments.push(Segment::Index(index));
        self
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, ".");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{key}")?;
                }
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// A merge staged against a rendered manifest: `value` is merged into
/// the node addressed by `at`.
#[derive(Clone, Debug)]
pub struct Enrichment {
    pub at: PathSpec,
    pub value: Value,
}

impl Enrichment {
    pub fn new(at: PathSpec, value: Value) -> Self {
        Enrichment { at, value }
    }

    /// Merge into the manifest root.
    pub fn root(value: Value) -> Self {
        Enrichment {
            at: PathSpec::root(),
            value,
        }
    }
}

/// Apply enrichments in order. Fails fast; a failed enrichment leaves
/// the body as the previous enrichment left it.
pub fn enrich(body: &mut Value, enrichments: &[Enrichment]) -> Result<(), MergeError> {
    for enrichment in enrichments {
        merge_at(body, &enrichment.at, &enrichment.value)?;
    }
    Ok(())
}

/// Recursively fold `right` into `left`: absent keys are inserted, maps
/// recurse, sequences append, scalars are overwritten by `right`. A type
/// mismatch is an error, and compatibility is checked for the whole tree
/// before anything is written, so a failed merge never mutates `left`.
pub fn merge(left: &mut Value, right: &Value) -> Result<(), MergeError> {
    let mut path = String::new();
    check_compatible(left, right, &mut path)?;
    apply(left, right);
    Ok(())
}

/// Descend `left` along `path`, then `merge` the addressed node.
pub fn merge_at(left: &mut Value, path: &PathSpec, right: &Value) -> Result<(), MergeError> {
    // Walked-path prefixes for error reporting, one per segment.
    let mut walked = PathSpec::root();
    let prefixes: Vec<String> = path
        .segments()
        .iter()
        .map(|segment| {
            walked = match segment {
                Segment::Key(key) => std::mem::take(&mut walked).key(key.clone()),
                Segment::Index(index) => std::mem::take(&mut walked).index(*index),
            };
            walked.to_string()
        })
        .collect();

    let target = path
        .segments()
        .iter()
        .zip(&prefixes)
        .try_fold(left, |value, (segment, prefix)| match (value, segment) {
            (Value::Object(map), Segment::Key(key)) => {
                map.get_mut(key).ok_or_else(|| MergeError::MissingPath {
                    path: prefix.clone(),
                })
            }
            (Value::Array(items), Segment::Index(index)) => {
                items
                    .get_mut(*index)
                    .ok_or_else(|| MergeError::IndexOutOfBounds {
                        path: prefix.clone(),
                        index: *index,
                    })
            }
            _ => Err(MergeError::TypeMismatch {
                path: prefix.clone(),
            }),
        })?;
    merge(target, right)
}

fn check_compatible(left: &Value, right: &Value, path: &mut String) -> Result<(), MergeError> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(()),
        (Value::Object(lmap), Value::Object(rmap)) => {
            for (key, rvalue) in rmap {
                if let Some(lvalue) = lmap.get(key) {
                    let rollback = path.len();
                    if !path.is_empty() {
                        path.push('.');
                    }
                    path.push_str(key);
                    check_compatible(lvalue, rvalue, path)?;
                    path.truncate(rollback);
                }
            }
            Ok(())
        }
        (Value::Array(_), Value::Array(_)) => Ok(()),
        (Value::Bool(_), Value::Bool(_)) => Ok(()),
        (Value::Number(_), Value::Number(_)) => Ok(()),
        (Value::String(_), Value::String(_)) => Ok(()),
        _ => Err(MergeError::TypeMismatch {
            path: if path.is_empty() {
                ".".to_string()
            } else {
                path.clone()
            },
        }),
    }
}

fn apply(left: &mut Value, right: &Value) {
    match (left, right) {
        (Value::Object(lmap), Value::Object(rmap)) => {
            for (key, rvalue) in rmap {
                match lmap.get_mut(key) {
                    Some(lvalue) if !lvalue.is_null() => apply(lvalue, rvalue),
                    _ => {
                        lmap.insert(key.clone(), rvalue.clone());
                    }
                }
            }
        }
        (Value::Array(litems), Value::Array(ritems)) => {
            litems.extend(ritems.iter().cloned());
        }
        (left, right) => *left = right.clone(),
    }
}

/// Lowercase `raw` and collapse every run of characters outside
/// `[-a-z0-9]` into a single `-`, yielding a DNS-safe name component.
pub fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut in_run = false;
    for c in raw.to_lowercase().chars() {
        if c == '-' || c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
            in_run = false;
        } else if !in_run {
            slug.push('-');
            in_run = true;
        }
    }
    slug
}
