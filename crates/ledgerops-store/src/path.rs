//! Path expressions over document values.
//!
//! A path is a root identifier followed by any number of `.key` and `[index]`
//! segments: `alice.balances[0].amount`. Identifiers are made of
//! alphanumerics, `_` and `-`; indices are non-negative decimal integers.
//!
//! Dynamic segments (`list[={len(%{list})}]`) are not part of this grammar:
//! the smart-value layer resolves them to text first and hands the result to
//! [`DataPath::parse`].
//!
//! Writes follow the sequence rule used by scene files to grow lists:
//! `index < len` overwrites, `index == len` appends, `index > len` fails.

use std::fmt;
use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char as pchar, digit1},
    combinator::{all_consuming, map, map_res},
    multi::many0,
    sequence::{delimited, preceded},
    IResult,
};

use crate::error::{Result, StoreError};
use crate::value::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    fn expected_container(&self) -> &'static str {
        match self {
            PathSegment::Key(_) => "map",
            PathSegment::Index(_) => "list",
        }
    }

    /// Container to create when this segment addresses a missing entry.
    fn empty_container(&self) -> Value {
        match self {
            PathSegment::Key(_) => Value::empty_map(),
            PathSegment::Index(_) => Value::List(Vec::new()),
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => f.write_str(k),
            PathSegment::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// A parsed path. Always non-empty and rooted at a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataPath {
    root: String,
    tail: Vec<PathSegment>,
}

impl DataPath {
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(StoreError::MalformedPath {
                path: text.to_string(),
                reason: "empty path".to_string(),
            });
        }
        match all_consuming(data_path)(trimmed) {
            Ok((_, path)) => Ok(path),
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                let offset = trimmed.len() - e.input.len();
                Err(StoreError::MalformedPath {
                    path: text.to_string(),
                    reason: format!("unexpected input at offset {offset}"),
                })
            }
            Err(nom::Err::Incomplete(_)) => Err(StoreError::MalformedPath {
                path: text.to_string(),
                reason: "incomplete path".to_string(),
            }),
        }
    }

    /// Single-segment path.
    pub fn key(name: impl Into<String>) -> Self {
        Self {
            root: name.into(),
            tail: Vec::new(),
        }
    }

    pub fn child(mut self, segment: PathSegment) -> Self {
        self.tail.push(segment);
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Segments after the root.
    pub fn tail(&self) -> &[PathSegment] {
        &self.tail
    }

    pub fn is_single(&self) -> bool {
        self.tail.is_empty()
    }

    /// The same path with its root removed, if anything remains.
    pub fn strip_root(&self) -> Option<DataPath> {
        let (first, rest) = self.tail.split_first()?;
        let root = match first {
            PathSegment::Key(k) => k.clone(),
            PathSegment::Index(i) => i.to_string(),
        };
        Some(DataPath {
            root,
            tail: rest.to_vec(),
        })
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root)?;
        for segment in &self.tail {
            match segment {
                PathSegment::Key(k) => write!(f, ".{k}")?,
                PathSegment::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for DataPath {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        DataPath::parse(s)
    }
}

// ============================================================================
// Parsing
// ============================================================================

fn is_key_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn key(input: &str) -> IResult<&str, String> {
    map(take_while1(is_key_char), |s: &str| s.to_string())(input)
}

fn index(input: &str) -> IResult<&str, usize> {
    delimited(
        pchar('['),
        map_res(digit1, |s: &str| s.parse::<usize>()),
        pchar(']'),
    )(input)
}

fn segment(input: &str) -> IResult<&str, PathSegment> {
    alt((
        map(preceded(pchar('.'), key), PathSegment::Key),
        map(index, PathSegment::Index),
    ))(input)
}

fn data_path(input: &str) -> IResult<&str, DataPath> {
    let (input, root) = key(input)?;
    let (input, tail) = many0(segment)(input)?;
    Ok((input, DataPath { root, tail }))
}

// ============================================================================
// Reads
// ============================================================================

fn list_position(key: &str) -> Option<usize> {
    key.parse::<usize>().ok()
}

fn step<'a>(node: &'a Value, segment: &PathSegment, path: &DataPath) -> Result<&'a Value> {
    let not_found = || StoreError::PathNotFound {
        path: path.to_string(),
        segment: segment.to_string(),
    };
    match (node, segment) {
        (Value::Map(m), PathSegment::Key(k)) => m.get(k).ok_or_else(not_found),
        (Value::Map(m), PathSegment::Index(i)) => m.get(&i.to_string()).ok_or_else(not_found),
        (Value::List(items), PathSegment::Index(i)) => items.get(*i).ok_or_else(not_found),
        (Value::List(items), PathSegment::Key(k)) => match list_position(k) {
            Some(i) => items.get(i).ok_or_else(not_found),
            None => Err(mismatch(node, segment, path)),
        },
        _ => Err(mismatch(node, segment, path)),
    }
}

fn mismatch(node: &Value, segment: &PathSegment, path: &DataPath) -> StoreError {
    StoreError::TypeMismatch {
        path: path.to_string(),
        segment: segment.to_string(),
        expected: segment.expected_container(),
        found: node.kind(),
    }
}

fn list_key_mismatch(segment: &PathSegment, path: &DataPath) -> StoreError {
    StoreError::TypeMismatch {
        path: path.to_string(),
        segment: segment.to_string(),
        expected: "map",
        found: "list",
    }
}

/// Follow `segments` from `node`.
pub fn get_segments<'a>(
    node: &'a Value,
    segments: &[PathSegment],
    path: &DataPath,
) -> Result<&'a Value> {
    segments
        .iter()
        .try_fold(node, |current, segment| step(current, segment, path))
}

/// Read the value addressed by `path` in a map-rooted document.
pub fn get_in<'a>(root: &'a Map, path: &DataPath) -> Result<&'a Value> {
    let first = root
        .get(path.root())
        .ok_or_else(|| StoreError::PathNotFound {
            path: path.to_string(),
            segment: path.root().to_string(),
        })?;
    get_segments(first, path.tail(), path)
}

// ============================================================================
// Writes
// ============================================================================

fn list_slot<'a>(
    items: &'a mut Vec<Value>,
    index: usize,
    next: &PathSegment,
    path: &DataPath,
) -> Result<&'a mut Value> {
    let len = items.len();
    if index < len {
        Ok(&mut items[index])
    } else if index == len {
        items.push(next.empty_container());
        Ok(&mut items[len])
    } else {
        Err(StoreError::IndexOutOfRange {
            path: path.to_string(),
            index,
            len,
        })
    }
}

fn descend<'a>(
    node: &'a mut Value,
    segment: &PathSegment,
    next: &PathSegment,
    path: &DataPath,
) -> Result<&'a mut Value> {
    let index = match (&*node, segment) {
        (Value::List(_), PathSegment::Index(i)) => Some(*i),
        (Value::List(_), PathSegment::Key(k)) => list_position(k),
        _ => None,
    };
    match (node, segment) {
        (Value::Map(m), PathSegment::Key(k)) => {
            Ok(m.entry(k.clone()).or_insert_with(|| next.empty_container()))
        }
        (Value::Map(m), PathSegment::Index(i)) => {
            Ok(m.entry(i.to_string()).or_insert_with(|| next.empty_container()))
        }
        (Value::List(items), _) => match index {
            Some(i) => list_slot(items, i, next, path),
            None => Err(list_key_mismatch(segment, path)),
        },
        (other, _) => Err(mismatch(other, segment, path)),
    }
}

fn assign(node: &mut Value, segment: &PathSegment, value: Value, path: &DataPath) -> Result<()> {
    let index = match (&*node, segment) {
        (Value::List(_), PathSegment::Index(i)) => Some(*i),
        (Value::List(_), PathSegment::Key(k)) => list_position(k),
        _ => None,
    };
    match (node, segment) {
        (Value::Map(m), PathSegment::Key(k)) => {
            m.insert(k.clone(), value);
            Ok(())
        }
        (Value::Map(m), PathSegment::Index(i)) => {
            m.insert(i.to_string(), value);
            Ok(())
        }
        (Value::List(items), _) => {
            let Some(index) = index else {
                return Err(list_key_mismatch(segment, path));
            };
            let len = items.len();
            if index < len {
                items[index] = value;
                Ok(())
            } else if index == len {
                items.push(value);
                Ok(())
            } else {
                Err(StoreError::IndexOutOfRange {
                    path: path.to_string(),
                    index,
                    len,
                })
            }
        }
        (other, _) => Err(mismatch(other, segment, path)),
    }
}

/// Write `value` at `segments` below `node`, creating missing containers.
pub fn set_segments(
    node: &mut Value,
    segments: &[PathSegment],
    value: Value,
    path: &DataPath,
) -> Result<()> {
    let Some((last, parents)) = segments.split_last() else {
        *node = value;
        return Ok(());
    };
    let mut current = node;
    for (i, segment) in parents.iter().enumerate() {
        current = descend(current, segment, &segments[i + 1], path)?;
    }
    assign(current, last, value, path)
}

/// Write `value` at `path` in a map-rooted document.
pub fn set_in(root: &mut Map, path: &DataPath, value: Value) -> Result<()> {
    match path.tail().first() {
        None => {
            root.insert(path.root().to_string(), value);
            Ok(())
        }
        Some(next) => {
            let first = root
                .entry(path.root().to_string())
                .or_insert_with(|| next.empty_container());
            set_segments(first, path.tail(), value, path)
        }
    }
}

// ============================================================================
// Value-rooted access
// ============================================================================

impl DataPath {
    /// Every segment, with the root as a key.
    pub fn segments(&self) -> Vec<PathSegment> {
        std::iter::once(PathSegment::Key(self.root.clone()))
            .chain(self.tail.iter().cloned())
            .collect()
    }
}

/// Read the value addressed by `path` below `root`.
pub fn get_path<'a>(root: &'a Value, path: &DataPath) -> Result<&'a Value> {
    get_segments(root, &path.segments(), path)
}

/// Write `value` at `path` below `root`, creating missing containers.
pub fn set_path(root: &mut Value, path: &DataPath, value: Value) -> Result<()> {
    set_segments(root, &path.segments(), value, path)
}
