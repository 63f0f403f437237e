// src/record.rs

//! Path discovery over JSON-shaped records.
//!
//! A record is an arbitrarily nested `serde_json::Value`; sonification only
//! cares about numeric leaves, addressed by dot-delimited paths such as
//! `properties.mag`. Discovery walks the first record to enumerate leaves,
//! then probes a bounded prefix of the record list to measure how often each
//! path actually resolves.

use serde_json::Value;
use tracing::debug;

/// One element of the input sequence to be sonified.
pub type Record = Value;

/// How many records are probed when computing per-path coverage.
pub const COVERAGE_PROBE_LIMIT: usize = 20;

/// Paths resolving in fewer than this fraction of probed records are dropped.
pub const MIN_COVERAGE: f64 = 0.1;

/// Recursion cap for discovery, guarding against pathological nesting.
const MAX_DEPTH: usize = 5;

/// The JSON-level type of a discovered leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    String,
    Boolean,
    Object,
}

impl ValueKind {
    fn of(value: &Value) -> ValueKind {
        match value {
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Bool(_) => ValueKind::Boolean,
            _ => ValueKind::Object,
        }
    }
}

/// A discovered leaf position within the record shape.
///
/// Descriptors are derived once per record list and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct PathDescriptor {
    /// Dot-delimited path from the record root to the leaf.
    pub path: String,
    pub kind: ValueKind,
    /// Fraction of probed records where the path resolves to a non-null value.
    pub coverage: f64,
    /// The leaf value seen in the first record, kept for display purposes.
    pub sample: Option<Value>,
    /// True when the leaf is an array of primitives; numeric resolution then
    /// takes the first element.
    pub is_array: bool,
}

impl PathDescriptor {
    pub fn is_numeric(&self) -> bool {
        self.kind == ValueKind::Number
    }
}

/// Walks the record list and returns descriptors for every leaf reachable in
/// the first record, with coverage measured over up to
/// [`COVERAGE_PROBE_LIMIT`] records. Paths below [`MIN_COVERAGE`] are
/// discarded. An empty input yields an empty vector.
pub fn discover(records: &[Record]) -> Vec<PathDescriptor> {
    let Some(first) = records.first() else {
        return Vec::new();
    };

    let mut leaves = Vec::new();
    collect_leaves(first, String::new(), 0, &mut leaves);

    let probe = &records[..records.len().min(COVERAGE_PROBE_LIMIT)];
    let mut dropped = 0usize;
    let descriptors: Vec<PathDescriptor> = leaves
        .into_iter()
        .filter_map(|(path, kind, sample, is_array)| {
            let hits = probe
                .iter()
                .filter(|r| !matches!(resolve(r, &path), None | Some(Value::Null)))
                .count();
            let coverage = hits as f64 / probe.len() as f64;
            if coverage < MIN_COVERAGE {
                dropped += 1;
                return None;
            }
            Some(PathDescriptor {
                path,
                kind,
                coverage,
                sample: Some(sample),
                is_array,
            })
        })
        .collect();

    if dropped > 0 {
        debug!(dropped, kept = descriptors.len(), "dropped low-coverage paths");
    }
    descriptors
}

fn collect_leaves(
    value: &Value,
    prefix: String,
    depth: usize,
    out: &mut Vec<(String, ValueKind, Value, bool)>,
) {
    if depth > MAX_DEPTH {
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                match child {
                    Value::Object(_) => collect_leaves(child, path, depth + 1, out),
                    Value::Array(items) => match items.first() {
                        // Arrays of objects are sampled through their first
                        // element; the path continues without an index.
                        Some(first @ Value::Object(_)) => {
                            collect_leaves(first, path, depth + 1, out)
                        }
                        // Arrays of primitives collapse to one descriptor.
                        Some(first) if !first.is_null() => {
                            out.push((path, ValueKind::of(first), first.clone(), true));
                        }
                        _ => {}
                    },
                    Value::Null => {}
                    _ => out.push((path, ValueKind::of(child), child.clone(), false)),
                }
            }
        }
        Value::Array(items) => {
            if let Some(first) = items.first() {
                collect_leaves(first, prefix, depth + 1, out);
            }
        }
        _ => {}
    }
}

/// Resolves a dotted path against one record, returning `None` the moment any
/// intermediate is missing or null. Intermediate arrays are traversed through
/// their first element, matching how discovery sampled them.
pub fn resolve<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = record;
    for segment in path.split('.') {
        if let Value::Array(items) = current {
            current = items.first()?;
        }
        match current {
            Value::Object(map) => current = map.get(segment)?,
            _ => return None,
        }
        if current.is_null() {
            return None;
        }
    }
    Some(current)
}

/// Resolves a path to a number, taking the first element of an
/// array-of-primitives leaf. Non-numeric values resolve to `None`.
pub fn resolve_numeric(record: &Value, path: &str) -> Option<f64> {
    let mut value = resolve(record, path)?;
    if let Value::Array(items) = value {
        value = items.first()?;
    }
    match value {
        Value::Number(n) => n.as_f64(),
        // Stringly-typed numbers show up in real exports; parse them.
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
