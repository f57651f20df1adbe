// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event
//!
//! A semi-structured document flowing through a pipeline: an ordered mapping
//! from dotted string keys to [`Value`]s, plus an immutable [`EventMetadata`]
//! record. `Record` is the thin envelope a `Source` emits and a `Sink`
//! consumes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::value_objects::value::Value;

/// Event type tag plus free-form ingest attributes, set once at
/// construction and never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub attributes: BTreeMap<String, Value>,
}

impl EventMetadata {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: Utc::now(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// An ordered mapping from dotted string keys to [`Value`]s, with
/// [`EventMetadata`].
///
/// Dotted keys address nested maps: `put("a.b.c", v)` creates intermediate
/// maps for `a` and `a.b` if absent. An empty or malformed key path fails
/// with [`PipelineError::InvalidKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    fields: BTreeMap<String, Value>,
    pub metadata: EventMetadata,
}

fn split_path(key: &str) -> Result<Vec<&str>, PipelineError> {
    if key.is_empty() {
        return Err(PipelineError::invalid_key("empty key path"));
    }
    let parts: Vec<&str> = key.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(PipelineError::invalid_key(format!("malformed key path: {key}")));
    }
    Ok(parts)
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            fields: BTreeMap::new(),
            metadata: EventMetadata::new(event_type),
        }
    }

    pub fn with_metadata(metadata: EventMetadata) -> Self {
        Self { fields: BTreeMap::new(), metadata }
    }

    /// Reads the value at `key`, following dotted path segments through
    /// nested maps. Returns `Ok(None)` if any segment is absent.
    pub fn get(&self, key: &str) -> Result<Option<&Value>, PipelineError> {
        let path = split_path(key)?;
        let mut current: &Value = match self.fields.get(path[0]) {
            Some(v) => v,
            None => return Ok(None),
        };
        for segment in &path[1..] {
            let map = match current {
                Value::Map(m) => m,
                _ => return Ok(None),
            };
            current = match map.get(*segment) {
                Some(v) => v,
                None => return Ok(None),
            };
        }
        Ok(Some(current))
    }

    pub fn get_string(&self, key: &str) -> Result<Option<String>, PipelineError> {
        match self.get(key)? {
            Some(v) => Ok(Some(v.as_str()?.to_string())),
            None => Ok(None),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<Option<i64>, PipelineError> {
        match self.get(key)? {
            Some(v) => Ok(Some(v.as_int()?)),
            None => Ok(None),
        }
    }

    pub fn get_float(&self, key: &str) -> Result<Option<f64>, PipelineError> {
        match self.get(key)? {
            Some(v) => Ok(Some(v.as_float()?)),
            None => Ok(None),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, PipelineError> {
        match self.get(key)? {
            Some(v) => Ok(Some(v.as_bool()?)),
            None => Ok(None),
        }
    }

    /// Writes `value` at `key`, creating any missing intermediate maps.
    pub fn put(&mut self, key: &str, value: Value) -> Result<(), PipelineError> {
        let path = split_path(key)?;
        if path.len() == 1 {
            self.fields.insert(path[0].to_string(), value);
            return Ok(());
        }
        let mut current = self
            .fields
            .entry(path[0].to_string())
            .or_insert_with(|| Value::Map(BTreeMap::new()));
        for segment in &path[1..path.len() - 1] {
            if !matches!(current, Value::Map(_)) {
                *current = Value::Map(BTreeMap::new());
            }
            let map = match current {
                Value::Map(m) => m,
                _ => unreachable!(),
            };
            current = map.entry(segment.to_string()).or_insert_with(|| Value::Map(BTreeMap::new()));
        }
        if !matches!(current, Value::Map(_)) {
            *current = Value::Map(BTreeMap::new());
        }
        let map = match current {
            Value::Map(m) => m,
            _ => unreachable!(),
        };
        map.insert(path[path.len() - 1].to_string(), value);
        Ok(())
    }

    /// Removes the value at `key`. Returns whether anything was removed.
    pub fn delete(&mut self, key: &str) -> Result<bool, PipelineError> {
        let path = split_path(key)?;
        if path.len() == 1 {
            return Ok(self.fields.remove(path[0]).is_some());
        }
        let mut current = match self.fields.get_mut(path[0]) {
            Some(v) => v,
            None => return Ok(false),
        };
        for segment in &path[1..path.len() - 1] {
            current = match current {
                Value::Map(m) => match m.get_mut(*segment) {
                    Some(v) => v,
                    None => return Ok(false),
                },
                _ => return Ok(false),
            };
        }
        match current {
            Value::Map(m) => Ok(m.remove(path[path.len() - 1]).is_some()),
            _ => Ok(false),
        }
    }

    pub fn contains_key(&self, key: &str) -> Result<bool, PipelineError> {
        Ok(self.get(key)?.is_some())
    }

    pub fn is_list(&self, key: &str) -> Result<bool, PipelineError> {
        Ok(matches!(self.get(key)?, Some(Value::List(_))))
    }

    /// Deep-copies all top-level fields into a plain `BTreeMap`.
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.fields.clone()
    }

    /// Canonical JSON serialization: deterministic key order via the
    /// `BTreeMap`-backed field storage, plus `metadata` so the round trip
    /// (spec Testable Property 2) preserves the whole event, not just its
    /// fields.
    pub fn to_json_string(&self) -> Result<String, PipelineError> {
        #[derive(Serialize)]
        struct Wire<'a> {
            metadata: &'a EventMetadata,
            #[serde(flatten)]
            fields: &'a BTreeMap<String, Value>,
        }
        serde_json::to_string(&Wire { metadata: &self.metadata, fields: &self.fields }).map_err(PipelineError::from)
    }

    /// Inverse of [`Event::to_json_string`]: restores both `fields` and the
    /// original `metadata` (including its ingest `timestamp`).
    pub fn from_json_string(json: &str) -> Result<Self, PipelineError> {
        #[derive(Deserialize)]
        struct Wire {
            metadata: EventMetadata,
            #[serde(flatten)]
            fields: BTreeMap<String, Value>,
        }
        let wire: Wire = serde_json::from_str(json)?;
        Ok(Self { fields: wire.fields, metadata: wire.metadata })
    }
}

/// A thin envelope wrapping one [`Event`] for source/sink compatibility.
/// Carries no additional state; a record is owned by exactly one
/// component at a time along the flow edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub event: Event,
}

impl Record {
    pub fn new(event: Event) -> Self {
        Self { event }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_creates_intermediate_maps() {
        let mut e = Event::new("LOG");
        e.put("a.b.c", Value::Int(5)).unwrap();
        assert_eq!(e.get_int("a.b.c").unwrap(), Some(5));
    }

    #[test]
    fn empty_key_is_invalid() {
        let mut e = Event::new("LOG");
        assert!(e.put("", Value::Null).is_err());
        assert!(e.get("").is_err());
    }

    #[test]
    fn malformed_key_is_invalid() {
        let e = Event::new("LOG");
        assert!(e.get("a..b").is_err());
    }

    #[test]
    fn missing_segment_returns_none_not_error() {
        let e = Event::new("LOG");
        assert_eq!(e.get("missing.path").unwrap(), None);
    }

    #[test]
    fn delete_removes_nested_value() {
        let mut e = Event::new("LOG");
        e.put("a.b", Value::Int(1)).unwrap();
        assert!(e.delete("a.b").unwrap());
        assert_eq!(e.get("a.b").unwrap(), None);
    }

    #[test]
    fn round_trip_via_json_preserves_equality() {
        let mut e = Event::new("TRACE");
        e.metadata = e.metadata.clone().with_attribute("source", Value::String("otel".into()));
        e.put("service.name", Value::String("checkout".into())).unwrap();
        e.put("duration_ms", Value::Int(42)).unwrap();
        let json = e.to_json_string().unwrap();
        let parsed = Event::from_json_string(&json).unwrap();
        assert_eq!(e, parsed, "deep comparison must hold for the whole event, metadata included");
        assert_eq!(e.metadata.timestamp, parsed.metadata.timestamp);
        assert_eq!(e.metadata.attributes, parsed.metadata.attributes);
    }
}
