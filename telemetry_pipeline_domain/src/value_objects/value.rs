// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Value
//!
//! The dynamically typed value held at each field of an [`Event`](crate::entities::event::Event).
//! Replaces ad hoc runtime type coercion with an explicit sum type and typed,
//! non-panicking accessors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// A dynamically typed field value.
///
/// `Map` and the event's own field storage use `BTreeMap` rather than
/// `HashMap` so that `to_json_string` is deterministic across runs — this
/// is load-bearing for round-trip equality and for stable DLQ/bulk wire
/// output.
///
/// Variant order matters here: `#[serde(untagged)]` tries variants in
/// declaration order and returns the first one that deserializes
/// successfully. A JSON array deserializes equally well as `Bytes(Vec<u8>)`
/// or `List(Vec<Value>)`, so `List` must come before `Bytes` — otherwise a
/// list of small integers round-trips back as `Bytes`, breaking equality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Bytes(Vec<u8>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Result<bool, PipelineError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(PipelineError::type_mismatch(format!("expected bool, found {}", other.type_name()))),
        }
    }

    pub fn as_int(&self) -> Result<i64, PipelineError> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(PipelineError::type_mismatch(format!("expected int, found {}", other.type_name()))),
        }
    }

    pub fn as_float(&self) -> Result<f64, PipelineError> {
        match self {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            other => Err(PipelineError::type_mismatch(format!("expected float, found {}", other.type_name()))),
        }
    }

    pub fn as_str(&self) -> Result<&str, PipelineError> {
        match self {
            Value::String(s) => Ok(s.as_str()),
            other => Err(PipelineError::type_mismatch(format!("expected string, found {}", other.type_name()))),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8], PipelineError> {
        match self {
            Value::Bytes(b) => Ok(b.as_slice()),
            other => Err(PipelineError::type_mismatch(format!("expected bytes, found {}", other.type_name()))),
        }
    }

    pub fn as_list(&self) -> Result<&[Value], PipelineError> {
        match self {
            Value::List(items) => Ok(items.as_slice()),
            other => Err(PipelineError::type_mismatch(format!("expected list, found {}", other.type_name()))),
        }
    }

    pub fn as_map(&self) -> Result<&BTreeMap<String, Value>, PipelineError> {
        match self {
            Value::Map(m) => Ok(m),
            other => Err(PipelineError::type_mismatch(format!("expected map, found {}", other.type_name()))),
        }
    }

    pub fn as_map_mut(&mut self) -> Result<&mut BTreeMap<String, Value>, PipelineError> {
        match self {
            Value::Map(m) => Ok(m),
            other => Err(PipelineError::type_mismatch(format!("expected map, found {}", other.type_name()))),
        }
    }

    /// Renders the value as a string for use in a peer-forwarder partition
    /// key. Maps and lists are rendered as their canonical JSON text.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => hex_encode(b),
            Value::List(_) | Value::Map(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_coerces_to_float() {
        let v = Value::Int(3);
        assert_eq!(v.as_float().unwrap(), 3.0);
    }

    #[test]
    fn mismatched_accessor_fails_cleanly() {
        let v = Value::String("x".into());
        assert!(v.as_int().is_err());
    }

    #[test]
    fn map_serializes_deterministically() {
        let mut m = BTreeMap::new();
        m.insert("b".to_string(), Value::Int(2));
        m.insert("a".to_string(), Value::Int(1));
        let v = Value::Map(m);
        assert_eq!(serde_json::to_string(&v).unwrap(), r#"{"a":1,"b":2}"#);
    }
}
