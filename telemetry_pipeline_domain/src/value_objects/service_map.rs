// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Service-map State
//!
//! The span and trace-group state the windowed stateful processor (C6)
//! joins across rotating windows. Span ids, parent ids, and trace ids are
//! raw bytes compared lexicographically, matching the on-disk window's
//! byte-wise key ordering.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpanKind {
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
    Unspecified,
}

impl SpanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanKind::Internal => "Internal",
            SpanKind::Server => "Server",
            SpanKind::Client => "Client",
            SpanKind::Producer => "Producer",
            SpanKind::Consumer => "Consumer",
            SpanKind::Unspecified => "Unspecified",
        }
    }

    /// Parses a span kind from its wire/document string form. Unrecognized
    /// values map to `Unspecified` rather than failing, matching how spans
    /// with unknown kinds are treated everywhere else in the join.
    pub fn parse(s: &str) -> Self {
        match s {
            "Internal" => SpanKind::Internal,
            "Server" => SpanKind::Server,
            "Client" => SpanKind::Client,
            "Producer" => SpanKind::Producer,
            "Consumer" => SpanKind::Consumer,
            _ => SpanKind::Unspecified,
        }
    }
}

/// State of one observed span, keyed externally by its span id bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanState {
    pub service_name: String,
    pub parent_span_id: Option<Vec<u8>>,
    pub trace_id: Vec<u8>,
    pub span_kind: SpanKind,
    pub span_name: String,
}

/// One relationship emitted by `evaluate_edges`: a directed call edge
/// between two services within one trace group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relationship {
    pub caller_service: String,
    pub caller_kind: SpanKind,
    pub callee_service: String,
    pub callee_operation: String,
    pub trace_group: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_kind_round_trips_through_its_string_form() {
        for kind in [
            SpanKind::Internal,
            SpanKind::Server,
            SpanKind::Client,
            SpanKind::Producer,
            SpanKind::Consumer,
            SpanKind::Unspecified,
        ] {
            assert_eq!(SpanKind::parse(kind.as_str()), kind);
        }
    }

    #[test]
    fn span_kind_parse_defaults_unknown_to_unspecified() {
        assert_eq!(SpanKind::parse("bogus"), SpanKind::Unspecified);
    }
}
