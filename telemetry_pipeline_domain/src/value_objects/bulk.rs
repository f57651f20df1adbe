// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bulk Request/Response Types
//!
//! The wire-adjacent shapes the bulk sink accumulates and classifies.
//! `AccumulatingBulkRequest` tracks a monotonic byte estimate so the sink
//! can decide, before serializing, whether one more operation would push
//! the request over `bulk_size_bytes`.

use serde::{Deserialize, Serialize};

/// Per-operation overhead (braces, newlines, action-metadata framing)
/// added to each operation's document size when estimating wire bytes.
pub const PER_OPERATION_OVERHEAD_BYTES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BulkAction {
    Index,
    Create,
}

impl BulkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkAction::Index => "index",
            BulkAction::Create => "create",
        }
    }
}

/// One index/create operation plus the serialized document it carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOperation {
    pub action: BulkAction,
    pub target_index: String,
    pub document_id: Option<String>,
    pub serialized_json_document: String,
    pub estimated_size_bytes: usize,
}

impl BulkOperation {
    pub fn new(action: BulkAction, target_index: impl Into<String>, document_id: Option<String>, serialized_json_document: String) -> Self {
        let estimated_size_bytes = serialized_json_document.len() + PER_OPERATION_OVERHEAD_BYTES;
        Self {
            action,
            target_index: target_index.into(),
            document_id,
            serialized_json_document,
            estimated_size_bytes,
        }
    }

    /// Renders the `{action-metadata}\n{document}\n` wire pair.
    pub fn to_wire_pair(&self) -> String {
        let meta = match &self.document_id {
            Some(id) => format!(r#"{{"{}":{{"_index":"{}","_id":"{}"}}}}"#, self.action.as_str(), self.target_index, id),
            None => format!(r#"{{"{}":{{"_index":"{}"}}}}"#, self.action.as_str(), self.target_index),
        };
        format!("{meta}\n{}\n", self.serialized_json_document)
    }
}

/// A sequence of bulk operations plus a running byte estimate of what the
/// wire payload would be. The estimate is monotonic: it only grows as
/// operations are appended.
#[derive(Debug, Clone, Default)]
pub struct AccumulatingBulkRequest {
    operations: Vec<BulkOperation>,
    estimated_size_bytes: usize,
}

impl AccumulatingBulkRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn estimated_size_bytes(&self) -> usize {
        self.estimated_size_bytes
    }

    /// Whether `operation` would fit under `bulk_size_bytes` if appended.
    /// Single-operation requests are exempt from the bound (Testable
    /// Property 3): the caller is expected to append unconditionally when
    /// the accumulator is currently empty.
    pub fn would_fit(&self, operation: &BulkOperation, bulk_size_bytes: usize) -> bool {
        self.operations.is_empty() || self.estimated_size_bytes + operation.estimated_size_bytes <= bulk_size_bytes
    }

    pub fn push(&mut self, operation: BulkOperation) {
        self.estimated_size_bytes += operation.estimated_size_bytes;
        self.operations.push(operation);
    }

    pub fn operations(&self) -> &[BulkOperation] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<BulkOperation> {
        self.operations
    }

    /// Serializes the whole request to its newline-delimited wire form.
    pub fn to_wire_payload(&self) -> String {
        self.operations.iter().map(BulkOperation::to_wire_pair).collect()
    }
}

/// Classification of a bulk response entry's failure, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BulkErrorKind {
    None,
    DocumentLevel,
    VersionConflict,
    TooManyRequests,
    Rejected,
    ServerError,
    Network,
    Unknown,
}

impl BulkErrorKind {
    /// Whether a retry of this operation is worth attempting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BulkErrorKind::TooManyRequests | BulkErrorKind::Rejected | BulkErrorKind::ServerError)
    }
}

/// Per-operation result from a cluster's bulk response, indexed by
/// position in the request that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkResponseEntry {
    pub operation_index: usize,
    pub status_code: u16,
    pub error_kind: BulkErrorKind,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_operation_exempt_from_bound() {
        let req = AccumulatingBulkRequest::new();
        let huge_doc = "x".repeat(10_000);
        let op = BulkOperation::new(BulkAction::Index, "idx", None, huge_doc);
        assert!(req.would_fit(&op, 500));
    }

    #[test]
    fn second_operation_respects_bound() {
        let mut req = AccumulatingBulkRequest::new();
        let op1 = BulkOperation::new(BulkAction::Index, "idx", None, "a".repeat(50));
        req.push(op1);
        let op2 = BulkOperation::new(BulkAction::Index, "idx", None, "b".repeat(500));
        assert!(!req.would_fit(&op2, 200));
    }

    #[test]
    fn retryable_error_kinds() {
        assert!(BulkErrorKind::TooManyRequests.is_retryable());
        assert!(BulkErrorKind::ServerError.is_retryable());
        assert!(!BulkErrorKind::DocumentLevel.is_retryable());
        assert!(!BulkErrorKind::VersionConflict.is_retryable());
    }
}
