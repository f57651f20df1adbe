//! Immutable value objects: data shapes with no identity of their own.

pub mod bulk;
pub mod checkpoint_token;
pub mod service_map;
pub mod value;

pub use bulk::{AccumulatingBulkRequest, BulkAction, BulkErrorKind, BulkOperation, BulkResponseEntry};
pub use checkpoint_token::CheckpointToken;
pub use service_map::{Relationship, SpanKind, SpanState};
pub use value::Value;
