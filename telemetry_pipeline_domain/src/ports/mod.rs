//! Port traits: the infrastructure-facing contracts the runtime crate
//! implements against a real transport, database, or clock.

pub mod buffer;
pub mod bulk_cluster;
pub mod dlq_writer;
pub mod peer_transport;
pub mod pipeline_component;
pub mod window_store;

pub use buffer::Buffer;
pub use bulk_cluster::{BulkCluster, IndexManager};
pub use dlq_writer::DlqWriter;
pub use peer_transport::{partition_key, PeerForwarderTransport, IDENTIFICATION_KEY_SEPARATOR};
pub use pipeline_component::{PipelineComponent, Processor, RecordSink, Sink, Source};
pub use window_store::WindowStore;
