pub mod body_buffer;
pub mod egress;
pub mod error;
pub mod forwarder;
pub mod ingress;
pub mod pipeline;
pub mod responder;
pub mod transaction;

pub use body_buffer::BodyBuffer;
pub use egress::EgressPipeline;
pub use error::{Direction, Halt, PipelineError};
pub use forwarder::BackendForwarder;
pub use ingress::{IngressPipeline, PendingRequest};
pub use pipeline::InspectionPipeline;
pub use transaction::{ActiveTransaction, TransactionLifecycle};
