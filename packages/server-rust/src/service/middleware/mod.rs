//! Tower middleware layers for the call pipeline.
//!
//! - [`trace`]: `service_call` spans with status and record count
//! - [`deadline`]: Per-location call deadlines
//! - [`pipeline`]: Composes the layers around the router

pub mod deadline;
pub mod pipeline;
pub mod trace;

pub use deadline::DeadlineLayer;
pub use pipeline::{build_service_pipeline, ServicePipeline};
pub use trace::CallTraceLayer;
