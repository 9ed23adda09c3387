//! Service contract, registry and call pipeline.
//!
//! 1. **Contract** (`contract`): the six-method [`ServiceCore`] trait
//! 2. **Handles** (`handle`): capability checks, events and completions around a service
//! 3. **Registry** (`registry`): location-keyed, registration-ordered services
//! 4. **Routing** (`router`): dispatch of a [`ServiceRequest`] by location
//! 5. **Middleware** (`middleware`): Tower layers (call tracing, per-location deadlines)

pub mod completion;
pub mod config;
pub mod contract;
pub mod events;
pub mod handle;
pub mod middleware;
pub mod operation;
pub mod registry;
pub mod router;

// Re-export key types for convenient access.
pub use completion::{Callback, Completion, Deferred};
pub use config::ServerConfig;
pub use contract::{unsupported, ServiceCore};
pub use events::{EventFilter, EventHub, ListenerContext, ListenerId, ServiceEvent, Subscription};
pub use handle::{ServiceHandle, ServiceOptions};
pub use middleware::{build_service_pipeline, ServicePipeline};
pub use operation::{CallContext, ServiceCall, ServiceRequest, ServiceResponse};
pub use registry::{normalize_location, LifecycleState, ServiceRegistry, Services};
pub use router::{BoxedFuture, ServiceRouter};
