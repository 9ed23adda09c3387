//! Pipeline composition: the router wrapped in the call layers.

use std::sync::Arc;

use tower::ServiceBuilder;

use super::deadline::{DeadlineLayer, DeadlineService};
use super::trace::{CallTraceLayer, CallTraceService};
use crate::service::registry::ServiceRegistry;
use crate::service::router::ServiceRouter;

/// The fully layered call pipeline.
pub type ServicePipeline = CallTraceService<DeadlineService<ServiceRouter>>;

/// Builds the call pipeline over `registry`.
///
/// Layer order (outermost to innermost):
/// 1. `CallTraceLayer` -- span per call, so timeouts are traced too
/// 2. `DeadlineLayer` -- per-location deadline
/// 3. `ServiceRouter` -- dispatch to the handle
#[must_use]
pub fn build_service_pipeline(registry: Arc<ServiceRegistry>) -> ServicePipeline {
    ServiceBuilder::new()
        .layer(CallTraceLayer)
        .layer(DeadlineLayer::new(registry.clone()))
        .service(ServiceRouter::new(registry))
}
