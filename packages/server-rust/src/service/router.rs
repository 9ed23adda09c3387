//! Call routing: dispatches a [`ServiceRequest`] to the service registered at
//! its location.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tern_core::ServiceError;
use tower::Service;

use super::operation::{ServiceRequest, ServiceResponse};
use super::registry::ServiceRegistry;

/// Boxed future returned by the router and every middleware layer.
pub type BoxedFuture =
    Pin<Box<dyn Future<Output = Result<ServiceResponse, ServiceError>> + Send>>;

// ---------------------------------------------------------------------------
// ServiceRouter
// ---------------------------------------------------------------------------

/// Routes requests to the handle registered at `ctx.location`.
///
/// Lookups go through the shared registry on every call, so services
/// registered after the router was built are reachable. Requests for an
/// unregistered location fail with `ServiceError::NotFound`.
#[derive(Clone)]
pub struct ServiceRouter {
    registry: Arc<ServiceRegistry>,
}

impl ServiceRouter {
    #[must_use]
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }
}

impl Service<ServiceRequest> for ServiceRouter {
    type Response = ServiceResponse;
    type Error = ServiceError;
    type Future = BoxedFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: ServiceRequest) -> Self::Future {
        let handle = self.registry.get(&request.ctx.location);
        Box::pin(async move {
            let handle = handle?;
            handle.call(request.call).await
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
