//! Call deadlines.
//!
//! Each call runs under a deadline: the `timeout_ms` option its service was
//! registered with, or the request's `ctx.call_timeout_ms` (the application
//! default) when the service sets none. A call that outlives its deadline
//! fails with `ServiceError::Timeout`; the service future is dropped.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tern_core::ServiceError;
use tower::{Layer, Service};

use crate::service::operation::{ServiceRequest, ServiceResponse};
use crate::service::registry::ServiceRegistry;
use crate::service::router::BoxedFuture;

/// Applies per-location deadlines read from the registry.
#[derive(Clone)]
pub struct DeadlineLayer {
    registry: Arc<ServiceRegistry>,
}

impl DeadlineLayer {
    #[must_use]
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }
}

impl<S> Layer<S> for DeadlineLayer {
    type Service = DeadlineService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DeadlineService {
            inner,
            registry: self.registry.clone(),
        }
    }
}

#[derive(Clone)]
pub struct DeadlineService<S> {
    inner: S,
    registry: Arc<ServiceRegistry>,
}

impl<S> DeadlineService<S> {
    /// Deadline for a call to `location`. Unknown locations keep the request
    /// default; the router reports them.
    fn deadline_ms(&self, location: &str, default_ms: u64) -> u64 {
        self.registry
            .get(location)
            .ok()
            .and_then(|handle| handle.options().timeout_ms())
            .unwrap_or(default_ms)
    }
}

impl<S> Service<ServiceRequest> for DeadlineService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse, Error = ServiceError> + Send,
    S::Future: Send + 'static,
{
    type Response = ServiceResponse;
    type Error = ServiceError;
    type Future = BoxedFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: ServiceRequest) -> Self::Future {
        let timeout_ms = self.deadline_ms(&request.ctx.location, request.ctx.call_timeout_ms);
        request.ctx.call_timeout_ms = timeout_ms;
        let fut = self.inner.call(request);
        Box::pin(async move {
            tokio::time::timeout(Duration::from_millis(timeout_ms), fut)
                .await
                .unwrap_or(Err(ServiceError::Timeout { timeout_ms }))
        })
    }
}
