//! Per-call tracing.
//!
//! Wraps every call in a `service_call` span naming the location, method,
//! call id and target id, then records the settled status code and record
//! count on it. Calls that fail with a 5xx code or time out are logged at
//! `warn`; everything else at `debug`.

use std::task::{Context, Poll};
use std::time::Instant;

use tern_core::{Method, ServiceError};
use tower::{Layer, Service};
use tracing::{field, Instrument, Span};

use crate::service::operation::{ServiceRequest, ServiceResponse};
use crate::service::router::BoxedFuture;

/// Instruments calls with a `service_call` span.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallTraceLayer;

impl<S> Layer<S> for CallTraceLayer {
    type Service = CallTraceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CallTraceService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct CallTraceService<S> {
    inner: S,
}

/// Status code a call settled with: the error's code, or 201 for a
/// successful `create` and 200 otherwise.
fn status(method: Method, result: &Result<ServiceResponse, ServiceError>) -> u16 {
    match result {
        Ok(_) if method == Method::Create => 201,
        Ok(_) => 200,
        Err(err) => err.code(),
    }
}

impl<S> Service<ServiceRequest> for CallTraceService<S>
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

    fn call(&mut self, request: ServiceRequest) -> Self::Future {
        let method = request.call.method();
        let span = tracing::info_span!(
            "service_call",
            location = %request.ctx.location,
            method = method.as_str(),
            call_id = request.ctx.call_id,
            id = field::Empty,
            status = field::Empty,
            records = field::Empty,
            elapsed_ms = field::Empty,
        );
        if let Some(id) = request.call.id() {
            span.record("id", field::display(id));
        }

        let fut = self.inner.call(request);
        Box::pin(
            async move {
                let started = Instant::now();
                let result = fut.await;
                #[allow(clippy::cast_possible_truncation)]
                let elapsed_ms = started.elapsed().as_millis() as u64;

                let span = Span::current();
                let status = status(method, &result);
                span.record("status", status);
                span.record("elapsed_ms", elapsed_ms);
                match &result {
                    Ok(response) => {
                        span.record("records", response.record_count());
                        tracing::debug!("call settled");
                    }
                    Err(err) if status >= 500 || matches!(err, ServiceError::Timeout { .. }) => {
                        tracing::warn!(error = %err, "call failed");
                    }
                    Err(err) => tracing::debug!(error = %err, "call rejected"),
                }
                result
            }
            .instrument(span),
        )
    }
}
