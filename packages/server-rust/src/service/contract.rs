//! The service contract.
//!
//! A service implements any subset of the six methods and declares that
//! subset through [`ServiceCore::methods`]. Methods left out keep their
//! default body, which reports `MethodNotAllowed`; callers never reach it
//! through a [`ServiceHandle`](super::ServiceHandle), which checks the
//! declared set before dispatching.

use std::any::Any;

use async_trait::async_trait;
use serde_json::Value;
use tern_core::{FindResult, Id, Method, Methods, Params, Payload, ServiceError, ServiceResult};

use crate::app::Application;

/// Error returned by the default body of an undeclared method.
///
/// The location is filled in by the handle that dispatched the call.
#[must_use]
pub fn unsupported(method: Method) -> ServiceError {
    ServiceError::MethodNotAllowed {
        location: String::new(),
        method,
    }
}

/// A resource exposed through the uniform method vocabulary.
///
/// Implementations carry their own backing state and synchronization; the
/// registry does not serialize calls.
#[async_trait]
pub trait ServiceCore: Send + Sync + Any {
    /// The methods this service implements.
    fn methods(&self) -> Methods;

    /// Lists records matching `params.query`.
    async fn find(&self, _params: Params) -> ServiceResult<FindResult> {
        Err(unsupported(Method::Find))
    }

    /// Fetches one record. Fails with `NotFound` for unknown ids.
    async fn get(&self, _id: Id, _params: Params) -> ServiceResult<Value> {
        Err(unsupported(Method::Get))
    }

    /// Creates one or many records; the result mirrors the input shape.
    async fn create(&self, _data: Payload, _params: Params) -> ServiceResult<Payload> {
        Err(unsupported(Method::Create))
    }

    /// Replaces a record, or every matching record when `id` is `None`.
    async fn update(&self, _id: Option<Id>, _data: Value, _params: Params) -> ServiceResult<Value> {
        Err(unsupported(Method::Update))
    }

    /// Merges into a record, or every matching record when `id` is `None`.
    async fn patch(&self, _id: Option<Id>, _data: Value, _params: Params) -> ServiceResult<Value> {
        Err(unsupported(Method::Patch))
    }

    /// Removes a record, or every matching record when `id` is `None`.
    async fn remove(&self, _id: Option<Id>, _params: Params) -> ServiceResult<Value> {
        Err(unsupported(Method::Remove))
    }

    /// Lifecycle hook, run once by [`Application::setup`].
    async fn setup(&self, _app: &Application, _location: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
