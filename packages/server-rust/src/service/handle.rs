//! Registered service handles.
//!
//! A [`ServiceHandle`] is what the application hands out for a location. It
//! wraps the user's [`ServiceCore`] with the capability check, the event
//! addon and the dual completion path. Handles are cheap to clone and compare
//! by identity.

use std::any::Any;
use std::sync::Arc;

use serde_json::Value;
use tern_core::{
    FindResult, Id, Method, Methods, Params, Payload, ServiceError, ServiceResult,
};

use super::completion::{Callback, Completion, Deferred};
use super::contract::ServiceCore;
use super::events::{EventHub, ListenerContext, ServiceEvent, Subscription};
use super::operation::{ServiceCall, ServiceResponse};

// ---------------------------------------------------------------------------
// ServiceOptions
// ---------------------------------------------------------------------------

/// Open configuration bag passed at registration.
///
/// Stored with the handle for collaborators to read. The core only
/// interprets `timeout_ms` (see [`ServiceOptions::timeout_ms`]).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceOptions(serde_json::Map<String, Value>);

impl ServiceOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Call deadline for this service in milliseconds, read from the
    /// `timeout_ms` option. Overrides the application default when set.
    #[must_use]
    pub fn timeout_ms(&self) -> Option<u64> {
        self.get("timeout_ms").and_then(Value::as_u64)
    }
}

impl From<serde_json::Map<String, Value>> for ServiceOptions {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        Self(map)
    }
}

// ---------------------------------------------------------------------------
// ServiceHandle
// ---------------------------------------------------------------------------

struct HandleInner {
    location: Arc<str>,
    methods: Methods,
    core: Arc<dyn ServiceCore>,
    any: Arc<dyn Any + Send + Sync>,
    events: EventHub,
    options: ServiceOptions,
}

/// A service bound to a location, with its addons.
#[derive(Clone)]
pub struct ServiceHandle {
    inner: Arc<HandleInner>,
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("location", &self.inner.location)
            .field("methods", &self.inner.methods)
            .field("events", &self.inner.events)
            .finish_non_exhaustive()
    }
}

impl ServiceHandle {
    pub(crate) fn new<S: ServiceCore>(
        location: &str,
        service: Arc<S>,
        options: ServiceOptions,
    ) -> Self {
        let methods = service.methods();
        Self {
            inner: Arc::new(HandleInner {
                location: Arc::from(location),
                methods,
                core: service.clone(),
                any: service,
                events: EventHub::new(),
                options,
            }),
        }
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.inner.location
    }

    /// Methods this service implements.
    #[must_use]
    pub fn methods(&self) -> Methods {
        self.inner.methods
    }

    #[must_use]
    pub fn supports(&self, method: Method) -> bool {
        self.inner.methods.contains(method)
    }

    #[must_use]
    pub fn options(&self) -> &ServiceOptions {
        &self.inner.options
    }

    #[must_use]
    pub fn events(&self) -> &EventHub {
        &self.inner.events
    }

    /// Whether both handles refer to the same registered service.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The underlying service as its concrete type.
    #[must_use]
    pub fn downcast<S: ServiceCore>(&self) -> Option<Arc<S>> {
        self.inner.any.clone().downcast::<S>().ok()
    }

    pub(crate) fn core(&self) -> &Arc<dyn ServiceCore> {
        &self.inner.core
    }

    // -- addons ------------------------------------------------------------

    /// Installs an event filter for all event kinds and returns this handle.
    pub fn filter<F>(&self, predicate: F) -> &Self
    where
        F: Fn(&ServiceEvent, &ListenerContext) -> bool + Send + Sync + 'static,
    {
        self.inner.events.add_filter(None, Arc::new(predicate));
        self
    }

    /// Installs an event filter for the events of one method.
    pub fn filter_event<F>(&self, method: Method, predicate: F) -> &Self
    where
        F: Fn(&ServiceEvent, &ListenerContext) -> bool + Send + Sync + 'static,
    {
        self.inner.events.add_filter(Some(method), Arc::new(predicate));
        self
    }

    /// Subscribes a listener described by `context` to all events.
    pub fn subscribe(&self, context: ListenerContext) -> Subscription {
        self.inner.events.subscribe(context)
    }

    fn emit(&self, method: Method, records: impl IntoIterator<Item = Value>) {
        for data in records {
            let event = ServiceEvent::new(self.inner.location.clone(), method, data);
            let delivered = self.inner.events.emit(&event);
            tracing::debug!(
                location = %self.inner.location,
                event = event.name(),
                delivered,
                "service event emitted"
            );
        }
    }

    /// Records affected by an update/patch/remove result: the elements of
    /// an array (bulk) or the single record.
    fn affected(result: &Value) -> Vec<Value> {
        match result {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        }
    }

    // -- dispatch ----------------------------------------------------------

    fn ensure(&self, method: Method) -> ServiceResult<()> {
        if self.supports(method) {
            Ok(())
        } else {
            Err(ServiceError::MethodNotAllowed {
                location: self.location().to_string(),
                method,
            })
        }
    }

    fn bind_error(&self, err: ServiceError) -> ServiceError {
        match err {
            ServiceError::MethodNotAllowed { location, method } if location.is_empty() => {
                ServiceError::MethodNotAllowed {
                    location: self.location().to_string(),
                    method,
                }
            }
            other => other,
        }
    }

    /// Dispatches a call: checks the capability set, invokes the service and
    /// emits events for successful mutations.
    ///
    /// # Errors
    ///
    /// `MethodNotAllowed` when the service does not implement the method;
    /// otherwise whatever the service returns.
    pub async fn call(&self, call: ServiceCall) -> ServiceResult<ServiceResponse> {
        let method = call.method();
        self.ensure(method)?;
        let core = self.core();

        let result = match call {
            ServiceCall::Find { params } => core.find(params).await.map(ServiceResponse::Found),
            ServiceCall::Get { id, params } => {
                core.get(id, params).await.map(ServiceResponse::Record)
            }
            ServiceCall::Create { data, params } => {
                core.create(data, params).await.map(ServiceResponse::Created)
            }
            ServiceCall::Update { id, data, params } => {
                core.update(id, data, params).await.map(ServiceResponse::Record)
            }
            ServiceCall::Patch { id, data, params } => {
                core.patch(id, data, params).await.map(ServiceResponse::Record)
            }
            ServiceCall::Remove { id, params } => {
                core.remove(id, params).await.map(ServiceResponse::Record)
            }
        };
        let response = result.map_err(|e| self.bind_error(e))?;

        if method.is_mutation() {
            let records = match &response {
                ServiceResponse::Created(payload) => payload.records().to_vec(),
                ServiceResponse::Record(value) => Self::affected(value),
                ServiceResponse::Found(_) => Vec::new(),
            };
            self.emit(method, records);
        }
        Ok(response)
    }

    /// Dispatches a call on a spawned task and reports the outcome to both
    /// `callback` and the returned future.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn call_with_callback(
        &self,
        call: ServiceCall,
        callback: Callback<ServiceResponse>,
    ) -> Deferred<ServiceResponse> {
        let (completion, deferred) = Completion::new(Some(callback));
        let handle = self.clone();
        tokio::spawn(async move {
            let result = handle.call(call).await;
            completion.settle(result);
        });
        deferred
    }

    // -- typed helpers -----------------------------------------------------

    /// `find` through the capability check.
    ///
    /// # Errors
    ///
    /// See [`ServiceHandle::call`].
    pub async fn find(&self, params: Params) -> ServiceResult<FindResult> {
        match self.call(ServiceCall::Find { params }).await? {
            ServiceResponse::Found(found) => Ok(found),
            other => Err(unexpected(Method::Find, &other)),
        }
    }

    /// `get` through the capability check.
    ///
    /// # Errors
    ///
    /// See [`ServiceHandle::call`].
    pub async fn get(&self, id: impl Into<Id>, params: Params) -> ServiceResult<Value> {
        let id = id.into();
        self.record(ServiceCall::Get { id, params }).await
    }

    /// `create` through the capability check; emits `created` per record.
    ///
    /// # Errors
    ///
    /// See [`ServiceHandle::call`].
    pub async fn create(&self, data: impl Into<Payload>, params: Params) -> ServiceResult<Payload> {
        let data = data.into();
        match self.call(ServiceCall::Create { data, params }).await? {
            ServiceResponse::Created(created) => Ok(created),
            other => Err(unexpected(Method::Create, &other)),
        }
    }

    /// `update` through the capability check; emits `updated` per record.
    ///
    /// # Errors
    ///
    /// See [`ServiceHandle::call`].
    pub async fn update(&self, id: Option<Id>, data: Value, params: Params) -> ServiceResult<Value> {
        self.record(ServiceCall::Update { id, data, params }).await
    }

    /// `patch` through the capability check; emits `patched` per record.
    ///
    /// # Errors
    ///
    /// See [`ServiceHandle::call`].
    pub async fn patch(&self, id: Option<Id>, data: Value, params: Params) -> ServiceResult<Value> {
        self.record(ServiceCall::Patch { id, data, params }).await
    }

    /// `remove` through the capability check; emits `removed` per record.
    ///
    /// # Errors
    ///
    /// See [`ServiceHandle::call`].
    pub async fn remove(&self, id: Option<Id>, params: Params) -> ServiceResult<Value> {
        self.record(ServiceCall::Remove { id, params }).await
    }

    async fn record(&self, call: ServiceCall) -> ServiceResult<Value> {
        let method = call.method();
        match self.call(call).await? {
            ServiceResponse::Record(value) => Ok(value),
            other => Err(unexpected(method, &other)),
        }
    }
}

fn unexpected(method: Method, response: &ServiceResponse) -> ServiceError {
    ServiceError::General(anyhow::anyhow!(
        "`{method}` produced an unexpected response shape: {response:?}"
    ))
}
