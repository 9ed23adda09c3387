//! The application facade.
//!
//! An [`Application`] owns the service registry, a settings bag and the
//! layered call pipeline. Services are registered by location, set up once in
//! registration order, and reached either directly through their
//! [`ServiceHandle`] or through [`Application::request`], which runs the call
//! through call tracing and its location's deadline.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tern_core::{Methods, ServiceError, ServiceResult};
use tokio::sync::Mutex;
use tower::ServiceExt;

use crate::service::{
    build_service_pipeline, normalize_location, CallContext, ServerConfig, ServiceCall,
    ServiceCore, ServiceHandle, ServiceOptions, ServicePipeline, ServiceRegistry, ServiceRequest,
    ServiceResponse, Services,
};

tokio::task_local! {
    /// Address of the application whose `setup` is running on this task.
    static SETTING_UP: usize;
}

/// A location mounted for transport collaborators via [`Application::use_service`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub location: String,
    pub methods: Methods,
}

/// Registry, settings and dispatch pipeline of one application.
pub struct Application {
    config: Arc<ServerConfig>,
    registry: Arc<ServiceRegistry>,
    pipeline: ServicePipeline,
    settings: RwLock<serde_json::Map<String, Value>>,
    routes: RwLock<Vec<Route>>,
    /// Serializes `setup` passes.
    setup_lock: Mutex<()>,
    is_setup: AtomicBool,
    call_id_counter: AtomicU64,
}

impl Application {
    /// Creates an application with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    #[must_use]
    pub fn with_config(config: ServerConfig) -> Self {
        let registry = Arc::new(ServiceRegistry::new());
        let pipeline = build_service_pipeline(registry.clone());
        Self {
            config: Arc::new(config),
            registry,
            pipeline,
            settings: RwLock::new(serde_json::Map::new()),
            routes: RwLock::new(Vec::new()),
            setup_lock: Mutex::new(()),
            is_setup: AtomicBool::new(false),
            call_id_counter: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    // -- registration ------------------------------------------------------

    /// The handle bound at `location`.
    ///
    /// Repeated lookups return handles to the same service
    /// ([`ServiceHandle::ptr_eq`]).
    ///
    /// # Errors
    ///
    /// `NotFound` if nothing is registered there.
    pub fn service(&self, location: &str) -> ServiceResult<ServiceHandle> {
        self.registry.get(location)
    }

    /// Registers `service` at `location` with an open options bag.
    ///
    /// # Errors
    ///
    /// `BadRequest` for an empty location; `Conflict` if the location is taken.
    pub fn register<S: ServiceCore>(
        &self,
        location: &str,
        service: S,
        options: ServiceOptions,
    ) -> ServiceResult<ServiceHandle> {
        self.registry.register(location, Arc::new(service), options)
    }

    /// Invokes `factory` with an accessor over the registered services and
    /// returns its result.
    ///
    /// ```ignore
    /// let handle = app.service_with(|services| {
    ///     let users = services.typed::<MemoryService>("users");
    ///     app.register("profiles", Profiles::new(users), ServiceOptions::new())
    /// })?;
    /// ```
    pub fn service_with<T>(&self, factory: impl FnOnce(Services<'_>) -> T) -> T {
        factory(Services::new(&self.registry))
    }

    /// Registers `service` and mounts it for transport collaborators.
    ///
    /// # Errors
    ///
    /// As [`Application::register`].
    pub fn use_service<S: ServiceCore>(
        &self,
        location: &str,
        service: S,
    ) -> ServiceResult<ServiceHandle> {
        let handle = self.register(location, service, ServiceOptions::new())?;
        self.routes.write().push(Route {
            location: handle.location().to_string(),
            methods: handle.methods(),
        });
        Ok(handle)
    }

    /// Mounted routes in mount order.
    #[must_use]
    pub fn routes(&self) -> Vec<Route> {
        self.routes.read().clone()
    }

    /// Invokes `configure` with this application and returns it.
    pub fn configure<F>(&self, configure: F) -> &Self
    where
        F: FnOnce(&Self),
    {
        configure(self);
        self
    }

    // -- settings ----------------------------------------------------------

    /// Stores a setting for plugins and services to read.
    pub fn set(&self, key: impl Into<String>, value: Value) -> &Self {
        self.settings.write().insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.settings.read().get(key).cloned()
    }

    // -- lifecycle ---------------------------------------------------------

    /// Runs the setup hook of every service not yet set up, once each, in
    /// registration order. Later calls only set up services registered
    /// since.
    ///
    /// Concurrent calls wait for the running pass. A hook that calls `setup`
    /// on its own application gets `Conflict` instead of waiting on itself.
    ///
    /// # Errors
    ///
    /// The first hook failure, as `ServiceError::General`. Services set up
    /// before it stay initialized; the next call resumes with the failed one.
    /// `Conflict` when called from within this application's own setup.
    pub async fn setup(&self) -> ServiceResult<&Self> {
        let key = std::ptr::from_ref(self) as usize;
        if SETTING_UP.try_with(|running| *running == key).unwrap_or(false) {
            return Err(ServiceError::Conflict(format!(
                "`{}` is already running setup on this task",
                self.config.name
            )));
        }
        let _guard = self.setup_lock.lock().await;
        let ran = SETTING_UP
            .scope(key, self.registry.setup_all(self))
            .await
            .map_err(ServiceError::General)?;
        self.is_setup.store(true, Ordering::Release);
        tracing::info!(app = %self.config.name, initialized = ran, "application setup complete");
        Ok(self)
    }

    /// Whether `setup` has completed at least once.
    #[must_use]
    pub fn is_setup(&self) -> bool {
        self.is_setup.load(Ordering::Acquire)
    }

    // -- dispatch ----------------------------------------------------------

    /// A handle to the layered call pipeline.
    #[must_use]
    pub fn router(&self) -> ServicePipeline {
        self.pipeline.clone()
    }

    /// Wraps `call` with a fresh call id and the configured default timeout.
    #[must_use]
    pub fn make_request(&self, location: &str, call: ServiceCall) -> ServiceRequest {
        let location = normalize_location(location).unwrap_or_else(|_| location.to_string());
        ServiceRequest {
            ctx: CallContext::new(
                self.call_id_counter.fetch_add(1, Ordering::Relaxed),
                location,
                self.config.default_call_timeout_ms,
            ),
            call,
        }
    }

    /// Runs `call` against the service at `location` through the pipeline.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown location, `Timeout` when the call outlives
    /// its deadline, otherwise whatever the service returns.
    pub async fn request(&self, location: &str, call: ServiceCall) -> ServiceResult<ServiceResponse> {
        let request = self.make_request(location, call);
        self.router().oneshot(request).await
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.config.name)
            .field("locations", &self.registry.locations())
            .field("is_setup", &self.is_setup())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
