use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tern_core::{ServiceError, ServiceResult};

use super::contract::ServiceCore;
use super::handle::{ServiceHandle, ServiceOptions};
use crate::app::Application;

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

/// Normalizes a location by stripping leading and trailing slashes.
///
/// # Errors
///
/// Returns `ServiceError::BadRequest` if nothing is left after stripping.
pub fn normalize_location(location: &str) -> ServiceResult<String> {
    let trimmed = location.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(ServiceError::BadRequest(format!(
            "invalid service location `{location}`"
        )));
    }
    Ok(trimmed.to_string())
}

// ---------------------------------------------------------------------------
// LifecycleState
// ---------------------------------------------------------------------------

/// Lifecycle of a registered location.
///
/// Unregistered locations are simply absent from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Registered; `setup` has not run yet.
    Registered,
    /// `setup` has run.
    Initialized,
}

struct RegistryEntry {
    handle: ServiceHandle,
    state: LifecycleState,
}

// ---------------------------------------------------------------------------
// ServiceRegistry
// ---------------------------------------------------------------------------

/// Location-keyed registry of services.
///
/// Locations are unique: registering a taken location fails with `Conflict`
/// and leaves the existing binding in place. Setup hooks run in registration
/// order.
pub struct ServiceRegistry {
    /// Location -> handle and lifecycle state.
    by_location: DashMap<String, RegistryEntry>,
    /// Registration order for deterministic setup sequencing.
    init_order: RwLock<Vec<String>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_location: DashMap::new(),
            init_order: RwLock::new(Vec::new()),
        }
    }

    /// Registers `service` at `location`.
    ///
    /// # Errors
    ///
    /// `BadRequest` for an empty location; `Conflict` if the location is taken.
    pub fn register<S: ServiceCore>(
        &self,
        location: &str,
        service: Arc<S>,
        options: ServiceOptions,
    ) -> ServiceResult<ServiceHandle> {
        let location = normalize_location(location)?;
        let handle = match self.by_location.entry(location.clone()) {
            Entry::Occupied(_) => {
                return Err(ServiceError::Conflict(format!(
                    "a service is already registered at `{location}`"
                )))
            }
            Entry::Vacant(vacant) => {
                let handle = ServiceHandle::new(&location, service, options);
                vacant.insert(RegistryEntry {
                    handle: handle.clone(),
                    state: LifecycleState::Registered,
                });
                handle
            }
        };
        self.init_order.write().push(location.clone());
        tracing::info!(location = %location, methods = ?handle.methods(), "service registered");
        Ok(handle)
    }

    /// Retrieves the handle bound at `location`.
    ///
    /// # Errors
    ///
    /// `NotFound` if nothing is registered there.
    pub fn get(&self, location: &str) -> ServiceResult<ServiceHandle> {
        let key = normalize_location(location)?;
        self.by_location
            .get(&key)
            .map(|entry| entry.handle.clone())
            .ok_or_else(|| ServiceError::NotFound(format!("no service registered at `{key}`")))
    }

    /// Retrieves a service as its concrete type.
    pub fn get_typed<S: ServiceCore>(&self, location: &str) -> Option<Arc<S>> {
        self.get(location).ok().and_then(|handle| handle.downcast::<S>())
    }

    #[must_use]
    pub fn contains(&self, location: &str) -> bool {
        normalize_location(location).is_ok_and(|key| self.by_location.contains_key(&key))
    }

    /// Lifecycle state of `location`, or `None` if unregistered.
    #[must_use]
    pub fn state(&self, location: &str) -> Option<LifecycleState> {
        let key = normalize_location(location).ok()?;
        self.by_location.get(&key).map(|entry| entry.state)
    }

    /// Registered locations in registration order.
    #[must_use]
    pub fn locations(&self) -> Vec<String> {
        self.init_order.read().clone()
    }

    /// Handles in registration order.
    #[must_use]
    pub fn handles(&self) -> Vec<ServiceHandle> {
        self.locations()
            .iter()
            .filter_map(|location| self.by_location.get(location).map(|e| e.handle.clone()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_location.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_location.is_empty()
    }

    fn pending(&self) -> Vec<(String, ServiceHandle)> {
        self.locations()
            .into_iter()
            .filter_map(|location| {
                let entry = self.by_location.get(&location)?;
                let handle = (entry.state == LifecycleState::Registered).then(|| entry.handle.clone());
                handle.map(|handle| (location, handle))
            })
            .collect()
    }

    /// Runs the setup hook of every registered-but-uninitialized service, in
    /// registration order. Services registered by a hook are set up in the
    /// same pass. Returns how many hooks ran.
    ///
    /// # Errors
    ///
    /// Returns the first hook error; services set up before it stay
    /// initialized.
    pub async fn setup_all(&self, app: &Application) -> anyhow::Result<usize> {
        let mut ran = 0;
        loop {
            let pending = self.pending();
            if pending.is_empty() {
                return Ok(ran);
            }
            for (location, handle) in pending {
                handle.core().setup(app, &location).await?;
                if let Some(mut entry) = self.by_location.get_mut(&location) {
                    entry.state = LifecycleState::Initialized;
                }
                tracing::debug!(location = %location, "service initialized");
                ran += 1;
            }
        }
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Services (typed accessor)
// ---------------------------------------------------------------------------

/// Read-only view over the registry, handed to service factories.
///
/// Lets a factory look up sibling services by location, either as handles
/// or as their concrete types.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    registry: &'a ServiceRegistry,
}

impl<'a> Services<'a> {
    #[must_use]
    pub fn new(registry: &'a ServiceRegistry) -> Self {
        Self { registry }
    }

    /// Handle bound at `location`.
    ///
    /// # Errors
    ///
    /// `NotFound` if nothing is registered there.
    pub fn get(&self, location: &str) -> ServiceResult<ServiceHandle> {
        self.registry.get(location)
    }

    /// Service at `location` as its concrete type.
    #[must_use]
    pub fn typed<S: ServiceCore>(&self, location: &str) -> Option<Arc<S>> {
        self.registry.get_typed(location)
    }

    #[must_use]
    pub fn locations(&self) -> Vec<String> {
        self.registry.locations()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use tern_core::{Method, Methods};

    use super::*;

    /// Test service that tracks setup calls via atomic counters.
    struct TestService {
        setup_counter: AtomicU32,
        /// Tracks global setup ordering across services.
        order_log: Arc<parking_lot::Mutex<Vec<String>>>,
    }

    impl TestService {
        fn new(order_log: Arc<parking_lot::Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                setup_counter: AtomicU32::new(0),
                order_log,
            })
        }
    }

    #[async_trait]
    impl ServiceCore for TestService {
        fn methods(&self) -> Methods {
            Methods::READ
        }

        async fn setup(&self, _app: &Application, location: &str) -> anyhow::Result<()> {
            self.setup_counter.fetch_add(1, Ordering::SeqCst);
            self.order_log.lock().push(format!("setup:{location}"));
            Ok(())
        }
    }

    /// A distinct service type for typed lookup testing.
    struct AnotherService;

    #[async_trait]
    impl ServiceCore for AnotherService {
        fn methods(&self) -> Methods {
            Methods::from(Method::Create)
        }
    }

    fn log() -> Arc<parking_lot::Mutex<Vec<String>>> {
        Arc::new(parking_lot::Mutex::new(Vec::new()))
    }

    #[test]
    fn normalize_strips_slashes() {
        assert_eq!(normalize_location("/messages/").unwrap(), "messages");
        assert_eq!(normalize_location("api/v1/users").unwrap(), "api/v1/users");
        assert!(matches!(
            normalize_location("//"),
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[test]
    fn register_and_get() {
        let registry = ServiceRegistry::new();
        let handle = registry
            .register("/messages", TestService::new(log()), ServiceOptions::new())
            .unwrap();

        let found = registry.get("messages").unwrap();
        assert!(found.ptr_eq(&handle));
        assert_eq!(found.location(), "messages");
        assert_eq!(registry.state("messages"), Some(LifecycleState::Registered));
    }

    #[test]
    fn get_unregistered_is_not_found() {
        let registry = ServiceRegistry::new();
        assert!(matches!(
            registry.get("nonexistent"),
            Err(ServiceError::NotFound(_))
        ));
        assert_eq!(registry.state("nonexistent"), None);
    }

    #[test]
    fn duplicate_location_is_conflict() {
        let registry = ServiceRegistry::new();
        let first = registry
            .register("users", TestService::new(log()), ServiceOptions::new())
            .unwrap();
        let err = registry
            .register("/users/", Arc::new(AnotherService), ServiceOptions::new())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        // The first binding survives.
        assert!(registry.get("users").unwrap().ptr_eq(&first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn typed_lookup() {
        let registry = ServiceRegistry::new();
        registry
            .register("another", Arc::new(AnotherService), ServiceOptions::new())
            .unwrap();

        assert!(registry.get_typed::<AnotherService>("another").is_some());
        assert!(registry.get_typed::<TestService>("another").is_none());
        assert!(Services::new(&registry).typed::<AnotherService>("another").is_some());
    }

    #[tokio::test]
    async fn setup_all_runs_in_registration_order_once() {
        let order = log();
        let registry = ServiceRegistry::new();
        let first = TestService::new(order.clone());
        registry
            .register("first", first.clone(), ServiceOptions::new())
            .unwrap();
        registry
            .register("second", TestService::new(order.clone()), ServiceOptions::new())
            .unwrap();
        registry
            .register("third", TestService::new(order.clone()), ServiceOptions::new())
            .unwrap();

        let app = Application::new();
        assert_eq!(registry.setup_all(&app).await.unwrap(), 3);
        assert_eq!(registry.setup_all(&app).await.unwrap(), 0);

        assert_eq!(
            order.lock().clone(),
            vec!["setup:first", "setup:second", "setup:third"]
        );
        assert_eq!(first.setup_counter.load(Ordering::SeqCst), 1);
        assert_eq!(registry.state("first"), Some(LifecycleState::Initialized));
    }

    #[test]
    fn handles_follow_registration_order() {
        let registry = ServiceRegistry::new();
        registry
            .register("b", Arc::new(AnotherService), ServiceOptions::new())
            .unwrap();
        registry
            .register("a", TestService::new(log()), ServiceOptions::new())
            .unwrap();

        let locations: Vec<_> = registry.handles().iter().map(|h| h.location().to_string()).collect();
        assert_eq!(locations, vec!["b", "a"]);
        assert!(registry.contains("/a"));
        assert!(!registry.contains("c"));
    }
}
