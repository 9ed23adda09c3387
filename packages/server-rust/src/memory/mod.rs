//! In-memory [`ServiceCore`] implementation.
//!
//! Records are JSON objects keyed by their id field (`"id"` unless
//! configured otherwise) in an ordered map, so unsorted results come back in
//! id order. Missing ids are allocated from a counter starting at 0. Queries
//! follow the conventions of [`tern_core::query`]; `update`, `patch` and
//! `remove` with a `None` id act on every record the query selects.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tern_core::{
    FindResult, Id, Method, Methods, PaginateConfig, Params, ParsedQuery, Payload, ServiceError,
    ServiceResult,
};

use crate::app::Application;
use crate::service::ServiceCore;

type Store = BTreeMap<Id, Value>;

/// In-memory service over an ordered map of JSON records.
///
/// Every call takes the store lock once, so each call (including bulk ones)
/// is applied atomically with respect to other calls.
pub struct MemoryService {
    id_field: String,
    methods: Methods,
    /// Set at construction or adopted from the application during setup.
    paginate: RwLock<Option<PaginateConfig>>,
    store: RwLock<Store>,
    next_id: AtomicI64,
}

impl MemoryService {
    /// Creates an empty service implementing all six methods, without
    /// pagination.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id_field: "id".to_string(),
            methods: Methods::ALL,
            paginate: RwLock::new(None),
            store: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(0),
        }
    }

    #[must_use]
    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    /// Paginates `find` results unless a call opts out.
    #[must_use]
    pub fn with_paginate(self, paginate: PaginateConfig) -> Self {
        *self.paginate.write() = Some(paginate);
        self
    }

    /// Restricts the methods this service exposes.
    #[must_use]
    pub fn with_methods(mut self, methods: Methods) -> Self {
        self.methods = methods;
        self
    }

    #[must_use]
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    #[must_use]
    pub fn paginate(&self) -> Option<PaginateConfig> {
        *self.paginate.read()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }

    // -- helpers -----------------------------------------------------------

    fn object(method: Method, data: Value) -> ServiceResult<Map<String, Value>> {
        match data {
            Value::Object(map) => Ok(map),
            other => Err(ServiceError::BadRequest(format!(
                "`{method}` expects an object, got {other}"
            ))),
        }
    }

    /// Query for calls that never paginate (everything except `find`).
    fn unpaged(params: &Params) -> ServiceResult<ParsedQuery> {
        ParsedQuery::parse(&params.query, None)
    }

    fn select(&self, query: &ParsedQuery, record: Value) -> Value {
        match &query.filters.select {
            Some(fields) => tern_core::query::select_fields(record, fields, &self.id_field),
            None => record,
        }
    }

    fn allocate_id(&self, store: &Store, staged: &[(Id, Value)]) -> Id {
        loop {
            let id = Id::Int(self.next_id.fetch_add(1, Ordering::Relaxed));
            if !store.contains_key(&id) && staged.iter().all(|(taken, _)| *taken != id) {
                return id;
            }
        }
    }

    /// Ids a call acts on: the given id (if it exists and matches the query)
    /// or, for `None`, every record the query selects.
    fn targets(store: &Store, id: Option<&Id>, query: &ParsedQuery) -> ServiceResult<Vec<Id>> {
        match id {
            Some(id) => match store.get(id) {
                Some(record) if query.criteria.matches(record) => Ok(vec![id.clone()]),
                _ => Err(ServiceError::not_found(format!("id `{id}`"))),
            },
            None => Ok(store
                .iter()
                .filter(|(_, record)| query.criteria.matches(record))
                .map(|(id, _)| id.clone())
                .collect()),
        }
    }

    /// A single record for an id call, an array for a bulk call.
    fn shape(single: bool, records: Vec<Value>) -> Value {
        if single {
            records.into_iter().next().unwrap_or(Value::Null)
        } else {
            Value::Array(records)
        }
    }

    fn stamp(&self, mut record: Map<String, Value>, id: &Id) -> Value {
        record.insert(self.id_field.clone(), id.to_value());
        Value::Object(record)
    }
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryService")
            .field("id_field", &self.id_field)
            .field("methods", &self.methods)
            .field("paginate", &self.paginate())
            .field("records", &self.len())
            .finish()
    }
}

#[async_trait]
impl ServiceCore for MemoryService {
    fn methods(&self) -> Methods {
        self.methods
    }

    async fn find(&self, params: Params) -> ServiceResult<FindResult> {
        let paginate = params.paginate.resolve(self.paginate());
        let query = ParsedQuery::parse(&params.query, paginate)?;
        let records: Vec<Value> = self.store.read().values().cloned().collect();
        Ok(query.execute(records, &self.id_field))
    }

    async fn get(&self, id: Id, params: Params) -> ServiceResult<Value> {
        let query = Self::unpaged(&params)?;
        let store = self.store.read();
        match store.get(&id) {
            Some(record) if query.criteria.matches(record) => {
                Ok(self.select(&query, record.clone()))
            }
            _ => Err(ServiceError::not_found(format!("id `{id}`"))),
        }
    }

    async fn create(&self, data: Payload, params: Params) -> ServiceResult<Payload> {
        let query = Self::unpaged(&params)?;

        let mut store = self.store.write();
        // Validate the whole batch before inserting anything.
        let mut staged: Vec<(Id, Value)> = Vec::with_capacity(data.len());
        for item in data.records() {
            let record = Self::object(Method::Create, item.clone())?;
            let id = match record.get(&self.id_field) {
                Some(value) if !value.is_null() => Id::from_value(value).ok_or_else(|| {
                    ServiceError::BadRequest(format!(
                        "`{}` must be a string or an integer, got {value}",
                        self.id_field
                    ))
                })?,
                _ => self.allocate_id(&store, &staged),
            };
            if store.contains_key(&id) || staged.iter().any(|(taken, _)| *taken == id) {
                return Err(ServiceError::Conflict(format!("id `{id}` already exists")));
            }
            let record = self.stamp(record, &id);
            staged.push((id, record));
        }

        let created: Vec<Value> = staged
            .into_iter()
            .map(|(id, record)| {
                store.insert(id, record.clone());
                self.select(&query, record)
            })
            .collect();
        drop(store);

        Ok(data.reshape(created))
    }

    async fn update(&self, id: Option<Id>, data: Value, params: Params) -> ServiceResult<Value> {
        let data = Self::object(Method::Update, data)?;
        let query = Self::unpaged(&params)?;

        let mut store = self.store.write();
        let targets = Self::targets(&store, id.as_ref(), &query)?;
        let updated = targets
            .into_iter()
            .map(|target| {
                let record = self.stamp(data.clone(), &target);
                store.insert(target, record.clone());
                self.select(&query, record)
            })
            .collect();
        Ok(Self::shape(id.is_some(), updated))
    }

    async fn patch(&self, id: Option<Id>, data: Value, params: Params) -> ServiceResult<Value> {
        let data = Self::object(Method::Patch, data)?;
        let query = Self::unpaged(&params)?;

        let mut store = self.store.write();
        let targets = Self::targets(&store, id.as_ref(), &query)?;
        let mut patched = Vec::with_capacity(targets.len());
        for target in targets {
            let Some(Value::Object(record)) = store.get_mut(&target) else {
                continue;
            };
            for (key, value) in &data {
                if *key != self.id_field {
                    record.insert(key.clone(), value.clone());
                }
            }
            patched.push(self.select(&query, Value::Object(record.clone())));
        }
        Ok(Self::shape(id.is_some(), patched))
    }

    async fn remove(&self, id: Option<Id>, params: Params) -> ServiceResult<Value> {
        let query = Self::unpaged(&params)?;

        let mut store = self.store.write();
        let targets = Self::targets(&store, id.as_ref(), &query)?;
        let removed = targets
            .into_iter()
            .filter_map(|target| store.remove(&target))
            .map(|record| self.select(&query, record))
            .collect();
        Ok(Self::shape(id.is_some(), removed))
    }

    async fn setup(&self, app: &Application, location: &str) -> anyhow::Result<()> {
        let mut paginate = self.paginate.write();
        if paginate.is_none() {
            if let Some(inherited) = app.config().paginate {
                tracing::debug!(location, ?inherited, "adopting application pagination");
                *paginate = Some(inherited);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use proptest::prelude::*;
    use serde_json::json;
    use tern_core::{Page, Paginate};

    use super::*;
    use crate::service::{
        Callback, ListenerContext, ServerConfig, ServiceCall, ServiceEvent, ServiceHandle,
        ServiceOptions, ServiceResponse,
    };

    fn query(value: Value) -> Params {
        Params::from_query(value).unwrap()
    }

    fn messages(app: &Application) -> ServiceHandle {
        app.register("messages", MemoryService::new(), ServiceOptions::new())
            .unwrap()
    }

    async fn seed(service: &MemoryService, records: Value) {
        service.create(Payload::from_value(records), Params::new()).await.unwrap();
    }

    fn list(result: FindResult) -> Vec<Value> {
        match result {
            FindResult::List(items) => items,
            FindResult::Page(page) => panic!("expected a list, got {page:?}"),
        }
    }

    fn page(result: FindResult) -> Page {
        match result {
            FindResult::Page(page) => page,
            FindResult::List(items) => panic!("expected a page, got {items:?}"),
        }
    }

    #[tokio::test]
    async fn get_after_create_returns_the_record() {
        let service = MemoryService::new();
        let created = service
            .create(Payload::One(json!({ "text": "hello" })), Params::new())
            .await
            .unwrap();
        let Payload::One(created) = created else {
            panic!("single create must return a single record");
        };
        assert_eq!(created, json!({ "text": "hello", "id": 0 }));

        let fetched = service.get(Id::Int(0), Params::new()).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn create_mirrors_input_cardinality() {
        let service = MemoryService::new();
        let many = service
            .create(
                Payload::Many(vec![json!({ "n": 1 }), json!({ "n": 2 })]),
                Params::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            many,
            Payload::Many(vec![json!({ "n": 1, "id": 0 }), json!({ "n": 2, "id": 1 })])
        );

        let empty = service.create(Payload::Many(vec![]), Params::new()).await.unwrap();
        assert_eq!(empty, Payload::Many(vec![]));
        assert_eq!(service.len(), 2);
    }

    #[tokio::test]
    async fn explicit_ids_are_kept_and_conflicts_rejected() {
        let service = MemoryService::new().with_id_field("_id");
        seed(&service, json!([{ "_id": "ada" }, { "_id": 0 }])).await;

        // Allocation skips ids that are already taken.
        let created = service
            .create(Payload::One(json!({ "name": "bob" })), Params::new())
            .await
            .unwrap();
        assert_eq!(created.into_value()["_id"], 1);

        let err = service
            .create(Payload::One(json!({ "_id": "ada" })), Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        // A conflicting batch inserts nothing.
        let err = service
            .create(
                Payload::Many(vec![json!({ "_id": "carl" }), json!({ "_id": "carl" })]),
                Params::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(service.len(), 3);
    }

    #[tokio::test]
    async fn non_object_data_is_bad_request() {
        let service = MemoryService::new();
        let err = service
            .create(Payload::One(json!("text")), Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));

        seed(&service, json!({ "n": 1 })).await;
        let err = service
            .patch(Some(Id::Int(0)), json!([1]), Params::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), 400);
    }

    #[tokio::test]
    async fn unknown_and_removed_ids_are_not_found() {
        let service = MemoryService::new();
        assert!(matches!(
            service.get(Id::Int(42), Params::new()).await,
            Err(ServiceError::NotFound(_))
        ));

        seed(&service, json!({ "text": "bye" })).await;
        let removed = service.remove(Some(Id::Int(0)), Params::new()).await.unwrap();
        assert_eq!(removed, json!({ "text": "bye", "id": 0 }));

        assert!(matches!(
            service.get(Id::Int(0), Params::new()).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.remove(Some(Id::Int(0)), Params::new()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn patch_merges_and_update_replaces() {
        let service = MemoryService::new();
        seed(&service, json!({ "text": "hi", "read": false })).await;

        let patched = service
            .patch(Some(Id::Int(0)), json!({ "read": true, "id": 99 }), Params::new())
            .await
            .unwrap();
        assert_eq!(patched, json!({ "text": "hi", "read": true, "id": 0 }));

        let updated = service
            .update(Some(Id::Int(0)), json!({ "text": "replaced" }), Params::new())
            .await
            .unwrap();
        assert_eq!(updated, json!({ "text": "replaced", "id": 0 }));
        assert_eq!(service.get(Id::Int(0), Params::new()).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn id_calls_respect_the_query() {
        let service = MemoryService::new();
        seed(&service, json!({ "room": "lobby" })).await;

        let err = service
            .get(Id::Int(0), query(json!({ "room": "kitchen" })))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err = service
            .remove(Some(Id::Int(0)), query(json!({ "room": "kitchen" })))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(service.len(), 1);
    }

    #[tokio::test]
    async fn bulk_mutations_act_on_query_selection() {
        let service = MemoryService::new();
        seed(
            &service,
            json!([
                { "room": "a", "n": 1 },
                { "room": "b", "n": 2 },
                { "room": "a", "n": 3 }
            ]),
        )
        .await;

        let patched = service
            .patch(None, json!({ "seen": true }), query(json!({ "room": "a" })))
            .await
            .unwrap();
        assert_eq!(
            patched,
            json!([
                { "room": "a", "n": 1, "id": 0, "seen": true },
                { "room": "a", "n": 3, "id": 2, "seen": true }
            ])
        );

        let updated = service
            .update(None, json!({ "room": "c" }), query(json!({ "seen": true })))
            .await
            .unwrap();
        assert_eq!(updated, json!([{ "room": "c", "id": 0 }, { "room": "c", "id": 2 }]));

        let removed = service
            .remove(None, query(json!({ "room": { "$in": ["b", "c"] } })))
            .await
            .unwrap();
        assert_eq!(removed.as_array().map(Vec::len), Some(3));
        assert!(service.is_empty());

        // A bulk call over nothing is an empty array, not an error.
        let none = service.remove(None, Params::new()).await.unwrap();
        assert_eq!(none, json!([]));
    }

    #[tokio::test]
    async fn find_by_query_returns_created_record() {
        let service = MemoryService::new();
        seed(&service, json!([{ "name": "ada" }, { "name": "bob" }])).await;

        let found = list(service.find(query(json!({ "name": "bob" }))).await.unwrap());
        assert_eq!(found, vec![json!({ "name": "bob", "id": 1 })]);
    }

    #[tokio::test]
    async fn find_sorts_selects_and_slices() {
        let service = MemoryService::new();
        seed(
            &service,
            json!([
                { "name": "c", "age": 30 },
                { "name": "a", "age": 20 },
                { "name": "b", "age": 40 }
            ]),
        )
        .await;

        let found = list(
            service
                .find(query(json!({
                    "age": { "$gte": 25 },
                    "$sort": { "name": -1 },
                    "$select": ["name"]
                })))
                .await
                .unwrap(),
        );
        assert_eq!(found, vec![json!({ "name": "c", "id": 0 }), json!({ "name": "b", "id": 2 })]);

        let found = list(
            service
                .find(query(json!({ "$sort": { "age": 1 }, "$skip": 1, "$limit": 1 })))
                .await
                .unwrap(),
        );
        assert_eq!(found, vec![json!({ "name": "c", "age": 30, "id": 0 })]);

        let err = service
            .find(query(json!({ "age": { "$near": 1 } })))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn pagination_envelope_and_opt_out() {
        let service = MemoryService::new().with_paginate(PaginateConfig::new(2, 3));
        seed(&service, json!([{}, {}, {}, {}, {}])).await;

        let first = page(service.find(Params::new()).await.unwrap());
        assert_eq!((first.total, first.limit, first.skip, first.data.len()), (5, 2, 0, 2));
        assert!(first.has_more());

        // $limit is capped at max.
        let capped = page(service.find(query(json!({ "$limit": 10, "$skip": 3 }))).await.unwrap());
        assert_eq!((capped.limit, capped.skip, capped.data.len()), (3, 3, 2));

        let all = list(service.find(Params::new().without_pagination()).await.unwrap());
        assert_eq!(all.len(), 5);

        let custom = Params::new().with_paginate(Paginate::Config(PaginateConfig::new(4, 4)));
        assert_eq!(page(service.find(custom).await.unwrap()).data.len(), 4);
    }

    #[tokio::test]
    async fn skip_past_end_is_clamped_to_total() {
        let service = MemoryService::new().with_paginate(PaginateConfig::new(10, 10));
        seed(&service, json!([{}, {}])).await;

        let past = page(service.find(query(json!({ "$skip": 5 }))).await.unwrap());
        assert_eq!((past.total, past.limit, past.skip), (2, 10, 2));
        assert!(past.data.is_empty());
        assert!(past.skip + past.data.len() <= past.total);
    }

    #[tokio::test]
    async fn bulk_remove_matches_large_integers_exactly() {
        let service = MemoryService::new();
        seed(
            &service,
            json!([
                { "n": 9_007_199_254_740_992_i64 },
                { "n": 9_007_199_254_740_993_i64 }
            ]),
        )
        .await;

        let removed = service
            .remove(None, query(json!({ "n": 9_007_199_254_740_992_i64 })))
            .await
            .unwrap();
        assert_eq!(removed, json!([{ "n": 9_007_199_254_740_992_i64, "id": 0 }]));
        assert_eq!(service.len(), 1);
        assert_eq!(
            service.get(Id::Int(1), Params::new()).await.unwrap()["n"],
            json!(9_007_199_254_740_993_i64)
        );
    }

    #[tokio::test]
    async fn setup_adopts_application_pagination() {
        let app = Application::with_config(ServerConfig {
            paginate: Some(PaginateConfig::new(1, 10)),
            ..ServerConfig::default()
        });
        let plain = messages(&app);
        app.register(
            "custom",
            MemoryService::new().with_paginate(PaginateConfig::new(5, 5)),
            ServiceOptions::new(),
        )
        .unwrap();
        app.setup().await.unwrap();

        let inherited = plain.downcast::<MemoryService>().unwrap().paginate();
        assert_eq!(inherited, Some(PaginateConfig::new(1, 10)));
        let own = app
            .service("custom")
            .unwrap()
            .downcast::<MemoryService>()
            .unwrap()
            .paginate();
        assert_eq!(own, Some(PaginateConfig::new(5, 5)));
    }

    #[tokio::test]
    async fn mutations_emit_one_event_per_record() {
        let app = Application::new();
        let handle = messages(&app);
        let mut listener = handle.subscribe(ListenerContext::new());

        handle
            .create(json!([{ "room": "a" }, { "room": "b" }]), Params::new())
            .await
            .unwrap();
        handle.get(0, Params::new()).await.unwrap();
        handle.find(Params::new()).await.unwrap();
        handle
            .patch(None, json!({ "seen": true }), Params::new())
            .await
            .unwrap();
        handle
            .update(Some(Id::Int(1)), json!({ "room": "c" }), Params::new())
            .await
            .unwrap();
        handle.remove(Some(Id::Int(0)), Params::new()).await.unwrap();

        let names: Vec<_> = listener.drain().iter().map(ServiceEvent::name).collect();
        assert_eq!(
            names,
            vec!["created", "created", "patched", "patched", "updated", "removed"]
        );
    }

    #[tokio::test]
    async fn failed_mutations_do_not_emit() {
        let app = Application::new();
        let handle = messages(&app);
        let mut listener = handle.subscribe(ListenerContext::new());

        assert!(handle.remove(Some(Id::Int(7)), Params::new()).await.is_err());
        assert!(listener.try_recv().is_none());
    }

    #[tokio::test]
    async fn filters_scope_events_to_listener_context() {
        let app = Application::new();
        let handle = messages(&app);
        handle
            .filter(|event: &ServiceEvent, context: &ListenerContext| {
                event.data.get("room") == context.get("room")
            })
            .filter_event(Method::Remove, |_: &ServiceEvent, context: &ListenerContext| {
                context.get("admin") == Some(&json!(true))
            });

        let context = |value: Value| match value {
            Value::Object(map) => map,
            _ => ListenerContext::new(),
        };
        let mut lobby = handle.subscribe(context(json!({ "room": "lobby" })));
        let mut admin = handle.subscribe(context(json!({ "room": "lobby", "admin": true })));

        handle.create(json!({ "room": "lobby" }), Params::new()).await.unwrap();
        handle.create(json!({ "room": "attic" }), Params::new()).await.unwrap();
        handle.remove(Some(Id::Int(0)), Params::new()).await.unwrap();

        let lobby_events: Vec<_> = lobby.drain().iter().map(ServiceEvent::name).collect();
        assert_eq!(lobby_events, vec!["created"]);
        let admin_events: Vec<_> = admin.drain().iter().map(ServiceEvent::name).collect();
        assert_eq!(admin_events, vec!["created", "removed"]);
    }

    #[tokio::test]
    async fn restricted_users_service_rejects_update() {
        let app = Application::new();
        let users = app
            .register(
                "users",
                MemoryService::new().with_methods(Methods::READ | Method::Create),
                ServiceOptions::new(),
            )
            .unwrap();

        users.create(json!({ "name": "ada" }), Params::new()).await.unwrap();
        let err = users
            .update(Some(Id::Int(0)), json!({ "name": "bob" }), Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::MethodNotAllowed { method: Method::Update, .. }));
        assert_eq!(err.code(), 405);
        assert_eq!(users.get(0, Params::new()).await.unwrap()["name"], "ada");
    }

    #[tokio::test]
    async fn callback_and_future_observe_the_same_result() {
        let app = Application::new();
        let handle = messages(&app);

        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let callback: Callback<ServiceResponse> =
            Box::new(move |result: Result<&ServiceResponse, &ServiceError>| {
            *sink.lock().unwrap() = Some(result.map(Clone::clone).map_err(ServiceError::code));
        });

        let deferred = handle.call_with_callback(
            ServiceCall::Create {
                data: Payload::One(json!({ "text": "hi" })),
                params: Params::new(),
            },
            callback,
        );
        let response = deferred.await.unwrap();

        assert_eq!(response, ServiceResponse::Created(Payload::One(json!({ "text": "hi", "id": 0 }))));
        assert_eq!(seen.lock().unwrap().clone(), Some(Ok(response)));

        let (tx, rx) = tokio::sync::oneshot::channel();
        let deferred = handle.call_with_callback(
            ServiceCall::Get {
                id: Id::Int(5),
                params: Params::new(),
            },
            Box::new(move |result: Result<&ServiceResponse, &ServiceError>| {
                let _ = tx.send(result.err().map(ServiceError::code));
            }),
        );
        assert_eq!(deferred.await.unwrap_err().code(), 404);
        assert_eq!(rx.await.unwrap(), Some(404));
    }

    proptest! {
        #[test]
        fn paginated_find_respects_envelope_invariants(
            count in 0usize..40,
            default in 1usize..10,
            max in 1usize..10,
            limit in proptest::option::of(0usize..20),
            skip in 0usize..50,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let service = MemoryService::new().with_paginate(PaginateConfig::new(default, max));
            let mut params = Params::new();
            params.query.insert("$skip".to_string(), json!(skip));
            if let Some(limit) = limit {
                params.query.insert("$limit".to_string(), json!(limit));
            }

            let found = runtime.block_on(async {
                service
                    .create(Payload::Many(vec![json!({}); count]), Params::new())
                    .await
                    .unwrap();
                service.find(params).await.unwrap()
            });
            let page = page(found);

            prop_assert_eq!(page.total, count);
            prop_assert_eq!(page.skip, skip.min(count));
            prop_assert!(page.limit <= max);
            prop_assert!(page.data.len() <= page.limit);
            prop_assert!(page.skip + page.data.len() <= page.total);
            prop_assert_eq!(page.data.len(), count.saturating_sub(skip).min(page.limit));
        }
    }
}
