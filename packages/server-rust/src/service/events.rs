//! Service events: emission on successful mutations and filtered fan-out.
//!
//! Every [`ServiceHandle`](super::ServiceHandle) owns an [`EventHub`]. After a
//! successful `create`, `update`, `patch` or `remove` the handle emits one
//! [`ServiceEvent`] per resulting record. Each listener has its own unbounded
//! channel, so emitting never waits on a listener; listeners receive events
//! in emission order and are visited in subscription order.
//!
//! Filters are predicates over `(event, listener context)`. All filters that
//! apply to an event must accept it for a listener to receive it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tern_core::{Method, Methods};
use tokio::sync::mpsc;

/// Open description of a listener (for example a transport connection).
pub type ListenerContext = serde_json::Map<String, Value>;

/// Predicate deciding whether a listener receives an event.
pub type EventFilter = Arc<dyn Fn(&ServiceEvent, &ListenerContext) -> bool + Send + Sync>;

/// Identifier of a subscription within one hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// An event emitted after a successful mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceEvent {
    /// Location of the emitting service.
    pub location: Arc<str>,
    /// Method that produced the event.
    pub method: Method,
    /// The resulting record.
    pub data: Value,
}

impl ServiceEvent {
    #[must_use]
    pub fn new(location: Arc<str>, method: Method, data: Value) -> Self {
        Self {
            location,
            method,
            data,
        }
    }

    /// Event name: `created`, `updated`, `patched` or `removed`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.method.event_name().unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// EventHub
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Listener {
    id: ListenerId,
    methods: Methods,
    context: ListenerContext,
    tx: mpsc::UnboundedSender<ServiceEvent>,
}

#[derive(Clone)]
struct ScopedFilter {
    method: Option<Method>,
    predicate: EventFilter,
}

impl ScopedFilter {
    fn accepts(&self, event: &ServiceEvent, context: &ListenerContext) -> bool {
        match self.method {
            Some(method) if method != event.method => true,
            _ => (self.predicate)(event, context),
        }
    }
}

/// Listener registry and filter chain of one service.
pub struct EventHub {
    listeners: RwLock<Vec<Listener>>,
    filters: RwLock<Vec<ScopedFilter>>,
    next_id: AtomicU64,
}

impl EventHub {
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            filters: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribes to every event kind.
    pub fn subscribe(&self, context: ListenerContext) -> Subscription {
        self.subscribe_to(Methods::ALL, context)
    }

    /// Subscribes to the events produced by `methods` only.
    pub fn subscribe_to(&self, methods: Methods, context: ListenerContext) -> Subscription {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.write().push(Listener {
            id,
            methods,
            context,
            tx,
        });
        Subscription { id, rx }
    }

    /// Removes a listener. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    /// Number of live listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Appends a filter. `method` scopes it to one event kind; `None` applies
    /// it to all.
    pub fn add_filter(&self, method: Option<Method>, predicate: EventFilter) {
        self.filters.write().push(ScopedFilter { method, predicate });
    }

    /// Number of installed filters.
    #[must_use]
    pub fn filter_count(&self) -> usize {
        self.filters.read().len()
    }

    /// Delivers `event` to every accepting listener and returns how many
    /// received it. Listeners whose receiver is gone are pruned.
    ///
    /// Filters run on a snapshot taken without holding any lock, so a
    /// predicate may itself subscribe, unsubscribe or add filters. Those
    /// changes apply from the next emit.
    pub fn emit(&self, event: &ServiceEvent) -> usize {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .filter(|l| l.methods.contains(event.method))
            .cloned()
            .collect();
        let filters: Vec<ScopedFilter> = self.filters.read().clone();

        let mut delivered = 0;
        let mut closed = Vec::new();
        for listener in &listeners {
            if !filters.iter().all(|f| f.accepts(event, &listener.context)) {
                continue;
            }
            if listener.tx.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                closed.push(listener.id);
            }
        }
        if !closed.is_empty() {
            tracing::debug!(
                location = %event.location,
                pruned = closed.len(),
                "pruning closed event listeners"
            );
            self.listeners.write().retain(|l| !closed.contains(&l.id));
        }
        delivered
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("listeners", &self.listener_count())
            .field("filters", &self.filter_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Receiving end of one listener.
///
/// Dropping it unsubscribes lazily: the hub prunes it on its next emit.
#[derive(Debug)]
pub struct Subscription {
    id: ListenerId,
    rx: mpsc::UnboundedReceiver<ServiceEvent>,
}

impl Subscription {
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Waits for the next event. Returns `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<ServiceEvent> {
        self.rx.recv().await
    }

    /// Takes the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ServiceEvent> {
        self.rx.try_recv().ok()
    }

    /// Drains every queued event.
    pub fn drain(&mut self) -> Vec<ServiceEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn event(method: Method, data: Value) -> ServiceEvent {
        ServiceEvent::new(Arc::from("messages"), method, data)
    }

    fn ctx(value: Value) -> ListenerContext {
        match value {
            Value::Object(map) => map,
            _ => ListenerContext::new(),
        }
    }

    #[test]
    fn emits_to_all_listeners_in_order() {
        let hub = EventHub::new();
        let mut a = hub.subscribe(ListenerContext::new());
        let mut b = hub.subscribe(ListenerContext::new());

        assert_eq!(hub.emit(&event(Method::Create, json!({ "id": 1 }))), 2);
        assert_eq!(hub.emit(&event(Method::Remove, json!({ "id": 1 }))), 2);

        let names: Vec<_> = a.drain().iter().map(ServiceEvent::name).collect();
        assert_eq!(names, vec!["created", "removed"]);
        assert_eq!(b.drain().len(), 2);
    }

    #[test]
    fn subscribe_to_limits_event_kinds() {
        let hub = EventHub::new();
        let mut only_patch = hub.subscribe_to(Methods::from(Method::Patch), ListenerContext::new());

        hub.emit(&event(Method::Create, json!({})));
        hub.emit(&event(Method::Patch, json!({})));

        let got = only_patch.drain();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].method, Method::Patch);
    }

    #[test]
    fn filters_scope_delivery_by_listener_context() {
        let hub = EventHub::new();
        hub.add_filter(
            None,
            Arc::new(|event: &ServiceEvent, context: &ListenerContext| {
                event.data.get("room") == context.get("room")
            }),
        );
        let mut lobby = hub.subscribe(ctx(json!({ "room": "lobby" })));
        let mut kitchen = hub.subscribe(ctx(json!({ "room": "kitchen" })));

        assert_eq!(hub.emit(&event(Method::Create, json!({ "room": "lobby" }))), 1);
        assert_eq!(lobby.drain().len(), 1);
        assert!(kitchen.drain().is_empty());
    }

    #[test]
    fn scoped_filter_only_applies_to_its_method() {
        let hub = EventHub::new();
        hub.add_filter(
            Some(Method::Remove),
            Arc::new(|_: &ServiceEvent, _: &ListenerContext| false),
        );
        let mut sub = hub.subscribe(ListenerContext::new());

        hub.emit(&event(Method::Create, json!({})));
        hub.emit(&event(Method::Remove, json!({})));

        let got = sub.drain();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].method, Method::Create);
    }

    #[test]
    fn dropped_subscriptions_are_pruned() {
        let hub = EventHub::new();
        let sub = hub.subscribe(ListenerContext::new());
        let _kept = hub.subscribe(ListenerContext::new());
        drop(sub);

        assert_eq!(hub.emit(&event(Method::Create, json!({}))), 1);
        assert_eq!(hub.listener_count(), 1);
    }

    #[test]
    fn filters_may_reenter_the_hub() {
        let hub = Arc::new(EventHub::new());
        let weak = Arc::downgrade(&hub);
        hub.add_filter(
            None,
            Arc::new(move |_: &ServiceEvent, _: &ListenerContext| {
                if let Some(hub) = weak.upgrade() {
                    let accept_all: EventFilter =
                        Arc::new(|_: &ServiceEvent, _: &ListenerContext| true);
                    hub.add_filter(Some(Method::Remove), accept_all);
                    let extra = hub.subscribe(ListenerContext::new());
                    hub.unsubscribe(extra.id());
                }
                true
            }),
        );
        let mut sub = hub.subscribe(ListenerContext::new());

        assert_eq!(hub.emit(&event(Method::Create, json!({ "id": 1 }))), 1);
        assert_eq!(sub.drain().len(), 1);
        assert_eq!(hub.filter_count(), 2);
        assert_eq!(hub.listener_count(), 1);
    }

    #[test]
    fn unsubscribe_removes_listener() {
        let hub = EventHub::new();
        let sub = hub.subscribe(ListenerContext::new());
        assert!(hub.unsubscribe(sub.id()));
        assert!(!hub.unsubscribe(sub.id()));
        assert_eq!(hub.listener_count(), 0);
    }

    #[tokio::test]
    async fn recv_waits_for_next_event() {
        let hub = Arc::new(EventHub::new());
        let mut sub = hub.subscribe(ListenerContext::new());

        let emitter = hub.clone();
        tokio::spawn(async move {
            emitter.emit(&event(Method::Update, json!({ "id": 9 })));
        });

        let got = sub.recv().await.unwrap();
        assert_eq!(got.name(), "updated");
        assert_eq!(got.data["id"], 9);
    }
}
