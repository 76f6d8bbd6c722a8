//! Event bus with callback pub/sub for the rule engine
//!
//! Subscriptions are keyed by an exact topic filter (empty matches any topic)
//! and an [`EventKind`]. Every matching callback runs as its own task, so a
//! slow or panicking subscriber never blocks the publisher or other
//! subscribers. [`EventBus::drain`] waits for every dispatched callback to
//! return, which is what lets the process exit only after user code is done.

use futures::future::BoxFuture;
use futures::FutureExt;
use oh_core::{Event, EventKind};
use std::any::Any;
use std::backtrace::Backtrace;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, trace};

/// Callback invoked for every matching event
pub type Callback = Arc<dyn Fn(Arc<Event>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure into a [`Callback`]
pub fn callback<F, Fut>(f: F) -> Callback
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |event| f(event).boxed())
}

/// A unique identifier for a subscription
///
/// Ids are assigned monotonically and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Subscription {
    id: SubscriptionId,
    topic: String,
    kind: EventKind,
    callback: Callback,
    /// Cleared on unsubscribe so already-spawned dispatches become no-ops
    active: AtomicBool,
}

impl Subscription {
    fn matches(&self, event: &Event) -> bool {
        self.kind == event.kind() && (self.topic.is_empty() || self.topic == event.topic())
    }
}

/// The event bus for publishing and subscribing to events
///
/// The subscription list is copy-on-write: `publish` clones the current
/// `Arc` under the lock and iterates the snapshot without holding it.
pub struct EventBus {
    /// Name used in log output, e.g. "internal" or "user"
    name: &'static str,
    /// Active subscriptions in insertion order
    subscriptions: Mutex<Arc<Vec<Arc<Subscription>>>>,
    /// Counter for generating unique subscription IDs
    next_id: AtomicU64,
    /// Outstanding callback tasks
    tasks: TaskTracker,
}

impl EventBus {
    /// Create a new event bus
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            subscriptions: Mutex::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(1),
            tasks: TaskTracker::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Subscribe to events of `kind`, optionally restricted to one topic
    pub fn subscribe(
        &self,
        topic: impl Into<String>,
        kind: EventKind,
        callback: Callback,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let topic = topic.into();
        trace!(bus = self.name, %id, %topic, %kind, "Subscribing");

        let subscription = Arc::new(Subscription {
            id,
            topic,
            kind,
            callback,
            active: AtomicBool::new(true),
        });

        let mut guard = self.lock();
        Arc::make_mut(&mut guard).push(subscription);
        id
    }

    /// Remove a subscription
    ///
    /// Unknown ids are ignored. Once this returns no new invocation of the
    /// subscription's callback begins.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut guard = self.lock();
        let Some(pos) = guard.iter().position(|s| s.id == id) else {
            return;
        };

        guard[pos].active.store(false, Ordering::Release);
        Arc::make_mut(&mut guard).remove(pos);
        trace!(bus = self.name, %id, "Unsubscribed");
    }

    /// Publish an event to all matching subscribers
    ///
    /// Each callback runs as an independent task; panics are caught and
    /// logged at the dispatch boundary.
    pub fn publish(&self, event: Event) {
        let snapshot = self.lock().clone();
        let event = Arc::new(event);

        let mut dispatched = 0usize;
        for subscription in snapshot.iter().filter(|s| s.matches(&event)) {
            self.tasks.spawn(dispatch(
                self.name,
                Arc::clone(subscription),
                Arc::clone(&event),
            ));
            dispatched += 1;
        }

        debug!(
            bus = self.name,
            kind = %event.kind(),
            topic = event.topic(),
            dispatched,
            "Published event"
        );
    }

    /// Wait until every callback dispatched so far has returned
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    /// Number of active subscriptions
    pub fn subscription_count(&self) -> usize {
        self.lock().len()
    }

    /// Active subscription ids in insertion order
    pub fn subscription_ids(&self) -> Vec<SubscriptionId> {
        self.lock().iter().map(|s| s.id).collect()
    }

    /// Number of callback tasks still running
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Arc<Vec<Arc<Subscription>>>> {
        // The lock is never held across user code, so a poisoned guard is still consistent.
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

async fn dispatch(bus: &'static str, subscription: Arc<Subscription>, event: Arc<Event>) {
    if !subscription.active.load(Ordering::Acquire) {
        trace!(bus, id = %subscription.id, "Skipping dispatch to removed subscription");
        return;
    }

    let id = subscription.id;
    let call = async move { (subscription.callback)(event).await };

    if let Err(panic) = AssertUnwindSafe(call).catch_unwind().await {
        error!(
            bus,
            subscription = %id,
            panic = %panic_message(panic.as_ref()),
            backtrace = %Backtrace::capture(),
            "Subscriber callback panicked"
        );
    }
}

/// Extract a readable message from a panic payload
pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Thread-safe wrapper for EventBus
pub type SharedEventBus = Arc<EventBus>;
