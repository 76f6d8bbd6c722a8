//! In-memory item cache
//!
//! Entries are loaded from the server on first access and then kept current
//! from item events on the internal bus. A disconnect clears the cache, since
//! events missed while offline cannot be replayed.

use async_trait::async_trait;
use dashmap::DashMap;
use oh_core::{Event, EventKind, ItemInfo, SystemEvent};
use oh_event_bus::{callback, EventBus, SubscriptionId};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::client::RestClient;
use crate::error::RestResult;

/// Where cache misses are loaded from
#[async_trait]
pub trait ItemSource: Send + Sync {
    async fn fetch_item(&self, name: &str) -> RestResult<ItemInfo>;
}

#[async_trait]
impl ItemSource for RestClient {
    async fn fetch_item(&self, name: &str) -> RestResult<ItemInfo> {
        self.get_item(name).await
    }
}

/// Event kinds that keep the cache current
const CACHE_EVENTS: [EventKind; 6] = [
    EventKind::ItemAdded,
    EventKind::ItemRemoved,
    EventKind::ItemUpdated,
    EventKind::ItemStateChanged,
    EventKind::GroupItemStateChanged,
    EventKind::ClientDisconnected,
];

pub struct ItemCache {
    items: DashMap<String, ItemInfo>,
    source: Arc<dyn ItemSource>,
}

impl ItemCache {
    pub fn new(source: Arc<dyn ItemSource>) -> Arc<Self> {
        Arc::new(Self {
            items: DashMap::new(),
            source,
        })
    }

    /// Get an item, loading it from the source on a miss
    pub async fn get(&self, name: &str) -> RestResult<ItemInfo> {
        if let Some(item) = self.items.get(name) {
            trace!(item = name, "Item cache hit");
            return Ok(item.clone());
        }

        debug!(item = name, "Item cache miss, loading");
        let item = self.source.fetch_item(name).await?;
        self.items.insert(name.to_string(), item.clone());
        Ok(item)
    }

    /// Get an item only if it is already cached
    pub fn get_cached(&self, name: &str) -> Option<ItemInfo> {
        self.items.get(name).map(|item| item.clone())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&self) {
        self.items.clear();
    }

    /// Update the cache from one event
    pub fn apply(&self, event: &Event) {
        match event {
            Event::ItemAdded(e) => {
                self.items.insert(e.item.name.clone(), e.item.clone());
            }
            Event::ItemUpdated(e) => {
                self.items.insert(e.item.name.clone(), e.item.clone());
            }
            Event::ItemRemoved(e) => {
                self.items.remove(&e.item.name);
            }
            Event::ItemStateChanged(e) => self.set_state(&e.item, &e.state.value),
            Event::GroupItemStateChanged(e) => self.set_state(&e.item, &e.state.value),
            Event::System(SystemEvent::Disconnected) => {
                debug!(entries = self.items.len(), "Clearing item cache after disconnect");
                self.clear();
            }
            _ => {}
        }
    }

    /// Keep the cache current from events on `bus`
    pub fn subscribe(self: &Arc<Self>, bus: &EventBus) -> Vec<SubscriptionId> {
        CACHE_EVENTS
            .iter()
            .map(|kind| {
                let cache = Arc::clone(self);
                bus.subscribe(
                    "",
                    *kind,
                    callback(move |event| {
                        cache.apply(&event);
                        async {}
                    }),
                )
            })
            .collect()
    }

    fn set_state(&self, name: &str, state: &str) {
        // Uncached items are loaded on demand with their current state
        if let Some(mut item) = self.items.get_mut(name) {
            item.state = Some(state.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RestError;
    use oh_core::{ItemEvent, ItemStateChangedEvent, StateValue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl ItemSource for FakeSource {
        async fn fetch_item(&self, name: &str) -> RestResult<ItemInfo> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if name == "Missing" {
                return Err(RestError::NotFound(name.to_string()));
            }
            Ok(item(name, "OFF"))
        }
    }

    fn item(name: &str, state: &str) -> ItemInfo {
        ItemInfo {
            item_type: "Switch".to_string(),
            name: name.to_string(),
            state: Some(state.to_string()),
            ..ItemInfo::default()
        }
    }

    fn cache() -> (Arc<ItemCache>, Arc<FakeSource>) {
        let source = Arc::new(FakeSource {
            fetches: AtomicUsize::new(0),
        });
        (ItemCache::new(source.clone()), source)
    }

    fn changed(name: &str, state: &str) -> Event {
        Event::ItemStateChanged(ItemStateChangedEvent {
            topic: format!("openhab/items/{name}/statechanged"),
            item: name.to_string(),
            state: StateValue::new("OnOff", state),
            previous: StateValue::new("OnOff", "OFF"),
        })
    }

    #[tokio::test]
    async fn test_lazy_load_once() {
        let (cache, source) = cache();
        assert_eq!(cache.get("Light").await.unwrap().name, "Light");
        assert_eq!(cache.get("Light").await.unwrap().name, "Light");
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached() {
        let (cache, _) = cache();
        let result = cache.get("Missing").await;
        assert!(result.unwrap_err().is_not_found());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_events_keep_cache_current() {
        let (cache, _) = cache();
        cache.get("Light").await.unwrap();

        cache.apply(&changed("Light", "ON"));
        assert_eq!(cache.get_cached("Light").unwrap().state.as_deref(), Some("ON"));

        // State changes for unknown items do not create entries
        cache.apply(&changed("Other", "ON"));
        assert!(cache.get_cached("Other").is_none());

        cache.apply(&Event::ItemAdded(ItemEvent {
            topic: "openhab/items/Fan/added".to_string(),
            item: item("Fan", "ON"),
        }));
        assert!(cache.get_cached("Fan").is_some());

        cache.apply(&Event::ItemRemoved(ItemEvent {
            topic: "openhab/items/Fan/removed".to_string(),
            item: item("Fan", "ON"),
        }));
        assert!(cache.get_cached("Fan").is_none());
    }

    #[tokio::test]
    async fn test_disconnect_clears_via_bus() {
        let (cache, _) = cache();
        let bus = EventBus::new("internal");
        let ids = cache.subscribe(&bus);
        assert_eq!(ids.len(), CACHE_EVENTS.len());

        cache.get("Light").await.unwrap();
        bus.publish(changed("Light", "ON"));
        bus.drain().await;
        assert_eq!(cache.get_cached("Light").unwrap().state.as_deref(), Some("ON"));

        bus.publish(SystemEvent::Disconnected.into());
        bus.drain().await;
        assert!(cache.is_empty());
    }
}
