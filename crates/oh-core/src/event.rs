//! Event types delivered on the event bus

use serde::{Deserialize, Serialize};

/// Closed category of an event, independent of its topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ItemCommand,
    ItemState,
    ItemStateChanged,
    GroupItemStateChanged,
    ItemAdded,
    ItemRemoved,
    ItemUpdated,
    ThingStatusInfo,
    ThingStatusInfoChanged,
    ChannelTriggered,
    Generic,
    ClientConnected,
    ClientDisconnected,
    ConnectionStable,
    ClientStarted,
    ClientStopped,
    Error,
    Alive,
    TimeCronFired,
    RulePanic,
}

impl EventKind {
    /// Get the event kind as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ItemCommand => "item_command",
            EventKind::ItemState => "item_state",
            EventKind::ItemStateChanged => "item_state_changed",
            EventKind::GroupItemStateChanged => "group_item_state_changed",
            EventKind::ItemAdded => "item_added",
            EventKind::ItemRemoved => "item_removed",
            EventKind::ItemUpdated => "item_updated",
            EventKind::ThingStatusInfo => "thing_status_info",
            EventKind::ThingStatusInfoChanged => "thing_status_info_changed",
            EventKind::ChannelTriggered => "channel_triggered",
            EventKind::Generic => "generic",
            EventKind::ClientConnected => "client_connected",
            EventKind::ClientDisconnected => "client_disconnected",
            EventKind::ConnectionStable => "connection_stable",
            EventKind::ClientStarted => "client_started",
            EventKind::ClientStopped => "client_stopped",
            EventKind::Error => "error",
            EventKind::Alive => "alive",
            EventKind::TimeCronFired => "time_cron_fired",
            EventKind::RulePanic => "rule_panic",
        }
    }

    /// Whether the kind is generated by the client rather than the server
    pub fn is_system(&self) -> bool {
        matches!(
            self,
            EventKind::ClientConnected
                | EventKind::ClientDisconnected
                | EventKind::ConnectionStable
                | EventKind::ClientStarted
                | EventKind::ClientStopped
                | EventKind::Error
                | EventKind::Alive
                | EventKind::TimeCronFired
                | EventKind::RulePanic
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed state or command value, e.g. `{"type": "OnOff", "value": "ON"}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateValue {
    #[serde(rename = "type")]
    pub value_type: String,
    pub value: String,
}

impl StateValue {
    pub fn new(value_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            value_type: value_type.into(),
            value: value.into(),
        }
    }
}

/// Item definition as carried by item added/removed/updated events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemInfo {
    #[serde(rename = "type")]
    pub item_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub group_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Thing status as carried by thing status events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThingStatus {
    pub status: String,
    #[serde(default)]
    pub status_detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemCommandEvent {
    pub topic: String,
    pub item: String,
    pub command: StateValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemStateEvent {
    pub topic: String,
    pub item: String,
    pub state: StateValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemStateChangedEvent {
    pub topic: String,
    pub item: String,
    pub state: StateValue,
    pub previous: StateValue,
}

/// State change of a group item, caused by one of its members
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupItemStateChangedEvent {
    pub topic: String,
    pub item: String,
    pub member: String,
    pub state: StateValue,
    pub previous: StateValue,
}

/// Item added or removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemEvent {
    pub topic: String,
    pub item: ItemInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemUpdatedEvent {
    pub topic: String,
    pub item: ItemInfo,
    pub old: ItemInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThingStatusInfoEvent {
    pub topic: String,
    pub thing: String,
    pub status: ThingStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThingStatusInfoChangedEvent {
    pub topic: String,
    pub thing: String,
    pub status: ThingStatus,
    pub previous: ThingStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTriggeredEvent {
    pub topic: String,
    pub channel: String,
    pub event: String,
}

/// Fallback for event types without a dedicated decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericEvent {
    pub topic: String,
    pub event_type: String,
    pub payload: String,
}

/// Lifecycle events generated by the client itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemEvent {
    Connected,
    Disconnected,
    ConnectionStable,
    Started,
    Stopped,
    Error { message: String },
    Alive,
    TimeCronFired { rule_id: String },
    RulePanic { rule_id: String, message: String },
}

/// An event delivered on the event bus
///
/// Events are immutable once constructed. Every event exposes a topic
/// (empty for client-generated events) and a [`EventKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ItemCommand(ItemCommandEvent),
    ItemState(ItemStateEvent),
    ItemStateChanged(ItemStateChangedEvent),
    GroupItemStateChanged(GroupItemStateChangedEvent),
    ItemAdded(ItemEvent),
    ItemRemoved(ItemEvent),
    ItemUpdated(ItemUpdatedEvent),
    ThingStatusInfo(ThingStatusInfoEvent),
    ThingStatusInfoChanged(ThingStatusInfoChangedEvent),
    ChannelTriggered(ChannelTriggeredEvent),
    Generic(GenericEvent),
    System(SystemEvent),
}

impl Event {
    /// The topic this event concerns
    pub fn topic(&self) -> &str {
        match self {
            Event::ItemCommand(e) => &e.topic,
            Event::ItemState(e) => &e.topic,
            Event::ItemStateChanged(e) => &e.topic,
            Event::GroupItemStateChanged(e) => &e.topic,
            Event::ItemAdded(e) | Event::ItemRemoved(e) => &e.topic,
            Event::ItemUpdated(e) => &e.topic,
            Event::ThingStatusInfo(e) => &e.topic,
            Event::ThingStatusInfoChanged(e) => &e.topic,
            Event::ChannelTriggered(e) => &e.topic,
            Event::Generic(e) => &e.topic,
            Event::System(_) => "",
        }
    }

    /// The closed category of this event
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ItemCommand(_) => EventKind::ItemCommand,
            Event::ItemState(_) => EventKind::ItemState,
            Event::ItemStateChanged(_) => EventKind::ItemStateChanged,
            Event::GroupItemStateChanged(_) => EventKind::GroupItemStateChanged,
            Event::ItemAdded(_) => EventKind::ItemAdded,
            Event::ItemRemoved(_) => EventKind::ItemRemoved,
            Event::ItemUpdated(_) => EventKind::ItemUpdated,
            Event::ThingStatusInfo(_) => EventKind::ThingStatusInfo,
            Event::ThingStatusInfoChanged(_) => EventKind::ThingStatusInfoChanged,
            Event::ChannelTriggered(_) => EventKind::ChannelTriggered,
            Event::Generic(_) => EventKind::Generic,
            Event::System(e) => match e {
                SystemEvent::Connected => EventKind::ClientConnected,
                SystemEvent::Disconnected => EventKind::ClientDisconnected,
                SystemEvent::ConnectionStable => EventKind::ConnectionStable,
                SystemEvent::Started => EventKind::ClientStarted,
                SystemEvent::Stopped => EventKind::ClientStopped,
                SystemEvent::Error { .. } => EventKind::Error,
                SystemEvent::Alive => EventKind::Alive,
                SystemEvent::TimeCronFired { .. } => EventKind::TimeCronFired,
                SystemEvent::RulePanic { .. } => EventKind::RulePanic,
            },
        }
    }

    /// Name of the item this event concerns, if it is an item event
    pub fn item_name(&self) -> Option<&str> {
        match self {
            Event::ItemCommand(e) => Some(&e.item),
            Event::ItemState(e) => Some(&e.item),
            Event::ItemStateChanged(e) => Some(&e.item),
            Event::GroupItemStateChanged(e) => Some(&e.item),
            Event::ItemAdded(e) | Event::ItemRemoved(e) => Some(&e.item.name),
            Event::ItemUpdated(e) => Some(&e.item.name),
            _ => None,
        }
    }
}

impl From<SystemEvent> for Event {
    fn from(event: SystemEvent) -> Self {
        Event::System(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_event_topic_and_kind() {
        let event: Event = SystemEvent::Connected.into();
        assert_eq!(event.topic(), "");
        assert_eq!(event.kind(), EventKind::ClientConnected);
        assert!(event.kind().is_system());
    }

    #[test]
    fn test_item_event_kind() {
        let event = Event::ItemCommand(ItemCommandEvent {
            topic: "openhab/items/Lamp/command".to_string(),
            item: "Lamp".to_string(),
            command: StateValue::new("OnOff", "ON"),
        });
        assert_eq!(event.kind(), EventKind::ItemCommand);
        assert!(!event.kind().is_system());
        assert_eq!(event.item_name(), Some("Lamp"));
        assert_eq!(event.kind().to_string(), "item_command");
    }
}
