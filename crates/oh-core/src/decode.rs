//! Decoding of raw stream payloads into typed events
//!
//! Each frame's `data:` line carries a JSON envelope
//! `{"topic": ..., "payload": ..., "type": ...}` whose `payload` is itself a
//! JSON-encoded string. The `type` discriminator selects the decoder.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::{
    ChannelTriggeredEvent, Event, GenericEvent, GroupItemStateChangedEvent, ItemCommandEvent,
    ItemEvent, ItemInfo, ItemStateChangedEvent, ItemStateEvent, ItemUpdatedEvent, StateValue,
    ThingStatus, ThingStatusInfoChangedEvent, ThingStatusInfoEvent,
};
use crate::event_types::*;
use crate::topic::{split_channel_topic, split_item_topic, split_thing_topic, TopicParts};

/// Errors produced while decoding an event
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The `data:` envelope is not valid JSON
    #[error("malformed event envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    /// The payload of a recognized event type could not be parsed
    #[error("malformed {event_type} payload: {source}")]
    Payload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// The topic of a recognized event type does not have the expected shape
    #[error("unexpected topic for {event_type}: {topic}")]
    Topic { event_type: String, topic: String },
}

/// Result type for decoding
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Event envelope as delivered on the stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub topic: String,
    pub payload: String,
    #[serde(rename = "type")]
    pub event_type: String,
}

impl RawEvent {
    pub fn new(
        topic: impl Into<String>,
        event_type: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            event_type: event_type.into(),
        }
    }

    /// Parse the JSON envelope from a `data:` line
    pub fn from_json(data: &str) -> DecodeResult<Self> {
        serde_json::from_str(data).map_err(DecodeError::Envelope)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateChangedPayload {
    #[serde(rename = "type")]
    value_type: String,
    value: String,
    old_type: String,
    old_value: String,
}

impl StateChangedPayload {
    fn into_values(self) -> (StateValue, StateValue) {
        (
            StateValue::new(self.value_type, self.value),
            StateValue::new(self.old_type, self.old_value),
        )
    }

    fn from_values(state: &StateValue, previous: &StateValue) -> Self {
        Self {
            value_type: state.value_type.clone(),
            value: state.value.clone(),
            old_type: previous.value_type.clone(),
            old_value: previous.value.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChannelTriggeredPayload {
    event: String,
    channel: String,
}

/// Decode a raw event into a typed [`Event`]
///
/// Unknown event types decode to [`Event::Generic`]; only a malformed payload
/// or topic for a recognized type is an error.
pub fn decode(raw: &RawEvent) -> DecodeResult<Event> {
    let RawEvent {
        topic,
        payload,
        event_type,
    } = raw;
    let topic = topic.clone();

    let event = match event_type.as_str() {
        ITEM_COMMAND => {
            let item = item_name(raw)?;
            Event::ItemCommand(ItemCommandEvent {
                item,
                command: parse(raw)?,
                topic,
            })
        }
        ITEM_STATE => {
            let item = item_name(raw)?;
            Event::ItemState(ItemStateEvent {
                item,
                state: parse(raw)?,
                topic,
            })
        }
        ITEM_STATE_CHANGED => {
            let item = item_name(raw)?;
            let (state, previous) = parse::<StateChangedPayload>(raw)?.into_values();
            Event::ItemStateChanged(ItemStateChangedEvent {
                item,
                state,
                previous,
                topic,
            })
        }
        GROUP_ITEM_STATE_CHANGED => {
            let parts = topic_parts(raw, split_item_topic)?;
            if parts.member.is_empty() {
                return Err(topic_error(raw));
            }
            let (item, member) = (parts.name.to_string(), parts.member.to_string());
            let (state, previous) = parse::<StateChangedPayload>(raw)?.into_values();
            Event::GroupItemStateChanged(GroupItemStateChangedEvent {
                item,
                member,
                state,
                previous,
                topic,
            })
        }
        ITEM_ADDED => Event::ItemAdded(ItemEvent {
            item: parse(raw)?,
            topic,
        }),
        ITEM_REMOVED => Event::ItemRemoved(ItemEvent {
            item: parse(raw)?,
            topic,
        }),
        ITEM_UPDATED => {
            let [item, old]: [ItemInfo; 2] = parse(raw)?;
            Event::ItemUpdated(ItemUpdatedEvent { item, old, topic })
        }
        THING_STATUS_INFO => {
            let thing = topic_parts(raw, split_thing_topic)?.name.to_string();
            Event::ThingStatusInfo(ThingStatusInfoEvent {
                thing,
                status: parse(raw)?,
                topic,
            })
        }
        THING_STATUS_INFO_CHANGED => {
            let thing = topic_parts(raw, split_thing_topic)?.name.to_string();
            let [status, previous]: [ThingStatus; 2] = parse(raw)?;
            Event::ThingStatusInfoChanged(ThingStatusInfoChangedEvent {
                thing,
                status,
                previous,
                topic,
            })
        }
        CHANNEL_TRIGGERED => {
            let parsed: ChannelTriggeredPayload = parse(raw)?;
            let channel = if parsed.channel.is_empty() {
                topic_parts(raw, split_channel_topic)?.name.to_string()
            } else {
                parsed.channel
            };
            Event::ChannelTriggered(ChannelTriggeredEvent {
                channel,
                event: parsed.event,
                topic,
            })
        }
        _ => Event::Generic(GenericEvent {
            topic,
            event_type: event_type.clone(),
            payload: payload.clone(),
        }),
    };

    Ok(event)
}

fn parse<T: DeserializeOwned>(raw: &RawEvent) -> DecodeResult<T> {
    serde_json::from_str(&raw.payload).map_err(|source| DecodeError::Payload {
        event_type: raw.event_type.clone(),
        source,
    })
}

fn topic_parts<'a>(
    raw: &'a RawEvent,
    split: fn(&str) -> TopicParts<'_>,
) -> DecodeResult<TopicParts<'a>> {
    let parts = split(&raw.topic);
    if parts.is_empty() {
        return Err(topic_error(raw));
    }
    Ok(parts)
}

fn item_name(raw: &RawEvent) -> DecodeResult<String> {
    topic_parts(raw, split_item_topic).map(|parts| parts.name.to_string())
}

fn topic_error(raw: &RawEvent) -> DecodeError {
    DecodeError::Topic {
        event_type: raw.event_type.clone(),
        topic: raw.topic.clone(),
    }
}

impl Event {
    /// Encode the event back into its wire envelope
    ///
    /// Client-generated system events have no wire form and return `None`.
    pub fn to_raw(&self) -> Option<RawEvent> {
        let (event_type, payload) = match self {
            Event::ItemCommand(e) => (ITEM_COMMAND, serde_json::to_string(&e.command)),
            Event::ItemState(e) => (ITEM_STATE, serde_json::to_string(&e.state)),
            Event::ItemStateChanged(e) => (
                ITEM_STATE_CHANGED,
                serde_json::to_string(&StateChangedPayload::from_values(&e.state, &e.previous)),
            ),
            Event::GroupItemStateChanged(e) => (
                GROUP_ITEM_STATE_CHANGED,
                serde_json::to_string(&StateChangedPayload::from_values(&e.state, &e.previous)),
            ),
            Event::ItemAdded(e) => (ITEM_ADDED, serde_json::to_string(&e.item)),
            Event::ItemRemoved(e) => (ITEM_REMOVED, serde_json::to_string(&e.item)),
            Event::ItemUpdated(e) => (ITEM_UPDATED, serde_json::to_string(&[&e.item, &e.old])),
            Event::ThingStatusInfo(e) => (THING_STATUS_INFO, serde_json::to_string(&e.status)),
            Event::ThingStatusInfoChanged(e) => (
                THING_STATUS_INFO_CHANGED,
                serde_json::to_string(&[&e.status, &e.previous]),
            ),
            Event::ChannelTriggered(e) => (
                CHANNEL_TRIGGERED,
                serde_json::to_string(&ChannelTriggeredPayload {
                    event: e.event.clone(),
                    channel: e.channel.clone(),
                }),
            ),
            Event::Generic(e) => {
                return Some(RawEvent::new(&e.topic, &e.event_type, &e.payload));
            }
            Event::System(_) => return None,
        };

        let payload = payload.ok()?;
        Some(RawEvent::new(self.topic(), event_type, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SystemEvent;
    use crate::EventKind;

    fn raw(topic: &str, event_type: &str, payload: &str) -> RawEvent {
        RawEvent::new(topic, event_type, payload)
    }

    #[test]
    fn test_decode_state_changed() {
        let event = decode(&raw(
            "openhab/items/TestSwitch/statechanged",
            ITEM_STATE_CHANGED,
            r#"{"type":"OnOff","value":"ON","oldType":"OnOff","oldValue":"OFF"}"#,
        ))
        .unwrap();

        match event {
            Event::ItemStateChanged(e) => {
                assert_eq!(e.item, "TestSwitch");
                assert_eq!(e.previous.value, "OFF");
                assert_eq!(e.state.value, "ON");
                assert_eq!(e.state.value_type, "OnOff");
            }
            other => panic!("Expected ItemStateChanged, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_group_state_changed() {
        let event = decode(&raw(
            "openhab/items/groupA/memberB/statechanged",
            GROUP_ITEM_STATE_CHANGED,
            r#"{"type":"OnOff","value":"ON","oldType":"UnDef","oldValue":"NULL"}"#,
        ))
        .unwrap();

        match event {
            Event::GroupItemStateChanged(e) => {
                assert_eq!(e.item, "groupA");
                assert_eq!(e.member, "memberB");
                assert_eq!(e.previous.value, "NULL");
            }
            other => panic!("Expected GroupItemStateChanged, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_command() {
        let event = decode(&raw(
            "smarthome/items/Dimmer/command",
            ITEM_COMMAND,
            r#"{"type":"Percent","value":"40"}"#,
        ))
        .unwrap();
        assert_eq!(event.kind(), EventKind::ItemCommand);
        assert_eq!(event.item_name(), Some("Dimmer"));
    }

    #[test]
    fn test_decode_thing_status_changed() {
        let event = decode(&raw(
            "openhab/things/hue:bridge:1/statuschanged",
            THING_STATUS_INFO_CHANGED,
            r#"[{"status":"ONLINE","statusDetail":"NONE"},{"status":"OFFLINE","statusDetail":"COMMUNICATION_ERROR","description":"timeout"}]"#,
        ))
        .unwrap();

        match event {
            Event::ThingStatusInfoChanged(e) => {
                assert_eq!(e.thing, "hue:bridge:1");
                assert_eq!(e.status.status, "ONLINE");
                assert_eq!(e.previous.status, "OFFLINE");
                assert_eq!(e.previous.description.as_deref(), Some("timeout"));
            }
            other => panic!("Expected ThingStatusInfoChanged, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_item_updated() {
        let event = decode(&raw(
            "openhab/items/Lamp/updated",
            ITEM_UPDATED,
            r#"[{"type":"Switch","name":"Lamp","label":"New"},{"type":"Switch","name":"Lamp","label":"Old"}]"#,
        ))
        .unwrap();

        match event {
            Event::ItemUpdated(e) => {
                assert_eq!(e.item.label.as_deref(), Some("New"));
                assert_eq!(e.old.label.as_deref(), Some("Old"));
            }
            other => panic!("Expected ItemUpdated, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_channel_triggered() {
        let event = decode(&raw(
            "openhab/channels/astro:sun:local:rise#event/triggered",
            CHANNEL_TRIGGERED,
            r#"{"event":"START","channel":"astro:sun:local:rise#event"}"#,
        ))
        .unwrap();

        match event {
            Event::ChannelTriggered(e) => {
                assert_eq!(e.channel, "astro:sun:local:rise#event");
                assert_eq!(e.event, "START");
            }
            other => panic!("Expected ChannelTriggered, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_generic() {
        let event = decode(&raw(
            "openhab/inbox/x/added",
            "InboxAddedEvent",
            "not even json",
        ))
        .unwrap();

        match event {
            Event::Generic(e) => {
                assert_eq!(e.event_type, "InboxAddedEvent");
                assert_eq!(e.payload, "not even json");
            }
            other => panic!("Expected Generic, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_payload_is_error() {
        let result = decode(&raw(
            "openhab/items/Lamp/statechanged",
            ITEM_STATE_CHANGED,
            r#"{"type":"OnOff""#,
        ));
        assert!(matches!(result, Err(DecodeError::Payload { .. })));
    }

    #[test]
    fn test_bad_topic_is_error() {
        let result = decode(&raw(
            "openhab/things/Lamp/statechanged",
            ITEM_STATE_CHANGED,
            r#"{"type":"OnOff","value":"ON","oldType":"OnOff","oldValue":"OFF"}"#,
        ));
        assert!(matches!(result, Err(DecodeError::Topic { .. })));

        let result = decode(&raw(
            "openhab/items/Lamp/statechanged",
            GROUP_ITEM_STATE_CHANGED,
            r#"{"type":"OnOff","value":"ON","oldType":"OnOff","oldValue":"OFF"}"#,
        ));
        assert!(matches!(result, Err(DecodeError::Topic { .. })));
    }

    #[test]
    fn test_envelope() {
        let data = r#"{"topic":"openhab/items/Lamp/state","payload":"{\"type\":\"OnOff\",\"value\":\"OFF\"}","type":"ItemStateEvent"}"#;
        let raw = RawEvent::from_json(data).unwrap();
        assert_eq!(raw.event_type, ITEM_STATE);
        assert_eq!(raw.topic, "openhab/items/Lamp/state");

        assert!(matches!(
            RawEvent::from_json("{"),
            Err(DecodeError::Envelope(_))
        ));
    }

    #[test]
    fn test_encode_then_decode_preserves_fields() {
        let wire = [
            (
                "openhab/items/Lamp/command",
                ITEM_COMMAND,
                r#"{"type":"OnOff","value":"ON"}"#,
                EventKind::ItemCommand,
            ),
            (
                "openhab/items/Dimmer/state",
                ITEM_STATE,
                r#"{"type":"Percent","value":"42"}"#,
                EventKind::ItemState,
            ),
            (
                "openhab/items/TestSwitch/statechanged",
                ITEM_STATE_CHANGED,
                r#"{"type":"OnOff","value":"ON","oldType":"OnOff","oldValue":"OFF"}"#,
                EventKind::ItemStateChanged,
            ),
            (
                "openhab/items/groupA/memberB/statechanged",
                GROUP_ITEM_STATE_CHANGED,
                r#"{"type":"OnOff","value":"ON","oldType":"UnDef","oldValue":"NULL"}"#,
                EventKind::GroupItemStateChanged,
            ),
            (
                "openhab/items/Lamp/added",
                ITEM_ADDED,
                r#"{"type":"Switch","name":"Lamp","tags":["Lighting"],"groupNames":["gLights"]}"#,
                EventKind::ItemAdded,
            ),
            (
                "openhab/items/Lamp/removed",
                ITEM_REMOVED,
                r#"{"type":"Switch","name":"Lamp","label":"Desk lamp","tags":[],"groupNames":[]}"#,
                EventKind::ItemRemoved,
            ),
            (
                "openhab/items/Lamp/updated",
                ITEM_UPDATED,
                r#"[{"type":"Dimmer","name":"Lamp","category":"light","tags":[],"groupNames":["gLights"]},{"type":"Switch","name":"Lamp","tags":[],"groupNames":[]}]"#,
                EventKind::ItemUpdated,
            ),
            (
                "openhab/things/hue:bridge:1/status",
                THING_STATUS_INFO,
                r#"{"status":"ONLINE","statusDetail":"NONE"}"#,
                EventKind::ThingStatusInfo,
            ),
            (
                "openhab/things/hue:bridge:1/statuschanged",
                THING_STATUS_INFO_CHANGED,
                r#"[{"status":"OFFLINE","statusDetail":"COMMUNICATION_ERROR","description":"timeout"},{"status":"ONLINE"}]"#,
                EventKind::ThingStatusInfoChanged,
            ),
            (
                "openhab/channels/astro:sun:local:rise#event/triggered",
                CHANNEL_TRIGGERED,
                r#"{"event":"START","channel":"astro:sun:local:rise#event"}"#,
                EventKind::ChannelTriggered,
            ),
        ];

        for (topic, event_type, payload, kind) in wire {
            let event = decode(&raw(topic, event_type, payload)).unwrap();
            assert_eq!(event.kind(), kind, "{event_type}");

            let encoded = event.to_raw().unwrap();
            assert_eq!(encoded.topic, topic);
            assert_eq!(encoded.event_type, event_type);
            assert_eq!(decode(&encoded).unwrap(), event, "{event_type}");
        }
    }

    #[test]
    fn test_system_events_have_no_wire_form() {
        assert!(Event::System(SystemEvent::Alive).to_raw().is_none());
    }
}
