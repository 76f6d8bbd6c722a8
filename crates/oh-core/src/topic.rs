//! Positional topic parsing
//!
//! Server topics look like `openhab/items/<item>/<event>` or, for group
//! member notifications, `openhab/items/<group>/<member>/<event>`. Older
//! servers use the `smarthome` prefix for the same collections.

/// Topic prefixes recognized for the same collections
pub const TOPIC_PREFIXES: [&str; 2] = ["openhab", "smarthome"];

/// Prefix used when building topics for subscriptions
pub const DEFAULT_PREFIX: &str = "openhab";

pub const ITEMS: &str = "items";
pub const THINGS: &str = "things";
pub const CHANNELS: &str = "channels";

/// Entity identifiers extracted from a topic
///
/// All fields are empty when the topic does not have the expected shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopicParts<'a> {
    /// Item, thing or channel identifier
    pub name: &'a str,
    /// Triggering group member (5-segment topics only)
    pub member: &'a str,
    /// Sub-event, e.g. `statechanged`
    pub event: &'a str,
}

impl TopicParts<'_> {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

/// Split a topic of the given collection into its positional parts
pub fn split_topic<'a>(topic: &'a str, collection: &str) -> TopicParts<'a> {
    let segments: Vec<&str> = topic.split('/').collect();

    if !TOPIC_PREFIXES.contains(&segments[0]) || segments.get(1) != Some(&collection) {
        return TopicParts::default();
    }

    match segments[..] {
        [_, _, name, event] => TopicParts {
            name,
            member: "",
            event,
        },
        [_, _, name, member, event] => TopicParts {
            name,
            member,
            event,
        },
        _ => TopicParts::default(),
    }
}

/// Split an item topic into item name, triggering member and sub-event
pub fn split_item_topic(topic: &str) -> TopicParts<'_> {
    split_topic(topic, ITEMS)
}

/// Split a thing topic into thing UID and sub-event
pub fn split_thing_topic(topic: &str) -> TopicParts<'_> {
    split_topic(topic, THINGS)
}

/// Split a channel topic into channel UID and sub-event
pub fn split_channel_topic(topic: &str) -> TopicParts<'_> {
    split_topic(topic, CHANNELS)
}

/// Build the topic the server uses for an item sub-event
pub fn item_topic(item: &str, event: &str) -> String {
    format!("{DEFAULT_PREFIX}/{ITEMS}/{item}/{event}")
}

/// Build the topic the server uses for a thing sub-event
pub fn thing_topic(thing: &str, event: &str) -> String {
    format!("{DEFAULT_PREFIX}/{THINGS}/{thing}/{event}")
}

/// Item sub-event topics under every recognized prefix
pub fn item_topics(item: &str, event: &str) -> Vec<String> {
    TOPIC_PREFIXES
        .iter()
        .map(|prefix| format!("{prefix}/{ITEMS}/{item}/{event}"))
        .collect()
}

/// Thing sub-event topics under every recognized prefix
pub fn thing_topics(thing: &str, event: &str) -> Vec<String> {
    TOPIC_PREFIXES
        .iter()
        .map(|prefix| format!("{prefix}/{THINGS}/{thing}/{event}"))
        .collect()
}
