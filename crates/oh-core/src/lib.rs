//! Core types for the openHAB rule engine
//!
//! This crate provides the fundamental types shared by every other crate:
//! the closed set of [`Event`] variants, their [`EventKind`], the positional
//! topic parser and the decoder that turns a raw `topic`/`type`/`payload`
//! triple from the server's event stream into a typed event.

mod decode;
mod event;
mod telemetry;
pub mod topic;

pub use decode::{decode, DecodeError, DecodeResult, RawEvent};
pub use event::{
    ChannelTriggeredEvent, Event, EventKind, GenericEvent, GroupItemStateChangedEvent,
    ItemCommandEvent, ItemEvent, ItemInfo, ItemStateChangedEvent, ItemStateEvent,
    ItemUpdatedEvent, StateValue, SystemEvent, ThingStatus, ThingStatusInfoChangedEvent,
    ThingStatusInfoEvent,
};
pub use telemetry::{CountingTelemetry, NoopTelemetry, SharedTelemetry, Telemetry};

/// Event type discriminators as sent by the server
pub mod event_types {
    pub const ITEM_COMMAND: &str = "ItemCommandEvent";
    pub const ITEM_STATE: &str = "ItemStateEvent";
    pub const ITEM_STATE_CHANGED: &str = "ItemStateChangedEvent";
    pub const GROUP_ITEM_STATE_CHANGED: &str = "GroupItemStateChangedEvent";
    pub const ITEM_ADDED: &str = "ItemAddedEvent";
    pub const ITEM_REMOVED: &str = "ItemRemovedEvent";
    pub const ITEM_UPDATED: &str = "ItemUpdatedEvent";
    pub const THING_STATUS_INFO: &str = "ThingStatusInfoEvent";
    pub const THING_STATUS_INFO_CHANGED: &str = "ThingStatusInfoChangedEvent";
    pub const CHANNEL_TRIGGERED: &str = "ChannelTriggeredEvent";
}
