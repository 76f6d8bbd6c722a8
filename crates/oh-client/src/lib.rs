//! openHAB rule engine client
//!
//! Connects to the server's event stream, runs registered rules against the
//! decoded events and shuts down only after every rule run has finished.
//!
//! ```text
//! server ──SSE──▶ StreamIngester ──▶ internal bus ──▶ ItemCache
//!                                └─▶ user bus ──────▶ Triggers ──▶ rule bodies
//! ```

mod client;
mod error;
mod signal;

pub use client::Client;
pub use error::{ClientError, ClientResult};
pub use signal::shutdown_signal;

pub use oh_automation::{
    rule_body, RuleBody, RuleContext, RuleData, RuleError, RuleManager, Trigger, TriggerError,
};
pub use oh_config::{load_config, BackoffConfig, ClientConfig, ConfigError};
pub use oh_core::{
    CountingTelemetry, Event, EventKind, NoopTelemetry, SharedTelemetry, SystemEvent, Telemetry,
};
pub use oh_rest::{ItemCache, RestClient, RestError};
