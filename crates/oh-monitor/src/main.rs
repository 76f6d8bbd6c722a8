//! openHAB event monitor
//!
//! Connects to an openHAB server and logs connection changes plus the state
//! changes of the items named on the command line.
//!
//! ```text
//! openhab-monitor [config.yaml] [item...]
//! ```
//!
//! Without a config file the `OPENHAB_*` environment variables are used.

use anyhow::{Context, Result};
use oh_client::{
    load_config, rule_body, Client, ClientConfig, CountingTelemetry, RuleData, Trigger,
};
use std::backtrace::Backtrace;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1).peekable();
    let config = match args.next_if(|arg| Path::new(arg).is_file()) {
        Some(path) => load_config(&path).with_context(|| format!("loading {path}"))?,
        None => ClientConfig::from_env(),
    };
    let items: Vec<String> = args.collect();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    std::panic::set_hook(Box::new(|info| {
        error!("Panic: {info}\n{}", Backtrace::force_capture());
    }));

    info!(url = %config.base_url(), "Starting openHAB monitor");

    let telemetry = Arc::new(CountingTelemetry::new());
    let client = Client::new(config, telemetry.clone())?;

    client.add_rule(
        RuleData::new("connection monitor").with_description("Logs connection changes"),
        rule_body(|ctx| async move {
            info!(event = %ctx.event.kind(), "Connection status");
        }),
        vec![
            Trigger::connected(),
            Trigger::connection_stable(),
            Trigger::disconnected(),
        ],
    )?;

    if !items.is_empty() {
        let triggers = items.iter().map(Trigger::item_changed).collect();
        client.add_rule(
            RuleData::new("item monitor").with_description("Logs item state changes"),
            rule_body(|ctx| async move {
                info!(
                    item = ctx.event.item_name().unwrap_or_default(),
                    topic = ctx.event.topic(),
                    "Item changed"
                );
            }),
            triggers,
        )?;
    }

    for failure in client.start() {
        warn!(error = %failure, "Rule failed to activate");
    }
    client.run().await?;

    info!(
        events = telemetry.events_received(),
        decode_failures = telemetry.decode_failures(),
        reconnects = telemetry.reconnects(),
        rule_runs = telemetry.rule_runs(),
        "Monitor stopped"
    );
    Ok(())
}
