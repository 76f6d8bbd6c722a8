//! The client facade

use oh_automation::{RuleBody, RuleData, RuleError, RuleManager, Trigger};
use oh_config::ClientConfig;
use oh_core::{Event, SharedTelemetry, SystemEvent};
use oh_event_bus::{EventBus, SharedEventBus};
use oh_rest::{ItemCache, RestClient};
use oh_stream::StreamIngester;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::signal::shutdown_signal;

/// A connection to the server plus the rules running against it
///
/// Register rules with [`Client::add_rule`], then call [`Client::run`] (or
/// [`Client::start`] and [`Client::stop`] yourself).
pub struct Client {
    config: ClientConfig,
    internal: SharedEventBus,
    user: SharedEventBus,
    rules: RuleManager,
    rest: RestClient,
    items: Arc<ItemCache>,
    ingester: Arc<StreamIngester>,
    /// Stops event ingestion
    shutdown: CancellationToken,
    /// Ends the wait in [`Client::run`]
    stop_requested: CancellationToken,
    stream_task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl Client {
    pub fn new(config: ClientConfig, telemetry: SharedTelemetry) -> ClientResult<Self> {
        config.validate()?;

        let internal: SharedEventBus = Arc::new(EventBus::new("internal"));
        let user: SharedEventBus = Arc::new(EventBus::new("user"));

        let rest = RestClient::new(&config)?;
        let items = ItemCache::new(Arc::new(rest.clone()));
        items.subscribe(&internal);

        let ingester = StreamIngester::new(
            &config,
            Arc::clone(&internal),
            Arc::clone(&user),
            Arc::clone(&telemetry),
        )?;
        let rules = RuleManager::new(Arc::clone(&user), Arc::clone(&internal), telemetry);

        Ok(Self {
            config,
            internal,
            user,
            rules,
            rest,
            items,
            ingester: Arc::new(ingester),
            shutdown: CancellationToken::new(),
            stop_requested: CancellationToken::new(),
            stream_task: Mutex::new(None),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    /// Register a rule; must be called before [`Client::start`]
    pub fn add_rule(
        &self,
        data: RuleData,
        body: RuleBody,
        triggers: Vec<Trigger>,
    ) -> ClientResult<String> {
        if self.started.load(Ordering::SeqCst) {
            warn!(name = data.display_name(), "Rule added after start will not be activated");
        }
        Ok(self.rules.register(data, body, triggers)?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub fn items(&self) -> &Arc<ItemCache> {
        &self.items
    }

    pub fn rules(&self) -> &RuleManager {
        &self.rules
    }

    /// Bus delivering events to rules
    pub fn user_bus(&self) -> &SharedEventBus {
        &self.user
    }

    /// Bus delivering events to client internals such as the item cache
    pub fn internal_bus(&self) -> &SharedEventBus {
        &self.internal
    }

    /// Activate rules, start the scheduler and begin event ingestion
    ///
    /// Only the first call does anything. Rules that fail to activate are
    /// returned; the rest run normally.
    pub fn start(&self) -> Vec<RuleError> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Client already started");
            return Vec::new();
        }

        info!(url = %self.config.base_url(), rules = self.rules.len(), "Starting client");
        let failures = self.rules.start();
        self.publish_both(SystemEvent::Started.into());

        let ingester = Arc::clone(&self.ingester);
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move { ingester.run(shutdown).await });
        *self
            .stream_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);

        failures
    }

    /// Make a pending [`Client::run`] return and shut down
    pub fn request_stop(&self) {
        self.stop_requested.cancel();
    }

    /// Stop ingestion and wait for every rule run to finish
    ///
    /// Only the first call does anything.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Stopping client");

        self.shutdown.cancel();
        let handle = self
            .stream_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Event stream task failed");
            }
        }

        // Let stop-triggered rules run before their triggers go away
        self.publish_both(SystemEvent::Stopped.into());
        self.user.drain().await;
        self.internal.drain().await;

        self.rules.stop().await;
        info!("Client stopped");
    }

    /// Start, wait for a shutdown signal or [`Client::request_stop`], then stop
    pub async fn run(&self) -> ClientResult<()> {
        self.start();

        let result = tokio::select! {
            result = shutdown_signal() => result.map_err(ClientError::Signal),
            _ = self.stop_requested.cancelled() => {
                info!("Stop requested");
                Ok(())
            }
        };

        self.stop().await;
        result
    }

    fn publish_both(&self, event: Event) {
        self.internal.publish(event.clone());
        self.user.publish(event);
    }
}
