//! Rule management
//!
//! A rule ties an ordered list of triggers to a body. The [`RuleManager`]
//! activates every registered rule once at start and, on stop, tears the
//! triggers down and waits for every rule run still in flight.

use futures::future::BoxFuture;
use futures::FutureExt;
use oh_core::{Event, SharedTelemetry, SystemEvent};
use oh_event_bus::{callback, panic_message, Callback, SharedEventBus};
use std::backtrace::Backtrace;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::error::{RuleError, RuleResult};
use crate::scheduler::Scheduler;
use crate::trigger::{Trigger, TriggerContext};

/// Rule metadata supplied at registration
#[derive(Debug, Clone, Default)]
pub struct RuleData {
    /// Unique id; a ULID is generated when empty
    pub id: String,
    pub name: String,
    pub description: String,
    /// Arbitrary user value handed to every run
    pub context: serde_json::Value,
    /// Runs exceeding this are cancelled
    pub timeout: Option<Duration>,
}

impl RuleData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Name, or id when unnamed
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// What a rule body receives for one run
#[derive(Debug, Clone)]
pub struct RuleContext {
    pub rule: Arc<RuleData>,
    pub event: Arc<Event>,
}

/// A rule body
pub type RuleBody = Arc<dyn Fn(RuleContext) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure into a [`RuleBody`]
pub fn rule_body<F, Fut>(f: F) -> RuleBody
where
    F: Fn(RuleContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

struct Rule {
    data: Arc<RuleData>,
    triggers: Vec<Trigger>,
    body: RuleBody,
}

impl Rule {
    fn context(&self, manager: &RuleManager) -> TriggerContext {
        TriggerContext {
            rule_id: self.data.id.clone(),
            bus: Arc::clone(&manager.user),
            scheduler: Arc::clone(&manager.scheduler),
            tasks: manager.tasks.clone(),
        }
    }

    /// Activate triggers in order, rolling back on the first failure
    fn activate(&self, ctx: &TriggerContext, run: Callback) -> RuleResult<()> {
        for (index, trigger) in self.triggers.iter().enumerate() {
            if let Err(source) = trigger.activate(ctx, run.clone()) {
                for activated in &self.triggers[..index] {
                    activated.deactivate(ctx);
                }
                return Err(RuleError::Activation {
                    rule_id: self.data.id.clone(),
                    index,
                    source,
                });
            }
        }
        Ok(())
    }

    fn deactivate(&self, ctx: &TriggerContext) {
        for trigger in &self.triggers {
            trigger.deactivate(ctx);
        }
    }
}

/// Owns the registered rules and their lifecycle
pub struct RuleManager {
    rules: Mutex<Vec<Arc<Rule>>>,
    user: SharedEventBus,
    internal: SharedEventBus,
    scheduler: Arc<Scheduler>,
    telemetry: SharedTelemetry,
    tasks: TaskTracker,
    started: AtomicBool,
}

impl RuleManager {
    /// Rules subscribe on `user`; rule panics are reported on `internal`
    pub fn new(user: SharedEventBus, internal: SharedEventBus, telemetry: SharedTelemetry) -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            user,
            internal,
            scheduler: Arc::new(Scheduler::new()),
            telemetry,
            tasks: TaskTracker::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Register a rule and return its id
    pub fn register(
        &self,
        mut data: RuleData,
        body: RuleBody,
        triggers: Vec<Trigger>,
    ) -> RuleResult<String> {
        if data.id.is_empty() {
            data.id = ulid::Ulid::new().to_string();
        }

        let mut rules = self.lock();
        if rules.iter().any(|r| r.data.id == data.id) {
            return Err(RuleError::DuplicateId(data.id));
        }

        let id = data.id.clone();
        info!(rule_id = %id, name = data.display_name(), triggers = triggers.len(), "Registered rule");
        rules.push(Arc::new(Rule {
            data: Arc::new(data),
            triggers,
            body,
        }));
        Ok(id)
    }

    /// Activate every rule and start the scheduler
    ///
    /// Only the first call does anything. A rule whose activation fails is
    /// skipped and its error returned; the others still activate.
    pub fn start(&self) -> Vec<RuleError> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Rule manager already started");
            return Vec::new();
        }

        let rules = self.lock().clone();
        let mut failures = Vec::new();
        for rule in &rules {
            let run = self.runner(rule);
            match rule.activate(&rule.context(self), run) {
                Ok(()) => debug!(rule_id = %rule.data.id, "Rule activated"),
                Err(e) => {
                    error!(rule_id = %rule.data.id, error = %e, "Rule activation failed");
                    failures.push(e);
                }
            }
        }

        self.scheduler.start();
        info!(
            rules = rules.len(),
            failed = failures.len(),
            "Rules activated"
        );
        failures
    }

    /// Deactivate every rule's triggers
    pub fn deactivate_all(&self) {
        for rule in self.lock().iter() {
            rule.deactivate(&rule.context(self));
        }
    }

    /// Deactivate all rules, then wait for every run in flight
    ///
    /// Stops the scheduler (waiting for running jobs), drains both buses and
    /// waits for delayed runs already underway.
    pub async fn stop(&self) {
        self.deactivate_all();
        self.scheduler.stop().await;
        self.user.drain().await;
        self.internal.drain().await;
        self.tasks.close();
        self.tasks.wait().await;
        info!("Rule manager stopped");
    }

    /// Metadata of every registered rule in registration order
    pub fn rules(&self) -> Vec<Arc<RuleData>> {
        self.lock().iter().map(|r| Arc::clone(&r.data)).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    fn runner(&self, rule: &Rule) -> Callback {
        let data = Arc::clone(&rule.data);
        let body = Arc::clone(&rule.body);
        let internal = Arc::clone(&self.internal);
        let telemetry = Arc::clone(&self.telemetry);

        callback(move |event| {
            execute(
                Arc::clone(&data),
                Arc::clone(&body),
                event,
                Arc::clone(&internal),
                Arc::clone(&telemetry),
            )
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Rule>>> {
        self.rules.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run a rule body once, enforcing its timeout and containing panics
async fn execute(
    data: Arc<RuleData>,
    body: RuleBody,
    event: Arc<Event>,
    internal: SharedEventBus,
    telemetry: SharedTelemetry,
) {
    telemetry.rule_started(&data.id);
    debug!(rule_id = %data.id, kind = %event.kind(), "Running rule");

    let ctx = RuleContext {
        rule: Arc::clone(&data),
        event,
    };
    let run = AssertUnwindSafe(async move { body(ctx).await }).catch_unwind();

    let outcome = match data.timeout {
        Some(limit) => match tokio::time::timeout(limit, run).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(rule_id = %data.id, ?limit, "Rule timed out and was cancelled");
                return;
            }
        },
        None => run.await,
    };

    if let Err(panic) = outcome {
        let message = panic_message(&*panic);
        error!(
            rule_id = %data.id,
            name = data.display_name(),
            panic = %message,
            backtrace = %Backtrace::capture(),
            "Rule panicked"
        );
        telemetry.rule_panicked(&data.id);
        internal.publish(
            SystemEvent::RulePanic {
                rule_id: data.id.clone(),
                message,
            }
            .into(),
        );
    }
}
