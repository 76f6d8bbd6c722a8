//! Trigger types
//!
//! A trigger activates against the event bus or the scheduler on behalf of
//! one rule and decides, through [`Trigger::matches`], whether an event
//! should run the rule body. Activation state lives inside the trigger, so a
//! second activation without an intervening deactivation is an error.

use chrono::{DateTime, Utc};
use oh_core::topic::{item_topics, thing_topics};
use oh_core::{Event, EventKind, SystemEvent};
use oh_event_bus::{callback, Callback, SharedEventBus, SubscriptionId};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, trace};

use crate::error::{TriggerError, TriggerResult};
use crate::scheduler::{job, JobId, Scheduler};

/// Everything a trigger needs to activate for one rule
#[derive(Clone)]
pub struct TriggerContext {
    pub rule_id: String,
    /// Bus delivering server and lifecycle events to rules
    pub bus: SharedEventBus,
    pub scheduler: Arc<Scheduler>,
    /// Tracks delayed rule runs so shutdown can wait for them
    pub tasks: TaskTracker,
}

/// Predicate over bus events
///
/// Qualifiers left as `None` match any value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventMatcher {
    ItemCommand {
        item: String,
        command: Option<String>,
    },
    ItemState {
        item: String,
        state: Option<String>,
    },
    /// Matches group and non-group state changes alike
    ItemStateChanged {
        item: String,
        from: Option<String>,
        to: Option<String>,
    },
    ThingStatusInfo {
        thing: String,
        status: Option<String>,
    },
    ThingStatusInfoChanged {
        thing: String,
        from: Option<String>,
        to: Option<String>,
    },
    /// Lifecycle events, matched on kind alone
    System(EventKind),
}

impl EventMatcher {
    /// Bus subscriptions (topic filter, kind) this matcher listens on
    ///
    /// Item and thing matchers listen on both the current and the legacy
    /// topic prefix.
    fn subscriptions(&self) -> Vec<(String, EventKind)> {
        let each = |topics: Vec<String>, kind: EventKind| {
            topics.into_iter().map(move |topic| (topic, kind))
        };
        match self {
            EventMatcher::ItemCommand { item, .. } => {
                each(item_topics(item, "command"), EventKind::ItemCommand).collect()
            }
            EventMatcher::ItemState { item, .. } => {
                each(item_topics(item, "state"), EventKind::ItemState).collect()
            }
            EventMatcher::ItemStateChanged { item, .. } => {
                each(item_topics(item, "statechanged"), EventKind::ItemStateChanged)
                    // Group topics embed the member name, so filter on the item locally
                    .chain([(String::new(), EventKind::GroupItemStateChanged)])
                    .collect()
            }
            EventMatcher::ThingStatusInfo { thing, .. } => {
                each(thing_topics(thing, "status"), EventKind::ThingStatusInfo).collect()
            }
            EventMatcher::ThingStatusInfoChanged { thing, .. } => each(
                thing_topics(thing, "statuschanged"),
                EventKind::ThingStatusInfoChanged,
            )
            .collect(),
            EventMatcher::System(kind) => vec![(String::new(), *kind)],
        }
    }

    /// Whether `event` satisfies this matcher
    ///
    /// Thing matchers with a qualifier return [`TriggerError::ContractViolation`]
    /// when handed any other event variant.
    pub fn matches(&self, event: &Event) -> TriggerResult<bool> {
        match self {
            EventMatcher::ItemCommand { item, command } => Ok(match event {
                Event::ItemCommand(e) => e.item == *item && wildcard(command, &e.command.value),
                _ => false,
            }),
            EventMatcher::ItemState { item, state } => Ok(match event {
                Event::ItemState(e) => e.item == *item && wildcard(state, &e.state.value),
                _ => false,
            }),
            EventMatcher::ItemStateChanged { item, from, to } => {
                let (name, state, previous) = match event {
                    Event::ItemStateChanged(e) => (&e.item, &e.state, &e.previous),
                    Event::GroupItemStateChanged(e) => (&e.item, &e.state, &e.previous),
                    _ => return Ok(false),
                };
                Ok(name == item && wildcard(from, &previous.value) && wildcard(to, &state.value))
            }
            EventMatcher::ThingStatusInfo { thing, status } => match event {
                Event::ThingStatusInfo(e) => {
                    Ok(e.thing == *thing && wildcard(status, &e.status.status))
                }
                other if status.is_some() => Err(TriggerError::ContractViolation {
                    expected: EventKind::ThingStatusInfo,
                    actual: other.kind(),
                }),
                _ => Ok(true),
            },
            EventMatcher::ThingStatusInfoChanged { thing, from, to } => match event {
                Event::ThingStatusInfoChanged(e) => Ok(e.thing == *thing
                    && wildcard(from, &e.previous.status)
                    && wildcard(to, &e.status.status)),
                other if from.is_some() || to.is_some() => Err(TriggerError::ContractViolation {
                    expected: EventKind::ThingStatusInfoChanged,
                    actual: other.kind(),
                }),
                _ => Ok(true),
            },
            EventMatcher::System(kind) => Ok(event.kind() == *kind),
        }
    }
}

fn wildcard(expected: &Option<String>, actual: &str) -> bool {
    expected.as_deref().map_or(true, |v| v == actual)
}

/// What a trigger listens for
#[derive(Debug)]
pub enum TriggerKind {
    /// Recurring 6-field cron schedule
    Cron(String),
    /// Single fire at a point in time
    DateTime(DateTime<Utc>),
    /// Event bus subscription filtered by a matcher
    Event(EventMatcher),
    /// Runs the rule once `after` the last firing of `inner` in a burst
    Debounce { inner: Box<Trigger>, after: Duration },
}

#[derive(Debug)]
enum Activation {
    Inactive,
    Subscribed(Vec<SubscriptionId>),
    /// `None` when a one-shot time had already passed at activation
    Scheduled(Option<JobId>),
    /// Cancelling the token cancels every pending delayed run
    Debounced(CancellationToken),
}

/// A rule precondition
#[derive(Debug)]
pub struct Trigger {
    kind: TriggerKind,
    state: Mutex<Activation>,
}

impl Trigger {
    pub fn new(kind: TriggerKind) -> Self {
        Self {
            kind,
            state: Mutex::new(Activation::Inactive),
        }
    }

    /// Fire on a cron schedule: second, minute, hour, day of month, month, day of week
    pub fn cron(expr: impl Into<String>) -> Self {
        Self::new(TriggerKind::Cron(expr.into()))
    }

    /// Fire once at `at`; never fires if `at` has passed when the rule activates
    pub fn at(at: DateTime<Utc>) -> Self {
        Self::new(TriggerKind::DateTime(at))
    }

    pub fn debounce(inner: Trigger, after: Duration) -> Self {
        Self::new(TriggerKind::Debounce {
            inner: Box::new(inner),
            after,
        })
    }

    pub fn item_command(item: impl Into<String>) -> Self {
        Self::event(EventMatcher::ItemCommand {
            item: item.into(),
            command: None,
        })
    }

    pub fn item_command_value(item: impl Into<String>, command: impl Into<String>) -> Self {
        Self::event(EventMatcher::ItemCommand {
            item: item.into(),
            command: Some(command.into()),
        })
    }

    pub fn item_state(item: impl Into<String>) -> Self {
        Self::event(EventMatcher::ItemState {
            item: item.into(),
            state: None,
        })
    }

    pub fn item_state_value(item: impl Into<String>, state: impl Into<String>) -> Self {
        Self::event(EventMatcher::ItemState {
            item: item.into(),
            state: Some(state.into()),
        })
    }

    pub fn item_changed(item: impl Into<String>) -> Self {
        Self::item_changed_matching(item, None, None)
    }

    pub fn item_changed_from(item: impl Into<String>, from: impl Into<String>) -> Self {
        Self::item_changed_matching(item, Some(from.into()), None)
    }

    pub fn item_changed_to(item: impl Into<String>, to: impl Into<String>) -> Self {
        Self::item_changed_matching(item, None, Some(to.into()))
    }

    pub fn item_changed_from_to(
        item: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::item_changed_matching(item, Some(from.into()), Some(to.into()))
    }

    fn item_changed_matching(
        item: impl Into<String>,
        from: Option<String>,
        to: Option<String>,
    ) -> Self {
        Self::event(EventMatcher::ItemStateChanged {
            item: item.into(),
            from,
            to,
        })
    }

    pub fn thing_status(thing: impl Into<String>) -> Self {
        Self::event(EventMatcher::ThingStatusInfo {
            thing: thing.into(),
            status: None,
        })
    }

    pub fn thing_status_value(thing: impl Into<String>, status: impl Into<String>) -> Self {
        Self::event(EventMatcher::ThingStatusInfo {
            thing: thing.into(),
            status: Some(status.into()),
        })
    }

    pub fn thing_changed(thing: impl Into<String>) -> Self {
        Self::thing_changed_matching(thing, None, None)
    }

    pub fn thing_changed_from(thing: impl Into<String>, from: impl Into<String>) -> Self {
        Self::thing_changed_matching(thing, Some(from.into()), None)
    }

    pub fn thing_changed_to(thing: impl Into<String>, to: impl Into<String>) -> Self {
        Self::thing_changed_matching(thing, None, Some(to.into()))
    }

    pub fn thing_changed_from_to(
        thing: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::thing_changed_matching(thing, Some(from.into()), Some(to.into()))
    }

    fn thing_changed_matching(
        thing: impl Into<String>,
        from: Option<String>,
        to: Option<String>,
    ) -> Self {
        Self::event(EventMatcher::ThingStatusInfoChanged {
            thing: thing.into(),
            from,
            to,
        })
    }

    /// Fire on a client lifecycle event
    pub fn system(kind: EventKind) -> Self {
        Self::event(EventMatcher::System(kind))
    }

    pub fn connected() -> Self {
        Self::system(EventKind::ClientConnected)
    }

    pub fn disconnected() -> Self {
        Self::system(EventKind::ClientDisconnected)
    }

    pub fn connection_stable() -> Self {
        Self::system(EventKind::ConnectionStable)
    }

    pub fn started() -> Self {
        Self::system(EventKind::ClientStarted)
    }

    pub fn stopped() -> Self {
        Self::system(EventKind::ClientStopped)
    }

    pub fn error() -> Self {
        Self::system(EventKind::Error)
    }

    pub fn alive() -> Self {
        Self::system(EventKind::Alive)
    }

    fn event(matcher: EventMatcher) -> Self {
        Self::new(TriggerKind::Event(matcher))
    }

    pub fn kind(&self) -> &TriggerKind {
        &self.kind
    }

    pub fn is_active(&self) -> bool {
        !matches!(*self.lock(), Activation::Inactive)
    }

    /// Whether `event` should run the rule
    ///
    /// Schedule triggers always match; debounce defers to its inner trigger.
    pub fn matches(&self, event: &Event) -> TriggerResult<bool> {
        match &self.kind {
            TriggerKind::Cron(_) | TriggerKind::DateTime(_) => Ok(true),
            TriggerKind::Event(matcher) => matcher.matches(event),
            TriggerKind::Debounce { inner, .. } => inner.matches(event),
        }
    }

    /// Start listening; `run` is invoked for every matching event
    pub fn activate(&self, ctx: &TriggerContext, run: Callback) -> TriggerResult<()> {
        let mut state = self.lock();
        if !matches!(*state, Activation::Inactive) {
            return Err(TriggerError::AlreadyActivated);
        }

        *state = match &self.kind {
            TriggerKind::Cron(expr) => {
                let id = ctx.scheduler.add_cron(expr, timer_job(&ctx.rule_id, run))?;
                debug!(rule_id = %ctx.rule_id, %id, %expr, "Cron trigger activated");
                Activation::Scheduled(Some(id))
            }
            TriggerKind::DateTime(at) => {
                let id = ctx.scheduler.add_once(*at, timer_job(&ctx.rule_id, run));
                debug!(rule_id = %ctx.rule_id, %at, scheduled = id.is_some(), "Date-time trigger activated");
                Activation::Scheduled(id)
            }
            TriggerKind::Event(matcher) => {
                let ids = matcher
                    .subscriptions()
                    .into_iter()
                    .map(|(topic, kind)| {
                        let filtered = filtered_callback(&ctx.rule_id, matcher.clone(), run.clone());
                        ctx.bus.subscribe(topic, kind, filtered)
                    })
                    .collect();
                Activation::Subscribed(ids)
            }
            TriggerKind::Debounce { inner, after } => {
                let token = CancellationToken::new();
                let debounced = debounced_callback(*after, token.clone(), ctx.tasks.clone(), run);
                inner.activate(ctx, debounced)?;
                Activation::Debounced(token)
            }
        };
        Ok(())
    }

    /// Stop listening; a no-op when inactive
    ///
    /// Once this returns no new run originates from this trigger.
    pub fn deactivate(&self, ctx: &TriggerContext) {
        let previous = std::mem::replace(&mut *self.lock(), Activation::Inactive);
        match previous {
            Activation::Inactive | Activation::Scheduled(None) => {}
            Activation::Subscribed(ids) => {
                for id in ids {
                    ctx.bus.unsubscribe(id);
                }
            }
            Activation::Scheduled(Some(id)) => ctx.scheduler.remove(id),
            Activation::Debounced(token) => {
                token.cancel();
                if let TriggerKind::Debounce { inner, .. } = &self.kind {
                    inner.deactivate(ctx);
                }
            }
        }
        trace!(rule_id = %ctx.rule_id, "Trigger deactivated");
    }

    fn lock(&self) -> MutexGuard<'_, Activation> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scheduler job that runs the rule with a synthetic timer event
fn timer_job(rule_id: &str, run: Callback) -> crate::scheduler::Job {
    let rule_id = rule_id.to_string();
    job(move || {
        let event = Arc::new(Event::System(SystemEvent::TimeCronFired {
            rule_id: rule_id.clone(),
        }));
        run(event)
    })
}

/// Bus callback that runs the rule only for events the matcher accepts
pub(crate) fn filtered_callback(rule_id: &str, matcher: EventMatcher, run: Callback) -> Callback {
    let rule_id = rule_id.to_string();
    callback(move |event| {
        let outcome = matcher.matches(&event);
        let run = run.clone();
        let rule_id = rule_id.clone();
        async move {
            match outcome {
                Ok(true) => run(event).await,
                Ok(false) => trace!(%rule_id, topic = event.topic(), "Event did not match trigger"),
                Err(e) => error!(%rule_id, error = %e, "Trigger contract violated"),
            }
        }
    })
}

/// Callback that restarts a delayed run on every invocation
///
/// Only the last invocation in a burst runs, `after` later. Cancelling
/// `token` cancels the pending run and every later one.
fn debounced_callback(
    after: Duration,
    token: CancellationToken,
    tasks: TaskTracker,
    run: Callback,
) -> Callback {
    let pending: Arc<Mutex<Option<CancellationToken>>> = Arc::default();
    callback(move |event| {
        let timer = token.child_token();
        let superseded = pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(timer.clone());
        if let Some(previous) = superseded {
            previous.cancel();
        }

        let run = run.clone();
        tasks.spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => trace!("Debounced run superseded"),
                _ = tokio::time::sleep(after) => run(event).await,
            }
        });
        async {}
    })
}
