//! Cron and one-shot job scheduler
//!
//! Every entry runs as its own task and every cron firing runs its job on a
//! separate task, so a slow job never delays the next firing. Entries added
//! before [`Scheduler::start`] wait until the scheduler is started;
//! [`Scheduler::stop`] cancels all entries and waits for jobs that are
//! already running.

use chrono::{DateTime, Utc};
use cron::Schedule;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace};

use crate::error::{TriggerError, TriggerResult};

/// Number of fields in a supported cron expression
pub const CRON_FIELDS: usize = 6;

/// Work run by a scheduler entry
pub type Job = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure into a [`Job`]
pub fn job<F, Fut>(f: F) -> Job
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Identifier of a scheduler entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

pub struct Scheduler {
    entries: Arc<DashMap<JobId, CancellationToken>>,
    next_id: AtomicU64,
    started: watch::Sender<bool>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            started: watch::Sender::new(false),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Add a recurring entry from a 6-field cron expression
    ///
    /// Fields are second, minute, hour, day of month, month, day of week.
    pub fn add_cron(&self, expr: &str, job: Job) -> TriggerResult<JobId> {
        let schedule = parse_cron(expr)?;
        let (id, token) = self.register();
        let mut started = self.started.subscribe();
        let entries = Arc::clone(&self.entries);
        let expr = expr.to_string();
        let tasks = self.tasks.clone();

        self.tasks.spawn(async move {
            if !wait_started(&mut started, &token).await {
                return;
            }
            debug!(%id, %expr, "Cron entry running");

            // Firings missed while the clock jumped are skipped, never replayed
            let mut last = Utc::now();
            while let Some(next) = schedule.after(&last).next() {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(until(next)) => {}
                }
                trace!(%id, at = %next, "Cron entry fired");
                tasks.spawn(job());
                last = Utc::now().max(next);
            }
            entries.remove(&id);
        });

        Ok(id)
    }

    /// Add an entry that runs once at `at`
    ///
    /// Returns `None` without scheduling anything if `at` is not in the future.
    pub fn add_once(&self, at: DateTime<Utc>, job: Job) -> Option<JobId> {
        if at <= Utc::now() {
            debug!(%at, "One-shot time already passed, not scheduling");
            return None;
        }

        let (id, token) = self.register();
        let mut started = self.started.subscribe();
        let entries = Arc::clone(&self.entries);

        self.tasks.spawn(async move {
            if wait_started(&mut started, &token).await {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(until(at)) => {
                        trace!(%id, %at, "One-shot entry fired");
                        job().await;
                    }
                }
            }
            entries.remove(&id);
        });

        Some(id)
    }

    /// Cancel an entry; a job already running finishes normally
    pub fn remove(&self, id: JobId) {
        if let Some((_, token)) = self.entries.remove(&id) {
            token.cancel();
            debug!(%id, "Removed scheduler entry");
        }
    }

    pub fn start(&self) {
        if !self.started.send_replace(true) {
            info!(entries = self.entries.len(), "Scheduler started");
        }
    }

    /// Cancel every entry and wait for running jobs to finish
    pub async fn stop(&self) {
        self.shutdown.cancel();
        self.entries.clear();
        self.tasks.close();
        self.tasks.wait().await;
        info!("Scheduler stopped");
    }

    /// Number of pending entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn register(&self) -> (JobId, CancellationToken) {
        let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let token = self.shutdown.child_token();
        self.entries.insert(id, token.clone());
        (id, token)
    }
}

/// Validate and parse a cron expression
pub fn parse_cron(expr: &str) -> TriggerResult<Schedule> {
    let fields = expr.split_whitespace().count();
    if fields != CRON_FIELDS {
        return Err(TriggerError::InvalidCron {
            expr: expr.to_string(),
            reason: format!("expected {CRON_FIELDS} fields, found {fields}"),
        });
    }

    Schedule::from_str(expr).map_err(|e| TriggerError::InvalidCron {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

/// Wait for the scheduler to start; false if cancelled first
async fn wait_started(started: &mut watch::Receiver<bool>, token: &CancellationToken) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        result = started.wait_for(|s| *s) => result.is_ok(),
    }
}

fn until(at: DateTime<Utc>) -> Duration {
    (at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}
