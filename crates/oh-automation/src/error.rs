//! Trigger and rule errors

use oh_core::EventKind;
use thiserror::Error;

/// Trigger activation and matching errors
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("rule already activated")]
    AlreadyActivated,

    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    /// A qualified matcher was handed an event of the wrong variant
    #[error("trigger expected a {expected} event but received {actual}")]
    ContractViolation {
        expected: EventKind,
        actual: EventKind,
    },
}

/// Result type for trigger operations
pub type TriggerResult<T> = Result<T, TriggerError>;

/// Rule registration and activation errors
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule with id {0} already registered")]
    DuplicateId(String),

    #[error("rule {rule_id}: trigger {index} failed to activate: {source}")]
    Activation {
        rule_id: String,
        index: usize,
        #[source]
        source: TriggerError,
    },
}

/// Result type for rule operations
pub type RuleResult<T> = Result<T, RuleError>;
