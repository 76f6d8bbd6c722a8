//! Rule engine
//!
//! Rules are event-driven: a rule's triggers listen on the user event bus or
//! the scheduler, and every matching firing runs the rule body as its own
//! task.
//!
//! # Architecture
//!
//! ```text
//! RULE = TRIGGERS → BODY
//! ```
//!
//! - **Triggers**: cron, one-shot date-time, item/thing/system events, and a
//!   debounce decorator around any of them
//! - **Scheduler**: runs cron and one-shot entries once started
//! - **RuleManager**: activates rules at start and waits for in-flight runs
//!   at stop
//!
//! # Key Types
//!
//! - [`Trigger`] - Rule precondition with its own activation state
//! - [`RuleData`] - Rule metadata
//! - [`RuleManager`] - Owns all rules and their lifecycle

mod error;
pub mod rule;
pub mod scheduler;
pub mod trigger;

pub use error::{RuleError, RuleResult, TriggerError, TriggerResult};
pub use rule::{rule_body, RuleBody, RuleContext, RuleData, RuleManager};
pub use scheduler::{JobId, Scheduler};
pub use trigger::{EventMatcher, Trigger, TriggerContext, TriggerKind};
