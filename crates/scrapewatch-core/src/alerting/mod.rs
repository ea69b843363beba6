//! Alerting for ScrapeWatch
//!
//! Fixed threshold rules over a metrics snapshot, and delivery of alert and
//! failure messages to the operator channel.

mod evaluator;
mod notifier;

pub use evaluator::{AlertEvaluator, OVERALL_SUCCESS_THRESHOLD, RECENT_SUCCESS_THRESHOLD};
pub use notifier::{
    compose_alert, compose_error, AlertNotifier, NotificationSender, OperatorChannel,
    ALERT_SUBJECT, ERROR_SUBJECT,
};
