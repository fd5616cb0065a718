//! Function-instance log model.
//!
//! Every invocation produces a started message, a completed message and a
//! [`FunctionInstanceLogEntry`] that is handed to the result aggregator.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::aggregator::duration_millis;

/// Target of the per-invocation result lines.
pub const RESULTS_TARGET: &str = "jobhost::results";

// =============================================================================
// Messages
// =============================================================================

/// Emitted when an invocation starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionStartedMessage {
    /// Unique id of this invocation.
    pub invocation_id: Uuid,
    /// Name of the invoked function.
    pub function_name: String,
    /// When the invocation started.
    pub start_time: DateTime<Utc>,
    /// Invoke strings of the bound parameters, by parameter name.
    pub arguments: HashMap<String, String>,
    /// Why the function ran (e.g. `"New blob detected: c/a.txt"`).
    pub trigger_reason: Option<String>,
}

/// Emitted when an invocation finishes, successfully or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCompletedMessage {
    /// The matching started message.
    #[serde(flatten)]
    pub started: FunctionStartedMessage,
    /// When the invocation ended.
    pub end_time: DateTime<Utc>,
    /// Failure description; `None` on success.
    pub failure: Option<String>,
}

impl FunctionCompletedMessage {
    /// Returns `true` when the invocation succeeded.
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// Wall-clock duration of the invocation.
    pub fn duration(&self) -> Duration {
        (self.end_time - self.started.start_time)
            .to_std()
            .unwrap_or_default()
    }
}

// =============================================================================
// Log entry
// =============================================================================

/// One invocation, as recorded for result aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionInstanceLogEntry {
    /// Unique id of this invocation.
    pub invocation_id: Uuid,
    /// Name of the invoked function.
    pub function_name: String,
    /// When the invocation started.
    pub started_at: DateTime<Utc>,
    /// When it ended; `None` while running.
    pub ended_at: Option<DateTime<Utc>>,
    /// Duration, once ended.
    pub duration: Option<Duration>,
    /// Failure description; `None` on success.
    pub failure: Option<String>,
    /// Invoke strings of the bound parameters, by parameter name.
    pub arguments: HashMap<String, String>,
    /// Why the function ran.
    pub trigger_reason: Option<String>,
}

impl FunctionInstanceLogEntry {
    /// Creates an entry for a running invocation.
    pub fn started(message: &FunctionStartedMessage) -> Self {
        Self {
            invocation_id: message.invocation_id,
            function_name: message.function_name.clone(),
            started_at: message.start_time,
            ended_at: None,
            duration: None,
            failure: None,
            arguments: message.arguments.clone(),
            trigger_reason: message.trigger_reason.clone(),
        }
    }

    /// Creates an entry for a finished invocation.
    pub fn completed(message: &FunctionCompletedMessage) -> Self {
        Self {
            ended_at: Some(message.end_time),
            duration: Some(message.duration()),
            failure: message.failure.clone(),
            ..Self::started(&message.started)
        }
    }

    /// Returns `true` once the invocation has ended.
    pub fn is_completed(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Returns `true` for a completed, successful invocation.
    pub fn succeeded(&self) -> bool {
        self.is_completed() && self.failure.is_none()
    }
}

// =============================================================================
// Loggers
// =============================================================================

/// Observes invocation lifecycle events.
#[async_trait]
pub trait FunctionInstanceLogger: Send + Sync {
    /// Called before the function body runs. Returns an id for the started
    /// record, which may be empty.
    async fn function_started(&self, message: &FunctionStartedMessage) -> String;

    /// Called after the function finished, including binding failures.
    async fn function_completed(&self, message: &FunctionCompletedMessage);

    /// Withdraws a started record that will never complete.
    async fn delete_function_started(&self, _started_id: &str) {}
}

/// Writes one result line per completed invocation under [`RESULTS_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingInstanceLogger;

#[async_trait]
impl FunctionInstanceLogger for TracingInstanceLogger {
    async fn function_started(&self, message: &FunctionStartedMessage) -> String {
        message.invocation_id.to_string()
    }

    async fn function_completed(&self, message: &FunctionCompletedMessage) {
        let duration_ms = duration_millis(message.duration());
        match &message.failure {
            None => info!(
                target: RESULTS_TARGET,
                function = %message.started.function_name,
                invocation_id = %message.started.invocation_id,
                duration_ms,
                succeeded = true,
                "Executed '{}' (Succeeded)",
                message.started.function_name
            ),
            Some(failure) => error!(
                target: RESULTS_TARGET,
                function = %message.started.function_name,
                invocation_id = %message.started.invocation_id,
                duration_ms,
                succeeded = false,
                failure = %failure,
                "Executed '{}' (Failed)",
                message.started.function_name
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> FunctionStartedMessage {
        FunctionStartedMessage {
            invocation_id: Uuid::new_v4(),
            function_name: "resize".into(),
            start_time: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            arguments: HashMap::from([("blob".to_string(), "images/a.png".to_string())]),
            trigger_reason: Some("New blob detected: images/a.png".into()),
        }
    }

    #[test]
    fn test_started_entry_is_not_completed() {
        let entry = FunctionInstanceLogEntry::started(&started());
        assert!(!entry.is_completed());
        assert!(!entry.succeeded());
        assert_eq!(entry.arguments["blob"], "images/a.png");
    }

    #[test]
    fn test_completed_entry() {
        let started = started();
        let completed = FunctionCompletedMessage {
            end_time: started.start_time + chrono::Duration::milliseconds(250),
            started,
            failure: None,
        };
        let entry = FunctionInstanceLogEntry::completed(&completed);
        assert!(entry.is_completed());
        assert!(entry.succeeded());
        assert_eq!(entry.duration, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_failed_entry() {
        let started = started();
        let completed = FunctionCompletedMessage {
            end_time: started.start_time,
            started,
            failure: Some("boom".into()),
        };
        assert!(!completed.succeeded());
        let entry = FunctionInstanceLogEntry::completed(&completed);
        assert!(entry.is_completed());
        assert!(!entry.succeeded());
    }

    #[test]
    fn test_completed_message_json_is_flat() {
        let started = started();
        let completed = FunctionCompletedMessage {
            end_time: started.start_time,
            started,
            failure: None,
        };
        let json = serde_json::to_value(&completed).unwrap();
        assert_eq!(json["functionName"], "resize");
        assert!(json.get("started").is_none());
    }
}
