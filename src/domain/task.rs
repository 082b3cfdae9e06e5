//! The canonical task record passed through queue and result store.
//!
//! [`Task`] is both the wire format and the stored format: it serializes to
//! self-describing JSON whose fields round-trip losslessly between the
//! submitter, the queue, the worker, and the result store. Timestamps are
//! integer milliseconds since the Unix epoch.
//!
//! # Lifecycle
//!
//! ```text
//! pending ──► running ──► succeeded
//!                 └─────► failed
//! ```
//!
//! Transitions are monotonic; terminal states reject all transitions. The
//! queue only ever holds `pending` tasks, the result store only terminal
//! ones. Between pop and publication the task is owned exclusively by one
//! worker and its `running` status is not externally visible.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Task lifecycle status.
///
/// # State Machine
///
/// ```text
/// Pending -> Running
/// Running -> Succeeded, Failed
/// Succeeded -> (terminal, no transitions)
/// Failed -> (terminal, no transitions)
/// ```
///
/// # Examples
///
/// ```
/// use conveyor::domain::TaskStatus;
///
/// assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Running));
/// assert!(!TaskStatus::Succeeded.can_transition_to(TaskStatus::Running));
/// assert!(!TaskStatus::Running.can_transition_to(TaskStatus::Running));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted and waiting in the queue.
    Pending,
    /// Popped by a worker and currently executing.
    Running,
    /// Handler returned a result (terminal).
    Succeeded,
    /// Handler failed, timed out, aborted, or had no registration (terminal).
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl TaskStatus {
    /// Returns `true` if this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Returns `true` if transitioning from this status to `next` is valid.
    ///
    /// Transitions are strictly forward; self-transitions are rejected.
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => next == Self::Running,
            Self::Running => matches!(next, Self::Succeeded | Self::Failed),
            Self::Succeeded | Self::Failed => false,
        }
    }
}

/// A client-supplied task specification, as accepted by the submission API.
///
/// The `id` is optional; when absent the submitter assigns one (see
/// [`new_task_id`]). An omitted `payload` is treated as empty.
///
/// # Examples
///
/// ```
/// use conveyor::domain::TaskSpec;
///
/// let spec: TaskSpec = serde_json::from_str(
///     r#"{"kind": "square", "payload": {"x": 7}}"#,
/// ).unwrap();
/// assert_eq!(spec.kind, "square");
/// assert!(spec.id.is_none());
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSpec {
    /// Optional caller-chosen identifier. Assigned by the submitter when
    /// absent.
    #[serde(default)]
    pub id: Option<String>,

    /// Name of the registered handler that should execute this task.
    pub kind: String,

    /// Opaque key-value arguments handed to the handler.
    #[serde(default)]
    pub payload: Map<String, Value>,
}

/// The canonical record passed through queue and result store.
///
/// Serialization notes: `result`, `error`, `started_at`, and `finished_at`
/// are omitted when absent, so a freshly submitted task serializes without
/// terminal fields. `result` and `error` are mutually exclusive and appear
/// only in their respective terminal states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier, stable for the task's lifetime.
    pub id: String,

    /// Name of the registered handler for this task.
    pub kind: String,

    /// Opaque key-value arguments handed to the handler.
    #[serde(default)]
    pub payload: Map<String, Value>,

    /// Current lifecycle status.
    pub status: TaskStatus,

    /// Handler return value; present iff `status` is `succeeded`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Failure diagnostic; present iff `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Submission time, milliseconds since the Unix epoch (submitter clock).
    pub submitted_at: i64,

    /// Time the executing worker popped the task, if it has started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,

    /// Time the handler finished (either way), if it has finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
}

impl Task {
    /// Builds a pending task from a specification, assigning an id when the
    /// caller supplied none and stamping `submitted_at` with the submitter's
    /// clock.
    pub fn from_spec(spec: TaskSpec) -> Self {
        Self {
            id: spec.id.unwrap_or_else(new_task_id),
            kind: spec.kind,
            payload: spec.payload,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            submitted_at: now_ms(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Marks the task running and stamps `started_at`.
    ///
    /// Called by the worker that popped the task; the worker owns the record
    /// exclusively between pop and publication, so this local transition is
    /// not externally visible.
    pub fn mark_running(&mut self) {
        debug_assert!(self.status.can_transition_to(TaskStatus::Running));
        self.status = TaskStatus::Running;
        self.started_at = Some(now_ms());
    }

    /// Transitions to `succeeded` with the handler's return value and stamps
    /// `finished_at`.
    pub fn complete(&mut self, result: Value) {
        debug_assert!(self.status.can_transition_to(TaskStatus::Succeeded));
        self.status = TaskStatus::Succeeded;
        self.result = Some(result);
        self.error = None;
        self.finished_at = Some(now_ms());
    }

    /// Transitions to `failed` with a diagnostic and stamps `finished_at`.
    pub fn fail(&mut self, error: impl Into<String>) {
        debug_assert!(self.status.can_transition_to(TaskStatus::Failed));
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.result = None;
        self.finished_at = Some(now_ms());
    }

    /// Returns `true` if the task reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Generates a task identifier: 128 random bits rendered as 32 hex digits.
///
/// Collision probability is treated as negligible; no collision check is
/// performed anywhere.
///
/// # Examples
///
/// ```
/// use conveyor::domain::new_task_id;
///
/// let id = new_task_id();
/// assert_eq!(id.len(), 32);
/// assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
/// ```
pub fn new_task_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(kind: &str) -> TaskSpec {
        TaskSpec {
            id: None,
            kind: kind.to_string(),
            payload: Map::new(),
        }
    }

    // ---- TaskStatus tests ----

    #[test]
    fn terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Succeeded.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn transitions_are_monotonic() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Succeeded));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Failed));

        // No back-transitions, no skipping, no self-transitions.
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Succeeded));
        assert!(!TaskStatus::Running.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Succeeded.can_transition_to(TaskStatus::Failed));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Succeeded).unwrap(),
            r#""succeeded""#
        );
        let status: TaskStatus = serde_json::from_str(r#""pending""#).unwrap();
        assert_eq!(status, TaskStatus::Pending);
    }

    // ---- Task construction tests ----

    #[test]
    fn from_spec_assigns_id_when_absent() {
        let task = Task::from_spec(spec("square"));
        assert_eq!(task.id.len(), 32);
        assert!(task.id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.started_at.is_none());
        assert!(task.finished_at.is_none());
    }

    #[test]
    fn from_spec_keeps_caller_id() {
        let task = Task::from_spec(TaskSpec {
            id: Some("caller-chosen".to_string()),
            kind: "square".to_string(),
            payload: Map::new(),
        });
        assert_eq!(task.id, "caller-chosen");
    }

    #[test]
    fn generated_ids_are_distinct() {
        assert_ne!(new_task_id(), new_task_id());
    }

    // ---- Lifecycle tests ----

    #[test]
    fn complete_sets_result_and_finished_at() {
        let mut task = Task::from_spec(spec("square"));
        task.mark_running();
        assert_eq!(task.status, TaskStatus::Running);
        assert!(task.started_at.is_some());

        task.complete(json!(49));
        assert_eq!(task.status, TaskStatus::Succeeded);
        assert_eq!(task.result, Some(json!(49)));
        assert!(task.error.is_none());
        assert!(task.finished_at.is_some());
        assert!(task.is_terminal());
    }

    #[test]
    fn fail_sets_error_and_clears_result() {
        let mut task = Task::from_spec(spec("nope"));
        task.mark_running();
        task.fail("no handler for kind nope");
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("no handler for kind nope"));
        assert!(task.result.is_none());
        assert!(task.is_terminal());
    }

    // ---- Wire format tests ----

    #[test]
    fn wire_round_trip_preserves_all_fields() {
        let mut payload = Map::new();
        payload.insert("x".to_string(), json!(7));
        payload.insert("label".to_string(), json!("seven"));

        let mut task = Task::from_spec(TaskSpec {
            id: Some("a".repeat(32)),
            kind: "square".to_string(),
            payload,
        });
        task.mark_running();
        task.complete(json!({"squared": 49}));

        let bytes = serde_json::to_vec(&task).unwrap();
        let decoded: Task = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(decoded.id, task.id);
        assert_eq!(decoded.kind, task.kind);
        assert_eq!(decoded.payload, task.payload);
        assert_eq!(decoded.status, task.status);
        assert_eq!(decoded.result, task.result);
        assert_eq!(decoded.error, task.error);
        assert_eq!(decoded.submitted_at, task.submitted_at);
        assert_eq!(decoded.started_at, task.started_at);
        assert_eq!(decoded.finished_at, task.finished_at);
    }

    #[test]
    fn pending_task_omits_terminal_fields() {
        let task = Task::from_spec(spec("square"));
        let value = serde_json::to_value(&task).unwrap();
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("result"));
        assert!(!object.contains_key("error"));
        assert!(!object.contains_key("started_at"));
        assert!(!object.contains_key("finished_at"));
        assert!(object["submitted_at"].is_i64());
    }

    #[test]
    fn spec_payload_defaults_to_empty() {
        let spec: TaskSpec = serde_json::from_str(r#"{"kind": "square"}"#).unwrap();
        assert!(spec.payload.is_empty());
        assert!(spec.id.is_none());
    }
}
