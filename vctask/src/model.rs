//! Task record model
//!
//! Normalized shape of a task record as fetched from the management server.
//! The dedup engine keys on `id`, `state` and the epoch derived from
//! `start_time`; everything else is carried for reporting only.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Task state reported by the server.
///
/// The label set is server-defined; only `Running` gets special handling in
/// the dedup engine, so unknown labels are preserved as `Other` rather than
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskState {
    Running,
    Success,
    Error,
    Other(String),
}

impl TaskState {
    pub fn is_running(&self) -> bool {
        matches!(self, TaskState::Running)
    }
}

impl From<String> for TaskState {
    fn from(label: String) -> Self {
        match label.to_lowercase().as_str() {
            "running" => TaskState::Running,
            "success" => TaskState::Success,
            "error" => TaskState::Error,
            _ => TaskState::Other(label),
        }
    }
}

impl From<TaskState> for String {
    fn from(state: TaskState) -> Self {
        state.to_string()
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Running => write!(f, "running"),
            TaskState::Success => write!(f, "success"),
            TaskState::Error => write!(f, "error"),
            TaskState::Other(label) => write!(f, "{label}"),
        }
    }
}

/// Why the task was started.
///
/// The server attaches one of several reason object shapes; they are
/// normalized into a tagged variant here instead of being inspected by
/// type name downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReasonKind {
    #[serde(rename_all = "camelCase")]
    Scheduled { schedule_name: String },
    #[serde(rename_all = "camelCase")]
    User { user_name: String },
    #[default]
    Unknown,
}

impl fmt::Display for ReasonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReasonKind::Scheduled { schedule_name } => write!(f, "schedule {schedule_name}"),
            ReasonKind::User { user_name } => write!(f, "user {user_name}"),
            ReasonKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// A single task record, immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    pub start_time: DateTime<FixedOffset>,
    /// Meaningful only when `state` is not `Running`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complete_time: Option<DateTime<FixedOffset>>,
    pub state: TaskState,
    pub entity_name: String,
    pub description_id: String,
    pub reason: ReasonKind,
}

impl TaskRecord {
    /// Dedup bucket key: `start_time` as integer seconds since the Unix
    /// epoch. Always derived from `start_time`, never `complete_time`, so a
    /// task's bucket does not change as it transitions from running to
    /// complete.
    pub fn epoch(&self) -> i64 {
        self.start_time.timestamp()
    }
}

/// Extract the task id from the server's composite key (`"task-5001"` ->
/// `"5001"`). Keys without a suffix are kept whole.
pub fn task_id_from_key(key: &str) -> String {
    match key.rsplit_once('-') {
        Some((_, suffix)) if !suffix.is_empty() => suffix.to_string(),
        _ => key.to_string(),
    }
}
