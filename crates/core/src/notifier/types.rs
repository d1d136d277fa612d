//! Wire messages exchanged with listeners.

use serde::{Deserialize, Serialize};

/// Current time as epoch milliseconds, the timestamp carried by every outbound message.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Lifecycle state of a tracked task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Whether no further events may follow.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Messages pushed to listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Sent once when a listener connects.
    Connected { client_id: String, timestamp: i64 },
    Progress {
        task_id: String,
        percentage: u32,
        step: u32,
        total_steps: u32,
        message: String,
        status: TaskStatus,
        /// Milliseconds since the task started.
        elapsed: u64,
        timestamp: i64,
    },
    Complete {
        task_id: String,
        result: serde_json::Value,
        elapsed: u64,
        timestamp: i64,
    },
    Error {
        task_id: String,
        message: String,
        timestamp: i64,
    },
    Pong { timestamp: i64 },
}

impl ServerMessage {
    pub fn connected(client_id: impl Into<String>) -> Self {
        Self::Connected {
            client_id: client_id.into(),
            timestamp: now_millis(),
        }
    }

    pub fn pong() -> Self {
        Self::Pong {
            timestamp: now_millis(),
        }
    }

    /// Wire name of the message type, used as a metrics label.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Progress { .. } => "progress",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
            Self::Pong { .. } => "pong",
        }
    }

    /// Whether this is the last message of a task.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// The task this message belongs to, if any.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::Progress { task_id, .. }
            | Self::Complete { task_id, .. }
            | Self::Error { task_id, .. } => Some(task_id),
            Self::Connected { .. } | Self::Pong { .. } => None,
        }
    }
}

/// Control messages sent by listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Subscribe { task_id: String },
    Unsubscribe { task_id: String },
    Ping,
}

/// Generates a listener-facing client id of the form `client-<millis>-<random>`.
pub fn generate_client_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("client-{}-{}", now_millis(), &suffix[..9])
}
