//! Thread entity: a topic-scoped conversation context with a state machine status.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Non-terminal and terminal states a thread can occupy.
///
/// `Archived` is modeled as a status for storage convenience but is
/// semantically a flag orthogonal to the rest of the machine — see
/// [`Thread::prior_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Discuss,
    Implement,
    Review,
    Done,
    Closed,
    Archived,
}

impl ThreadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ThreadStatus::Discuss => "discuss",
            ThreadStatus::Implement => "implement",
            ThreadStatus::Review => "review",
            ThreadStatus::Done => "done",
            ThreadStatus::Closed => "closed",
            ThreadStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "discuss" => Some(ThreadStatus::Discuss),
            "implement" => Some(ThreadStatus::Implement),
            "review" => Some(ThreadStatus::Review),
            "done" => Some(ThreadStatus::Done),
            "closed" => Some(ThreadStatus::Closed),
            "archived" => Some(ThreadStatus::Archived),
            _ => None,
        }
    }

    /// `true` for any state a thread cannot leave via `set-state` (it may
    /// still be archived, unarchived, or deleted).
    pub fn is_terminal(self) -> bool {
        matches!(self, ThreadStatus::Closed)
    }
}

impl std::fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A topic-scoped conversation context and its ordered message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub topic: String,
    pub status: ThreadStatus,
    /// Status the thread held immediately before being archived. `None`
    /// unless `status == Archived`. Restored verbatim by `unarchive`.
    pub prior_status: Option<ThreadStatus>,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Row shape for `threads.list`.
#[derive(Debug, Clone, Default)]
pub struct ThreadFilter {
    pub status: Option<ThreadStatus>,
    pub include_archived: bool,
}
