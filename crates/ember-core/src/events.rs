use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of a completed conversation flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    NewBooking,
    Cancellation,
    Feedback,
}

impl Outcome {
    /// Tag written to the completion log.
    pub fn tag(&self) -> &'static str {
        match self {
            Outcome::NewBooking => "new_booking",
            Outcome::Cancellation => "cancellation",
            Outcome::Feedback => "feedback",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Record emitted when a conversation reaches a completion state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Identifying field from the session context (the caller's phone number).
    pub identifier: String,
    pub outcome: Outcome,
    /// Short human-readable summary, already truncated to the configured bound.
    pub summary: String,
}

impl CompletionEvent {
    /// Build an event stamped with the current time, truncating `summary`
    /// to at most `max_chars` characters.
    pub fn new(
        identifier: impl Into<String>,
        outcome: Outcome,
        summary: &str,
        max_chars: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            identifier: identifier.into(),
            outcome,
            summary: truncate_chars(summary, max_chars),
        }
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
