//! Completion events and the sinks that record them.
//!
//! Recording is fire-and-forget from the orchestrator's side: a sink error is
//! logged and dropped, never surfaced to the caller.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::info;

use ember_core::{CompletionEvent, Outcome, SessionContext};

use crate::error::DialogError;

/// Context field used to identify the caller in completion events.
pub const IDENTIFIER_FIELD: &str = "phone";

/// Human-readable summary of a completed flow, built from session context.
/// Missing fields render as empty strings.
pub fn summarize(outcome: Outcome, context: &SessionContext) -> String {
    match outcome {
        Outcome::NewBooking => format!(
            "New booking at {} for {} guests on {}",
            context.get_or_empty("location"),
            context.get_or_empty("guests"),
            context.get_or_empty("date"),
        ),
        Outcome::Cancellation => {
            format!("Cancelled booking {}", context.get_or_empty("reference"))
        }
        Outcome::Feedback => format!("Rating: {}/5", context.get_or_empty("rating")),
    }
}

/// Destination for completion events.
#[async_trait]
pub trait CompletionSink: Send + Sync {
    async fn record(&self, event: &CompletionEvent) -> Result<(), DialogError>;
}

/// Writes each event to the tracing log at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl CompletionSink for TracingSink {
    async fn record(&self, event: &CompletionEvent) -> Result<(), DialogError> {
        info!(
            id = %event.id,
            outcome = %event.outcome,
            identifier = %event.identifier,
            summary = %event.summary,
            "Conversation completed"
        );
        Ok(())
    }
}

/// Appends one JSON object per event to a file.
pub struct JsonLinesSink {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CompletionSink for JsonLinesSink {
    async fn record(&self, event: &CompletionEvent) -> Result<(), DialogError> {
        let mut line =
            serde_json::to_string(event).map_err(|e| DialogError::CompletionLog(e.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DialogError::CompletionLog(format!("{}: {e}", parent.display())))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| DialogError::CompletionLog(format!("{}: {e}", self.path.display())))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| DialogError::CompletionLog(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| DialogError::CompletionLog(e.to_string()))?;
        Ok(())
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<CompletionEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events, oldest first.
    pub fn events(&self) -> Vec<CompletionEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionSink for MemorySink {
    async fn record(&self, event: &CompletionEvent) -> Result<(), DialogError> {
        self.events
            .lock()
            .map_err(|_| DialogError::CompletionLog("memory sink poisoned".into()))?
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking_context() -> SessionContext {
        [
            ("location", "Koramangala"),
            ("guests", "4"),
            ("date", "25-12-2025"),
            ("phone", "9876543210"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_summaries() {
        let ctx = booking_context();
        assert_eq!(
            summarize(Outcome::NewBooking, &ctx),
            "New booking at Koramangala for 4 guests on 25-12-2025"
        );

        let ctx: SessionContext = [("reference", "AB12CD")].into_iter().collect();
        assert_eq!(summarize(Outcome::Cancellation, &ctx), "Cancelled booking AB12CD");

        let ctx: SessionContext = [("rating", "5")].into_iter().collect();
        assert_eq!(summarize(Outcome::Feedback, &ctx), "Rating: 5/5");
    }

    #[test]
    fn test_summary_with_missing_fields() {
        assert_eq!(
            summarize(Outcome::NewBooking, &SessionContext::new()),
            "New booking at  for  guests on "
        );
    }

    #[tokio::test]
    async fn test_memory_sink_keeps_order() {
        let sink = MemorySink::new();
        for outcome in [Outcome::Feedback, Outcome::Cancellation] {
            let event = CompletionEvent::new("1", outcome, "s", 50);
            sink.record(&event).await.unwrap();
        }
        let outcomes: Vec<_> = sink.events().iter().map(|e| e.outcome).collect();
        assert_eq!(outcomes, vec![Outcome::Feedback, Outcome::Cancellation]);
    }

    #[tokio::test]
    async fn test_tracing_sink_accepts_events() {
        let event = CompletionEvent::new("1", Outcome::Feedback, "Rating: 4/5", 50);
        assert!(TracingSink.record(&event).await.is_ok());
    }

    #[tokio::test]
    async fn test_json_lines_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("completions.jsonl");
        let sink = JsonLinesSink::new(&path);

        let ctx = booking_context();
        let first = CompletionEvent::new(
            "9876543210",
            Outcome::NewBooking,
            &summarize(Outcome::NewBooking, &ctx),
            50,
        );
        let second = CompletionEvent::new("9876543210", Outcome::Feedback, "Rating: 3/5", 50);
        sink.record(&first).await.unwrap();
        sink.record(&second).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: CompletionEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed, first);
        assert_eq!(parsed.summary.chars().count(), 50);
        let parsed: CompletionEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.outcome, Outcome::Feedback);
    }

    #[tokio::test]
    async fn test_json_lines_sink_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending.
        let sink = JsonLinesSink::new(dir.path());
        let event = CompletionEvent::new("1", Outcome::Feedback, "x", 50);
        assert!(matches!(
            sink.record(&event).await,
            Err(DialogError::CompletionLog(_))
        ));
    }
}
