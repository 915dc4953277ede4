//! Typed progress events streamed to the caller during a generation run.
//!
//! The stream is one-directional and append-only: consumers terminate on
//! `complete` or `error`. Over SSE the variant name is the `event:` field
//! and the serialized payload is the `data:` field.

use axum::response::sse::Event;
use serde::Serialize;

/// One failed generation task.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFailure {
    pub item_id: String,
    pub language: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProgressEvent {
    #[serde(rename_all = "camelCase")]
    Start { total_items: usize, total_tasks: usize },

    /// Emitted before each provider call. `phase` is the language being
    /// generated; `current`/`total` count items within that language.
    #[serde(rename_all = "camelCase")]
    Progress {
        phase: String,
        current: usize,
        total: usize,
        item_id: String,
        item_title: String,
        completed_tasks: usize,
        total_tasks: usize,
    },

    #[serde(rename_all = "camelCase")]
    ItemComplete {
        item_id: String,
        completed_tasks: usize,
        total_tasks: usize,
        percent: u32,
    },

    #[serde(rename_all = "camelCase")]
    ItemError { item_id: String, error: String },

    /// Terminal event of every run that got past its structural checks —
    /// emitted even at a 0% success rate.
    #[serde(rename_all = "camelCase")]
    Complete {
        version_id: String,
        total_items: i64,
        success_count: usize,
        error_count: usize,
        errors: Vec<TaskFailure>,
    },

    /// Fatal. Aborts the stream.
    #[serde(rename_all = "camelCase")]
    Error { message: String },
}

impl ProgressEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::Start { .. } => "start",
            ProgressEvent::Progress { .. } => "progress",
            ProgressEvent::ItemComplete { .. } => "item-complete",
            ProgressEvent::ItemError { .. } => "item-error",
            ProgressEvent::Complete { .. } => "complete",
            ProgressEvent::Error { .. } => "error",
        }
    }

    pub fn to_sse_event(&self) -> Result<Event, axum::Error> {
        Ok(Event::default().event(self.name()).json_data(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_as_camel_case_payloads() {
        let event = ProgressEvent::Start {
            total_items: 3,
            total_tasks: 6,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, serde_json::json!({"totalItems": 3, "totalTasks": 6}));
        assert_eq!(event.name(), "start");
    }

    #[test]
    fn complete_event_carries_error_list() {
        let event = ProgressEvent::Complete {
            version_id: "advice-x".to_string(),
            total_items: 1,
            success_count: 1,
            error_count: 1,
            errors: vec![TaskFailure {
                item_id: "1.1.1".to_string(),
                language: "ko".to_string(),
                message: "timeout".to_string(),
            }],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["errorCount"], 1);
        assert_eq!(json["errors"][0]["itemId"], "1.1.1");
        assert_eq!(event.name(), "complete");
    }
}
