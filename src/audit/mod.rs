//! Append-only security event store.
//!
//! Every guard stage that triggers writes one [`GuardrailEvent`] here. The
//! store never deletes individual entries; the only mutation besides append
//! is an administrative full clear. Append, read-back, and clear are all
//! atomic with respect to each other, so concurrent requests never observe
//! a partially cleared store.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored input previews are truncated to this many characters, both to
/// bound storage and to avoid persisting full sensitive payloads.
pub const MAX_PREVIEW_CHARS: usize = 200;

/// Events at or above this threat level count as high-threat in summaries.
pub const HIGH_THREAT_CUTOFF: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    InputBlocked,
    OutputSanitized,
    OutputBlocked,
    DocumentSanitized,
    PromptOverrideBlocked,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InputBlocked => "INPUT_BLOCKED",
            Self::OutputSanitized => "OUTPUT_SANITIZED",
            Self::OutputBlocked => "OUTPUT_BLOCKED",
            Self::DocumentSanitized => "DOCUMENT_SANITIZED",
            Self::PromptOverrideBlocked => "PROMPT_OVERRIDE_BLOCKED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionTaken {
    Blocked,
    Sanitized,
    Allowed,
}

impl ActionTaken {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::Sanitized => "sanitized",
            Self::Allowed => "allowed",
        }
    }
}

/// A single security event. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    /// Truncated excerpt of the triggering input.
    pub input_preview: String,
    pub threat_level: f64,
    pub action_taken: ActionTaken,
    pub details: serde_json::Value,
}

impl GuardrailEvent {
    pub fn new(
        event_type: EventType,
        input: &str,
        threat_level: f64,
        action_taken: ActionTaken,
        details: serde_json::Value,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            input_preview: truncate_preview(input),
            threat_level,
            action_taken,
            details,
        }
    }
}

fn truncate_preview(input: &str) -> String {
    if input.chars().count() <= MAX_PREVIEW_CHARS {
        return input.to_string();
    }
    let cut: String = input.chars().take(MAX_PREVIEW_CHARS).collect();
    format!("{cut}...")
}

/// Aggregate statistics over the stored events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSummary {
    pub total_events: usize,
    pub events_by_type: BTreeMap<String, usize>,
    pub high_threat_count: usize,
}

/// Concurrency-safe append-only event store.
///
/// A single writer lock over a `Vec` is deliberate: correctness first, and
/// event volume is low (one entry per triggered guard stage).
#[derive(Debug, Default)]
pub struct SecurityLog {
    events: Mutex<Vec<GuardrailEvent>>,
}

impl SecurityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, event: GuardrailEvent) {
        let mut events = self
            .events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        events.push(event);
    }

    /// The most recent events, newest first, at most `limit`.
    pub fn recent(&self, limit: usize) -> Vec<GuardrailEvent> {
        self.recent_filtered(limit, None, 0.0)
    }

    /// Newest-first read-back with optional type and threat-level filters.
    pub fn recent_filtered(
        &self,
        limit: usize,
        event_type: Option<EventType>,
        min_threat_level: f64,
    ) -> Vec<GuardrailEvent> {
        let events = self
            .events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        events
            .iter()
            .rev()
            .filter(|e| event_type.is_none_or(|t| e.event_type == t))
            .filter(|e| e.threat_level >= min_threat_level)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Administrative full clear. Atomic: readers see either the old store
    /// or an empty one, never a partial state.
    pub fn clear(&self) {
        let mut events = self
            .events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        events.clear();
    }

    pub fn summary(&self) -> LogSummary {
        let events = self
            .events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut events_by_type = BTreeMap::new();
        let mut high_threat_count = 0;
        for event in events.iter() {
            *events_by_type
                .entry(event.event_type.as_str().to_string())
                .or_insert(0) += 1;
            if event.threat_level >= HIGH_THREAT_CUTOFF {
                high_threat_count += 1;
            }
        }
        LogSummary {
            total_events: events.len(),
            events_by_type,
            high_threat_count,
        }
    }
}
