// [[AUTORL]]/apps/autorl-kernel/src/events.rs
// Purpose: Event definitions for the demo sequencer and the runtime event bus.
// Architecture: Domain Event Layer
// Dependencies: Serde, Chrono, Uuid

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Screen capture and OCR pass
    Perception,
    /// A plan was produced for the current goal
    Planning,
    /// A gesture or input was dispatched to the device
    Action,
    /// The expected element was not on screen
    Warning,
    /// Fallback search failed as well
    Error,
    /// Terminal success of a sequence
    Completed,
    /// The run was written to (mock) long-term memory
    MemorySaved,
    RecoveryAnalyze,
    RecoveryPlan,
    RecoveryExecute,
    Recovered,
    /// Start of the cross-app narrative
    CrossAppStart,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Perception => "perception",
            EventKind::Planning => "planning",
            EventKind::Action => "action",
            EventKind::Warning => "warning",
            EventKind::Error => "error",
            EventKind::Completed => "completed",
            EventKind::MemorySaved => "memory_saved",
            EventKind::RecoveryAnalyze => "recovery_analyze",
            EventKind::RecoveryPlan => "recovery_plan",
            EventKind::RecoveryExecute => "recovery_execute",
            EventKind::Recovered => "recovered",
            EventKind::CrossAppStart => "cross_app_start",
        }
    }
}

/// One emitted step of a demo sequence.
///
/// Fields are only reachable through accessors; an event is never changed
/// after the sequencer hands it to a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoEvent {
    kind: EventKind,
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    plan: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    success: Option<bool>,
    timestamp: DateTime<Utc>,
}

impl DemoEvent {
    pub fn new(kind: EventKind, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            text: text.into(),
            plan: None,
            success: None,
            timestamp,
        }
    }

    pub fn with_plan<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.plan = Some(steps.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn plan(&self) -> Option<&[String]> {
        self.plan.as_deref()
    }

    pub fn success(&self) -> Option<bool> {
        self.success
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Envelope put on the runtime event bus (WebSocket, activity log).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeEvent {
    pub id: String,
    pub run_id: String,
    /// Position of the event within its run, starting at 0
    pub seq: u64,
    #[serde(flatten)]
    pub event: DemoEvent,
}

impl RuntimeEvent {
    pub fn new(run_id: &str, seq: u64, event: DemoEvent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            seq,
            event,
        }
    }
}
