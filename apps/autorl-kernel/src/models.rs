use serde::{Deserialize, Serialize};

use crate::events::RuntimeEvent;

/// Geometry of an on-screen element as reported by the mock device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn center(&self) -> (u32, u32) {
        (
            self.x.saturating_add(self.width / 2),
            self.y.saturating_add(self.height / 2),
        )
    }
}

/// Simulated input sent to the visual device mock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Gesture {
    Tap { x: u32, y: u32 },
    Type { field: String, text: String },
}

/// A gesture tagged with the run that dispatched it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunGesture {
    pub run_id: String,
    pub gesture: Gesture,
}

/// Caller-supplied switches that force the fallback and recovery branches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FaultFlags {
    pub inject_update: bool,
    pub inject_error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceVariant {
    Primary,
    CrossApp,
}

/// How a single sequencer invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceOutcome {
    Completed,
    Recovered,
    /// Another sequence held the run guard; nothing was emitted
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Recovered,
    Rejected,
    /// The sequence task aborted before reporting an outcome
    Failed,
}

impl From<SequenceOutcome> for RunStatus {
    fn from(outcome: SequenceOutcome) -> Self {
        match outcome {
            SequenceOutcome::Completed => RunStatus::Completed,
            SequenceOutcome::Recovered => RunStatus::Recovered,
            SequenceOutcome::Rejected => RunStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub variant: SequenceVariant,
    pub faults: FaultFlags,
    pub client_id: String,
    pub status: RunStatus,
    pub events: Vec<RuntimeEvent>,
    pub start_time: String,
    pub end_time: Option<String>,
    pub duration_ms: Option<u64>,
}

impl RunRecord {
    pub fn is_finished(&self) -> bool {
        self.status != RunStatus::Running
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Idle,
    Running,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub id: String,
    pub platform: Platform,
    pub is_real: bool,
    pub status: DeviceStatus,
    pub current_task: Option<String>,
}
