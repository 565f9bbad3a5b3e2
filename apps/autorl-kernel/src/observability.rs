use serde::{Deserialize, Serialize};

use crate::models::{RunRecord, RunStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub completed_runs: usize,
    pub recovered_runs: usize,
    pub rejected_runs: usize,
    pub failed_runs: usize,
    pub active_runs: usize,
    pub avg_runtime_ms: f64,
    /// Percentage of finished, non-rejected runs that completed
    pub success_rate: f64,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            completed_runs: 0,
            recovered_runs: 0,
            rejected_runs: 0,
            failed_runs: 0,
            active_runs: 0,
            avg_runtime_ms: 0.0,
            success_rate: 0.0,
        }
    }
}

impl Metrics {
    pub fn from_runs<'a>(runs: impl IntoIterator<Item = &'a RunRecord>) -> Self {
        let mut metrics = Metrics::default();
        let mut total_ms: u64 = 0;
        let mut timed: u64 = 0;

        for run in runs {
            match run.status {
                RunStatus::Running => metrics.active_runs += 1,
                RunStatus::Completed => metrics.completed_runs += 1,
                RunStatus::Recovered => metrics.recovered_runs += 1,
                RunStatus::Rejected => metrics.rejected_runs += 1,
                RunStatus::Failed => metrics.failed_runs += 1,
            }
            if matches!(run.status, RunStatus::Completed | RunStatus::Recovered) {
                if let Some(ms) = run.duration_ms {
                    total_ms += ms;
                    timed += 1;
                }
            }
        }

        if timed > 0 {
            metrics.avg_runtime_ms = total_ms as f64 / timed as f64;
        }
        let finished = metrics.completed_runs + metrics.recovered_runs + metrics.failed_runs;
        if finished > 0 {
            metrics.success_rate = metrics.completed_runs as f64 / finished as f64 * 100.0;
        }
        metrics
    }
}
