use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::censorship::CensorshipProbeResult;
use crate::result::{CumulativeEndpointResult, ResultTable};

/// Lifecycle of one orchestration run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Planning,
    Running,
    /// Every target admitted, waiting for in-flight workers
    Draining,
    /// Cancellation observed, no new targets are admitted
    Cancelling,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::Planning => "planning",
            RunPhase::Running => "running",
            RunPhase::Draining => "draining",
            RunPhase::Cancelling => "cancelling",
            RunPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
    /// Every endpoint was already fully known
    NothingToDo,
    /// The endpoint list was empty
    NoTargets,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::NothingToDo => "nothing to do",
            RunStatus::NoTargets => "no targets",
        };
        f.write_str(name)
    }
}

/// Streamed to the caller while a run progresses
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    PhaseChanged(RunPhase),
    /// Merged entry for a target that just finished
    TargetUpdated(Box<CumulativeEndpointResult>),
    Progress { completed: usize, total: usize },
    Interference { key: String, results: Vec<CensorshipProbeResult> },
}

/// Terminal output of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// Targets published during this run
    pub checked: usize,
    pub available: usize,
    /// Targets where checks ran and none succeeded
    pub unavailable: usize,
    /// Endpoints left out because they were already fully known
    pub skipped: usize,
    /// Worker tasks that died without producing a result
    pub failed_tasks: usize,
    pub table: ResultTable,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub interference: BTreeMap<String, Vec<CensorshipProbeResult>>,
}

/// What a worker hands back to the coordinator for one target
#[derive(Debug, Clone)]
pub(crate) struct TargetOutcome {
    /// Fresh results only; merging with the table happens in the coordinator
    pub fresh: CumulativeEndpointResult,
    pub interference: Vec<CensorshipProbeResult>,
}
