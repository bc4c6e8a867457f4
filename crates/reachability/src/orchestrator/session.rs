use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use uuid::Uuid;

use super::types::{RunEvent, RunPhase, RunStatus, RunSummary, TargetOutcome};
use crate::censorship::{CensorshipProbeResult, is_interfered};
use crate::merger::merge_cumulative;
use crate::result::{ResultTable, TargetResult};

/// Completed/total counters, readable from outside while a run is live
#[derive(Debug, Default)]
pub struct RunProgress {
    completed: AtomicUsize,
    total: AtomicUsize,
}

impl RunProgress {
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> (usize, usize) {
        (self.completed(), self.total())
    }

    fn reset(&self, total: usize) {
        self.completed.store(0, Ordering::Release);
        self.total.store(total, Ordering::Release);
    }

    fn increment(&self) -> usize {
        self.completed.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// State of one run. Owned by the coordinator, which is the only writer
/// of the result table.
pub(crate) struct OrchestrationSession {
    run_id: Uuid,
    table: ResultTable,
    interference: BTreeMap<String, Vec<CensorshipProbeResult>>,
    progress: Arc<RunProgress>,
    phase: Arc<watch::Sender<RunPhase>>,
    events: Option<mpsc::UnboundedSender<RunEvent>>,
    checked: usize,
    available: usize,
    unavailable: usize,
    failed_tasks: usize,
}

impl OrchestrationSession {
    pub fn new(
        prior: ResultTable,
        progress: Arc<RunProgress>,
        phase: Arc<watch::Sender<RunPhase>>,
        events: Option<mpsc::UnboundedSender<RunEvent>>,
    ) -> Self {
        progress.reset(0);
        Self {
            run_id: Uuid::new_v4(),
            table: prior,
            interference: BTreeMap::new(),
            progress,
            phase,
            events,
            checked: 0,
            available: 0,
            unavailable: 0,
            failed_tasks: 0,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn table(&self) -> &ResultTable {
        &self.table
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.borrow()
    }

    pub fn set_phase(&self, phase: RunPhase) {
        if self.phase.send_replace(phase) != phase {
            info!(%phase, "run phase changed");
            self.emit(RunEvent::PhaseChanged(phase));
        }
    }

    pub fn set_total(&self, total: usize) {
        self.progress.reset(total);
        self.emit(RunEvent::Progress { completed: 0, total });
    }

    pub fn prior_primary(&self, key: &str) -> Option<TargetResult> {
        self.table.get(key).map(|entry| entry.primary.clone())
    }

    /// Fold a worker's fresh results into the table and notify the sink
    pub fn publish(&mut self, outcome: TargetOutcome) {
        let TargetOutcome { fresh, interference } = outcome;
        let key = fresh.key.clone();

        let merged = merge_cumulative(self.table.get(&key), fresh);
        self.checked += 1;
        if merged.is_available() {
            self.available += 1;
        } else if merged.was_attempted() {
            self.unavailable += 1;
        }
        self.table.insert(merged.clone());

        if !interference.is_empty() {
            if is_interfered(&interference) {
                warn!(%key, "interference signals detected");
            }
            self.emit(RunEvent::Interference { key: key.clone(), results: interference.clone() });
            self.interference.insert(key, interference);
        }

        let completed = self.progress.increment();
        self.emit(RunEvent::TargetUpdated(Box::new(merged)));
        self.emit(RunEvent::Progress { completed, total: self.progress.total() });
    }

    pub fn task_failed(&mut self) {
        self.failed_tasks += 1;
    }

    pub fn finish(self, status: RunStatus, skipped: usize) -> RunSummary {
        self.set_phase(RunPhase::Done);
        info!(
            %status,
            checked = self.checked,
            available = self.available,
            skipped,
            "run finished"
        );

        RunSummary {
            run_id: self.run_id,
            status,
            checked: self.checked,
            available: self.available,
            unavailable: self.unavailable,
            skipped,
            failed_tasks: self.failed_tasks,
            table: self.table,
            interference: self.interference,
        }
    }

    /// A dropped receiver never stalls the run
    fn emit(&self, event: RunEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{CheckKind, Latency};
    use crate::result::CumulativeEndpointResult;

    fn session() -> (OrchestrationSession, mpsc::UnboundedReceiver<RunEvent>, Arc<RunProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (phase, _) = watch::channel(RunPhase::Idle);
        let progress = Arc::new(RunProgress::default());
        (OrchestrationSession::new(ResultTable::new(), progress.clone(), Arc::new(phase), Some(tx)), rx, progress)
    }

    fn outcome(key: &str, ping: Latency) -> TargetOutcome {
        let primary = TargetResult::primary(key).with_latency(CheckKind::Ping, ping);
        TargetOutcome { fresh: CumulativeEndpointResult::new(key, primary), interference: Vec::new() }
    }

    #[test]
    fn publish_counts_and_streams() {
        let (mut session, mut rx, progress) = session();
        session.set_total(2);
        session.publish(outcome("a.example", Latency::Millis(10)));
        session.publish(outcome("b.example", Latency::Failed));

        assert_eq!(progress.snapshot(), (2, 2));
        let summary = session.finish(RunStatus::Completed, 0);
        assert_eq!((summary.checked, summary.available, summary.unavailable), (2, 1, 1));

        let mut progress_events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let RunEvent::Progress { completed, total } = event {
                progress_events.push((completed, total));
            }
        }
        assert_eq!(progress_events, vec![(0, 2), (1, 2), (2, 2)]);
    }

    #[test]
    fn phase_events_only_on_change() {
        let (session, mut rx, _) = session();
        session.set_phase(RunPhase::Planning);
        session.set_phase(RunPhase::Planning);
        session.set_phase(RunPhase::Running);

        let phases: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            phases,
            vec![RunEvent::PhaseChanged(RunPhase::Planning), RunEvent::PhaseChanged(RunPhase::Running)]
        );
        assert_eq!(session.phase(), RunPhase::Running);
    }

    #[test]
    fn target_without_checks_is_not_unavailable() {
        let (mut session, _rx, _) = session();
        session.publish(outcome("sni://idle.example", Latency::NotAttempted));
        session.publish(outcome("sni://down.example", Latency::Failed));

        let summary = session.finish(RunStatus::Completed, 0);
        assert_eq!((summary.checked, summary.available, summary.unavailable), (2, 0, 1));
    }

    #[test]
    fn closed_receiver_is_ignored() {
        let (mut session, rx, _) = session();
        drop(rx);
        session.publish(outcome("a.example", Latency::Millis(1)));
        assert_eq!(session.table().len(), 1);
    }
}
