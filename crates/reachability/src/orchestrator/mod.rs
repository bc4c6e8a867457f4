//! Orchestrator - drives one discovery pass over a set of endpoints
//!
//! A run moves through Idle, Planning, Running, then Draining or
//! Cancelling, and ends in Done:
//! - Planning reduces the endpoint list against the prior result table
//! - Running admits one worker per target through a counting semaphore
//! - Workers probe the primary target, then fallbacks when called for
//! - The coordinator is the single writer of the result table: it merges
//!   each worker's output as it arrives and streams progress events
//!
//! Cancellation is cooperative. In-flight probes finish or time out on
//! their own; workers that see the token before publishing discard their
//! results.

mod session;
mod types;
mod worker;

pub use session::RunProgress;
pub use types::{RunEvent, RunPhase, RunStatus, RunSummary};

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::censorship::CensorshipSuite;
use crate::config::RunConfig;
use crate::endpoint::EndpointDescriptor;
use crate::error::RunError;
use crate::planner::plan;
use crate::probe::{NetworkProber, Prober};
use crate::result::ResultTable;
use session::OrchestrationSession;
use worker::TargetWorker;

/// Schedules checks for a set of endpoints under bounded concurrency
pub struct CheckOrchestrator {
    prober: Arc<dyn Prober>,
    config: Arc<RunConfig>,
    censorship: Option<Arc<CensorshipSuite>>,
    events: Option<mpsc::UnboundedSender<RunEvent>>,
    phase: Arc<watch::Sender<RunPhase>>,
    progress: Arc<RunProgress>,
}

impl CheckOrchestrator {
    /// Orchestrator over any prober; the configuration is validated here
    pub fn new(prober: Arc<dyn Prober>, config: RunConfig) -> Result<Self, RunError> {
        config.validate()?;
        let (phase, _) = watch::channel(RunPhase::Idle);
        Ok(Self {
            prober,
            config: Arc::new(config),
            censorship: None,
            events: None,
            phase: Arc::new(phase),
            progress: Arc::new(RunProgress::default()),
        })
    }

    /// Orchestrator over real sockets, with the interference suite attached
    /// when the configuration asks for it
    pub fn network(config: RunConfig) -> Result<Self, RunError> {
        let prober = Arc::new(NetworkProber::new(&config.timeouts));
        let censorship = if config.censorship_checks {
            Some(CensorshipSuite::new(config.timeouts).map_err(RunError::Client)?)
        } else {
            None
        };

        let mut orchestrator = Self::new(prober, config)?;
        if let Some(suite) = censorship {
            orchestrator = orchestrator.with_censorship_suite(suite);
        }
        Ok(orchestrator)
    }

    pub fn with_censorship_suite(mut self, suite: CensorshipSuite) -> Self {
        self.censorship = Some(Arc::new(suite));
        self
    }

    /// Stream of run events; the channel is unbounded so workers never wait
    /// on the consumer
    pub fn with_events(mut self, events: mpsc::UnboundedSender<RunEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    pub fn progress(&self) -> Arc<RunProgress> {
        self.progress.clone()
    }

    /// Run one pass. Never fails: problems with individual targets end up
    /// in their results and the terminal status says how the run ended.
    pub async fn run(
        &self,
        endpoints: &[EndpointDescriptor],
        prior: ResultTable,
        cancel: CancellationToken,
    ) -> RunSummary {
        let session = OrchestrationSession::new(prior, self.progress.clone(), self.phase.clone(), self.events.clone());
        let span = info_span!("run", run_id = %session.run_id());
        self.drive(session, endpoints, cancel).instrument(span).await
    }

    async fn drive(
        &self,
        mut session: OrchestrationSession,
        endpoints: &[EndpointDescriptor],
        cancel: CancellationToken,
    ) -> RunSummary {
        session.set_phase(RunPhase::Planning);
        if endpoints.is_empty() {
            return session.finish(RunStatus::NoTargets, 0);
        }

        let plan = plan(endpoints, &self.config.enabled_checks, session.table());
        let skipped = plan.skipped.len();
        if plan.is_empty() {
            return session.finish(RunStatus::NothingToDo, skipped);
        }

        info!(
            targets = plan.work.len(),
            skipped,
            concurrency = self.config.concurrency,
            fast_mode = self.config.fast_mode,
            "starting run"
        );
        session.set_total(plan.work.len());
        session.set_phase(RunPhase::Running);

        let worker = TargetWorker {
            prober: self.prober.clone(),
            config: self.config.clone(),
            censorship: self.censorship.clone(),
            cancel: cancel.clone(),
        };
        let gate = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks = JoinSet::new();
        let mut queue = plan.work.into_iter();
        let mut next = queue.next();
        let mut cancelling = false;

        loop {
            if next.is_none() && !cancelling && session.phase() == RunPhase::Running {
                session.set_phase(RunPhase::Draining);
            }
            if next.is_none() && tasks.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled(), if !cancelling => {
                    cancelling = true;
                    next = None;
                    session.set_phase(RunPhase::Cancelling);
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => match joined {
                    Ok(Some(outcome)) => session.publish(outcome),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "worker task failed");
                        session.task_failed();
                    }
                },

                permit = gate.clone().acquire_owned(), if next.is_some() => {
                    let Ok(permit) = permit else { break };
                    let Some(planned) = next.take() else { continue };

                    let prior_primary = session.prior_primary(planned.endpoint.key());
                    let worker = worker.clone();
                    debug!(key = planned.endpoint.key(), "admitting target");
                    tasks.spawn(
                        async move {
                            let _permit = permit;
                            worker.run(planned, prior_primary).await
                        }
                        .in_current_span(),
                    );
                    next = queue.next();
                }
            }
        }

        let status = if cancelling { RunStatus::Cancelled } else { RunStatus::Completed };
        session.finish(status, skipped)
    }
}
