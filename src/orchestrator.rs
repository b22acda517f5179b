//! Run orchestration: trigger to verdict report
//!
//! One `RunOrchestrator` instance drives one run through an explicit state
//! machine: PENDING -> RUNNING -> AGGREGATING -> ANALYZING -> COMPLETE, with
//! FAILED terminal from any state. Benchmark cases execute on a bounded
//! worker pool; per-case faults (execution errors, timeouts, empty samples,
//! store retry exhaustion) are contained as Inconclusive verdicts, and only
//! infrastructure-wide faults fail the run. A process-wide `RunRegistry`
//! tracks in-flight runs by commit ref so a superseding trigger can cancel
//! its predecessor.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use crossbeam::channel;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregate::{AggregationConfig, SampleAggregator};
use crate::analysis::{classify, AnalysisPolicy, Verdict};
use crate::case::{BenchmarkCase, CaseSet};
use crate::history::{with_retry, HistoryStore, RetryPolicy};
use crate::record::{AggregatedResult, RawSample};
use crate::report::{RunFailure, RunReport};
use crate::resolver::{ArtifactResolver, BuildArtifact, BuildNotFoundError};
use crate::runner::{CancelToken, ExecutionError, MeasurementRunner, RunContext};

/// A request to benchmark one commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub commit_ref: String,
    /// Subset of registered case ids to run; `None` runs all
    #[serde(default)]
    pub requested_cases: Option<BTreeSet<String>>,
    /// Override for the configured repetition count
    #[serde(default)]
    pub repetitions: Option<u32>,
}

impl Trigger {
    /// Trigger running every registered case with configured repetitions
    pub fn all(commit_ref: &str) -> Self {
        Self {
            commit_ref: commit_ref.to_string(),
            requested_cases: None,
            repetitions: None,
        }
    }
}

/// Lifecycle states of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Running,
    Aggregating,
    Analyzing,
    Complete,
    Failed,
}

/// Run-level failures
///
/// Everything here is an infrastructure fault or a normal termination;
/// individual benchmark-case failures never surface as a `RunError`.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    BuildNotFound(#[from] BuildNotFoundError),

    #[error("run for `{0}` was cancelled")]
    Cancelled(String),

    #[error("a run for `{0}` is already in flight")]
    AlreadyActive(String),

    #[error("store failures on {failed} of {total} cases exceeded the tolerated fraction")]
    StoreDegraded { failed: usize, total: usize },

    #[error("no registered benchmark cases matched the trigger")]
    NoCasesSelected,

    #[error("invalid orchestrator configuration: {0}")]
    InvalidConfig(String),
}

impl RunError {
    /// Minimal status payload for FAILED and cancelled runs
    pub fn into_failure(&self, commit_ref: &str) -> RunFailure {
        RunFailure::new(commit_ref, self.to_string())
    }
}

/// Top-level orchestrator configuration, loadable from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Benchmark invocations per case, absorbing measurement noise
    pub repetitions: u32,

    /// Worker pool size; 0 means available parallelism. Set to 1 for
    /// fidelity-critical runs where concurrent execution would skew timings.
    pub concurrency: usize,

    /// Per-case wall-clock budget; an expired case is recorded as a timeout
    /// without touching its siblings
    pub case_timeout_secs: u64,

    /// Fraction of cases whose store operations may fail (after retries)
    /// before the whole run is declared FAILED
    pub max_store_failure_fraction: f64,

    pub retry: RetryPolicy,
    pub policy: AnalysisPolicy,
    pub aggregation: AggregationConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            repetitions: 5,
            concurrency: 0,
            case_timeout_secs: 300,
            max_store_failure_fraction: 0.5,
            retry: RetryPolicy::default(),
            policy: AnalysisPolicy::default(),
            aggregation: AggregationConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn case_timeout(&self) -> Duration {
        Duration::from_secs(self.case_timeout_secs)
    }

    /// Worker pool size after resolving the 0 = auto sentinel
    pub fn effective_concurrency(&self) -> usize {
        if self.concurrency > 0 {
            self.concurrency
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.repetitions == 0 {
            return Err("repetitions must be >= 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.max_store_failure_fraction) {
            return Err(format!(
                "max_store_failure_fraction must be in [0, 1], got {}",
                self.max_store_failure_fraction
            ));
        }
        self.policy.validate()
    }
}

/// Process-wide registry of in-flight runs, keyed by commit ref
///
/// Created on trigger accept, removed on COMPLETE/FAILED. A superseding
/// trigger cancels its predecessor through `cancel`.
#[derive(Debug, Default)]
pub struct RunRegistry {
    active: Mutex<HashMap<String, CancelToken>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn begin(&self, commit_ref: &str) -> Result<CancelToken, RunError> {
        let mut active = self.active.lock().expect("run registry lock");
        if active.contains_key(commit_ref) {
            return Err(RunError::AlreadyActive(commit_ref.to_string()));
        }
        let token = CancelToken::new();
        active.insert(commit_ref.to_string(), token.clone());
        Ok(token)
    }

    fn finish(&self, commit_ref: &str) {
        self.active
            .lock()
            .expect("run registry lock")
            .remove(commit_ref);
    }

    /// Cancel the in-flight run for a commit ref, if any
    pub fn cancel(&self, commit_ref: &str) -> bool {
        match self.active.lock().expect("run registry lock").get(commit_ref) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Commit refs with runs currently in flight
    pub fn active_runs(&self) -> Vec<String> {
        self.active
            .lock()
            .expect("run registry lock")
            .keys()
            .cloned()
            .collect()
    }
}

/// Per-family runner dispatch
///
/// The orchestrator holds a mapping from case id to runner implementation;
/// cases without an override use the default runner.
pub struct RunnerMap {
    default: Arc<dyn MeasurementRunner>,
    by_case: HashMap<String, Arc<dyn MeasurementRunner>>,
}

impl RunnerMap {
    pub fn with_default(default: Arc<dyn MeasurementRunner>) -> Self {
        Self {
            default,
            by_case: HashMap::new(),
        }
    }

    pub fn register(&mut self, case_id: &str, runner: Arc<dyn MeasurementRunner>) {
        self.by_case.insert(case_id.to_string(), runner);
    }

    fn runner_for(&self, case_id: &str) -> &Arc<dyn MeasurementRunner> {
        self.by_case.get(case_id).unwrap_or(&self.default)
    }
}

/// What one case produced during the RUNNING phase
enum CaseOutcome {
    Samples(Vec<RawSample>),
    Failed(ExecutionError),
}

/// Drives one run from trigger to report
pub struct RunOrchestrator {
    config: OrchestratorConfig,
    cases: CaseSet,
    runners: RunnerMap,
    resolver: Box<dyn ArtifactResolver>,
    store: Arc<dyn HistoryStore>,
    registry: Arc<RunRegistry>,
    state: Mutex<RunState>,
}

impl RunOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        cases: CaseSet,
        runners: RunnerMap,
        resolver: Box<dyn ArtifactResolver>,
        store: Arc<dyn HistoryStore>,
        registry: Arc<RunRegistry>,
    ) -> Result<Self, RunError> {
        config.validate().map_err(RunError::InvalidConfig)?;
        Ok(Self {
            config,
            cases,
            runners,
            resolver,
            store,
            registry,
            state: Mutex::new(RunState::Pending),
        })
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().expect("run state lock")
    }

    fn transition(&self, next: RunState) {
        let mut state = self.state.lock().expect("run state lock");
        tracing::info!(from = ?*state, to = ?next, "run state transition");
        *state = next;
    }

    /// Execute one run for the trigger
    ///
    /// Always produces a `RunReport` unless the run fails at the
    /// infrastructure level or is cancelled; callers turn a `RunError` into
    /// a minimal failure status via `RunError::into_failure`.
    pub fn execute(&self, trigger: &Trigger) -> Result<RunReport, RunError> {
        let cancel = self.registry.begin(&trigger.commit_ref)?;
        let result = self.execute_inner(trigger, &cancel);
        self.registry.finish(&trigger.commit_ref);

        if let Err(e) = &result {
            self.transition(RunState::Failed);
            tracing::error!(commit_ref = %trigger.commit_ref, error = %e, "run failed");
        }
        result
    }

    fn execute_inner(
        &self,
        trigger: &Trigger,
        cancel: &CancelToken,
    ) -> Result<RunReport, RunError> {
        let started_at = Utc::now();

        // PENDING: the commit must resolve to a runnable artifact before any
        // case is dispatched
        let artifact = self.resolver.resolve(&trigger.commit_ref)?;

        let selected = self.cases.select(trigger.requested_cases.as_ref());
        if let Some(requested) = &trigger.requested_cases {
            if selected.len() < requested.len() {
                tracing::warn!(
                    requested = requested.len(),
                    matched = selected.len(),
                    "some requested case ids are not registered"
                );
            }
        }
        if selected.is_empty() {
            return Err(RunError::NoCasesSelected);
        }

        let repetitions = trigger.repetitions.unwrap_or(self.config.repetitions).max(1);

        self.transition(RunState::Running);
        let outcomes = self.run_cases(&selected, &artifact, repetitions, cancel);
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled(trigger.commit_ref.clone()));
        }

        self.transition(RunState::Aggregating);
        let (aggregated, mut verdicts) = self.aggregate_outcomes(&trigger.commit_ref, outcomes);

        self.transition(RunState::Analyzing);
        let analyzed = self.analyze_and_persist(aggregated, selected.len(), cancel)?;
        verdicts.extend(analyzed);

        self.transition(RunState::Complete);
        Ok(RunReport::new(&trigger.commit_ref, started_at, verdicts))
    }

    /// RUNNING: dispatch cases onto the bounded worker pool
    ///
    /// Workers pull from a shared channel; a slow case occupies one slot
    /// while its siblings proceed, and its own deadline reaps it.
    fn run_cases(
        &self,
        cases: &[BenchmarkCase],
        artifact: &BuildArtifact,
        repetitions: u32,
        cancel: &CancelToken,
    ) -> Vec<(String, CaseOutcome)> {
        let limit = self.config.effective_concurrency().max(1).min(cases.len().max(1));
        let timeout = self.config.case_timeout();

        let (job_tx, job_rx) = channel::unbounded::<BenchmarkCase>();
        let (out_tx, out_rx) = channel::unbounded::<(String, CaseOutcome)>();

        for case in cases {
            if job_tx.send(case.clone()).is_err() {
                break;
            }
        }
        drop(job_tx);

        std::thread::scope(|scope| {
            for worker in 0..limit {
                let job_rx = job_rx.clone();
                let out_tx = out_tx.clone();
                let cancel = cancel.clone();
                scope.spawn(move || {
                    while let Ok(case) = job_rx.recv() {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let runner = self.runners.runner_for(&case.id);
                        let ctx = RunContext::new(cancel.clone(), timeout);
                        tracing::info!(case_id = %case.id, worker, "dispatching case");

                        let outcome = match runner.run(&case, artifact, repetitions, &ctx) {
                            Ok(samples) => CaseOutcome::Samples(samples),
                            Err(e) => {
                                tracing::warn!(case_id = %case.id, error = %e, "case execution failed");
                                CaseOutcome::Failed(e)
                            }
                        };
                        if out_tx.send((case.id.clone(), outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(out_tx);

        out_rx.into_iter().collect()
    }

    /// AGGREGATING: reduce samples per case; execution failures and empty
    /// sample sets become Inconclusive verdicts here
    fn aggregate_outcomes(
        &self,
        commit_ref: &str,
        outcomes: Vec<(String, CaseOutcome)>,
    ) -> (Vec<AggregatedResult>, Vec<Verdict>) {
        let aggregator = SampleAggregator::new(self.config.aggregation.clone());
        let mut aggregated = Vec::new();
        let mut verdicts = Vec::new();

        for (case_id, outcome) in outcomes {
            match outcome {
                CaseOutcome::Failed(e) => {
                    tracing::warn!(case_id = %case_id, reason = %e.reason, "recording inconclusive verdict");
                    verdicts.push(Verdict::inconclusive(&case_id, "*"));
                }
                CaseOutcome::Samples(samples) => {
                    match aggregator.aggregate_case(&case_id, commit_ref, &samples) {
                        Ok(results) => aggregated.extend(results),
                        Err(e) => {
                            tracing::warn!(case_id = %case_id, error = %e, "aggregation produced no result");
                            verdicts.push(Verdict::inconclusive(&case_id, "*"));
                        }
                    }
                }
            }
        }
        (aggregated, verdicts)
    }

    /// ANALYZING: classify against the baseline window, then append every
    /// valid measurement to history
    ///
    /// Execution/aggregation failures never reach this point, so history
    /// only ever accumulates real measurements. Store retry exhaustion
    /// escalates the affected case to Inconclusive; the run itself fails
    /// only past the configured failure fraction.
    fn analyze_and_persist(
        &self,
        aggregated: Vec<AggregatedResult>,
        total_cases: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<Verdict>, RunError> {
        let mut verdicts = Vec::new();
        let mut degraded_cases: HashSet<String> = HashSet::new();

        for result in aggregated {
            if cancel.is_cancelled() {
                return Err(RunError::Cancelled(result.commit_ref));
            }

            let window = with_retry(&self.config.retry, "window", || {
                self.store.window(
                    &result.case_id,
                    &result.metric,
                    result.timestamp,
                    self.config.policy.baseline_window,
                )
            });

            let mut verdict = match window {
                Ok(mut records) => {
                    // A re-run of the same commit must not see its own
                    // previous record in the baseline
                    records.retain(|r| r.commit_ref != result.commit_ref);
                    classify(&result, &records, &self.config.policy)
                }
                Err(e) => {
                    tracing::error!(case_id = %result.case_id, error = %e, "baseline window unavailable");
                    degraded_cases.insert(result.case_id.clone());
                    Verdict::inconclusive(&result.case_id, &result.metric)
                }
            };

            let appended = with_retry(&self.config.retry, "append", || {
                self.store.append(result.to_record())
            });
            if let Err(e) = appended {
                tracing::error!(case_id = %result.case_id, error = %e, "history append exhausted retries");
                degraded_cases.insert(result.case_id.clone());
                verdict = Verdict::inconclusive(&result.case_id, &result.metric);
            }

            verdicts.push(verdict);
        }

        let failed = degraded_cases.len();
        if failed > 0 {
            let fraction = failed as f64 / total_cases.max(1) as f64;
            if fraction > self.config.max_store_failure_fraction {
                return Err(RunError::StoreDegraded {
                    failed,
                    total: total_cases,
                });
            }
        }

        Ok(verdicts)
    }
}
