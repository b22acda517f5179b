//! Benchmark execution against a build artifact
//!
//! `MeasurementRunner` is the capability boundary between the orchestrator
//! and benchmark families: one implementation per family, mapped by case id.
//! The reference `ProcessRunner` spawns the compiler-under-test once per
//! repetition and extracts measurement messages from its stdout stream, one
//! JSON object per line. Execution failures are contained per case; the
//! orchestrator records them as Inconclusive verdicts and keeps going.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

use crate::case::BenchmarkCase;
use crate::record::RawSample;
use crate::resolver::BuildArtifact;

/// Per-case execution failure
///
/// Recovered at the case boundary: one failing case never prevents other
/// cases' results from being recorded.
#[derive(Debug, Clone, Error)]
#[error("case `{case_id}` failed to execute: {reason}")]
pub struct ExecutionError {
    pub case_id: String,
    pub reason: String,
}

impl ExecutionError {
    pub fn new(case_id: &str, reason: impl Into<String>) -> Self {
        Self {
            case_id: case_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Shared cancellation flag for a whole run
///
/// Cloned into every worker; cancelling trips all in-flight case executions,
/// which kill their child processes and bail.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Deadline and cancellation context handed to each case execution
#[derive(Debug, Clone)]
pub struct RunContext {
    pub cancel: CancelToken,
    pub deadline: Instant,
}

impl RunContext {
    pub fn new(cancel: CancelToken, timeout: Duration) -> Self {
        Self {
            cancel,
            deadline: Instant::now() + timeout,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Executes one benchmark case against a build artifact
///
/// `repetitions` >= 1; repeated invocations absorb measurement noise.
/// Implementations produce samples in memory only; nothing is persisted at
/// this layer.
pub trait MeasurementRunner: Send + Sync {
    fn run(
        &self,
        case: &BenchmarkCase,
        artifact: &BuildArtifact,
        repetitions: u32,
        ctx: &RunContext,
    ) -> Result<Vec<RawSample>, ExecutionError>;
}

/// One measurement message from the benchmark process stream
///
/// The compiler-under-test emits one JSON object per stdout line; lines that
/// are not measurement messages (diagnostics, progress) are skipped.
#[derive(Debug, Deserialize)]
struct MeasurementMessage {
    message: String,
    metric: String,
    value: f64,
    #[serde(default)]
    unit: String,
}

/// Reference runner: spawn the artifact as a child process per repetition
///
/// Invocation shape: `<artifact> <case.entry> [extra_args...]`. The child is
/// polled rather than waited on so the per-case deadline and run-level
/// cancellation can kill it mid-flight.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn invoke_once(
        &self,
        case: &BenchmarkCase,
        artifact: &BuildArtifact,
        ctx: &RunContext,
    ) -> Result<Vec<RawSample>, ExecutionError> {
        let mut child = Command::new(&artifact.path)
            .arg(&case.entry)
            .args(&case.extra_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExecutionError::new(&case.id, format!("failed to start: {e}")))?;

        let status = self.supervise(case, &mut child, ctx)?;

        let stdout = read_pipe(child.stdout.take());
        if !status.success() {
            let stderr = read_pipe(child.stderr.take());
            return Err(ExecutionError::new(
                &case.id,
                format!(
                    "exited with {status}: {}",
                    stderr.lines().last().unwrap_or("")
                ),
            ));
        }

        let samples = self.scan_messages(case, &stdout);
        if samples.is_empty() {
            return Err(ExecutionError::new(
                &case.id,
                "no measurement message in output",
            ));
        }
        Ok(samples)
    }

    /// Poll the child against the deadline and cancellation flag
    fn supervise(
        &self,
        case: &BenchmarkCase,
        child: &mut Child,
        ctx: &RunContext,
    ) -> Result<ExitStatus, ExecutionError> {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {
                    if ctx.cancel.is_cancelled() {
                        reap(child);
                        return Err(ExecutionError::new(&case.id, "cancelled"));
                    }
                    if ctx.expired() {
                        reap(child);
                        return Err(ExecutionError::new(&case.id, "timeout"));
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    reap(child);
                    return Err(ExecutionError::new(&case.id, format!("wait failed: {e}")));
                }
            }
        }
    }

    /// Scan the stdout stream for measurement messages
    fn scan_messages(&self, case: &BenchmarkCase, stdout: &str) -> Vec<RawSample> {
        let mut samples = Vec::new();
        for line in stdout.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<MeasurementMessage>(line) {
                Ok(msg) if msg.message == "measurement" => {
                    samples.push(RawSample {
                        case_id: case.id.clone(),
                        timestamp: Utc::now(),
                        metric: msg.metric,
                        value: msg.value,
                        unit: msg.unit,
                    });
                }
                // Non-measurement chatter is expected on the stream
                _ => continue,
            }
        }
        samples
    }

    /// Record the produced artifact's size when the case asks for it
    fn artifact_size_sample(&self, case: &BenchmarkCase, path: &Path) -> Option<RawSample> {
        match std::fs::metadata(path) {
            Ok(meta) => Some(RawSample {
                case_id: case.id.clone(),
                timestamp: Utc::now(),
                metric: "artifact_size".to_string(),
                value: meta.len() as f64,
                unit: "bytes".to_string(),
            }),
            Err(e) => {
                tracing::warn!(case_id = %case.id, path = %path.display(), error = %e,
                    "failed to stat produced artifact");
                None
            }
        }
    }
}

impl MeasurementRunner for ProcessRunner {
    fn run(
        &self,
        case: &BenchmarkCase,
        artifact: &BuildArtifact,
        repetitions: u32,
        ctx: &RunContext,
    ) -> Result<Vec<RawSample>, ExecutionError> {
        if repetitions == 0 {
            return Err(ExecutionError::new(&case.id, "repetitions must be >= 1"));
        }

        let mut samples = Vec::new();
        for repetition in 0..repetitions {
            if ctx.cancel.is_cancelled() {
                return Err(ExecutionError::new(&case.id, "cancelled"));
            }
            tracing::debug!(case_id = %case.id, repetition, "invoking benchmark case");
            samples.extend(self.invoke_once(case, artifact, ctx)?);

            if let Some(artifact_path) = &case.artifact {
                if let Some(sample) = self.artifact_size_sample(case, artifact_path) {
                    samples.push(sample);
                }
            }
        }
        Ok(samples)
    }
}

fn read_pipe(pipe: Option<impl Read>) -> String {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_string(&mut buf);
    }
    buf
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn case(id: &str) -> BenchmarkCase {
        BenchmarkCase {
            id: id.to_string(),
            suite: "compile".to_string(),
            description: String::new(),
            tags: Vec::new(),
            entry: PathBuf::from("cases/input.hash"),
            extra_args: Vec::new(),
            artifact: None,
        }
    }

    fn ctx() -> RunContext {
        RunContext::new(CancelToken::new(), Duration::from_secs(5))
    }

    #[test]
    fn test_scan_messages_extracts_measurements() {
        let runner = ProcessRunner::new();
        let stdout = concat!(
            "{\"message\":\"progress\",\"stage\":\"parse\"}\n",
            "{\"message\":\"measurement\",\"metric\":\"compile_time_ms\",\"value\":123.4,\"unit\":\"ms\"}\n",
            "not json at all\n",
            "{\"message\":\"measurement\",\"metric\":\"peak_rss_kb\",\"value\":4096,\"unit\":\"kb\"}\n",
        );

        let samples = runner.scan_messages(&case("parser_large"), stdout);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].metric, "compile_time_ms");
        assert_eq!(samples[0].value, 123.4);
        assert_eq!(samples[1].metric, "peak_rss_kb");
        assert_eq!(samples[1].case_id, "parser_large");
    }

    #[test]
    fn test_scan_messages_ignores_non_measurement_stream() {
        let runner = ProcessRunner::new();
        let stdout = "{\"message\":\"diagnostic\",\"metric\":\"x\",\"value\":1.0}\n";
        assert!(runner.scan_messages(&case("c"), stdout).is_empty());
    }

    #[test]
    fn test_zero_repetitions_rejected() {
        let runner = ProcessRunner::new();
        let artifact = BuildArtifact {
            commit_ref: "abc".to_string(),
            path: PathBuf::from("/bin/true"),
        };
        let err = runner
            .run(&case("parser_large"), &artifact, 0, &ctx())
            .unwrap_err();
        assert!(err.reason.contains("repetitions"));
    }

    #[test]
    fn test_missing_executable_is_execution_error() {
        let runner = ProcessRunner::new();
        let artifact = BuildArtifact {
            commit_ref: "abc".to_string(),
            path: PathBuf::from("/nonexistent/compiler"),
        };
        let err = runner
            .run(&case("parser_large"), &artifact, 1, &ctx())
            .unwrap_err();
        assert_eq!(err.case_id, "parser_large");
        assert!(err.reason.contains("failed to start"));
    }

    #[test]
    fn test_cancelled_before_start() {
        let runner = ProcessRunner::new();
        let artifact = BuildArtifact {
            commit_ref: "abc".to_string(),
            path: PathBuf::from("/bin/true"),
        };
        let cancel = CancelToken::new();
        cancel.cancel();
        let ctx = RunContext::new(cancel, Duration::from_secs(5));

        let err = runner
            .run(&case("parser_large"), &artifact, 1, &ctx)
            .unwrap_err();
        assert_eq!(err.reason, "cancelled");
    }

    #[test]
    fn test_cancel_token_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
