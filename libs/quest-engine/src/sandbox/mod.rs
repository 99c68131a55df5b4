/// Sandbox Executor - Restricted Execution Behind an Isolation Boundary
///
/// **Responsibility:**
/// Run gate-approved source against a namespace exposing only the builtin
/// whitelist, capture its output, and time it.
///
/// **Architecture:**
/// - The namespace is built by a trusted harness running in a separate
///   worker (local interpreter process or Docker container)
/// - The worker is resource-capped and can be torn down on deadline or
///   memory breach; partial output survives the teardown
/// - Backends only move bytes; classification of the run into an
///   `ExecutionOutcome` happens here, identically for every backend
///
/// Exceptions raised by submitted code become `ExecutionOutcome.error`.
/// `Err` is reserved for faults of the engine itself (worker could not
/// start, Docker unavailable).
pub mod docker;
pub mod harness;
pub mod process;

use crate::config::{BackendConfig, EngineConfig, Limits};
use crate::error::{EngineError, Result};
use harness::{split_trailer, WorkerPayload};
use quest_common::types::{Bindings, ExecutionOutcome, Termination};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

pub use docker::DockerBackend;
pub use process::ProcessBackend;

/// Docker reports a kernel OOM kill as 128 + SIGKILL
const OOM_EXIT_CODE: i64 = 137;

/// Everything a backend needs to start one worker
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub encoded_payload: String,
    pub timeout: Duration,
    pub memory_limit_bytes: u64,
    pub cpu_limit: f32,
    pub max_output_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Finished { code: Option<i64> },
    TimedOut,
}

/// Raw bytes and exit state of one worker
#[derive(Debug, Clone)]
pub struct WorkerRun {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: bool,
    pub exit: WorkerExit,
}

/// Seam between the executor and the thing hosting the worker
pub trait IsolationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, request: &WorkerRequest) -> impl Future<Output = Result<WorkerRun>> + Send;
}

/// Backend selected from configuration at startup
pub enum ConfiguredBackend {
    Process(ProcessBackend),
    Docker(DockerBackend),
}

impl ConfiguredBackend {
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        match config {
            BackendConfig::Process { interpreter } => {
                Ok(ConfiguredBackend::Process(ProcessBackend::new(interpreter.clone())))
            }
            BackendConfig::Docker { image } => {
                Ok(ConfiguredBackend::Docker(DockerBackend::connect(image.clone())?))
            }
        }
    }
}

impl IsolationBackend for ConfiguredBackend {
    fn name(&self) -> &'static str {
        match self {
            ConfiguredBackend::Process(backend) => backend.name(),
            ConfiguredBackend::Docker(backend) => backend.name(),
        }
    }

    async fn run(&self, request: &WorkerRequest) -> Result<WorkerRun> {
        match self {
            ConfiguredBackend::Process(backend) => backend.run(request).await,
            ConfiguredBackend::Docker(backend) => backend.run(request).await,
        }
    }
}

pub struct SandboxExecutor<B> {
    backend: B,
    builtins: Vec<String>,
    limits: Limits,
}

impl<B: IsolationBackend> SandboxExecutor<B> {
    pub fn new(backend: B, builtins: Vec<String>, limits: Limits) -> Self {
        Self {
            backend,
            builtins,
            limits,
        }
    }

    pub fn from_config(backend: B, config: &EngineConfig) -> Self {
        Self::new(backend, config.builtins.clone(), config.limits.clone())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Run `source` with `bindings` seeded into its namespace
    ///
    /// The returned outcome carries the namespace's JSON-representable
    /// top-level names back by value.
    pub async fn execute(&self, source: &str, bindings: Bindings) -> Result<ExecutionOutcome> {
        if source.len() > self.limits.max_source_bytes {
            let refused = EngineError::SourceTooLarge {
                limit: self.limits.max_source_bytes,
                actual: source.len(),
            };
            warn!(source_size = source.len(), "Refusing oversized source");
            return Ok(ExecutionOutcome::failed(String::new(), refused.to_string(), 0.0));
        }

        let payload = WorkerPayload {
            source,
            builtins: &self.builtins,
            bindings: &bindings,
            memory_limit_bytes: self.limits.memory_limit_bytes(),
            max_output_bytes: self.limits.max_output_bytes,
        };
        let encoded_payload = payload
            .encode()
            .map_err(|e| EngineError::Protocol(format!("failed to encode payload: {}", e)))?;

        let request = WorkerRequest {
            encoded_payload,
            timeout: Duration::from_millis(self.limits.timeout_ms),
            memory_limit_bytes: self.limits.memory_limit_bytes(),
            cpu_limit: self.limits.cpu_limit,
            max_output_bytes: self.limits.max_output_bytes,
        };

        let start_time = Instant::now();
        let run = self.backend.run(&request).await?;
        let elapsed_seconds = start_time.elapsed().as_secs_f64();

        debug!(
            backend = self.backend.name(),
            exit = ?run.exit,
            stdout_bytes = run.stdout.len(),
            elapsed_ms = (elapsed_seconds * 1000.0) as u64,
            "Worker finished"
        );

        Ok(classify(run, &self.limits, elapsed_seconds))
    }
}

/// Turn raw worker output into an outcome
pub fn classify(run: WorkerRun, limits: &Limits, elapsed_seconds: f64) -> ExecutionOutcome {
    let mut captured_output = String::from_utf8_lossy(&run.stdout).into_owned();
    if run.stdout_truncated {
        captured_output.push_str("\n[output truncated]");
    }
    let stderr_text = String::from_utf8_lossy(&run.stderr);
    let (report, noise) = split_trailer(&stderr_text);

    let mut outcome = ExecutionOutcome::completed(captured_output, elapsed_seconds);

    match (run.exit, report) {
        (WorkerExit::TimedOut, _) => {
            warn!(timeout_ms = limits.timeout_ms, "Worker timed out");
            outcome.termination = Some(Termination::Timeout);
            outcome.error = Some(format!("Execution timed out after {}ms", limits.timeout_ms));
            outcome.stderr = noise;
        }
        (WorkerExit::Finished { .. }, Some(report)) if report.memory_exceeded => {
            outcome.termination = Some(Termination::MemoryLimit);
            outcome.error = Some(memory_error(limits));
            outcome.stderr = report.stderr;
        }
        (WorkerExit::Finished { .. }, Some(report)) => {
            outcome.error = report.error;
            outcome.stderr = report.stderr;
            outcome.bindings = report.bindings;
        }
        (WorkerExit::Finished { code }, None) if code == Some(OOM_EXIT_CODE) => {
            outcome.termination = Some(Termination::MemoryLimit);
            outcome.error = Some(memory_error(limits));
            outcome.stderr = noise;
        }
        (WorkerExit::Finished { code }, None) => {
            let status = code
                .map(|c| format!("exit code {}", c))
                .unwrap_or_else(|| "killed by signal".to_string());
            let detail = noise.lines().last().unwrap_or("no result reported");
            outcome.error = Some(format!("Sandbox worker exited abnormally ({}): {}", status, detail));
            outcome.stderr = noise;
        }
    }

    outcome
}

fn memory_error(limits: &Limits) -> String {
    format!("Memory limit of {}MB exceeded", limits.memory_limit_mb)
}

/// Read a stream to its end, keeping at most `cap` bytes
///
/// Bytes land in `buf` as they arrive, so a caller that abandons this
/// future on deadline still owns everything read so far.
pub(crate) async fn drain_capped<R>(reader: &mut R, buf: &mut Vec<u8>, cap: usize) -> std::io::Result<bool>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 8192];
    let mut truncated = false;
    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            return Ok(truncated);
        }
        let room = cap.saturating_sub(buf.len());
        if read > room {
            truncated = true;
        }
        buf.extend_from_slice(&chunk[..read.min(room)]);
    }
}
