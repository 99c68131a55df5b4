// Local worker backend: one interpreter process per submission
//
// The child gets a cleared environment and runs in isolated mode. The
// harness lowers RLIMIT_AS inside the child before user code starts; the
// deadline is enforced here by killing the child.

use super::harness::{stderr_capacity, HARNESS_SOURCE, INTERPRETER_FLAGS, PAYLOAD_ENV};
use super::{drain_capped, IsolationBackend, WorkerExit, WorkerRequest, WorkerRun};
use crate::error::{EngineError, Result};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ProcessBackend {
    interpreter: String,
}

impl ProcessBackend {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }
}

impl IsolationBackend for ProcessBackend {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn run(&self, request: &WorkerRequest) -> Result<WorkerRun> {
        let mut command = Command::new(&self.interpreter);
        command
            .args(INTERPRETER_FLAGS)
            .arg(HARNESS_SOURCE)
            .env_clear()
            .env(PAYLOAD_ENV, &request.encoded_payload)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Interpreter lookup only
        if let Some(path) = std::env::var_os("PATH") {
            command.env("PATH", path);
        }

        let mut child = command.spawn().map_err(|source| EngineError::Spawn {
            program: self.interpreter.clone(),
            source,
        })?;
        debug!(pid = ?child.id(), interpreter = %self.interpreter, "Worker spawned");

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Protocol("worker stdout not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Protocol("worker stderr not captured".to_string()))?;

        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        let stderr_cap = stderr_capacity(request.max_output_bytes);

        let execution = async {
            let (stdout_result, stderr_result, status) = tokio::join!(
                drain_capped(&mut stdout, &mut stdout_buf, request.max_output_bytes),
                drain_capped(&mut stderr, &mut stderr_buf, stderr_cap),
                child.wait(),
            );
            Ok::<_, std::io::Error>((stdout_result?, stderr_result?, status?))
        };

        let timeout_result = tokio::time::timeout(request.timeout, execution).await;

        let (stdout_truncated, exit) = match timeout_result {
            Ok(Ok((stdout_truncated, _, status))) => {
                let code = status.code().map(i64::from);
                (stdout_truncated, WorkerExit::Finished { code })
            }
            Ok(Err(e)) => return Err(EngineError::Io(e)),
            Err(_) => {
                warn!(
                    timeout_ms = request.timeout.as_millis() as u64,
                    "Worker exceeded deadline - killing"
                );
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed-out worker");
                }
                (stdout_buf.len() >= request.max_output_bytes, WorkerExit::TimedOut)
            }
        };

        Ok(WorkerRun {
            stdout: stdout_buf,
            stderr: stderr_buf,
            stdout_truncated,
            exit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Limits, DEFAULT_BUILTINS};
    use crate::sandbox::SandboxExecutor;
    use quest_common::types::{Bindings, Termination};

    fn executor(limits: Limits) -> SandboxExecutor<ProcessBackend> {
        SandboxExecutor::new(
            ProcessBackend::new("python3"),
            DEFAULT_BUILTINS.iter().map(|b| b.to_string()).collect(),
            limits,
        )
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_engine_error() {
        let executor = SandboxExecutor::new(
            ProcessBackend::new("/nonexistent/python-for-quest-tests"),
            vec!["print".to_string()],
            Limits::default(),
        );

        let result = executor.execute("print(1)", Bindings::new()).await;
        assert!(matches!(result, Err(EngineError::Spawn { .. })));
    }

    #[tokio::test]
    #[ignore] // Requires python3 on PATH
    async fn test_prints_are_captured() {
        let outcome = executor(Limits::default())
            .execute("name = 'Ada'\nprint('Name:', name)\nprint(len(name))", Bindings::new())
            .await
            .unwrap();

        assert_eq!(outcome.error, None);
        assert_eq!(outcome.captured_output, "Name: Ada\n3\n");
        assert_eq!(outcome.bindings["name"], "Ada");
        assert!(outcome.elapsed_seconds > 0.0);
    }

    #[tokio::test]
    #[ignore] // Requires python3 on PATH
    async fn test_bindings_round_trip() {
        let mut bindings = Bindings::new();
        bindings.insert("seed".to_string(), serde_json::json!(41));

        let outcome = executor(Limits::default())
            .execute("answer = seed + 1", bindings)
            .await
            .unwrap();

        assert_eq!(outcome.bindings["answer"], 42);
        assert_eq!(outcome.bindings["seed"], 41);
    }

    #[tokio::test]
    #[ignore] // Requires python3 on PATH
    async fn test_imports_are_unavailable() {
        let outcome = executor(Limits::default())
            .execute("import math", Bindings::new())
            .await
            .unwrap();

        assert_eq!(outcome.error.as_deref(), Some("__import__ not found"));
    }

    #[tokio::test]
    #[ignore] // Requires python3 on PATH
    async fn test_runtime_error_captured() {
        let outcome = executor(Limits::default())
            .execute("print('before')\nx = 1 / 0", Bindings::new())
            .await
            .unwrap();

        assert_eq!(outcome.error.as_deref(), Some("division by zero"));
        assert_eq!(outcome.captured_output, "before\n");
        assert_eq!(outcome.termination, None);
    }

    #[tokio::test]
    #[ignore] // Requires python3 on PATH
    async fn test_runaway_loop_is_killed() {
        let limits = Limits {
            timeout_ms: 500,
            ..Limits::default()
        };
        let outcome = executor(limits)
            .execute("print('started')\nwhile True:\n    pass", Bindings::new())
            .await
            .unwrap();

        assert_eq!(outcome.termination, Some(Termination::Timeout));
        assert_eq!(outcome.captured_output, "started\n");
        assert!(outcome.elapsed_seconds < 5.0);
    }

    #[tokio::test]
    #[ignore] // Requires python3 on PATH
    async fn test_many_bindings_keep_trailer_whole() {
        let limits = Limits {
            max_output_bytes: 4096,
            ..Limits::default()
        };
        let source: String = (0..3000).map(|i| format!("value_{} = {}\n", i, i)).collect();

        let outcome = executor(limits).execute(&source, Bindings::new()).await.unwrap();

        assert_eq!(outcome.error, None);
        assert!(!outcome.bindings.is_empty());
        assert!(serde_json::to_string(&outcome.bindings).unwrap().len() <= 4096);
    }

    #[tokio::test]
    #[ignore] // Requires python3 on PATH (Linux rlimits)
    async fn test_memory_ceiling_enforced() {
        let limits = Limits {
            memory_limit_mb: 64,
            ..Limits::default()
        };
        let outcome = executor(limits)
            .execute("blob = [0] * (10 ** 9)", Bindings::new())
            .await
            .unwrap();

        assert_eq!(outcome.termination, Some(Termination::MemoryLimit));
    }
}
