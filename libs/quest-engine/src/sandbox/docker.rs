// Docker worker backend: one throwaway container per submission
//
// **Container rules:**
// 1. Pulls the interpreter image if not present
// 2. Network disabled, read-only root filesystem, all capabilities dropped
// 3. Memory (without swap), CPU and pid limits from the engine limits
// 4. Hard deadline: container is killed, output read so far is kept
// 5. Container removed before returning; a drop guard covers early exits

use super::harness::{stderr_capacity, HARNESS_SOURCE, INTERPRETER_FLAGS, PAYLOAD_ENV};
use super::{IsolationBackend, WorkerExit, WorkerRequest, WorkerRun};
use crate::error::Result;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use tracing::{debug, info, warn};

const PIDS_LIMIT: i64 = 64;

/// Container cleanup guard
///
/// `remove` is awaited on the normal path. Drop only covers early returns
/// and cancellation, and spawns the removal on the runtime.
struct ContainerGuard {
    docker: Docker,
    container_id: String,
    removed: bool,
}

impl ContainerGuard {
    fn new(docker: Docker, container_id: String) -> Self {
        Self {
            docker,
            container_id,
            removed: false,
        }
    }

    async fn remove(mut self) {
        match remove_container(&self.docker, &self.container_id).await {
            Ok(()) => self.removed = true,
            Err(e) => {
                warn!(container_id = %self.container_id, error = %e, "Failed to remove worker container");
            }
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if self.removed {
            return;
        }

        let container_id = self.container_id.clone();
        let docker = self.docker.clone();

        tokio::spawn(async move {
            if let Err(e) = remove_container(&docker, &container_id).await {
                warn!(container_id = %container_id, error = %e, "Failed to remove worker container");
            }
        });
    }
}

async fn remove_container(docker: &Docker, container_id: &str) -> std::result::Result<(), bollard::errors::Error> {
    let remove_options = RemoveContainerOptions {
        force: true,
        ..Default::default()
    };
    docker.remove_container(container_id, Some(remove_options)).await
}

pub struct DockerBackend {
    docker: Docker,
    image: String,
}

impl DockerBackend {
    pub fn connect(image: impl Into<String>) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self {
            docker,
            image: image.into(),
        })
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Ensure the interpreter image is available (pull if needed)
    async fn ensure_image(&self) -> Result<()> {
        if self.docker.inspect_image(&self.image).await.is_ok() {
            debug!(image = %self.image, "Image cache hit");
            return Ok(());
        }

        warn!(image = %self.image, "Image cache miss - pulling");

        let options = Some(CreateImageOptions {
            from_image: self.image.as_str(),
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result?;
        }

        info!(image = %self.image, "Image pulled");
        Ok(())
    }

    fn container_config(&self, request: &WorkerRequest) -> Config<String> {
        let mut cmd = vec!["python3".to_string()];
        cmd.extend(INTERPRETER_FLAGS.iter().map(|flag| flag.to_string()));
        cmd.push(HARNESS_SOURCE.to_string());

        let memory = i64::try_from(request.memory_limit_bytes).unwrap_or(i64::MAX);

        Config {
            image: Some(self.image.clone()),
            cmd: Some(cmd),
            entrypoint: Some(vec![]),
            env: Some(vec![format!("{}={}", PAYLOAD_ENV, request.encoded_payload)]),
            user: Some("65534:65534".to_string()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(true),
            host_config: Some(bollard::models::HostConfig {
                memory: Some(memory),
                memory_swap: Some(memory),
                nano_cpus: Some((f64::from(request.cpu_limit) * 1_000_000_000.0) as i64),
                pids_limit: Some(PIDS_LIMIT),
                readonly_rootfs: Some(true),
                cap_drop: Some(vec!["ALL".to_string()]),
                security_opt: Some(vec!["no-new-privileges".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

impl IsolationBackend for DockerBackend {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn run(&self, request: &WorkerRequest) -> Result<WorkerRun> {
        let container_name = format!("quest-{}", uuid::Uuid::new_v4());
        self.run_named(request, &container_name).await
    }
}

impl DockerBackend {
    async fn run_named(&self, request: &WorkerRequest, container_name: &str) -> Result<WorkerRun> {
        self.ensure_image().await?;

        let create_options = CreateContainerOptions {
            name: container_name,
            platform: None,
        };

        let container = self
            .docker
            .create_container(Some(create_options), self.container_config(request))
            .await?;
        let container_id = container.id.clone();

        // Set up the guard before anything else can fail
        let guard = ContainerGuard::new(self.docker.clone(), container_id.clone());

        self.docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await?;
        debug!(container = %container_name, "Worker container started");

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut stdout_truncated = false;
        let stderr_cap = stderr_capacity(request.max_output_bytes);

        let execution = async {
            let logs_options = Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                follow: true,
                ..Default::default()
            });

            let mut logs_stream = self.docker.logs(&container_id, logs_options);
            while let Some(output) = logs_stream.next().await {
                match output {
                    Ok(LogOutput::StdOut { message }) => {
                        let room = request.max_output_bytes.saturating_sub(stdout.len());
                        if message.len() > room {
                            stdout_truncated = true;
                        }
                        stdout.extend_from_slice(&message[..message.len().min(room)]);
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        let room = stderr_cap.saturating_sub(stderr.len());
                        stderr.extend_from_slice(&message[..message.len().min(room)]);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Error reading worker container logs");
                        break;
                    }
                }
            }

            let wait_options = WaitContainerOptions {
                condition: "not-running",
            };
            let mut wait_stream = self.docker.wait_container(&container_id, Some(wait_options));
            match wait_stream.next().await {
                Some(Ok(response)) => Some(response.status_code),
                // Non-zero exits surface as an error carrying the code
                Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Some(code),
                Some(Err(e)) => {
                    warn!(error = %e, "Failed to get worker container exit code");
                    None
                }
                None => None,
            }
        };

        let timeout_result = tokio::time::timeout(request.timeout, execution).await;

        let exit = match timeout_result {
            Ok(code) => WorkerExit::Finished { code },
            Err(_) => {
                warn!(
                    container = %container_name,
                    timeout_ms = request.timeout.as_millis() as u64,
                    "Worker container exceeded deadline - killing"
                );
                if let Err(e) = self
                    .docker
                    .kill_container(&container_id, None::<KillContainerOptions<String>>)
                    .await
                {
                    warn!(error = %e, "Failed to kill timed-out worker container");
                }
                WorkerExit::TimedOut
            }
        };

        guard.remove().await;

        Ok(WorkerRun {
            stdout,
            stderr,
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
    use std::time::Duration;

    fn request() -> WorkerRequest {
        WorkerRequest {
            encoded_payload: "e30=".to_string(),
            timeout: Duration::from_secs(1),
            memory_limit_bytes: 64 * 1024 * 1024,
            cpu_limit: 0.5,
            max_output_bytes: 1024,
        }
    }

    #[tokio::test]
    async fn test_container_is_locked_down() {
        let backend = match DockerBackend::connect("python:3.12-slim") {
            Ok(backend) => backend,
            // No Docker socket configuration available
            Err(_) => return,
        };

        let config = backend.container_config(&request());
        let host = config.host_config.unwrap();

        assert_eq!(config.network_disabled, Some(true));
        assert_eq!(host.readonly_rootfs, Some(true));
        assert_eq!(host.memory, Some(64 * 1024 * 1024));
        assert_eq!(host.memory_swap, host.memory);
        assert_eq!(host.nano_cpus, Some(500_000_000));
        assert_eq!(config.env.unwrap()[0], "QUEST_PAYLOAD=e30=");
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_docker_runaway_loop_is_killed() {
        let backend = DockerBackend::connect("python:3.12-slim").unwrap();
        let limits = Limits {
            timeout_ms: 2000,
            ..Limits::default()
        };
        let executor = SandboxExecutor::new(
            backend,
            DEFAULT_BUILTINS.iter().map(|b| b.to_string()).collect(),
            limits,
        );

        let outcome = executor
            .execute("print('started')\nwhile True:\n    pass", Bindings::new())
            .await
            .unwrap();

        assert_eq!(outcome.termination, Some(Termination::Timeout));
        assert_eq!(outcome.captured_output, "started\n");
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_container_removed_before_run_returns() {
        let backend = DockerBackend::connect("python:3.12-slim").unwrap();
        let name = format!("quest-test-{}", uuid::Uuid::new_v4());

        let run = backend.run_named(&request(), &name).await.unwrap();

        assert!(matches!(run.exit, WorkerExit::Finished { .. }));
        assert!(backend.docker.inspect_container(&name, None).await.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_docker_prints_are_captured() {
        let backend = DockerBackend::connect("python:3.12-slim").unwrap();
        let executor = SandboxExecutor::new(
            backend,
            DEFAULT_BUILTINS.iter().map(|b| b.to_string()).collect(),
            Limits::default(),
        );

        let outcome = executor.execute("print(sum(range(5)))", Bindings::new()).await.unwrap();

        assert_eq!(outcome.error, None);
        assert_eq!(outcome.captured_output, "10\n");
    }
}
