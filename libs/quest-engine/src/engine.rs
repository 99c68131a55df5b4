use crate::aggregator;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::gate::SafetyGate;
use crate::grader::{exercises, StructuralGrader};
use crate::sandbox::{IsolationBackend, SandboxExecutor};
use futures_util::FutureExt;
use quest_common::types::{Bindings, ExecutionReport, SafetyVerdict, SubmittedCode, TestCheck};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Submission pipeline: gate -> sandbox -> grader -> aggregator
///
/// Holds only read-only state, so one engine serves concurrent callers
/// behind an `Arc` without coordination.
pub struct QuestEngine<B> {
    config: Arc<EngineConfig>,
    gate: SafetyGate,
    executor: SandboxExecutor<B>,
    grader: StructuralGrader,
}

impl<B: IsolationBackend> QuestEngine<B> {
    /// Build every component from configuration and validate the registry
    pub fn new(config: EngineConfig, backend: B) -> Result<Self> {
        let gate = SafetyGate::new(&config.forbidden_patterns)?;

        let registry =
            exercises::configured_registry(&config.exercises, &config.required_exercises)?;

        let executor = SandboxExecutor::from_config(backend, &config);

        info!(
            backend = executor.backend().name(),
            patterns = gate.pattern_count(),
            exercises = registry.exercise_ids().len(),
            timeout_ms = config.limits.timeout_ms,
            memory_limit_mb = config.limits.memory_limit_mb,
            "Quest engine ready"
        );

        Ok(Self {
            config: Arc::new(config),
            gate,
            executor,
            grader: StructuralGrader::new(registry),
        })
    }

    pub fn config(&self) -> &Arc<EngineConfig> {
        &self.config
    }

    pub fn grader(&self) -> &StructuralGrader {
        &self.grader
    }

    pub fn check_safety(&self, source: &str) -> SafetyVerdict {
        self.gate.check(source)
    }

    pub fn grade(&self, source: &str, exercise_id: &str) -> Result<Vec<TestCheck>> {
        self.grader.grade(source, exercise_id)
    }

    /// Run one submission end to end
    ///
    /// Never fails: engine faults and panics become an internal-failure
    /// report.
    #[tracing::instrument(
        skip(self, code),
        fields(submission_id = %Uuid::new_v4(), exercise_id = %code.exercise_id)
    )]
    pub async fn run(&self, code: &SubmittedCode) -> ExecutionReport {
        let start_time = Instant::now();

        let result = AssertUnwindSafe(self.pipeline(code)).catch_unwind().await;

        let report = match result {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                error!(error = %e, "Submission pipeline failed");
                aggregator::internal_failure(e)
            }
            Err(panic) => {
                let detail = panic_detail(panic.as_ref());
                error!(panic = %detail, "Submission pipeline panicked");
                aggregator::internal_failure(detail)
            }
        };

        info!(
            success = report.success,
            score = report.score,
            max_score = report.max_score,
            failure_kind = ?report.failure_kind,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Submission processed"
        );

        report
    }

    async fn pipeline(&self, code: &SubmittedCode) -> Result<ExecutionReport> {
        let verdict = self.gate.check(&code.source);
        if !verdict.safe {
            warn!(
                violation = verdict.violation.as_deref().unwrap_or_default(),
                "Submission rejected by safety gate"
            );
            return Ok(aggregator::reject(&verdict));
        }

        let outcome = self.executor.execute(&code.source, Bindings::new()).await?;
        let checks = self.grader.grade(&code.source, &code.exercise_id)?;

        Ok(aggregator::aggregate(&verdict, outcome, checks))
    }
}

fn panic_detail(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
