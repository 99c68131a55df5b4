use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level names carried into and out of a sandboxed run.
pub type Bindings = serde_json::Map<String, serde_json::Value>;

/// A learner's submission for one exercise
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedCode {
    pub source: String,
    pub exercise_id: String,
}

impl SubmittedCode {
    pub fn new(source: impl Into<String>, exercise_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            exercise_id: exercise_id.into(),
        }
    }
}

/// Result of the textual pre-check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub safe: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violation: Option<String>,
}

impl SafetyVerdict {
    pub fn safe() -> Self {
        Self {
            safe: true,
            violation: None,
        }
    }

    pub fn unsafe_because(violation: impl Into<String>) -> Self {
        Self {
            safe: false,
            violation: Some(violation.into()),
        }
    }
}

/// Why a sandboxed run was torn down before it finished on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Timeout,
    MemoryLimit,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Timeout => write!(f, "timeout"),
            Termination::MemoryLimit => write!(f, "memory_limit"),
        }
    }
}

/// Raw runtime behaviour of one sandboxed run
///
/// `error` is present iff the code raised or the worker was terminated.
/// On termination `captured_output` holds whatever was written before the
/// worker was killed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub captured_output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination: Option<Termination>,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub bindings: Bindings,
}

impl ExecutionOutcome {
    pub fn completed(captured_output: String, elapsed_seconds: f64) -> Self {
        Self {
            captured_output,
            error: None,
            elapsed_seconds: elapsed_seconds.max(0.0),
            termination: None,
            stderr: String::new(),
            bindings: Bindings::new(),
        }
    }

    pub fn failed(captured_output: String, error: impl Into<String>, elapsed_seconds: f64) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::completed(captured_output, elapsed_seconds)
        }
    }

    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

/// One weighted structural assertion about the submitted code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCheck {
    pub description: String,
    pub passed: bool,
    pub points: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TestCheck {
    pub fn new(description: impl Into<String>, passed: bool, points: u32) -> Self {
        Self {
            description: description.into(),
            passed,
            points,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Failure taxonomy surfaced on a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SafetyViolation,
    SyntaxFailure,
    RuntimeFailure,
    Timeout,
    MemoryLimit,
    InternalFailure,
}

impl From<Termination> for FailureKind {
    fn from(termination: Termination) -> Self {
        match termination {
            Termination::Timeout => FailureKind::Timeout,
            Termination::MemoryLimit => FailureKind::MemoryLimit,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::SafetyViolation => "safety_violation",
            FailureKind::SyntaxFailure => "syntax_failure",
            FailureKind::RuntimeFailure => "runtime_failure",
            FailureKind::Timeout => "timeout",
            FailureKind::MemoryLimit => "memory_limit",
            FailureKind::InternalFailure => "internal_failure",
        };
        write!(f, "{}", name)
    }
}

/// Complete outcome for one submission, returned to the request layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub success: bool,
    pub output: String,
    pub execution_time: f64,
    pub test_results: Vec<TestCheck>,
    #[serde(default)]
    pub score: u32,
    #[serde(default)]
    pub max_score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
}

impl ExecutionReport {
    /// Report for a pipeline that never got to run the code
    pub fn rejected(output: impl Into<String>, failure_kind: FailureKind) -> Self {
        Self {
            success: false,
            output: output.into(),
            execution_time: 0.0,
            test_results: Vec::new(),
            score: 0,
            max_score: 0,
            failure_kind: Some(failure_kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serializes_wire_shape() {
        let report = ExecutionReport {
            success: true,
            output: "hi\n".to_string(),
            execution_time: 0.25,
            test_results: vec![TestCheck::new("Code syntax check", true, 50)],
            score: 50,
            max_score: 50,
            failure_kind: None,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["execution_time"], 0.25);
        assert_eq!(json["test_results"][0]["points"], 50);
        assert!(json["test_results"][0].get("message").is_none());
        assert!(json.get("failure_kind").is_none());
    }

    #[test]
    fn test_failure_kind_snake_case() {
        let json = serde_json::to_string(&FailureKind::MemoryLimit).unwrap();
        assert_eq!(json, "\"memory_limit\"");
        assert_eq!(FailureKind::from(Termination::Timeout), FailureKind::Timeout);
    }

    #[test]
    fn test_rejected_report_has_no_checks() {
        let report = ExecutionReport::rejected("nope", FailureKind::SafetyViolation);
        assert!(!report.success);
        assert_eq!(report.execution_time, 0.0);
        assert!(report.test_results.is_empty());
    }

    #[test]
    fn test_outcome_elapsed_never_negative() {
        let outcome = ExecutionOutcome::completed(String::new(), -1.0);
        assert_eq!(outcome.elapsed_seconds, 0.0);
        assert!(outcome.is_clean());
    }
}
