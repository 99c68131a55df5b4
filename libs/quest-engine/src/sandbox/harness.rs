// Host <-> worker protocol for the Python harness
//
// The harness builds the restricted namespace inside the worker, runs the
// submission against it and writes one trailer line to its real stderr:
// RESULT_SENTINEL followed by a JSON `HarnessReport`. Submitted code writes
// directly to the worker's stdout, so output printed before a kill survives.

use base64::{engine::general_purpose, Engine as _};
use quest_common::types::Bindings;
use serde::{Deserialize, Serialize};

pub const HARNESS_SOURCE: &str = include_str!("harness.py");

/// Env var the harness reads (and removes) its payload from
pub const PAYLOAD_ENV: &str = "QUEST_PAYLOAD";

pub const RESULT_SENTINEL: &str = "\u{1e}QUEST-RESULT ";

/// Interpreter flags: isolated mode, unbuffered streams
pub const INTERPRETER_FLAGS: &[&str] = &["-I", "-u", "-c"];

/// Truncated error text, JSON framing and interpreter noise
pub const TRAILER_SLACK_BYTES: usize = 64 * 1024;

/// Worker stderr the host keeps so a full trailer is never cut
///
/// The harness fits captured stderr and exported bindings into one output
/// budget each, so the trailer stays under two budgets plus slack.
pub fn stderr_capacity(max_output_bytes: usize) -> usize {
    max_output_bytes
        .saturating_mul(2)
        .saturating_add(TRAILER_SLACK_BYTES)
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerPayload<'a> {
    pub source: &'a str,
    pub builtins: &'a [String],
    pub bindings: &'a Bindings,
    pub memory_limit_bytes: u64,
    pub max_output_bytes: usize,
}

impl WorkerPayload<'_> {
    pub fn encode(&self) -> serde_json::Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(general_purpose::STANDARD.encode(json))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HarnessReport {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub bindings: Bindings,
    #[serde(default)]
    pub memory_exceeded: bool,
}

/// Split worker stderr into the harness trailer and any interpreter noise
///
/// The last sentinel line wins; the harness writes it after user code ends.
pub fn split_trailer(stderr: &str) -> (Option<HarnessReport>, String) {
    let mut report = None;
    let mut noise = Vec::new();

    for line in stderr.lines() {
        match line.strip_prefix(RESULT_SENTINEL) {
            Some(json) => report = serde_json::from_str::<HarnessReport>(json).ok(),
            None => noise.push(line),
        }
    }

    (report, noise.join("\n"))
}
