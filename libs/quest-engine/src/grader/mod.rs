/// Structural Grader - Syntax-Tree Checks per Exercise
///
/// **Critical Properties:**
/// - Never executes code
/// - Independent of the sandbox outcome: code that crashes at runtime can
///   pass every check, and vice versa
/// - Deterministic: same (source, exercise_id) gives the same checks
///
/// A parse failure short-circuits to a single failing "Syntax Error" check.
/// Otherwise the tree is walked once into `SyntaxFacts` and the exercise's
/// strategy evaluates its ordered checks against them.
///
/// Parsing, walking and dropping the tree all recurse once per nesting
/// level, so they run on a dedicated thread whose stack grows with the
/// source length. Nesting depth can never exceed the number of source bytes.
pub mod exercises;
pub mod facts;
pub mod registry;

pub use facts::{StatementKind, SyntaxFacts};
pub use registry::{CheckSpec, ExerciseDefinition, GradingRegistry, GradingStrategy, Requirement};

use crate::error::Result;
use quest_common::types::TestCheck;
use rustpython_parser::{ast, Parse, ParseError};
use std::thread;
use tracing::debug;

pub const SYNTAX_ERROR_CHECK: &str = "Syntax Error";

const SOURCE_PATH: &str = "<submission>";

const BASE_STACK_BYTES: usize = 2 * 1024 * 1024;

/// Stack reserved per source byte, enough for one nesting level each
const STACK_BYTES_PER_SOURCE_BYTE: usize = 2 * 1024;

#[derive(Debug, Clone)]
pub struct StructuralGrader {
    registry: GradingRegistry,
}

impl StructuralGrader {
    pub fn new(registry: GradingRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &GradingRegistry {
        &self.registry
    }

    /// Ordered checks for `source`; `Err` only if the grading thread cannot start
    pub fn grade(&self, source: &str, exercise_id: &str) -> Result<Vec<TestCheck>> {
        let stack_size = source
            .len()
            .saturating_mul(STACK_BYTES_PER_SOURCE_BYTE)
            .saturating_add(BASE_STACK_BYTES);

        thread::scope(|scope| {
            let handle = thread::Builder::new()
                .name("quest-grader".to_string())
                .stack_size(stack_size)
                .spawn_scoped(scope, || self.grade_in_place(source, exercise_id))?;

            match handle.join() {
                Ok(checks) => Ok(checks),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        })
    }

    fn grade_in_place(&self, source: &str, exercise_id: &str) -> Vec<TestCheck> {
        let suite = match ast::Suite::parse(source, SOURCE_PATH) {
            Ok(suite) => suite,
            Err(err) => {
                let message = describe_parse_error(source, &err);
                debug!(exercise_id, error = %message, "Submission does not parse");
                return vec![TestCheck::new(SYNTAX_ERROR_CHECK, false, 0).with_message(message)];
            }
        };

        let facts = SyntaxFacts::collect(&suite);
        let checks = self.registry.resolve(exercise_id).evaluate(&facts);

        debug!(
            exercise_id,
            dedicated = self.registry.contains(exercise_id),
            passed = checks.iter().filter(|c| c.passed).count(),
            total = checks.len(),
            "Structural checks evaluated"
        );

        checks
    }

    /// Highest score reachable for an exercise
    pub fn max_score(&self, exercise_id: &str) -> u32 {
        self.registry.resolve(exercise_id).max_score()
    }
}

/// Parser diagnostic with a 1-based line and column
fn describe_parse_error(source: &str, err: &ParseError) -> String {
    let mut offset = (u32::from(err.offset) as usize).min(source.len());
    while !source.is_char_boundary(offset) {
        offset -= 1;
    }
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before.rsplit('\n').next().map_or(0, |tail| tail.chars().count()) + 1;
    format!("{} (line {}, column {})", err.error, line, column)
}
