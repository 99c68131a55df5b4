// Grading registry: exercise id -> ordered, weighted structural checks
//
// Strategies are plain data so exercises can come from code or from the
// engine configuration file. Unknown ids resolve to the fallback strategy.

use super::facts::{StatementKind, SyntaxFacts};
use crate::error::{EngineError, Result};
use quest_common::types::TestCheck;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What one check asserts about the syntax tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requirement {
    AssignsName { name: String },
    MinCalls { callee: String, count: usize },
    HasStatement { statement: StatementKind },
    DefinesFunction { name: String },
    Always,
}

impl Requirement {
    /// Pass/fail plus an explanation on failure
    fn evaluate(&self, facts: &SyntaxFacts) -> (bool, Option<String>) {
        match self {
            Requirement::AssignsName { name } => {
                let passed = facts.assigns(name);
                (passed, (!passed).then(|| format!("no assignment to `{}` found", name)))
            }
            Requirement::MinCalls { callee, count } => {
                let found = facts.calls_to(callee);
                let passed = found >= *count;
                let message = (!passed).then(|| {
                    format!("found {} call(s) to {}, need at least {}", found, callee, count)
                });
                (passed, message)
            }
            Requirement::HasStatement { statement } => {
                let passed = facts.has_statement(*statement);
                let message =
                    (!passed).then(|| format!("no `{}` statement found", statement.keyword()));
                (passed, message)
            }
            Requirement::DefinesFunction { name } => {
                let passed = facts.defines_function(name);
                (passed, (!passed).then(|| format!("no function named `{}` is defined", name)))
            }
            Requirement::Always => (true, None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSpec {
    pub description: String,
    pub points: u32,
    pub requirement: Requirement,
}

impl CheckSpec {
    pub fn new(description: impl Into<String>, points: u32, requirement: Requirement) -> Self {
        Self {
            description: description.into(),
            points,
            requirement,
        }
    }
}

/// Fixed, ordered checks for one exercise
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GradingStrategy {
    checks: Vec<CheckSpec>,
}

impl GradingStrategy {
    pub fn new(checks: Vec<CheckSpec>) -> Self {
        Self { checks }
    }

    pub fn evaluate(&self, facts: &SyntaxFacts) -> Vec<TestCheck> {
        self.checks
            .iter()
            .map(|spec| {
                let (passed, message) = spec.requirement.evaluate(facts);
                TestCheck {
                    description: spec.description.clone(),
                    passed,
                    points: spec.points,
                    message,
                }
            })
            .collect()
    }

    pub fn checks(&self) -> &[CheckSpec] {
        &self.checks
    }

    pub fn max_score(&self) -> u32 {
        self.checks.iter().map(|spec| spec.points).sum()
    }

    fn validate(&self, id: &str) -> Result<()> {
        if self.checks.is_empty() {
            return Err(EngineError::Registry(format!("exercise `{}` has no checks", id)));
        }
        if let Some(position) = self.checks.iter().position(|c| c.description.trim().is_empty()) {
            return Err(EngineError::Registry(format!(
                "exercise `{}` check #{} has an empty description",
                id,
                position + 1
            )));
        }
        Ok(())
    }
}

/// Exercise as it appears in the engine configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseDefinition {
    pub id: String,
    pub checks: Vec<CheckSpec>,
}

#[derive(Debug, Clone)]
pub struct GradingRegistry {
    strategies: HashMap<String, GradingStrategy>,
    fallback: GradingStrategy,
}

impl GradingRegistry {
    pub fn new(fallback: GradingStrategy) -> Self {
        Self {
            strategies: HashMap::new(),
            fallback,
        }
    }

    /// Register a strategy; an id can only be registered once
    pub fn register(&mut self, id: impl Into<String>, strategy: GradingStrategy) -> Result<()> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(EngineError::Registry("exercise id must not be empty".to_string()));
        }
        strategy.validate(&id)?;
        if self.strategies.contains_key(&id) {
            return Err(EngineError::Registry(format!("exercise `{}` registered twice", id)));
        }
        self.strategies.insert(id, strategy);
        Ok(())
    }

    pub fn register_definition(&mut self, definition: ExerciseDefinition) -> Result<()> {
        self.register(definition.id, GradingStrategy::new(definition.checks))
    }

    pub fn resolve(&self, exercise_id: &str) -> &GradingStrategy {
        self.strategies.get(exercise_id).unwrap_or(&self.fallback)
    }

    pub fn contains(&self, exercise_id: &str) -> bool {
        self.strategies.contains_key(exercise_id)
    }

    /// Sorted ids of every registered exercise
    pub fn exercise_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.strategies.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Startup check: fallback usable and every catalog id has a strategy
    pub fn validate<S: AsRef<str>>(&self, required: &[S]) -> Result<()> {
        self.fallback.validate("<fallback>")?;
        let missing: Vec<&str> = required
            .iter()
            .map(|id| id.as_ref())
            .filter(|id| !self.contains(id))
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::Registry(format!(
                "no grading strategy for required exercise(s): {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}
