// Built-in quest exercises
use super::facts::StatementKind;
use super::registry::{CheckSpec, ExerciseDefinition, GradingRegistry, GradingStrategy, Requirement};
use crate::error::Result;

pub const GENERIC_CHECK: &str = "Code syntax check";
pub const GENERIC_POINTS: u32 = 50;

/// One passing check for exercises without a dedicated strategy
pub fn generic() -> GradingStrategy {
    GradingStrategy::new(vec![CheckSpec::new(GENERIC_CHECK, GENERIC_POINTS, Requirement::Always)])
}

/// basic-1: Variables & Data Types
pub fn variables_and_types() -> GradingStrategy {
    let mut checks: Vec<CheckSpec> = ["name", "age", "height", "is_student"]
        .iter()
        .map(|variable| {
            CheckSpec::new(
                format!("Check if {} variable is defined", variable),
                10,
                Requirement::AssignsName {
                    name: variable.to_string(),
                },
            )
        })
        .collect();

    checks.push(CheckSpec::new(
        "Check if variables are printed",
        10,
        Requirement::MinCalls {
            callee: "print".to_string(),
            count: 4,
        },
    ));

    GradingStrategy::new(checks)
}

/// basic-2: Control Flow
pub fn control_flow() -> GradingStrategy {
    let statement = |statement| Requirement::HasStatement { statement };

    GradingStrategy::new(vec![
        CheckSpec::new("Check for if statement", 15, statement(StatementKind::If)),
        CheckSpec::new("Check for for loop", 15, statement(StatementKind::For)),
        CheckSpec::new("Check for while loop", 15, statement(StatementKind::While)),
        CheckSpec::new(
            "Check for proper loop structure",
            15,
            Requirement::MinCalls {
                callee: "range".to_string(),
                count: 1,
            },
        ),
    ])
}

/// basic-3: Functions
pub fn functions() -> GradingStrategy {
    let checks = ["greet_user", "calculate_area", "is_even", "find_max"]
        .iter()
        .map(|function| {
            CheckSpec::new(
                format!("Check for {} function", function),
                20,
                Requirement::DefinesFunction {
                    name: function.to_string(),
                },
            )
        })
        .collect();

    GradingStrategy::new(checks)
}

/// Registry with the generic fallback and every built-in exercise
pub fn builtin_registry() -> Result<GradingRegistry> {
    let mut registry = GradingRegistry::new(generic());
    registry.register("basic-1", variables_and_types())?;
    registry.register("basic-2", control_flow())?;
    registry.register("basic-3", functions())?;
    Ok(registry)
}

/// Built-in exercises plus configured ones, validated against the catalog
pub fn configured_registry<S: AsRef<str>>(
    definitions: &[ExerciseDefinition],
    required: &[S],
) -> Result<GradingRegistry> {
    let mut registry = builtin_registry()?;
    for definition in definitions {
        registry.register_definition(definition.clone())?;
    }
    registry.validate(required)?;
    Ok(registry)
}
