// CLI commands for running and inspecting the quest engine
use anyhow::{bail, Context, Result};
use quest_common::types::SubmittedCode;
use quest_engine::gate::SafetyGate;
use quest_engine::grader::exercises;
use quest_engine::{ConfiguredBackend, EngineConfig, QuestEngine};
use std::fs;
use std::path::Path;

/// Explicit config file, or config/engine.json with env overrides
fn load_config(config_path: Option<&Path>) -> Result<EngineConfig> {
    match config_path {
        Some(path) => EngineConfig::load(path)?.with_env_overrides(),
        None => EngineConfig::load_default(),
    }
}

fn read_source(file: &Path) -> Result<String> {
    fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

/// Run one submission; returns the report's success flag
pub async fn run_submission(exercise: &str, file: &Path, config_path: Option<&Path>) -> Result<bool> {
    if exercise.trim().is_empty() {
        bail!("Exercise id cannot be empty");
    }

    let config = load_config(config_path)?;
    let source = read_source(file)?;

    let backend = ConfiguredBackend::from_config(&config.backend)
        .context("Failed to initialize sandbox backend")?;
    let engine = QuestEngine::new(config, backend).context("Failed to build quest engine")?;

    let report = engine.run(&SubmittedCode::new(source, exercise)).await;

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(report.success)
}

/// Safety gate only; returns whether the file is safe
pub fn check_file(file: &Path, config_path: Option<&Path>) -> Result<bool> {
    let config = load_config(config_path)?;
    let source = read_source(file)?;

    let gate = SafetyGate::new(&config.forbidden_patterns)?;
    let verdict = gate.check(&source);

    match &verdict.violation {
        None => println!("✅ {} passed the safety gate", file.display()),
        Some(pattern) => println!("❌ {} rejected (matched: {})", file.display(), pattern),
    }

    Ok(verdict.safe)
}

pub fn list_exercises(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let registry = exercises::configured_registry(&config.exercises, &config.required_exercises)?;

    println!("📋 Registered Exercises:\n");
    println!("{:<16} {:<8} {:<10}", "ID", "CHECKS", "MAX SCORE");
    println!("{}", "─".repeat(36));

    let ids = registry.exercise_ids();
    for id in &ids {
        let strategy = registry.resolve(id);
        println!("{:<16} {:<8} {:<10}", id, strategy.checks().len(), strategy.max_score());
    }

    println!(
        "\n✅ Total: {} exercise(s); unknown ids get the generic check ({} points)",
        ids.len(),
        exercises::GENERIC_POINTS
    );

    Ok(())
}

pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    EngineConfig::default().save(path)?;
    println!("✅ Wrote default engine config to {}", path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_config_writes_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");

        init_config(&path, false).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, EngineConfig::default());
    }

    #[test]
    fn test_init_config_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, "{}").unwrap();

        assert!(init_config(&path, false).is_err());
        assert!(init_config(&path, true).is_ok());
    }

    #[test]
    fn test_check_file_verdicts() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("engine.json");
        EngineConfig::default().save(&config_path).unwrap();

        let safe = dir.path().join("safe.py");
        fs::write(&safe, "print('hi')\n").unwrap();
        let unsafe_file = dir.path().join("unsafe.py");
        fs::write(&unsafe_file, "import socket\n").unwrap();

        assert!(check_file(&safe, Some(&config_path)).unwrap());
        assert!(!check_file(&unsafe_file, Some(&config_path)).unwrap());
    }

    #[test]
    fn test_missing_source_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("engine.json");
        EngineConfig::default().save(&config_path).unwrap();

        let err = check_file(&dir.path().join("nope.py"), Some(&config_path)).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
