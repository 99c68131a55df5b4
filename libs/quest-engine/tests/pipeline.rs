// End-to-end runs of the exercise fixtures through a real worker

use quest_common::types::{FailureKind, SubmittedCode};
use quest_engine::config::Limits;
use quest_engine::sandbox::ProcessBackend;
use quest_engine::{EngineConfig, QuestEngine};

fn fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {}", path, e))
}

fn engine(limits: Limits) -> QuestEngine<ProcessBackend> {
    let config = EngineConfig {
        limits,
        ..EngineConfig::default()
    };
    QuestEngine::new(config, ProcessBackend::new("python3")).unwrap()
}

#[test]
fn test_fixtures_pass_the_gate_and_every_check() {
    let engine = engine(Limits::default());

    for (file, exercise, max_score) in [
        ("basic_1.py", "basic-1", 50),
        ("basic_2.py", "basic-2", 60),
        ("basic_3.py", "basic-3", 80),
    ] {
        let source = fixture(file);
        assert!(engine.check_safety(&source).safe, "{} tripped the gate", file);

        let checks = engine.grade(&source, exercise).unwrap();
        assert!(checks.iter().all(|c| c.passed), "{}: {:?}", file, checks);
        assert_eq!(checks.iter().map(|c| c.points).sum::<u32>(), max_score);
    }
}

#[tokio::test]
#[ignore] // Requires python3
async fn test_basic_1_fixture_end_to_end() {
    let engine = engine(Limits::default());

    let report = engine
        .run(&SubmittedCode::new(fixture("basic_1.py"), "basic-1"))
        .await;

    assert!(report.success, "{:?}", report);
    assert!(report.output.starts_with("Name: Ada\nAge: 25\n"));
    assert_eq!(report.score, 50);
    assert!(report.execution_time > 0.0);
}

#[tokio::test]
#[ignore] // Requires python3
async fn test_basic_3_fixture_end_to_end() {
    let engine = engine(Limits::default());

    let report = engine
        .run(&SubmittedCode::new(fixture("basic_3.py"), "basic-3"))
        .await;

    assert!(report.success, "{:?}", report);
    assert!(report.output.contains("Max of 10 and 7: 10"));
    assert_eq!(report.score, 80);
}

#[tokio::test]
#[ignore] // Requires python3
async fn test_runaway_fixture_times_out() {
    let engine = engine(Limits {
        timeout_ms: 500,
        ..Limits::default()
    });

    let report = engine
        .run(&SubmittedCode::new(fixture("runaway.py"), "basic-2"))
        .await;

    assert!(!report.success);
    assert_eq!(report.failure_kind, Some(FailureKind::Timeout));
    assert_eq!(report.output, "starting\nError: Execution timed out after 500ms");
    // Grading still sees the while loop
    assert!(report.test_results[2].passed);
}
