#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn coach(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("coach").unwrap();
    cmd.current_dir(dir.path())
        .env("COACH_CONFIG", dir.path().join("coach.yaml"))
        .env_remove("RUST_LOG");
    cmd
}

// ---------------------------------------------------------------------------
// coach next-stage
// ---------------------------------------------------------------------------

#[test]
fn next_stage_follows_fixed_order() {
    let dir = TempDir::new().unwrap();
    coach(&dir)
        .args(["next-stage", "intent_understanding"])
        .assert()
        .success()
        .stdout("project_understanding\n");
}

#[test]
fn next_stage_skips_known_facts() {
    let dir = TempDir::new().unwrap();
    coach(&dir)
        .args([
            "next-stage",
            "intent_understanding",
            "--has-description",
            "--phase",
            "design",
        ])
        .assert()
        .success()
        .stdout("underlying_problem\n");

    coach(&dir)
        .args(["next-stage", "action", "--no-guidance"])
        .assert()
        .success()
        .stdout("debrief\n");
}

#[test]
fn next_stage_after_debrief_is_none() {
    let dir = TempDir::new().unwrap();
    coach(&dir)
        .args(["next-stage", "debrief"])
        .assert()
        .success()
        .stdout("none\n");
}

#[test]
fn next_stage_rejects_unknown_stage() {
    let dir = TempDir::new().unwrap();
    coach(&dir)
        .args(["next-stage", "brainstorm"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid stage"));
}

// ---------------------------------------------------------------------------
// coach prompt
// ---------------------------------------------------------------------------

#[test]
fn prompt_renders_memory_and_stage() {
    let dir = TempDir::new().unwrap();
    let memory = dir.path().join("memory.json");
    std::fs::write(
        &memory,
        r#"{"project": {"description": "Bakery scheduling"}, "user": {"skills": ["baking"]}}"#,
    )
    .unwrap();

    coach(&dir)
        .args(["prompt", "--memory"])
        .arg(&memory)
        .args(["--stage", "action", "--locale", "fr"])
        .assert()
        .success()
        .stdout(predicate::str::contains("## CURRENT MEMORY STATE"))
        .stdout(predicate::str::contains("Bakery scheduling"))
        .stdout(predicate::str::contains("## CURRENT WORKFLOW STAGE: action (5/7)"))
        .stdout(predicate::str::contains("Always answer in French"));
}

#[test]
fn prompt_reports_unreadable_memory() {
    let dir = TempDir::new().unwrap();
    coach(&dir)
        .args(["prompt", "--memory", "missing.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error: reading missing.json"));
}

// ---------------------------------------------------------------------------
// coach serve
// ---------------------------------------------------------------------------

#[test]
fn serve_requires_api_key() {
    let dir = TempDir::new().unwrap();
    coach(&dir)
        .env_remove("ANTHROPIC_API_KEY")
        .args(["serve", "--in-memory"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ANTHROPIC_API_KEY"));
}

#[test]
fn serve_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("coach.yaml"), "llm:\n  max_tokens: 0\n").unwrap();
    coach(&dir)
        .env("ANTHROPIC_API_KEY", "test-key")
        .args(["serve", "--in-memory"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("llm.max_tokens must be greater than zero"));
}
