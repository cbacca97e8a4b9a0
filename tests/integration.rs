use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use issue_triage::config::load_config;
use issue_triage::neighbors::{NeighborStrategy, PersistentIndex};
use issue_triage::sqlite_store::SqliteStore;
use issue_triage::{db, migrate};
use tempfile::TempDir;
use triage_core::embedding::ZeroVectorProvider;
use triage_core::event::{IssueAction, IssueEvent};
use triage_core::models::{IssueRecord, RepoRef};

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/triage.sqlite"

[server]
bind = "127.0.0.1:7341"

[webhook]
secret = "test-secret"

[retrieval]
top_k = 3
"#,
        root.display()
    );

    let config_path = config_dir.join("triage.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_triage(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = env!("CARGO_BIN_EXE_triage");
    let output = Command::new(binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run triage binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Ingest issues straight through the persistent strategy.
async fn seed(config_path: &Path, issues: &[(u64, &str)]) {
    let config = load_config(config_path).unwrap();
    let pool = db::connect(&config).await.unwrap();
    migrate::migrate_pool(&pool).await.unwrap();
    let store = Arc::new(SqliteStore::new(pool));
    let index = PersistentIndex::new(
        store.clone(),
        Arc::new(ZeroVectorProvider::new("disabled", 8)),
        50,
        3,
    );

    for (number, title) in issues {
        index
            .process(&IssueEvent {
                action: IssueAction::Opened,
                issue: IssueRecord {
                    repo: RepoRef::new("acme", "widgets"),
                    number: *number,
                    title: title.to_string(),
                    body: String::new(),
                    state: "open".to_string(),
                    author: "octocat".to_string(),
                },
                installation_id: None,
            })
            .await
            .unwrap();
    }
    store.close().await;
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_triage(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/triage.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_triage(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_triage(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_suggestion_for_unknown_issue_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_triage(&config_path, &["init"]);

    let (_, stderr, success) = run_triage(&config_path, &["suggestion", "999"]);
    assert!(!success);
    assert!(stderr.contains("not found"), "stderr={}", stderr);
}

#[tokio::test]
async fn test_suggestion_apply_and_decisions() {
    let (_tmp, config_path) = setup_test_env();
    seed(&config_path, &[(1, "Crash on startup"), (2, "Crash on resume")]).await;

    let (stdout, stderr, success) = run_triage(&config_path, &["suggestion", "2"]);
    assert!(success, "suggestion failed: {}", stderr);
    assert!(stdout.contains("#2 Crash on resume"));
    assert!(stdout.contains("Initial retrieval only"));
    // Zero vectors score 0 against everything; the link is still recorded.
    assert!(stdout.contains("similar #1 (score 0.000)"));

    let (stdout, _, success) = run_triage(&config_path, &["apply", "2"]);
    assert!(success);
    assert!(stdout.contains("Applied suggestion for #2"));
    let (_, _, success) = run_triage(&config_path, &["apply", "2"]);
    assert!(success);

    let (stdout, _, success) = run_triage(&config_path, &["decisions", "2"]);
    assert!(success);
    assert_eq!(stdout.matches("APPLY_SUGGESTION").count(), 2);
    assert_eq!(stdout.matches("system").count(), 2);
}

#[test]
fn test_invalid_config_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("bad.toml");
    fs::write(&config_path, "[retrieval]\ntop_k = 0\n").unwrap();

    let (_, stderr, success) = run_triage(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("top_k"));
}
