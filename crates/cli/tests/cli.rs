use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_posts(dir: &TempDir) -> PathBuf {
    let posts = serde_json::json!([
        {
            "id": "abc123",
            "channel": "Connecticut",
            "title": "Need help for my mom",
            "text": "Looking for a caregiver for my elderly mom in Hamden, any suggestions?",
            "author": "worried_daughter",
            "url": "https://www.reddit.com/r/Connecticut/comments/abc123/",
            "created_at": "2024-03-01T12:00:00Z"
        },
        {
            "id": "def456",
            "channel": "NewHaven",
            "title": "Pizza",
            "text": "Best pizza in New Haven?",
            "author": "hungry",
            "url": "https://www.reddit.com/r/NewHaven/comments/def456/",
            "created_at": "2024-03-01T13:00:00Z"
        }
    ]);
    let path = dir.path().join("posts.json");
    fs::write(&path, posts.to_string()).expect("write posts");
    path
}

/// Offline config: stub source and heuristic scoring, SQLite in the temp dir
fn write_config(dir: &TempDir, outreach_enabled: bool) -> PathBuf {
    let posts = write_posts(dir);
    let content = format!(
        r#"
[general]
store = "sqlite"
sqlite_path = "{db}"
dry_run = false

[source]
provider = "stub"
stub_posts_file = "{posts}"
channels = ["Connecticut", "NewHaven"]

[scoring]
threshold = 70

[llm]
provider = "stub"

[outreach]
enabled = {outreach_enabled}
per_hour = 0
min_interval_secs = 0
"#,
        db = dir.path().join("leads.sqlite").display(),
        posts = posts.display(),
    );
    let path = dir.path().join("carelead.toml");
    fs::write(&path, content).expect("write config");
    path
}

fn run_json(config: &Path, dir: &TempDir) -> Value {
    let output = cargo_bin_cmd!("carelead")
        .current_dir(dir.path())
        .arg("--config")
        .arg(config)
        .args(["run", "--json"])
        .output()
        .expect("run pipeline");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid json")
}

#[test]
fn config_init_writes_example_file() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = dir.path().join("carelead.toml");

    let mut cmd = cargo_bin_cmd!("carelead");
    cmd.args(["config", "init", "--path"])
        .arg(&config_path)
        .assert()
        .success();

    let content = fs::read_to_string(&config_path).expect("read config");
    assert!(content.contains("[source.reddit]"));
    assert!(content.contains("dry_run = true"));
}

#[test]
fn config_init_refuses_to_overwrite_without_force() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = dir.path().join("carelead.toml");
    fs::write(&config_path, "# mine\n").expect("write config");

    let mut cmd = cargo_bin_cmd!("carelead");
    cmd.args(["config", "init", "--path"])
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    assert_eq!(fs::read_to_string(&config_path).unwrap(), "# mine\n");
}

#[test]
fn score_outputs_valid_json() {
    let dir = TempDir::new().expect("temp dir");

    let mut cmd = cargo_bin_cmd!("carelead");
    let output = cmd
        .current_dir(dir.path())
        .env("CARELEAD__LLM__PROVIDER", "stub")
        .args([
            "score",
            "--text",
            "Looking for a home care companion for my father in New Haven",
            "--json",
        ])
        .output()
        .expect("run score");

    assert!(output.status.success());

    let value: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(value["score"], 100);
    assert_eq!(value["qualifies"], true);
    assert!(value["rationale"].is_string());
}

#[test]
fn run_contacts_qualifying_leads_once() {
    let dir = TempDir::new().expect("temp dir");
    let config = write_config(&dir, true);

    let first = run_json(&config, &dir);
    assert_eq!(first["fetched"], 2);
    assert_eq!(first["processed"], 2);
    assert_eq!(first["contacted"], 1);
    assert_eq!(first["skipped"], 1);
    assert_eq!(first["errored"], 0);
    assert_eq!(
        first.as_object().map(|o| o.len()),
        Some(8),
        "summary keys: {first}"
    );

    let second = run_json(&config, &dir);
    assert_eq!(second["fetched"], 2);
    assert_eq!(second["processed"], 0);
    assert_eq!(second["duplicates"], 2);
    assert_eq!(second["contacted"], 0);

    let output = cargo_bin_cmd!("carelead")
        .current_dir(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["leads", "list", "--status", "contacted", "--json"])
        .output()
        .expect("list leads");
    assert!(output.status.success());

    let leads: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    let leads = leads.as_array().expect("array");
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0]["post_id"], "abc123");
    assert_eq!(leads[0]["status"], "CONTACTED");
}

#[test]
fn disabled_outreach_leaves_leads_new_for_the_sweep() {
    let dir = TempDir::new().expect("temp dir");
    let config = write_config(&dir, false);

    let summary = run_json(&config, &dir);
    assert_eq!(summary["processed"], 2);
    assert_eq!(summary["pending"], 2);
    assert_eq!(summary["contacted"], 0);

    let output = cargo_bin_cmd!("carelead")
        .current_dir(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["outreach", "--dry-run", "--json"])
        .output()
        .expect("sweep outreach");
    assert!(output.status.success());

    let results: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    let results = results.as_array().expect("array");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["post_id"], "abc123");
    assert_eq!(results[0]["outcome"], "pending");
    assert!(
        results[0]["message"]
            .as_str()
            .unwrap()
            .contains("worried_daughter")
    );

    cargo_bin_cmd!("carelead")
        .current_dir(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["leads", "list", "--status", "NEW"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 lead(s)"));
}

#[test]
fn run_fails_for_unknown_store_backend() {
    let dir = TempDir::new().expect("temp dir");

    cargo_bin_cmd!("carelead")
        .current_dir(dir.path())
        .env("CARELEAD__LLM__PROVIDER", "stub")
        .env("CARELEAD__SOURCE__PROVIDER", "stub")
        .env("CARELEAD__GENERAL__STORE", "spreadsheet")
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown store backend"));
}
