#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn crisis(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("crisis").unwrap();
    cmd.current_dir(dir.path())
        .env("CRISIS_ROOT", dir.path())
        .env_remove("CRISIS_PRINCIPAL_ID")
        .env_remove("CRISIS_PRINCIPAL_NAME")
        .env_remove("RUST_LOG");
    cmd
}

fn init_project(dir: &TempDir) {
    crisis(dir).arg("init").assert().success();
}

fn json(dir: &TempDir, args: &[&str]) -> Value {
    let out = crisis(dir).arg("--json").args(args).output().unwrap();
    assert!(
        out.status.success(),
        "crisis {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_slice(&out.stdout).unwrap()
}

fn add_template(dir: &TempDir, name: &str, category: &str) {
    crisis(dir)
        .args(["template", "add", "--name", name, "--category", category])
        .assert()
        .success();
}

fn open_incident(dir: &TempDir, title: &str) -> String {
    let out = json(
        dir,
        &[
            "incident",
            "open",
            "--title",
            title,
            "--creator-id",
            "U1",
            "--creator-name",
            "Alice",
        ],
    );
    out["id"].as_str().unwrap().to_string()
}

fn as_user(cmd: &mut Command, id: &str, name: &str) {
    cmd.env("CRISIS_PRINCIPAL_ID", id)
        .env("CRISIS_PRINCIPAL_NAME", name);
}

// ---------------------------------------------------------------------------
// crisis init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_config_and_store() {
    let dir = TempDir::new().unwrap();
    crisis(&dir).arg("init").assert().success();

    assert!(dir.path().join(".crisis").is_dir());
    assert!(dir.path().join(".crisis/config.yaml").exists());
    assert!(dir.path().join(".crisis/crisis.redb").exists());
    let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
    assert!(gitignore.lines().any(|l| l == ".crisis/*.redb"));
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    crisis(&dir).arg("init").assert().success();
    crisis(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists"));
}

#[test]
fn commands_before_init_fail_with_hint() {
    let dir = TempDir::new().unwrap();
    crisis(&dir)
        .args(["incident", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("crisis init"));
}

// ---------------------------------------------------------------------------
// templates and incidents
// ---------------------------------------------------------------------------

#[test]
fn template_add_list_remove() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    add_template(&dir, "Notify neighbors", "communication");

    let list = json(&dir, &["template", "list"]);
    let items = list.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "Notify neighbors");
    let id = items[0]["id"].as_str().unwrap().to_string();

    crisis(&dir)
        .args(["template", "remove", &id])
        .assert()
        .success();
    assert!(json(&dir, &["template", "list"]).as_array().unwrap().is_empty());
}

#[test]
fn opening_an_incident_generates_its_checklist() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    add_template(&dir, "Call emergency services", "alert");
    add_template(&dir, "Notify neighbors", "communication");

    let e1 = open_incident(&dir, "Chlorine leak");
    let actions = json(&dir, &["action", "list", "--incident", &e1]);
    let actions = actions.as_array().unwrap();
    assert_eq!(actions.len(), 2);
    for action in actions {
        assert_eq!(action["status"], "not required");
        assert_eq!(action["demandeur_id"], "U1");
        assert_eq!(action["demandeur_nom"], "Alice");
        assert_eq!(action["incident_id"], e1.as_str());
    }

    crisis(&dir)
        .args(["incident", "show", &e1])
        .assert()
        .success()
        .stdout(predicate::str::contains("Chlorine leak"))
        .stdout(predicate::str::contains("Actions (2)"));
}

#[test]
fn incident_without_templates_has_no_actions() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let e1 = open_incident(&dir, "Drill");
    let actions = json(&dir, &["action", "list", "--incident", &e1]);
    assert!(actions.as_array().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// status history
// ---------------------------------------------------------------------------

#[test]
fn status_change_is_recorded_and_comment_edit_is_not() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    add_template(&dir, "Notify neighbors", "communication");
    let e1 = open_incident(&dir, "Chlorine leak");
    let actions = json(&dir, &["action", "list", "--incident", &e1]);
    let action_id = actions[0]["id"].as_str().unwrap().to_string();

    let mut cmd = crisis(&dir);
    as_user(&mut cmd, "U2", "Bob");
    cmd.args(["action", "set-status", &action_id, "in progress"])
        .assert()
        .success();

    let history = json(&dir, &["history", "list", "--incident", &e1]);
    let entries = history.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["previous_status"], "not required");
    assert_eq!(entries[0]["new_status"], "in progress");
    assert_eq!(entries[0]["utilisateur_id"], "U2");
    assert_eq!(entries[0]["utilisateur_nom"], "Bob");
    assert_eq!(entries[0]["action_name"], "Notify neighbors");

    let mut cmd = crisis(&dir);
    as_user(&mut cmd, "U2", "Bob");
    cmd.args(["action", "comment", &action_id, "units", "on", "site"])
        .assert()
        .success();

    let history = json(&dir, &["history", "list", "--action", &action_id]);
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[test]
fn set_status_requires_a_user() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    add_template(&dir, "Notify neighbors", "communication");
    let e1 = open_incident(&dir, "Flood");
    let actions = json(&dir, &["action", "list", "--incident", &e1]);
    let action_id = actions[0]["id"].as_str().unwrap().to_string();

    crisis(&dir)
        .args(["action", "set-status", &action_id, "done"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--principal-id"));
}

#[test]
fn repeating_the_current_status_is_reported_unchanged() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    add_template(&dir, "Notify neighbors", "communication");
    let e1 = open_incident(&dir, "Flood");
    let actions = json(&dir, &["action", "list", "--incident", &e1]);
    let action_id = actions[0]["id"].as_str().unwrap().to_string();

    let args = ["--principal-id", "U2", "action", "set-status", &action_id, "done"];
    let first = json(&dir, &args);
    assert_eq!(first["changed"], true);
    let second = json(&dir, &args);
    assert_eq!(second["changed"], false);
    assert_eq!(second["history_entries"], 1);

    crisis(&dir)
        .args(args)
        .assert()
        .success()
        .stdout(predicate::str::contains("already has status 'done'"));
}

#[test]
fn editing_an_unknown_action_reports_not_found() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    crisis(&dir)
        .args(["--principal-id", "U2", "action", "set-status", "ghost", "done"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to update action 'ghost'"))
        .stderr(predicate::str::contains("document not found: actions/ghost"));
}

#[test]
fn history_outlives_deleted_action() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    add_template(&dir, "Evacuate building", "safety");
    let e1 = open_incident(&dir, "Fire");
    let actions = json(&dir, &["action", "list", "--incident", &e1]);
    let action_id = actions[0]["id"].as_str().unwrap().to_string();

    crisis(&dir)
        .args(["--principal-id", "U3", "action", "set-status", &action_id, "done"])
        .assert()
        .success();
    crisis(&dir)
        .args(["action", "delete", &action_id])
        .assert()
        .success();

    let history = json(&dir, &["history", "list", "--action", &action_id]);
    let entries = history.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["action_name"], "Evacuate building");
}

// ---------------------------------------------------------------------------
// deferred triggers
// ---------------------------------------------------------------------------

fn disable_inline_triggers(dir: &TempDir) {
    let path = dir.path().join(".crisis/config.yaml");
    let config = std::fs::read_to_string(&path).unwrap();
    let config = config.replace("inline: true", "inline: false");
    assert!(config.contains("inline: false"));
    std::fs::write(&path, config).unwrap();
}

#[test]
fn changes_wait_for_drain_when_triggers_are_not_inline() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    disable_inline_triggers(&dir);
    add_template(&dir, "Notify neighbors", "communication");
    let e1 = open_incident(&dir, "Storm");

    assert!(json(&dir, &["action", "list", "--incident", &e1])
        .as_array()
        .unwrap()
        .is_empty());
    let pending = json(&dir, &["triggers", "pending"]);
    assert_eq!(pending.as_array().unwrap().len(), 2);

    let report = json(&dir, &["triggers", "drain"]);
    assert_eq!(report["writes"], 1);
    assert_eq!(report["failed"], 0);

    let actions = json(&dir, &["action", "list", "--incident", &e1]);
    assert_eq!(actions.as_array().unwrap().len(), 1);
    assert!(json(&dir, &["triggers", "pending"])
        .as_array()
        .unwrap()
        .is_empty());
}

#[test]
fn worker_once_drains_the_feed() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    disable_inline_triggers(&dir);
    add_template(&dir, "Notify neighbors", "communication");
    let e1 = open_incident(&dir, "Storm");

    let report = json(&dir, &["worker", "--once"]);
    assert_eq!(report["writes"], 1);
    assert_eq!(
        json(&dir, &["action", "list", "--incident", &e1])
            .as_array()
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn dead_letters_start_empty_and_requeue_of_unknown_change_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    assert!(json(&dir, &["triggers", "dead-letters"])
        .as_array()
        .unwrap()
        .is_empty());
    crisis(&dir)
        .args(["triggers", "requeue", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("#42"));
}
