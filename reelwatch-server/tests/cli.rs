use std::fs;
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

const ENV_VARS: &[&str] = &[
    "REELWATCH_CONFIG",
    "TELEGRAM_BOT_TOKEN",
    "TELEGRAM_CHAT_ID",
    "TELEGRAM_API_BASE",
    "REELWATCH_COMMANDS",
    "OMDB_API_KEY",
    "OMDB_BASE_URL",
    "MONITORED_FOLDERS",
    "REELWATCH_STATE_DIR",
    "REELWATCH_LOG_FILE",
    "RUST_LOG",
];

/// Library with two folders plus a config pointing at it and a scratch
/// state dir.
fn fixture() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let movies = dir.path().join("movies");
    fs::create_dir_all(movies.join("Alien (1979)")).unwrap();
    fs::create_dir_all(movies.join("Heat (1995)")).unwrap();
    fs::write(movies.join("notes.txt"), "not a folder").unwrap();
    fs::create_dir_all(dir.path().join("state")).unwrap();
    fs::write(dir.path().join("empty.env"), "").unwrap();

    let config = format!(
        r#"
monitored_folders = ["{movies}"]

[telegram]
bot_token = "123:test-token"
chat_id = 42

[state]
state_dir = "{state}"
"#,
        movies = movies.display(),
        state = dir.path().join("state").display(),
    );
    fs::write(dir.path().join("reelwatch.toml"), config).unwrap();
    dir
}

fn reelwatch(dir: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("reelwatch");
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.current_dir(dir)
        .arg("--config")
        .arg(dir.join("reelwatch.toml"))
        .arg("--env-file")
        .arg(dir.join("empty.env"));
    cmd
}

#[test]
fn help_lists_subcommands() {
    let mut cmd = cargo_bin_cmd!("reelwatch");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("scan-once"))
        .stdout(predicate::str::contains("check-config"))
        .stdout(predicate::str::contains("--config"));
}

#[test]
fn check_config_accepts_valid_file() {
    let dir = fixture();
    reelwatch(dir.path())
        .arg("check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 monitored folder(s), chat 42"));
}

#[test]
fn check_config_rejects_missing_token() {
    let dir = fixture();
    let config = fs::read_to_string(dir.path().join("reelwatch.toml"))
        .unwrap()
        .replace("bot_token = \"123:test-token\"\n", "");
    fs::write(dir.path().join("reelwatch.toml"), config).unwrap();

    reelwatch(dir.path()).arg("check-config").assert().failure();
}

#[test]
fn dry_run_prints_changes_and_keeps_state() {
    let dir = fixture();
    reelwatch(dir.path())
        .args(["scan-once", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--- message 1 ---"))
        .stdout(predicate::str::contains("Alien"))
        .stdout(predicate::str::contains("Heat"))
        .stdout(predicate::str::contains("notes.txt").not())
        .stdout(predicate::str::contains("2 added, 0 removed"));

    let state: Vec<_> = fs::read_dir(dir.path().join("state"))
        .unwrap()
        .collect();
    assert!(state.is_empty(), "dry run wrote state files");
}
