use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

fn settings_json() -> &'static str {
    r#"
{
  "version": 1,
  "command": "echo from-file",
  "time": "6:15 AM"
}
"#
}

#[test]
fn diagnostics_reports_next_day_when_time_has_passed() {
    let mut cmd = cargo_bin_cmd!("wakeup");
    cmd.args(["--diagnostics", "--time", "10:30 AM"])
        .args(["--now", "2014-03-04T10:31:00"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Next fire instant: 2014-03-05 10:30:00"))
        .stdout(predicate::str::contains("Delay: 23:59:00"));
}

#[test]
fn diagnostics_uses_settings_file_and_cli_override_wins() {
    let dir = tempdir().expect("tempdir");
    let settings = dir.path().join("wakeup.json");
    fs::write(&settings, settings_json()).expect("write json");

    let mut cmd = cargo_bin_cmd!("wakeup");
    cmd.arg("--diagnostics")
        .arg("--config")
        .arg(&settings)
        .args(["--now", "2014-03-04T05:00:00"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Alarm time: 6:15 AM"))
        .stdout(predicate::str::contains("Command: echo from-file"));

    let mut cmd = cargo_bin_cmd!("wakeup");
    cmd.arg("--diagnostics")
        .arg("--config")
        .arg(&settings)
        .args(["--command", "echo from-cli"])
        .args(["--now", "2014-03-04T05:00:00"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Alarm time: 6:15 AM"))
        .stdout(predicate::str::contains("Command: echo from-cli"));
}

#[test]
fn malformed_time_fails_with_clear_error() {
    let mut cmd = cargo_bin_cmd!("wakeup");
    cmd.args(["--diagnostics", "--time", "25:99 XM"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error parsing time"));
}

#[test]
fn malformed_json_fails_with_clear_error() {
    let dir = tempdir().expect("tempdir");
    let settings = dir.path().join("wakeup.json");
    fs::write(&settings, "{ not-valid-json ").expect("write invalid json");

    let mut cmd = cargo_bin_cmd!("wakeup");
    cmd.arg("--diagnostics")
        .arg("--config")
        .arg(settings)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid JSON"));
}

#[test]
fn missing_settings_file_fails() {
    let dir = tempdir().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("wakeup");
    cmd.arg("--diagnostics")
        .arg("--config")
        .arg(dir.path().join("absent.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("unable to read settings file"));
}

#[test]
fn headless_without_api_is_rejected() {
    let mut cmd = cargo_bin_cmd!("wakeup");
    cmd.arg("--headless")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--api"));
}

#[test]
fn headless_help_explains_how_to_stop_cleanly() {
    let mut cmd = cargo_bin_cmd!("wakeup");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("/v1/shutdown"))
        .stdout(predicate::str::contains("SIGTERM"));
}

#[test]
fn console_reports_invalid_time_and_keeps_running() {
    let mut cmd = cargo_bin_cmd!("wakeup");
    cmd.args(["--command", "true"])
        .write_stdin("start 25:99 XM\nshow\nquit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("status: "))
        .stdout(predicate::str::contains("time:    25:99 XM"))
        .stderr(predicate::str::contains("Invalid time"))
        .stderr(predicate::str::contains("3:04 PM"));
}

#[test]
fn armed_alarm_is_cancelled_on_quit() {
    let mut cmd = cargo_bin_cmd!("wakeup");
    cmd.args(["--arm", "--time", "11:59 PM", "--command", "true"])
        .write_stdin("quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("alarm set for"))
        .stdout(predicate::str::contains("status: Started"));
}
