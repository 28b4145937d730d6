//! Integration tests for the `donapix` CLI binary.
//!
//! Argument parsing, help output, shell completions and error handling run
//! without a backend; checkout and status run against a wiremock server.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `donapix` binary with env isolation.
///
/// Clears all `DONAPIX_*` env vars and points config and data directories
/// at `home` so tests never touch the user's real configuration.
fn donapix_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("donapix");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env("NO_COLOR", "1")
        .env_remove("DONAPIX_PROFILE")
        .env_remove("DONAPIX_BACKEND_URL")
        .env_remove("DONAPIX_API_KEY")
        .env_remove("DONAPIX_OUTPUT")
        .env_remove("DONAPIX_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Run the binary off the async runtime so the mock server keeps serving.
async fn run_blocking(mut cmd: assert_cmd::Command) -> std::process::Output {
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

async fn backend() -> (MockServer, String) {
    let server = MockServer::start().await;
    let base = format!("{}/functions/v1", server.uri());
    (server, base)
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = tempfile::tempdir().unwrap();
    let output = donapix_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(
        text.contains("Usage"),
        "Expected 'Usage' in output:\n{text}"
    );
}

#[test]
fn test_help_flag() {
    let home = tempfile::tempdir().unwrap();
    donapix_cmd(home.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("PIX")
            .and(predicate::str::contains("checkout"))
            .and(predicate::str::contains("status"))
            .and(predicate::str::contains("config")),
    );
}

#[test]
fn test_version_flag() {
    let home = tempfile::tempdir().unwrap();
    donapix_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("donapix"));
}

#[test]
fn test_completions_bash() {
    let home = tempfile::tempdir().unwrap();
    donapix_cmd(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("donapix"));
}

// ── Usage errors ────────────────────────────────────────────────────

#[test]
fn test_checkout_without_backend_is_usage_error() {
    let home = tempfile::tempdir().unwrap();
    let output = donapix_cmd(home.path())
        .args(["checkout", "--amount", "50"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("No backend configured"), "got:\n{text}");
}

#[test]
fn test_checkout_rejects_invalid_amount() {
    let home = tempfile::tempdir().unwrap();
    let output = donapix_cmd(home.path())
        .args(["checkout", "--amount", "abc"])
        .args(["--backend-url", "http://127.0.0.1:9/functions/v1"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("amount"));
}

#[test]
fn test_unknown_profile_lists_available() {
    let home = tempfile::tempdir().unwrap();
    let output = donapix_cmd(home.path())
        .args(["--profile", "nope", "status", "tx_1"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Profile 'nope' not found"));
}

#[test]
fn test_utm_needs_key_value() {
    let home = tempfile::tempdir().unwrap();
    donapix_cmd(home.path())
        .args(["checkout", "--amount", "10", "--utm", "no-equals-sign"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_points_into_config_home() {
    let home = tempfile::tempdir().unwrap();
    donapix_cmd(home.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_init_then_show() {
    let home = tempfile::tempdir().unwrap();
    donapix_cmd(home.path())
        .args(["config", "init", "--pixel", "123", "--content-name", "Doação"])
        .args(["--backend-url", "https://pix.example/functions/v1"])
        .assert()
        .success();

    donapix_cmd(home.path())
        .args(["config", "show", "-o", "json"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("https://pix.example/functions/v1")
                .and(predicate::str::contains("\"123\"")),
        );

    // A second init for the same profile needs --force.
    donapix_cmd(home.path())
        .args(["config", "init", "--backend-url", "https://other.example"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn test_config_init_requires_backend_url() {
    let home = tempfile::tempdir().unwrap();
    donapix_cmd(home.path())
        .args(["config", "init"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("backend-url"));
}

// ── Backend round trips ─────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_status_reports_paid() {
    let (server, base) = backend().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/check-pix-status"))
        .and(body_partial_json(json!({ "transactionId": "tx_9" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "paid" })))
        .expect(1)
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    let mut cmd = donapix_cmd(home.path());
    cmd.args(["status", "tx_9", "-o", "plain", "--backend-url", &base]);
    let output = run_blocking(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "paid");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_checkout_waits_until_paid() {
    let (server, base) = backend().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/generate-pix"))
        .and(body_partial_json(json!({
            "amount": 25.9,
            "customerName": "Ana Souza",
            "utmParams": { "utm_source": "instagram" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pixCode": "00020126580014br.gov.bcb.pix",
            "transactionId": "tx_1"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/check-pix-status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "paid" })))
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    let mut cmd = donapix_cmd(home.path());
    cmd.env("DONAPIX_DEFAULTS__POLL_INTERVAL_SECS", "1")
        .args(["checkout", "--amount", "25,90", "--name", "Ana Souza"])
        .args(["--utm", "utm_source=instagram", "-o", "json-compact"])
        .args(["--backend-url", &base]);
    let output = run_blocking(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("\"transactionId\":\"tx_1\""),
        "got:\n{stdout}"
    );
    assert!(stdout.contains("\"status\":\"paid\""), "got:\n{stdout}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_checkout_no_wait_prints_code() {
    let (server, base) = backend().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/generate-pix"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pixCode": "00020126580014br.gov.bcb.pix",
            "transactionId": "tx_2"
        })))
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    let mut cmd = donapix_cmd(home.path());
    cmd.args(["checkout", "-a", "10", "--no-wait", "-o", "plain"])
        .args(["--backend-url", &base]);
    let output = run_blocking(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "00020126580014br.gov.bcb.pix"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_checkout_rate_limit_exit_code() {
    let (server, base) = backend().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/generate-pix"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": "RATE_LIMIT",
            "message": "Aguarde alguns minutos"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    let mut cmd = donapix_cmd(home.path());
    cmd.args(["checkout", "-a", "10", "--backend-url", &base]);
    let output = run_blocking(cmd).await;

    assert_eq!(output.status.code(), Some(9));
    assert!(combined_output(&output).contains("Aguarde alguns minutos"));
}

/// Mount one `generate-pix` mock per campaign source, each expected once.
async fn mount_charge_per_source(server: &MockServer, sources: &[&str]) {
    for source in sources {
        Mock::given(method("POST"))
            .and(path("/functions/v1/generate-pix"))
            .and(body_partial_json(json!({ "utmParams": { "utm_source": source } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "pixCode": format!("000201-{source}"),
                "transactionId": format!("tx_{source}")
            })))
            .expect(1)
            .mount(server)
            .await;
    }
}

fn checkout_from(home: &Path, base: &str, landing: &str) -> assert_cmd::Command {
    let mut cmd = donapix_cmd(home);
    cmd.args(["checkout", "-a", "10", "--no-wait", "-o", "plain"])
        .args(["--landing-url", landing, "--backend-url", base]);
    cmd
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_owned()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_new_session_forgets_captured_tags() {
    let (server, base) = backend().await;
    mount_charge_per_source(&server, &["old", "new"]).await;
    let home = tempfile::tempdir().unwrap();

    let first = checkout_from(home.path(), &base, "https://doe.example/?utm_source=old");
    let output = run_blocking(first).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(stdout_of(&output), "000201-old");

    let mut second = checkout_from(home.path(), &base, "https://doe.example/?utm_source=new");
    second.arg("--new-session");
    let output = run_blocking(second).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(stdout_of(&output), "000201-new");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_expired_attribution_is_not_reused() {
    let (server, base) = backend().await;
    mount_charge_per_source(&server, &["old", "new"]).await;
    let home = tempfile::tempdir().unwrap();

    let mut first = checkout_from(home.path(), &base, "https://doe.example/?utm_source=old");
    first.env("DONAPIX_DEFAULTS__ATTRIBUTION_TTL_SECS", "0");
    let output = run_blocking(first).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(stdout_of(&output), "000201-old");

    let mut second = checkout_from(home.path(), &base, "https://doe.example/?utm_source=new");
    second.env("DONAPIX_DEFAULTS__ATTRIBUTION_TTL_SECS", "0");
    let output = run_blocking(second).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(stdout_of(&output), "000201-new");
}
