//! Integration tests for pagecast-account

use assert_cmd::Command;
use libpagecast::types::Recurrence;
use libpagecast::{Credits, Database};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn escape_path_for_toml(path: &std::path::Path) -> String {
    path.display().to_string().replace('\\', "/")
}

struct TestEnv {
    _temp_dir: TempDir,
    config_path: String,
    db_path: String,
}

impl TestEnv {
    fn account(&self) -> Command {
        let mut cmd = Command::cargo_bin("pagecast-account").unwrap();
        cmd.env("PAGECAST_CONFIG", &self.config_path)
            .env_remove("PAGECAST_DB_PATH")
            .env_remove("PAGECAST_PAGE_TOKEN")
            .env_remove("RUST_LOG");
        cmd
    }

    async fn db(&self) -> Database {
        Database::new(&self.db_path).await.unwrap()
    }

    /// Create an account through the CLI, returning its id
    fn create(&self, email: &str) -> String {
        let output = self
            .account()
            .args(["create", email])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        String::from_utf8(output).unwrap().trim().to_string()
    }
}

fn setup_test_env() -> TestEnv {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("test.db");

    fs::write(
        &config_path,
        format!(
            "[database]\npath = \"{}\"\n\n[credits]\ntrial_grant = 3\n",
            escape_path_for_toml(&db_path)
        ),
    )
    .unwrap();

    TestEnv {
        _temp_dir: temp_dir,
        config_path: config_path.to_string_lossy().into_owned(),
        db_path: db_path.to_string_lossy().into_owned(),
    }
}

#[tokio::test]
async fn test_create_grants_configured_trial() {
    let env = setup_test_env();
    let id = env.create("Owner@Example.com");

    let account = env.db().await.get_account(&id).await.unwrap().unwrap();
    assert_eq!(account.email, "owner@example.com");
    assert_eq!(account.balance, Credits::from_whole(3));

    env.account()
        .args(["show", "owner@example.com"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Balance:    3.00 credits"))
        .stdout(predicate::str::contains("no page"));
}

#[test]
fn test_duplicate_email_rejected() {
    let env = setup_test_env();
    env.create("owner@example.com");

    env.account()
        .args(["create", "owner@example.com"])
        .assert()
        .failure();
}

#[test]
fn test_invalid_email_rejected() {
    let env = setup_test_env();

    env.account()
        .args(["create", "not-an-email"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("not a valid email"));
}

#[tokio::test]
async fn test_profile_and_onboarding() {
    let env = setup_test_env();
    let id = env.create("owner@example.com");

    env.account()
        .args(["onboard", "owner@example.com"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("missing business summary and post style"));

    env.account()
        .args([
            "profile",
            "owner@example.com",
            "--summary",
            "Sourdough bakery",
            "--style",
            "Warm and short",
            "--recurrence",
            "custom",
            "--every-days",
            "3",
            "--time",
            "07:45",
            "--utc-offset",
            "-300",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("every 3 days at 07:45 (UTC-05:00)"));

    env.account()
        .args(["onboard", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("is onboarded"));

    let account = env.db().await.get_account(&id).await.unwrap().unwrap();
    assert!(account.onboarded);
    assert_eq!(account.recurrence, Recurrence::Custom);
    assert_eq!(account.custom_recurrence_days, 3);
    assert_eq!(account.utc_offset_minutes, -300);
}

#[test]
fn test_profile_rejects_bad_values() {
    let env = setup_test_env();
    env.create("owner@example.com");

    for args in [
        ["--time", "7pm"],
        ["--recurrence", "hourly"],
        ["--every-days", "0"],
        ["--every-days", "100000000"],
    ] {
        env.account()
            .args(["profile", "owner@example.com"])
            .args(args)
            .assert()
            .failure()
            .code(3);
    }
}

#[tokio::test]
async fn test_connect_page_with_token_from_env() {
    let env = setup_test_env();
    let id = env.create("owner@example.com");

    env.account()
        .env("PAGECAST_PAGE_TOKEN", "EAAB-secret")
        .args([
            "connect-page",
            "owner@example.com",
            "--page-id",
            "1234567890",
            "--page-name",
            "Corner Bakery",
            "--expires",
            "60d",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Connected page 1234567890"))
        .stdout(predicate::str::contains("EAAB-secret").not());

    let db = env.db().await;
    let account = db.get_account(&id).await.unwrap().unwrap();
    assert_eq!(account.page_id.as_deref(), Some("1234567890"));
    assert!(account.token_expires_at.unwrap() > chrono::Utc::now().timestamp());
    assert!(db.get_credentials(&id).await.unwrap().is_some());

    // The token never appears in account output
    env.account()
        .args(["show", "owner@example.com", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("EAAB-secret").not());
}

#[test]
fn test_connect_page_requires_token() {
    let env = setup_test_env();
    env.create("owner@example.com");

    env.account()
        .args(["connect-page", "owner@example.com", "--page-id", "1"])
        .assert()
        .failure();
}

#[test]
fn test_list_accounts() {
    let env = setup_test_env();
    env.create("a@example.com");
    env.create("b@example.com");

    let output = env
        .account()
        .args(["list", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let accounts: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(accounts.as_array().unwrap().len(), 2);
}
