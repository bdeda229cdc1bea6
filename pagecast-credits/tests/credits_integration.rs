//! Integration tests for pagecast-credits

use assert_cmd::Command;
use libpagecast::{Account, Credits, Database};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn escape_path_for_toml(path: &std::path::Path) -> String {
    path.display().to_string().replace('\\', "/")
}

async fn setup_test_env() -> (TempDir, String, Database) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("test.db");

    fs::write(
        &config_path,
        format!("[database]\npath = \"{}\"\n", escape_path_for_toml(&db_path)),
    )
    .unwrap();

    let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
    (temp_dir, config_path.to_string_lossy().into_owned(), db)
}

async fn create_account(db: &Database) -> Account {
    let account = Account::new("owner@example.com".to_string(), None);
    db.create_account(&account, Credits::from_whole(1)).await.unwrap();
    account
}

fn credits_cmd(config_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("pagecast-credits").unwrap();
    cmd.env("PAGECAST_CONFIG", config_path)
        .env_remove("PAGECAST_DB_PATH")
        .env_remove("RUST_LOG");
    cmd
}

#[tokio::test]
async fn test_balance_by_email_and_id() {
    let (_temp_dir, config_path, db) = setup_test_env().await;
    let account = create_account(&db).await;

    credits_cmd(&config_path)
        .args(["balance", "owner@example.com"])
        .assert()
        .success()
        .stdout("1.00\n");

    credits_cmd(&config_path)
        .args(["balance", &account.id])
        .assert()
        .success()
        .stdout("1.00\n");
}

#[tokio::test]
async fn test_balance_unknown_account() {
    let (_temp_dir, config_path, _db) = setup_test_env().await;

    credits_cmd(&config_path)
        .args(["balance", "nobody@example.com"])
        .assert()
        .failure()
        .code(3);
}

#[tokio::test]
async fn test_purchase_updates_balance_and_history() {
    let (_temp_dir, config_path, db) = setup_test_env().await;
    let account = create_account(&db).await;

    credits_cmd(&config_path)
        .args(["purchase", "owner@example.com", "30", "--payment-ref", "pi_123"])
        .assert()
        .success()
        .stdout(predicate::str::contains("balance is now 31.00"));

    let output = credits_cmd(&config_path)
        .args(["history", "owner@example.com", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let entries: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["kind"], "purchase");
    assert_eq!(entries[0]["payment_ref"], "pi_123");
    assert_eq!(entries[0]["amount"], 30.0);
    assert_eq!(entries[1]["kind"], "trial");

    let stored = db.get_account(&account.id).await.unwrap().unwrap();
    assert_eq!(stored.balance, Credits::from_whole(31));
}

#[tokio::test]
async fn test_purchase_rejects_bad_amounts() {
    let (_temp_dir, config_path, db) = setup_test_env().await;
    create_account(&db).await;

    for amount in ["0", "ten", "0.001"] {
        credits_cmd(&config_path)
            .args(["purchase", "owner@example.com", amount])
            .assert()
            .failure()
            .code(3);
    }
}

#[tokio::test]
async fn test_summary_json() {
    let (_temp_dir, config_path, db) = setup_test_env().await;
    create_account(&db).await;

    credits_cmd(&config_path)
        .args(["purchase", "owner@example.com", "10"])
        .assert()
        .success();

    let output = credits_cmd(&config_path)
        .args(["summary", "owner@example.com", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let summary: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(summary["balance"], 11.0);
    assert_eq!(summary["purchased"], 10.0);
    assert_eq!(summary["granted"], 1.0);
    assert_eq!(summary["used"], 0.0);
}

#[tokio::test]
async fn test_packages_price_list() {
    let (_temp_dir, config_path, _db) = setup_test_env().await;

    credits_cmd(&config_path)
        .arg("packages")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 credit = $0.14"))
        .stdout(predicate::str::contains("Agency"))
        .stdout(predicate::str::contains("$59.50 (15% off)"));
}

#[tokio::test]
async fn test_invalid_format_rejected() {
    let (_temp_dir, config_path, _db) = setup_test_env().await;

    credits_cmd(&config_path)
        .args(["packages", "--format", "yaml"])
        .assert()
        .failure()
        .code(3);
}
