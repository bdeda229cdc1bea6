//! Credit ledger
//!
//! Each account has an append-only list of entries and a cached balance on
//! the account row. Both are written in the same transaction, and a debit is
//! a single conditional update (`balance = balance - ? WHERE balance >= ?`),
//! so two concurrent debits can never overdraw an account.

use serde::Serialize;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{DbError, LedgerError, Result};
use crate::types::{Credits, EntryKind, LedgerEntry, Post};

/// A ledger write, before it has an id
#[derive(Debug, Clone)]
pub struct EntryRequest<'a> {
    pub account_id: &'a str,
    /// Magnitude; the sign comes from debit vs credit
    pub amount: Credits,
    pub kind: EntryKind,
    pub description: &'a str,
    pub post_id: Option<&'a str>,
    pub payment_ref: Option<&'a str>,
}

/// Balance with lifetime totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreditSummary {
    pub balance: Credits,
    pub purchased: Credits,
    pub granted: Credits,
    /// Generation charges net of refunds
    pub used: Credits,
}

#[derive(Clone)]
pub struct Ledger {
    db: Database,
}

impl Ledger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Take `amount` from the account, failing with `InsufficientBalance`
    /// without writing anything if the balance does not cover it
    pub async fn debit(&self, account_id: &str, amount: Credits, description: &str) -> Result<i64> {
        let mut tx = self.db.begin().await?;
        let entry = apply_debit(
            &mut tx,
            &EntryRequest {
                account_id,
                amount,
                kind: EntryKind::Generation,
                description,
                post_id: None,
                payment_ref: None,
            },
        )
        .await?;
        tx.commit().await?;
        Ok(entry.id)
    }

    /// Add `amount` to the account as a purchase without external reference
    pub async fn credit(&self, account_id: &str, amount: Credits, description: &str) -> Result<i64> {
        self.purchase(account_id, amount, description, None).await
    }

    /// Add purchased credits, keeping the external payment reference
    pub async fn purchase(
        &self,
        account_id: &str,
        amount: Credits,
        description: &str,
        payment_ref: Option<&str>,
    ) -> Result<i64> {
        let mut tx = self.db.begin().await?;
        let entry = apply_credit(
            &mut tx,
            &EntryRequest {
                account_id,
                amount,
                kind: EntryKind::Purchase,
                description,
                post_id: None,
                payment_ref,
            },
        )
        .await?;
        tx.commit().await?;
        info!(account_id, amount = %amount, balance = %entry.balance_after, "Credits purchased");
        Ok(entry.id)
    }

    /// Cached balance of the account
    pub async fn balance(&self, account_id: &str) -> Result<Credits> {
        let row = sqlx::query("SELECT balance FROM accounts WHERE id = ?")
            .bind(account_id)
            .fetch_optional(self.db.pool())
            .await?;
        row.map(|r| Credits::from_hundredths(r.get("balance")))
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()).into())
    }

    /// Entries of the account, newest first
    pub async fn history(&self, account_id: &str, limit: u32) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, amount, balance_after, kind, description, post_id,
                   payment_ref, created_at
            FROM ledger_entries
            WHERE account_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(account_id)
        .bind(i64::from(limit))
        .fetch_all(self.db.pool())
        .await?;
        rows.iter().map(row_to_entry).collect()
    }

    /// Sum of all entries of the account, independent of the cached balance
    pub async fn sum_entries(&self, account_id: &str) -> Result<Credits> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount), 0) AS total FROM ledger_entries WHERE account_id = ?",
        )
        .bind(account_id)
        .fetch_one(self.db.pool())
        .await?;
        Ok(Credits::from_hundredths(row.get("total")))
    }

    /// Totals per kind of movement, for the balance screen
    pub async fn summary(&self, account_id: &str) -> Result<CreditSummary> {
        let balance = self.balance(account_id).await?;
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN kind = 'purchase' THEN amount END), 0) AS purchased,
                COALESCE(SUM(CASE WHEN kind = 'trial' THEN amount END), 0) AS granted,
                COALESCE(SUM(CASE WHEN kind IN ('generation', 'refund') THEN amount END), 0) AS spent
            FROM ledger_entries
            WHERE account_id = ?
            "#,
        )
        .bind(account_id)
        .fetch_one(self.db.pool())
        .await?;

        Ok(CreditSummary {
            balance,
            purchased: Credits::from_hundredths(row.get("purchased")),
            granted: Credits::from_hundredths(row.get("granted")),
            used: -Credits::from_hundredths(row.get("spent")),
        })
    }

    /// Entries that reference a post, oldest first
    pub async fn entries_for_post(&self, post_id: &str) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, amount, balance_after, kind, description, post_id,
                   payment_ref, created_at
            FROM ledger_entries
            WHERE post_id = ?
            ORDER BY id
            "#,
        )
        .bind(post_id)
        .fetch_all(self.db.pool())
        .await?;
        rows.iter().map(row_to_entry).collect()
    }
}

/// Debit inside an open transaction
pub(crate) async fn apply_debit(
    conn: &mut SqliteConnection,
    request: &EntryRequest<'_>,
) -> Result<LedgerEntry> {
    if !request.amount.is_positive() {
        return Err(LedgerError::NonPositiveAmount(request.amount).into());
    }

    let updated = sqlx::query(
        r#"
        UPDATE accounts SET balance = balance - ?, updated_at = ?
        WHERE id = ? AND balance >= ?
        RETURNING balance
        "#,
    )
    .bind(request.amount.hundredths())
    .bind(now())
    .bind(request.account_id)
    .bind(request.amount.hundredths())
    .fetch_optional(&mut *conn)
    .await?;

    let balance_after = match updated {
        Some(row) => Credits::from_hundredths(row.get("balance")),
        None => {
            let balance = current_balance(conn, request.account_id).await?;
            debug!(
                account_id = request.account_id,
                balance = %balance,
                requested = %request.amount,
                "Debit rejected"
            );
            return Err(LedgerError::InsufficientBalance {
                account_id: request.account_id.to_string(),
                balance,
                requested: request.amount,
            }
            .into());
        }
    };

    insert_entry(conn, request, -request.amount, balance_after).await
}

/// Credit inside an open transaction
pub(crate) async fn apply_credit(
    conn: &mut SqliteConnection,
    request: &EntryRequest<'_>,
) -> Result<LedgerEntry> {
    if !request.amount.is_positive() {
        return Err(LedgerError::NonPositiveAmount(request.amount).into());
    }

    let updated = sqlx::query(
        r#"
        UPDATE accounts SET balance = balance + ?, updated_at = ?
        WHERE id = ?
        RETURNING balance
        "#,
    )
    .bind(request.amount.hundredths())
    .bind(now())
    .bind(request.account_id)
    .fetch_optional(&mut *conn)
    .await?;

    let balance_after = updated
        .map(|row| Credits::from_hundredths(row.get("balance")))
        .ok_or_else(|| LedgerError::AccountNotFound(request.account_id.to_string()))?;

    insert_entry(conn, request, request.amount, balance_after).await
}

/// Return what a post was charged; no-op when nothing was charged
pub(crate) async fn refund_for_post(
    conn: &mut SqliteConnection,
    post: &Post,
    reason: &str,
) -> Result<Option<LedgerEntry>> {
    if !post.credits_charged.is_positive() {
        return Ok(None);
    }
    let description = format!("Refund: {}", reason);
    let entry = apply_credit(
        conn,
        &EntryRequest {
            account_id: &post.account_id,
            amount: post.credits_charged,
            kind: EntryKind::Refund,
            description: &description,
            post_id: Some(&post.id),
            payment_ref: None,
        },
    )
    .await?;
    Ok(Some(entry))
}

async fn current_balance(conn: &mut SqliteConnection, account_id: &str) -> Result<Credits> {
    let row = sqlx::query("SELECT balance FROM accounts WHERE id = ?")
        .bind(account_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|r| Credits::from_hundredths(r.get("balance")))
        .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()).into())
}

async fn insert_entry(
    conn: &mut SqliteConnection,
    request: &EntryRequest<'_>,
    signed_amount: Credits,
    balance_after: Credits,
) -> Result<LedgerEntry> {
    let created_at = now();
    let row = sqlx::query(
        r#"
        INSERT INTO ledger_entries (
            account_id, amount, balance_after, kind, description, post_id, payment_ref, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(request.account_id)
    .bind(signed_amount.hundredths())
    .bind(balance_after.hundredths())
    .bind(request.kind.as_str())
    .bind(request.description)
    .bind(request.post_id)
    .bind(request.payment_ref)
    .bind(created_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(LedgerEntry {
        id: row.get("id"),
        account_id: request.account_id.to_string(),
        amount: signed_amount,
        balance_after,
        kind: request.kind,
        description: request.description.to_string(),
        post_id: request.post_id.map(str::to_string),
        payment_ref: request.payment_ref.map(str::to_string),
        created_at,
    })
}

fn row_to_entry(r: &SqliteRow) -> Result<LedgerEntry> {
    let id: i64 = r.get("id");
    let kind: String = r.get("kind");
    let kind = kind
        .parse()
        .map_err(|_| DbError::Corrupt(format!("ledger entry {} has unknown kind '{}'", id, kind)))?;

    Ok(LedgerEntry {
        id,
        account_id: r.get("account_id"),
        amount: Credits::from_hundredths(r.get("amount")),
        balance_after: Credits::from_hundredths(r.get("balance_after")),
        kind,
        description: r.get("description"),
        post_id: r.get("post_id"),
        payment_ref: r.get("payment_ref"),
        created_at: r.get("created_at"),
    })
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
