//! Database operations for Pagecast
//!
//! Post state transitions are compare-and-set updates guarded by the current
//! status (`... WHERE id = ? AND status = ?`). They take a connection so the
//! caller can combine them with ledger writes in one transaction. Every
//! transaction opens with a write so SQLite takes the write lock up front and
//! concurrent writers queue on the busy timeout.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::{Row, Sqlite, Transaction};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::error::{DbError, PagecastError, Result};
use crate::ledger::{self, EntryRequest};
use crate::publishing::AccountCredentials;
use crate::types::{Account, Credits, EntryKind, ImageRef, Post, PostStatus, Recurrence};

const POST_COLUMNS: &str = "id, account_id, scheduled_at, status, caption, image_prompt, image_ref, \
     platform_post_id, post_url, error_kind, error_message, credits_charged, debit_attempts, \
     created_at, updated_at, posted_at";

const ACCOUNT_COLUMNS: &str = "id, email, name, page_id, page_name, token_expires_at, needs_reauth, \
     business_summary, post_style, recurrence, custom_recurrence_days, preferred_time, \
     utc_offset_minutes, onboarded, balance, created_at, updated_at";

/// Filter for listing posts
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub account_id: Option<String>,
    pub status: Option<PostStatus>,
    pub limit: Option<u32>,
}

/// Post counts per status
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueStats {
    pub scheduled: i64,
    pub generating: i64,
    pub ready: i64,
    pub posting: i64,
    pub posted: i64,
    pub failed: i64,
    pub cancelled: i64,
    /// Earliest `scheduled_at` among posts still waiting to be processed
    pub next_due: Option<i64>,
}

impl QueueStats {
    pub fn count(&self, status: PostStatus) -> i64 {
        match status {
            PostStatus::Scheduled => self.scheduled,
            PostStatus::Generating => self.generating,
            PostStatus::Ready => self.ready,
            PostStatus::Posting => self.posting,
            PostStatus::Posted => self.posted,
            PostStatus::Failed => self.failed,
            PostStatus::Cancelled => self.cancelled,
        }
    }

    pub fn total(&self) -> i64 {
        PostStatus::ALL.iter().map(|s| self.count(*s)).sum()
    }

    fn set(&mut self, status: PostStatus, count: i64) {
        match status {
            PostStatus::Scheduled => self.scheduled = count,
            PostStatus::Generating => self.generating = count,
            PostStatus::Ready => self.ready = count,
            PostStatus::Posting => self.posting = count,
            PostStatus::Posted => self.posted = count,
            PostStatus::Failed => self.failed = count,
            PostStatus::Cancelled => self.cancelled = count,
        }
    }
}

/// Partial update of an account's business profile and cadence
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub business_summary: Option<String>,
    pub post_style: Option<String>,
    pub recurrence: Option<Recurrence>,
    pub custom_recurrence_days: Option<i64>,
    pub preferred_time: Option<String>,
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    // ------------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------------

    /// Insert a new account and grant it `trial_grant` credits
    pub async fn create_account(&self, account: &Account, trial_grant: Credits) -> Result<()> {
        let mut tx = self.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO accounts (
                id, email, name, recurrence, custom_recurrence_days, preferred_time,
                utc_offset_minutes, onboarded, balance, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.email)
        .bind(&account.name)
        .bind(account.recurrence.as_str())
        .bind(account.custom_recurrence_days)
        .bind(&account.preferred_time)
        .bind(account.utc_offset_minutes)
        .bind(account.onboarded)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(sqlx::Error::Database(db_err)) = &inserted {
            if db_err.is_unique_violation() {
                return Err(PagecastError::InvalidInput(format!(
                    "An account with email '{}' already exists",
                    account.email
                )));
            }
        }
        inserted?;

        if trial_grant.is_positive() {
            ledger::apply_credit(
                &mut tx,
                &EntryRequest {
                    account_id: &account.id,
                    amount: trial_grant,
                    kind: EntryKind::Trial,
                    description: "Trial credits",
                    post_id: None,
                    payment_ref: None,
                },
            )
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_account(&self, account_id: &str) -> Result<Option<Account>> {
        let query = format!("SELECT {} FROM accounts WHERE id = ?", ACCOUNT_COLUMNS);
        let row = sqlx::query(&query)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_account).transpose()
    }

    pub async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        let query = format!("SELECT {} FROM accounts WHERE email = ?", ACCOUNT_COLUMNS);
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_account).transpose()
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let query = format!("SELECT {} FROM accounts ORDER BY created_at, email", ACCOUNT_COLUMNS);
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_account).collect()
    }

    /// Store page credentials and clear any re-authentication flag
    pub async fn connect_page(
        &self,
        account_id: &str,
        page_id: &str,
        page_name: Option<&str>,
        access_token: &str,
        expires_at: Option<i64>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET page_id = ?, page_name = ?, page_access_token = ?, token_expires_at = ?,
                needs_reauth = 0, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(page_id)
        .bind(page_name)
        .bind(access_token)
        .bind(expires_at)
        .bind(now())
        .bind(account_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Load the page credentials of an account, if a page is connected
    pub async fn get_credentials(&self, account_id: &str) -> Result<Option<AccountCredentials>> {
        let row = sqlx::query(
            "SELECT page_id, page_access_token, token_expires_at FROM accounts WHERE id = ?",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|r| {
            let page_id: Option<String> = r.get("page_id");
            let token: Option<String> = r.get("page_access_token");
            match (page_id, token) {
                (Some(page_id), Some(token)) => Some(AccountCredentials::new(
                    page_id,
                    token,
                    r.get("token_expires_at"),
                )),
                _ => None,
            }
        }))
    }

    pub async fn update_profile(&self, account_id: &str, update: &ProfileUpdate) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE accounts SET
                name = COALESCE(?, name),
                business_summary = COALESCE(?, business_summary),
                post_style = COALESCE(?, post_style),
                recurrence = COALESCE(?, recurrence),
                custom_recurrence_days = COALESCE(?, custom_recurrence_days),
                preferred_time = COALESCE(?, preferred_time),
                utc_offset_minutes = COALESCE(?, utc_offset_minutes),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&update.name)
        .bind(&update.business_summary)
        .bind(&update.post_style)
        .bind(update.recurrence.map(|r| r.as_str()))
        .bind(update.custom_recurrence_days)
        .bind(&update.preferred_time)
        .bind(update.utc_offset_minutes)
        .bind(now())
        .bind(account_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn set_onboarded(&self, account_id: &str, onboarded: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE accounts SET onboarded = ?, updated_at = ? WHERE id = ?")
            .bind(onboarded)
            .bind(now())
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    // ------------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------------

    pub async fn create_post(&self, post: &Post) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        insert_post(&mut conn, post).await
    }

    /// Insert several posts atomically
    pub async fn create_posts(&self, posts: &[Post]) -> Result<()> {
        let mut tx = self.begin().await?;
        for post in posts {
            insert_post(&mut tx, post).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let mut conn = self.pool.acquire().await?;
        fetch_post(&mut conn, post_id).await
    }

    pub async fn list_posts(&self, filter: &PostFilter) -> Result<Vec<Post>> {
        let mut where_clauses = vec!["1=1"];
        if filter.account_id.is_some() {
            where_clauses.push("account_id = ?");
        }
        if filter.status.is_some() {
            where_clauses.push("status = ?");
        }

        let query_str = format!(
            "SELECT {} FROM posts WHERE {} ORDER BY scheduled_at, created_at LIMIT ?",
            POST_COLUMNS,
            where_clauses.join(" AND ")
        );

        let mut query = sqlx::query(&query_str);
        if let Some(account_id) = &filter.account_id {
            query = query.bind(account_id);
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        query = query.bind(filter.limit.map(i64::from).unwrap_or(-1));

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_post).collect()
    }

    /// Posts whose time has come: `scheduled` ones to generate, `ready` ones to publish
    pub async fn get_due_posts(&self, now: i64, limit: u32) -> Result<Vec<Post>> {
        let query = format!(
            r#"
            SELECT {} FROM posts
            WHERE status IN ('scheduled', 'ready') AND scheduled_at <= ?
            ORDER BY scheduled_at, created_at
            LIMIT ?
            "#,
            POST_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(now)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_post).collect()
    }

    /// In-flight posts not touched since `cutoff`
    pub async fn get_stale_posts(&self, cutoff: i64) -> Result<Vec<Post>> {
        let query = format!(
            r#"
            SELECT {} FROM posts
            WHERE status IN ('generating', 'posting') AND updated_at < ?
            ORDER BY updated_at
            "#,
            POST_COLUMNS
        );
        let rows = sqlx::query(&query).bind(cutoff).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_post).collect()
    }

    /// Timestamps already held by a live post of the account
    ///
    /// Failed and cancelled posts free their slot.
    pub async fn occupied_slots(&self, account_id: &str) -> Result<HashSet<i64>> {
        let rows = sqlx::query(
            r#"
            SELECT scheduled_at FROM posts
            WHERE account_id = ? AND status NOT IN ('failed', 'cancelled')
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get::<i64, _>("scheduled_at")).collect())
    }

    /// 1-based position of a post in its account's timeline, used to vary prompts
    pub async fn post_number(&self, post: &Post) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM posts
            WHERE account_id = ? AND status != 'cancelled'
              AND (scheduled_at < ? OR (scheduled_at = ? AND created_at <= ?))
            "#,
        )
        .bind(&post.account_id)
        .bind(post.scheduled_at)
        .bind(post.scheduled_at)
        .bind(post.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("n").max(1))
    }

    pub async fn queue_stats(&self, account_id: Option<&str>) -> Result<QueueStats> {
        let (where_clause, bind) = match account_id {
            Some(id) => ("WHERE account_id = ?", Some(id)),
            None => ("", None),
        };

        let query_str = format!(
            "SELECT status, COUNT(*) AS n FROM posts {} GROUP BY status",
            where_clause
        );
        let mut query = sqlx::query(&query_str);
        if let Some(id) = bind {
            query = query.bind(id);
        }

        let mut stats = QueueStats::default();
        for row in query.fetch_all(&self.pool).await? {
            let status: String = row.get("status");
            let status: PostStatus = status
                .parse()
                .map_err(|_| DbError::Corrupt(format!("unknown post status '{}'", status)))?;
            stats.set(status, row.get("n"));
        }

        let next_query = format!(
            "SELECT MIN(scheduled_at) AS next_due FROM posts WHERE status IN ('scheduled', 'ready') {}",
            if bind.is_some() { "AND account_id = ?" } else { "" }
        );
        let mut query = sqlx::query(&next_query);
        if let Some(id) = bind {
            query = query.bind(id);
        }
        stats.next_due = query.fetch_one(&self.pool).await?.get("next_due");

        Ok(stats)
    }
}

// ----------------------------------------------------------------------------
// Transition helpers
//
// Each returns whether the guarded update matched, i.e. whether the post was
// still in the expected state.
// ----------------------------------------------------------------------------

pub(crate) async fn insert_post(conn: &mut SqliteConnection, post: &Post) -> Result<()> {
    let image_json = post.image.as_ref().map(image_to_json).transpose()?;

    sqlx::query(
        r#"
        INSERT INTO posts (
            id, account_id, scheduled_at, status, caption, image_prompt, image_ref,
            platform_post_id, post_url, error_kind, error_message, credits_charged,
            debit_attempts, created_at, updated_at, posted_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&post.id)
    .bind(&post.account_id)
    .bind(post.scheduled_at)
    .bind(post.status.as_str())
    .bind(&post.caption)
    .bind(&post.image_prompt)
    .bind(image_json)
    .bind(&post.platform_post_id)
    .bind(&post.post_url)
    .bind(&post.error_kind)
    .bind(&post.error_message)
    .bind(post.credits_charged.hundredths())
    .bind(post.debit_attempts)
    .bind(post.created_at)
    .bind(post.updated_at)
    .bind(post.posted_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn fetch_post(conn: &mut SqliteConnection, post_id: &str) -> Result<Option<Post>> {
    let query = format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS);
    let row = sqlx::query(&query)
        .bind(post_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_post).transpose()
}

/// `scheduled -> generating`, recording what the claim charged
pub(crate) async fn claim_for_generation(
    conn: &mut SqliteConnection,
    post_id: &str,
    charge: Credits,
    now: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE posts SET status = 'generating', credits_charged = ?, updated_at = ?
        WHERE id = ? AND status = 'scheduled'
        "#,
    )
    .bind(charge.hundredths())
    .bind(now)
    .bind(post_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Count a failed debit; returns the new attempt count, or None if the post moved on
pub(crate) async fn bump_debit_attempts(
    conn: &mut SqliteConnection,
    post_id: &str,
    now: i64,
) -> Result<Option<i64>> {
    let row = sqlx::query(
        r#"
        UPDATE posts SET debit_attempts = debit_attempts + 1, updated_at = ?
        WHERE id = ? AND status = 'scheduled'
        RETURNING debit_attempts
        "#,
    )
    .bind(now)
    .bind(post_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|r| r.get("debit_attempts")))
}

/// `generating -> ready` with the generated artifacts
pub(crate) async fn record_generated(
    conn: &mut SqliteConnection,
    post_id: &str,
    caption: &str,
    image_prompt: &str,
    image: &ImageRef,
    now: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE posts
        SET status = 'ready', caption = ?, image_prompt = ?, image_ref = ?,
            error_kind = NULL, error_message = NULL, updated_at = ?
        WHERE id = ? AND status = 'generating'
        "#,
    )
    .bind(caption)
    .bind(image_prompt)
    .bind(image_to_json(image)?)
    .bind(now)
    .bind(post_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// `ready -> posting`
pub(crate) async fn claim_for_publishing(
    conn: &mut SqliteConnection,
    post_id: &str,
    now: i64,
) -> Result<bool> {
    move_status(conn, post_id, PostStatus::Ready, PostStatus::Posting, now).await
}

/// `posting -> posted`
pub(crate) async fn record_published(
    conn: &mut SqliteConnection,
    post_id: &str,
    platform_post_id: &str,
    url: &str,
    now: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE posts
        SET status = 'posted', platform_post_id = ?, post_url = ?, posted_at = ?,
            error_kind = NULL, error_message = NULL, updated_at = ?
        WHERE id = ? AND status = 'posting'
        "#,
    )
    .bind(platform_post_id)
    .bind(url)
    .bind(now)
    .bind(now)
    .bind(post_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// `from -> failed` with an error kind and message
pub(crate) async fn fail_post(
    conn: &mut SqliteConnection,
    post_id: &str,
    from: PostStatus,
    error_kind: &str,
    error_message: &str,
    now: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE posts SET status = 'failed', error_kind = ?, error_message = ?, updated_at = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(error_kind)
    .bind(error_message)
    .bind(now)
    .bind(post_id)
    .bind(from.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Plain status move with no other column changes
pub(crate) async fn move_status(
    conn: &mut SqliteConnection,
    post_id: &str,
    from: PostStatus,
    to: PostStatus,
    now: i64,
) -> Result<bool> {
    let result = sqlx::query("UPDATE posts SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
        .bind(to.as_str())
        .bind(now)
        .bind(post_id)
        .bind(from.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Move a post to `to` at a new time, clearing its last error
///
/// Returning to `scheduled` also resets the debit attempt counter.
pub(crate) async fn reschedule_post(
    conn: &mut SqliteConnection,
    post_id: &str,
    from: PostStatus,
    to: PostStatus,
    scheduled_at: i64,
    now: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE posts
        SET status = ?, scheduled_at = ?, error_kind = NULL, error_message = NULL,
            debit_attempts = CASE WHEN ? = 'scheduled' THEN 0 ELSE debit_attempts END,
            updated_at = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(to.as_str())
    .bind(scheduled_at)
    .bind(to.as_str())
    .bind(now)
    .bind(post_id)
    .bind(from.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub(crate) async fn mark_needs_reauth(conn: &mut SqliteConnection, account_id: &str, now: i64) -> Result<()> {
    sqlx::query("UPDATE accounts SET needs_reauth = 1, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(account_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// ----------------------------------------------------------------------------
// Row mapping
// ----------------------------------------------------------------------------

fn image_to_json(image: &ImageRef) -> Result<String> {
    serde_json::to_string(image)
        .map_err(|e| DbError::Corrupt(format!("cannot encode image reference: {}", e)).into())
}

fn row_to_post(r: &SqliteRow) -> Result<Post> {
    let id: String = r.get("id");
    let status: String = r.get("status");
    let status = status
        .parse()
        .map_err(|_| DbError::Corrupt(format!("post {} has unknown status '{}'", id, status)))?;
    let image = r
        .get::<Option<String>, _>("image_ref")
        .map(|json| serde_json::from_str::<ImageRef>(&json))
        .transpose()
        .map_err(|e| DbError::Corrupt(format!("post {} has a bad image reference: {}", id, e)))?;

    Ok(Post {
        id,
        account_id: r.get("account_id"),
        scheduled_at: r.get("scheduled_at"),
        status,
        caption: r.get("caption"),
        image_prompt: r.get("image_prompt"),
        image,
        platform_post_id: r.get("platform_post_id"),
        post_url: r.get("post_url"),
        error_kind: r.get("error_kind"),
        error_message: r.get("error_message"),
        credits_charged: Credits::from_hundredths(r.get("credits_charged")),
        debit_attempts: r.get("debit_attempts"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
        posted_at: r.get("posted_at"),
    })
}

fn row_to_account(r: &SqliteRow) -> Result<Account> {
    let id: String = r.get("id");
    let recurrence: String = r.get("recurrence");
    let recurrence = recurrence.parse().map_err(|_| {
        DbError::Corrupt(format!("account {} has unknown recurrence '{}'", id, recurrence))
    })?;

    Ok(Account {
        id,
        email: r.get("email"),
        name: r.get("name"),
        page_id: r.get("page_id"),
        page_name: r.get("page_name"),
        token_expires_at: r.get("token_expires_at"),
        needs_reauth: r.get("needs_reauth"),
        business_summary: r.get("business_summary"),
        post_style: r.get("post_style"),
        recurrence,
        custom_recurrence_days: r.get("custom_recurrence_days"),
        preferred_time: r.get("preferred_time"),
        utc_offset_minutes: r.get("utc_offset_minutes"),
        onboarded: r.get("onboarded"),
        balance: Credits::from_hundredths(r.get("balance")),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
