//! Scheduling, cancelling and rescheduling posts

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::events::{Event, EventBus};
use crate::db::{self, Database, PostFilter, QueueStats};
use crate::ledger::Ledger;
use crate::scheduling::{cadence_dates, Cadence};
use crate::types::{Account, Post, PostStatus};
use crate::{Config, PagecastError, Result};

/// Result of a cancel request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Cancelled,
    /// The post was cancelled by an earlier request
    AlreadyCancelled,
}

#[derive(Clone)]
pub struct PostService {
    db: Database,
    config: Arc<Config>,
    events: EventBus,
}

impl PostService {
    pub fn new(db: Database, config: Arc<Config>, events: EventBus) -> Self {
        Self { db, config, events }
    }

    /// Create the next `count` posts of the account's cadence
    ///
    /// Times already held by a live post are skipped, so repeating the
    /// request never doubles a slot. Returns only the posts created.
    pub async fn schedule_cadence(&self, account_id: &str, count: Option<u32>) -> Result<Vec<Post>> {
        self.schedule_cadence_from(account_id, count, Utc::now()).await
    }

    pub async fn schedule_cadence_from(
        &self,
        account_id: &str,
        count: Option<u32>,
        start_from: DateTime<Utc>,
    ) -> Result<Vec<Post>> {
        let count = count.unwrap_or(self.config.scheduling.default_post_count);
        if count == 0 {
            return Err(PagecastError::InvalidInput("Post count must be at least 1".to_string()));
        }
        let account = self.schedulable_account(account_id).await?;

        let cadence = Cadence {
            recurrence: account.recurrence,
            custom_days: account.custom_recurrence_days,
            preferred_time: &account.preferred_time,
            utc_offset_minutes: account.utc_offset_minutes,
        };
        let occupied = self.db.occupied_slots(account_id).await?;
        let posts: Vec<Post> = cadence_dates(&cadence, start_from, count)?
            .into_iter()
            .map(|at| at.timestamp())
            .filter(|at| !occupied.contains(at))
            .map(|at| Post::new(account_id.to_string(), at))
            .collect();

        if posts.is_empty() {
            info!(account_id, "All cadence slots already scheduled");
            return Ok(posts);
        }

        self.db.create_posts(&posts).await?;
        info!(account_id, count = posts.len(), "Posts scheduled");
        self.events.emit(Event::PostsScheduled {
            account_id: account_id.to_string(),
            post_ids: posts.iter().map(|p| p.id.clone()).collect(),
        });
        Ok(posts)
    }

    /// Create one post at an explicit time
    pub async fn schedule_at(&self, account_id: &str, at: DateTime<Utc>) -> Result<Post> {
        ensure_future(at)?;
        self.schedulable_account(account_id).await?;

        let timestamp = at.timestamp();
        if self.db.occupied_slots(account_id).await?.contains(&timestamp) {
            return Err(PagecastError::InvalidInput(format!(
                "A post is already scheduled at {}",
                at.to_rfc3339()
            )));
        }

        let post = Post::new(account_id.to_string(), timestamp);
        self.db.create_post(&post).await?;
        info!(account_id, post_id = %post.id, scheduled_at = timestamp, "Post scheduled");
        self.events.emit(Event::PostsScheduled {
            account_id: account_id.to_string(),
            post_ids: vec![post.id.clone()],
        });
        Ok(post)
    }

    /// Cancel a post that has not started generating
    ///
    /// Cancelling twice is not an error.
    pub async fn cancel(&self, post_id: &str) -> Result<CancelOutcome> {
        let post = self.get(post_id).await?;
        if post.status == PostStatus::Cancelled {
            return Ok(CancelOutcome::AlreadyCancelled);
        }

        let mut conn = self.db.pool().acquire().await?;
        let now = Utc::now().timestamp();
        if !db::move_status(&mut conn, post_id, PostStatus::Scheduled, PostStatus::Cancelled, now).await? {
            // Lost a race with a sweep or another cancel
            let current = db::fetch_post(&mut conn, post_id)
                .await?
                .ok_or_else(|| PagecastError::NotFound(format!("Post not found: {}", post_id)))?;
            if current.status == PostStatus::Cancelled {
                return Ok(CancelOutcome::AlreadyCancelled);
            }
            return Err(PagecastError::InvalidTransition {
                post_id: post_id.to_string(),
                from: current.status,
                action: "cancel",
            });
        }

        info!(post_id, account_id = %post.account_id, "Post cancelled");
        self.events.emit(Event::PostCancelled {
            account_id: post.account_id,
            post_id: post_id.to_string(),
        });
        Ok(CancelOutcome::Cancelled)
    }

    /// Move a post to a new time
    ///
    /// Allowed from `scheduled` and `ready`, which keep their status, and from
    /// `failed`. A failed post with its caption and image already generated
    /// resumes at `ready`, so it is published without being charged again;
    /// otherwise it returns to `scheduled`.
    pub async fn reschedule(&self, post_id: &str, at: DateTime<Utc>) -> Result<Post> {
        ensure_future(at)?;
        let post = self.get(post_id).await?;

        let to = match post.status {
            PostStatus::Scheduled | PostStatus::Ready => post.status,
            PostStatus::Failed if post.has_artifacts() => PostStatus::Ready,
            PostStatus::Failed => PostStatus::Scheduled,
            from => {
                return Err(PagecastError::InvalidTransition {
                    post_id: post_id.to_string(),
                    from,
                    action: "reschedule",
                })
            }
        };

        let mut conn = self.db.pool().acquire().await?;
        let moved = db::reschedule_post(
            &mut conn,
            post_id,
            post.status,
            to,
            at.timestamp(),
            Utc::now().timestamp(),
        )
        .await?;
        if !moved {
            let current = db::fetch_post(&mut conn, post_id)
                .await?
                .map(|p| p.status)
                .unwrap_or(post.status);
            return Err(PagecastError::InvalidTransition {
                post_id: post_id.to_string(),
                from: current,
                action: "reschedule",
            });
        }

        info!(post_id, from = %post.status, to = %to, scheduled_at = at.timestamp(), "Post rescheduled");
        if post.status != to {
            self.events.emit(Event::PostStatusChanged {
                account_id: post.account_id.clone(),
                post_id: post_id.to_string(),
                from: post.status,
                to,
            });
        }
        self.events.emit(Event::PostRescheduled {
            account_id: post.account_id.clone(),
            post_id: post_id.to_string(),
            scheduled_at: at.timestamp(),
        });
        self.get(post_id).await
    }

    pub async fn get(&self, post_id: &str) -> Result<Post> {
        self.db
            .get_post(post_id)
            .await?
            .ok_or_else(|| PagecastError::NotFound(format!("Post not found: {}", post_id)))
    }

    /// Posts in schedule order
    pub async fn list(&self, filter: &PostFilter) -> Result<Vec<Post>> {
        self.db.list_posts(filter).await
    }

    pub async fn stats(&self, account_id: Option<&str>) -> Result<QueueStats> {
        self.db.queue_stats(account_id).await
    }

    /// The account, if it may schedule posts right now
    async fn schedulable_account(&self, account_id: &str) -> Result<Account> {
        let account = self
            .db
            .get_account(account_id)
            .await?
            .ok_or_else(|| PagecastError::NotFound(format!("Account not found: {}", account_id)))?;

        if !account.onboarded {
            return Err(PagecastError::InvalidInput(
                "Complete onboarding before scheduling posts".to_string(),
            ));
        }

        if self.config.credits.require_balance_to_schedule {
            // Surfaces as InsufficientBalance, without debiting anything
            let balance = Ledger::new(self.db.clone()).balance(account_id).await?;
            let per_post = self.config.credits.per_post;
            if balance < per_post {
                return Err(crate::error::LedgerError::InsufficientBalance {
                    account_id: account_id.to_string(),
                    balance,
                    requested: per_post,
                }
                .into());
            }
        }

        Ok(account)
    }
}

fn ensure_future(at: DateTime<Utc>) -> Result<()> {
    if at <= Utc::now() {
        return Err(PagecastError::InvalidInput(format!(
            "Scheduled time {} is in the past",
            at.to_rfc3339()
        )));
    }
    Ok(())
}
