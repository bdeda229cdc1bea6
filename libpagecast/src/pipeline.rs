//! Post pipeline
//!
//! A sweep moves every due post one or more steps along
//! `scheduled -> generating -> ready -> posting -> posted`:
//!
//! 1. Stale in-flight posts left behind by a crashed worker are recovered.
//! 2. Due `scheduled` posts are claimed. The claim is a status compare-and-set
//!    committed together with the ledger debit, so a post is paid for exactly
//!    when it starts generating and two workers can never claim the same post.
//! 3. Caption and image are generated. On failure the post is failed and the
//!    debit refunded in one transaction.
//! 4. `ready` posts are claimed for publishing and published. Publishing
//!    failures are recorded on the post and never refunded.
//!
//! Adapter errors end up on the post (`error_kind`, `error_message`) and in
//! the [`SweepReport`]; only database errors escape a sweep.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::ops::AddAssign;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{Config, SchedulingConfig, StaleAction};
use crate::db::{self, Database};
use crate::error::{GenerationError, LedgerError, PagecastError, PublishError, Result};
use crate::generation::{AccountProfile, ContentGenerator, PostContext};
use crate::ledger::{self, EntryRequest};
use crate::publishing::Publisher;
use crate::retry::{with_retry, RetryPolicy};
use crate::service::events::{Event, EventBus};
use crate::types::{Credits, EntryKind, Post, PostStatus};

/// What one sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Stale in-flight posts failed or requeued
    pub recovered: usize,
    /// Posts that were due when the sweep started
    pub due: usize,
    pub generated: usize,
    pub published: usize,
    pub failed: usize,
    /// Posts left `scheduled` because the account could not pay
    pub deferred: usize,
    /// Posts another worker got to first
    pub skipped: usize,
    /// Posts whose processing hit a database error
    pub errors: usize,
}

impl SweepReport {
    pub fn is_idle(&self) -> bool {
        *self == SweepReport::default()
    }
}

impl AddAssign for SweepReport {
    fn add_assign(&mut self, other: SweepReport) {
        self.recovered += other.recovered;
        self.due += other.due;
        self.generated += other.generated;
        self.published += other.published;
        self.failed += other.failed;
        self.deferred += other.deferred;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

pub struct Pipeline {
    db: Database,
    generator: Arc<dyn ContentGenerator>,
    publisher: Arc<dyn Publisher>,
    events: EventBus,
    scheduling: SchedulingConfig,
    per_post: Credits,
    retry: RetryPolicy,
}

impl Pipeline {
    pub fn new(
        db: Database,
        generator: Arc<dyn ContentGenerator>,
        publisher: Arc<dyn Publisher>,
        config: &Config,
        events: EventBus,
    ) -> Self {
        Self {
            db,
            generator,
            publisher,
            events,
            scheduling: config.scheduling.clone(),
            per_post: config.credits.per_post,
            retry: RetryPolicy::from_config(&config.retry),
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now().timestamp()).await
    }

    /// Run one sweep as if the current time were `now`
    pub async fn sweep_at(&self, now: i64) -> Result<SweepReport> {
        let mut report = SweepReport {
            recovered: self.recover_stale(now).await?,
            ..Default::default()
        };

        let due = self.db.get_due_posts(now, self.scheduling.batch_size).await?;
        report.due = due.len();
        if due.is_empty() {
            debug!("No posts due");
            return Ok(report);
        }
        info!(count = due.len(), "Processing due posts");

        let outcomes: Vec<SweepReport> = stream::iter(due)
            .map(|post| self.process(post, now))
            .buffer_unordered(self.scheduling.max_concurrency.max(1))
            .collect()
            .await;
        for outcome in outcomes {
            report += outcome;
        }

        info!(
            generated = report.generated,
            published = report.published,
            failed = report.failed,
            deferred = report.deferred,
            skipped = report.skipped,
            "Sweep finished"
        );
        Ok(report)
    }

    /// Fail or requeue posts stuck in `generating`/`posting` since before
    /// `now - stale_after`
    pub async fn recover_stale(&self, now: i64) -> Result<usize> {
        let cutoff = now - self.scheduling.stale_after as i64;
        let stale = self.db.get_stale_posts(cutoff).await?;
        let mut recovered = 0;

        for post in stale {
            let at = stamp(now);
            let mut tx = self.db.begin().await?;
            let (moved, to) = match (post.status, self.scheduling.stale_action) {
                (PostStatus::Generating, StaleAction::Fail) | (PostStatus::Posting, StaleAction::Fail) => {
                    let message = format!("Abandoned while {} since {}", post.status, post.updated_at);
                    let moved = db::fail_post(&mut tx, &post.id, post.status, "stale", &message, at).await?;
                    (moved, PostStatus::Failed)
                }
                (PostStatus::Generating, StaleAction::Reclaim) => {
                    let moved = db::reschedule_post(
                        &mut tx,
                        &post.id,
                        PostStatus::Generating,
                        PostStatus::Scheduled,
                        post.scheduled_at,
                        at,
                    )
                    .await?;
                    (moved, PostStatus::Scheduled)
                }
                (PostStatus::Posting, StaleAction::Reclaim) => {
                    let moved =
                        db::move_status(&mut tx, &post.id, PostStatus::Posting, PostStatus::Ready, at).await?;
                    (moved, PostStatus::Ready)
                }
                _ => (false, post.status),
            };

            if !moved {
                tx.rollback().await?;
                continue;
            }

            let refund = if post.status == PostStatus::Generating {
                ledger::refund_for_post(&mut tx, &post, "generation abandoned").await?
            } else {
                None
            };
            tx.commit().await?;

            warn!(post_id = %post.id, from = %post.status, to = %to, "Recovered stale post");
            self.emit_status(&post, post.status, to);
            if let Some(entry) = refund {
                self.events.emit(Event::BalanceChanged {
                    account_id: post.account_id.clone(),
                    balance: entry.balance_after,
                });
            }
            recovered += 1;
        }

        Ok(recovered)
    }

    async fn process(&self, post: Post, now: i64) -> SweepReport {
        let post_id = post.id.clone();
        let result = match post.status {
            PostStatus::Scheduled => self.generate_and_publish(post, now).await,
            PostStatus::Ready => self.publish(post, now).await,
            _ => Ok(SweepReport {
                skipped: 1,
                ..Default::default()
            }),
        };

        result.unwrap_or_else(|e| {
            error!(post_id = %post_id, error = %e, "Failed to process post");
            SweepReport {
                errors: 1,
                ..Default::default()
            }
        })
    }

    async fn generate_and_publish(&self, post: Post, now: i64) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        let mut post = match self.claim(post, now).await? {
            Claim::Claimed(post) => post,
            Claim::Lost => {
                report.skipped += 1;
                return Ok(report);
            }
            Claim::Deferred => {
                report.deferred += 1;
                return Ok(report);
            }
            Claim::Exhausted => {
                report.failed += 1;
                return Ok(report);
            }
        };

        match self.generate(&post).await {
            Ok((caption, image_prompt, image)) => {
                let mut conn = self.db.pool().acquire().await?;
                let at = stamp(now);
                if !db::record_generated(&mut conn, &post.id, &caption, &image_prompt, &image, at).await? {
                    report.skipped += 1;
                    return Ok(report);
                }
                drop(conn);

                info!(post_id = %post.id, account_id = %post.account_id, "Post content generated");
                self.emit_status(&post, PostStatus::Generating, PostStatus::Ready);
                report.generated += 1;

                post.status = PostStatus::Ready;
                post.caption = Some(caption);
                post.image_prompt = Some(image_prompt);
                post.image = Some(image);
                report += self.publish(post, now).await?;
            }
            Err(e) => {
                self.fail_generation(&post, &e, now).await?;
                report.failed += 1;
            }
        }

        Ok(report)
    }

    /// `scheduled -> generating`, paid for in the same transaction
    async fn claim(&self, mut post: Post, now: i64) -> Result<Claim> {
        let at = stamp(now);
        let mut tx = self.db.begin().await?;

        if !db::claim_for_generation(&mut tx, &post.id, self.per_post, at).await? {
            tx.rollback().await?;
            debug!(post_id = %post.id, "Post already claimed");
            return Ok(Claim::Lost);
        }

        let description = format!("Post generation ({})", post.id);
        let debit = ledger::apply_debit(
            &mut tx,
            &EntryRequest {
                account_id: &post.account_id,
                amount: self.per_post,
                kind: EntryKind::Generation,
                description: &description,
                post_id: Some(&post.id),
                payment_ref: None,
            },
        )
        .await;

        match debit {
            Ok(entry) => {
                tx.commit().await?;
                debug!(post_id = %post.id, balance = %entry.balance_after, "Post claimed for generation");
                self.emit_status(&post, PostStatus::Scheduled, PostStatus::Generating);
                self.events.emit(Event::BalanceChanged {
                    account_id: post.account_id.clone(),
                    balance: entry.balance_after,
                });
                post.status = PostStatus::Generating;
                post.credits_charged = self.per_post;
                Ok(Claim::Claimed(post))
            }
            Err(PagecastError::Ledger(LedgerError::InsufficientBalance { balance, requested, .. })) => {
                tx.rollback().await?;
                self.defer(&post, balance, requested, now).await
            }
            Err(e) => Err(e),
        }
    }

    /// Count an unpaid claim; fail the post once the attempts run out
    async fn defer(&self, post: &Post, balance: Credits, requested: Credits, now: i64) -> Result<Claim> {
        let at = stamp(now);
        let mut tx = self.db.begin().await?;

        let Some(attempts) = db::bump_debit_attempts(&mut tx, &post.id, at).await? else {
            tx.rollback().await?;
            return Ok(Claim::Lost);
        };

        let limit = i64::from(self.scheduling.max_debit_attempts);
        if limit > 0 && attempts >= limit {
            let message = format!(
                "Balance {} could not cover {} after {} attempts",
                balance, requested, attempts
            );
            let failed = db::fail_post(
                &mut tx,
                &post.id,
                PostStatus::Scheduled,
                "insufficient_balance",
                &message,
                at,
            )
            .await?;
            tx.commit().await?;

            if failed {
                warn!(post_id = %post.id, account_id = %post.account_id, attempts, "Post failed: insufficient balance");
                self.emit_status(post, PostStatus::Scheduled, PostStatus::Failed);
                self.events.emit(Event::PostFailed {
                    account_id: post.account_id.clone(),
                    post_id: post.id.clone(),
                    error_kind: "insufficient_balance".to_string(),
                    message,
                });
                return Ok(Claim::Exhausted);
            }
            return Ok(Claim::Lost);
        }

        tx.commit().await?;
        info!(
            post_id = %post.id,
            account_id = %post.account_id,
            balance = %balance,
            attempts,
            "Insufficient balance, post stays scheduled"
        );
        Ok(Claim::Deferred)
    }

    async fn generate(
        &self,
        post: &Post,
    ) -> std::result::Result<(String, String, crate::types::ImageRef), GenerationError> {
        let (profile, post_number) = self
            .generation_context(post)
            .await
            .map_err(|e| GenerationError::Provider(format!("Cannot load account profile: {}", e)))?;
        let context = PostContext {
            post_id: post.id.clone(),
            post_number,
            scheduled_at: post.scheduled_at,
        };

        let copy = with_retry(&self.retry, "generate_caption", || {
            self.generator.generate_caption(&profile, &context)
        })
        .await?;

        let image = with_retry(&self.retry, "generate_image", || {
            self.generator.generate_image(&copy.image_prompt)
        })
        .await?;

        Ok((copy.caption, copy.image_prompt, image))
    }

    async fn generation_context(&self, post: &Post) -> Result<(AccountProfile, u32)> {
        let account = self
            .db
            .get_account(&post.account_id)
            .await?
            .ok_or_else(|| PagecastError::NotFound(format!("account {}", post.account_id)))?;
        let number = self.db.post_number(post).await?;

        let profile = AccountProfile {
            business_summary: account.business_summary.unwrap_or_default(),
            post_style: account.post_style.unwrap_or_default(),
        };
        Ok((profile, u32::try_from(number).unwrap_or(u32::MAX)))
    }

    /// `generating -> failed`, refunding the claim
    async fn fail_generation(&self, post: &Post, err: &GenerationError, now: i64) -> Result<()> {
        let at = stamp(now);
        let message = err.to_string();
        let mut tx = self.db.begin().await?;

        if !db::fail_post(&mut tx, &post.id, PostStatus::Generating, err.kind(), &message, at).await? {
            tx.rollback().await?;
            return Ok(());
        }
        let refund = ledger::refund_for_post(&mut tx, post, "generation failed").await?;
        tx.commit().await?;

        warn!(post_id = %post.id, account_id = %post.account_id, kind = err.kind(), error = %err, "Generation failed");
        self.emit_status(post, PostStatus::Generating, PostStatus::Failed);
        self.events.emit(Event::PostFailed {
            account_id: post.account_id.clone(),
            post_id: post.id.clone(),
            error_kind: err.kind().to_string(),
            message,
        });
        if let Some(entry) = refund {
            self.events.emit(Event::BalanceChanged {
                account_id: post.account_id.clone(),
                balance: entry.balance_after,
            });
        }
        Ok(())
    }

    /// `ready -> posting -> posted | failed`
    async fn publish(&self, post: Post, now: i64) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        let mut conn = self.db.pool().acquire().await?;
        if !db::claim_for_publishing(&mut conn, &post.id, stamp(now)).await? {
            report.skipped += 1;
            return Ok(report);
        }
        drop(conn);
        self.emit_status(&post, PostStatus::Ready, PostStatus::Posting);

        let result = match (self.db.get_credentials(&post.account_id).await?, post.caption.as_deref()) {
            (None, _) => Err(PublishError::AuthExpired("No Facebook page is connected".to_string())),
            (_, None) => Err(PublishError::PlatformRejected("Post has no caption".to_string())),
            (Some(credentials), Some(caption)) => {
                with_retry(&self.retry, "publish", || {
                    self.publisher
                        .publish(&credentials, &credentials.page_id, post.image.as_ref(), caption)
                })
                .await
            }
        };

        match result {
            Ok(published) => {
                let mut conn = self.db.pool().acquire().await?;
                let recorded = db::record_published(
                    &mut conn,
                    &post.id,
                    &published.platform_post_id,
                    &published.url,
                    stamp(now),
                )
                .await?;
                if !recorded {
                    // Published, but the post was recovered as stale meanwhile
                    warn!(post_id = %post.id, url = %published.url, "Published post was no longer posting");
                    report.skipped += 1;
                    return Ok(report);
                }

                info!(post_id = %post.id, account_id = %post.account_id, url = %published.url, "Post published");
                self.emit_status(&post, PostStatus::Posting, PostStatus::Posted);
                self.events.emit(Event::PostPublished {
                    account_id: post.account_id.clone(),
                    post_id: post.id.clone(),
                    url: published.url,
                });
                report.published += 1;
            }
            Err(e) => {
                self.fail_publication(&post, &e, now).await?;
                report.failed += 1;
            }
        }

        Ok(report)
    }

    /// `posting -> failed`; an expired token also flags the account
    async fn fail_publication(&self, post: &Post, err: &PublishError, now: i64) -> Result<()> {
        let at = stamp(now);
        let message = err.to_string();
        let reauth = matches!(err, PublishError::AuthExpired(_));
        let mut tx = self.db.begin().await?;

        if !db::fail_post(&mut tx, &post.id, PostStatus::Posting, err.kind(), &message, at).await? {
            tx.rollback().await?;
            return Ok(());
        }
        if reauth {
            db::mark_needs_reauth(&mut tx, &post.account_id, at).await?;
        }
        tx.commit().await?;

        warn!(post_id = %post.id, account_id = %post.account_id, kind = err.kind(), error = %err, "Publishing failed");
        self.emit_status(post, PostStatus::Posting, PostStatus::Failed);
        self.events.emit(Event::PostFailed {
            account_id: post.account_id.clone(),
            post_id: post.id.clone(),
            error_kind: err.kind().to_string(),
            message,
        });
        if reauth {
            self.events.emit(Event::ReauthRequired {
                account_id: post.account_id.clone(),
            });
        }
        Ok(())
    }

    fn emit_status(&self, post: &Post, from: PostStatus, to: PostStatus) {
        self.events.emit(Event::PostStatusChanged {
            account_id: post.account_id.clone(),
            post_id: post.id.clone(),
            from,
            to,
        });
    }
}

enum Claim {
    Claimed(Post),
    /// Another worker moved the post first
    Lost,
    /// Not enough credits this time
    Deferred,
    /// Not enough credits, and no attempts left
    Exhausted,
}

/// Transition timestamp: wall clock, never earlier than the sweep's `now`
fn stamp(now: i64) -> i64 {
    now.max(Utc::now().timestamp())
}
