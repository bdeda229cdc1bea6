//! Integration tests for the post pipeline
//!
//! Drives accounts, scheduling, sweeps and the ledger through
//! `PagecastService` with the mock generator and publisher.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tempfile::TempDir;

use libpagecast::config::{GenerationProvider, PublishingPlatform};
use libpagecast::dashboard::{reduce, Action, DashboardState, View};
use libpagecast::db::ProfileUpdate;
use libpagecast::error::{GenerationError, LedgerError};
use libpagecast::generation::MockGenerator;
use libpagecast::publishing::MockPublisher;
use libpagecast::service::accounts::PageConnection;
use libpagecast::service::events::Event;
use libpagecast::{Account, Config, Credits, PagecastError, PagecastService, PostStatus};

fn test_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.database.path = temp_dir.path().join("pagecast.db").to_string_lossy().into_owned();
    config.database.images_dir = temp_dir.path().join("images").to_string_lossy().into_owned();
    config.generation.provider = GenerationProvider::Mock;
    config.publishing.platform = PublishingPlatform::Mock;
    config.retry.initial_delay_ms = 1;
    config.retry.max_delay_ms = 2;
    config
}

async fn setup_service() -> (PagecastService, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let service = PagecastService::from_config(test_config(&temp_dir)).await.unwrap();
    (service, temp_dir)
}

/// An onboarded account with a connected page
async fn ready_account(service: &PagecastService, email: &str) -> Account {
    let accounts = service.accounts();
    let account = accounts.create(email, Some("Corner Bakery")).await.unwrap();
    accounts
        .update_profile(
            &account.id,
            &ProfileUpdate {
                business_summary: Some("Sourdough bakery in the old town".to_string()),
                post_style: Some("Warm and short".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    accounts.complete_onboarding(&account.id).await.unwrap();
    accounts
        .connect_page(
            &account.id,
            &PageConnection {
                page_id: "111".to_string(),
                page_name: Some("Corner Bakery".to_string()),
                access_token: "EAAB-page-token".to_string(),
                expires_at: None,
            },
        )
        .await
        .unwrap()
}

async fn assert_ledger_consistent(service: &PagecastService, account_id: &str) {
    let ledger = service.credits().ledger();
    assert_eq!(
        ledger.balance(account_id).await.unwrap(),
        ledger.sum_entries(account_id).await.unwrap(),
        "cached balance must equal the sum of entries"
    );
}

#[tokio::test]
async fn test_scheduled_post_is_paid_generated_and_published() {
    let (service, _temp_dir) = setup_service().await;
    let account = ready_account(&service, "owner@example.com").await;
    assert_eq!(account.balance, Credits::from_whole(1));

    let at = Utc::now() + Duration::hours(1);
    let post = service.posts().schedule_at(&account.id, at).await.unwrap();

    let pipeline = service.pipeline().unwrap();
    let report = pipeline.sweep_at(at.timestamp() + 60).await.unwrap();

    assert_eq!(report.published, 1);
    let post = service.posts().get(&post.id).await.unwrap();
    assert_eq!(post.status, PostStatus::Posted);
    assert_eq!(post.credits_charged, Credits::from_whole(1));
    assert!(post.post_url.unwrap().starts_with("https://www.facebook.com/111/posts/"));
    assert!(std::path::Path::new(&post.image.unwrap().path).exists());

    assert_eq!(service.credits().balance(&account.id).await.unwrap(), Credits::ZERO);
    assert_ledger_consistent(&service, &account.id).await;
}

#[tokio::test]
async fn test_empty_balance_leaves_post_scheduled() {
    let (service, _temp_dir) = setup_service().await;
    let account = ready_account(&service, "owner@example.com").await;
    service
        .credits()
        .ledger()
        .debit(&account.id, Credits::from_whole(1), "use trial")
        .await
        .unwrap();

    let at = Utc::now() + Duration::hours(1);
    let post = service.posts().schedule_at(&account.id, at).await.unwrap();
    let report = service.pipeline().unwrap().sweep_at(at.timestamp() + 60).await.unwrap();

    assert_eq!(report.deferred, 1);
    assert_eq!(service.posts().get(&post.id).await.unwrap().status, PostStatus::Scheduled);
    assert_eq!(service.credits().balance(&account.id).await.unwrap(), Credits::ZERO);

    // Buying credits unblocks the post on the next sweep
    service
        .credits()
        .purchase(&account.id, Credits::from_whole(10), Some("pi_test"))
        .await
        .unwrap();
    let report = service.pipeline().unwrap().sweep_at(at.timestamp() + 120).await.unwrap();
    assert_eq!(report.published, 1);
    assert_ledger_consistent(&service, &account.id).await;
}

#[tokio::test]
async fn test_image_outage_fails_post_and_refunds() {
    let (service, temp_dir) = setup_service().await;
    let account = ready_account(&service, "owner@example.com").await;

    let at = Utc::now() + Duration::hours(1);
    let post = service.posts().schedule_at(&account.id, at).await.unwrap();
    let pipeline = service.pipeline_with(
        Arc::new(MockGenerator::image_failure(
            temp_dir.path(),
            GenerationError::Provider("image model unavailable".to_string()),
        )),
        Arc::new(MockPublisher::success()),
    );

    pipeline.sweep_at(at.timestamp() + 60).await.unwrap();

    let post = service.posts().get(&post.id).await.unwrap();
    assert_eq!(post.status, PostStatus::Failed);
    assert_eq!(post.error_kind.as_deref(), Some("provider_error"));
    assert_eq!(service.credits().balance(&account.id).await.unwrap(), Credits::from_whole(1));

    let entries = service.credits().ledger().entries_for_post(&post.id).await.unwrap();
    let net: Credits = entries.iter().map(|e| e.amount).sum();
    assert_eq!(net, Credits::ZERO, "every failed generation is refunded in full");
    assert_ledger_consistent(&service, &account.id).await;
}

#[tokio::test]
async fn test_failed_publication_resumes_without_second_charge() {
    let (service, temp_dir) = setup_service().await;
    let account = ready_account(&service, "owner@example.com").await;
    service
        .credits()
        .purchase(&account.id, Credits::from_whole(5), None)
        .await
        .unwrap();

    let at = Utc::now() + Duration::hours(1);
    let post = service.posts().schedule_at(&account.id, at).await.unwrap();
    let failing = service.pipeline_with(
        Arc::new(MockGenerator::new(temp_dir.path())),
        Arc::new(MockPublisher::failure(
            libpagecast::error::PublishError::Network("connection reset".to_string()),
        )),
    );
    failing.sweep_at(at.timestamp() + 60).await.unwrap();
    assert_eq!(service.posts().get(&post.id).await.unwrap().status, PostStatus::Failed);
    let balance_after_failure = service.credits().balance(&account.id).await.unwrap();

    let retry_at = Utc::now() + Duration::hours(2);
    let resumed = service.posts().reschedule(&post.id, retry_at).await.unwrap();
    assert_eq!(resumed.status, PostStatus::Ready);

    service
        .pipeline()
        .unwrap()
        .sweep_at(retry_at.timestamp() + 60)
        .await
        .unwrap();

    let post = service.posts().get(&post.id).await.unwrap();
    assert_eq!(post.status, PostStatus::Posted);
    assert_eq!(
        service.credits().balance(&account.id).await.unwrap(),
        balance_after_failure
    );
}

#[tokio::test]
async fn test_concurrent_debits_cannot_overdraw() {
    let (service, _temp_dir) = setup_service().await;
    let account = ready_account(&service, "owner@example.com").await;
    let ledger = service.credits().ledger().clone();

    let (first, second) = tokio::join!(
        ledger.debit(&account.id, Credits::from_whole(1), "first"),
        ledger.debit(&account.id, Credits::from_whole(1), "second"),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(PagecastError::Ledger(LedgerError::InsufficientBalance { .. }))
    )));
    assert_eq!(ledger.balance(&account.id).await.unwrap(), Credits::ZERO);
    assert_ledger_consistent(&service, &account.id).await;
}

#[tokio::test]
async fn test_cancelled_post_is_never_processed() {
    let (service, _temp_dir) = setup_service().await;
    let account = ready_account(&service, "owner@example.com").await;

    let at = Utc::now() + Duration::hours(1);
    let post = service.posts().schedule_at(&account.id, at).await.unwrap();
    service.posts().cancel(&post.id).await.unwrap();

    let report = service.pipeline().unwrap().sweep_at(at.timestamp() + 60).await.unwrap();

    assert_eq!(report.due, 0);
    assert_eq!(service.posts().get(&post.id).await.unwrap().status, PostStatus::Cancelled);
    assert_eq!(service.credits().balance(&account.id).await.unwrap(), Credits::from_whole(1));
}

#[tokio::test]
async fn test_events_drive_dashboard_invalidation() {
    let (service, _temp_dir) = setup_service().await;
    let account = ready_account(&service, "owner@example.com").await;
    let mut events = service.subscribe();

    let mut state = DashboardState::for_account(account.id.clone());
    state = reduce(state, Action::PostsLoaded(Vec::new()));
    state = reduce(state, Action::BalanceLoaded(account.balance));
    state = reduce(state, Action::HistoryLoaded(Vec::new()));
    state = reduce(state, Action::ProfileLoaded(account.clone()));
    assert!(state.stale.is_empty());

    let at = Utc::now() + Duration::hours(1);
    service.posts().schedule_at(&account.id, at).await.unwrap();
    service.pipeline().unwrap().sweep_at(at.timestamp() + 60).await.unwrap();

    let mut published = false;
    while let Ok(event) = events.try_recv() {
        published |= matches!(event, Event::PostPublished { .. });
        state = reduce(state, Action::EventReceived(event));
    }

    assert!(published);
    assert!(state.is_stale(View::Posts));
    assert!(state.is_stale(View::History));
    assert!(!state.is_stale(View::Profile));
    assert_eq!(state.balance, Some(Credits::ZERO));
}
