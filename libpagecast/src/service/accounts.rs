//! Account management

use std::sync::Arc;
use tracing::info;

use super::events::{Event, EventBus};
use crate::db::{Database, ProfileUpdate};
use crate::scheduling::parse_preferred_time;
use crate::types::Account;
use crate::{Config, PagecastError, Result};

/// Largest UTC offset in use anywhere, in minutes
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;
const MAX_CUSTOM_RECURRENCE_DAYS: i64 = 365;

/// Page credentials obtained from the platform's login flow
#[derive(Debug, Clone)]
pub struct PageConnection {
    pub page_id: String,
    pub page_name: Option<String>,
    pub access_token: String,
    /// Unix timestamp, None for non-expiring page tokens
    pub expires_at: Option<i64>,
}

#[derive(Clone)]
pub struct AccountService {
    db: Database,
    config: Arc<Config>,
    events: EventBus,
}

impl AccountService {
    pub fn new(db: Database, config: Arc<Config>, events: EventBus) -> Self {
        Self { db, config, events }
    }

    /// Create an account and grant the trial credits
    pub async fn create(&self, email: &str, name: Option<&str>) -> Result<Account> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(PagecastError::InvalidInput(format!(
                "'{}' is not a valid email address",
                email
            )));
        }

        let name = name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
        let account = Account::new(email, name);
        self.db
            .create_account(&account, self.config.credits.trial_grant)
            .await?;

        info!(account_id = %account.id, "Account created");
        let account = self.get(&account.id).await?;
        self.events.emit(Event::AccountCreated {
            account_id: account.id.clone(),
        });
        self.events.emit(Event::BalanceChanged {
            account_id: account.id.clone(),
            balance: account.balance,
        });
        Ok(account)
    }

    pub async fn get(&self, account_id: &str) -> Result<Account> {
        self.db
            .get_account(account_id)
            .await?
            .ok_or_else(|| PagecastError::NotFound(format!("Account not found: {}", account_id)))
    }

    /// Look an account up by id, or by email when the key contains `@`
    pub async fn find(&self, key: &str) -> Result<Account> {
        if key.contains('@') {
            self.db
                .get_account_by_email(&key.trim().to_lowercase())
                .await?
                .ok_or_else(|| PagecastError::NotFound(format!("No account with email {}", key)))
        } else {
            self.get(key).await
        }
    }

    pub async fn list(&self) -> Result<Vec<Account>> {
        self.db.list_accounts().await
    }

    /// Attach a page and its token; clears any pending re-authentication
    pub async fn connect_page(&self, account_id: &str, page: &PageConnection) -> Result<Account> {
        if page.page_id.trim().is_empty() {
            return Err(PagecastError::InvalidInput("Page id cannot be empty".to_string()));
        }
        if page.access_token.trim().is_empty() {
            return Err(PagecastError::InvalidInput("Access token cannot be empty".to_string()));
        }

        let updated = self
            .db
            .connect_page(
                account_id,
                page.page_id.trim(),
                page.page_name.as_deref(),
                page.access_token.trim(),
                page.expires_at,
            )
            .await?;
        if !updated {
            return Err(PagecastError::NotFound(format!("Account not found: {}", account_id)));
        }

        info!(account_id, page_id = %page.page_id, "Page connected");
        self.events.emit(Event::PageConnected {
            account_id: account_id.to_string(),
            page_id: page.page_id.clone(),
        });
        self.get(account_id).await
    }

    pub async fn update_profile(&self, account_id: &str, update: &ProfileUpdate) -> Result<Account> {
        validate_profile(update)?;

        if !self.db.update_profile(account_id, update).await? {
            return Err(PagecastError::NotFound(format!("Account not found: {}", account_id)));
        }

        self.events.emit(Event::ProfileUpdated {
            account_id: account_id.to_string(),
        });
        self.get(account_id).await
    }

    /// Mark onboarding done once the profile can drive content generation
    pub async fn complete_onboarding(&self, account_id: &str) -> Result<Account> {
        let account = self.get(account_id).await?;

        let missing: Vec<&str> = [
            ("business summary", &account.business_summary),
            ("post style", &account.post_style),
        ]
        .iter()
        .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
        .map(|(field, _)| *field)
        .collect();
        if !missing.is_empty() {
            return Err(PagecastError::InvalidInput(format!(
                "Cannot complete onboarding, missing {}",
                missing.join(" and ")
            )));
        }

        self.db.set_onboarded(account_id, true).await?;
        info!(account_id, "Onboarding completed");
        self.events.emit(Event::ProfileUpdated {
            account_id: account_id.to_string(),
        });
        self.get(account_id).await
    }
}

fn validate_profile(update: &ProfileUpdate) -> Result<()> {
    if let Some(time) = &update.preferred_time {
        if parse_preferred_time(time).is_none() {
            return Err(PagecastError::InvalidInput(format!(
                "Invalid preferred time '{}', expected HH:MM",
                time
            )));
        }
    }
    if let Some(days) = update.custom_recurrence_days {
        if !(1..=MAX_CUSTOM_RECURRENCE_DAYS).contains(&days) {
            return Err(PagecastError::InvalidInput(format!(
                "Custom recurrence must be between 1 and {} days",
                MAX_CUSTOM_RECURRENCE_DAYS
            )));
        }
    }
    if let Some(offset) = update.utc_offset_minutes {
        if offset.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(PagecastError::InvalidInput(format!(
                "UTC offset {} minutes is out of range",
                offset
            )));
        }
    }
    for (field, value) in [
        ("Business summary", &update.business_summary),
        ("Post style", &update.post_style),
    ] {
        if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(PagecastError::InvalidInput(format!("{} cannot be empty", field)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Credits, Recurrence};
    use tempfile::TempDir;

    async fn service() -> (AccountService, TempDir) {
        let temp = TempDir::new().unwrap();
        let db = Database::new(temp.path().join("accounts.db").to_str().unwrap())
            .await
            .unwrap();
        (
            AccountService::new(db, Arc::new(Config::default()), EventBus::new(16)),
            temp,
        )
    }

    #[tokio::test]
    async fn test_create_grants_trial_credit() {
        let (accounts, _temp) = service().await;
        let account = accounts.create(" Owner@Example.com ", Some("Bakery")).await.unwrap();

        assert_eq!(account.email, "owner@example.com");
        assert_eq!(account.balance, Credits::from_whole(1));
        assert!(!account.onboarded);
        assert_eq!(accounts.find("owner@example.com").await.unwrap().id, account.id);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_email() {
        let (accounts, _temp) = service().await;
        let result = accounts.create("not-an-email", None).await;
        assert!(matches!(result, Err(PagecastError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_onboarding_requires_profile() {
        let (accounts, _temp) = service().await;
        let account = accounts.create("a@example.com", None).await.unwrap();

        let err = accounts.complete_onboarding(&account.id).await.unwrap_err();
        assert!(err.to_string().contains("business summary and post style"));

        accounts
            .update_profile(
                &account.id,
                &ProfileUpdate {
                    business_summary: Some("Family bakery".to_string()),
                    post_style: Some("Friendly".to_string()),
                    recurrence: Some(Recurrence::Daily),
                    preferred_time: Some("08:30".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let account = accounts.complete_onboarding(&account.id).await.unwrap();
        assert!(account.onboarded);
        assert_eq!(account.recurrence, Recurrence::Daily);
        assert_eq!(account.preferred_time, "08:30");
    }

    #[tokio::test]
    async fn test_profile_validation() {
        let (accounts, _temp) = service().await;
        let account = accounts.create("a@example.com", None).await.unwrap();

        for update in [
            ProfileUpdate {
                preferred_time: Some("25:00".to_string()),
                ..Default::default()
            },
            ProfileUpdate {
                custom_recurrence_days: Some(0),
                ..Default::default()
            },
            ProfileUpdate {
                custom_recurrence_days: Some(100_000_000),
                ..Default::default()
            },
            ProfileUpdate {
                utc_offset_minutes: Some(15 * 60),
                ..Default::default()
            },
            ProfileUpdate {
                post_style: Some("  ".to_string()),
                ..Default::default()
            },
        ] {
            let result = accounts.update_profile(&account.id, &update).await;
            assert!(matches!(result, Err(PagecastError::InvalidInput(_))), "{:?}", update);
        }
    }

    #[tokio::test]
    async fn test_connect_page_clears_reauth() {
        let (accounts, _temp) = service().await;
        let account = accounts.create("a@example.com", None).await.unwrap();
        let page = PageConnection {
            page_id: "111".to_string(),
            page_name: Some("Bakery".to_string()),
            access_token: "EAAB".to_string(),
            expires_at: None,
        };

        let account = accounts.connect_page(&account.id, &page).await.unwrap();
        assert_eq!(account.page_id.as_deref(), Some("111"));
        assert!(account.page_connected());
        assert!(!account.needs_reauth);

        let missing = accounts.connect_page("nope", &page).await;
        assert!(matches!(missing, Err(PagecastError::NotFound(_))));
    }
}
