//! Credit balance, purchases and the price list

use serde::Serialize;
use std::sync::Arc;

use super::events::{Event, EventBus};
use crate::config::PricingConfig;
use crate::db::Database;
use crate::ledger::{CreditSummary, Ledger};
use crate::types::{Credits, LedgerEntry};
use crate::{Config, PagecastError, Result};

/// A purchasable bundle of credits
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreditPackage {
    pub name: &'static str,
    pub credits: u32,
    pub discount_percent: u32,
    pub price_cents: u64,
}

#[derive(Clone)]
pub struct CreditService {
    ledger: Ledger,
    config: Arc<Config>,
    events: EventBus,
}

impl CreditService {
    pub fn new(db: Database, config: Arc<Config>, events: EventBus) -> Self {
        Self {
            ledger: Ledger::new(db),
            config,
            events,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub async fn balance(&self, account_id: &str) -> Result<Credits> {
        self.ledger.balance(account_id).await
    }

    pub async fn summary(&self, account_id: &str) -> Result<CreditSummary> {
        self.ledger.summary(account_id).await
    }

    /// Most recent entries first
    pub async fn history(&self, account_id: &str, limit: u32) -> Result<Vec<LedgerEntry>> {
        // Fail on unknown accounts instead of returning an empty list
        self.ledger.balance(account_id).await?;
        self.ledger.history(account_id, limit).await
    }

    /// Record bought credits, returning the new balance
    pub async fn purchase(
        &self,
        account_id: &str,
        credits: Credits,
        payment_ref: Option<&str>,
    ) -> Result<Credits> {
        if !credits.is_positive() {
            return Err(PagecastError::InvalidInput(format!(
                "Purchase amount must be positive, got {}",
                credits
            )));
        }

        let description = format!("Purchased {} credits", credits);
        self.ledger
            .purchase(account_id, credits, &description, payment_ref)
            .await?;
        let balance = self.ledger.balance(account_id).await?;

        self.events.emit(Event::BalanceChanged {
            account_id: account_id.to_string(),
            balance,
        });
        Ok(balance)
    }

    /// Price of one credit: what a post costs to generate, times the markup
    pub fn price_per_credit_cents(&self) -> u64 {
        price_per_credit_cents(&self.config.credits.pricing)
    }

    /// Undiscounted price of `credits` credits
    pub fn price_cents(&self, credits: u32) -> u64 {
        u64::from(credits) * self.price_per_credit_cents()
    }

    pub fn packages(&self) -> Vec<CreditPackage> {
        let unit = self.price_per_credit_cents();
        self.config
            .credits
            .pricing
            .packages
            .iter()
            .map(|&credits| {
                let discount_percent = volume_discount(credits);
                let list_price = u64::from(credits) * unit;
                CreditPackage {
                    name: package_name(credits),
                    credits,
                    discount_percent,
                    price_cents: discounted(list_price, discount_percent),
                }
            })
            .collect()
    }
}

fn price_per_credit_cents(pricing: &PricingConfig) -> u64 {
    (u64::from(pricing.caption_cost_cents) + u64::from(pricing.image_cost_cents))
        * u64::from(pricing.markup)
}

/// 10 % from 30 credits, 15 % from 100
fn volume_discount(credits: u32) -> u32 {
    match credits {
        100.. => 15,
        30.. => 10,
        _ => 0,
    }
}

/// Apply a percentage discount, rounding to the nearest cent
fn discounted(cents: u64, discount_percent: u32) -> u64 {
    let kept = 100 - u64::from(discount_percent.min(100));
    (cents * kept + 50) / 100
}

fn package_name(credits: u32) -> &'static str {
    match credits {
        500.. => "Agency",
        100.. => "Professional",
        30.. => "Starter",
        _ => "Basic",
    }
}
