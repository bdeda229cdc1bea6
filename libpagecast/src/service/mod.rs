//! Service layer for Pagecast
//!
//! A single facade used by every command-line tool and the sweep daemon, so
//! validation and event emission live in one place.
//!
//! - `AccountService`: accounts, page connection, business profile, onboarding
//! - `PostService`: scheduling, cancelling and rescheduling posts
//! - `CreditService`: balance, history, purchases and the price list
//! - `Pipeline`: the periodic sweep (built on demand, it needs the adapters)
//! - `EventBus`: state change notifications
//!
//! # Example
//!
//! ```no_run
//! use libpagecast::service::PagecastService;
//!
//! # async fn example() -> libpagecast::Result<()> {
//! let service = PagecastService::new().await?;
//!
//! let account = service.accounts().create("owner@example.com", None).await?;
//! println!("Balance: {}", service.credits().balance(&account.id).await?);
//! # Ok(())
//! # }
//! ```

pub mod accounts;
pub mod credits;
pub mod events;
pub mod posts;

use std::sync::Arc;

use self::accounts::AccountService;
use self::credits::CreditService;
use self::events::EventBus;
use self::posts::PostService;
use crate::error::ConfigError;
use crate::generation::{create_generator, ContentGenerator};
use crate::pipeline::Pipeline;
use crate::publishing::{create_publisher, Publisher};
use crate::{Config, Database, Result};

pub struct PagecastService {
    db: Database,
    config: Arc<Config>,
    accounts: AccountService,
    posts: PostService,
    credits: CreditService,
    event_bus: EventBus,
}

impl PagecastService {
    /// Load configuration from the default location and open the database
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    pub async fn from_config(config: Config) -> Result<Self> {
        let db_path = config.db_path();
        let db_path = db_path.to_str().ok_or_else(|| ConfigError::InvalidValue {
            field: "database.path".to_string(),
            reason: "path is not valid UTF-8".to_string(),
        })?;
        let db = Database::new(db_path).await?;
        Ok(Self::with_database(config, db))
    }

    /// Build the services over an already opened database
    pub fn with_database(config: Config, db: Database) -> Self {
        let config = Arc::new(config);
        let event_bus = EventBus::new(100);

        Self {
            accounts: AccountService::new(db.clone(), Arc::clone(&config), event_bus.clone()),
            posts: PostService::new(db.clone(), Arc::clone(&config), event_bus.clone()),
            credits: CreditService::new(db.clone(), Arc::clone(&config), event_bus.clone()),
            db,
            config,
            event_bus,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn accounts(&self) -> &AccountService {
        &self.accounts
    }

    pub fn posts(&self) -> &PostService {
        &self.posts
    }

    pub fn credits(&self) -> &CreditService {
        &self.credits
    }

    /// Sweep pipeline with the configured generator and publisher
    ///
    /// Fails when the live adapters are selected but their API keys are
    /// missing.
    pub fn pipeline(&self) -> Result<Pipeline> {
        let generator = create_generator(&self.config)?;
        let publisher = create_publisher(&self.config)?;
        Ok(self.pipeline_with(generator, publisher))
    }

    pub fn pipeline_with(
        &self,
        generator: Arc<dyn ContentGenerator>,
        publisher: Arc<dyn Publisher>,
    ) -> Pipeline {
        Pipeline::new(
            self.db.clone(),
            generator,
            publisher,
            &self.config,
            self.event_bus.clone(),
        )
    }

    /// Receive events from every sub-service and the pipeline
    pub fn subscribe(&self) -> events::EventReceiver {
        self.event_bus.subscribe()
    }
}
