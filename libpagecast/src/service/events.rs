//! In-process event bus
//!
//! Services and the pipeline emit an [`Event`] whenever persisted state
//! changes. Each event names the dashboard views it makes stale, so a client
//! refetches exactly those instead of reloading everything on every view
//! switch.
//!
//! Events are dropped when nobody is subscribed; lagging subscribers lose the
//! oldest events first.
//!
//! ```no_run
//! use libpagecast::service::events::{Event, EventBus};
//!
//! # async fn example() {
//! let bus = EventBus::new(100);
//! let mut receiver = bus.subscribe();
//!
//! bus.emit(Event::PostCancelled {
//!     account_id: "acct".to_string(),
//!     post_id: "post".to_string(),
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("{:?} invalidates {:?}", event, event.invalidates());
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::dashboard::View;
use crate::types::{Credits, PostStatus};

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` is the per-subscriber buffer before old events are dropped
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // Err only means there are no receivers
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    AccountCreated {
        account_id: String,
    },
    ProfileUpdated {
        account_id: String,
    },
    PageConnected {
        account_id: String,
        page_id: String,
    },
    /// The page token was rejected; the owner must reconnect
    ReauthRequired {
        account_id: String,
    },
    PostsScheduled {
        account_id: String,
        post_ids: Vec<String>,
    },
    PostCancelled {
        account_id: String,
        post_id: String,
    },
    PostRescheduled {
        account_id: String,
        post_id: String,
        scheduled_at: i64,
    },
    PostStatusChanged {
        account_id: String,
        post_id: String,
        from: PostStatus,
        to: PostStatus,
    },
    PostPublished {
        account_id: String,
        post_id: String,
        url: String,
    },
    PostFailed {
        account_id: String,
        post_id: String,
        error_kind: String,
        message: String,
    },
    BalanceChanged {
        account_id: String,
        balance: Credits,
    },
}

impl Event {
    pub fn account_id(&self) -> &str {
        match self {
            Event::AccountCreated { account_id }
            | Event::ProfileUpdated { account_id }
            | Event::PageConnected { account_id, .. }
            | Event::ReauthRequired { account_id }
            | Event::PostsScheduled { account_id, .. }
            | Event::PostCancelled { account_id, .. }
            | Event::PostRescheduled { account_id, .. }
            | Event::PostStatusChanged { account_id, .. }
            | Event::PostPublished { account_id, .. }
            | Event::PostFailed { account_id, .. }
            | Event::BalanceChanged { account_id, .. } => account_id,
        }
    }

    /// Dashboard views whose data this event changes
    pub fn invalidates(&self) -> &'static [View] {
        match self {
            Event::AccountCreated { .. } | Event::ProfileUpdated { .. } | Event::PageConnected { .. } => {
                &[View::Profile]
            }
            Event::ReauthRequired { .. } => &[View::Profile, View::Posts],
            Event::PostsScheduled { .. }
            | Event::PostCancelled { .. }
            | Event::PostRescheduled { .. }
            | Event::PostStatusChanged { .. }
            | Event::PostPublished { .. }
            | Event::PostFailed { .. } => &[View::Posts],
            Event::BalanceChanged { .. } => &[View::Balance, View::History],
        }
    }
}
