//! Dashboard client state
//!
//! A typed store for a dashboard client: the selected account, the data each
//! view shows, and which views are stale. State changes only through the pure
//! [`reduce`] function.
//!
//! Switching views does not refetch anything by itself. Data is refetched
//! when the view being shown is stale, and a view becomes stale only when an
//! [`Event`] says its data changed (see [`Event::invalidates`]).
//!
//! ```
//! use libpagecast::dashboard::{reduce, Action, DashboardState, View};
//!
//! let state = DashboardState::for_account("acct");
//! let state = reduce(state, Action::NavigateTo(View::Balance));
//! assert_eq!(state.fetch_needed(), Some(View::Balance));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::service::events::Event;
use crate::types::{Account, Credits, LedgerEntry, Post};

/// Screens of the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Posts,
    Balance,
    History,
    Profile,
}

impl View {
    pub const ALL: [View; 4] = [View::Posts, View::Balance, View::History, View::Profile];
}

/// Root dashboard state
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardState {
    /// Account whose data is shown
    pub account_id: Option<String>,

    pub current_view: View,

    pub profile: Option<Account>,
    pub posts: Vec<Post>,
    pub balance: Option<Credits>,
    pub history: Vec<LedgerEntry>,

    /// Views whose data must be fetched before it is shown again
    pub stale: BTreeSet<View>,

    /// Error overlay
    pub error: Option<String>,

    /// Status bar message
    pub status: Option<String>,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            account_id: None,
            current_view: View::Posts,
            profile: None,
            posts: Vec::new(),
            balance: None,
            history: Vec::new(),
            stale: View::ALL.into_iter().collect(),
            error: None,
            status: None,
        }
    }
}

impl DashboardState {
    pub fn for_account(account_id: impl Into<String>) -> Self {
        Self {
            account_id: Some(account_id.into()),
            ..Self::default()
        }
    }

    pub fn is_stale(&self, view: View) -> bool {
        self.stale.contains(&view)
    }

    /// The view the client must fetch now, if any
    pub fn fetch_needed(&self) -> Option<View> {
        if self.account_id.is_some() && self.is_stale(self.current_view) {
            Some(self.current_view)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    // === Navigation ===
    /// Show another account; everything is refetched
    SelectAccount(String),

    NavigateTo(View),

    // === Fetch results ===
    ProfileLoaded(Account),
    PostsLoaded(Vec<Post>),
    BalanceLoaded(Credits),
    HistoryLoaded(Vec<LedgerEntry>),

    // === Server events ===
    EventReceived(Event),

    // === Messages ===
    ShowError(String),
    DismissError,
    SetStatus(Option<String>),
}

/// Pure reducer: `(State, Action) -> State`
pub fn reduce(state: DashboardState, action: Action) -> DashboardState {
    match action {
        Action::SelectAccount(account_id) => {
            if state.account_id.as_deref() == Some(account_id.as_str()) {
                return state;
            }
            DashboardState {
                current_view: state.current_view,
                ..DashboardState::for_account(account_id)
            }
        }

        Action::NavigateTo(view) => DashboardState {
            current_view: view,
            ..state
        },

        Action::ProfileLoaded(profile) => DashboardState {
            stale: fresh(state.stale, View::Profile),
            profile: Some(profile),
            ..state
        },

        Action::PostsLoaded(posts) => DashboardState {
            stale: fresh(state.stale, View::Posts),
            posts,
            ..state
        },

        Action::BalanceLoaded(balance) => DashboardState {
            stale: fresh(state.stale, View::Balance),
            balance: Some(balance),
            ..state
        },

        Action::HistoryLoaded(history) => DashboardState {
            stale: fresh(state.stale, View::History),
            history,
            ..state
        },

        Action::EventReceived(event) => apply_event(state, event),

        Action::ShowError(message) => DashboardState {
            error: Some(message),
            ..state
        },

        Action::DismissError => DashboardState { error: None, ..state },

        Action::SetStatus(status) => DashboardState { status, ..state },
    }
}

fn apply_event(state: DashboardState, event: Event) -> DashboardState {
    if state.account_id.as_deref() != Some(event.account_id()) {
        return state;
    }

    let mut stale = state.stale.clone();
    stale.extend(event.invalidates().iter().copied());

    match event {
        // The event carries the new balance, only the history needs a fetch
        Event::BalanceChanged { balance, .. } => DashboardState {
            stale: fresh(stale, View::Balance),
            balance: Some(balance),
            ..state
        },

        Event::ReauthRequired { .. } => DashboardState {
            stale,
            status: Some("Facebook connection expired, reconnect the page".to_string()),
            ..state
        },

        Event::PostPublished { url, .. } => DashboardState {
            stale,
            status: Some(format!("Published: {}", url)),
            ..state
        },

        Event::PostFailed { message, .. } => DashboardState {
            stale,
            status: Some(format!("Post failed: {}", message)),
            ..state
        },

        _ => DashboardState { stale, ..state },
    }
}

fn fresh(mut stale: BTreeSet<View>, view: View) -> BTreeSet<View> {
    stale.remove(&view);
    stale
}
