//! Timeline synchronization and read-state reconciliation.
//!
//! [`Timeline`] owns all state and is driven from a single task. Remote and
//! local I/O runs in spawned tasks that report back as [`SyncEvent`]s;
//! observers follow along through [`Notification`]s.

mod controller;
mod events;
mod filter;
mod history;
mod ledger;
mod optimistic;
mod ports;
mod post;
mod route;
mod scheduler;
mod store;
mod timer;
mod writer;

pub use controller::{Timeline, TimelineConfig};
pub use events::{Command, Notification, SyncEvent};
pub use filter::{
    empty_state, search_results, visible_posts, EmptyState, FilterState, HideRead, TimelineView,
};
pub use history::MemoryHistory;
pub use ledger::{ReadLedger, UnreadOutcome};
pub use optimistic::{FlagField, OptimisticFlag};
pub use ports::{FeedApi, History, LocalStore};
pub use post::{parse_timestamp, AgeBucket, Post, Segment, Subscription, TimelineData};
pub use route::Route;
pub use scheduler::{SyncScheduler, SyncState};
pub use store::PostStore;
pub use timer::{Debouncer, RefreshTimer};
