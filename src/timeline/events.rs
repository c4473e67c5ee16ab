use std::collections::{HashMap, HashSet};

use super::optimistic::OptimisticFlag;
use super::post::{Segment, TimelineData};
use super::route::Route;

// ============================================================================
// Outbound Notifications
// ============================================================================

/// Broadcast to observers whenever engine state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The post collection was replaced or enriched.
    DataChanged,
    SyncStarted { token: u64 },
    SyncStopped { token: u64 },
    SyncFailed { error: String },
    /// A non-empty initial route is waiting for the first load.
    ResolvingRoute,
    PostOpened { post_id: String },
    SelectionCleared,
    ReadStateChanged { post_ids: Vec<String>, is_read: bool },
    BookmarkChanged { post_id: String, is_bookmarked: bool },
    RouteChanged { route: Route },
    /// Segment, search, feed filter or hide-read changed.
    FilterChanged,
    MarkAllReadFailed { error: String },
}

// ============================================================================
// Internal Completion Events
// ============================================================================

/// Results reported back by background tasks.
///
/// Each spawned task sends exactly one of these, so the controller can count
/// outstanding work.
#[derive(Debug)]
pub enum SyncEvent {
    TimelineLoaded {
        token: u64,
        result: Result<(TimelineData, HashSet<String>), String>,
    },
    IconsLoaded {
        token: u64,
        result: Result<HashMap<String, String>, String>,
    },
    StarredLoaded {
        token: u64,
        result: Result<HashSet<String>, String>,
    },
    ReadFlushCompleted {
        ids: Vec<String>,
        result: Result<(), String>,
    },
    BulkReadCompleted {
        ids: Vec<String>,
        result: Result<(), String>,
    },
    RemoteUnreadCompleted {
        post_id: String,
        result: Result<(), String>,
    },
    BookmarkCompleted {
        flag: OptimisticFlag,
        result: Result<(), String>,
    },
    HideReadLoaded {
        result: Result<bool, String>,
    },
    LocalWriteFinished {
        op: &'static str,
        result: Result<(), String>,
    },
}

// ============================================================================
// Commands
// ============================================================================

/// User-level commands accepted by `Timeline::run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    OpenPost(String),
    ClearSelection,
    SetFeedFilter {
        feed_id: String,
        label: Option<String>,
    },
    ClearFeedFilter,
    SetSegment(Segment),
    SetSearchQuery(String),
    ClearSearch,
    SelectFirstSearchResult,
    ToggleHideRead,
    ToggleBookmark,
    MarkRead(String),
    MarkUnread(String),
    MarkAllRead,
    MarkVisibleRead,
    SelectAdjacent(isize),
    TriggerSync,
    LocationChanged(String),
    Shutdown,
}
