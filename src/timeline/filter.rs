//! Visibility pipeline: base set (search, feed filter or segment), then
//! hide-read. Pure functions over the post list and a filter state.

use std::cmp::Ordering;
use std::collections::HashSet;

use super::post::{Post, Segment};

/// Hide-read mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HideRead {
    #[default]
    Off,
    /// Enabled without a captured snapshot: hide anything currently read.
    Live,
    /// Enabled with the read set frozen at the moment it was turned on.
    Snapshot(HashSet<String>),
}

impl HideRead {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, HideRead::Off)
    }

    pub fn has_snapshot(&self) -> bool {
        matches!(self, HideRead::Snapshot(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterState {
    pub segment: Segment,
    pub feed_filter: Option<String>,
    /// `Some` while search mode is active; the query may be empty.
    pub search: Option<String>,
    pub hide_read: HideRead,
    pub open_post: Option<String>,
}

/// Placeholder shown when nothing is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyState {
    /// A feed filter is active and matches nothing.
    NoPostsInFeed,
    /// The account has no subscriptions at all.
    NoSubscriptions,
    Empty,
}

/// Compute the visible posts in display order.
pub fn visible_posts<'a>(posts: &'a [Post], state: &FilterState) -> Vec<&'a Post> {
    let base = match &state.search {
        Some(query) => search_results(posts, query, state.feed_filter.as_deref()),
        None => match &state.feed_filter {
            Some(feed_id) => posts
                .iter()
                .filter(|p| p.feed_id.as_deref() == Some(feed_id.as_str()))
                .collect(),
            None => posts
                .iter()
                .filter(|p| state.segment.contains(p.age_bucket))
                .collect(),
        },
    };
    apply_hide_read(base, &state.hide_read, state.open_post.as_deref())
}

/// Posts matching a case-insensitive substring query, newest first.
/// Posts with unparseable timestamps sort last, keeping upstream order.
pub fn search_results<'a>(
    posts: &'a [Post],
    query: &str,
    feed_filter: Option<&str>,
) -> Vec<&'a Post> {
    let needle = query.trim().to_lowercase();
    let mut matches: Vec<_> = posts
        .iter()
        .filter(|p| feed_filter.is_none() || p.feed_id.as_deref() == feed_filter)
        .filter(|p| p.matches_query(&needle))
        .map(|p| (p.published(), p))
        .collect();
    matches.sort_by(|(a, _), (b, _)| match (a, b) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    matches.into_iter().map(|(_, p)| p).collect()
}

fn apply_hide_read<'a>(
    posts: Vec<&'a Post>,
    hide_read: &HideRead,
    open_post: Option<&str>,
) -> Vec<&'a Post> {
    let is_open = |p: &Post| open_post == Some(p.id.as_str());
    match hide_read {
        HideRead::Off => posts,
        HideRead::Live => posts
            .into_iter()
            .filter(|p| !p.is_read || is_open(p))
            .collect(),
        HideRead::Snapshot(hidden) => posts
            .into_iter()
            .filter(|p| !hidden.contains(&p.id) || is_open(p))
            .collect(),
    }
}

/// Pick the placeholder for an empty list.
pub fn empty_state(feed_filter_active: bool, subscription_count: Option<usize>) -> EmptyState {
    if feed_filter_active {
        EmptyState::NoPostsInFeed
    } else if subscription_count == Some(0) {
        EmptyState::NoSubscriptions
    } else {
        EmptyState::Empty
    }
}

/// Everything a renderer needs for the list pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineView {
    pub posts: Vec<Post>,
    pub empty_state: Option<EmptyState>,
    pub segment: Segment,
    pub feed_filter: Option<String>,
    pub feed_filter_label: Option<String>,
    pub search_query: Option<String>,
    pub hide_read: bool,
    pub open_post_id: Option<String>,
    /// True until the first load has been applied.
    pub loading: bool,
}
