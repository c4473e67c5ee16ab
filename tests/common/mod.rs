//! Shared test doubles for the timeline integration suites.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use inkwell::feed::ApiError;
use inkwell::timeline::{
    AgeBucket, FeedApi, LocalStore, MemoryHistory, Notification, Post, Subscription, Timeline,
    TimelineConfig, TimelineData,
};

// ============================================================================
// Fixtures
// ============================================================================

pub fn post(id: &str, feed_id: &str, bucket: AgeBucket) -> Post {
    Post {
        id: id.to_string(),
        feed_id: Some(feed_id.to_string()),
        source: format!("Feed {}", feed_id),
        source_url: format!("https://feed{}.example/", feed_id),
        title: format!("Post {}", id),
        summary: String::new(),
        url: format!("https://feed{}.example/{}", feed_id, id),
        avatar_url: "/images/blank_avatar.png".to_string(),
        published_at: "2024-05-10T08:00:00Z".to_string(),
        is_read: false,
        is_bookmarked: false,
        is_archived: false,
        age_bucket: bucket,
    }
}

pub fn subscription(feed_id: &str, title: &str) -> Subscription {
    Subscription {
        feed_id: feed_id.to_string(),
        title: title.to_string(),
        site_url: format!("https://feed{}.example/", feed_id),
        feed_url: format!("https://feed{}.example/feed.xml", feed_id),
    }
}

pub fn timeline_data(posts: Vec<Post>, subscriptions: Vec<Subscription>) -> TimelineData {
    TimelineData {
        subscription_count: Some(subscriptions.len()),
        posts,
        subscriptions,
    }
}

/// Two unread posts from feed 1, both from today.
pub fn two_posts() -> TimelineData {
    timeline_data(
        vec![post("p1", "1", AgeBucket::Day1), post("p2", "1", AgeBucket::Day1)],
        vec![subscription("1", "Feed One")],
    )
}

// ============================================================================
// MockFeedApi
// ============================================================================

#[derive(Default)]
struct ApiState {
    data: TimelineData,
    icons: HashMap<String, String>,
    starred: HashSet<String>,
    fail_loads: bool,
    fail_mark_read: usize,
    fail_starred_writes: bool,
    load_calls: usize,
    icon_calls: usize,
    read_batches: Vec<Vec<String>>,
    unread_batches: Vec<Vec<String>>,
    starred_writes: Vec<(String, bool)>,
}

/// In-memory feed service that records every call.
#[derive(Default)]
pub struct MockFeedApi {
    state: Mutex<ApiState>,
}

impl MockFeedApi {
    pub fn new(data: TimelineData) -> Arc<Self> {
        let api = Self::default();
        api.with(|s| s.data = data);
        Arc::new(api)
    }

    fn with<R>(&self, f: impl FnOnce(&mut ApiState) -> R) -> R {
        let mut guard = self.state.lock().unwrap();
        f(&mut guard)
    }

    pub fn set_data(&self, data: TimelineData) {
        self.with(|s| s.data = data);
    }

    pub fn set_icons(&self, icons: HashMap<String, String>) {
        self.with(|s| s.icons = icons);
    }

    pub fn set_starred(&self, starred: &[&str]) {
        self.with(|s| s.starred = starred.iter().map(|id| id.to_string()).collect());
    }

    pub fn fail_loads(&self, fail: bool) {
        self.with(|s| s.fail_loads = fail);
    }

    /// Fail the next `times` mark-read calls.
    pub fn fail_mark_read(&self, times: usize) {
        self.with(|s| s.fail_mark_read = times);
    }

    pub fn fail_starred_writes(&self, fail: bool) {
        self.with(|s| s.fail_starred_writes = fail);
    }

    pub fn load_calls(&self) -> usize {
        self.with(|s| s.load_calls)
    }

    pub fn icon_calls(&self) -> usize {
        self.with(|s| s.icon_calls)
    }

    pub fn read_batches(&self) -> Vec<Vec<String>> {
        self.with(|s| s.read_batches.clone())
    }

    pub fn unread_batches(&self) -> Vec<Vec<String>> {
        self.with(|s| s.unread_batches.clone())
    }

    pub fn starred_writes(&self) -> Vec<(String, bool)> {
        self.with(|s| s.starred_writes.clone())
    }
}

fn unavailable() -> ApiError {
    ApiError::HttpStatus {
        status: 503,
        body: "unavailable".to_string(),
    }
}

#[async_trait]
impl FeedApi for MockFeedApi {
    async fn load_timeline_data(&self) -> Result<TimelineData, ApiError> {
        self.with(|s| {
            s.load_calls += 1;
            if s.fail_loads {
                Err(unavailable())
            } else {
                Ok(s.data.clone())
            }
        })
    }

    async fn load_icon_map(&self) -> Result<HashMap<String, String>, ApiError> {
        self.with(|s| {
            s.icon_calls += 1;
            Ok(s.icons.clone())
        })
    }

    async fn load_starred_ids(&self) -> Result<HashSet<String>, ApiError> {
        self.with(|s| Ok(s.starred.clone()))
    }

    async fn set_starred(&self, ids: &[String]) -> Result<(), ApiError> {
        self.with(|s| {
            s.starred_writes.extend(ids.iter().map(|id| (id.clone(), true)));
            if s.fail_starred_writes {
                return Err(unavailable());
            }
            s.starred.extend(ids.iter().cloned());
            Ok(())
        })
    }

    async fn clear_starred(&self, ids: &[String]) -> Result<(), ApiError> {
        self.with(|s| {
            s.starred_writes.extend(ids.iter().map(|id| (id.clone(), false)));
            if s.fail_starred_writes {
                return Err(unavailable());
            }
            for id in ids {
                s.starred.remove(id);
            }
            Ok(())
        })
    }

    async fn mark_entries_read(&self, ids: &[String]) -> Result<(), ApiError> {
        self.with(|s| {
            s.read_batches.push(ids.to_vec());
            if s.fail_mark_read > 0 {
                s.fail_mark_read -= 1;
                return Err(unavailable());
            }
            Ok(())
        })
    }

    async fn mark_entries_unread(&self, ids: &[String]) -> Result<(), ApiError> {
        self.with(|s| {
            s.unread_batches.push(ids.to_vec());
            Ok(())
        })
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory local store.
#[derive(Default)]
pub struct MemoryStore {
    read: Mutex<HashSet<String>>,
    hide_read: Mutex<bool>,
}

impl MemoryStore {
    pub fn with_read(ids: &[&str]) -> Arc<Self> {
        let store = Self::default();
        store
            .read
            .lock()
            .unwrap()
            .extend(ids.iter().map(|id| id.to_string()));
        Arc::new(store)
    }

    pub fn read_ids(&self) -> HashSet<String> {
        self.read.lock().unwrap().clone()
    }

    pub fn set_hide_read(&self, enabled: bool) {
        *self.hide_read.lock().unwrap() = enabled;
    }

    pub fn hide_read(&self) -> bool {
        *self.hide_read.lock().unwrap()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn load_read_ids(&self) -> anyhow::Result<HashSet<String>> {
        Ok(self.read_ids())
    }

    async fn persist_read_id(&self, id: &str) -> anyhow::Result<()> {
        self.read.lock().unwrap().insert(id.to_string());
        Ok(())
    }

    async fn persist_read_ids(&self, ids: &[String]) -> anyhow::Result<()> {
        self.read.lock().unwrap().extend(ids.iter().cloned());
        Ok(())
    }

    async fn clear_persisted_read_id(&self, id: &str) -> anyhow::Result<()> {
        self.read.lock().unwrap().remove(id);
        Ok(())
    }

    async fn load_hide_read(&self) -> anyhow::Result<bool> {
        Ok(self.hide_read())
    }

    async fn save_hide_read(&self, enabled: bool) -> anyhow::Result<()> {
        self.set_hide_read(enabled);
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub api: Arc<MockFeedApi>,
    pub local: Arc<MemoryStore>,
    pub history: Arc<MemoryHistory>,
    pub timeline: Timeline,
    pub notifications: broadcast::Receiver<Notification>,
}

impl Harness {
    /// Build an engine without starting it.
    pub fn new(api: Arc<MockFeedApi>, local: Arc<MemoryStore>, location: &str) -> Self {
        let history = Arc::new(MemoryHistory::new(location));
        let api_port: Arc<dyn FeedApi> = api.clone();
        let local_port: Arc<dyn LocalStore> = local.clone();
        let timeline = Timeline::new(
            api_port,
            local_port,
            history.clone(),
            TimelineConfig::default(),
        );
        let notifications = timeline.subscribe();
        Self {
            api,
            local,
            history,
            timeline,
            notifications,
        }
    }

    /// Build, start and apply the first load.
    pub async fn started(data: TimelineData, location: &str) -> Self {
        let mut harness = Self::new(MockFeedApi::new(data), Arc::new(MemoryStore::default()), location);
        harness.timeline.start();
        harness.timeline.settle().await;
        harness
    }

    /// Notifications received since the last call.
    pub fn drain(&mut self) -> Vec<Notification> {
        let mut seen = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            seen.push(notification);
        }
        seen
    }

    /// Let the debounce window pass and apply the resulting flush.
    pub async fn flush_after(&mut self, delay: std::time::Duration) {
        tokio::time::advance(delay).await;
        self.timeline.tick();
        self.timeline.settle().await;
    }
}
