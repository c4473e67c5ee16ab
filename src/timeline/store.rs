use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::post::{Post, Subscription, TimelineData};

/// In-memory post collection plus the subscription snapshot of the last load.
///
/// Posts sit behind an `Arc` so readers can hold a cheap snapshot; every
/// mutation goes through `Arc::make_mut` on the owning task.
#[derive(Debug, Clone, Default)]
pub struct PostStore {
    posts: Arc<Vec<Post>>,
    index: HashMap<String, usize>,
    subscriptions: Arc<Vec<Subscription>>,
    subscription_count: Option<usize>,
    loaded: bool,
}

impl PostStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything with the result of a load.
    pub fn replace(&mut self, data: TimelineData) {
        self.index = data
            .posts
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i))
            .collect();
        self.posts = Arc::new(data.posts);
        self.subscriptions = Arc::new(data.subscriptions);
        self.subscription_count = data.subscription_count;
        self.loaded = true;
    }

    /// True once the first load has been applied.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn snapshot(&self) -> Arc<Vec<Post>> {
        Arc::clone(&self.posts)
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub fn subscription_count(&self) -> Option<usize> {
        self.subscription_count
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn get(&self, id: &str) -> Option<&Post> {
        self.index.get(id).map(|&i| &self.posts[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Post> {
        let i = *self.index.get(id)?;
        Arc::make_mut(&mut self.posts).get_mut(i)
    }

    /// Set `is_read` on one post. Returns false if the post is unknown.
    pub fn set_read(&mut self, id: &str, is_read: bool) -> bool {
        match self.get_mut(id) {
            Some(post) => {
                post.is_read = is_read;
                true
            }
            None => false,
        }
    }

    pub fn set_bookmarked(&mut self, id: &str, bookmarked: bool) -> bool {
        match self.get_mut(id) {
            Some(post) => {
                post.is_bookmarked = bookmarked;
                true
            }
            None => false,
        }
    }

    /// Re-derive every `is_read` flag from the ledger's read set.
    pub fn sync_read_flags(&mut self, read_ids: &HashSet<String>) {
        let needs_update = self
            .posts
            .iter()
            .any(|p| p.is_read != read_ids.contains(&p.id));
        if !needs_update {
            return;
        }
        for post in Arc::make_mut(&mut self.posts).iter_mut() {
            post.is_read = read_ids.contains(&post.id);
        }
    }

    /// Replace avatars that are still the placeholder with the icon for the
    /// post's source host. Returns the number of posts changed.
    pub fn apply_icons(
        &mut self,
        icons: &HashMap<String, String>,
        placeholder: &str,
        host_of: impl Fn(&str) -> Option<String>,
    ) -> usize {
        let targets: Vec<(usize, String)> = self
            .posts
            .iter()
            .enumerate()
            .filter(|(_, p)| p.avatar_url == placeholder)
            .filter_map(|(i, p)| {
                let host = host_of(&p.source_url)?;
                icons.get(&host).map(|icon| (i, icon.clone()))
            })
            .collect();
        if targets.is_empty() {
            return 0;
        }
        let posts = Arc::make_mut(&mut self.posts);
        for (i, icon) in &targets {
            posts[*i].avatar_url = icon.clone();
        }
        targets.len()
    }

    /// Set `is_bookmarked` from the starred id set, leaving posts in `skip`
    /// untouched. Returns the number of posts changed.
    pub fn apply_starred(&mut self, starred: &HashSet<String>, skip: &HashSet<String>) -> usize {
        let targets: Vec<usize> = self
            .posts
            .iter()
            .enumerate()
            .filter(|(_, p)| !skip.contains(&p.id))
            .filter(|(_, p)| p.is_bookmarked != starred.contains(&p.id))
            .map(|(i, _)| i)
            .collect();
        if targets.is_empty() {
            return 0;
        }
        let posts = Arc::make_mut(&mut self.posts);
        for i in &targets {
            posts[*i].is_bookmarked = !posts[*i].is_bookmarked;
        }
        targets.len()
    }

    /// True if any post or subscription carries this feed id.
    pub fn has_feed(&self, feed_id: &str) -> bool {
        self.posts
            .iter()
            .any(|p| p.feed_id.as_deref() == Some(feed_id))
            || self.subscriptions.iter().any(|s| s.feed_id == feed_id)
    }

    pub fn subscription(&self, feed_id: &str) -> Option<&Subscription> {
        self.subscriptions.iter().find(|s| s.feed_id == feed_id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::timeline::post::AgeBucket;

    pub(crate) fn post(id: &str) -> Post {
        Post {
            id: id.to_string(),
            feed_id: Some("1".to_string()),
            source: "Example".to_string(),
            source_url: "https://example.com".to_string(),
            title: format!("Post {}", id),
            summary: String::new(),
            url: format!("https://example.com/{}", id),
            avatar_url: "/images/blank_avatar.png".to_string(),
            published_at: "2024-05-10T08:00:00Z".to_string(),
            is_read: false,
            is_bookmarked: false,
            is_archived: false,
            age_bucket: AgeBucket::Day1,
        }
    }

    fn store_with(ids: &[&str]) -> PostStore {
        let mut store = PostStore::new();
        store.replace(TimelineData {
            posts: ids.iter().map(|id| post(id)).collect(),
            subscriptions: vec![],
            subscription_count: None,
        });
        store
    }

    #[test]
    fn test_replace_indexes_posts() {
        let store = store_with(&["a", "b"]);
        assert!(store.is_loaded());
        assert_eq!(store.get("b").map(|p| p.title.as_str()), Some("Post b"));
        assert!(store.get("c").is_none());
    }

    #[test]
    fn test_mutation_does_not_touch_snapshot() {
        let mut store = store_with(&["a"]);
        let before = store.snapshot();
        store.set_read("a", true);
        assert!(!before[0].is_read);
        assert!(store.get("a").unwrap().is_read);
    }

    #[test]
    fn test_sync_read_flags() {
        let mut store = store_with(&["a", "b"]);
        store.set_read("b", true);
        let read: HashSet<String> = ["a".to_string()].into_iter().collect();
        store.sync_read_flags(&read);
        assert!(store.get("a").unwrap().is_read);
        assert!(!store.get("b").unwrap().is_read);
    }

    #[test]
    fn test_apply_icons_only_replaces_placeholder() {
        let mut store = store_with(&["a", "b"]);
        store.get_mut("b").unwrap().avatar_url = "https://cdn/b.png".to_string();
        let icons: HashMap<String, String> =
            [("example.com".to_string(), "https://cdn/icon.png".to_string())]
                .into_iter()
                .collect();
        let changed = store.apply_icons(&icons, "/images/blank_avatar.png", |u| {
            url::Url::parse(u).ok()?.host_str().map(str::to_string)
        });
        assert_eq!(changed, 1);
        assert_eq!(store.get("a").unwrap().avatar_url, "https://cdn/icon.png");
        assert_eq!(store.get("b").unwrap().avatar_url, "https://cdn/b.png");
    }

    #[test]
    fn test_apply_starred_skips_in_flight() {
        let mut store = store_with(&["a", "b"]);
        let starred: HashSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        let skip: HashSet<String> = ["b".to_string()].into_iter().collect();
        assert_eq!(store.apply_starred(&starred, &skip), 1);
        assert!(store.get("a").unwrap().is_bookmarked);
        assert!(!store.get("b").unwrap().is_bookmarked);
    }
}
