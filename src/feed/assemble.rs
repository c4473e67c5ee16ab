//! Turns raw API responses into timeline posts.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{HashMap, HashSet};

use super::wire::{RawEntry, RawIcon, RawSubscription};
use crate::timeline::{AgeBucket, Post, Subscription, TimelineData};
use crate::util::{host_of, normalize_href};

/// Avatar used until an icon for the source host is known.
pub const DEFAULT_AVATAR_URL: &str = "/images/blank_avatar.png";

/// Source name for entries whose subscription is unknown.
const FALLBACK_SOURCE: &str = "Feedbin";

/// Build the timeline from one round of API responses.
///
/// `unread_ids` is the server's unread set; every other entry is read.
/// `now` anchors the age buckets and fills in missing timestamps.
pub fn assemble_timeline(
    entries: Vec<RawEntry>,
    subscriptions: Vec<RawSubscription>,
    unread_ids: &HashSet<String>,
    icons: &[RawIcon],
    now: DateTime<Utc>,
) -> TimelineData {
    let icon_map = icon_map(icons);
    let by_feed: HashMap<&str, &RawSubscription> = subscriptions
        .iter()
        .map(|s| (s.feed_id.as_str(), s))
        .collect();

    let posts = entries
        .into_iter()
        .map(|entry| {
            let subscription = entry
                .feed_id
                .as_deref()
                .and_then(|feed_id| by_feed.get(feed_id).copied());
            let published_at = entry
                .timestamp()
                .map(str::to_string)
                .unwrap_or_else(|| now.to_rfc3339_opts(SecondsFormat::Millis, true));
            let age_bucket = AgeBucket::from_timestamp(&published_at, now);
            Post {
                is_read: !unread_ids.contains(&entry.id),
                source: source_name(subscription),
                source_url: source_url(subscription),
                avatar_url: avatar_url(subscription, &icon_map),
                id: entry.id,
                feed_id: entry.feed_id,
                title: entry.title,
                summary: entry.summary,
                url: entry.url,
                published_at,
                is_bookmarked: false,
                is_archived: false,
                age_bucket,
            }
        })
        .collect();

    let subscription_count = Some(subscriptions.len());
    let subscriptions = subscriptions
        .into_iter()
        .map(|s| Subscription {
            feed_id: s.feed_id,
            title: s.title,
            site_url: s.site_url,
            feed_url: s.feed_url,
        })
        .collect();

    TimelineData {
        posts,
        subscriptions,
        subscription_count,
    }
}

/// Host to icon URL, skipping incomplete records.
pub fn icon_map(icons: &[RawIcon]) -> HashMap<String, String> {
    icons
        .iter()
        .filter(|i| !i.host.is_empty() && !i.url.is_empty())
        .map(|i| (i.host.clone(), i.url.clone()))
        .collect()
}

fn source_name(subscription: Option<&RawSubscription>) -> String {
    subscription
        .and_then(|s| {
            [&s.title, &s.site_url, &s.feed_url]
                .into_iter()
                .find(|v| !v.is_empty())
        })
        .cloned()
        .unwrap_or_else(|| FALLBACK_SOURCE.to_string())
}

fn raw_site_url(subscription: &RawSubscription) -> &str {
    if subscription.site_url.is_empty() {
        &subscription.feed_url
    } else {
        &subscription.site_url
    }
}

fn source_url(subscription: Option<&RawSubscription>) -> String {
    subscription
        .and_then(|s| normalize_href(raw_site_url(s)))
        .unwrap_or_default()
}

fn avatar_url(subscription: Option<&RawSubscription>, icons: &HashMap<String, String>) -> String {
    let Some(subscription) = subscription else {
        return DEFAULT_AVATAR_URL.to_string();
    };
    let json_icon = subscription.json_feed.as_ref().and_then(|meta| {
        [&meta.icon, &meta.favicon]
            .into_iter()
            .flatten()
            .find(|v| !v.is_empty())
    });
    if let Some(icon) = json_icon {
        return icon.clone();
    }
    host_of(raw_site_url(subscription))
        .and_then(|host| icons.get(&host).cloned())
        .unwrap_or_else(|| DEFAULT_AVATAR_URL.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::wire::JsonFeedMeta;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn entry(id: &str, feed_id: &str, published: &str) -> RawEntry {
        RawEntry {
            id: id.into(),
            feed_id: Some(feed_id.into()),
            title: format!("Entry {}", id),
            summary: String::new(),
            url: format!("https://site.test/{}", id),
            published: Some(published.into()),
            created_at: None,
        }
    }

    fn subscription(feed_id: &str) -> RawSubscription {
        RawSubscription {
            id: None,
            feed_id: feed_id.into(),
            title: "Site".into(),
            feed_url: "https://site.test/feed.xml".into(),
            site_url: "site.test".into(),
            json_feed: None,
        }
    }

    #[test]
    fn test_read_flags_from_unread_set() {
        let unread: HashSet<String> = ["1".to_string()].into();
        let data = assemble_timeline(
            vec![
                entry("1", "9", "2024-05-10T08:00:00Z"),
                entry("2", "9", "2024-05-10T08:00:00Z"),
            ],
            vec![subscription("9")],
            &unread,
            &[],
            now(),
        );
        assert!(!data.posts[0].is_read);
        assert!(data.posts[1].is_read);
        assert_eq!(data.subscription_count, Some(1));
    }

    #[test]
    fn test_source_fields_from_subscription() {
        let data = assemble_timeline(
            vec![entry("1", "9", "2024-05-07T08:00:00Z")],
            vec![subscription("9")],
            &HashSet::new(),
            &[RawIcon {
                host: "site.test".into(),
                url: "https://icons.test/site.png".into(),
            }],
            now(),
        );
        let post = &data.posts[0];
        assert_eq!(post.source, "Site");
        assert_eq!(post.source_url, "https://site.test/");
        assert_eq!(post.avatar_url, "https://icons.test/site.png");
        assert_eq!(post.age_bucket, AgeBucket::Day4);
    }

    #[test]
    fn test_unknown_subscription_uses_fallbacks() {
        let data = assemble_timeline(
            vec![entry("1", "404", "2024-05-10T08:00:00Z")],
            vec![],
            &HashSet::new(),
            &[],
            now(),
        );
        let post = &data.posts[0];
        assert_eq!(post.source, "Feedbin");
        assert_eq!(post.source_url, "");
        assert_eq!(post.avatar_url, DEFAULT_AVATAR_URL);
        assert_eq!(data.subscription_count, Some(0));
    }

    #[test]
    fn test_json_feed_icon_wins() {
        let mut sub = subscription("9");
        sub.json_feed = Some(JsonFeedMeta {
            icon: None,
            favicon: Some("https://site.test/favicon.ico".into()),
        });
        let data = assemble_timeline(
            vec![entry("1", "9", "2024-05-10T08:00:00Z")],
            vec![sub],
            &HashSet::new(),
            &[],
            now(),
        );
        assert_eq!(data.posts[0].avatar_url, "https://site.test/favicon.ico");
    }

    #[test]
    fn test_missing_timestamp_uses_now() {
        let mut raw = entry("1", "9", "");
        raw.published = None;
        let data = assemble_timeline(vec![raw], vec![], &HashSet::new(), &[], now());
        assert_eq!(data.posts[0].published_at, "2024-05-10T12:00:00.000Z");
        assert_eq!(data.posts[0].age_bucket, AgeBucket::Day1);
    }
}
