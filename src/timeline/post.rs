//! Core timeline records: posts, age buckets, segments and subscriptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Age Buckets
// ============================================================================

/// Coarse age classification of a post, computed once per load.
///
/// `Day1` covers everything published less than 24 hours ago (including
/// future timestamps), `Day7` covers six days and older as well as posts
/// whose timestamp could not be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgeBucket {
    #[serde(rename = "day-1")]
    Day1,
    #[serde(rename = "day-2")]
    Day2,
    #[serde(rename = "day-3")]
    Day3,
    #[serde(rename = "day-4")]
    Day4,
    #[serde(rename = "day-5")]
    Day5,
    #[serde(rename = "day-6")]
    Day6,
    #[serde(rename = "day-7")]
    Day7,
}

impl AgeBucket {
    const ALL: [AgeBucket; 7] = [
        AgeBucket::Day1,
        AgeBucket::Day2,
        AgeBucket::Day3,
        AgeBucket::Day4,
        AgeBucket::Day5,
        AgeBucket::Day6,
        AgeBucket::Day7,
    ];

    /// Bucket for a post published at `published_at`, relative to `now`.
    ///
    /// Whole elapsed days are clamped to `0..=6` and shifted by one.
    pub fn from_timestamp(published_at: &str, now: DateTime<Utc>) -> Self {
        match parse_timestamp(published_at) {
            Some(published) => {
                let days = (now - published).num_days().clamp(0, 6);
                Self::ALL[days as usize]
            }
            None => AgeBucket::Day7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgeBucket::Day1 => "day-1",
            AgeBucket::Day2 => "day-2",
            AgeBucket::Day3 => "day-3",
            AgeBucket::Day4 => "day-4",
            AgeBucket::Day5 => "day-5",
            AgeBucket::Day6 => "day-6",
            AgeBucket::Day7 => "day-7",
        }
    }
}

impl fmt::Display for AgeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse an upstream timestamp. Accepts RFC 3339 and the space-separated
/// variant some feeds emit.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ============================================================================
// Segments
// ============================================================================

/// Named group of age buckets the timeline can be narrowed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    #[default]
    Today,
    Recent,
    Fading,
}

impl Segment {
    pub fn buckets(&self) -> &'static [AgeBucket] {
        match self {
            Segment::Today => &[AgeBucket::Day1],
            Segment::Recent => &[AgeBucket::Day2, AgeBucket::Day3],
            Segment::Fading => &[
                AgeBucket::Day4,
                AgeBucket::Day5,
                AgeBucket::Day6,
                AgeBucket::Day7,
            ],
        }
    }

    pub fn contains(&self, bucket: AgeBucket) -> bool {
        self.buckets().contains(&bucket)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::Today => "today",
            Segment::Recent => "recent",
            Segment::Fading => "fading",
        }
    }
}

impl FromStr for Segment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "today" => Ok(Segment::Today),
            "recent" => Ok(Segment::Recent),
            "fading" => Ok(Segment::Fading),
            other => Err(format!("unknown segment: {}", other)),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Posts & Subscriptions
// ============================================================================

/// A single timeline entry as shown to the reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub feed_id: Option<String>,
    pub source: String,
    pub source_url: String,
    pub title: String,
    pub summary: String,
    pub url: String,
    pub avatar_url: String,
    /// ISO-8601 string exactly as received.
    pub published_at: String,
    pub is_read: bool,
    pub is_bookmarked: bool,
    pub is_archived: bool,
    pub age_bucket: AgeBucket,
}

impl Post {
    pub fn published(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.published_at)
    }

    /// Case-insensitive substring match against the searchable text fields.
    /// `needle` must already be lowercased.
    pub(crate) fn matches_query(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        [&self.title, &self.summary, &self.source, &self.url]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Subscription {
    pub feed_id: String,
    pub title: String,
    pub site_url: String,
    pub feed_url: String,
}

impl Subscription {
    /// First non-blank of title, site URL and feed URL.
    pub fn label(&self) -> Option<&str> {
        [&self.title, &self.site_url, &self.feed_url]
            .into_iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
    }

    /// URL used to match a `feed?url=` route against this subscription.
    pub fn match_url(&self) -> &str {
        if self.feed_url.trim().is_empty() {
            self.site_url.trim()
        } else {
            self.feed_url.trim()
        }
    }
}

/// Result of one primary load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelineData {
    pub posts: Vec<Post>,
    pub subscriptions: Vec<Subscription>,
    /// `None` when the subscription count is unknown.
    pub subscription_count: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_bucket_recent_post_is_day_one() {
        assert_eq!(
            AgeBucket::from_timestamp("2024-05-10T08:00:00Z", now()),
            AgeBucket::Day1
        );
    }

    #[test]
    fn test_bucket_counts_whole_days() {
        assert_eq!(
            AgeBucket::from_timestamp("2024-05-08T13:00:00Z", now()),
            AgeBucket::Day2
        );
        assert_eq!(
            AgeBucket::from_timestamp("2024-05-08T11:00:00Z", now()),
            AgeBucket::Day3
        );
    }

    #[test]
    fn test_bucket_clamps_old_and_future() {
        assert_eq!(
            AgeBucket::from_timestamp("2024-04-01T00:00:00Z", now()),
            AgeBucket::Day7
        );
        assert_eq!(
            AgeBucket::from_timestamp("2024-06-01T00:00:00Z", now()),
            AgeBucket::Day1
        );
    }

    #[test]
    fn test_bucket_unparseable_is_day_seven() {
        assert_eq!(AgeBucket::from_timestamp("yesterday", now()), AgeBucket::Day7);
        assert_eq!(AgeBucket::from_timestamp("", now()), AgeBucket::Day7);
    }

    #[test]
    fn test_bucket_accepts_offsets() {
        assert_eq!(
            AgeBucket::from_timestamp("2024-05-10T10:00:00+02:00", now()),
            AgeBucket::Day1
        );
    }

    #[test]
    fn test_segment_buckets() {
        assert_eq!(Segment::Today.buckets(), &[AgeBucket::Day1]);
        assert!(Segment::Recent.contains(AgeBucket::Day3));
        assert!(!Segment::Recent.contains(AgeBucket::Day4));
        assert!(Segment::Fading.contains(AgeBucket::Day7));
        assert_eq!(Segment::default(), Segment::Today);
    }

    #[test]
    fn test_segment_from_str() {
        assert_eq!("Fading".parse::<Segment>(), Ok(Segment::Fading));
        assert!("later".parse::<Segment>().is_err());
    }

    #[test]
    fn test_age_bucket_serde_names() {
        let json = serde_json::to_string(&AgeBucket::Day4).unwrap();
        assert_eq!(json, "\"day-4\"");
    }

    #[test]
    fn test_subscription_label_falls_back() {
        let sub = Subscription {
            feed_id: "1".into(),
            title: "  ".into(),
            site_url: "".into(),
            feed_url: "https://example.com/feed".into(),
        };
        assert_eq!(sub.label(), Some("https://example.com/feed"));
        assert_eq!(Subscription::default().label(), None);
    }
}
