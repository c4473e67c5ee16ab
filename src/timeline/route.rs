//! Navigation descriptors and their compact fragment form.
//!
//! Grammar (a leading `#` and `/` are tolerated when parsing, never emitted):
//!
//! | fragment                   | route                    |
//! |----------------------------|--------------------------|
//! | `feed/<id>/post/<postId>`  | `{feed_id, post_id}`     |
//! | `feed/<id>`                | `{feed_id}`              |
//! | `feed?url=<encoded>`       | `{feed_url}`             |
//! | `post/<id>`                | `{post_id}`              |
//! | empty                      | `{}`                     |

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt;

/// Characters escaped by `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Route {
    pub feed_id: Option<String>,
    pub feed_url: Option<String>,
    pub post_id: Option<String>,
}

impl Route {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn feed(feed_id: impl Into<String>) -> Self {
        Self {
            feed_id: Some(feed_id.into()),
            ..Self::default()
        }
    }

    pub fn feed_post(feed_id: impl Into<String>, post_id: impl Into<String>) -> Self {
        Self {
            feed_id: Some(feed_id.into()),
            feed_url: None,
            post_id: Some(post_id.into()),
        }
    }

    pub fn feed_url(url: impl Into<String>) -> Self {
        Self {
            feed_url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn post(post_id: impl Into<String>) -> Self {
        Self {
            post_id: Some(post_id.into()),
            ..Self::default()
        }
    }

    /// Route for an optional feed filter and an optional open post.
    pub fn from_parts(feed_id: Option<&str>, post_id: Option<&str>) -> Self {
        Self {
            feed_id: feed_id.map(str::to_string),
            feed_url: None,
            post_id: post_id.map(str::to_string),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.feed_id.is_none() && self.feed_url.is_none() && self.post_id.is_none()
    }

    /// Parse a location fragment. Unknown shapes yield the empty route.
    pub fn parse(fragment: &str) -> Self {
        let hash = fragment.trim().trim_start_matches('#').trim();
        if hash.is_empty() || hash == "/" {
            return Self::empty();
        }

        let (path, query) = match hash.split_once('?') {
            Some((path, query)) => (path, query),
            None => (hash, ""),
        };
        let segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(decode_component)
            .collect();
        let seg = |i: usize| segments.get(i).map(String::as_str).filter(|s| !s.is_empty());

        match (seg(0), seg(1), seg(2), seg(3)) {
            (Some("feed"), Some(feed_id), Some("post"), Some(post_id)) => {
                Self::feed_post(feed_id, post_id)
            }
            (Some("feed"), Some(feed_id), _, _) => Self::feed(feed_id),
            (Some("feed"), None, _, _) => url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == "url")
                .map(|(_, value)| Self::feed_url(value.into_owned()))
                .unwrap_or_default(),
            (Some("post"), Some(post_id), _, _) => Self::post(post_id),
            _ => Self::empty(),
        }
    }

    /// Serialize to the compact fragment form.
    ///
    /// A feed id wins over a feed URL, and a post is only kept alongside a
    /// feed id or on its own.
    pub fn to_fragment(&self) -> String {
        let feed_id = self.feed_id.as_deref().filter(|s| !s.is_empty());
        let post_id = self.post_id.as_deref().filter(|s| !s.is_empty());
        let feed_url = self.feed_url.as_deref().filter(|s| !s.is_empty());

        match (feed_id, feed_url, post_id) {
            (Some(feed), _, Some(post)) => format!("feed/{}/post/{}", encode(feed), encode(post)),
            (Some(feed), _, None) => format!("feed/{}", encode(feed)),
            (None, Some(url), _) => format!("feed?url={}", encode(url)),
            (None, None, Some(post)) => format!("post/{}", encode(post)),
            (None, None, None) => String::new(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_fragment())
    }
}

fn encode(component: &str) -> String {
    utf8_percent_encode(component, COMPONENT).to_string()
}

fn decode_component(component: &str) -> String {
    percent_decode_str(component).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_parse_feed_and_post() {
        assert_eq!(Route::parse("feed/42/post/p9"), Route::feed_post("42", "p9"));
        assert_eq!(Route::parse("#/feed/42/post/p9"), Route::feed_post("42", "p9"));
    }

    #[test]
    fn test_parse_feed_only() {
        assert_eq!(Route::parse("#/feed/42"), Route::feed("42"));
        assert_eq!(Route::parse("/feed/42/"), Route::feed("42"));
    }

    #[test]
    fn test_parse_feed_url() {
        assert_eq!(
            Route::parse("#/feed?url=https%3A%2F%2Fexample.com%2Ffeed.xml"),
            Route::feed_url("https://example.com/feed.xml")
        );
        assert_eq!(
            Route::parse("feed?url=a+b"),
            Route::feed_url("a b"),
            "plus decodes to space in the query"
        );
    }

    #[test]
    fn test_parse_post_only() {
        assert_eq!(Route::parse("post/abc"), Route::post("abc"));
    }

    #[test]
    fn test_parse_empty_and_unknown() {
        assert_eq!(Route::parse(""), Route::empty());
        assert_eq!(Route::parse("#/"), Route::empty());
        assert_eq!(Route::parse("settings/profile"), Route::empty());
        assert_eq!(Route::parse("feed"), Route::empty());
        assert_eq!(Route::parse("post"), Route::empty());
    }

    #[test]
    fn test_build_shapes() {
        assert_eq!(Route::feed_post("42", "p9").to_fragment(), "feed/42/post/p9");
        assert_eq!(Route::feed("42").to_fragment(), "feed/42");
        assert_eq!(
            Route::feed_url("https://example.com/feed.xml").to_fragment(),
            "feed?url=https%3A%2F%2Fexample.com%2Ffeed.xml"
        );
        assert_eq!(Route::post("p1").to_fragment(), "post/p1");
        assert_eq!(Route::empty().to_fragment(), "");
    }

    #[test]
    fn test_build_prefers_feed_id_over_url() {
        let route = Route {
            feed_id: Some("7".into()),
            feed_url: Some("https://x.test/feed".into()),
            post_id: None,
        };
        assert_eq!(route.to_fragment(), "feed/7");
    }

    #[test]
    fn test_components_are_escaped() {
        let route = Route::feed_post("a/b", "p 1?");
        let fragment = route.to_fragment();
        assert_eq!(fragment, "feed/a%2Fb/post/p%201%3F");
        assert_eq!(Route::parse(&fragment), route);
    }

    fn component() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 /?&=#%+:._~-]{1,16}"
    }

    proptest! {
        #[test]
        fn prop_feed_post_round_trips(feed in component(), post in component()) {
            let route = Route::feed_post(feed, post);
            prop_assert_eq!(Route::parse(&route.to_fragment()), route);
        }

        #[test]
        fn prop_feed_url_round_trips(url in component()) {
            let route = Route::feed_url(url);
            prop_assert_eq!(Route::parse(&route.to_fragment()), route);
        }

        #[test]
        fn prop_post_round_trips(post in component()) {
            let route = Route::post(post);
            prop_assert_eq!(Route::parse(&route.to_fragment()), route);
        }
    }
}
