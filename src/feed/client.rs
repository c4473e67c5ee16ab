use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use futures::StreamExt;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use super::assemble::{assemble_timeline, icon_map};
use super::error::ApiError;
use super::wire::{decode_id_list, EntryIdsBody, RawEntry, RawIcon, RawSubscription, WireId};
use crate::timeline::{parse_timestamp, FeedApi, TimelineData};

/// Upper bound for a single JSON response.
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Safety valve for entry pagination.
const MAX_PAGES: u32 = 100;

/// Client for the Feedbin-compatible endpoints served by micro.blog.
pub struct HttpFeedApi {
    client: reqwest::Client,
    base_url: String,
    token: SecretString,
    entries_per_page: u32,
    max_entry_age: ChronoDuration,
    request_timeout: Duration,
    max_retries: u32,
}

impl std::fmt::Debug for HttpFeedApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFeedApi")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .field("entries_per_page", &self.entries_per_page)
            .finish()
    }
}

impl HttpFeedApi {
    /// Create a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InsecureBaseUrl` for plain-HTTP URLs other than
    /// localhost, since the bearer token would travel in the clear.
    pub fn new(base_url: &str, token: SecretString) -> Result<Self, ApiError> {
        let base = base_url.trim().trim_end_matches('/');
        let parsed = url::Url::parse(base).map_err(|e| ApiError::InvalidBaseUrl(e.to_string()))?;
        match parsed.scheme() {
            "https" => {}
            "http" => {
                let is_localhost = matches!(parsed.host_str(), Some("localhost" | "127.0.0.1"));
                if !is_localhost {
                    tracing::error!(base_url = %base, "Rejecting non-HTTPS base URL (HTTPS required except for localhost)");
                    return Err(ApiError::InsecureBaseUrl);
                }
                tracing::warn!(base_url = %base, "Using non-HTTPS API base URL (localhost only)");
            }
            other => return Err(ApiError::InvalidBaseUrl(format!("unsupported scheme {}", other))),
        }

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base.to_string(),
            token,
            entries_per_page: 50,
            max_entry_age: ChronoDuration::days(7),
            request_timeout: Duration::from_secs(30),
            max_retries: 2,
        })
    }

    pub fn with_entries_per_page(mut self, per_page: u32) -> Self {
        self.entries_per_page = per_page.max(1);
        self
    }

    pub fn with_max_entry_age_days(mut self, days: i64) -> Self {
        self.max_entry_age = ChronoDuration::days(days.max(1));
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    // ========================================================================
    // Transport
    // ========================================================================

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(self.token.expose_secret())
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = tokio::time::timeout(self.request_timeout, request.send())
            .await
            .map_err(|_| ApiError::Timeout(self.request_timeout.as_secs()))??;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(%method, path, status = status.as_u16(), "API request failed");
            return Err(ApiError::HttpStatus {
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            });
        }

        read_limited(response, MAX_RESPONSE_SIZE).await
    }

    /// GET with exponential backoff on transient failures (1s, 2s, ...).
    async fn get(&self, path: &str) -> Result<Vec<u8>, ApiError> {
        let mut retry_count = 0;
        loop {
            match self.send(Method::GET, path, None).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() && retry_count < self.max_retries => {
                    let delay = 1u64 << retry_count;
                    tracing::debug!(
                        error = %e,
                        path,
                        retry = retry_count + 1,
                        delay_secs = delay,
                        "Retrying API request after transient error"
                    );
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let bytes = self.get(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send_ids(
        &self,
        method: Method,
        path: &str,
        body: EntryIdsBody<'_>,
    ) -> Result<(), ApiError> {
        let body = serde_json::to_vec(&body)?;
        self.send(method, path, Some(body)).await.map(|_| ())
    }

    // ========================================================================
    // Endpoints
    // ========================================================================

    pub async fn fetch_subscriptions(&self) -> Result<Vec<RawSubscription>, ApiError> {
        self.get_json("/feeds/subscriptions.json?mode=extended").await
    }

    /// Entries newest-first, paging until one is older than the age cutoff.
    pub async fn fetch_entries(&self) -> Result<Vec<RawEntry>, ApiError> {
        let cutoff = Utc::now() - self.max_entry_age;
        let mut entries = Vec::new();

        for page in 1..=MAX_PAGES {
            let path = format!(
                "/feeds/entries.json?per_page={}&page={}",
                self.entries_per_page, page
            );
            let batch: Vec<RawEntry> = self.get_json(&path).await?;
            if batch.is_empty() {
                break;
            }

            let stop = batch.iter().position(|entry| {
                entry
                    .timestamp()
                    .and_then(parse_timestamp)
                    .is_some_and(|published| published < cutoff)
            });
            match stop {
                Some(index) => {
                    entries.extend(batch.into_iter().take(index));
                    break;
                }
                None => entries.extend(batch),
            }
            if page == MAX_PAGES {
                tracing::warn!(pages = MAX_PAGES, "Stopped paging entries at page limit");
            }
        }

        tracing::debug!(count = entries.len(), "Fetched entries");
        Ok(entries)
    }

    pub async fn fetch_unread_ids(&self) -> Result<HashSet<String>, ApiError> {
        let bytes = self.get("/feeds/unread_entries.json").await?;
        Ok(decode_id_list(&bytes)?.into_iter().collect())
    }

    pub async fn fetch_starred_ids(&self) -> Result<HashSet<String>, ApiError> {
        let bytes = self.get("/feeds/starred_entries.json").await?;
        Ok(decode_id_list(&bytes)?.into_iter().collect())
    }

    pub async fn fetch_icons(&self) -> Result<Vec<RawIcon>, ApiError> {
        self.get_json("/feeds/icons.json").await
    }
}

#[async_trait]
impl FeedApi for HttpFeedApi {
    async fn load_timeline_data(&self) -> Result<TimelineData, ApiError> {
        let (subscriptions, entries, unread, icons) = tokio::try_join!(
            self.fetch_subscriptions(),
            self.fetch_entries(),
            self.fetch_unread_ids(),
            self.fetch_icons(),
        )?;
        tracing::info!(
            entries = entries.len(),
            subscriptions = subscriptions.len(),
            unread = unread.len(),
            "Timeline data loaded"
        );
        Ok(assemble_timeline(
            entries,
            subscriptions,
            &unread,
            &icons,
            Utc::now(),
        ))
    }

    async fn load_icon_map(&self) -> Result<HashMap<String, String>, ApiError> {
        Ok(icon_map(&self.fetch_icons().await?))
    }

    async fn load_starred_ids(&self) -> Result<HashSet<String>, ApiError> {
        self.fetch_starred_ids().await
    }

    async fn set_starred(&self, ids: &[String]) -> Result<(), ApiError> {
        if ids.is_empty() {
            return Ok(());
        }
        let body = EntryIdsBody {
            unread_entries: None,
            starred_entries: Some(WireId::list(ids)),
        };
        self.send_ids(Method::POST, "/feeds/starred_entries.json", body)
            .await
    }

    async fn clear_starred(&self, ids: &[String]) -> Result<(), ApiError> {
        if ids.is_empty() {
            return Ok(());
        }
        let body = EntryIdsBody {
            unread_entries: None,
            starred_entries: Some(WireId::list(ids)),
        };
        self.send_ids(Method::DELETE, "/feeds/starred_entries.json", body)
            .await
    }

    async fn mark_entries_read(&self, ids: &[String]) -> Result<(), ApiError> {
        if ids.is_empty() {
            return Ok(());
        }
        let body = EntryIdsBody {
            unread_entries: Some(WireId::list(ids)),
            starred_entries: None,
        };
        self.send_ids(Method::DELETE, "/feeds/unread_entries.json", body)
            .await
    }

    async fn mark_entries_unread(&self, ids: &[String]) -> Result<(), ApiError> {
        if ids.is_empty() {
            return Ok(());
        }
        let body = EntryIdsBody {
            unread_entries: Some(WireId::list(ids)),
            starred_entries: None,
        };
        self.send_ids(Method::POST, "/feeds/unread_entries.json", body)
            .await
    }
}

async fn read_limited(response: reqwest::Response, limit: usize) -> Result<Vec<u8>, ApiError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ApiError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ApiError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}
