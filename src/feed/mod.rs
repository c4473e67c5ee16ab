//! Remote feed service access.
//!
//! - [`client`] - HTTP client for the Feedbin-compatible endpoints, implementing
//!   [`FeedApi`](crate::timeline::FeedApi)
//! - [`assemble`] - conversion of raw entries and subscriptions into posts
//! - [`wire`] - JSON request/response shapes

mod assemble;
mod client;
mod error;
pub mod wire;

pub use assemble::{assemble_timeline, icon_map, DEFAULT_AVATAR_URL};
pub use client::HttpFeedApi;
pub use error::ApiError;
