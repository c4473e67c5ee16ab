//! Utility functions for common operations.
//!
//! - **URL handling**: lenient parsing with an `https://` fallback, host
//!   extraction and canonical forms for equality checks
//! - **Task helpers**: panic capture for spawned background work

mod task;
mod url;

pub use self::task::catch_task_panic;
pub use self::url::{host_of, normalize_href, parse_lenient};
