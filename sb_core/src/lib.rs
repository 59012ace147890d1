//! ABOUTME: Core types, errors, IDs, slugs, and tracing utilities
//! ABOUTME: Foundation crate used by all other stanbase components

pub mod error;
pub mod id;
pub mod slug;
pub mod telemetry;
pub mod time;

pub use error::{Error, Result};
pub use id::Id;
pub use slug::{slugify, unique_slug};
pub use time::{to_rfc3339, utc_now, MonotonicTimer};
