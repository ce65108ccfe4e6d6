//! Utility functions

pub mod ids;
pub mod time;
pub mod validation;

pub use ids::{fingerprint, generate_id};
pub use time::{format_duration, now_utc};
pub use validation::{sanitize_string, truncate_utf8};
