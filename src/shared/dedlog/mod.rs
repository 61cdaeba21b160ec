//! Deduplicated error logging for loops that can fail the same way many times.

pub mod log_entry;
pub mod sanitizer;

pub use log_entry::{err, start_dedup_logger, COMPONENT, FLUSH_INTERVAL};
pub use sanitizer::Sanitizer;
