//! Foundational low-level utilities shared across chatlens crates.
//!
//! Provides durable JSON saves, time utilities used for summary timestamps and
//! search windows, and character-aware text helpers used by extraction and summary
//! screening.

pub mod json_file;
pub mod text_utils;
pub mod time_utils;

pub use json_file::save_json_atomic;
pub use text_utils::{count_alphabetic, truncate_chars, truncate_words, word_count};
pub use time_utils::{current_unix_timestamp_ms, unix_ms_days_before};
