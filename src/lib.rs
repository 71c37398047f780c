//! Shared utility helpers for application services.
//!
//! Provides logging setup driven by layered YAML configuration, timestamp
//! conversion helpers, arithmetic wrappers that return defaults instead of
//! failing on degenerate input, and thin wrappers around tokio task spawning
//! that log unhandled failures instead of losing them.

pub mod async_utils;
pub mod error;
pub mod logging;
pub mod math_helpers;
pub mod timestamps;

// Re-exports for unified access
pub use crate::async_utils::{
    get_callers, safe_ensure_future, safe_gather, wait_til_next_tick, CallerFrame, TaskContext,
};
pub use crate::error::{Error, Result};
pub use crate::logging::{
    configure_logging_formatter, Formatter, InitOptions, LogConfigLoader,
};
pub use crate::math_helpers::{safe_div, safe_mean};
pub use crate::timestamps::{
    get_current_timestamp, timestamp_ms_to_str, timestamp_s_to_str, to_timestamp_ms, TimestampLike,
    TimestampMs, TimestampS,
};
