//! Shared error definitions, logging setup and small utilities used across
//! all hive crates.

pub mod error;
pub mod logging;

pub use error::{Error, FromMessage, Result};

/// Replace control characters so values taken from configuration or peer
/// input cannot forge extra log lines.
pub fn sanitize_for_logging(input: &str) -> String {
    input
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect()
}
