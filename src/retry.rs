//! Transient-error classification and client retry policy.
//!
//! The transport boundary only carries free text, so retry decisions are
//! made from the failure message alone.

use std::time::Duration;

/// Phrases that identify a transport-level fault, lowercase.
const TRANSIENT_PHRASES: &[&str] = &[
    "closed connection unexpectedly",
    "connection closed unexpectedly",
    "communication error",
    "connection reset",
    "broken pipe",
];

/// Message used when the server hangs up before replying.
pub const CONNECTION_CLOSED_MESSAGE: &str = "Server closed connection unexpectedly";

/// Build the message used for I/O failures talking to the server.
pub fn communication_error(detail: impl std::fmt::Display) -> String {
    format!("Communication error: {}", detail)
}

/// Whether a failure message denotes a transient transport fault.
///
/// Case-insensitive substring match against a fixed phrase list. Empty
/// messages and application failures are never retryable.
///
/// ```
/// use cmdwire::retry::is_retryable_error;
///
/// assert!(is_retryable_error("Server closed connection unexpectedly"));
/// assert!(!is_retryable_error("Unknown command: Foo"));
/// ```
pub fn is_retryable_error(message: &str) -> bool {
    if message.is_empty() {
        return false;
    }
    let lower = message.to_lowercase();
    TRANSIENT_PHRASES.iter().any(|p| lower.contains(p))
}

/// How often and how patiently the client retries transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed
    /// with `message`.
    pub fn should_retry(&self, attempt: u32, message: &str) -> bool {
        attempt < self.max_attempts && is_retryable_error(message)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}
