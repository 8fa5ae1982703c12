//! Request context for handlers.
//!
//! Carries what a handler may need beyond its typed request: the command
//! name, the client's working directory and the cancellation signal for
//! this request. The signal fires when the connection goes away, when the
//! request deadline passes or when the server shuts down.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

/// Context passed to command handlers.
///
/// `CommandContext` is `Clone` and can be moved into spawned tasks.
#[derive(Debug, Clone)]
pub struct CommandContext {
    command: String,
    cwd: Option<PathBuf>,
    cancel: CancellationToken,
}

impl CommandContext {
    /// Create a context with a fresh, never-cancelled token.
    pub fn new(command: impl Into<String>) -> Self {
        Self::with_cancellation(command, None, CancellationToken::new())
    }

    /// Create a context bound to a cancellation token.
    pub fn with_cancellation(
        command: impl Into<String>,
        cwd: Option<PathBuf>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            command: command.into(),
            cwd,
            cancel,
        }
    }

    /// Name of the command being executed.
    #[inline]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Client working directory, if it sent one.
    #[inline]
    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// The request's cancellation signal.
    #[inline]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the request has been cancelled.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
