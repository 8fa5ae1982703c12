//! The command handler contract.
//!
//! A handler declares one request type and one response type. The
//! dispatcher decodes the request, runs the handler and folds its outcome
//! into a response envelope. Rendering the response as text is an optional
//! second capability: handlers that don't override
//! [`CommandHandler::format_text`] get a generic dump.

use std::future::Future;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::CommandContext;
use crate::error::{BridgeError, RelayError};
use crate::schema::FieldDescriptor;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result type for handler executions.
pub type CommandResult<R> = std::result::Result<R, CommandError<R>>;

/// Canonical empty request/response body. Serializes as `{}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// Ways a handler can fail.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError<R> {
    /// The request was invalid (bad or missing argument).
    Validation(String),
    /// The command ran but did not succeed. May carry a partial response.
    Failed {
        /// Failure description shown to the caller.
        message: String,
        /// Diagnostic payload attached to the failed response.
        partial: Option<R>,
    },
    /// Something unexpected went wrong. Details are logged, not returned.
    Fault(String),
}

impl<R> CommandError<R> {
    /// Invalid request.
    pub fn invalid(message: impl Into<String>) -> Self {
        CommandError::Validation(message.into())
    }

    /// Command failure without payload.
    pub fn failed(message: impl Into<String>) -> Self {
        CommandError::Failed {
            message: message.into(),
            partial: None,
        }
    }

    /// Command failure with a partial response.
    pub fn failed_with(message: impl Into<String>, partial: R) -> Self {
        CommandError::Failed {
            message: message.into(),
            partial: Some(partial),
        }
    }

    /// Unexpected fault.
    pub fn fault(detail: impl Into<String>) -> Self {
        CommandError::Fault(detail.into())
    }

    /// The failure text.
    pub fn message(&self) -> &str {
        match self {
            CommandError::Validation(m) | CommandError::Fault(m) => m,
            CommandError::Failed { message, .. } => message,
        }
    }
}

impl<R> From<RelayError> for CommandError<R> {
    fn from(err: RelayError) -> Self {
        CommandError::failed(err.to_string())
    }
}

impl<R> From<BridgeError> for CommandError<R> {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Relay(relay) => relay.into(),
            BridgeError::UnknownModule(_) | BridgeError::ProtectedModule(_) => {
                CommandError::invalid(err.to_string())
            }
            other => CommandError::fault(other.to_string()),
        }
    }
}

/// A named command implementation.
///
/// # Example
///
/// ```
/// use cmdwire::handler::{BoxFuture, CommandContext, CommandHandler, CommandResult};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Deserialize, Default)]
/// #[serde(default)]
/// struct EchoRequest { message: String }
///
/// #[derive(Serialize)]
/// struct EchoResponse { echo: String }
///
/// struct Echo;
///
/// impl CommandHandler for Echo {
///     type Request = EchoRequest;
///     type Response = EchoResponse;
///
///     fn name(&self) -> &str { "Debug.Echo" }
///
///     fn execute<'a>(
///         &'a self,
///         request: EchoRequest,
///         _ctx: CommandContext,
///     ) -> BoxFuture<'a, CommandResult<EchoResponse>> {
///         Box::pin(async move { Ok(EchoResponse { echo: request.message }) })
///     }
/// }
/// ```
pub trait CommandHandler: Send + Sync + 'static {
    /// Request body. Absent `data` decodes to `Default::default()`.
    type Request: DeserializeOwned + Default + Send + 'static;
    /// Response body.
    type Response: Serialize + Send + 'static;

    /// Routing key, unique across all modules.
    fn name(&self) -> &str;

    /// One-line description for the catalog.
    fn description(&self) -> &str {
        ""
    }

    /// Request schema used by clients to compile CLI arguments.
    fn request_fields(&self) -> Vec<FieldDescriptor> {
        Vec::new()
    }

    /// Response schema.
    fn response_fields(&self) -> Vec<FieldDescriptor> {
        Vec::new()
    }

    /// Run the command.
    fn execute<'a>(
        &'a self,
        request: Self::Request,
        ctx: CommandContext,
    ) -> BoxFuture<'a, CommandResult<Self::Response>>;

    /// Render the response for `--format text`. `None` falls back to the
    /// generic dump.
    fn format_text(&self, _response: &Self::Response) -> Option<String> {
        None
    }
}
