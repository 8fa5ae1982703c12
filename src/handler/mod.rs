//! Handler module - command registration and dispatch.
//!
//! Provides:
//! - [`CommandHandler`] - the typed handler contract
//! - [`CommandRegistry`] - every command known to the host, by module
//! - [`Dispatcher`] - routes requests through the active dispatch table
//! - [`CommandContext`] - per-request context with cancellation
//!
//! # Example
//!
//! ```ignore
//! use cmdwire::handler::{CommandRegistry, Dispatcher, ModuleSettings};
//!
//! let mut registry = CommandRegistry::new();
//! registry.register("Scene", OpenScene)?;
//!
//! let dispatcher = Dispatcher::new(registry, ModuleSettings::default())?;
//! let response = dispatcher.dispatch(request, cancel).await;
//! ```

mod builtin;
mod command;
mod context;
mod dispatcher;
mod registry;
mod text;

pub use builtin::{
    ModuleChangeResponse, ModuleListResponse, ModuleRequest, PingResponse, LIST_COMMAND,
};
pub use command::{BoxFuture, CommandError, CommandHandler, CommandResult, Empty};
pub use context::CommandContext;
pub use dispatcher::{
    DispatchTable, Dispatcher, ModuleSettings, ModuleStatus, DEFAULT_REQUEST_TIMEOUT,
};
pub use registry::{
    internal_error_message, CommandEntry, CommandRegistry, ErasedCommand, TypedCommand,
    CORE_MODULE,
};
pub use text::render_text;
