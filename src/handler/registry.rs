//! Handler registry mapping command names to handlers.
//!
//! Typed handlers are erased behind [`ErasedCommand`] so that commands with
//! different request/response types can share one table. The erased call
//! decodes `data`, runs the handler and produces a finished response
//! envelope.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = CommandRegistry::new();
//! registry.register("Scene", OpenScene)?;
//! registry.register("Scene", SaveScene)?;
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::command::{BoxFuture, CommandError, CommandHandler};
use super::text::render_text;
use super::CommandContext;
use crate::codec::JsonCodec;
use crate::error::{BridgeError, Result};
use crate::protocol::{OutputFormat, ResponseEnvelope};
use crate::schema::CommandDescriptor;

/// Module name of the dispatcher's own commands.
pub const CORE_MODULE: &str = "Core";

/// Message returned for unexpected handler faults.
pub fn internal_error_message(command: &str) -> String {
    format!(
        "Internal error while executing '{}'; see the host log for details",
        command
    )
}

/// Type-erased command.
pub trait ErasedCommand: Send + Sync + 'static {
    /// Decode `data`, execute and build the response envelope.
    fn call(
        &self,
        data: Option<String>,
        format: OutputFormat,
        ctx: CommandContext,
    ) -> BoxFuture<'static, ResponseEnvelope>;
}

/// Wrapper that deserializes `data` before calling the typed handler.
pub struct TypedCommand<H> {
    handler: Arc<H>,
}

impl<H: CommandHandler> TypedCommand<H> {
    /// Wrap a handler.
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }
}

fn render<H: CommandHandler>(
    handler: &H,
    response: &H::Response,
    format: OutputFormat,
) -> Result<(String, OutputFormat)> {
    if format == OutputFormat::Text {
        if let Some(text) = handler.format_text(response) {
            return Ok((text, OutputFormat::Text));
        }
        let value = serde_json::to_value(response)?;
        return Ok((render_text(&value), OutputFormat::Text));
    }
    Ok((JsonCodec::encode_string(response)?, OutputFormat::Json))
}

fn fault(command: &str, detail: &str) -> ResponseEnvelope {
    tracing::error!(command, error = %detail, "Command faulted");
    ResponseEnvelope::failure(internal_error_message(command))
}

impl<H: CommandHandler> ErasedCommand for TypedCommand<H> {
    fn call(
        &self,
        data: Option<String>,
        format: OutputFormat,
        ctx: CommandContext,
    ) -> BoxFuture<'static, ResponseEnvelope> {
        let handler = Arc::clone(&self.handler);

        Box::pin(async move {
            let name = handler.name().to_string();

            let request: H::Request = match JsonCodec::decode_or_default(data.as_deref()) {
                Ok(r) => r,
                Err(e) => {
                    return ResponseEnvelope::failure(format!(
                        "Invalid request data for '{}': {}",
                        name, e
                    ))
                }
            };

            match handler.execute(request, ctx).await {
                Ok(response) => match render(handler.as_ref(), &response, format) {
                    Ok((data, format)) => ResponseEnvelope::ok(data, format),
                    Err(e) => fault(&name, &e.to_string()),
                },
                Err(CommandError::Validation(message)) => ResponseEnvelope::failure(message),
                Err(CommandError::Failed {
                    message,
                    partial: None,
                }) => ResponseEnvelope::failure(message),
                Err(CommandError::Failed {
                    message,
                    partial: Some(partial),
                }) => match render(handler.as_ref(), &partial, format) {
                    Ok((data, format)) => {
                        ResponseEnvelope::failure_with_data(message, data, format)
                    }
                    Err(e) => {
                        tracing::warn!(command = %name, error = %e, "Dropping unserializable partial response");
                        ResponseEnvelope::failure(message)
                    }
                },
                Err(CommandError::Fault(detail)) => fault(&name, &detail),
            }
        })
    }
}

/// A registered command: its descriptor and erased handler.
#[derive(Clone)]
pub struct CommandEntry {
    /// Catalog description.
    pub descriptor: CommandDescriptor,
    /// Erased handler.
    pub command: Arc<dyn ErasedCommand>,
}

impl CommandEntry {
    fn new<H: CommandHandler>(module: &str, handler: H, built_in: bool) -> Self {
        let descriptor = CommandDescriptor {
            name: handler.name().to_string(),
            description: handler.description().to_string(),
            built_in,
            module: module.to_string(),
            request_fields: handler.request_fields(),
            response_fields: handler.response_fields(),
        };
        Self {
            descriptor,
            command: Arc::new(TypedCommand::new(handler)),
        }
    }

    /// Command name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Owning module.
    #[inline]
    pub fn module(&self) -> &str {
        &self.descriptor.module
    }

    /// Whether the dispatcher registered it.
    #[inline]
    pub fn is_built_in(&self) -> bool {
        self.descriptor.built_in
    }
}

/// Every command known to the host, enabled or not.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    entries: Vec<CommandEntry>,
    by_name: HashMap<String, usize>,
}

impl CommandRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a module.
    ///
    /// Fails with `DuplicateCommand` if the name is taken, whichever module
    /// took it.
    pub fn register<H: CommandHandler>(&mut self, module: &str, handler: H) -> Result<()> {
        self.insert(CommandEntry::new(module, handler, false))
    }

    pub(crate) fn register_builtin<H: CommandHandler>(&mut self, handler: H) -> Result<()> {
        self.insert(CommandEntry::new(CORE_MODULE, handler, true))
    }

    fn insert(&mut self, entry: CommandEntry) -> Result<()> {
        if let Some(&idx) = self.by_name.get(entry.name()) {
            return Err(BridgeError::DuplicateCommand {
                name: entry.name().to_string(),
                existing_module: self.entries[idx].module().to_string(),
                module: entry.module().to_string(),
            });
        }

        tracing::debug!(command = entry.name(), module = entry.module(), "Registered command");
        self.by_name
            .insert(entry.name().to_string(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    /// Get an entry by exact name.
    pub fn get(&self, name: &str) -> Option<&CommandEntry> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    /// Whether a name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Entries in registration order.
    pub fn entries(&self) -> &[CommandEntry] {
        &self.entries
    }

    /// Distinct module names.
    pub fn modules(&self) -> BTreeSet<String> {
        self.entries.iter().map(|e| e.module().to_string()).collect()
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
