//! Commands the dispatcher registers on its own, under the `Core` module.
//!
//! They are always present in the dispatch table regardless of module
//! settings.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock, Weak};

use serde::{Deserialize, Serialize};

use super::command::{BoxFuture, CommandError, CommandHandler, CommandResult, Empty};
use super::dispatcher::{Dispatcher, ModuleStatus};
use super::registry::CommandRegistry;
use super::CommandContext;
use crate::error::Result;
use crate::protocol::{PROTOCOL_VERSION, SERVER_VERSION};
use crate::schema::{CommandCatalog, FieldDescriptor, FieldType};

/// Name of the catalog command.
pub const LIST_COMMAND: &str = "list";

/// Late-bound reference from built-ins back to their dispatcher.
///
/// Built-ins are registered before the dispatcher exists; the handle is
/// bound once it does. A weak reference avoids a cycle through the table.
#[derive(Clone, Default)]
pub(crate) struct DispatcherHandle(Arc<OnceLock<Weak<Dispatcher>>>);

impl DispatcherHandle {
    pub(crate) fn bind(&self, dispatcher: &Arc<Dispatcher>) {
        let _ = self.0.set(Arc::downgrade(dispatcher));
    }

    fn get<R>(&self) -> std::result::Result<Arc<Dispatcher>, CommandError<R>> {
        self.0
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| CommandError::fault("dispatcher is gone"))
    }
}

pub(crate) fn register_all(registry: &mut CommandRegistry, handle: &DispatcherHandle) -> Result<()> {
    registry.register_builtin(ListCommand(handle.clone()))?;
    registry.register_builtin(ModuleList(handle.clone()))?;
    registry.register_builtin(ModuleToggle {
        handle: handle.clone(),
        enable: true,
    })?;
    registry.register_builtin(ModuleToggle {
        handle: handle.clone(),
        enable: false,
    })?;
    registry.register_builtin(Ping(handle.clone()))?;
    Ok(())
}

struct ListCommand(DispatcherHandle);

impl CommandHandler for ListCommand {
    type Request = Empty;
    type Response = CommandCatalog;

    fn name(&self) -> &str {
        LIST_COMMAND
    }

    fn description(&self) -> &str {
        "List the commands currently available"
    }

    fn response_fields(&self) -> Vec<FieldDescriptor> {
        vec![FieldDescriptor::new("commands", "CommandDescriptor[]")]
    }

    fn execute<'a>(
        &'a self,
        _request: Empty,
        _ctx: CommandContext,
    ) -> BoxFuture<'a, CommandResult<CommandCatalog>> {
        Box::pin(async move { Ok(self.0.get()?.catalog()) })
    }

    fn format_text(&self, catalog: &CommandCatalog) -> Option<String> {
        let width = catalog
            .commands
            .iter()
            .map(|c| c.name.len())
            .max()
            .unwrap_or(0);
        let lines: Vec<String> = catalog
            .commands
            .iter()
            .map(|c| {
                if c.description.is_empty() {
                    c.name.clone()
                } else {
                    format!("{:width$}  {}", c.name, c.description, width = width)
                }
            })
            .collect();
        Some(lines.join("\n"))
    }
}

/// Response of `Module.List`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleListResponse {
    /// Every registered module.
    pub modules: Vec<ModuleStatus>,
}

struct ModuleList(DispatcherHandle);

impl CommandHandler for ModuleList {
    type Request = Empty;
    type Response = ModuleListResponse;

    fn name(&self) -> &str {
        "Module.List"
    }

    fn description(&self) -> &str {
        "List command modules and whether they are enabled"
    }

    fn response_fields(&self) -> Vec<FieldDescriptor> {
        vec![FieldDescriptor::new("modules", "ModuleStatus[]")]
    }

    fn execute<'a>(
        &'a self,
        _request: Empty,
        _ctx: CommandContext,
    ) -> BoxFuture<'a, CommandResult<ModuleListResponse>> {
        Box::pin(async move {
            Ok(ModuleListResponse {
                modules: self.0.get()?.modules(),
            })
        })
    }

    fn format_text(&self, response: &ModuleListResponse) -> Option<String> {
        let lines: Vec<String> = response
            .modules
            .iter()
            .map(|m| {
                let state = if m.enabled { "enabled" } else { "disabled" };
                format!("{} ({}, {} commands)", m.name, state, m.commands.len())
            })
            .collect();
        Some(lines.join("\n"))
    }
}

/// Request of `Module.Enable` and `Module.Disable`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleRequest {
    /// Module to toggle.
    pub module: String,
}

/// Response of `Module.Enable` and `Module.Disable`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleChangeResponse {
    /// Module that was toggled.
    pub module: String,
    /// Its new state.
    pub enabled: bool,
    /// All disabled modules after the change.
    pub disabled_modules: BTreeSet<String>,
}

struct ModuleToggle {
    handle: DispatcherHandle,
    enable: bool,
}

impl CommandHandler for ModuleToggle {
    type Request = ModuleRequest;
    type Response = ModuleChangeResponse;

    fn name(&self) -> &str {
        if self.enable {
            "Module.Enable"
        } else {
            "Module.Disable"
        }
    }

    fn description(&self) -> &str {
        if self.enable {
            "Enable a command module"
        } else {
            "Disable a command module"
        }
    }

    fn request_fields(&self) -> Vec<FieldDescriptor> {
        vec![FieldDescriptor::new("module", FieldType::STRING)]
    }

    fn execute<'a>(
        &'a self,
        request: ModuleRequest,
        _ctx: CommandContext,
    ) -> BoxFuture<'a, CommandResult<ModuleChangeResponse>> {
        Box::pin(async move {
            let module = request.module.trim();
            if module.is_empty() {
                return Err(CommandError::invalid("Missing required field 'module'"));
            }

            let dispatcher = self.handle.get()?;
            let settings = if self.enable {
                dispatcher.enable_module(module)?
            } else {
                dispatcher.disable_module(module)?
            };

            Ok(ModuleChangeResponse {
                module: module.to_string(),
                enabled: self.enable,
                disabled_modules: settings.disabled_modules,
            })
        })
    }

    fn format_text(&self, response: &ModuleChangeResponse) -> Option<String> {
        let state = if response.enabled { "enabled" } else { "disabled" };
        Some(format!("Module '{}' {}", response.module, state))
    }
}

/// Response of `ping`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    /// Host crate version.
    pub server_version: String,
    /// Wire protocol version.
    pub protocol_version: u16,
    /// Version of the active dispatch table.
    pub table_version: u64,
}

struct Ping(DispatcherHandle);

impl CommandHandler for Ping {
    type Request = Empty;
    type Response = PingResponse;

    fn name(&self) -> &str {
        "ping"
    }

    fn description(&self) -> &str {
        "Check that the host is alive"
    }

    fn execute<'a>(
        &'a self,
        _request: Empty,
        _ctx: CommandContext,
    ) -> BoxFuture<'a, CommandResult<PingResponse>> {
        Box::pin(async move {
            Ok(PingResponse {
                server_version: SERVER_VERSION.to_string(),
                protocol_version: PROTOCOL_VERSION,
                table_version: self.0.get()?.table().version(),
            })
        })
    }
}
