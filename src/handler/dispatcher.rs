//! Dispatch table and dispatcher.
//!
//! The active table is immutable. Enabling or disabling a module builds a
//! whole new table and swaps the `Arc` under a write lock, so a concurrent
//! dispatch sees either the old table or the new one and never a module
//! that is half present.
//!
//! ```text
//! Building ──► Active ──(enable/disable)──► Building ──► Active
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::builtin;
use super::registry::{internal_error_message, CommandEntry, CommandRegistry, CORE_MODULE};
use super::CommandContext;
use crate::error::{BridgeError, Result};
use crate::protocol::{RequestEnvelope, ResponseEnvelope};
use crate::schema::CommandCatalog;

/// Default deadline for a single dispatch.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Persistable module enablement state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSettings {
    /// Modules whose commands are left out of the dispatch table.
    #[serde(default)]
    pub disabled_modules: BTreeSet<String>,
}

impl ModuleSettings {
    /// Whether a module is enabled.
    pub fn is_enabled(&self, module: &str) -> bool {
        module == CORE_MODULE || !self.disabled_modules.contains(module)
    }
}

/// Enablement and commands of one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStatus {
    /// Module name.
    pub name: String,
    /// Whether its commands are dispatchable.
    pub enabled: bool,
    /// Command names, sorted.
    pub commands: Vec<String>,
}

/// An immutable snapshot mapping command names to handlers.
pub struct DispatchTable {
    version: u64,
    commands: HashMap<String, CommandEntry>,
}

impl DispatchTable {
    fn build(registry: &CommandRegistry, settings: &ModuleSettings, version: u64) -> Self {
        let commands = registry
            .entries()
            .iter()
            .filter(|e| e.is_built_in() || settings.is_enabled(e.module()))
            .map(|e| (e.name().to_string(), e.clone()))
            .collect();
        Self { version, commands }
    }

    /// Monotonic rebuild counter.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Look up a command by exact name.
    pub fn get(&self, name: &str) -> Option<&CommandEntry> {
        self.commands.get(name)
    }

    /// Whether a command is dispatchable.
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Number of dispatchable commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Dispatchable command names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.sort();
        names
    }

    /// Catalog of this table, sorted by name.
    pub fn catalog(&self) -> CommandCatalog {
        let mut commands: Vec<_> = self
            .commands
            .values()
            .map(|e| e.descriptor.clone())
            .collect();
        commands.sort_by(|a, b| a.name.cmp(&b.name));
        CommandCatalog { commands }
    }
}

/// Routes requests to handlers through the active dispatch table.
pub struct Dispatcher {
    registry: CommandRegistry,
    table: RwLock<Arc<DispatchTable>>,
    /// Held for the whole of a rebuild; serializes enable/disable.
    settings: Mutex<ModuleSettings>,
    request_timeout: Duration,
}

impl Dispatcher {
    /// Build a dispatcher over `registry`, with built-in commands added.
    ///
    /// Fails if a handler in `registry` uses a built-in command name.
    pub fn new(registry: CommandRegistry, settings: ModuleSettings) -> Result<Arc<Self>> {
        Self::with_timeout(registry, settings, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Like [`new`](Self::new) with a custom per-request deadline.
    pub fn with_timeout(
        mut registry: CommandRegistry,
        settings: ModuleSettings,
        request_timeout: Duration,
    ) -> Result<Arc<Self>> {
        if let Some(existing) = registry.modules().get(CORE_MODULE) {
            return Err(BridgeError::ProtectedModule(existing.clone()));
        }

        // Built-ins only need a weak handle; a placeholder is upgraded once
        // the Arc exists.
        let handle = builtin::DispatcherHandle::default();
        builtin::register_all(&mut registry, &handle)?;

        let table = DispatchTable::build(&registry, &settings, 1);
        tracing::info!(
            commands = table.len(),
            disabled = ?settings.disabled_modules,
            "Dispatch table built"
        );

        let dispatcher = Arc::new(Self {
            registry,
            table: RwLock::new(Arc::new(table)),
            settings: Mutex::new(settings),
            request_timeout,
        });
        handle.bind(&dispatcher);
        Ok(dispatcher)
    }

    /// The active dispatch table.
    pub fn table(&self) -> Arc<DispatchTable> {
        match self.table.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Catalog of the active table.
    pub fn catalog(&self) -> CommandCatalog {
        self.table().catalog()
    }

    /// Current enablement state.
    pub fn settings(&self) -> ModuleSettings {
        match self.settings.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// All registered modules with their state.
    pub fn modules(&self) -> Vec<ModuleStatus> {
        let settings = self.settings();
        self.registry
            .modules()
            .into_iter()
            .map(|name| {
                let mut commands: Vec<String> = self
                    .registry
                    .entries()
                    .iter()
                    .filter(|e| e.module() == name)
                    .map(|e| e.name().to_string())
                    .collect();
                commands.sort();
                ModuleStatus {
                    enabled: settings.is_enabled(&name),
                    name,
                    commands,
                }
            })
            .collect()
    }

    /// Enable a module and rebuild the table.
    ///
    /// Returns the new settings for the host to persist.
    pub fn enable_module(&self, module: &str) -> Result<ModuleSettings> {
        self.rebuild(module, true)
    }

    /// Disable a module and rebuild the table.
    pub fn disable_module(&self, module: &str) -> Result<ModuleSettings> {
        if module == CORE_MODULE {
            return Err(BridgeError::ProtectedModule(module.to_string()));
        }
        self.rebuild(module, false)
    }

    fn rebuild(&self, module: &str, enable: bool) -> Result<ModuleSettings> {
        if !self.registry.modules().contains(module) {
            return Err(BridgeError::UnknownModule(module.to_string()));
        }

        let mut settings = match self.settings.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut next = settings.clone();
        if enable {
            next.disabled_modules.remove(module);
        } else {
            next.disabled_modules.insert(module.to_string());
        }

        let version = self.table().version() + 1;
        let table = Arc::new(DispatchTable::build(&self.registry, &next, version));
        let count = table.len();

        match self.table.write() {
            Ok(mut guard) => *guard = table,
            Err(poisoned) => *poisoned.into_inner() = table,
        }
        *settings = next.clone();

        tracing::info!(
            module,
            enabled = enable,
            version,
            commands = count,
            "Dispatch table rebuilt"
        );
        Ok(next)
    }

    /// Execute one request against the active table.
    ///
    /// Never fails: every outcome, including unknown commands, cancellation
    /// and handler panics, becomes a response envelope.
    pub async fn dispatch(
        &self,
        request: RequestEnvelope,
        cancel: CancellationToken,
    ) -> ResponseEnvelope {
        let table = self.table();
        let Some(entry) = table.get(&request.command) else {
            tracing::debug!(command = %request.command, "Unknown command");
            return ResponseEnvelope::failure(
                BridgeError::UnknownCommand(request.command).to_string(),
            );
        };

        let command = request.command;
        let token = cancel.child_token();
        let ctx = CommandContext::with_cancellation(
            command.clone(),
            request.cwd.map(PathBuf::from),
            token.clone(),
        );

        tracing::debug!(command = %command, table_version = table.version(), "Dispatching");
        let mut task = tokio::spawn(entry.command.call(request.data, request.format, ctx));

        tokio::select! {
            joined = &mut task => match joined {
                Ok(response) => response,
                Err(e) if e.is_panic() => {
                    tracing::error!(command = %command, "Command handler panicked");
                    ResponseEnvelope::failure(internal_error_message(&command))
                }
                Err(_) => ResponseEnvelope::failure(format!("Command '{}' was cancelled", command)),
            },
            _ = cancel.cancelled() => {
                token.cancel();
                task.abort();
                tracing::debug!(command = %command, "Dispatch cancelled");
                ResponseEnvelope::failure(format!("Command '{}' was cancelled", command))
            }
            _ = tokio::time::sleep(self.request_timeout) => {
                token.cancel();
                task.abort();
                tracing::warn!(command = %command, timeout = ?self.request_timeout, "Command timed out");
                ResponseEnvelope::failure(format!(
                    "Command '{}' timed out after {:?}",
                    command, self.request_timeout
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{BoxFuture, CommandHandler, CommandResult, Empty};

    struct Named(&'static str);

    impl CommandHandler for Named {
        type Request = Empty;
        type Response = String;

        fn name(&self) -> &str {
            self.0
        }

        fn execute<'a>(
            &'a self,
            _request: Empty,
            _ctx: CommandContext,
        ) -> BoxFuture<'a, CommandResult<String>> {
            Box::pin(async move { Ok(self.0.to_string()) })
        }
    }

    struct Panics;

    impl CommandHandler for Panics {
        type Request = Empty;
        type Response = Empty;

        fn name(&self) -> &str {
            "Debug.Panic"
        }

        fn execute<'a>(
            &'a self,
            _request: Empty,
            _ctx: CommandContext,
        ) -> BoxFuture<'a, CommandResult<Empty>> {
            Box::pin(async { panic!("handler bug") })
        }
    }

    struct Sleeps;

    impl CommandHandler for Sleeps {
        type Request = Empty;
        type Response = Empty;

        fn name(&self) -> &str {
            "Debug.Sleep"
        }

        fn execute<'a>(
            &'a self,
            _request: Empty,
            _ctx: CommandContext,
        ) -> BoxFuture<'a, CommandResult<Empty>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Empty {})
            })
        }
    }

    fn registry() -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        registry.register("Scene", Named("Scene.Open")).unwrap();
        registry.register("Scene", Named("Scene.Save")).unwrap();
        registry.register("Asset", Named("Asset.Find")).unwrap();
        registry
    }

    #[tokio::test]
    async fn test_dispatch_known_command() {
        let dispatcher = Dispatcher::new(registry(), ModuleSettings::default()).unwrap();
        let resp = dispatcher
            .dispatch(RequestEnvelope::new("Scene.Open"), CancellationToken::new())
            .await;
        assert!(resp.success);
        assert_eq!(resp.data, r#""Scene.Open""#);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_command() {
        let dispatcher = Dispatcher::new(registry(), ModuleSettings::default()).unwrap();
        let resp = dispatcher
            .dispatch(RequestEnvelope::new("scene.open"), CancellationToken::new())
            .await;
        assert!(!resp.success);
        assert_eq!(resp.message, "Unknown command: scene.open");
    }

    #[test]
    fn test_initial_settings_respected() {
        let settings = ModuleSettings {
            disabled_modules: ["Scene".to_string()].into_iter().collect(),
        };
        let dispatcher = Dispatcher::new(registry(), settings).unwrap();
        let table = dispatcher.table();
        assert!(!table.contains("Scene.Open"));
        assert!(table.contains("Asset.Find"));
        assert!(table.contains("list"));
    }

    #[test]
    fn test_disable_and_enable_rebuild_whole_table() {
        let dispatcher = Dispatcher::new(registry(), ModuleSettings::default()).unwrap();
        let before = dispatcher.table();

        let settings = dispatcher.disable_module("Scene").unwrap();
        assert!(settings.disabled_modules.contains("Scene"));

        let after = dispatcher.table();
        assert_eq!(after.version(), before.version() + 1);
        assert!(!after.contains("Scene.Open"));
        assert!(!after.contains("Scene.Save"));
        // the old snapshot is untouched
        assert!(before.contains("Scene.Open"));

        dispatcher.enable_module("Scene").unwrap();
        let restored = dispatcher.table();
        assert!(restored.contains("Scene.Open"));
        assert!(restored.contains("Scene.Save"));
        assert!(dispatcher.settings().disabled_modules.is_empty());
    }

    #[test]
    fn test_unknown_and_protected_modules() {
        let dispatcher = Dispatcher::new(registry(), ModuleSettings::default()).unwrap();
        assert!(matches!(
            dispatcher.disable_module("Nope"),
            Err(BridgeError::UnknownModule(_))
        ));
        assert!(matches!(
            dispatcher.disable_module(CORE_MODULE),
            Err(BridgeError::ProtectedModule(_))
        ));
    }

    #[test]
    fn test_builtin_name_collision_is_rejected() {
        let mut registry = CommandRegistry::new();
        registry.register("Custom", Named("list")).unwrap();
        assert!(matches!(
            Dispatcher::new(registry, ModuleSettings::default()),
            Err(BridgeError::DuplicateCommand { .. })
        ));
    }

    #[test]
    fn test_modules_listing() {
        let dispatcher = Dispatcher::new(registry(), ModuleSettings::default()).unwrap();
        dispatcher.disable_module("Asset").unwrap();

        let modules = dispatcher.modules();
        let asset = modules.iter().find(|m| m.name == "Asset").unwrap();
        assert!(!asset.enabled);
        assert_eq!(asset.commands, vec!["Asset.Find".to_string()]);

        let core = modules.iter().find(|m| m.name == CORE_MODULE).unwrap();
        assert!(core.enabled);
        assert!(core.commands.contains(&"list".to_string()));
    }

    #[test]
    fn test_catalog_sorted() {
        let dispatcher = Dispatcher::new(registry(), ModuleSettings::default()).unwrap();
        let catalog = dispatcher.catalog();
        let names: Vec<_> = catalog.commands.iter().map(|c| c.name.clone()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(catalog.find("list").unwrap().built_in);
        assert!(!catalog.find("Asset.Find").unwrap().built_in);
    }

    #[tokio::test]
    async fn test_panicking_handler_becomes_generic_failure() {
        let mut registry = CommandRegistry::new();
        registry.register("Debug", Panics).unwrap();
        let dispatcher = Dispatcher::new(registry, ModuleSettings::default()).unwrap();

        let resp = dispatcher
            .dispatch(RequestEnvelope::new("Debug.Panic"), CancellationToken::new())
            .await;
        assert!(!resp.success);
        assert_eq!(resp.message, internal_error_message("Debug.Panic"));
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let mut registry = CommandRegistry::new();
        registry.register("Debug", Sleeps).unwrap();
        let dispatcher = Dispatcher::with_timeout(
            registry,
            ModuleSettings::default(),
            Duration::from_millis(50),
        )
        .unwrap();

        let resp = dispatcher
            .dispatch(RequestEnvelope::new("Debug.Sleep"), CancellationToken::new())
            .await;
        assert!(!resp.success);
        assert!(resp.message.contains("timed out"));
        assert!(!crate::retry::is_retryable_error(&resp.message));
    }

    #[tokio::test]
    async fn test_connection_cancellation() {
        let mut registry = CommandRegistry::new();
        registry.register("Debug", Sleeps).unwrap();
        let dispatcher = Dispatcher::new(registry, ModuleSettings::default()).unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let resp = dispatcher
            .dispatch(RequestEnvelope::new("Debug.Sleep"), cancel)
            .await;
        assert!(!resp.success);
        assert!(resp.message.contains("cancelled"));
    }
}
