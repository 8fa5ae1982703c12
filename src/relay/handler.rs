//! A command implemented by the relay peer.

use std::sync::Arc;

use serde_json::Value;

use super::bridge::RelayBridge;
use crate::handler::{BoxFuture, CommandContext, CommandError, CommandHandler, CommandResult};
use crate::schema::{CommandDescriptor, FieldDescriptor};

/// Forwards its request JSON to the relay peer and returns the reply.
///
/// Timeouts and cancellation surface as command failures.
pub struct RelayedCommand {
    name: String,
    description: String,
    request_fields: Vec<FieldDescriptor>,
    response_fields: Vec<FieldDescriptor>,
    bridge: Arc<RelayBridge>,
}

impl RelayedCommand {
    /// Relay `name` through `bridge`.
    pub fn new(name: impl Into<String>, bridge: Arc<RelayBridge>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            request_fields: Vec::new(),
            response_fields: Vec::new(),
            bridge,
        }
    }

    /// Relay a command advertised in the peer's catalog, keeping its schema.
    pub fn from_descriptor(descriptor: &CommandDescriptor, bridge: Arc<RelayBridge>) -> Self {
        Self {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            request_fields: descriptor.request_fields.clone(),
            response_fields: descriptor.response_fields.clone(),
            bridge,
        }
    }

    /// Set the catalog description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the request schema.
    pub fn with_request_fields(mut self, fields: Vec<FieldDescriptor>) -> Self {
        self.request_fields = fields;
        self
    }
}

impl CommandHandler for RelayedCommand {
    type Request = Value;
    type Response = Value;

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn request_fields(&self) -> Vec<FieldDescriptor> {
        self.request_fields.clone()
    }

    fn response_fields(&self) -> Vec<FieldDescriptor> {
        self.response_fields.clone()
    }

    fn execute<'a>(
        &'a self,
        request: Value,
        ctx: CommandContext,
    ) -> BoxFuture<'a, CommandResult<Value>> {
        Box::pin(async move {
            let data = match request {
                Value::Null => None,
                other => Some(other.to_string()),
            };
            let reply = self
                .bridge
                .send_command(&self.name, data, ctx.cancellation())
                .await?;
            serde_json::from_str::<Value>(&reply).map_err(|e| {
                CommandError::failed(format!("Relay peer sent an invalid reply: {}", e))
            })
        })
    }
}
