//! Echo Host - a small command host.
//!
//! This demo shows:
//! - Implementing typed command handlers
//! - Grouping them in modules and starting the server
//! - Relaying a command to a second runtime over a chunked side channel
//!
//! # Running
//!
//! ```text
//! cargo run --example echo_host -- /path/to/project
//! cmdwire --project /path/to/project Debug.Echo --message hello
//! cmdwire --project /path/to/project Math.Add --values 1 --values 2 --format text
//! cmdwire --project /path/to/project Peer.Reverse --text hello
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cmdwire::handler::{BoxFuture, CommandContext, CommandError, CommandHandler, CommandResult};
use cmdwire::relay::{
    split_into_chunks, ChannelRelayTransport, RelayBridge, RelayConfig, RelayPeer, RelayedCommand,
};
use cmdwire::schema::{CommandCatalog, CommandDescriptor, FieldDescriptor, FieldType, ScalarType};
use cmdwire::transport::endpoint_for_project;
use cmdwire::Server;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Deserialize, Default)]
#[serde(default)]
struct EchoInput {
    message: String,
}

#[derive(Serialize)]
struct EchoOutput {
    echo: String,
}

struct Echo;

impl CommandHandler for Echo {
    type Request = EchoInput;
    type Response = EchoOutput;

    fn name(&self) -> &str {
        "Debug.Echo"
    }

    fn description(&self) -> &str {
        "Return the message unchanged"
    }

    fn request_fields(&self) -> Vec<FieldDescriptor> {
        vec![FieldDescriptor::new("message", FieldType::STRING)]
    }

    fn execute<'a>(
        &'a self,
        request: EchoInput,
        _ctx: CommandContext,
    ) -> BoxFuture<'a, CommandResult<EchoOutput>> {
        Box::pin(async move {
            if request.message.is_empty() {
                return Err(CommandError::invalid("Missing required field 'message'"));
            }
            Ok(EchoOutput {
                echo: request.message,
            })
        })
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct AddInput {
    values: Vec<f64>,
}

#[derive(Serialize)]
struct AddOutput {
    sum: f64,
}

struct Add;

impl CommandHandler for Add {
    type Request = AddInput;
    type Response = AddOutput;

    fn name(&self) -> &str {
        "Math.Add"
    }

    fn description(&self) -> &str {
        "Sum a list of numbers"
    }

    fn request_fields(&self) -> Vec<FieldDescriptor> {
        vec![FieldDescriptor::new(
            "values",
            FieldType::Array(ScalarType::Double),
        )]
    }

    fn execute<'a>(
        &'a self,
        request: AddInput,
        _ctx: CommandContext,
    ) -> BoxFuture<'a, CommandResult<AddOutput>> {
        Box::pin(async move {
            Ok(AddOutput {
                sum: request.values.iter().sum(),
            })
        })
    }

    fn format_text(&self, response: &AddOutput) -> Option<String> {
        Some(response.sum.to_string())
    }
}

/// Stand-in for the second runtime: reverses `text` and replies in
/// 8-byte chunks.
fn peer_catalog() -> CommandCatalog {
    CommandCatalog {
        commands: vec![CommandDescriptor {
            name: "Peer.Reverse".to_string(),
            description: "Reverse text in the peer runtime".to_string(),
            built_in: false,
            module: "Peer".to_string(),
            request_fields: vec![FieldDescriptor::new("text", FieldType::STRING)],
            response_fields: vec![FieldDescriptor::new("reversed", FieldType::STRING)],
        }],
    }
}

/// Stand-in for the second runtime: answers catalog queries and reverses text.
async fn run_peer(mut peer: RelayPeer) {
    while let Some(message) = peer.recv().await {
        let reply = if message.is_catalog_query() {
            serde_json::to_value(peer_catalog()).unwrap_or_default()
        } else {
            let text = message
                .data
                .as_deref()
                .and_then(|d| serde_json::from_str::<serde_json::Value>(d).ok())
                .and_then(|v| v.get("text").and_then(|t| t.as_str()).map(str::to_string))
                .unwrap_or_default();
            serde_json::json!({ "reversed": text.chars().rev().collect::<String>() })
        };
        for chunk in split_into_chunks(message.request_id, &reply.to_string(), 8) {
            peer.deliver(chunk);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let root = match std::env::args().nth(1) {
        Some(p) => PathBuf::from(p),
        None => std::env::current_dir()?,
    };

    let (transport, peer) = ChannelRelayTransport::pair();
    let config = RelayConfig::default().with_catalog_timeout(Duration::from_secs(5));
    let bridge = Arc::new(RelayBridge::with_config(Arc::new(transport), config));
    tokio::spawn(run_peer(peer));

    // Serve whatever the peer advertises, with the peer's own schema.
    let catalog = bridge.query_catalog(&CancellationToken::new()).await?;
    let mut builder = Server::builder().command("Debug", Echo).command("Math", Add);
    for descriptor in &catalog.commands {
        builder = builder.command(
            &descriptor.module,
            RelayedCommand::from_descriptor(descriptor, Arc::clone(&bridge)),
        );
    }
    let server = Arc::new(builder.build()?);

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    server.run(&endpoint_for_project(&root)).await?;
    bridge.dispose();
    Ok(())
}
