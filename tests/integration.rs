//! Integration tests for cmdwire.
//!
//! These tests run a real host and client against each other over
//! in-memory duplex streams and, on Unix, over a socket.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cmdwire::args::{compile_args, extract_format};
use cmdwire::handler::{
    BoxFuture, CommandContext, CommandError, CommandHandler, CommandResult, Empty, LIST_COMMAND,
};
use cmdwire::relay::{
    split_into_chunks, ChannelRelayTransport, RelayBridge, RelayConfig, RelayedCommand,
};
use cmdwire::retry::RetryPolicy;
use cmdwire::schema::{CommandCatalog, FieldDescriptor, FieldType, ScalarType};
use cmdwire::{exchange, OutputFormat, RequestEnvelope, Server};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::duplex;
use tokio_util::sync::CancellationToken;

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct BuildRequest {
    target: String,
    jobs: i32,
    features: Vec<String>,
    release: bool,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
struct BuildResponse {
    summary: String,
}

struct Build;

impl CommandHandler for Build {
    type Request = BuildRequest;
    type Response = BuildResponse;

    fn name(&self) -> &str {
        "Build.Run"
    }

    fn request_fields(&self) -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::new("target", FieldType::STRING),
            FieldDescriptor::new("jobs", FieldType::INT),
            FieldDescriptor::new("features", FieldType::STRING_ARRAY),
            FieldDescriptor::new("release", FieldType::BOOL),
        ]
    }

    fn execute<'a>(
        &'a self,
        request: BuildRequest,
        _ctx: CommandContext,
    ) -> BoxFuture<'a, CommandResult<BuildResponse>> {
        Box::pin(async move {
            if request.target.is_empty() {
                return Err(CommandError::invalid("Missing required field 'target'"));
            }
            Ok(BuildResponse {
                summary: format!(
                    "{} jobs={} features={} release={}",
                    request.target,
                    request.jobs,
                    request.features.join(","),
                    request.release
                ),
            })
        })
    }
}

struct Named(&'static str);

impl CommandHandler for Named {
    type Request = Empty;
    type Response = Empty;

    fn name(&self) -> &str {
        self.0
    }

    fn execute<'a>(
        &'a self,
        _request: Empty,
        _ctx: CommandContext,
    ) -> BoxFuture<'a, CommandResult<Empty>> {
        Box::pin(async { Ok(Empty {}) })
    }
}

fn server() -> Arc<Server> {
    Arc::new(
        Server::builder()
            .command("Build", Build)
            .command("Scene", Named("Scene.Open"))
            .command("Scene", Named("Scene.Save"))
            .command("Scene", Named("Scene.Close"))
            .build()
            .unwrap(),
    )
}

/// Run one request through a fresh in-memory connection.
async fn call(server: &Arc<Server>, request: RequestEnvelope) -> cmdwire::ResponseEnvelope {
    let (client, host) = duplex(64 * 1024);
    let server = Arc::clone(server);
    tokio::spawn(async move {
        let _ = server.serve_connection(host).await;
    });
    exchange(client, &request).await.unwrap()
}

async fn catalog(server: &Arc<Server>) -> CommandCatalog {
    let response = call(server, RequestEnvelope::new(LIST_COMMAND)).await;
    assert!(response.success);
    serde_json::from_str(&response.data).unwrap()
}

/// CLI tokens compiled against the host catalog arrive typed at the handler.
#[tokio::test]
async fn test_cli_arguments_compiled_against_catalog() {
    let server = server();
    let catalog = catalog(&server).await;
    let fields = catalog.find("Build.Run").unwrap().request_fields.clone();

    let tokens: Vec<String> = [
        "--TARGET", "game", "--jobs", "8", "--features", "a", "--features", "b", "--release",
        "--format", "text",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let (tokens, format) = extract_format(tokens, Some(fields.as_slice()));
    assert_eq!(format, Some(OutputFormat::Text));

    let data = compile_args(&tokens, Some(fields.as_slice()));
    assert_eq!(
        data,
        json!({"target": "game", "jobs": 8, "features": ["a", "b"], "release": true})
    );

    let request = RequestEnvelope::new("Build.Run").with_json(&data).unwrap();
    let response = call(&server, request).await;
    assert!(response.success, "{}", response.message);
    let body: BuildResponse = serde_json::from_str(&response.data).unwrap();
    assert_eq!(body.summary, "game jobs=8 features=a,b release=true");

    let request = RequestEnvelope::new("Build.Run")
        .with_json(&data)
        .unwrap()
        .with_format(OutputFormat::Text);
    let response = call(&server, request).await;
    assert_eq!(response.format, OutputFormat::Text);
    assert!(response.data.contains("summary: game"));
}

#[tokio::test]
async fn test_application_failures_are_envelopes() {
    let server = server();

    let response = call(&server, RequestEnvelope::new("Build.Run")).await;
    assert!(!response.success);
    assert_eq!(response.message, "Missing required field 'target'");

    let response = call(&server, RequestEnvelope::new("Nope.Run")).await;
    assert!(!response.success);
    assert_eq!(response.message, "Unknown command: Nope.Run");
    assert!(!cmdwire::retry::is_retryable_error(&response.message));
}

/// Every reader sees either all of a module's commands or none of them.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_module_toggle_is_atomic_for_readers() {
    let server = server();
    let dispatcher = Arc::clone(server.dispatcher());
    let stop = CancellationToken::new();

    let toggler = {
        let dispatcher = Arc::clone(&dispatcher);
        let stop = stop.clone();
        tokio::spawn(async move {
            let mut flips = 0;
            while !stop.is_cancelled() {
                dispatcher.disable_module("Scene").unwrap();
                tokio::task::yield_now().await;
                dispatcher.enable_module("Scene").unwrap();
                tokio::task::yield_now().await;
                flips += 1;
            }
            flips
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let dispatcher = Arc::clone(&dispatcher);
        readers.push(tokio::spawn(async move {
            for _ in 0..200 {
                let response = dispatcher
                    .dispatch(RequestEnvelope::new(LIST_COMMAND), CancellationToken::new())
                    .await;
                let catalog: CommandCatalog = serde_json::from_str(&response.data).unwrap();
                let present = ["Scene.Open", "Scene.Save", "Scene.Close"]
                    .iter()
                    .filter(|n| catalog.find(n).is_some())
                    .count();
                assert!(present == 0 || present == 3, "saw {} of 3 Scene commands", present);
                assert!(catalog.find("Build.Run").is_some());
            }
        }));
    }

    for reader in readers {
        reader.await.unwrap();
    }
    stop.cancel();
    assert!(toggler.await.unwrap() > 0);
    assert!(dispatcher.table().contains("Scene.Open"));
}

#[tokio::test]
async fn test_relayed_command_end_to_end() {
    let (transport, mut peer) = ChannelRelayTransport::pair();
    let bridge = Arc::new(RelayBridge::new(Arc::new(transport)));

    tokio::spawn(async move {
        while let Some(message) = peer.recv().await {
            let input: Value = serde_json::from_str(message.data.as_deref().unwrap_or("{}")).unwrap();
            let reply = json!({"command": message.command, "input": input, "pad": "x".repeat(100)});
            let mut chunks = split_into_chunks(message.request_id, &reply.to_string(), 16);
            chunks.reverse();
            for chunk in chunks {
                peer.deliver(chunk);
            }
        }
    });

    let server = Arc::new(
        Server::builder()
            .command(
                "Peer",
                RelayedCommand::new("Peer.Inspect", Arc::clone(&bridge))
                    .with_request_fields(vec![FieldDescriptor::new(
                        "ids",
                        FieldType::Array(ScalarType::Int),
                    )]),
            )
            .build()
            .unwrap(),
    );

    let catalog = catalog(&server).await;
    let fields = catalog.find("Peer.Inspect").unwrap().request_fields.clone();
    let data = compile_args(["--ids", "1", "--ids", "2"], Some(fields.as_slice()));

    let request = RequestEnvelope::new("Peer.Inspect").with_json(&data).unwrap();
    let response = call(&server, request).await;
    assert!(response.success, "{}", response.message);

    let body = response.data_json().unwrap();
    assert_eq!(body["command"], "Peer.Inspect");
    assert_eq!(body["input"], json!({"ids": [1, 2]}));
    assert_eq!(bridge.pending_count(), 0);
}

/// Commands advertised by the peer's catalog are served with their schema.
#[tokio::test]
async fn test_peer_catalog_registers_relayed_commands() {
    let (transport, mut peer) = ChannelRelayTransport::pair();
    let config = RelayConfig::default().with_catalog_timeout(Duration::from_secs(2));
    let bridge = Arc::new(RelayBridge::with_config(Arc::new(transport), config));
    assert_eq!(bridge.config().catalog_timeout(), Duration::from_secs(2));

    tokio::spawn(async move {
        while let Some(message) = peer.recv().await {
            let reply = if message.is_catalog_query() {
                json!({"commands": [{
                    "name": "Peer.Grep",
                    "description": "Search the peer's files",
                    "module": "Peer",
                    "requestFields": [
                        {"name": "pattern", "type": "string"},
                        {"name": "limit", "type": "int"}
                    ]
                }]})
            } else {
                let input: Value =
                    serde_json::from_str(message.data.as_deref().unwrap_or("{}")).unwrap();
                json!({"matched": input["pattern"], "limit": input["limit"]})
            };
            for chunk in split_into_chunks(message.request_id, &reply.to_string(), 12) {
                peer.deliver(chunk);
            }
        }
    });

    let peer_catalog = bridge.query_catalog(&CancellationToken::new()).await.unwrap();
    let mut builder = Server::builder().command("Build", Build);
    for descriptor in &peer_catalog.commands {
        builder = builder.command(
            &descriptor.module,
            RelayedCommand::from_descriptor(descriptor, Arc::clone(&bridge)),
        );
    }
    let server = Arc::new(builder.build().unwrap());

    let catalog = catalog(&server).await;
    let grep = catalog.find("Peer.Grep").unwrap();
    assert_eq!(grep.module, "Peer");
    assert_eq!(grep.description, "Search the peer's files");
    let names: Vec<&str> = grep.request_fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["pattern", "limit"]);
    assert_eq!(grep.request_fields[1].field_type, FieldType::INT);

    let data = compile_args(
        ["--pattern", "fn main", "--limit", "5"],
        Some(grep.request_fields.as_slice()),
    );
    let request = RequestEnvelope::new("Peer.Grep").with_json(&data).unwrap();
    let response = call(&server, request).await;
    assert!(response.success, "{}", response.message);
    assert_eq!(
        response.data_json().unwrap(),
        json!({"matched": "fn main", "limit": 5})
    );
}

#[cfg(unix)]
mod unix_socket {
    use super::*;
    use cmdwire::transport::PipeListener;
    use cmdwire::{BridgeClient, ClientConfig};

    fn socket_path() -> String {
        format!("/tmp/cmdwire-it-{}.sock", uuid::Uuid::new_v4().simple())
    }

    fn client(path: &str) -> BridgeClient {
        BridgeClient::new(path).with_config(ClientConfig {
            connect_timeout: Duration::from_secs(1),
            response_timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_attempts: 3,
                delay: Duration::from_millis(10),
            },
        })
    }

    #[tokio::test]
    async fn test_serve_over_socket() {
        let path = socket_path();
        let server = server();
        let listener = PipeListener::bind(&path).await.unwrap();
        let serving = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve(listener).await })
        };

        let client = client(&path);
        let catalog = client.catalog().await.unwrap();
        assert!(catalog.find("Build.Run").is_some());

        let response = client
            .send(&RequestEnvelope::new("ping"))
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.data_json().unwrap()["protocolVersion"], 1);

        let response = client
            .send(&RequestEnvelope::new("Module.Disable").with_data(r#"{"module":"Scene"}"#))
            .await
            .unwrap();
        assert!(response.success, "{}", response.message);
        assert!(!client.catalog().await.unwrap().commands.iter().any(|c| c.module == "Scene"));

        server.shutdown();
        serving.await.unwrap().unwrap();
    }

    /// The first connection is dropped before a reply; the retry succeeds.
    #[tokio::test]
    async fn test_retry_after_unexpected_close() {
        let path = socket_path();
        let server = server();
        let listener = PipeListener::bind(&path).await.unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));

        let host = {
            let server = Arc::clone(&server);
            let accepted = Arc::clone(&accepted);
            tokio::spawn(async move {
                loop {
                    let stream = listener.accept().await.unwrap();
                    if accepted.fetch_add(1, Ordering::SeqCst) == 0 {
                        drop(stream);
                        continue;
                    }
                    let _ = server.serve_connection(stream).await;
                    break;
                }
            })
        };

        let response = client(&path)
            .send(&RequestEnvelope::new("ping"))
            .await
            .unwrap();
        assert!(response.success, "{}", response.message);
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
        host.await.unwrap();
    }

    /// Application failures are returned after a single attempt.
    #[tokio::test]
    async fn test_application_failure_not_retried() {
        let path = socket_path();
        let server = server();
        let listener = PipeListener::bind(&path).await.unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));

        let host = {
            let server = Arc::clone(&server);
            let accepted = Arc::clone(&accepted);
            tokio::spawn(async move {
                loop {
                    let stream = listener.accept().await.unwrap();
                    accepted.fetch_add(1, Ordering::SeqCst);
                    let _ = server.serve_connection(stream).await;
                }
            })
        };

        let response = client(&path)
            .send(&RequestEnvelope::new("Missing.Command"))
            .await
            .unwrap();
        assert!(!response.success);
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
        host.abort();
    }
}
