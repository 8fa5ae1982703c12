//! Command-line client for a cmdwire host.
//!
//! ```text
//! cmdwire [--project DIR] [--retries N] [--timeout SECS] [-v] COMMAND [ARGS]...
//! ```
//!
//! Arguments after the command are `--key value` pairs (repeat a key for
//! array fields, omit the value for a boolean flag). `--format text|json`
//! selects the response format, unless the command declares a `format`
//! field of its own. The host's catalog is used to give each argument its
//! declared type.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use cmdwire::args::{compile_args, extract_format};
use cmdwire::handler::LIST_COMMAND;
use cmdwire::retry::{is_retryable_error, RetryPolicy};
use cmdwire::schema::{CommandCatalog, FieldDescriptor};
use cmdwire::{BridgeClient, ClientConfig, OutputFormat, RequestEnvelope, ResponseEnvelope};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "cmdwire")]
#[command(about = "Send a command to the host serving a project", long_about = None)]
#[command(version)]
struct Cli {
    /// Project root the host is serving (default: current directory)
    #[arg(long, env = "CMDWIRE_PROJECT")]
    project: Option<PathBuf>,

    /// Total attempts for transient connection failures
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Seconds to wait for the response
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Command name, e.g. `Scene.Open` or `list`
    command: String,

    /// Command arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn project_root(explicit: Option<PathBuf>) -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    match explicit {
        Some(p) if p.is_absolute() => p,
        Some(p) => cwd.join(p),
        None => cwd,
    }
}

/// Fetch the host catalog to type the arguments.
///
/// `Err` carries a transport failure that makes sending pointless.
async fn request_fields(
    client: &BridgeClient,
    command: &str,
) -> Result<Option<Vec<FieldDescriptor>>, ResponseEnvelope> {
    let response = match client.send(&RequestEnvelope::new(LIST_COMMAND)).await {
        Ok(r) => r,
        Err(e) => return Err(ResponseEnvelope::failure(e.to_string())),
    };
    if !response.success {
        if is_retryable_error(&response.message) {
            return Err(response);
        }
        debug!(message = %response.message, "Catalog unavailable, sending untyped arguments");
        return Ok(None);
    }

    match serde_json::from_str::<CommandCatalog>(&response.data) {
        Ok(catalog) => Ok(catalog.find(command).map(|c| c.request_fields.clone())),
        Err(e) => {
            debug!(error = %e, "Unreadable catalog, sending untyped arguments");
            Ok(None)
        }
    }
}

fn print_data(response: &ResponseEnvelope) {
    if response.data.is_empty() {
        return;
    }
    if response.format == OutputFormat::Json {
        if let Ok(value) = response.data_json() {
            if let Ok(pretty) = serde_json::to_string_pretty(&value) {
                println!("{}", pretty);
                return;
            }
        }
    }
    println!("{}", response.data);
}

fn report(response: &ResponseEnvelope) -> ExitCode {
    if let Some(warning) = &response.version_warning {
        eprintln!("warning: {}", warning);
    }
    print_data(response);
    if response.success {
        ExitCode::SUCCESS
    } else {
        eprintln!("error: {}", response.message);
        ExitCode::FAILURE
    }
}

async fn run(cli: Cli) -> Result<ExitCode, cmdwire::BridgeError> {
    let root = project_root(cli.project);
    let config = ClientConfig {
        response_timeout: Duration::from_secs(cli.timeout.max(1)),
        retry: RetryPolicy {
            max_attempts: cli.retries.max(1),
            ..RetryPolicy::default()
        },
        ..ClientConfig::default()
    };
    let client = BridgeClient::for_project(&root).with_config(config);
    debug!(project = %root.display(), endpoint = client.endpoint(), "Resolved host endpoint");

    let fields = if cli.command == LIST_COMMAND {
        None
    } else {
        match request_fields(&client, &cli.command).await {
            Ok(fields) => fields,
            Err(failure) => return Ok(report(&failure)),
        }
    };

    let (tokens, format) = extract_format(cli.args, fields.as_deref());

    let data = compile_args(&tokens, fields.as_deref());
    let mut request = RequestEnvelope::new(cli.command)
        .with_json(&data)?
        .with_format(format.unwrap_or_default());
    if let Ok(cwd) = std::env::current_dir() {
        request = request.with_cwd(cwd.display().to_string());
    }

    let response = client.send(&request).await?;
    Ok(report(&response))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(2)
        }
    }
}
