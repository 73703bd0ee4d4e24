//! # Genmux CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Start a dispatcher with the nodes listed in a manifest
//! genmux serve -b 0.0.0.0:8080 --nodes nodes.json
//!
//! # Same, with the manifest path taken from the environment
//! GENMUX_NODES=nodes.json genmux serve --max-concurrent 4 --retry-limit 5
//!
//! # Submit a prompt (outputs raw JSON)
//! genmux generate http://127.0.0.1:8080 --prompt "Summarise this" --max-tokens 200
//!
//! # Cluster status
//! genmux status http://127.0.0.1:8080 | jq '.nodes[].health_score'
//! ```
//!
//! ## URL Format
//!
//! Server URLs must include the `http://` or `https://` prefix.

use anyhow::{anyhow, Result};
use argh::FromArgs;
use genmux_cli::{load_manifest, manifest_path, GenmuxClient};
use genmux_common::protocol::GenerationRequest;
use genmux_dispatcher::{
    AdapterRegistry, Dispatcher, DispatcherConfig, HealthCheckConfig, HttpServer, RetryConfig,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Validates that a URL string starts with http:// or https://
fn validate_http_url(url: &str, description: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(anyhow!(
            "Invalid {}: '{}' must start with http:// or https://",
            description,
            url
        ))
    }
}

#[derive(FromArgs)]
/// genmux - weighted, health-aware dispatcher for generation backends
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Generate(GenerateArgs),
    Status(StatusArgs),
}

/// Arguments for running a dispatcher.
///
/// Nodes come from a JSON manifest (`--nodes`, or `GENMUX_NODES` when the
/// flag is absent). More nodes can be registered at runtime over HTTP.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// start a genmux dispatcher
struct ServeArgs {
    /// address to bind the HTTP API to
    #[argh(option, short = 'b', default = "\"0.0.0.0:8080\".into()")]
    bind: String,

    /// path to a JSON node manifest
    ///
    /// Falls back to the GENMUX_NODES environment variable. Without either
    /// the dispatcher starts with no nodes.
    #[argh(option, short = 'n', long = "nodes")]
    nodes: Option<String>,

    /// maximum number of requests dispatched at once
    #[argh(option, long = "max-concurrent", default = "10")]
    max_concurrent: usize,

    /// attempts per request before it is rejected
    #[argh(option, long = "retry-limit", default = "3")]
    retry_limit: u32,

    /// base retry delay in milliseconds, multiplied by the attempt number
    #[argh(option, long = "retry-delay", default = "1000")]
    retry_delay_ms: u64,

    /// interval between health probe sweeps in seconds
    #[argh(option, long = "health-check-interval", default = "30")]
    health_check_interval_secs: u64,

    /// timeout for each health probe in milliseconds
    #[argh(option, long = "health-check-timeout", default = "5000")]
    health_check_timeout_ms: u64,

    /// disable background health probing
    ///
    /// Nodes then only change status through live traffic.
    #[argh(switch, long = "disable-health-check")]
    disable_health_check: bool,

    /// in-flight requests a node may carry before it stops being selected
    #[argh(option, long = "node-load-ceiling", default = "1")]
    node_load_ceiling: u32,

    /// per-call timeout in milliseconds for nodes that do not set one
    #[argh(option, long = "default-timeout", default = "30000")]
    default_timeout_ms: u64,

    /// token budget for nodes that do not set one
    #[argh(option, long = "default-max-tokens", default = "1024")]
    default_max_tokens: u32,

    /// capacity of the lifecycle event channel
    #[argh(option, long = "event-capacity", default = "256")]
    event_capacity: usize,
}

impl ServeArgs {
    fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig::default()
            .with_max_concurrent_requests(self.max_concurrent)
            .with_retry(RetryConfig::new(
                self.retry_limit,
                Duration::from_millis(self.retry_delay_ms),
            ))
            .with_health(HealthCheckConfig {
                interval: Duration::from_secs(self.health_check_interval_secs),
                timeout: Duration::from_millis(self.health_check_timeout_ms),
                enabled: !self.disable_health_check,
            })
            .with_node_load_ceiling(self.node_load_ceiling)
            .with_default_node_timeout(Duration::from_millis(self.default_timeout_ms))
            .with_default_max_tokens(self.default_max_tokens)
            .with_event_capacity(self.event_capacity)
    }
}

/// Submits one prompt and prints the JSON reply.
///
/// Exits non-zero when the request is rejected; the rejection body is still
/// printed to stdout.
#[derive(FromArgs)]
#[argh(subcommand, name = "generate")]
/// submit a prompt to a dispatcher
struct GenerateArgs {
    /// address of the dispatcher
    #[argh(positional)]
    server_address: String,

    /// user prompt
    #[argh(option, short = 'p')]
    prompt: String,

    /// optional system instruction
    #[argh(option, short = 's')]
    system: Option<String>,

    /// optional token budget (capped by the serving node's own limit)
    #[argh(option, long = "max-tokens")]
    max_tokens: Option<u32>,
}

impl GenerateArgs {
    fn request(&self) -> GenerationRequest {
        let mut request = GenerationRequest::user(self.prompt.clone());
        if let Some(system) = &self.system {
            request = request.with_system(system.clone());
        }
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }
}

#[derive(FromArgs)]
#[argh(subcommand, name = "status")]
/// print the cluster status of a dispatcher
struct StatusArgs {
    /// address of the dispatcher
    #[argh(positional)]
    server_address: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // client commands keep stdout clean for piping
    if matches!(cli.command, Commands::Serve(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Generate(args) => run_generate(args).await,
        Commands::Status(args) => run_status(args).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    tracing::info!("Starting genmux dispatcher");
    tracing::info!("Binding to: {}", args.bind);

    let addr: SocketAddr = args
        .bind
        .parse()
        .map_err(|e| anyhow!("Invalid bind address {}: {}", args.bind, e))?;

    let specs = match manifest_path(args.nodes.clone()) {
        Some(path) => {
            tracing::info!("Loading nodes from {}", path.display());
            load_manifest(&path)?
        }
        None => {
            tracing::warn!("No node manifest given; use --nodes <path> or GENMUX_NODES");
            Vec::new()
        }
    };

    if args.disable_health_check {
        tracing::info!("Health checking disabled");
    }

    let dispatcher = Dispatcher::new(args.dispatcher_config(), AdapterRegistry::with_defaults())?;
    for spec in specs {
        let name = spec.name.clone();
        let id = dispatcher
            .register_node(spec)
            .await
            .map_err(|e| anyhow!("Failed to register node '{}': {}", name, e))?;
        tracing::debug!("Registered manifest node {} as {}", name, id);
    }

    let server = HttpServer::new(Arc::new(dispatcher));
    server.run(addr).await?;

    Ok(())
}

async fn run_generate(args: GenerateArgs) -> Result<()> {
    validate_http_url(&args.server_address, "server address")?;

    let client = GenmuxClient::new(&args.server_address)?;
    let reply = client.generate(&args.request()).await?;

    println!("{}", serde_json::to_string(&reply.body)?);

    if reply.status.is_success() {
        Ok(())
    } else {
        Err(anyhow!("Request rejected ({})", reply.status))
    }
}

async fn run_status(args: StatusArgs) -> Result<()> {
    validate_http_url(&args.server_address, "server address")?;

    let client = GenmuxClient::new(&args.server_address)?;
    let status = client.status().await?;

    println!("{}", serde_json::to_string(&status)?);

    Ok(())
}
