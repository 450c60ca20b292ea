//! # Overgate CLI Entry Point
//!
//! Main binary for the Overgate overload controller. Starts the RPC ingress
//! with the controller attached, the once-per-second aggregation ticker, and
//! the HTTP control plane for the policy agent.
//!
//! ## Usage
//!
//! ```bash
//! # Serve with two methods and their latency budgets (milliseconds)
//! overgate serve -b 127.0.0.1:8080 -c 127.0.0.1:9090 \
//!     --slo echo=50 --slo sleep=200 --max-tokens 1000 --refill-rate 100
//!
//! # Push a new refill rate from the agent side
//! curl -X POST 'http://127.0.0.1:9090/set_rate?method=echo' \
//!     -d '{"rate_limit": 250}'
//!
//! # Read the last interval's goodput and p95 tail latency (nanoseconds)
//! curl 'http://127.0.0.1:9090/metrics?method=echo'
//! ```
//!
//! Log verbosity follows `RUST_LOG`; the default level is `info`.

use anyhow::{anyhow, Context, Result};
use argh::FromArgs;
use overgate_core::{Controller, ControllerConfig};
use overgate_server::{ControlPlane, HandlerRegistry, RpcServer};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// Overgate - adaptive per-method overload controller
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
}

/// Arguments for running the controller-fronted demo server.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// Start the RPC server with the overload controller attached.
struct ServeArgs {
    /// bind address for the RPC ingress
    #[argh(option, short = 'b', default = "String::from(\"127.0.0.1:8080\")")]
    bind: String,

    /// bind address for the control plane
    #[argh(option, short = 'c', default = "String::from(\"127.0.0.1:9090\")")]
    control: String,

    /// method latency budget as name=milliseconds (repeatable)
    #[argh(option, long = "slo")]
    slo: Vec<String>,

    /// bucket capacity applied to all methods
    #[argh(option, default = "1000")]
    max_tokens: u64,

    /// tokens added per second, applied to all methods
    #[argh(option, default = "100")]
    refill_rate: u64,

    /// enable verbose controller tracing
    #[argh(switch)]
    debug: bool,
}

/// Parses one `--slo name=milliseconds` entry.
fn parse_slo_entry(entry: &str) -> Result<(String, Duration)> {
    let (name, millis) = entry
        .split_once('=')
        .ok_or_else(|| anyhow!("invalid --slo '{}': expected name=milliseconds", entry))?;

    if name.is_empty() {
        return Err(anyhow!("invalid --slo '{}': empty method name", entry));
    }

    let millis: u64 = millis
        .parse()
        .with_context(|| format!("invalid --slo '{}': milliseconds must be an integer", entry))?;

    Ok((name.to_string(), Duration::from_millis(millis)))
}

/// Registers the built-in demo handlers.
///
/// - `echo` returns its arguments unchanged
/// - `sleep` waits `{"millis": n}` before answering, for exercising SLO
///   violations and tail latency
fn demo_handlers() -> HandlerRegistry {
    let mut handlers = HandlerRegistry::new();

    handlers.register("echo", |args| async move { Ok(args) });

    handlers.register("sleep", |args| async move {
        let millis = args["millis"].as_u64().unwrap_or(10);
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(json!({"slept_ms": millis}))
    });

    handlers
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Set default log level to INFO, but allow RUST_LOG env var to override
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Serve(args) => serve(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let bind: SocketAddr = args
        .bind
        .parse()
        .map_err(|e| anyhow!("Invalid bind address {}: {}", args.bind, e))?;
    let control: SocketAddr = args
        .control
        .parse()
        .map_err(|e| anyhow!("Invalid control address {}: {}", args.control, e))?;

    let mut slo = HashMap::new();
    for entry in &args.slo {
        let (name, budget) = parse_slo_entry(entry)?;
        slo.insert(name, budget);
    }

    let config = ControllerConfig::new(slo, args.max_tokens, args.refill_rate, args.debug);
    let controller =
        Arc::new(Controller::new(config).context("invalid controller configuration")?);

    tracing::info!(
        methods = controller.method_count(),
        max_tokens = args.max_tokens,
        refill_rate = args.refill_rate,
        "controller constructed"
    );

    let ticker = controller.spawn_ticker();

    let rpc_server = RpcServer::new(controller.clone(), demo_handlers());
    let control_plane = ControlPlane::new(controller.clone());

    let mut rpc_task = tokio::spawn(rpc_server.run(bind));
    let mut control_task = tokio::spawn(control_plane.run(control));

    let result = tokio::select! {
        result = &mut rpc_task => match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow!("RPC server failed: {}", e)),
            Err(e) => Err(anyhow!("RPC server task panicked: {}", e)),
        },
        result = &mut control_task => match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow!("control plane failed: {}", e)),
            Err(e) => Err(anyhow!("control plane task panicked: {}", e)),
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    };

    rpc_task.abort();
    control_task.abort();
    ticker.abort();

    result
}
