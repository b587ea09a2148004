//! # StrandRPC Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Serve the demonstration service
//! strandrpc serve -b 0.0.0.0:8080 -w 4
//!
//! # Call a procedure (outputs raw JSON)
//! strandrpc call 127.0.0.1:8080 add '[1, 2]'
//!
//! # Same call through the pooled async stub
//! strandrpc call --pooled 127.0.0.1:8080 combine '[{"label":"a","value":1},{"label":"b","value":2}]'
//!
//! # Show the routing keys the service registers
//! strandrpc list
//! ```
//!
//! `STRANDRPC_BIND`, `STRANDRPC_WORKERS` and `STRANDRPC_IDLE_TIMEOUT_MS`
//! stand in for the matching `serve` flags when those are absent.

use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;
use strandrpc_cli::invoke::{call_json, BlockingPooledCaller};
use strandrpc_cli::service::{self, ServiceOptions};
use strandrpc_cli::settings::{self, ServerFlags};
use strandrpc_client::{Client, ClientConfig, OutboundPool, PoolConfig, PooledClient};
use strandrpc_server::RpcServer;

#[derive(FromArgs)]
/// StrandRPC - typed remote procedure calls over TCP
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
    List(ListArgs),
}

/// Arguments for `strandrpc serve`.
///
/// Every server parameter is optional here; missing ones fall back to the
/// environment and then to the `ServerConfig` defaults.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// serve the demonstration service
struct ServeArgs {
    /// address to bind, e.g. 0.0.0.0:8080
    #[argh(option, short = 'b')]
    bind: Option<String>,

    /// port to bind on all interfaces; overrides the port of --bind
    #[argh(option, short = 'p')]
    port: Option<u16>,

    /// number of runtime worker threads
    #[argh(option, short = 'w')]
    workers: Option<usize>,

    /// idle timeout in milliseconds for each read or write step
    #[argh(option, long = "idle-timeout-ms")]
    idle_timeout_ms: Option<u64>,

    /// largest accepted frame body in bytes
    #[argh(option, long = "max-frame-size")]
    max_frame_size: Option<u64>,

    /// delay of wait_and_echo in milliseconds
    #[argh(option, long = "wait-ms", default = "3000")]
    wait_ms: u64,
}

/// Arguments for `strandrpc call`.
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call one procedure and print the result as JSON
struct CallArgs {
    /// server address as host:port
    #[argh(positional)]
    destination: String,

    /// procedure name, e.g. add or Calculator::echo
    #[argh(positional)]
    procedure: String,

    /// JSON array of arguments
    #[argh(positional, default = "\"[]\".into()")]
    args: String,

    /// go through the pooled async stub instead of a direct connection
    #[argh(switch)]
    pooled: bool,

    /// connect timeout in milliseconds
    #[argh(option, long = "connect-timeout-ms")]
    connect_timeout_ms: Option<u64>,
}

/// Arguments for `strandrpc list`.
#[derive(FromArgs)]
#[argh(subcommand, name = "list")]
/// print the routing keys of the demonstration service
struct ListArgs {}

fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // `call` and `list` write plain output for piping into other tools.
    if matches!(cli.command, Commands::Serve(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args),
        Commands::Call(args) => run_call(args),
        Commands::List(_) => run_list(),
    }
}

fn run_serve(args: ServeArgs) -> Result<()> {
    let flags = ServerFlags {
        bind: args.bind,
        port: args.port,
        workers: args.workers,
        idle_timeout_ms: args.idle_timeout_ms,
        max_frame_size: args.max_frame_size,
    };
    let config = settings::server_config(&flags, |name| std::env::var(name).ok())?;

    let options = ServiceOptions {
        wait: Duration::from_millis(args.wait_ms),
    };
    let registry = service::registry(&options)?;
    tracing::info!(
        procedures = registry.len(),
        workers = config.worker_threads,
        "Starting StrandRPC server"
    );

    RpcServer::start(config, registry)?;
    Ok(())
}

fn run_call(args: CallArgs) -> Result<()> {
    let args_value: serde_json::Value = serde_json::from_str(&args.args)
        .map_err(|e| anyhow::anyhow!("Invalid JSON in args: {}", e))?;

    let mut config = ClientConfig::from_destination(&args.destination)
        .map_err(|e| anyhow::anyhow!("Invalid destination: {}", e))?;
    if let Some(ms) = args.connect_timeout_ms {
        config = config.with_connect_timeout(Duration::from_millis(ms));
    }

    let result = if args.pooled {
        let client = PooledClient::new(config, OutboundPool::new(PoolConfig::default()));
        let mut caller = BlockingPooledCaller::new(client)?;
        call_json(&mut caller, &args.procedure, args_value)?
    } else {
        let mut client = Client::connect(config)
            .with_context(|| format!("failed to connect to {}", args.destination))?;
        call_json(&mut client, &args.procedure, args_value)?
    };

    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

fn run_list() -> Result<()> {
    let registry = service::registry(&ServiceOptions::default())?;
    for key in registry.keys() {
        println!("{}", key);
    }
    Ok(())
}
