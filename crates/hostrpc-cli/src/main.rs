//! # hostrpc CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Serve the demo modules (Echo, Store, Ticker) over TCP
//! hostrpc serve -b 127.0.0.1:7400
//!
//! # Call one method (outputs raw JSON)
//! hostrpc call 127.0.0.1:7400 Store.set -a '["answer", 42]'
//!
//! # Print every `tick` event of the Ticker module as a JSON line
//! hostrpc watch 127.0.0.1:7400 Ticker tick
//! ```
//!
//! `serve` binds to `HOSTRPC_ADDR` when `-b` is omitted, then to
//! `127.0.0.1:7400`.

use std::sync::Arc;

use anyhow::Result;
use argh::FromArgs;
use hostrpc_cli::modules::demo_registry;
use hostrpc_cli::{resolve_addr, split_target};
use hostrpc_client::RpcClient;
use hostrpc_common::{TcpConfig, TcpServer};
use hostrpc_server::Host;
use serde_json::Value;

#[cfg(test)]
mod tests;

#[derive(FromArgs)]
/// hostrpc - modules hosted over a message channel
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
///
/// - **Serve**: host the demo modules over TCP
/// - **Call**: make a single call (unix-friendly JSON output)
/// - **Watch**: subscribe to a module event and stream it
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
    Watch(WatchArgs),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// serve the demo modules over TCP
struct ServeArgs {
    /// address to bind to
    ///
    /// Falls back to the HOSTRPC_ADDR environment variable, then to
    /// 127.0.0.1:7400.
    #[argh(option, short = 'b')]
    bind: Option<String>,

    /// largest accepted message in bytes
    #[argh(option, long = "max-message-size")]
    max_message_size: Option<usize>,
}

/// Arguments for making a single call.
///
/// Loads the target module, calls the method and prints the result as raw
/// JSON on stdout. Errors go to stderr with a non-zero exit code.
///
/// # Examples
///
/// ```bash
/// hostrpc call 127.0.0.1:7400 Echo.echo -a '{"hello": "world"}'
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call a module method and print the JSON result
struct CallArgs {
    /// address of the host
    #[argh(positional)]
    server_address: String,

    /// target as Module.method
    #[argh(positional)]
    target: String,

    /// JSON params, defaults to an empty array
    #[argh(option, short = 'a', long = "args", default = "\"[]\".into()")]
    args: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "watch")]
/// subscribe to a module event and print each payload as a JSON line
struct WatchArgs {
    /// address of the host
    #[argh(positional)]
    server_address: String,

    /// module api name
    #[argh(positional)]
    module: String,

    /// event name
    #[argh(positional)]
    event: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Keep `call` output clean for piping into other tools.
    if !matches!(cli.command, Commands::Call(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Call(args) => run_call(args).await,
        Commands::Watch(args) => run_watch(args).await,
    }
}

/// Executes the `serve` subcommand. Runs until the process is killed.
async fn run_serve(args: ServeArgs) -> Result<()> {
    let bind = resolve_addr(args.bind);
    let mut config = TcpConfig::default();
    if let Some(max) = args.max_message_size {
        config = config.with_max_message_size(max);
    }

    let registry = Arc::new(demo_registry()?);
    let server = TcpServer::new(&bind, config).await?;
    tracing::info!("Serving {} on {}", registry.names().join(", "), server.local_addr()?);

    server
        .run_with_handler(move |transport| {
            let registry = registry.clone();
            async move {
                let peer = transport.peer_addr();
                let host = match Host::new(transport, registry) {
                    Ok(host) => host,
                    Err(e) => {
                        tracing::warn!("Could not start host for {:?}: {}", peer, e);
                        return;
                    }
                };
                host.enable();
                host.closed().await;
                host.unmount();
                tracing::info!("Peer {:?} disconnected", peer);
            }
        })
        .await?;

    Ok(())
}

/// Executes the `call` subcommand.
///
/// # Errors
///
/// Returns an error if the args are not valid JSON, the target is not
/// `Module.method`, the connection fails, or the call itself fails.
async fn run_call(args: CallArgs) -> Result<()> {
    let (module, method) = split_target(&args.target)?;
    let params: Value = serde_json::from_str(&args.args)
        .map_err(|e| anyhow::anyhow!("Invalid JSON in args: {}", e))?;

    let client = RpcClient::connect(&args.server_address, TcpConfig::default()).await?;
    let remote = client.load_modules(&[module]).await?.remove(0);
    let result = remote.call(method, params).await;
    client.close();

    println!("{}", serde_json::to_string(&result?)?);
    Ok(())
}

/// Executes the `watch` subcommand. Returns when the host goes away.
async fn run_watch(args: WatchArgs) -> Result<()> {
    let client = RpcClient::connect(&args.server_address, TcpConfig::default()).await?;
    let remote = client.load_modules(&[args.module.as_str()]).await?.remove(0);

    let subscriber = remote.subscriber();
    subscriber.on(&args.event, |data| println!("{}", data)).await;
    tracing::info!("Watching {}.{}", args.module, args.event);

    client.closed().await;
    tracing::info!("Host closed the connection");
    Ok(())
}
