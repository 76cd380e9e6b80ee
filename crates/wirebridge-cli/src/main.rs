//! # wirebridge CLI
//!
//! Runs a demo wirebridge server or makes a single call against one.
//!
//! ## Usage
//!
//! ```bash
//! # Start the demo server
//! wirebridge serve -b 127.0.0.1:9090
//!
//! # Call it (prints the reply as JSON)
//! wirebridge call 127.0.0.1:9090 /wirebridge.Demo/Echo -a '{"hello": "world"}'
//! wirebridge call tcp://127.0.0.1:9090 /wirebridge.Demo/Sum -a '[1, 2, 3]'
//! ```
//!
//! Both subcommands use the JSON codec so arbitrary JSON can travel through
//! the demo routes.

use anyhow::Result;
use argh::FromArgs;
use serde_json::Value;
use std::time::{Duration, Instant};
use wirebridge_client::{Client, ClientOptions};
use wirebridge_common::middleware::{handler_fn, middleware_fn, Handler, Middleware};
use wirebridge_common::transport::Codec;
use wirebridge_common::Context;
use wirebridge_server::{Matcher, Server, ServerOptions};

pub const ECHO: &str = "/wirebridge.Demo/Echo";
pub const SUM: &str = "/wirebridge.Demo/Sum";
pub const SLEEP: &str = "/wirebridge.Demo/Sleep";

#[derive(FromArgs)]
/// wirebridge - RPC bridge with interceptors and weighted discovery
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
}

/// Arguments for the demo server.
///
/// Routes: `/wirebridge.Demo/Echo` (any JSON), `/wirebridge.Demo/Sum` (array
/// of integers) and `/wirebridge.Demo/Sleep` (milliseconds).
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// start the demo server
struct ServeArgs {
    /// address to bind to
    #[argh(option, short = 'b', default = "\"0.0.0.0:9090\".into()")]
    bind: String,

    /// per-call timeout in milliseconds (0 disables it)
    #[argh(option, long = "timeout-ms", default = "3000")]
    timeout_ms: u64,

    /// endpoint to advertise instead of the bound address
    #[argh(option, long = "endpoint")]
    endpoint: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// make a single call and print the reply as JSON
struct CallArgs {
    /// server endpoint (`host:port` or `tcp://host:port`)
    #[argh(positional)]
    endpoint: String,

    /// operation name, e.g. /wirebridge.Demo/Echo
    #[argh(positional)]
    method: String,

    /// request as JSON
    #[argh(option, short = 'a', long = "args", default = "\"null\".into()")]
    args: String,

    /// call timeout in milliseconds (0 waits until interrupted)
    #[argh(option, long = "timeout-ms", default = "5000")]
    timeout_ms: u64,
}

/// Logs every call with its duration.
fn access_log() -> Middleware {
    middleware_fn(|next: Handler| {
        handler_fn(move |ctx: Context, msg| {
            let next = next.clone();
            async move {
                let operation = ctx
                    .transport()
                    .and_then(|t| t.operation().map(str::to_string))
                    .unwrap_or_default();
                let started = Instant::now();
                let reply = next(ctx, msg).await;
                match &reply {
                    Ok(_) => tracing::info!(
                        operation = %operation,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "call served"
                    ),
                    Err(e) => tracing::warn!(
                        operation = %operation,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        error = %e,
                        "call failed"
                    ),
                }
                reply
            }
        })
    })
}

fn demo_server(args: &ServeArgs) -> Server {
    let mut matcher = Matcher::new();
    matcher.use_all([access_log()]);

    let mut options = ServerOptions::new()
        .with_address(args.bind.clone())
        .with_timeout(Duration::from_millis(args.timeout_ms))
        .with_middleware(matcher)
        .with_codec(Codec::Json);
    if let Some(endpoint) = &args.endpoint {
        options = options.with_endpoint(endpoint.clone());
    }

    let server = Server::new(options);
    server
        .handle_typed(ECHO, |_ctx: Context, value: Value| async move { Ok(value) })
        .handle_typed(SUM, |_ctx: Context, values: Vec<i64>| async move {
            Ok(values.iter().sum::<i64>())
        })
        .handle_typed(SLEEP, |ctx: Context, ms: u64| async move {
            tokio::select! {
                err = ctx.done() => Err(err),
                _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(ms),
            }
        });
    server
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let server = demo_server(&args);
    let endpoint = server.endpoint().await?;
    tracing::info!("Serving on {}", endpoint);

    let running = server.clone();
    let serving = tokio::spawn(async move { running.start().await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupted, shutting down");
    server.stop().await?;
    serving.await??;
    Ok(())
}

async fn run_call(args: CallArgs) -> Result<()> {
    let request: Value = serde_json::from_str(&args.args)
        .map_err(|e| anyhow::anyhow!("Invalid --args JSON: {}", e))?;

    let client = Client::dial(
        ClientOptions::new(args.endpoint)
            .with_timeout(Duration::from_millis(args.timeout_ms))
            .with_codec(Codec::Json),
    )
    .await?;

    let ctx = Context::background().with_cancel();
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let reply: Option<Value> = client.call(&ctx, &args.method, request).await?;
    println!("{}", serde_json::to_string_pretty(&reply.unwrap_or(Value::Null))?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // keep `call` output clean for piping
    if matches!(cli.command, Commands::Serve(_)) {
        wirebridge_common::telemetry::init_logging();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Call(args) => run_call(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cli_parse_serve_defaults() {
        let cli: Cli = Cli::from_args(&["wirebridge"], &["serve"]).unwrap();
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.bind, "0.0.0.0:9090");
                assert_eq!(args.timeout_ms, 3000);
                assert!(args.endpoint.is_none());
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_parse_call() {
        let cli: Cli = Cli::from_args(
            &["wirebridge"],
            &["call", "127.0.0.1:9090", ECHO, "-a", "[1,2]", "--timeout-ms", "0"],
        )
        .unwrap();
        match cli.command {
            Commands::Call(args) => {
                assert_eq!(args.endpoint, "127.0.0.1:9090");
                assert_eq!(args.method, ECHO);
                assert_eq!(args.args, "[1,2]");
                assert_eq!(args.timeout_ms, 0);
            }
            _ => panic!("Expected Call command"),
        }
    }

    #[test]
    fn test_cli_rejects_missing_method() {
        assert!(Cli::from_args(&["wirebridge"], &["call", "127.0.0.1:9090"]).is_err());
    }

    #[tokio::test]
    async fn test_demo_routes() {
        let server = demo_server(&ServeArgs {
            bind: "127.0.0.1:0".into(),
            timeout_ms: 1000,
            endpoint: None,
        });
        let endpoint = server.endpoint().await.unwrap();
        let running = server.clone();
        tokio::spawn(async move { running.start().await });

        let client = Client::dial(ClientOptions::new(endpoint).with_codec(Codec::Json))
            .await
            .unwrap();
        let ctx = Context::background();

        let echoed: Option<Value> = client.call(&ctx, ECHO, json!({"a": [1, 2]})).await.unwrap();
        assert_eq!(echoed, Some(json!({"a": [1, 2]})));

        let sum: Option<i64> = client.call(&ctx, SUM, vec![1i64, 2, 3]).await.unwrap();
        assert_eq!(sum, Some(6));

        server.stop().await.unwrap();
    }
}
