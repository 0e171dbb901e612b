//! gas demo server.
//!
//! Loads a configuration file, registers a few routes and serves until
//! SIGINT/SIGTERM.
//!
//! ```text
//! gas --config gas.yaml [--bind 0.0.0.0:8080]
//! ```

use std::path::PathBuf;

use clap::Parser;
use gas::config::load_config;
use gas::observability::{init_logging, init_metrics};
use gas::{Context, Gas, GasError, HandlerFuture, StatusCode};
use serde_json::json;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "gas")]
#[command(about = "Serve a gas application", long_about = None)]
struct Cli {
    /// Configuration file (YAML, or TOML by extension).
    #[arg(short, long, default_value = "gas.yaml")]
    config: PathBuf,

    /// Override server.bind_address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }

    init_logging(&config.observability)?;
    tracing::info!(config = %cli.config.display(), "gas v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let mut gas = Gas::from_config(config)?;
    gas.router
        .get("/", index)?
        .get("/health", health)?
        .get("/hello/{name}", hello)?;

    let listener = TcpListener::bind(&gas.config().server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    gas.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn index(ctx: &mut Context) -> HandlerFuture<'_> {
    Box::pin(async move { ctx.string(StatusCode::OK, "gas is running") })
}

fn health(ctx: &mut Context) -> HandlerFuture<'_> {
    Box::pin(async move {
        ctx.json(
            StatusCode::OK,
            &json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }),
        )
    })
}

fn hello(ctx: &mut Context) -> HandlerFuture<'_> {
    Box::pin(async move {
        let name = ctx
            .param("name")
            .map(str::to_owned)
            .ok_or_else(|| GasError::Http(StatusCode::BAD_REQUEST, "missing name".into()))?;
        ctx.json(StatusCode::OK, &json!({ "hello": name }))
    })
}
