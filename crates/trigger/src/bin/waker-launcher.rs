//! waker-launcher: run one activation trigger invocation.
//!
//! Reads the event JSON from `--event <path>` or stdin, prints the outcome
//! as a single JSON line on stdout and logs to stderr.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use waker_core::config::load_dotenv;
use waker_core::WakerConfig;
use waker_ecs::EcsApi;
use waker_trigger::TriggerHandler;

/// Start the game server when a client resolves its hostname.
#[derive(Parser, Debug)]
#[command(name = "waker-launcher", version, about)]
struct Cli {
    /// Event payload file. Reads stdin when omitted.
    #[arg(long)]
    event: Option<PathBuf>,

    /// Config profile; keys are read as `{PROFILE}_{KEY}` before `{KEY}`.
    #[arg(long, env = "WAKER_PROFILE")]
    profile: Option<String>,
}

fn read_event(path: Option<&PathBuf>) -> Result<Vec<u8>> {
    match path {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("failed to read event file {}", path.display())),
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("failed to read event from stdin")?;
            Ok(buf)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let config = match cli.profile.as_deref() {
        Some(profile) => WakerConfig::for_profile(profile),
        None => WakerConfig::from_env(),
    };
    config.log_summary();

    let raw = read_event(cli.event.as_ref())?;

    let api = EcsApi::new(&config.region).await;
    let handler = TriggerHandler::new(&config, api);

    let timeout = config.invocation_timeout();
    let Ok(outcome) = handler.handle_bytes_within(&raw, timeout).await else {
        bail!("invocation exceeded {}s", timeout.as_secs());
    };

    info!(outcome = outcome.name(), "Invocation finished");
    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}
