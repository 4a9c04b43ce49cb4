mod cli;

use std::future::Future;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use waker_core::config::load_dotenv;
use waker_core::{BatchCommand, WakerConfig};
use waker_ecs::{
    BatchController, BatchReport, EcsApi, OrchestratorApi, RetryPolicy, ServiceStateClient,
};

use crate::cli::CliArgs;

const EXIT_OK: u8 = 0;
/// Exit status for an unrecognized command.
const EXIT_USAGE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    load_dotenv();
    let mut config = match args.profile.as_deref() {
        Some(profile) => WakerConfig::for_profile(profile),
        None => WakerConfig::from_env(),
    };
    if let Some(cluster) = args.cluster {
        config.cluster = cluster;
    }
    if let Some(service) = args.service {
        config.service = service;
    }

    let region = config.region.clone();
    let status = run(&args.command, &config, || async move { EcsApi::new(&region).await }).await;
    ExitCode::from(status)
}

/// Validate `command`, then apply it to the configured services.
///
/// `connect` is only awaited once the command is known to be valid, so an
/// invalid command never reaches the orchestrator.
async fn run<A, F, Fut>(command: &str, config: &WakerConfig, connect: F) -> u8
where
    A: OrchestratorApi,
    F: FnOnce() -> Fut,
    Fut: Future<Output = A>,
{
    let command: BatchCommand = match command.parse() {
        Ok(command) => command,
        Err(e) => {
            error!(error = %e, "Invalid command");
            eprintln!("{e}");
            return EXIT_USAGE;
        }
    };

    config.log_summary();

    let controller = BatchController::new(
        ServiceStateClient::new(connect().await),
        RetryPolicy::from_config(&config.retry),
    );

    match controller
        .run_command(command, &config.cluster, &config.service)
        .await
    {
        Ok(report) => print_report(&report),
        Err(e) => {
            // Listing failures are reported, not escalated.
            error!(cluster = %config.cluster, error = %e, "Failed to list services");
        }
    }

    info!(command = %command, "Done");
    EXIT_OK
}

fn print_report(report: &BatchReport) {
    if report.outcomes.is_empty() {
        println!("{}: no services in '{}' matched", report.command, report.cluster);
        return;
    }

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(ack) if ack.mutated => println!("  ok       {} ({})", outcome.service, outcome.transition),
            Ok(_) => println!("  ok       {} (unchanged, {})", outcome.service, outcome.transition),
            Err(e) => println!("  failed   {}: {e}", outcome.service),
        }
    }
    println!(
        "{}: {} succeeded, {} failed in {}ms",
        report.command,
        report.succeeded(),
        report.failed(),
        report.duration_ms
    );
}
