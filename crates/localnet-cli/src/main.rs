//! Localnet CLI
//!
//! Starts a local multi-node network, waits for it to bootstrap, and when a
//! workload binary is given provisions a domain, enrolls every node as a
//! validator, and deploys the workload onto it.
//!
//! Exit status: 0 on success, 1 on a fatal error, 130 when interrupted.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use localnet_core::CancellationSource;
use localnet_harness::{cancel_on_signal, HarnessError, LocalNetwork, RunReport};
use tracing_subscriber::EnvFilter;

mod args;

use args::Cli;

const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli).await {
        Ok(report) => {
            print_report(&report);
            ExitCode::SUCCESS
        }
        Err(err) if interrupted(&err) => {
            tracing::info!("interrupted");
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with `--verbose`.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cli: &Cli) -> Result<RunReport> {
    let config = cli.harness_config()?;
    config.validate().context("invalid configuration")?;

    tracing::info!(
        nodes = config.network.nodes,
        base_port = config.network.base_port,
        workload = config.workload.is_enabled(),
        "starting local network"
    );

    let source = CancellationSource::new();
    let signals = tokio::spawn(cancel_on_signal(source.clone(), source.token()));

    let outcome = LocalNetwork::new(config).run(source.clone()).await;

    source.cancel();
    let _ = signals.await;

    Ok(outcome?)
}

fn interrupted(err: &anyhow::Error) -> bool {
    err.downcast_ref::<HarnessError>()
        .is_some_and(HarnessError::is_cancelled)
}

fn print_report(report: &RunReport) {
    println!("run directory: {}", report.run_dir.display());
    for node in &report.nodes {
        println!("node {} {} {}", node.index + 1, node.node_id, node.http);
    }
    if let Some(provisioning) = &report.provisioning {
        println!("domain: {}", provisioning.domain_id);
        println!("workload: {}", provisioning.workload_id);
        for endpoint in report.workload_endpoints() {
            println!("  {endpoint}");
        }
    }
}
