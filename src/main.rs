//! `fa_pod_cp` - clone a pod of NFS file systems on a Pure Flash Array.
//!
//! ## Usage
//!
//! ```text
//! fa_pod_cp -s gct-pod-ora-swingdb -t gct-pod-tmp -f export_rules.json -e _tmp -x
//! ```
//!
//! Without `-x` the safety lock stays engaged and nothing is changed on the
//! array. Set `RUST_LOG=debug` to see every REST call.

#![allow(clippy::print_stderr)] // The fatal diagnostic block goes to stderr

use std::process::ExitCode;

use clap::Parser;
use fa_pod_clone::{Cli, CloneError, CloneReport, FlashArrayClient, PodCloneConfig, PodCloner};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const BANNER: &str = "============";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    info!("{} {} started", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match run(&cli).await {
        Ok(report) => {
            info!(
                mode = %report.mode,
                policies = report.policies.len(),
                file_systems = report.file_systems.len(),
                exports = report.exports.len(),
                "finished {} -> {}",
                report.source_pod,
                report.target_pod
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_fatal(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<CloneReport, CloneError> {
    let cfg = PodCloneConfig::load(&cli.config_file)?;

    info!("connecting to Flash Array:{}", cfg.host);
    let array = FlashArrayClient::connect(cfg.client_config())
        .await
        .map_err(|source| CloneError::Connect {
            host: cfg.host.clone(),
            source,
        })?;
    info!("connected");

    let request = cli.clone_request(cfg.rules.clone());
    PodCloner::new(&array, request).run().await
}

/// Print the bordered diagnostic block for a fatal error.
fn report_fatal(e: &CloneError) {
    eprintln!("{BANNER}");
    eprintln!("error:{e}");
    if let Some(status) = e.status() {
        eprintln!("return code:{}", status.as_u16());
    }
    eprintln!("{BANNER}");
    eprintln!("program terminated");
}
