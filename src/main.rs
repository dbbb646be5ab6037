// Allow common clippy pedantic lints
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! hubspot-sync CLI
//!
//! Extracts HubSpot records as a JSON-lines change stream on stdout. Logs go
//! to stderr.

use clap::Parser;
use hubspot_sync::cli::{Cli, Runner};
use hubspot_sync::engine::ExitStatus;
use hubspot_sync::error::FailureKind;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    let runner = Runner::new(cli);

    match runner.run().await {
        Ok(status) => status.into(),
        Err(e) => {
            eprintln!("Error: {e}");
            match e.failure_kind() {
                FailureKind::InvalidCredentials => ExitStatus::InvalidCredentials.into(),
                _ => ExitStatus::Fatal.into(),
            }
        }
    }
}
