//! # hostroot
//!
//! Init shim that turns a container's read-write layer into the root
//! filesystem and hands over to its init.
//!
//! With `--sysroot` it instead mounts the active container of another
//! system root and prints where it can be browsed.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod commands;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(&directives))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::execute(cli)
}

/// Builds the log filter from `RUST_LOG`-style directives.
///
/// Init usually starts without `RUST_LOG`, so an empty value falls back to
/// `info` and warnings about skipped mounts still reach the console.
fn log_filter(directives: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directives)
}
