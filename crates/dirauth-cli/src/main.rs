//! # dirauth
//!
//! Command-line tool for LDAP credential checks and directory browsing.

#![forbid(unsafe_code)]

use anyhow::Context;
use clap::Parser;
use dirauth_cli::{
    cli::{Cli, Command},
    commands::{
        run_add, run_children, run_config, run_delete, run_entry, run_modify, run_search, run_test,
        run_verify,
    },
    config::CliConfig,
    output::error,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(cli).await {
        error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let path = match cli.config {
        Some(path) => path,
        None => CliConfig::config_path()?,
    };
    let mut config = CliConfig::load_from(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    let format = cli.output.unwrap_or(config.output_format);

    let command = match cli.command {
        Command::Config(cmd) => return Ok(run_config(cmd, &mut config, &path)?),
        command => command,
    };

    let (name, profile) = config.profile(cli.profile.as_deref())?;
    tracing::debug!(profile = name, "Using profile");

    match command {
        Command::Verify { principal, base } => {
            run_verify(principal, base, name, profile, format).await?;
        }
        Command::Search(args) => run_search(args, name, profile, format).await?,
        Command::Children { dn } => run_children(&dn, name, profile, format).await?,
        Command::Entry { dn } => run_entry(&dn, name, profile, format).await?,
        Command::Test => run_test(name, profile, format).await?,
        Command::Add { dn, attr } => run_add(&dn, &attr, name, profile).await?,
        Command::Modify { dn, set, clear } => run_modify(&dn, &set, &clear, name, profile).await?,
        Command::Delete { dn, force } => run_delete(&dn, force, name, profile).await?,
        Command::Config(_) => {}
    }
    Ok(())
}
