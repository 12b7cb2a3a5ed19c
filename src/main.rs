// chatmount - demo binary for the chat renderer
//
// Loads configuration, installs logging, then mounts a sample chat and
// streams commits through the per-container scheduler so the debounce and
// suspend behavior can be watched on the console.
//
// Subcommands are handled in cli.rs; everything else runs the demo.

mod cli;
mod demo;

use anyhow::Result;
use chatmount::config::{Config, VERSION};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    // Config subcommands exit early
    let Some(args) = cli::handle_cli(cli::Cli::parse()) else {
        return Ok(());
    };

    Config::ensure_config_exists();
    let config = Config::from_env();

    // Keep the guard alive so the file writer flushes on exit
    let _log_guard = chatmount::logging::init(&config.logging);

    tracing::info!(
        version = VERSION,
        mode = config.scheduler.mode.as_str(),
        debounce_ms = config.scheduler.debounce_ms,
        max_wait_ms = config.scheduler.effective_max_wait_ms(),
        "chatmount starting"
    );

    let report = demo::run_demo(&config, args).await?;
    tracing::info!(
        commits = report.commits,
        dispatches = report.dispatches,
        "demo finished"
    );
    Ok(())
}
