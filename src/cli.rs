// CLI module - command-line argument parsing and handlers
//
// Subcommands:
// - config --show:  Display effective configuration
// - config --reset: Regenerate config file with defaults
// - config --path:  Print the config file location
// - demo:           Drive a sample chat container against a console adapter

use chatmount::config::{Config, VERSION};
use clap::{Parser, Subcommand};
use std::io::Write;

/// chatmount - declarative chat UI renderer
#[derive(Parser)]
#[command(name = "chatmount")]
#[command(version = VERSION)]
#[command(about = "Render component trees into chat messages", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Mount a sample chat and stream commits through the scheduler
    Demo {
        /// Number of commit bursts to send
        #[arg(long, default_value_t = 3)]
        bursts: u32,

        /// Commits per burst
        #[arg(long, default_value_t = 5)]
        burst_size: u32,

        /// Skip the suspended phase
        #[arg(long)]
        no_suspend: bool,
    },
}

/// Options for the demo run
#[derive(Debug, Clone, Copy)]
pub struct DemoArgs {
    pub bursts: u32,
    pub burst_size: u32,
    pub suspend: bool,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            bursts: 3,
            burst_size: 5,
            suspend: true,
        }
    }
}

/// Handle config commands. Returns demo options when the demo should run.
pub fn handle_cli(cli: Cli) -> Option<DemoArgs> {
    match cli.command {
        Some(Commands::Config { show, reset, path }) => {
            if path {
                handle_config_path();
            } else if show {
                handle_config_show();
            } else if reset {
                handle_config_reset();
            } else {
                // No flag provided, show help
                println!("Usage: chatmount config [--show|--reset|--path]");
                println!();
                println!("Options:");
                println!("  --show    Display effective configuration");
                println!("  --reset   Reset config file to defaults");
                println!("  --path    Show config file path");
            }
            None
        }
        Some(Commands::Demo {
            bursts,
            burst_size,
            no_suspend,
        }) => Some(DemoArgs {
            bursts,
            burst_size,
            suspend: !no_suspend,
        }),
        None => Some(DemoArgs::default()),
    }
}

fn handle_config_path() {
    match Config::config_path() {
        Some(path) => println!("{}", path.display()),
        None => {
            eprintln!("Error: Could not determine config path");
            std::process::exit(1);
        }
    }
}

fn handle_config_show() {
    let config = Config::from_env();

    println!("# Effective configuration (env > file > defaults)");
    println!();
    print!("{}", config.to_toml());

    println!();
    println!(
        "# Effective scheduler timing: debounce {}ms, max wait {}ms",
        config.scheduler.debounce_ms,
        config.scheduler.effective_max_wait_ms()
    );
    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("# Source: {}", path.display());
        } else {
            println!("# Source: defaults (no config file)");
        }
    }
}

fn handle_config_reset() {
    let Some(path) = Config::config_path() else {
        eprintln!("Error: Could not determine config path");
        std::process::exit(1);
    };

    // Confirm if file exists
    if path.exists() {
        eprint!(
            "Config file exists at {}. Overwrite? [y/N] ",
            path.display()
        );
        let _ = std::io::stderr().flush();

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input).is_err()
            || !input.trim().eq_ignore_ascii_case("y")
        {
            println!("Aborted.");
            return;
        }
    }

    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("Error creating directory: {}", e);
            std::process::exit(1);
        }
    }

    // Write the default config (using Config's single source of truth)
    if let Err(e) = std::fs::write(&path, Config::default().to_toml()) {
        eprintln!("Error writing config: {}", e);
        std::process::exit(1);
    }

    println!("Config reset to defaults: {}", path.display());
}
