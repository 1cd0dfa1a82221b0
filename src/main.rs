mod catalog;
mod cleaner;
mod commands;
mod config;
mod constants;
mod discovery;
mod engine;
mod error;
mod guard;
mod model;
mod monitor;
mod registry;
mod size;
mod status;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about, long_about = None, disable_version_flag = true)]
struct Cli {
    /// Print version information
    #[arg(short = 'V', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn enabled(self) -> bool {
        self == Self::On
    }
}

#[derive(Subcommand)]
enum Command {
    /// Find projects in a folder (default: ~/Documents/Unreal Projects)
    Scan {
        #[arg(long)]
        base: Option<PathBuf>,
    },
    /// Add a single project folder
    Add { dir: PathBuf },
    /// Stop tracking a project
    Remove { dir: PathBuf },
    /// List tracked projects with their settings and cache size
    List,
    /// Show the cleanup items of a project
    Items { dir: PathBuf },
    /// Select cleanup items, e.g. `Intermediate/Build` or `Saved`
    Select {
        dir: PathBuf,
        #[arg(required = true)]
        tokens: Vec<String>,
    },
    /// Deselect cleanup items
    Deselect {
        dir: PathBuf,
        #[arg(required = true)]
        tokens: Vec<String>,
    },
    /// Change per-project monitoring settings
    Set {
        dir: PathBuf,
        #[arg(long, value_enum)]
        monitor: Option<Toggle>,
        #[arg(long, value_enum)]
        allow_clean: Option<Toggle>,
        /// Cleanup threshold in GB
        #[arg(long, conflicts_with = "no_limit")]
        limit: Option<String>,
        #[arg(long)]
        no_limit: bool,
    },
    /// Size of the selected items, for one project or all of them
    Size { dir: Option<PathBuf> },
    /// Clean one project, or every project that allows cleanup
    Clean { dir: Option<PathBuf> },
    /// Run the monitor in the foreground until Ctrl-C
    Monitor {
        /// Seconds between passes (minimum 60)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Change app settings
    Settings {
        #[arg(long, value_enum)]
        auto_start: Option<Toggle>,
        #[arg(long)]
        interval: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "cachewarden=debug"
    } else {
        "cachewarden=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli
        .config
        .or_else(config::default_config_path)
        .ok_or_else(|| anyhow::anyhow!("could not determine a config directory, pass --config"))?;

    commands::run(config_path, cli.command)
}
