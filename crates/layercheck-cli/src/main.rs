//! layercheck CLI tool.
//!
//! Usage:
//! ```bash
//! layercheck check --graph symbols.json [--config layercheck.toml]
//! layercheck edge-kinds
//! layercheck init
//! ```
//!
//! Exit codes: 0 when the check passes, 1 when a violation reaches the
//! failure threshold, 2 when the feed or the policy cannot be loaded.

use clap::{Parser, Subcommand};
use layercheck_core::ScanMode;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod inputs;

/// Layered architecture conformance checker
#[derive(Parser)]
#[command(name = "layercheck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to policy file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a symbol graph against the policy
    Check {
        /// Feed file or directory of `*.json` feeds (can be specified multiple times)
        #[arg(short, long = "graph", required = true)]
        graphs: Vec<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        /// Scan mode of layer rules that set no mode of their own
        #[arg(short, long)]
        mode: Option<ModeArg>,
    },

    /// List edge kinds and how they are scanned
    EdgeKinds,

    /// Initialize policy file
    Init {
        /// Overwrite existing policy
        #[arg(long)]
        force: bool,
    },
}

/// Output format for check results.
#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// One-line-per-violation compact format.
    Compact,
    /// JSON output.
    Json,
    /// miette diagnostics.
    Pretty,
}

/// Scan mode selection.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum ModeArg {
    /// Any dependency edge.
    DependOn,
    /// Call-site edges only.
    Access,
    /// Both.
    Either,
}

impl From<ModeArg> for ScanMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::DependOn => Self::DependOn,
            ModeArg::Access => Self::Access,
            ModeArg::Either => Self::Either,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Check {
            graphs,
            format,
            mode,
        } => commands::check::run(
            &graphs,
            format,
            mode.map(ScanMode::from),
            cli.config.as_deref(),
        )
        .map(|passed| if passed { ExitCode::SUCCESS } else { ExitCode::from(1) }),
        Commands::EdgeKinds => {
            commands::edge_kinds::run();
            Ok(ExitCode::SUCCESS)
        }
        Commands::Init { force } => commands::init::run(force).map(|()| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::from(2)
        }
    }
}
