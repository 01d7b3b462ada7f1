//! # switchyard CLI
//!
//! Command-line front-end for the switchyard component runtime.

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to registry configuration file (YAML or JSON)
    #[arg(long, env = "SWITCHYARD_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available component kinds
    Kinds {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Execute a script of registry operations
    Run {
        /// Script file, one operation per line
        script: PathBuf,

        /// Save the resulting session to this file
        #[arg(long)]
        save: Option<PathBuf>,

        /// Print the information tree of every component when done
        #[arg(long)]
        dump: bool,
    },

    /// Restore a saved session and report what came back
    Load {
        /// Session file written by `run --save`
        session: PathBuf,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,

        /// Fail unless every component, property and connection came back
        #[arg(long)]
        strict: bool,
    },

    /// Convert a tree file between JSON and key-path text
    Convert {
        /// Input file; `.kv` files are read as key-path text, others as JSON
        input: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = TreeFormat::Keyval)]
        to: TreeFormat,

        /// Output file (defaults to stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, ValueEnum)]
pub enum TreeFormat {
    Json,
    Keyval,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Kinds { json } => commands::list_kinds(config, json),
        Commands::Run { script, save, dump } => {
            commands::run_script(config, &script, save.as_deref(), dump)
        }
        Commands::Load {
            session,
            json,
            strict,
        } => commands::load_session(config, &session, json, strict),
        Commands::Convert { input, to, output } => {
            commands::convert_tree(&input, to, output.as_deref())
        }
    }
}
