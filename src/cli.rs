use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "keel")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge a host to declared files, packages and alternatives", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List registered resource types
    Types,

    /// Print the current state of one resource as JSON
    Show(ShowArgs),

    /// Preview what apply would change
    Diff(DiffArgs),

    /// Make the host match the manifests
    Apply(ApplyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct ShowArgs {
    /// Resource type (see `keel types`)
    pub resource_type: String,

    /// Identifier: a path, package or alternative name
    pub id: String,
}

#[derive(Parser)]
pub struct DiffArgs {
    /// Manifest files (defaults to `manifests` in config.toml)
    pub manifests: Vec<PathBuf>,

    /// Only show resources of this type
    #[arg(short = 't', long = "type")]
    pub resource_type: Option<String>,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Manifest files (defaults to `manifests` in config.toml)
    pub manifests: Vec<PathBuf>,

    /// Show the diff without changing anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Apply without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Number of concurrent debconf queries
    #[arg(short, long)]
    pub jobs: Option<usize>,
}
