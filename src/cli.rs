use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "strata")]
#[command(version)]
#[command(about = "Evaluate and converge declarative provisioning graphs", long_about = None)]
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

/// Which configuration a command operates on
#[derive(Args, Debug, Clone, Default)]
pub struct Source {
    /// Named variant (a `<name>.toml` in the config directory)
    #[arg(long)]
    pub variant: Option<String>,

    /// Use this config file instead of the config directory
    #[arg(short, long, conflicts_with = "variant")]
    pub file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build the graph and report validation errors
    Validate(SourceArgs),

    /// Show the resolved apply order and parallel levels
    Graph(SourceArgs),

    /// Preview what apply would change
    Plan(PlanArgs),

    /// Converge recorded state to the declared graph
    Apply(ApplyArgs),

    /// Delete every recorded resource, dependents first
    Destroy(DestroyArgs),

    /// Inspect or edit recorded state
    #[command(subcommand)]
    State(StateCommand),

    /// List named configurations
    Variants,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct SourceArgs {
    #[command(flatten)]
    pub source: Source,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub source: Source,

    /// Only show nodes matching "type", "name" or "type.name"
    pub target: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub source: Source,

    /// Dry run - show the plan without applying
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Number of nodes applied concurrently
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Stop starting new nodes after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Print the apply report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct DestroyArgs {
    #[command(flatten)]
    pub source: Source,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Number of nodes deleted concurrently
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,
}

#[derive(Subcommand)]
pub enum StateCommand {
    /// List recorded nodes
    List(SourceArgs),

    /// Show the record of one node
    Show {
        #[command(flatten)]
        source: Source,

        /// Node address, "type.name"
        node: String,
    },

    /// Forget a node without deleting the resource
    Rm {
        #[command(flatten)]
        source: Source,

        /// Node address, "type.name"
        node: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}
