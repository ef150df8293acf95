use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "concordia",
    about = "Merge MCP server definitions from scoped collections into one canonical list",
    long_about = "Concordia merges MCP server definitions contributed by several collections
(workspace, user profile, remote hosts) into a single, deduplicated,
priority-resolved server list.

Identical definitions are collapsed onto the highest-priority collection.
Definitions that share an id but differ in configuration are all kept and
addressed as <collection>/<server>.

Configuration files are stored in:
  • $XDG_CONFIG_HOME/concordia/ (or ~/.config/concordia/)
    - config.toml: log level, default collections file, recorded consent
    - collections.json: default collections manifest
    - launch-state.json: nonces of running launches (used by `plan`)",
    version,
    author
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable debug output (shows INFO and DEBUG messages)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Enable trace output (shows all log messages including TRACE)
    #[arg(short = 't', long, global = true)]
    pub trace: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the canonical server list for a collections manifest
    #[command(long_about = "Print the canonical server list for a collections manifest.

Collections marked \"lazy\" are treated as still being discovered and do not
contribute yet. Malformed definitions are skipped and reported as warnings.

Examples:
  # Resolve the default manifest
  concordia resolve

  # Resolve a specific manifest as JSON
  concordia resolve -c ./collections.json --json

  # Only show servers whose id matches a pattern
  concordia resolve --filter '^github'")]
    Resolve(ResolveArgs),

    /// Show what the lifecycle gate would do for every server
    #[command(long_about = "Show what the lifecycle gate would do for every server.

Each server is classified as launch-fresh, reuse-existing or blocked
(untrusted / needs-consent), comparing its cache nonce with the nonce
recorded in the launch state file.

Examples:
  # Preview decisions
  concordia plan -c ./collections.json

  # Record the launch-fresh servers as running
  concordia plan --write-state --backup")]
    Plan(PlanArgs),

    /// List repository branches, stashes or tags
    Artifacts(ArtifactsArgs),
}

#[derive(clap::Args, Debug)]
pub struct ResolveArgs {
    /// Path to the collections manifest
    #[arg(short, long, env = "CONCORDIA_COLLECTIONS", value_hint = clap::ValueHint::FilePath)]
    pub collections: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Only show servers whose id matches this regular expression
    #[arg(short, long)]
    pub filter: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct PlanArgs {
    /// Path to the collections manifest
    #[arg(short, long, env = "CONCORDIA_COLLECTIONS", value_hint = clap::ValueHint::FilePath)]
    pub collections: Option<PathBuf>,

    /// Path to the launch state file
    #[arg(short, long, env = "CONCORDIA_STATE", value_hint = clap::ValueHint::FilePath)]
    pub state: Option<PathBuf>,

    /// Record launch-fresh servers as running in the state file
    #[arg(short, long)]
    pub write_state: bool,

    /// Create timestamped backup of the state file before writing it
    #[arg(short, long, requires = "write_state")]
    pub backup: bool,
}

#[derive(clap::Args, Debug)]
pub struct ArtifactsArgs {
    /// Repository to inspect
    #[arg(short, long, default_value = ".", value_hint = clap::ValueHint::DirPath)]
    pub repo: PathBuf,

    /// Group to list (branches, stashes, tags); lists the groups when omitted
    pub group: Option<String>,
}
