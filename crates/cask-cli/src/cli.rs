use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "cask",
    version,
    about = "Deduplicating, content-addressed backups",
    after_help = "\
Configuration file lookup order:
  1. --config <path>     (explicit flag)
  2. $CASK_CONFIG        (environment variable)
  3. ./cask.yaml         (current directory)"
)]
pub(crate) struct Cli {
    /// Path to configuration file (overrides CASK_CONFIG)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Write a starter configuration file
    Config {
        /// Repository location to put in the file
        url: String,

        /// Destination path
        #[arg(short, long, default_value = "cask.yaml")]
        dest: String,
    },

    /// Initialize a new repository
    Init,

    /// Back up a directory to a new snapshot
    Backup {
        /// Source location: a path or `fs://path`
        path: String,

        /// Name recorded in the snapshot
        #[arg(short, long)]
        name: Option<String>,

        /// Tags recorded in the snapshot (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Re-read every file instead of trusting the file cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Restore files from a snapshot
    Restore {
        /// Snapshot reference: `latest`, an id prefix, optionally `:path`
        snapshot: String,

        /// Destination directory
        #[arg(long = "to")]
        dest: String,

        /// Place the restored path at the destination root
        #[arg(long)]
        rebase: bool,

        /// Do not apply modes or modification times
        #[arg(long)]
        skip_permissions: bool,
    },

    /// Verify repository integrity
    Check {
        /// Snapshot to check (all snapshots if omitted)
        snapshot: Option<String>,

        /// Only check that referenced blobs exist
        #[arg(long)]
        fast: bool,
    },

    /// List snapshots, or the contents of a snapshot directory
    Ls {
        /// Snapshot reference with optional path, e.g. `latest:/etc`
        snapshot: Option<String>,
    },

    /// Copy snapshots to or from another repository
    Sync {
        /// `to` pushes, `from` pulls, `with` does both
        #[arg(value_enum)]
        direction: SyncDirection,

        /// Location of the other repository
        url: String,

        /// Snapshot to copy (all snapshots if omitted)
        snapshot: Option<String>,
    },

    /// Delete snapshots
    Rm {
        /// Snapshot references, e.g. `latest` or an id prefix
        #[arg(required = true)]
        snapshots: Vec<String>,
    },

    /// Inspect repository internals
    Info {
        #[command(subcommand)]
        command: InfoCommand,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum SyncDirection {
    To,
    From,
    With,
}

#[derive(Subcommand)]
pub(crate) enum InfoCommand {
    /// List states, or show one state
    State { id: Option<String> },

    /// List packfiles, or show one packfile's index
    Packfile { id: Option<String> },

    /// Show snapshot metadata and statistics
    Snapshot { snapshot: String },

    /// List objects, or show one object's chunks
    Object { id: Option<String> },

    /// Show the entry stored at a snapshot path
    Vfs {
        /// Snapshot reference with path, e.g. `latest:/etc/hosts`
        reference: String,
    },
}

impl Commands {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Commands::Config { .. } => "config",
            Commands::Init => "init",
            Commands::Backup { .. } => "backup",
            Commands::Restore { .. } => "restore",
            Commands::Check { .. } => "check",
            Commands::Ls { .. } => "ls",
            Commands::Sync { .. } => "sync",
            Commands::Rm { .. } => "rm",
            Commands::Info { .. } => "info",
        }
    }
}
