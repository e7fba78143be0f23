use backsync_core::AppConfig;
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "backsync")]
#[command(about = "One-way backup sync with move detection and duplicate analysis", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Options shared by every command that scans a tree.
#[derive(Debug, Clone, Default, Args)]
pub struct RunFlags {
    /// Show what would be done without changing anything
    #[arg(long)]
    pub dry_run: bool,
    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
    /// Number of worker threads for copy and delete phases
    #[arg(short = 't', long)]
    pub threads: Option<usize>,
    /// Ignore and do not write the per-folder hash caches
    #[arg(long)]
    pub no_cache: bool,
    /// Additional exclusion pattern (repeatable)
    #[arg(short = 'x', long = "exclude")]
    pub exclude: Vec<String>,
    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl RunFlags {
    /// Command line values take precedence over file and environment settings.
    pub fn apply_to(&self, config: &mut AppConfig) {
        config.dry_run |= self.dry_run;
        config.verbose |= self.verbose;
        if self.no_cache {
            config.use_hash_cache = false;
        }
        if let Some(threads) = self.threads {
            config.parallel_threads = threads;
        }
        config.exclude.extend(self.exclude.iter().cloned());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Side {
    /// The source root
    Src,
    /// The destination root
    Dst,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Make the destination an exact copy of the source
    Backup {
        /// Source root (overrides `source_root`)
        #[arg(short, long)]
        source: Option<String>,
        /// Destination root (overrides `destination_root`)
        #[arg(short, long)]
        destination: Option<String>,
        /// Never delete anything from the destination
        #[arg(long)]
        no_deletion: bool,
        /// Never overwrite changed files in the destination
        #[arg(long)]
        no_overriding: bool,
        #[command(flatten)]
        flags: RunFlags,
    },
    /// Report duplicate folders and files in one tree
    Duplicates {
        /// Which configured root to analyse
        #[arg(long, value_enum, default_value_t = Side::Dst)]
        target: Side,
        /// Explicit path to analyse instead of a configured root
        #[arg(short, long)]
        path: Option<String>,
        #[command(flatten)]
        flags: RunFlags,
    },
    /// Delete excluded files and folders that contain nothing else
    Cleanup {
        /// Which configured root to clean
        #[arg(long, value_enum, default_value_t = Side::Dst)]
        target: Side,
        /// Explicit path to clean instead of a configured root
        #[arg(short, long)]
        path: Option<String>,
        #[command(flatten)]
        flags: RunFlags,
    },
    /// Delete source files that already exist in the destination
    DelOldDuplicates {
        #[arg(short, long)]
        source: Option<String>,
        #[arg(short, long)]
        destination: Option<String>,
        #[command(flatten)]
        flags: RunFlags,
    },
    /// Print configuration values
    PrintConfig,
}

/// Picks the root a single-tree command works on.
pub fn resolve_root(config: &AppConfig, target: Side, path: Option<String>) -> Option<String> {
    path.or_else(|| match target {
        Side::Src => config.source_root.clone(),
        Side::Dst => config.destination_root.clone(),
    })
}
