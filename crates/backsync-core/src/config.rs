use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;

use crate::analysis::duplicates::DEFAULT_MIN_SHARED_GROUPS;

const DEFAULT_PARALLEL_THREADS: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub source_root: Option<String>,
    #[serde(default)]
    pub destination_root: Option<String>,
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub no_deletion: bool,
    #[serde(default)]
    pub no_overriding: bool,
    #[serde(default = "default_true")]
    pub use_hash_cache: bool,
    #[serde(default)]
    pub verbose: bool,
    /// Hash groups two folders must share to join one partial duplicate group.
    #[serde(default = "default_min_shared_groups")]
    pub min_shared_groups: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_root: None,
            destination_root: None,
            exclude: default_exclude(),
            parallel_threads: default_parallel_threads(),
            dry_run: false,
            no_deletion: false,
            no_overriding: false,
            use_hash_cache: true,
            verbose: false,
            min_shared_groups: default_min_shared_groups(),
        }
    }
}

fn default_exclude() -> Vec<String> {
    ["._*", "Thumbs.db", "desktop.ini", ".DS_Store", ".~lock*"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_parallel_threads() -> usize {
    DEFAULT_PARALLEL_THREADS
}

fn default_min_shared_groups() -> usize {
    DEFAULT_MIN_SHARED_GROUPS
}

fn default_true() -> bool {
    true
}

/// Loads `backsync.toml` from the working directory (if present), then
/// `BACKSYNC_*` environment variables. List values in the environment are
/// comma separated.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    load_configuration_from("backsync")
}

pub fn load_configuration_from(file_stem: &str) -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name(file_stem).required(false))
        .add_source(
            Environment::with_prefix("BACKSYNC")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("exclude"),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

impl AppConfig {
    /// Worker count actually used for execution; never zero.
    pub fn effective_threads(&self) -> usize {
        self.parallel_threads.max(1)
    }
}
