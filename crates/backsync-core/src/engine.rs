use crate::analysis::deletion_plan::{self, CleanupPlan, StaleDuplicatesPlan};
use crate::analysis::duplicates::{self, DuplicatesResult};
use crate::analysis::sync_plan::{self, ActionPlan};
use crate::config::AppConfig;
use crate::entry::FileEntry;
use crate::error::Error;
use crate::exclusion::ExclusionMatcher;
use crate::exec::{ExecutionMode, ExecutionOptions, ExecutionReport, LocalFileOps, PlanExecutor};
use crate::hasher::{self, CacheMode, HASH_CACHE_FILE_NAME};
use crate::progress::ProgressReporter;
use crate::scanner;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// One scanned and hashed tree.
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    pub root: PathBuf,
    /// Sorted by name.
    pub entries: Vec<FileEntry>,
}

impl TreeSnapshot {
    /// Entries whose metadata or content could not be read.
    pub fn unreadable(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter().filter(|e| !e.is_readable())
    }

    pub fn total_size(&self) -> u64 {
        self.entries
            .iter()
            .filter(|e| !e.is_directory())
            .map(FileEntry::size)
            .sum()
    }
}

/// Ties scanning, hashing, planning and execution together for local trees.
pub struct SyncEngine {
    config: AppConfig,
    exclusions: ExclusionMatcher,
}

impl SyncEngine {
    /// Fails if an exclusion pattern does not compile.
    pub fn new(config: AppConfig) -> Result<Self, Error> {
        let patterns = config
            .exclude
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(HASH_CACHE_FILE_NAME));
        let exclusions = ExclusionMatcher::new(patterns)?;
        Ok(Self { config, exclusions })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn exclusions(&self) -> &ExclusionMatcher {
        &self.exclusions
    }

    /// Scans and hashes `root`.
    ///
    /// With `prune_excluded` the scan skips excluded names entirely; cleanup
    /// turns it off to see the files it has to remove.
    pub fn load_tree(
        &self,
        root: &Path,
        required: bool,
        prune_excluded: bool,
        reporter: &dyn ProgressReporter,
    ) -> Result<TreeSnapshot, Error> {
        info!("Scanning '{}'...", root.display());
        let scan_start = Instant::now();
        reporter.on_scan_start(&root.display().to_string());
        let matcher = prune_excluded.then_some(&self.exclusions);
        let items = scanner::scan_tree(root, matcher, required)?;
        let scan_duration = scan_start.elapsed();
        reporter.on_scan_complete(items.len(), scan_duration.as_secs_f64());
        debug!(
            "Scan of '{}' completed in {:.2}s: {} entries",
            root.display(),
            scan_duration.as_secs_f64(),
            items.len()
        );

        let cache_mode = CacheMode::new(self.config.use_hash_cache, self.config.dry_run);
        let entries = hasher::hash_items(items, root, cache_mode, reporter);
        Ok(TreeSnapshot {
            root: root.to_path_buf(),
            entries,
        })
    }

    pub fn plan_backup(&self, source: &TreeSnapshot, destination: &TreeSnapshot) -> ActionPlan {
        let start = Instant::now();
        let plan = sync_plan::plan(&source.entries, &destination.entries, &self.exclusions);
        debug!("Planning completed in {:.2}s", start.elapsed().as_secs_f64());
        plan
    }

    /// Applies `plan` to the local `destination`, copying from `source_root`.
    pub fn execute(
        &self,
        plan: &ActionPlan,
        source_root: &Path,
        destination: &Path,
        mode: ExecutionMode,
        reporter: &dyn ProgressReporter,
    ) -> Result<ExecutionReport, Error> {
        let start = Instant::now();
        let ops = LocalFileOps::new(destination);
        let executor = PlanExecutor::new(
            source_root,
            &ops,
            ExecutionOptions::from(&self.config),
            reporter,
        );
        let report = executor.execute(plan, mode)?;
        info!("Execution completed in {:.2}s", start.elapsed().as_secs_f64());
        Ok(report)
    }

    pub fn find_duplicates(&self, tree: &TreeSnapshot) -> DuplicatesResult {
        let start = Instant::now();
        let result = duplicates::detect_with(&tree.entries, self.config.min_shared_groups);
        debug!(
            "Duplicate detection completed in {:.2}s",
            start.elapsed().as_secs_f64()
        );
        result
    }

    /// Hash sidecars are left alone; a folder holding nothing else still
    /// counts as empty.
    pub fn plan_cleanup(&self, tree: &TreeSnapshot) -> CleanupPlan {
        let entries: Vec<FileEntry> = tree
            .entries
            .iter()
            .filter(|e| e.is_directory() || e.base_name() != HASH_CACHE_FILE_NAME)
            .cloned()
            .collect();
        deletion_plan::plan_cleanup(&entries, &self.exclusions)
    }

    pub fn plan_stale_duplicates(
        &self,
        source: &TreeSnapshot,
        destination: &TreeSnapshot,
    ) -> StaleDuplicatesPlan {
        deletion_plan::plan_stale_duplicates(&source.entries, &destination.entries, &self.exclusions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern_fails_construction() {
        let config = AppConfig {
            exclude: vec!["regex:(".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            SyncEngine::new(config),
            Err(Error::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_hash_sidecar_is_always_excluded() {
        let engine = SyncEngine::new(AppConfig {
            exclude: Vec::new(),
            ..Default::default()
        })
        .unwrap();
        assert!(engine.exclusions().is_path_excluded("photos/.backsync-hashes"));
    }

    #[test]
    fn test_cleanup_keeps_hash_sidecars() {
        let engine = SyncEngine::new(AppConfig {
            exclude: vec!["*.tmp".to_string()],
            ..Default::default()
        })
        .unwrap();
        let tree = TreeSnapshot {
            root: PathBuf::from("/tree"),
            entries: vec![
                FileEntry::directory("a"),
                crate::FileEntryBuilder::file("a/.backsync-hashes", 10)
                    .content_hash("h0")
                    .build(),
                crate::FileEntryBuilder::file("a/x.tmp", 5)
                    .content_hash("h1")
                    .build(),
                FileEntry::directory("b"),
                crate::FileEntryBuilder::file("b/.backsync-hashes", 10)
                    .content_hash("h2")
                    .build(),
                crate::FileEntryBuilder::file("b/keep.txt", 3)
                    .content_hash("h3")
                    .build(),
            ],
        };
        let plan = engine.plan_cleanup(&tree);
        let ignored: Vec<&str> = plan.ignored_files.iter().map(FileEntry::name).collect();
        let folders: Vec<&str> = plan.empty_folders.iter().map(FileEntry::name).collect();
        assert_eq!(ignored, vec!["a/x.tmp"]);
        assert_eq!(folders, vec!["a"]);
    }
}
