pub mod local;

pub use local::LocalFileOps;

use crate::analysis::sync_plan::{deepest_first, ActionPlan, MovePair};
use crate::config::AppConfig;
use crate::entry::{depth, is_under, FileEntry};
use crate::error::Error;
use crate::progress::ProgressReporter;
use dashmap::DashMap;
use rayon::prelude::*;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Primitive operations on a destination tree. Names are relative to the
/// destination root.
pub trait FileOps: Send + Sync {
    fn create_folder(&self, name: &str) -> io::Result<()>;
    /// Copies `source` (an absolute path) to `target`. Without `overwrite`
    /// an existing target is an error.
    fn copy_file(&self, source: &Path, target: &str, overwrite: bool) -> io::Result<()>;
    /// Deleting something that does not exist is not an error.
    fn delete(&self, name: &str, is_directory: bool) -> io::Result<()>;
    fn move_or_rename(&self, from: &str, to: &str) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Full,
    /// Only moves and renames; used to reorganise the destination first.
    MovesOnly,
}

#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    pub dry_run: bool,
    pub no_deletion: bool,
    pub no_overriding: bool,
    pub parallel_threads: usize,
}

impl From<&AppConfig> for ExecutionOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            dry_run: config.dry_run,
            no_deletion: config.no_deletion,
            no_overriding: config.no_overriding,
            parallel_threads: config.effective_threads(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFailure {
    pub operation: &'static str,
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub completed: usize,
    pub skipped: usize,
    /// Sorted by path.
    pub failures: Vec<OperationFailure>,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Applies an [`ActionPlan`] to a destination through [`FileOps`].
///
/// Phases, in order:
/// 1. files replaced by folders that a move target lies in
/// 2. folder moves and renames (shallowest target first), then file moves
///    and renames
/// 3. folder creation, parents first
/// 4. copies, then overrides (unless `no_overriding`)
/// 5. file deletions, then folder deletions deepest first (unless `no_deletion`)
///
/// A failed operation is recorded and the remaining ones still run.
pub struct PlanExecutor<'a> {
    source_root: PathBuf,
    ops: &'a dyn FileOps,
    options: ExecutionOptions,
    reporter: &'a dyn ProgressReporter,
}

struct PhaseState {
    completed: AtomicUsize,
    skipped: AtomicUsize,
    failures: DashMap<String, OperationFailure>,
}

impl<'a> PlanExecutor<'a> {
    pub fn new(
        source_root: impl Into<PathBuf>,
        ops: &'a dyn FileOps,
        options: ExecutionOptions,
        reporter: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            ops,
            options,
            reporter,
        }
    }

    pub fn execute(&self, plan: &ActionPlan, mode: ExecutionMode) -> Result<ExecutionReport, Error> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.parallel_threads.max(1))
            .build()?;
        let state = PhaseState {
            completed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            failures: DashMap::new(),
        };

        // a folder may land inside another moved folder; parents go first
        let mut folder_pairs: Vec<&MovePair> = plan
            .to_rename_folders
            .iter()
            .chain(&plan.to_move_folders)
            .collect();
        folder_pairs.sort_by(|a, b| {
            (depth(&a.target), &a.target).cmp(&(depth(&b.target), &b.target))
        });
        let file_pairs: Vec<&MovePair> = plan
            .to_rename_files
            .iter()
            .chain(&plan.to_move_files)
            .collect();

        // A file standing where a move target's folder must be is replaced
        // before the moves run.
        let (replaced, folder_overrides): (Vec<&FileEntry>, Vec<&FileEntry>) =
            if self.options.no_overriding {
                (Vec::new(), Vec::new())
            } else {
                plan.to_override
                    .iter()
                    .filter(|e| e.is_directory())
                    .partition(|folder| {
                        folder_pairs
                            .iter()
                            .chain(&file_pairs)
                            .any(|pair| is_under(&pair.target, folder.name()))
                    })
            };
        self.create_folders("Replacing files with folders", replaced, &state);

        self.run_moves("Moving folders", &folder_pairs, &state);
        self.run_moves("Moving files", &file_pairs, &state);

        if mode == ExecutionMode::Full {
            let mut folders: Vec<&FileEntry> =
                plan.to_add.iter().filter(|e| e.is_directory()).collect();
            folders.extend(folder_overrides);
            self.create_folders("Creating folders", folders, &state);

            let copies: Vec<&FileEntry> = plan.to_add.iter().filter(|e| !e.is_directory()).collect();
            pool.install(|| self.copy_files("Copying files", &copies, false, &state));

            let overrides: Vec<&FileEntry> = plan
                .to_override
                .iter()
                .filter(|e| !e.is_directory())
                .collect();
            if self.options.no_overriding {
                info!("Skipping {} overrides (no-overriding)", overrides.len());
                state.skipped.fetch_add(overrides.len(), Ordering::Relaxed);
            } else {
                pool.install(|| self.copy_files("Overriding files", &overrides, true, &state));
            }

            if self.options.no_deletion {
                info!("Skipping {} deletions (no-deletion)", plan.to_delete.len());
                state.skipped.fetch_add(plan.to_delete.len(), Ordering::Relaxed);
            } else {
                pool.install(|| self.delete_entries(&plan.to_delete, &state));
            }
        }

        let mut failures: Vec<OperationFailure> =
            state.failures.into_iter().map(|(_, failure)| failure).collect();
        failures.sort_by(|a, b| a.path.cmp(&b.path));

        let report = ExecutionReport {
            completed: state.completed.load(Ordering::Relaxed),
            skipped: state.skipped.load(Ordering::Relaxed),
            failures,
        };
        info!(
            "Execution finished: {} done, {} skipped, {} failed",
            report.completed,
            report.skipped,
            report.failures.len()
        );
        Ok(report)
    }

    fn record(&self, state: &PhaseState, operation: &'static str, path: &str, result: io::Result<()>) {
        match result {
            Ok(()) => {
                state.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                warn!("{} '{}' failed: {}", operation, path, err);
                state.failures.insert(
                    path.to_string(),
                    OperationFailure {
                        operation,
                        path: path.to_string(),
                        error: err.to_string(),
                    },
                );
            }
        }
        self.reporter.on_operation_done(path);
    }

    /// Runs `action` unless in dry-run mode.
    fn perform(
        &self,
        state: &PhaseState,
        operation: &'static str,
        path: &str,
        action: impl FnOnce() -> io::Result<()>,
    ) {
        if self.options.dry_run {
            info!("[dry-run] {} {}", operation, path);
            state.completed.fetch_add(1, Ordering::Relaxed);
            self.reporter.on_operation_done(path);
            return;
        }
        debug!("{} {}", operation, path);
        self.record(state, operation, path, action());
    }

    fn run_moves(&self, phase: &str, pairs: &[&MovePair], state: &PhaseState) {
        if pairs.is_empty() {
            return;
        }
        self.reporter.on_phase_start(phase, pairs.len());
        let before = state.failures.len();
        for pair in pairs {
            let label = format!("{} -> {}", pair.from(), pair.target);
            self.perform(state, "move", &label, || {
                self.ops.move_or_rename(pair.from(), &pair.target)
            });
        }
        self.reporter
            .on_phase_complete(phase, state.failures.len() - before);
    }

    /// Creates `folders` parents first; an existing file of the same name is
    /// replaced.
    fn create_folders(&self, phase: &str, mut folders: Vec<&FileEntry>, state: &PhaseState) {
        if folders.is_empty() {
            return;
        }
        folders.sort_by(|a, b| (a.depth(), a.name()).cmp(&(b.depth(), b.name())));

        self.reporter.on_phase_start(phase, folders.len());
        let before = state.failures.len();
        for folder in folders {
            self.perform(state, "create folder", folder.name(), || {
                self.ops.create_folder(folder.name())
            });
        }
        self.reporter
            .on_phase_complete(phase, state.failures.len() - before);
    }

    fn copy_files(&self, phase: &str, files: &[&FileEntry], overwrite: bool, state: &PhaseState) {
        if files.is_empty() {
            return;
        }
        self.reporter.on_phase_start(phase, files.len());
        let before = state.failures.len();
        let operation = if overwrite { "override" } else { "copy" };
        files.par_iter().for_each(|file| {
            let source = self.source_root.join(file.name());
            self.perform(state, operation, file.name(), || {
                self.ops.copy_file(&source, file.name(), overwrite)
            });
        });
        self.reporter
            .on_phase_complete(phase, state.failures.len() - before);
    }

    fn delete_entries(&self, entries: &[FileEntry], state: &PhaseState) {
        if entries.is_empty() {
            return;
        }
        let phase = "Deleting";
        self.reporter.on_phase_start(phase, entries.len());
        let before = state.failures.len();

        let files: Vec<&FileEntry> = entries.iter().filter(|e| !e.is_directory()).collect();
        files.par_iter().for_each(|file| {
            self.perform(state, "delete", file.name(), || self.ops.delete(file.name(), false));
        });

        let mut folders: Vec<&FileEntry> = entries.iter().filter(|e| e.is_directory()).collect();
        folders.sort_by(|a, b| deepest_first(a).cmp(&deepest_first(b)));
        for folder in folders {
            self.perform(state, "delete folder", folder.name(), || {
                self.ops.delete(folder.name(), true)
            });
        }
        self.reporter
            .on_phase_complete(phase, state.failures.len() - before);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::FileEntryBuilder;
    use crate::progress::SilentReporter;
    use std::sync::Mutex;

    /// Records calls instead of touching the filesystem.
    #[derive(Default)]
    struct RecordingOps {
        calls: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl RecordingOps {
        fn push(&self, call: String, name: &str) -> io::Result<()> {
            self.calls.lock().unwrap().push(call);
            if self.fail_on.as_deref() == Some(name) {
                return Err(io::Error::new(io::ErrorKind::Other, "boom"));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl FileOps for RecordingOps {
        fn create_folder(&self, name: &str) -> io::Result<()> {
            self.push(format!("mkdir {}", name), name)
        }
        fn copy_file(&self, _source: &Path, target: &str, overwrite: bool) -> io::Result<()> {
            self.push(format!("copy {} {}", target, overwrite), target)
        }
        fn delete(&self, name: &str, is_directory: bool) -> io::Result<()> {
            self.push(format!("delete {} {}", name, is_directory), name)
        }
        fn move_or_rename(&self, from: &str, to: &str) -> io::Result<()> {
            self.push(format!("move {} {}", from, to), from)
        }
    }

    fn options() -> ExecutionOptions {
        ExecutionOptions {
            dry_run: false,
            no_deletion: false,
            no_overriding: false,
            parallel_threads: 1,
        }
    }

    fn sample_plan() -> ActionPlan {
        ActionPlan {
            to_add: vec![
                FileEntry::directory("new"),
                FileEntryBuilder::file("new/a.txt", 1).content_hash("h1").build(),
            ],
            to_delete: vec![
                FileEntry::directory("gone"),
                FileEntry::directory("gone/deeper"),
                FileEntryBuilder::file("gone/x.txt", 1).content_hash("h2").build(),
            ],
            to_override: vec![FileEntryBuilder::file("b.txt", 2).content_hash("h3").build()],
            to_rename_folders: vec![MovePair {
                entry: FileEntry::directory("old-name"),
                target: "new-name".to_string(),
            }],
            to_move_files: vec![MovePair {
                entry: FileEntryBuilder::file("c.txt", 3).content_hash("h4").build(),
                target: "new/c.txt".to_string(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_phase_order() {
        let ops = RecordingOps::default();
        let executor = PlanExecutor::new("/src", &ops, options(), &SilentReporter);
        let report = executor.execute(&sample_plan(), ExecutionMode::Full).unwrap();
        assert!(report.is_success());
        assert_eq!(
            ops.calls(),
            vec![
                "move old-name new-name",
                "move c.txt new/c.txt",
                "mkdir new",
                "copy new/a.txt false",
                "copy b.txt true",
                "delete gone/x.txt false",
                "delete gone/deeper true",
                "delete gone true",
            ]
        );
        assert_eq!(report.completed, 8);
    }

    #[test]
    fn test_file_replaced_by_folder_before_moving_into_it() {
        let ops = RecordingOps::default();
        let plan = ActionPlan {
            to_delete: vec![FileEntry::directory("x")],
            to_override: vec![FileEntry::directory("y"), FileEntry::directory("z")],
            to_move_files: vec![MovePair {
                entry: FileEntryBuilder::file("x/f", 3).content_hash("h1").build(),
                target: "y/f".to_string(),
            }],
            ..Default::default()
        };
        let executor = PlanExecutor::new("/src", &ops, options(), &SilentReporter);
        let report = executor.execute(&plan, ExecutionMode::Full).unwrap();
        assert!(report.is_success());
        assert_eq!(
            ops.calls(),
            vec!["mkdir y", "move x/f y/f", "mkdir z", "delete x true"]
        );

        let ops = RecordingOps::default();
        let executor = PlanExecutor::new("/src", &ops, options(), &SilentReporter);
        executor.execute(&plan, ExecutionMode::MovesOnly).unwrap();
        assert_eq!(ops.calls(), vec!["mkdir y", "move x/f y/f"]);
    }

    #[test]
    fn test_moves_only_mode() {
        let ops = RecordingOps::default();
        let executor = PlanExecutor::new("/src", &ops, options(), &SilentReporter);
        executor.execute(&sample_plan(), ExecutionMode::MovesOnly).unwrap();
        assert_eq!(ops.calls(), vec!["move old-name new-name", "move c.txt new/c.txt"]);
    }

    #[test]
    fn test_flags_skip_overrides_and_deletions() {
        let ops = RecordingOps::default();
        let opts = ExecutionOptions {
            no_deletion: true,
            no_overriding: true,
            ..options()
        };
        let executor = PlanExecutor::new("/src", &ops, opts, &SilentReporter);
        let report = executor.execute(&sample_plan(), ExecutionMode::Full).unwrap();
        let calls = ops.calls();
        assert!(!calls.iter().any(|c| c.starts_with("delete")));
        assert!(!calls.iter().any(|c| c.ends_with("true") && c.starts_with("copy")));
        assert_eq!(report.skipped, 4);
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let ops = RecordingOps::default();
        let opts = ExecutionOptions {
            dry_run: true,
            ..options()
        };
        let executor = PlanExecutor::new("/src", &ops, opts, &SilentReporter);
        let report = executor.execute(&sample_plan(), ExecutionMode::Full).unwrap();
        assert!(ops.calls().is_empty());
        assert_eq!(report.completed, 8);
    }

    #[test]
    fn test_failure_does_not_abort() {
        let ops = RecordingOps {
            fail_on: Some("new/a.txt".to_string()),
            ..Default::default()
        };
        let executor = PlanExecutor::new("/src", &ops, options(), &SilentReporter);
        let report = executor.execute(&sample_plan(), ExecutionMode::Full).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, "new/a.txt");
        assert_eq!(report.failures[0].operation, "copy");
        assert!(ops.calls().iter().any(|c| c == "delete gone true"));
    }
}
