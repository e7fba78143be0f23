pub mod analysis;
pub mod config;
pub mod engine;
pub mod entry;
pub mod error;
pub mod exclusion;
pub mod exec;
pub mod hasher;
pub mod progress;
pub mod scanner;

pub use analysis::deletion_plan::{CleanupPlan, StaleDuplicatesPlan};
pub use analysis::duplicates::{
    detect, detect_with, DuplicateGroup, DuplicatesResult, DuplicatesSummary, FolderDuplicateGroup,
    PartialFolder, PartialFolderGroup,
};
pub use analysis::sync_plan::{plan, ActionPlan, ActionStats, MovePair, PlanSummary};
pub use config::AppConfig;
pub use engine::{SyncEngine, TreeSnapshot};
pub use entry::{FileEntry, FileEntryBuilder};
pub use error::Error;
pub use exclusion::ExclusionMatcher;
pub use exec::{ExecutionMode, ExecutionReport, FileOps, LocalFileOps, PlanExecutor};
pub use hasher::HASH_CACHE_FILE_NAME;
pub use progress::{ProgressReporter, SilentReporter};
