/// Trait for reporting progress of long-running phases.
///
/// The CLI implements it with indicatif spinners and bars.
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_start(&self, _root: &str) {}
    fn on_scan_complete(&self, _total_entries: usize, _duration_secs: f64) {}
    fn on_hash_start(&self, _total_files: usize) {}
    fn on_hash_progress(&self, _files_hashed: usize, _total_files: usize) {}
    fn on_hash_complete(&self, _cache_hits: usize, _duration_secs: f64) {}
    fn on_phase_start(&self, _phase: &str, _operations: usize) {}
    fn on_operation_done(&self, _path: &str) {}
    fn on_phase_complete(&self, _phase: &str, _failures: usize) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
