use backsync_core::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Scan phase: spinner (entry count unknown upfront)
/// - Hash phase: progress bar over the files found by the scan
/// - Execution phases: progress bar over the phase's operations
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(TICK_CHARS)
}

fn bar_style(label: &str) -> ProgressStyle {
    let template = format!(
        "  {{spinner:.cyan}} {} [{{bar:30.cyan/dim}}] {{pos}}/{{len}} ({{eta}} remaining)",
        label
    );
    ProgressStyle::with_template(&template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸─")
        .tick_chars(TICK_CHARS)
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.lock();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        pb.enable_steady_tick(Duration::from_millis(80));
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.lock().take() {
            pb.finish_and_clear();
        }
    }
}

impl Default for CliReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for CliReporter {
    fn on_scan_start(&self, root: &str) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(spinner_style());
        pb.set_message(format!("Scanning {}...", root));
        self.set_bar(pb);
    }

    fn on_scan_complete(&self, total_entries: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Scan complete: {} entries in {:.2}s",
            total_entries, duration_secs
        );
    }

    fn on_hash_start(&self, total_files: usize) {
        let pb = ProgressBar::new(total_files as u64);
        pb.set_style(bar_style("Hashing"));
        self.set_bar(pb);
    }

    fn on_hash_progress(&self, files_hashed: usize, total_files: usize) {
        if let Some(pb) = self.lock().as_ref() {
            if pb.length() != Some(total_files as u64) {
                pb.set_length(total_files as u64);
            }
            pb.set_position(files_hashed as u64);
        }
    }

    fn on_hash_complete(&self, cache_hits: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Hash complete in {:.2}s ({} from cache)",
            duration_secs, cache_hits
        );
    }

    fn on_phase_start(&self, phase: &str, operations: usize) {
        let pb = ProgressBar::new(operations as u64);
        pb.set_style(bar_style(phase));
        self.set_bar(pb);
    }

    fn on_operation_done(&self, _path: &str) {
        if let Some(pb) = self.lock().as_ref() {
            pb.inc(1);
        }
    }

    fn on_phase_complete(&self, phase: &str, failures: usize) {
        self.finish_bar();
        if failures == 0 {
            eprintln!("  \x1b[32m✓\x1b[0m {} complete", phase);
        } else {
            eprintln!("  \x1b[31m✗\x1b[0m {} complete, {} failed", phase, failures);
        }
    }
}
