use backsync_core::analysis::sync_plan::ActionStats;
use backsync_core::{
    ActionPlan, CleanupPlan, DuplicatesResult, DuplicatesSummary, ExecutionMode, ExecutionReport,
    FileEntry, MovePair, PlanSummary, StaleDuplicatesPlan,
};
use colored::*;
use indicatif::HumanBytes;
use std::io::{self, Write};

fn print_entries(title: &str, entries: &[FileEntry]) {
    if entries.is_empty() {
        return;
    }
    println!("\n{} ({}):", title.bold(), entries.len());
    let width = entries.len().to_string().len();
    for (i, entry) in entries.iter().enumerate() {
        if entry.is_directory() {
            println!("{:>width$}. [FOLDER] {}", i + 1, entry.name(), width = width);
        } else {
            println!(
                "{:>width$}. [FILE]   {} ({})",
                i + 1,
                entry.name(),
                HumanBytes(entry.size()),
                width = width
            );
        }
    }
}

fn print_moves(title: &str, pairs: &[MovePair], renamed: bool) {
    if pairs.is_empty() {
        return;
    }
    println!("\n{} ({}):", title.bold(), pairs.len());
    let width = pairs.len().to_string().len();
    let mut sorted: Vec<&MovePair> = pairs.iter().collect();
    sorted.sort_by(|a, b| a.target.cmp(&b.target));
    for (i, pair) in sorted.iter().enumerate() {
        let marker = if renamed { "(renamed) ".yellow().to_string() } else { String::new() };
        println!(
            "{:>width$}. {}{}  --->  {}",
            i + 1,
            marker,
            pair.from(),
            pair.target,
            width = width
        );
    }
}

pub fn print_plan(plan: &ActionPlan, no_overriding: bool, no_deletion: bool) {
    print_entries("To Copy", &plan.to_add);
    if !no_overriding {
        print_entries("To Override", &plan.to_override);
    }
    print_moves("To Move", &plan.to_move_files, false);
    print_moves("To Rename", &plan.to_rename_files, true);
    print_moves("Folders to Move", &plan.to_move_folders, false);
    print_moves("Folders to Rename", &plan.to_rename_folders, true);
    if !no_deletion {
        print_entries("To Delete", &plan.to_delete);
    }

    if no_overriding && !plan.to_override.is_empty() {
        println!(
            "{}",
            "WARNING: no-overriding is set, the overriding phase will be skipped.".yellow()
        );
    }
    if no_deletion && !plan.to_delete.is_empty() {
        println!(
            "{}",
            "WARNING: no-deletion is set, the deletion phase will be skipped.".yellow()
        );
    }
}

/// Renders the per-action table printed before confirmation.
pub fn format_plan_summary(summary: &PlanSummary) -> String {
    let rows: [(&str, ActionStats); 6] = [
        ("Copy", summary.copy),
        ("Override", summary.overwrite),
        ("To upload", summary.to_upload()),
        ("Move", summary.moves),
        ("Rename", summary.renames),
        ("To Delete", summary.delete),
    ];
    let line = "-".repeat(58);
    let row = |(action, stats): &(&str, ActionStats)| {
        format!(
            "| {:<10}| {:>13} | {:>11} | {:>12} |",
            action,
            stats.folders,
            stats.files,
            HumanBytes(stats.bytes).to_string()
        )
    };

    let mut out = Vec::new();
    out.push(line.clone());
    out.push(format!(
        "| {:<10}| {:>13} | {:>11} | {:>12} |",
        "Action", "Folders count", "Files count", "Total Size"
    ));
    out.push(line.clone());
    out.push(row(&rows[0]));
    out.push(row(&rows[1]));
    out.push(line.clone());
    out.push(row(&rows[2]));
    out.push(line.clone());
    out.push(row(&rows[3]));
    out.push(row(&rows[4]));
    out.push(line.clone());
    out.push(row(&rows[5]));
    out.push(line);
    out.join("\n")
}

pub fn print_plan_summary(summary: &PlanSummary) {
    println!("\n{}", "Summary:".bold());
    println!("{}", format_plan_summary(summary));
}

pub fn print_unreadable<'a>(entries: impl IntoIterator<Item = &'a FileEntry>) {
    let entries: Vec<&FileEntry> = entries.into_iter().collect();
    if entries.is_empty() {
        return;
    }
    println!("\n{}", "EXCLUDED FILES (due to read errors):".yellow().bold());
    for entry in entries {
        println!(
            "- {}: {}",
            entry.name(),
            entry.read_error().unwrap_or("unknown error")
        );
    }
}

pub fn print_execution_report(report: &ExecutionReport) {
    println!("\n{}", "Final Result:".bold());
    println!("Successfully processed: {}", report.completed.to_string().green());
    if report.skipped > 0 {
        println!("Skipped:                {}", report.skipped.to_string().yellow());
    }
    let failed = report.failures.len().to_string();
    println!(
        "Errors:                 {}",
        if report.failures.is_empty() { failed.green() } else { failed.red() }
    );
    if !report.failures.is_empty() {
        println!("\nDetailed errors:");
        for failure in &report.failures {
            println!("- {} '{}': {}", failure.operation, failure.path, failure.error);
        }
    }
}

pub fn print_duplicates(result: &DuplicatesResult) {
    if result.is_empty() {
        println!("{}", "No duplicate files or folders found!".green());
        return;
    }

    if !result.folder_groups.is_empty() {
        println!("\n{}", "DUPLICATE FOLDERS".bold());
        println!("{}", "-".repeat(40));
        for (index, group) in result.folder_groups.iter().enumerate() {
            println!("Folder Duplicate Group #{}", index + 1);
            println!("  Files in folder: {}", group.files_count);
            println!("  Total folder size: {}", HumanBytes(group.total_size));
            println!("  Number of copies: {}", group.folders.len());
            println!("  Wasted space: {}", HumanBytes(group.wasted_space()).to_string().red());
            println!("  Folders:");
            for folder in &group.folders {
                println!("    - {}", folder);
            }
            println!();
        }
    }

    if !result.partial_folder_groups.is_empty() {
        println!("\n{}", "PARTIAL DUPLICATE FOLDERS".bold());
        println!("{}", "-".repeat(40));
        for (index, group) in result.partial_folder_groups.iter().enumerate() {
            println!("Partial Folder Duplicate Group #{}", index + 1);
            println!("  Unique duplicate files: {}", group.file_groups.len());
            println!(
                "  Total duplicate files size: {}",
                HumanBytes(group.total_duplicate_files_size())
            );
            println!("  Wasted space: {}", HumanBytes(group.wasted_space()).to_string().red());
            println!("  Folders:");
            for folder in &group.folders {
                let marker = if folder.is_original_candidate {
                    " [ORIGINAL candidate]".green().to_string()
                } else if folder.is_full_duplicate {
                    " [ALL DUPLICATES]".yellow().to_string()
                } else {
                    String::new()
                };
                println!(
                    "    - {} (contains {} of {} files as duplicates, {}){}",
                    folder.path,
                    folder.duplicate_files_count,
                    folder.total_files_count,
                    HumanBytes(folder.duplicate_files_size),
                    marker
                );
            }
            println!();
        }
    }

    if !result.file_groups.is_empty() {
        println!("\n{}", "DUPLICATE FILES".bold());
        println!("{}", "-".repeat(40));
        for (index, group) in result.file_groups.iter().enumerate() {
            println!("File Duplicate Group #{}", index + 1);
            println!("  Hash: {}", group.hash);
            println!("  File size: {}", HumanBytes(group.size));
            println!("  Number of copies: {}", group.files.len());
            println!("  Wasted space: {}", HumanBytes(group.wasted_space()).to_string().red());
            println!("  Files:");
            for file in &group.files {
                println!("    - {}", file.name());
            }
            println!();
        }
    }
}

pub fn print_duplicates_summary(summary: &DuplicatesSummary) {
    println!("{}", "=".repeat(80));
    println!("{}", "SUMMARY".bold());
    println!("{}", "=".repeat(80));
    println!("Total duplicate folder groups: {}", summary.total_folder_groups);
    println!(
        "Total partial duplicate folder groups: {}",
        summary.total_partial_folder_groups
    );
    println!("Total duplicate file groups: {}", summary.total_groups);
    println!("Total redundant file copies: {}", summary.total_duplicate_files);
    println!(
        "Total wasted space: {}",
        HumanBytes(summary.total_wasted_space).to_string().red()
    );
    if let Some(largest) = &summary.largest_group {
        println!("\nLargest duplicate file group:");
        println!("  Hash: {}", largest.hash);
        println!("  Copies: {}", largest.files.len());
        println!("  Wasted space: {}", HumanBytes(largest.wasted_space()));
    }
    println!("{}", "=".repeat(80));
}

pub fn print_cleanup_plan(plan: &CleanupPlan) {
    if !plan.ignored_files.is_empty() {
        println!(
            "\nIgnored files to delete ({}, total size: {}):",
            plan.ignored_files.len(),
            HumanBytes(plan.ignored_bytes())
        );
        for file in &plan.ignored_files {
            println!("  [FILE]   {}", file.name());
        }
    }
    if !plan.empty_folders.is_empty() {
        println!("\nEmpty folders to delete ({}):", plan.empty_folders.len());
        for folder in &plan.empty_folders {
            println!("  [FOLDER] {}", folder.name());
        }
    }
}

pub fn print_stale_plan(plan: &StaleDuplicatesPlan) {
    println!("\n{}", "PLAN OF ACTIONS (to be deleted from SOURCE):".bold());
    println!("{}", "-".repeat(80));
    let mut items: Vec<&FileEntry> = plan.files.iter().chain(&plan.folders).collect();
    items.sort_by(|a, b| a.name().cmp(b.name()));
    for item in &items {
        if item.is_directory() {
            println!("  [FOLDER] {}", item.name());
        } else {
            println!("  [FILE]   {} ({})", item.name(), HumanBytes(item.size()));
        }
    }
    println!("{}", "-".repeat(80));
    println!("Total items to delete: {}", items.len());
    println!("Total size to free: {}", HumanBytes(plan.freed_bytes()));
    println!("{}", "-".repeat(80));
}

pub fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(default.unwrap_or(false));
        }

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}

/// Maps an answer to the backup prompt. `None` means cancel.
pub fn parse_backup_answer(answer: &str) -> Option<ExecutionMode> {
    match answer.trim() {
        "Y" | "y" => Some(ExecutionMode::Full),
        "M" | "m" => Some(ExecutionMode::MovesOnly),
        _ => None,
    }
}

/// Asks `Continue (Y/N/m)?`; `m` runs only moves and renames.
pub fn prompt_backup_mode(has_moves: bool) -> io::Result<Option<ExecutionMode>> {
    if has_moves {
        println!(
            "{}",
            "Moving/renaming actions detected. Type 'm' to run only them (no copying or deleting)."
                .yellow()
        );
    }
    print!("Continue (Y/N/m)?> ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(parse_backup_answer(&input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backup_answer() {
        assert_eq!(parse_backup_answer("y\n"), Some(ExecutionMode::Full));
        assert_eq!(parse_backup_answer("Y"), Some(ExecutionMode::Full));
        assert_eq!(parse_backup_answer("m"), Some(ExecutionMode::MovesOnly));
        assert_eq!(parse_backup_answer("n"), None);
        assert_eq!(parse_backup_answer(""), None);
        assert_eq!(parse_backup_answer("yes"), None);
    }

    #[test]
    fn test_plan_summary_table() {
        let summary = PlanSummary {
            copy: ActionStats {
                folders: 2,
                files: 10,
                bytes: 2048,
            },
            delete: ActionStats {
                folders: 1,
                files: 3,
                bytes: 0,
            },
            ..Default::default()
        };
        let table = format_plan_summary(&summary);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 13);
        assert!(lines[1].contains("Folders count"));
        assert!(lines[3].starts_with("| Copy"));
        assert!(lines[3].contains("2.00 KiB"));
        assert!(lines[6].starts_with("| To upload"));
        assert!(lines[11].starts_with("| To Delete"));
        let widths: Vec<usize> = lines.iter().map(|l| l.chars().count()).collect();
        assert!(widths.iter().all(|w| *w == widths[0]));
    }
}
