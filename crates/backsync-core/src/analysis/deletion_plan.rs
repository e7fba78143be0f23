use super::sync_plan::{deepest_first, ActionPlan};
use crate::entry::{parent_of, FileEntry};
use crate::exclusion::ExclusionMatcher;
use ahash::{AHashMap, AHashSet};
use tracing::info;

/// Leftovers to remove from a tree: files matching exclusion rules and
/// folders that would be empty without them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupPlan {
    /// Sorted by name.
    pub ignored_files: Vec<FileEntry>,
    /// Deepest first.
    pub empty_folders: Vec<FileEntry>,
}

impl CleanupPlan {
    pub fn is_empty(&self) -> bool {
        self.ignored_files.is_empty() && self.empty_folders.is_empty()
    }

    pub fn ignored_bytes(&self) -> u64 {
        self.ignored_files.iter().map(FileEntry::size).sum()
    }

    pub fn into_action_plan(self) -> ActionPlan {
        delete_only(self.ignored_files, self.empty_folders)
    }
}

/// Source files already present in the destination (same base name and
/// content), compacted into whole folders where possible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaleDuplicatesPlan {
    /// Files outside of any deleted folder, sorted by name.
    pub files: Vec<FileEntry>,
    /// Outermost folders only, sorted by name.
    pub folders: Vec<FileEntry>,
    freed_bytes: u64,
}

impl StaleDuplicatesPlan {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.folders.is_empty()
    }

    /// Total size of every stale file, including those removed with their
    /// folder.
    pub fn freed_bytes(&self) -> u64 {
        self.freed_bytes
    }

    pub fn into_action_plan(self) -> ActionPlan {
        delete_only(self.files, self.folders)
    }
}

fn delete_only(files: Vec<FileEntry>, folders: Vec<FileEntry>) -> ActionPlan {
    let mut to_delete = files;
    to_delete.extend(folders);
    to_delete.sort_by(|a, b| a.name().cmp(b.name()));
    ActionPlan {
        to_delete,
        ..Default::default()
    }
}

/// Marks every ancestor folder of `name` as holding something to keep.
fn keep_ancestors<'a>(name: &'a str, keep: &mut AHashSet<&'a str>) {
    let mut folder = parent_of(name);
    while !folder.is_empty() && keep.insert(folder) {
        folder = parent_of(folder);
    }
}

/// Folders that could not be listed may hold anything, so they and their
/// ancestors are never deleted.
fn keep_unreadable_folders<'a>(entries: &'a [FileEntry], keep: &mut AHashSet<&'a str>) {
    for folder in entries.iter().filter(|e| e.is_directory() && !e.is_readable()) {
        keep.insert(folder.name());
        keep_ancestors(folder.name(), keep);
    }
}

fn has_chosen_ancestor(name: &str, chosen: &AHashSet<&str>) -> bool {
    let mut folder = parent_of(name);
    while !folder.is_empty() {
        if chosen.contains(folder) {
            return true;
        }
        folder = parent_of(folder);
    }
    false
}

/// Plans the removal of excluded files and of folders containing nothing
/// but excluded files (at any depth).
///
/// `entries` must come from a scan that did not prune excluded names.
pub fn plan_cleanup(entries: &[FileEntry], exclusions: &ExclusionMatcher) -> CleanupPlan {
    let mut ignored_files = Vec::new();
    let mut keep: AHashSet<&str> = AHashSet::new();
    keep_unreadable_folders(entries, &mut keep);

    for entry in entries.iter().filter(|e| !e.is_directory()) {
        if exclusions.is_path_excluded(entry.name()) {
            ignored_files.push(entry.clone());
        } else {
            keep_ancestors(entry.name(), &mut keep);
        }
    }

    let mut empty_folders: Vec<FileEntry> = entries
        .iter()
        .filter(|e| e.is_directory() && !e.name().is_empty() && !keep.contains(e.name()))
        .cloned()
        .collect();
    empty_folders.sort_by(|a, b| deepest_first(a).cmp(&deepest_first(b)));
    ignored_files.sort_by(|a, b| a.name().cmp(b.name()));

    info!(
        "Cleanup: {} ignored files, {} empty folders",
        ignored_files.len(),
        empty_folders.len()
    );
    CleanupPlan {
        ignored_files,
        empty_folders,
    }
}

/// Plans the removal from `source` of files that already made it to
/// `destination`, possibly under another folder.
///
/// A file is stale when some destination file has the same base name and
/// content hash. Folders whose whole content is stale (or excluded) are
/// deleted as one unit and nothing beneath them is listed separately.
pub fn plan_stale_duplicates(
    source: &[FileEntry],
    destination: &[FileEntry],
    exclusions: &ExclusionMatcher,
) -> StaleDuplicatesPlan {
    let mut backed_up: AHashMap<&str, AHashSet<&str>> = AHashMap::new();
    for entry in destination.iter().filter(|e| e.is_hashed_file()) {
        if let Some(hash) = entry.content_hash() {
            backed_up.entry(entry.base_name()).or_default().insert(hash);
        }
    }

    let mut stale: Vec<&FileEntry> = Vec::new();
    let mut keep: AHashSet<&str> = AHashSet::new();
    keep_unreadable_folders(source, &mut keep);
    for entry in source.iter().filter(|e| !e.is_directory()) {
        if exclusions.is_path_excluded(entry.name()) {
            continue;
        }
        let is_stale = entry.content_hash().map_or(false, |hash| {
            backed_up
                .get(entry.base_name())
                .map_or(false, |hashes| hashes.contains(hash))
        });
        if is_stale {
            stale.push(entry);
        } else {
            keep_ancestors(entry.name(), &mut keep);
        }
    }

    let mut deletable: Vec<&FileEntry> = source
        .iter()
        .filter(|e| e.is_directory() && !e.name().is_empty() && !keep.contains(e.name()))
        .collect();
    deletable.sort_by(|a, b| a.name().cmp(b.name()));

    // A parent sorts before its children, so one pass drops the nested ones.
    let mut chosen: AHashSet<&str> = AHashSet::new();
    let mut folders: Vec<FileEntry> = Vec::new();
    for folder in deletable {
        if has_chosen_ancestor(folder.name(), &chosen) {
            continue;
        }
        chosen.insert(folder.name());
        folders.push(folder.clone());
    }

    let freed_bytes = stale.iter().map(|f| f.size()).sum();
    let mut files: Vec<FileEntry> = stale
        .into_iter()
        .filter(|f| !has_chosen_ancestor(f.name(), &chosen))
        .cloned()
        .collect();
    files.sort_by(|a, b| a.name().cmp(b.name()));

    info!(
        "Stale duplicates: {} files and {} folders to delete",
        files.len(),
        folders.len()
    );
    StaleDuplicatesPlan {
        files,
        folders,
        freed_bytes,
    }
}
