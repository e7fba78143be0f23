use super::components::connected_components;
use super::dir_fingerprint::{build_folder_fingerprints, FolderFingerprint};
use crate::entry::{depth, parent_of, FileEntry};
use ahash::{AHashMap, AHashSet};
use std::cmp::Reverse;
use std::collections::BTreeSet;
use tracing::debug;

/// Two folders are linked into a partial group as soon as they share this
/// many remaining hash groups.
pub const DEFAULT_MIN_SHARED_GROUPS: usize = 1;

/// Files with identical content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub hash: String,
    /// Sorted by name.
    pub files: Vec<FileEntry>,
    pub size: u64,
}

impl DuplicateGroup {
    pub fn wasted_space(&self) -> u64 {
        self.size * (self.files.len() as u64).saturating_sub(1)
    }
}

/// Folders whose whole trees are identical (same relative names, same content).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderDuplicateGroup {
    pub fingerprint: String,
    /// Sorted by path.
    pub folders: Vec<String>,
    pub files_count: usize,
    pub total_size: u64,
}

impl FolderDuplicateGroup {
    pub fn wasted_space(&self) -> u64 {
        self.total_size * (self.folders.len() as u64).saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialFolder {
    pub path: String,
    pub duplicate_files_count: usize,
    pub duplicate_files_size: u64,
    /// Files directly inside the folder, duplicated or not.
    pub total_files_count: usize,
    pub is_full_duplicate: bool,
    pub is_original_candidate: bool,
}

/// Folders that share some duplicate content exclusively among themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialFolderGroup {
    /// Original candidates first, then other full duplicates, then the rest.
    pub folders: Vec<PartialFolder>,
    pub file_groups: Vec<DuplicateGroup>,
}

impl PartialFolderGroup {
    pub fn total_duplicate_files_size(&self) -> u64 {
        self.file_groups
            .iter()
            .map(|g| g.size * g.files.len() as u64)
            .sum()
    }

    pub fn wasted_space(&self) -> u64 {
        self.file_groups.iter().map(DuplicateGroup::wasted_space).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicatesResult {
    pub folder_groups: Vec<FolderDuplicateGroup>,
    pub partial_folder_groups: Vec<PartialFolderGroup>,
    pub file_groups: Vec<DuplicateGroup>,
}

impl DuplicatesResult {
    pub fn is_empty(&self) -> bool {
        self.folder_groups.is_empty()
            && self.partial_folder_groups.is_empty()
            && self.file_groups.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicatesSummary {
    pub total_folder_groups: usize,
    pub total_partial_folder_groups: usize,
    pub total_groups: usize,
    /// Redundant copies in the file-level groups.
    pub total_duplicate_files: usize,
    pub total_wasted_space: u64,
    pub largest_group: Option<DuplicateGroup>,
}

impl From<&DuplicatesResult> for DuplicatesSummary {
    fn from(result: &DuplicatesResult) -> Self {
        let folder_waste: u64 = result
            .folder_groups
            .iter()
            .map(FolderDuplicateGroup::wasted_space)
            .sum();
        let partial_waste: u64 = result
            .partial_folder_groups
            .iter()
            .map(PartialFolderGroup::wasted_space)
            .sum();
        let file_waste: u64 = result
            .file_groups
            .iter()
            .map(DuplicateGroup::wasted_space)
            .sum();

        DuplicatesSummary {
            total_folder_groups: result.folder_groups.len(),
            total_partial_folder_groups: result.partial_folder_groups.len(),
            total_groups: result.file_groups.len(),
            total_duplicate_files: result
                .file_groups
                .iter()
                .map(|g| g.files.len().saturating_sub(1))
                .sum(),
            total_wasted_space: folder_waste + partial_waste + file_waste,
            // file groups are sorted by descending waste
            largest_group: result.file_groups.first().cloned(),
        }
    }
}

struct HashGroup<'a> {
    hash: &'a str,
    size: u64,
    files: Vec<&'a FileEntry>,
}

impl HashGroup<'_> {
    fn to_group<'f>(&self, files: impl IntoIterator<Item = &'f FileEntry>) -> DuplicateGroup {
        DuplicateGroup {
            hash: self.hash.to_string(),
            files: files.into_iter().cloned().collect(),
            size: self.size,
        }
    }
}

/// Classifies duplicate content in one snapshot.
///
/// Algorithm:
/// 1. Group hashed files by content hash (groups of 2+)
/// 2. Full-folder groups: folders with identical fingerprints, biggest
///    first, never nesting with an already accepted folder
/// 3. Files under full-group folders are handled
/// 4. Partial groups: connected components of folders sharing remaining
///    hash groups, kept only when no copy of their content lives elsewhere
/// 5. Whatever is left becomes file-level groups
///
/// Each file is accounted for in at most one tier.
pub fn detect(entries: &[FileEntry]) -> DuplicatesResult {
    detect_with(entries, DEFAULT_MIN_SHARED_GROUPS)
}

/// [`detect`] with a stricter link rule for partial groups: two folders must
/// share at least `min_shared_groups` hash groups (values below 1 act as 1).
pub fn detect_with(entries: &[FileEntry], min_shared_groups: usize) -> DuplicatesResult {
    let hash_groups = group_by_hash(entries);
    if hash_groups.is_empty() {
        return DuplicatesResult::default();
    }

    let folder_groups = full_folder_groups(entries);
    let full_folders: AHashSet<&str> = folder_groups
        .iter()
        .flat_map(|g| g.folders.iter().map(String::as_str))
        .collect();
    let handled: AHashSet<&str> = hash_groups
        .iter()
        .flat_map(|g| g.files.iter())
        .filter(|f| has_ancestor_in(f.name(), &full_folders))
        .map(|f| f.name())
        .collect();

    let (partial_folder_groups, covered) =
        partial_folder_groups(&hash_groups, &handled, entries, min_shared_groups.max(1));

    let mut file_groups: Vec<DuplicateGroup> = hash_groups
        .iter()
        .filter_map(|group| {
            let survivors: Vec<&FileEntry> = group
                .files
                .iter()
                .filter(|f| !handled.contains(f.name()) && !covered.contains(f.name()))
                .copied()
                .collect();
            (survivors.len() >= 2).then(|| group.to_group(survivors))
        })
        .collect();
    file_groups.sort_by(|a, b| {
        b.wasted_space()
            .cmp(&a.wasted_space())
            .then_with(|| a.hash.cmp(&b.hash))
    });

    debug!(
        "Duplicates: {} folder groups, {} partial folder groups, {} file groups",
        folder_groups.len(),
        partial_folder_groups.len(),
        file_groups.len()
    );

    DuplicatesResult {
        folder_groups,
        partial_folder_groups,
        file_groups,
    }
}

fn group_by_hash(entries: &[FileEntry]) -> Vec<HashGroup<'_>> {
    let mut by_hash: AHashMap<&str, Vec<&FileEntry>> = AHashMap::new();
    for entry in entries.iter().filter(|e| e.is_hashed_file()) {
        if let Some(hash) = entry.content_hash() {
            by_hash.entry(hash).or_default().push(entry);
        }
    }

    let mut groups: Vec<HashGroup<'_>> = by_hash
        .into_iter()
        .filter(|(_, files)| files.len() >= 2)
        .map(|(hash, mut files)| {
            files.sort_by(|a, b| a.name().cmp(b.name()));
            HashGroup {
                hash,
                size: files[0].size(),
                files,
            }
        })
        .collect();
    groups.sort_by(|a, b| a.hash.cmp(b.hash));
    groups
}

/// True if some strict ancestor folder of `name` is in `folders`.
fn has_ancestor_in(name: &str, folders: &AHashSet<&str>) -> bool {
    let mut folder = parent_of(name);
    while !folder.is_empty() {
        if folders.contains(folder) {
            return true;
        }
        folder = parent_of(folder);
    }
    false
}

fn min_depth(folders: &[&FolderFingerprint]) -> usize {
    folders.iter().map(|f| depth(&f.path)).min().unwrap_or(0)
}

fn full_folder_groups(entries: &[FileEntry]) -> Vec<FolderDuplicateGroup> {
    let fingerprints = build_folder_fingerprints(entries);

    let mut by_fingerprint: AHashMap<&str, Vec<&FolderFingerprint>> = AHashMap::new();
    for fp in &fingerprints {
        if !fp.fingerprint.is_empty() {
            by_fingerprint.entry(fp.fingerprint.as_str()).or_default().push(fp);
        }
    }

    let mut candidates: Vec<Vec<&FolderFingerprint>> = by_fingerprint
        .into_iter()
        .map(|(_, folders)| folders)
        .filter(|folders| folders.len() >= 2)
        .collect();
    for folders in &mut candidates {
        folders.sort_by(|a, b| a.path.cmp(&b.path));
    }
    candidates.sort_by(|a, b| {
        b[0].total_size
            .cmp(&a[0].total_size)
            .then_with(|| min_depth(a).cmp(&min_depth(b)))
            .then_with(|| a[0].path.cmp(&b[0].path))
    });

    let mut accepted: AHashSet<&str> = AHashSet::new();
    let mut accepted_ancestors: AHashSet<&str> = AHashSet::new();
    let mut groups = Vec::new();

    for candidate in candidates {
        let kept: Vec<&FolderFingerprint> = candidate
            .into_iter()
            .filter(|fp| {
                let path = fp.path.as_str();
                !accepted.contains(path)
                    && !accepted_ancestors.contains(path)
                    && !has_ancestor_in(path, &accepted)
            })
            .collect();
        if kept.len() < 2 {
            continue;
        }

        for fp in &kept {
            accepted.insert(fp.path.as_str());
            let mut ancestor = parent_of(&fp.path);
            while !ancestor.is_empty() {
                accepted_ancestors.insert(ancestor);
                ancestor = parent_of(ancestor);
            }
        }

        groups.push(FolderDuplicateGroup {
            fingerprint: kept[0].fingerprint.clone(),
            folders: kept.iter().map(|fp| fp.path.clone()).collect(),
            files_count: kept[0].files_count,
            total_size: kept[0].total_size,
        });
    }

    groups.sort_by(|a, b| {
        b.wasted_space()
            .cmp(&a.wasted_space())
            .then_with(|| a.folders[0].cmp(&b.folders[0]))
    });
    groups
}

/// Returns the accepted partial groups and the names of every file they
/// cover.
fn partial_folder_groups<'a>(
    hash_groups: &[HashGroup<'a>],
    handled: &AHashSet<&str>,
    entries: &'a [FileEntry],
    min_shared_groups: usize,
) -> (Vec<PartialFolderGroup>, AHashSet<&'a str>) {
    let mut folder_index: AHashMap<&'a str, usize> = AHashMap::new();
    let mut folder_names: Vec<&'a str> = Vec::new();
    let mut groups_of_folder: Vec<BTreeSet<usize>> = Vec::new();
    let mut shared: AHashMap<(usize, usize), usize> = AHashMap::new();

    for (group_id, group) in hash_groups.iter().enumerate() {
        let unhandled: Vec<&FileEntry> = group
            .files
            .iter()
            .filter(|f| !handled.contains(f.name()))
            .copied()
            .collect();
        if unhandled.len() < 2 {
            continue;
        }

        let mut folders: Vec<usize> = unhandled
            .iter()
            .map(|f| {
                let parent = f.parent();
                *folder_index.entry(parent).or_insert_with(|| {
                    folder_names.push(parent);
                    groups_of_folder.push(BTreeSet::new());
                    folder_names.len() - 1
                })
            })
            .collect();
        folders.sort_unstable();
        folders.dedup();

        for (i, &a) in folders.iter().enumerate() {
            groups_of_folder[a].insert(group_id);
            for &b in &folders[i + 1..] {
                *shared.entry((a, b)).or_default() += 1;
            }
        }
    }

    let mut edges: Vec<(usize, usize)> = shared
        .into_iter()
        .filter(|(_, count)| *count >= min_shared_groups)
        .map(|(edge, _)| edge)
        .collect();
    edges.sort_unstable();

    let mut direct_files: AHashMap<&str, usize> = AHashMap::new();
    for entry in entries.iter().filter(|e| !e.is_directory()) {
        *direct_files.entry(entry.parent()).or_default() += 1;
    }

    let mut partial_groups = Vec::new();
    let mut covered: AHashSet<&'a str> = AHashSet::new();

    for component in connected_components(folder_names.len(), &edges) {
        if component.len() < 2 {
            continue;
        }
        let members: AHashSet<&str> = component.iter().map(|&i| folder_names[i]).collect();
        let touched: BTreeSet<usize> = component
            .iter()
            .flat_map(|&i| groups_of_folder[i].iter().copied())
            .collect();

        let leaks = touched.iter().any(|&g| {
            hash_groups[g]
                .files
                .iter()
                .any(|f| !members.contains(f.parent()))
        });
        if leaks {
            debug!(
                "Partial group of {} folders rejected: content also lives outside",
                component.len()
            );
            continue;
        }

        let group = build_partial_group(&component, &folder_names, &touched, hash_groups, &direct_files);
        for &g in &touched {
            covered.extend(hash_groups[g].files.iter().map(|f| f.name()));
        }
        partial_groups.push(group);
    }

    partial_groups.sort_by(|a, b| {
        b.wasted_space()
            .cmp(&a.wasted_space())
            .then_with(|| first_path(a).cmp(first_path(b)))
    });
    (partial_groups, covered)
}

fn first_path(group: &PartialFolderGroup) -> &str {
    group
        .folders
        .iter()
        .map(|f| f.path.as_str())
        .min()
        .unwrap_or_default()
}

fn build_partial_group(
    component: &[usize],
    folder_names: &[&str],
    touched: &BTreeSet<usize>,
    hash_groups: &[HashGroup<'_>],
    direct_files: &AHashMap<&str, usize>,
) -> PartialFolderGroup {
    let mut stats: AHashMap<&str, (usize, u64, BTreeSet<&str>)> = AHashMap::new();
    for &g in touched {
        let group = &hash_groups[g];
        for file in &group.files {
            let entry = stats.entry(file.parent()).or_default();
            entry.0 += 1;
            entry.1 += file.size();
            entry.2.insert(group.hash);
        }
    }

    let empty = BTreeSet::new();
    let mut folders: Vec<(PartialFolder, &BTreeSet<&str>)> = component
        .iter()
        .map(|&i| {
            let path = folder_names[i];
            let (count, size, hashes) = stats
                .get(path)
                .map(|(c, s, h)| (*c, *s, h))
                .unwrap_or((0, 0, &empty));
            let total = direct_files.get(path).copied().unwrap_or(0);
            (
                PartialFolder {
                    path: path.to_string(),
                    duplicate_files_count: count,
                    duplicate_files_size: size,
                    total_files_count: total,
                    is_full_duplicate: count > 0 && count == total,
                    is_original_candidate: false,
                },
                hashes,
            )
        })
        .collect();

    let full: Vec<(usize, &BTreeSet<&str>)> = folders
        .iter()
        .enumerate()
        .filter(|(_, (f, _))| f.is_full_duplicate)
        .map(|(i, (_, hashes))| (i, *hashes))
        .collect();
    for &(i, hashes) in &full {
        let has_twin = full.iter().any(|&(j, other)| j != i && other == hashes);
        let is_fragment = full
            .iter()
            .any(|&(j, other)| j != i && other.len() > hashes.len() && hashes.is_subset(other));
        folders[i].0.is_original_candidate = !has_twin && !is_fragment;
    }

    let mut folders: Vec<PartialFolder> = folders.into_iter().map(|(f, _)| f).collect();
    folders.sort_by(|a, b| {
        let tier = |f: &PartialFolder| match (f.is_original_candidate, f.is_full_duplicate) {
            (true, _) => 0,
            (false, true) => 1,
            _ => 2,
        };
        (tier(a), &a.path).cmp(&(tier(b), &b.path))
    });

    let mut file_groups: Vec<DuplicateGroup> = touched
        .iter()
        .map(|&g| hash_groups[g].to_group(hash_groups[g].files.iter().copied()))
        .collect();
    file_groups.sort_by_key(|g| (Reverse(g.wasted_space()), g.hash.clone()));

    PartialFolderGroup {
        folders,
        file_groups,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::FileEntryBuilder;

    fn file(name: &str, size: u64, hash: &str) -> FileEntry {
        FileEntryBuilder::file(name, size).content_hash(hash).build()
    }

    #[test]
    fn test_no_hashed_files_gives_empty_result() {
        let entries = vec![
            FileEntry::directory("a"),
            FileEntryBuilder::file("a/x.txt", 10).read_error("denied").build(),
        ];
        assert!(detect(&entries).is_empty());
    }

    #[test]
    fn test_nested_duplicate_folders_report_outermost_only() {
        let entries = vec![
            file("a/x.txt", 10, "h1"),
            file("a/sub/y.txt", 20, "h2"),
            file("b/x.txt", 10, "h1"),
            file("b/sub/y.txt", 20, "h2"),
        ];
        let result = detect(&entries);
        assert_eq!(result.folder_groups.len(), 1);
        assert_eq!(result.folder_groups[0].folders, vec!["a", "b"]);
        assert_eq!(result.folder_groups[0].wasted_space(), 30);
        assert!(result.file_groups.is_empty());
    }

    #[test]
    fn test_original_candidate_excludes_fragments() {
        // `big` holds everything, `part` is a fragment of it, `mixed` also
        // carries unique content.
        let entries = vec![
            file("big/1.jpg", 10, "h1"),
            file("big/2.jpg", 10, "h2"),
            file("big/3.jpg", 10, "h3"),
            file("part/1.jpg", 10, "h1"),
            file("part/2.jpg", 10, "h2"),
            file("mixed/3.jpg", 10, "h3"),
            file("mixed/2.jpg", 10, "h2"),
            file("mixed/own.jpg", 10, "u1"),
        ];
        let result = detect(&entries);
        assert_eq!(result.partial_folder_groups.len(), 1);
        let group = &result.partial_folder_groups[0];
        let paths: Vec<&str> = group.folders.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["big", "part", "mixed"]);
        assert!(group.folders[0].is_original_candidate);
        assert!(group.folders[1].is_full_duplicate);
        assert!(!group.folders[1].is_original_candidate);
        assert!(!group.folders[2].is_full_duplicate);
        assert_eq!(group.folders[2].total_files_count, 3);
        assert_eq!(group.wasted_space(), 40);
        assert!(result.file_groups.is_empty());
    }

    #[test]
    fn test_exact_twins_are_not_original_candidates() {
        let entries = vec![
            file("a/1.jpg", 10, "h1"),
            file("a/2.jpg", 10, "h2"),
            file("b/one.jpg", 10, "h1"),
            file("b/two.jpg", 10, "h2"),
        ];
        let result = detect(&entries);
        assert!(result.folder_groups.is_empty());
        let group = &result.partial_folder_groups[0];
        assert!(group.folders.iter().all(|f| f.is_full_duplicate));
        assert!(group.folders.iter().all(|f| !f.is_original_candidate));
    }
}
