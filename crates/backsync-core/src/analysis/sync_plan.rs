use crate::entry::{is_under, join, parent_of, FileEntry, PATH_SEPARATOR};
use crate::exclusion::ExclusionMatcher;
use ahash::{AHashMap, AHashSet};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::ops::Bound;
use tracing::debug;

/// A destination entry that should end up at `target` instead of being
/// deleted and uploaded again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MovePair {
    pub entry: FileEntry,
    pub target: String,
}

impl MovePair {
    pub fn from(&self) -> &str {
        self.entry.name()
    }
}

/// Result of comparing a source snapshot with a destination snapshot.
///
/// The seven collections are disjoint: a path shows up in at most one of
/// them (for pairs, both the old and the new path count). Every collection is
/// sorted by the (old) name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionPlan {
    /// Source entries missing from the destination.
    pub to_add: Vec<FileEntry>,
    /// Destination entries with no source counterpart.
    pub to_delete: Vec<FileEntry>,
    /// Source entries whose destination counterpart has different content.
    pub to_override: Vec<FileEntry>,
    pub to_move_files: Vec<MovePair>,
    pub to_rename_files: Vec<MovePair>,
    pub to_move_folders: Vec<MovePair>,
    pub to_rename_folders: Vec<MovePair>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionStats {
    pub folders: usize,
    pub files: usize,
    pub bytes: u64,
}

impl ActionStats {
    fn from_entries<'a>(entries: impl IntoIterator<Item = &'a FileEntry>) -> Self {
        let mut stats = ActionStats::default();
        for entry in entries {
            if entry.is_directory() {
                stats.folders += 1;
            } else {
                stats.files += 1;
                stats.bytes += entry.size();
            }
        }
        stats
    }

    fn from_pairs(files: &[MovePair], folders: &[MovePair]) -> Self {
        ActionStats {
            folders: folders.len(),
            files: files.len(),
            bytes: files.iter().map(|p| p.entry.size()).sum(),
        }
    }

    pub fn plus(self, other: ActionStats) -> ActionStats {
        ActionStats {
            folders: self.folders + other.folders,
            files: self.files + other.files,
            bytes: self.bytes + other.bytes,
        }
    }
}

/// Counts and sizes per action, for reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub copy: ActionStats,
    pub overwrite: ActionStats,
    pub moves: ActionStats,
    pub renames: ActionStats,
    pub delete: ActionStats,
}

impl PlanSummary {
    /// Everything that has to travel from source to destination.
    pub fn to_upload(&self) -> ActionStats {
        self.copy.plus(self.overwrite)
    }
}

impl ActionPlan {
    /// True when there is nothing at all to do. A plan made only of moves or
    /// renames is not empty.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty()
            && self.to_delete.is_empty()
            && self.to_override.is_empty()
            && !self.has_moves()
    }

    pub fn has_moves(&self) -> bool {
        !self.to_move_files.is_empty()
            || !self.to_rename_files.is_empty()
            || !self.to_move_folders.is_empty()
            || !self.to_rename_folders.is_empty()
    }

    /// Checks that no path appears in two collections.
    pub fn is_disjoint(&self) -> bool {
        let mut seen: AHashSet<&str> = AHashSet::new();
        let entries = self
            .to_add
            .iter()
            .chain(&self.to_delete)
            .chain(&self.to_override)
            .map(|e| e.name());
        let pairs = self
            .to_move_files
            .iter()
            .chain(&self.to_rename_files)
            .chain(&self.to_move_folders)
            .chain(&self.to_rename_folders)
            .flat_map(|p| [p.entry.name(), p.target.as_str()]);
        entries.chain(pairs).all(|name| seen.insert(name))
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            copy: ActionStats::from_entries(&self.to_add),
            overwrite: ActionStats::from_entries(&self.to_override),
            moves: ActionStats::from_pairs(&self.to_move_files, &self.to_move_folders),
            renames: ActionStats::from_pairs(&self.to_rename_files, &self.to_rename_folders),
            delete: ActionStats::from_entries(&self.to_delete),
        }
    }
}

/// Sort key putting nested folders before their ancestors.
pub fn deepest_first(entry: &FileEntry) -> (Reverse<usize>, &str) {
    (Reverse(entry.depth()), entry.name())
}

/// Builds the minimal action plan turning `destination` into a mirror of
/// `source`.
///
/// Algorithm:
/// 1. Source entries with a read error still claim their name (their
///    destination copy, and everything under an unlistable folder, is never
///    deleted) but are never added or overridden
/// 2. add = readable source − destination, delete = destination − source,
///    override = names on both sides whose entries differ
/// 3. Added and deleted files with the same (hash, size) are paired into
///    moves (same base name) or renames; same base name wins ties, then
///    name order
/// 4. Deleted folders, deepest first, become folder moves/renames when every
///    file under them was paired to the same relative path under an added
///    folder; the folder pair replaces the per-file pairs. Subfolders left
///    under the old folder move along, so each needs a counterpart of the
///    same kind under the new one. Excluded entries move along too; one with
///    a counterpart of different content becomes an override
///
/// `exclusions` only affects step 4: excluded entries (sidecar caches and the
/// like) never prevent a folder from counting as moved.
pub fn plan(
    source: &[FileEntry],
    destination: &[FileEntry],
    exclusions: &ExclusionMatcher,
) -> ActionPlan {
    let readable: AHashMap<&str, &FileEntry> = source
        .iter()
        .filter(|e| e.is_readable())
        .map(|e| (e.name(), e))
        .collect();
    let all_source_names: AHashSet<&str> = source.iter().map(|e| e.name()).collect();
    // Folders that could not be listed; nothing under them counts as deleted.
    let unreadable_folders: AHashSet<&str> = source
        .iter()
        .filter(|e| e.is_directory() && !e.is_readable())
        .map(|e| e.name())
        .collect();
    let destination_map: AHashMap<&str, &FileEntry> =
        destination.iter().map(|e| (e.name(), e)).collect();

    let mut to_add: BTreeMap<&str, &FileEntry> = readable
        .iter()
        .filter(|(name, _)| !destination_map.contains_key(*name))
        .map(|(name, entry)| (*name, *entry))
        .collect();
    let mut to_delete: BTreeMap<&str, &FileEntry> = destination_map
        .iter()
        .filter(|(name, _)| {
            !all_source_names.contains(*name) && !inside_any(name, &unreadable_folders)
        })
        .map(|(name, entry)| (*name, *entry))
        .collect();
    let mut to_override: BTreeMap<&str, &FileEntry> = readable
        .iter()
        .filter(|(name, src)| {
            destination_map
                .get(*name)
                .map_or(false, |dst| *dst != **src)
        })
        .map(|(name, entry)| (*name, *entry))
        .collect();

    debug!(
        "Initial comparison: {} to add, {} to delete, {} to override",
        to_add.len(),
        to_delete.len(),
        to_override.len()
    );

    let file_pairs = pair_files(&mut to_add, &mut to_delete);

    let mut dst_files: Vec<&FileEntry> = destination
        .iter()
        .filter(|e| !e.is_directory() && !excluded_below(e.name(), 0, exclusions))
        .collect();
    dst_files.sort_by(|a, b| a.name().cmp(b.name()));

    let mut delete_folders: Vec<&FileEntry> = to_delete
        .values()
        .filter(|e| e.is_directory() && !e.name().is_empty())
        .copied()
        .collect();
    delete_folders.sort_by(|a, b| deepest_first(a).cmp(&deepest_first(b)));

    let mut moves = PairCollections {
        move_files: file_pairs.moves,
        rename_files: file_pairs.renames,
        ..Default::default()
    };
    pair_folders(
        &delete_folders,
        &dst_files,
        &file_pairs.targets,
        &mut to_add,
        &mut to_delete,
        &mut to_override,
        &mut moves,
        exclusions,
    );

    let plan = ActionPlan {
        to_add: to_add.into_values().cloned().collect(),
        to_delete: to_delete.into_values().cloned().collect(),
        to_override: to_override.into_values().cloned().collect(),
        to_move_files: into_pairs(moves.move_files),
        to_rename_files: into_pairs(moves.rename_files),
        to_move_folders: into_pairs(moves.move_folders),
        to_rename_folders: into_pairs(moves.rename_folders),
    };

    debug_assert!(plan.is_disjoint(), "action plan collections overlap");
    debug!(
        "Plan: {} add, {} delete, {} override, {} file moves, {} file renames, {} folder moves, {} folder renames",
        plan.to_add.len(),
        plan.to_delete.len(),
        plan.to_override.len(),
        plan.to_move_files.len(),
        plan.to_rename_files.len(),
        plan.to_move_folders.len(),
        plan.to_rename_folders.len(),
    );
    plan
}

fn inside_any(name: &str, folders: &AHashSet<&str>) -> bool {
    if folders.is_empty() {
        return false;
    }
    let mut folder = parent_of(name);
    while !folder.is_empty() {
        if folders.contains(folder) {
            return true;
        }
        folder = parent_of(folder);
    }
    false
}

type Pairs<'a> = BTreeMap<&'a str, (&'a FileEntry, &'a str)>;

#[derive(Default)]
struct PairCollections<'a> {
    move_files: Pairs<'a>,
    rename_files: Pairs<'a>,
    move_folders: Pairs<'a>,
    rename_folders: Pairs<'a>,
}

struct FilePairs<'a> {
    moves: Pairs<'a>,
    renames: Pairs<'a>,
    /// old destination name → new name, frozen after file pairing.
    targets: AHashMap<&'a str, &'a str>,
}

fn pair_files<'a>(
    to_add: &mut BTreeMap<&'a str, &'a FileEntry>,
    to_delete: &mut BTreeMap<&'a str, &'a FileEntry>,
) -> FilePairs<'a> {
    // BTreeMap iteration keeps every candidate list in name order.
    let mut candidates: AHashMap<(&str, u64), Vec<&FileEntry>> = AHashMap::new();
    for entry in to_delete.values().filter(|e| e.is_hashed_file()) {
        if let Some(hash) = entry.content_hash() {
            candidates.entry((hash, entry.size())).or_default().push(entry);
        }
    }

    let added: Vec<&FileEntry> = to_add
        .values()
        .filter(|e| e.is_hashed_file())
        .copied()
        .collect();

    let mut pairs = FilePairs {
        moves: BTreeMap::new(),
        renames: BTreeMap::new(),
        targets: AHashMap::new(),
    };

    for src in added {
        let Some(hash) = src.content_hash() else {
            continue;
        };
        let Some(matches) = candidates.get_mut(&(hash, src.size())) else {
            continue;
        };
        if matches.is_empty() {
            continue;
        }
        let index = matches
            .iter()
            .position(|c| c.base_name() == src.base_name())
            .unwrap_or(0);
        let old = matches.remove(index);

        to_add.remove(src.name());
        to_delete.remove(old.name());
        pairs.targets.insert(old.name(), src.name());

        if old.base_name() == src.base_name() {
            pairs.moves.insert(old.name(), (old, src.name()));
        } else {
            pairs.renames.insert(old.name(), (old, src.name()));
        }
    }

    pairs
}

/// Files of the name-sorted `files` lying under `prefix` (which ends with `/`).
fn files_under<'s, 'a>(files: &'s [&'a FileEntry], prefix: &str) -> &'s [&'a FileEntry] {
    let start = files.partition_point(|f| f.name() < prefix);
    let len = files[start..]
        .iter()
        .take_while(|f| f.name().starts_with(prefix))
        .count();
    &files[start..start + len]
}

/// True when `name`, or one of its ancestors below the first `skip` bytes
/// (the moved folder and its separator), is excluded.
fn excluded_below(name: &str, skip: usize, exclusions: &ExclusionMatcher) -> bool {
    let mut current = name;
    while current.len() > skip {
        if exclusions.is_path_excluded(current) {
            return true;
        }
        current = parent_of(current);
    }
    false
}

fn pair_folders<'a>(
    delete_folders: &[&'a FileEntry],
    dst_files: &[&'a FileEntry],
    targets: &AHashMap<&'a str, &'a str>,
    to_add: &mut BTreeMap<&'a str, &'a FileEntry>,
    to_delete: &mut BTreeMap<&'a str, &'a FileEntry>,
    to_override: &mut BTreeMap<&'a str, &'a FileEntry>,
    pairs: &mut PairCollections<'a>,
    exclusions: &ExclusionMatcher,
) {
    for &folder in delete_folders {
        if !to_delete.contains_key(folder.name()) {
            continue;
        }

        let prefix = format!("{}{}", folder.name(), PATH_SEPARATOR);
        let descendants = files_under(dst_files, &prefix);
        if descendants.is_empty() {
            continue;
        }

        let direct: Vec<&FileEntry> = descendants
            .iter()
            .filter(|f| f.parent() == folder.name())
            .copied()
            .collect();
        let witnesses: &[&FileEntry] = if direct.is_empty() { descendants } else { &direct };
        if !witnesses.iter().all(|f| targets.contains_key(f.name())) {
            continue;
        }

        let first = witnesses[0];
        let Some(first_target) = targets.get(first.name()).copied() else {
            continue;
        };
        let suffix = &first.name()[prefix.len()..];
        let Some(new_folder) = first_target
            .strip_suffix(suffix)
            .and_then(|t| t.strip_suffix(PATH_SEPARATOR))
        else {
            continue;
        };

        let Some(add_folder) = to_add.get(new_folder).copied().filter(|e| e.is_directory()) else {
            continue;
        };

        let all_moved = descendants.iter().all(|f| {
            let relative = &f.name()[prefix.len()..];
            targets
                .get(f.name())
                .map_or(false, |t| *t == join(add_folder.name(), relative))
        });
        if !all_moved {
            continue;
        }

        // Whatever else is left under the old folder travels with it. Excluded
        // entries may simply ride along; anything else must already have a
        // counterpart of the same kind in the new folder.
        let mut leftovers: Vec<(&'a str, Option<&'a FileEntry>)> = Vec::new();
        let mut blocked = false;
        for (name, entry) in to_delete
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .take_while(|(name, _)| name.starts_with(prefix.as_str()))
        {
            let counterpart = join(add_folder.name(), &name[prefix.len()..]);
            match to_add.get(counterpart.as_str()) {
                Some(src) if src.is_directory() == entry.is_directory() => {
                    leftovers.push((*name, Some(*src)));
                }
                None if excluded_below(name, prefix.len(), exclusions) => {
                    leftovers.push((*name, None));
                }
                _ => {
                    blocked = true;
                    break;
                }
            }
        }
        if blocked {
            debug!(
                "Folder '{}' not paired: leftovers without counterpart in '{}'",
                folder.name(),
                add_folder.name()
            );
            continue;
        }

        debug!("Folder '{}' paired with '{}'", folder.name(), add_folder.name());

        let old_name = folder.name();
        to_delete.remove(old_name);
        to_add.remove(add_folder.name());

        pairs.move_files.retain(|name, _| !is_under(name, old_name));
        pairs.rename_files.retain(|name, _| !is_under(name, old_name));
        pairs.move_folders.retain(|name, _| !is_under(name, old_name));
        pairs.rename_folders.retain(|name, _| !is_under(name, old_name));

        for (old, src) in leftovers {
            let old_entry = to_delete.remove(old);
            let Some(src) = src else {
                continue;
            };
            to_add.remove(src.name());
            let same_content = old_entry.map_or(false, |e| {
                e.size() == src.size() && e.content_hash() == src.content_hash()
            });
            if !src.is_directory() && !same_content {
                to_override.insert(src.name(), src);
            }
        }

        if folder.base_name() == add_folder.base_name() {
            pairs.move_folders.insert(old_name, (folder, add_folder.name()));
        } else {
            pairs.rename_folders.insert(old_name, (folder, add_folder.name()));
        }
    }
}

fn into_pairs(pairs: Pairs<'_>) -> Vec<MovePair> {
    pairs
        .into_values()
        .map(|(entry, target)| MovePair {
            entry: entry.clone(),
            target: target.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::FileEntryBuilder;

    fn file(name: &str, size: u64, hash: &str) -> FileEntry {
        FileEntryBuilder::file(name, size).content_hash(hash).build()
    }

    #[test]
    fn test_files_under_uses_prefix_boundary() {
        let a = file("a/x.txt", 1, "h");
        let ab = file("ab/y.txt", 1, "h");
        let a_sub = file("a/sub/z.txt", 1, "h");
        let mut files = vec![&a, &ab, &a_sub];
        files.sort_by(|x, y| x.name().cmp(y.name()));
        let under: Vec<&str> = files_under(&files, "a/").iter().map(|f| f.name()).collect();
        assert_eq!(under, vec!["a/sub/z.txt", "a/x.txt"]);
    }

    #[test]
    fn test_deepest_first_orders_nested_before_parent() {
        let mut folders = vec![
            FileEntry::directory("a"),
            FileEntry::directory("a/b/c"),
            FileEntry::directory("a/b"),
            FileEntry::directory("z/y"),
        ];
        folders.sort_by(|a, b| deepest_first(a).cmp(&deepest_first(b)));
        let names: Vec<&str> = folders.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["a/b/c", "a/b", "z/y", "a"]);
    }

    #[test]
    fn test_summary_counts() {
        let plan = ActionPlan {
            to_add: vec![FileEntry::directory("d"), file("d/a.txt", 100, "h1")],
            to_override: vec![file("b.txt", 50, "h2")],
            to_move_files: vec![MovePair {
                entry: file("c.txt", 7, "h3"),
                target: "d/c.txt".to_string(),
            }],
            ..Default::default()
        };
        let summary = plan.summary();
        assert_eq!(summary.copy, ActionStats { folders: 1, files: 1, bytes: 100 });
        assert_eq!(summary.to_upload().bytes, 150);
        assert_eq!(summary.moves.files, 1);
        assert_eq!(summary.moves.bytes, 7);
        assert!(!plan.is_empty());
        assert!(plan.is_disjoint());
    }
}
