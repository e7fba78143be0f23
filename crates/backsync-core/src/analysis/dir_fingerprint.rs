use crate::entry::{parent_of, relative_to, FileEntry};
use ahash::{AHashMap, AHashSet};
use tracing::debug;

/// Content fingerprint of one folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderFingerprint {
    pub path: String,
    /// Sorted `relative-name:hash` lines for every file under the folder.
    pub fingerprint: String,
    pub files_count: usize,
    pub total_size: u64,
}

/// Computes fingerprints for every folder that (transitively) contains files.
///
/// Algorithm:
/// 1. Attribute every file to each of its ancestor folders, keeping the
///    file name relative to that ancestor
/// 2. Folders holding a file without a content hash are skipped: their
///    content is unknown and must not match anything
/// 3. fingerprint = sorted `name:hash` pairs joined by newlines
///
/// The scanned root (`""`) is never fingerprinted.
pub fn build_folder_fingerprints(entries: &[FileEntry]) -> Vec<FolderFingerprint> {
    let mut members: AHashMap<&str, Vec<(&str, &str, u64)>> = AHashMap::new();
    let mut unknown_content: AHashSet<&str> = AHashSet::new();

    for entry in entries.iter().filter(|e| !e.is_directory()) {
        let mut folder = entry.parent();
        while !folder.is_empty() {
            match (entry.content_hash(), relative_to(entry.name(), folder)) {
                (Some(hash), Some(relative)) => {
                    members
                        .entry(folder)
                        .or_default()
                        .push((relative, hash, entry.size()));
                }
                _ => {
                    unknown_content.insert(folder);
                }
            }
            folder = parent_of(folder);
        }
    }

    let mut fingerprints: Vec<FolderFingerprint> = members
        .into_iter()
        .filter(|(folder, _)| !unknown_content.contains(folder))
        .map(|(folder, mut files)| {
            files.sort_unstable();
            let fingerprint = files
                .iter()
                .map(|(relative, hash, _)| format!("{}:{}", relative, hash))
                .collect::<Vec<_>>()
                .join("\n");
            FolderFingerprint {
                path: folder.to_string(),
                fingerprint,
                files_count: files.len(),
                total_size: files.iter().map(|(_, _, size)| size).sum(),
            }
        })
        .collect();

    fingerprints.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(
        "Computed {} folder fingerprints ({} folders with unknown content)",
        fingerprints.len(),
        unknown_content.len()
    );
    fingerprints
}
