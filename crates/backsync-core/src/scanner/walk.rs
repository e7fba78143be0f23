use crate::entry::{FileEntryBuilder, DIRECTORY_SIZE, PATH_SEPARATOR};
use crate::error::Error;
use crate::exclusion::ExclusionMatcher;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Metadata of one entry found under a scanned root, before hashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedItem {
    /// Relative to the root, `/`-separated.
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    pub creation_time: Option<i64>,
    pub last_modified_time: Option<i64>,
    pub read_error: Option<String>,
}

impl ScannedItem {
    /// Starts the entry this item describes; the hasher completes it.
    pub fn into_builder(self) -> FileEntryBuilder {
        let mut builder = if self.is_directory {
            FileEntryBuilder::directory(self.name)
        } else {
            FileEntryBuilder::file(self.name, self.size)
        };
        if let Some(created) = self.creation_time {
            builder = builder.creation_time(created);
        }
        if let Some(modified) = self.last_modified_time {
            builder = builder.last_modified_time(modified);
        }
        if let Some(error) = self.read_error {
            builder = builder.read_error(error);
        }
        builder
    }
}

fn millis(time: io::Result<SystemTime>) -> Option<i64> {
    time.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
}

/// Relative `/`-separated name of `path` under `root`.
pub fn relative_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let separator = PATH_SEPARATOR.to_string();
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join(separator.as_str())
}

fn to_item(root: &Path, entry: &DirEntry) -> ScannedItem {
    let name = relative_name(root, entry.path());
    match entry.metadata() {
        Ok(metadata) => ScannedItem {
            name,
            is_directory: metadata.is_dir(),
            size: if metadata.is_dir() {
                DIRECTORY_SIZE
            } else {
                metadata.len()
            },
            creation_time: millis(metadata.created()),
            last_modified_time: millis(metadata.modified()),
            read_error: None,
        },
        Err(err) => {
            warn!("Cannot read metadata of '{}': {}", entry.path().display(), err);
            ScannedItem {
                name,
                is_directory: entry.file_type().is_dir(),
                size: 0,
                creation_time: None,
                last_modified_time: None,
                read_error: Some(err.to_string()),
            }
        }
    }
}

/// Lists every entry under `root` (the root itself excluded).
///
/// Excluded names prune their whole subtree and symlinks are skipped. A
/// missing root is an error only when `required`. A folder that cannot be
/// listed keeps its entry with a read error so that nothing beneath it is
/// taken for deleted.
pub fn scan_tree(
    root: &Path,
    exclusions: Option<&ExclusionMatcher>,
    required: bool,
) -> Result<Vec<ScannedItem>, Error> {
    if !root.is_dir() {
        if required {
            return Err(Error::RootNotFound(root.to_path_buf()));
        }
        warn!("Root '{}' does not exist, treating it as empty", root.display());
        return Ok(Vec::new());
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match exclusions {
            Some(matcher) => !matcher.is_path_excluded(&relative_name(root, entry.path())),
            None => true,
        });

    let mut items: Vec<ScannedItem> = Vec::new();
    for result in walker {
        match result {
            Ok(entry) => {
                if entry.path_is_symlink() {
                    debug!("Skipping symlink '{}'", entry.path().display());
                    continue;
                }
                items.push(to_item(root, &entry));
            }
            Err(err) => {
                let Some(path) = err.path().map(PathBuf::from) else {
                    return Err(err.into());
                };
                if err.io_error().map(io::Error::kind) != Some(io::ErrorKind::PermissionDenied) {
                    return Err(err.into());
                }
                warn!("Access denied reading '{}': {}", path.display(), err);
                let name = relative_name(root, &path);
                match items.iter_mut().rev().find(|item| item.name == name) {
                    Some(item) => item.read_error = Some(err.to_string()),
                    None if !name.is_empty() => items.push(ScannedItem {
                        name,
                        is_directory: path.is_dir(),
                        size: 0,
                        creation_time: None,
                        last_modified_time: None,
                        read_error: Some(err.to_string()),
                    }),
                    None => return Err(err.into()),
                }
            }
        }
    }

    debug!("Scanned {} entries under '{}'", items.len(), root.display());
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_lists_relative_names_without_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/b/file.txt"), b"hello").unwrap();
        fs::write(dir.path().join("top.txt"), b"x").unwrap();

        let items = scan_tree(dir.path(), None, true).unwrap();
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a", "a/b", "a/b/file.txt", "top.txt"]);

        let file = items.iter().find(|i| i.name == "a/b/file.txt").unwrap();
        assert!(!file.is_directory);
        assert_eq!(file.size, 5);
        assert!(file.last_modified_time.is_some());

        let folder = items.iter().find(|i| i.name == "a").unwrap();
        assert!(folder.is_directory);
        assert_eq!(folder.size, DIRECTORY_SIZE);
    }

    #[test]
    fn test_excluded_names_prune_subtrees() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("keep")).unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::write(dir.path().join("node_modules/pkg/index.js"), b"x").unwrap();
        fs::write(dir.path().join("keep/._meta"), b"x").unwrap();
        fs::write(dir.path().join("keep/photo.jpg"), b"x").unwrap();

        let matcher = ExclusionMatcher::new(["node_modules", "._*"]).unwrap();
        let items = scan_tree(dir.path(), Some(&matcher), true).unwrap();
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["keep", "keep/photo.jpg"]);
    }

    #[test]
    fn test_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            scan_tree(&missing, None, true),
            Err(Error::RootNotFound(_))
        ));
        assert!(scan_tree(&missing, None, false).unwrap().is_empty());
    }

    #[test]
    fn test_into_builder_keeps_metadata() {
        let item = ScannedItem {
            name: "a/b.txt".to_string(),
            is_directory: false,
            size: 3,
            creation_time: Some(1),
            last_modified_time: Some(2),
            read_error: None,
        };
        let entry = item.into_builder().content_hash("h").build();
        assert_eq!(entry.name(), "a/b.txt");
        assert_eq!(entry.size(), 3);
        assert_eq!(entry.last_modified_time(), Some(2));
        assert_eq!(entry.content_hash(), Some("h"));
    }
}
