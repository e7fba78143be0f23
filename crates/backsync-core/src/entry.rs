use std::hash::{Hash, Hasher};

/// Size reported for every directory entry.
///
/// Directories carry a small non-zero size so that size-based logic can tell
/// an empty folder apart from a zero-byte file.
pub const DIRECTORY_SIZE: u64 = 10;

pub const PATH_SEPARATOR: char = '/';

/// One node (file or directory) of a tree snapshot.
///
/// `name` is relative to the scanned root and uses `/` as separator; the
/// empty string denotes the root itself.
///
/// Equality and hashing only consider `(name, is_directory, size, content_hash)`.
/// Timestamps exist for the hash cache and the read error for reporting; two
/// scans of the same bytes must compare equal whatever the backend reports
/// for them.
#[derive(Debug, Clone)]
pub struct FileEntry {
    name: String,
    is_directory: bool,
    size: u64,
    content_hash: Option<String>,
    creation_time: Option<i64>,
    last_modified_time: Option<i64>,
    read_error: Option<String>,
}

impl FileEntry {
    pub fn directory(name: impl Into<String>) -> Self {
        FileEntryBuilder::directory(name).build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn content_hash(&self) -> Option<&str> {
        self.content_hash.as_deref()
    }

    pub fn creation_time(&self) -> Option<i64> {
        self.creation_time
    }

    pub fn last_modified_time(&self) -> Option<i64> {
        self.last_modified_time
    }

    pub fn read_error(&self) -> Option<&str> {
        self.read_error.as_deref()
    }

    pub fn is_readable(&self) -> bool {
        self.read_error.is_none()
    }

    /// A regular file with a known content hash.
    pub fn is_hashed_file(&self) -> bool {
        !self.is_directory && self.content_hash.is_some()
    }

    pub fn base_name(&self) -> &str {
        base_name(&self.name)
    }

    pub fn parent(&self) -> &str {
        parent_of(&self.name)
    }

    pub fn depth(&self) -> usize {
        depth(&self.name)
    }

    /// True if the entry lies strictly inside `folder` (at any depth).
    pub fn is_under(&self, folder: &str) -> bool {
        is_under(&self.name, folder)
    }
}

impl PartialEq for FileEntry {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.is_directory == other.is_directory
            && self.size == other.size
            && self.content_hash == other.content_hash
    }
}

impl Eq for FileEntry {}

impl Hash for FileEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.is_directory.hash(state);
        self.size.hash(state);
        self.content_hash.hash(state);
    }
}

/// Two-phase constructor for [`FileEntry`].
///
/// The scanner collects metadata first and the hasher attaches the content
/// hash (or the failure) afterwards; the entry only exists once everything is
/// known.
#[derive(Debug, Clone)]
pub struct FileEntryBuilder {
    entry: FileEntry,
}

impl FileEntryBuilder {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            entry: FileEntry {
                name: name.into(),
                is_directory: false,
                size,
                content_hash: None,
                creation_time: None,
                last_modified_time: None,
                read_error: None,
            },
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            entry: FileEntry {
                name: name.into(),
                is_directory: true,
                size: DIRECTORY_SIZE,
                content_hash: None,
                creation_time: None,
                last_modified_time: None,
                read_error: None,
            },
        }
    }

    pub fn content_hash(mut self, hash: impl Into<String>) -> Self {
        self.entry.content_hash = Some(hash.into());
        self
    }

    pub fn creation_time(mut self, millis: i64) -> Self {
        self.entry.creation_time = Some(millis);
        self
    }

    pub fn last_modified_time(mut self, millis: i64) -> Self {
        self.entry.last_modified_time = Some(millis);
        self
    }

    pub fn read_error(mut self, error: impl Into<String>) -> Self {
        self.entry.read_error = Some(error.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.entry.name
    }

    pub fn size(&self) -> u64 {
        self.entry.size
    }

    pub fn is_directory(&self) -> bool {
        self.entry.is_directory
    }

    pub fn timestamps(&self) -> (Option<i64>, Option<i64>) {
        (self.entry.creation_time, self.entry.last_modified_time)
    }

    pub fn build(self) -> FileEntry {
        self.entry
    }
}

/// Last path segment of a relative name.
pub fn base_name(name: &str) -> &str {
    match name.rfind(PATH_SEPARATOR) {
        Some(i) => &name[i + 1..],
        None => name,
    }
}

/// Parent folder of a relative name; `""` for top-level entries.
pub fn parent_of(name: &str) -> &str {
    match name.rfind(PATH_SEPARATOR) {
        Some(i) => &name[..i],
        None => "",
    }
}

/// Number of separators in the relative name.
pub fn depth(name: &str) -> usize {
    name.matches(PATH_SEPARATOR).count()
}

/// True if `name` is strictly inside `folder`. Everything is inside the root.
pub fn is_under(name: &str, folder: &str) -> bool {
    if folder.is_empty() {
        return !name.is_empty();
    }
    name.len() > folder.len()
        && name.starts_with(folder)
        && name[folder.len()..].starts_with(PATH_SEPARATOR)
}

/// `name` relative to `folder`, if it lies inside it.
pub fn relative_to<'a>(name: &'a str, folder: &str) -> Option<&'a str> {
    if !is_under(name, folder) {
        return None;
    }
    if folder.is_empty() {
        Some(name)
    } else {
        Some(&name[folder.len() + 1..])
    }
}

/// Joins a folder and a relative name, treating `""` as the root.
pub fn join(folder: &str, relative: &str) -> String {
    if folder.is_empty() {
        relative.to_string()
    } else {
        format!("{}{}{}", folder, PATH_SEPARATOR, relative)
    }
}
