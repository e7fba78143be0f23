use crate::error::Error;
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Name of the per-folder sidecar holding cached content hashes.
pub const HASH_CACHE_FILE_NAME: &str = ".backsync-hashes";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CacheRecord {
    name: String,
    size: u64,
    creation_time: Option<i64>,
    last_modified_time: Option<i64>,
    hash: String,
}

/// Content hashes of the files directly inside one folder, stored as a
/// tab-separated sidecar next to them.
///
/// A cached hash is only trusted while the file keeps the same size and both
/// timestamps.
#[derive(Debug)]
pub struct HashCache {
    path: PathBuf,
    records: AHashMap<String, CacheRecord>,
    modified: bool,
}

impl HashCache {
    /// Reads the sidecar of `folder`. A missing or unreadable sidecar gives
    /// an empty cache; malformed rows are skipped.
    pub fn load(folder: &Path) -> Self {
        let path = folder.join(HASH_CACHE_FILE_NAME);
        let mut cache = HashCache {
            path,
            records: AHashMap::new(),
            modified: false,
        };

        let mut reader = match csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_path(&cache.path)
        {
            Ok(reader) => reader,
            Err(err) => {
                let not_found = matches!(
                    err.kind(),
                    csv::ErrorKind::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound
                );
                if !not_found {
                    warn!("Cannot open hash cache '{}': {}", cache.path.display(), err);
                }
                return cache;
            }
        };

        for row in reader.deserialize::<CacheRecord>() {
            match row {
                Ok(record) => {
                    cache.records.insert(record.name.clone(), record);
                }
                Err(err) => warn!("Skipping bad row in '{}': {}", cache.path.display(), err),
            }
        }
        trace!("Loaded {} cached hashes from '{}'", cache.records.len(), cache.path.display());
        cache
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn lookup(
        &self,
        name: &str,
        size: u64,
        creation_time: Option<i64>,
        last_modified_time: Option<i64>,
    ) -> Option<&str> {
        self.records
            .get(name)
            .filter(|r| {
                r.size == size
                    && r.creation_time == creation_time
                    && r.last_modified_time == last_modified_time
            })
            .map(|r| r.hash.as_str())
    }

    pub fn store(
        &mut self,
        name: &str,
        size: u64,
        creation_time: Option<i64>,
        last_modified_time: Option<i64>,
        hash: &str,
    ) {
        let record = CacheRecord {
            name: name.to_string(),
            size,
            creation_time,
            last_modified_time,
            hash: hash.to_string(),
        };
        if self.records.get(name) != Some(&record) {
            self.records.insert(record.name.clone(), record);
            self.modified = true;
        }
    }

    /// Forgets files that are gone from the folder.
    pub fn retain_names(&mut self, names: &AHashSet<&str>) {
        let before = self.records.len();
        self.records.retain(|name, _| names.contains(name.as_str()));
        if self.records.len() != before {
            self.modified = true;
        }
    }

    /// Writes the sidecar back, only if something changed.
    pub fn save(&self) -> Result<(), Error> {
        if !self.modified {
            return Ok(());
        }
        let mut records: Vec<&CacheRecord> = self.records.values().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_path(&self.path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        debug!("Saved {} hashes to '{}'", self.records.len(), self.path.display());
        Ok(())
    }
}
