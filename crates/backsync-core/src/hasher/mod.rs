pub mod blake3;
pub mod cache;

pub use self::blake3::hash_file;
pub use cache::{HashCache, HASH_CACHE_FILE_NAME};

use crate::entry::{base_name, parent_of, FileEntry};
use crate::progress::ProgressReporter;
use crate::scanner::ScannedItem;
use ahash::{AHashMap, AHashSet};
use rayon::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, warn};

/// How [`hash_items`] uses the per-folder hash sidecars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Off,
    /// Lookups only; no sidecar is created or updated (dry runs).
    ReadOnly,
    ReadWrite,
}

impl CacheMode {
    pub fn new(use_cache: bool, dry_run: bool) -> Self {
        match (use_cache, dry_run) {
            (false, _) => CacheMode::Off,
            (true, true) => CacheMode::ReadOnly,
            (true, false) => CacheMode::ReadWrite,
        }
    }
}

/// Turns scanned items into complete entries, hashing every readable file.
///
/// Work is split per folder so each folder's hash cache is read and written
/// by one thread only. Files that cannot be read get a read error instead
/// of a hash. The result is sorted by name.
pub fn hash_items(
    items: Vec<ScannedItem>,
    root: &Path,
    cache_mode: CacheMode,
    reporter: &dyn ProgressReporter,
) -> Vec<FileEntry> {
    let start = Instant::now();
    let mut entries: Vec<FileEntry> = Vec::with_capacity(items.len());
    let mut by_folder: AHashMap<String, Vec<ScannedItem>> = AHashMap::new();

    for item in items {
        if item.is_directory || item.read_error.is_some() {
            entries.push(item.into_builder().build());
        } else {
            by_folder
                .entry(parent_of(&item.name).to_string())
                .or_default()
                .push(item);
        }
    }

    let total: usize = by_folder.values().map(Vec::len).sum();
    reporter.on_hash_start(total);
    let hashed = AtomicUsize::new(0);
    let cache_hits = AtomicUsize::new(0);

    let folders: Vec<(String, Vec<ScannedItem>)> = by_folder.into_iter().collect();
    let hashed_entries: Vec<FileEntry> = folders
        .into_par_iter()
        .flat_map_iter(|(folder, files)| {
            let folder_path = root.join(&folder);
            let mut cache = (cache_mode != CacheMode::Off).then(|| HashCache::load(&folder_path));
            let names: AHashSet<String> = files.iter().map(|f| base_name(&f.name).to_string()).collect();

            let folder_entries: Vec<FileEntry> = files
                .into_iter()
                .map(|item| {
                    let name = base_name(&item.name).to_string();
                    let (size, created, modified) =
                        (item.size, item.creation_time, item.last_modified_time);
                    let cached = cache
                        .as_ref()
                        .and_then(|c| c.lookup(&name, size, created, modified))
                        .map(str::to_string);

                    let builder = match cached {
                        Some(hash) => {
                            cache_hits.fetch_add(1, Ordering::Relaxed);
                            item.into_builder().content_hash(hash)
                        }
                        None => match hash_file(&folder_path.join(&name)) {
                            Ok(hash) => {
                                if let Some(cache) = cache.as_mut() {
                                    cache.store(&name, size, created, modified, &hash);
                                }
                                item.into_builder().content_hash(hash)
                            }
                            Err(err) => {
                                warn!("Cannot hash '{}': {}", item.name, err);
                                item.into_builder().read_error(err.to_string())
                            }
                        },
                    };

                    let done = hashed.fetch_add(1, Ordering::Relaxed) + 1;
                    reporter.on_hash_progress(done, total);
                    builder.build()
                })
                .collect();

            if let Some(cache) = cache.as_mut().filter(|_| cache_mode == CacheMode::ReadWrite) {
                let present: AHashSet<&str> = names.iter().map(String::as_str).collect();
                cache.retain_names(&present);
                if let Err(err) = cache.save() {
                    warn!("Cannot save hash cache in '{}': {}", folder_path.display(), err);
                }
            }
            folder_entries
        })
        .collect();

    entries.extend(hashed_entries);
    entries.sort_by(|a, b| a.name().cmp(b.name()));

    let hits = cache_hits.load(Ordering::Relaxed);
    debug!(
        "Hashed {} files in {:.2}s ({} from cache)",
        total,
        start.elapsed().as_secs_f64(),
        hits
    );
    reporter.on_hash_complete(hits, start.elapsed().as_secs_f64());
    entries
}
