use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::tempdir;

use backsync_core::{
    AppConfig, ExecutionMode, ProgressReporter, SilentReporter, SyncEngine, HASH_CACHE_FILE_NAME,
};

/// Layout:
///   root/
///     folder_a/
///       unique_a.txt     ("unique content a")
///       shared.txt       ("shared content xyz")
///     folder_b/
///       unique_b.txt     ("unique content b")
///       shared.txt       ("shared content xyz")
///     photos/2020/
///       trip.jpg         (4KB of 0xAA)
///     Thumbs.db          (excluded by default)
fn create_test_tree(root: &Path) {
    let folder_a = root.join("folder_a");
    let folder_b = root.join("folder_b");
    let photos = root.join("photos").join("2020");
    fs::create_dir_all(&folder_a).unwrap();
    fs::create_dir_all(&folder_b).unwrap();
    fs::create_dir_all(&photos).unwrap();

    fs::write(folder_a.join("unique_a.txt"), "unique content a").unwrap();
    fs::write(folder_b.join("unique_b.txt"), "unique content b").unwrap();
    fs::write(folder_a.join("shared.txt"), "shared content xyz").unwrap();
    fs::write(folder_b.join("shared.txt"), "shared content xyz").unwrap();
    fs::write(photos.join("trip.jpg"), vec![0xAAu8; 4096]).unwrap();
    fs::write(root.join("Thumbs.db"), "thumbnail cache").unwrap();
}

fn engine() -> SyncEngine {
    SyncEngine::new(AppConfig {
        parallel_threads: 2,
        ..Default::default()
    })
    .unwrap()
}

#[derive(Default)]
struct CacheHits(AtomicUsize);

impl ProgressReporter for CacheHits {
    fn on_hash_complete(&self, cache_hits: usize, _duration_secs: f64) {
        self.0.store(cache_hits, Ordering::SeqCst);
    }
}

#[test]
fn test_backup_makes_an_exact_mirror() {
    let tmp = tempdir().unwrap();
    let source = tmp.path().join("source");
    let destination = tmp.path().join("backup");
    create_test_tree(&source);
    fs::create_dir_all(destination.join("stale")).unwrap();
    fs::write(destination.join("stale").join("old.txt"), "gone soon").unwrap();

    let engine = engine();
    let src = engine.load_tree(&source, true, true, &SilentReporter).unwrap();
    let dst = engine.load_tree(&destination, false, true, &SilentReporter).unwrap();
    assert!(src.entries.iter().all(|e| e.name() != "Thumbs.db"));

    let plan = engine.plan_backup(&src, &dst);
    assert_eq!(plan.summary().copy.files, 5);
    assert_eq!(plan.to_delete.len(), 2);

    let report = engine
        .execute(&plan, &source, &destination, ExecutionMode::Full, &SilentReporter)
        .unwrap();
    assert!(report.is_success(), "failures: {:?}", report.failures);

    assert_eq!(
        fs::read(destination.join("photos/2020/trip.jpg")).unwrap(),
        vec![0xAAu8; 4096]
    );
    assert!(!destination.join("stale").exists());
    assert!(!destination.join("Thumbs.db").exists());

    let src = engine.load_tree(&source, true, true, &SilentReporter).unwrap();
    let dst = engine.load_tree(&destination, true, true, &SilentReporter).unwrap();
    assert!(engine.plan_backup(&src, &dst).is_empty());
}

#[test]
fn test_renamed_folder_is_renamed_not_copied() {
    let tmp = tempdir().unwrap();
    let source = tmp.path().join("source");
    let destination = tmp.path().join("backup");
    fs::create_dir_all(source.join("Holiday 2021")).unwrap();
    fs::create_dir_all(destination.join("IMG_EXPORT")).unwrap();
    for (name, content) in [("a.jpg", "first picture"), ("b.jpg", "second picture")] {
        fs::write(source.join("Holiday 2021").join(name), content).unwrap();
        fs::write(destination.join("IMG_EXPORT").join(name), content).unwrap();
    }

    let engine = engine();
    let src = engine.load_tree(&source, true, true, &SilentReporter).unwrap();
    let dst = engine.load_tree(&destination, true, true, &SilentReporter).unwrap();
    let plan = engine.plan_backup(&src, &dst);

    assert_eq!(plan.to_rename_folders.len(), 1);
    assert_eq!(plan.to_rename_folders[0].from(), "IMG_EXPORT");
    assert_eq!(plan.to_rename_folders[0].target, "Holiday 2021");
    assert!(plan.to_add.is_empty());
    assert!(plan.to_delete.is_empty());
    assert_eq!(plan.summary().to_upload().bytes, 0);

    let report = engine
        .execute(&plan, &source, &destination, ExecutionMode::MovesOnly, &SilentReporter)
        .unwrap();
    assert_eq!(report.completed, 1);
    assert!(destination.join("Holiday 2021").join("b.jpg").exists());
    assert!(!destination.join("IMG_EXPORT").exists());

    let dst = engine.load_tree(&destination, true, true, &SilentReporter).unwrap();
    assert!(engine.plan_backup(&src, &dst).is_empty());
}

#[test]
fn test_hash_cache_is_reused_and_invalidated() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("tree");
    create_test_tree(&root);
    let engine = engine();

    let first = CacheHits::default();
    let before = engine.load_tree(&root, true, true, &first).unwrap();
    assert_eq!(first.0.load(Ordering::SeqCst), 0);
    assert!(root.join("folder_a").join(HASH_CACHE_FILE_NAME).exists());

    let second = CacheHits::default();
    let again = engine.load_tree(&root, true, true, &second).unwrap();
    assert_eq!(second.0.load(Ordering::SeqCst), 5);
    assert_eq!(before.entries, again.entries);

    fs::write(root.join("folder_a").join("unique_a.txt"), "edited, and longer now").unwrap();
    let third = CacheHits::default();
    let after = engine.load_tree(&root, true, true, &third).unwrap();
    assert_eq!(third.0.load(Ordering::SeqCst), 4);

    let hash_of = |entries: &[backsync_core::FileEntry]| {
        entries
            .iter()
            .find(|e| e.name() == "folder_a/unique_a.txt")
            .and_then(|e| e.content_hash().map(str::to_string))
    };
    assert_ne!(hash_of(&before.entries), hash_of(&after.entries));
}

#[test]
fn test_dry_run_changes_nothing_not_even_hash_caches() {
    let tmp = tempdir().unwrap();
    let source = tmp.path().join("source");
    let destination = tmp.path().join("backup");
    create_test_tree(&source);
    fs::create_dir_all(destination.join("kept")).unwrap();
    fs::write(destination.join("kept").join("old.txt"), "still here").unwrap();

    let engine = SyncEngine::new(AppConfig {
        dry_run: true,
        ..Default::default()
    })
    .unwrap();
    let src = engine.load_tree(&source, true, true, &SilentReporter).unwrap();
    let dst = engine.load_tree(&destination, true, true, &SilentReporter).unwrap();
    let plan = engine.plan_backup(&src, &dst);
    let report = engine
        .execute(&plan, &source, &destination, ExecutionMode::Full, &SilentReporter)
        .unwrap();

    assert!(report.completed > 0);
    assert_eq!(fs::read_dir(&destination).unwrap().count(), 1);
    assert_eq!(fs::read_dir(destination.join("kept")).unwrap().count(), 1);
    assert!(!source.join("folder_a").join(HASH_CACHE_FILE_NAME).exists());
}

#[test]
fn test_duplicates_and_cleanup_on_disk() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("tree");
    create_test_tree(&root);
    fs::create_dir_all(root.join("junk")).unwrap();
    fs::write(root.join("junk").join("._resource"), "fork").unwrap();

    let engine = engine();
    let tree = engine.load_tree(&root, true, true, &SilentReporter).unwrap();
    let duplicates = engine.find_duplicates(&tree);
    assert!(duplicates.folder_groups.is_empty());
    assert!(duplicates.file_groups.is_empty());
    assert_eq!(duplicates.partial_folder_groups.len(), 1);
    let folders: Vec<&str> = duplicates.partial_folder_groups[0]
        .folders
        .iter()
        .map(|f| f.path.as_str())
        .collect();
    assert_eq!(folders, vec!["folder_a", "folder_b"]);

    let unpruned = engine.load_tree(&root, true, false, &SilentReporter).unwrap();
    let cleanup = engine.plan_cleanup(&unpruned);
    let ignored: Vec<&str> = cleanup.ignored_files.iter().map(|e| e.name()).collect();
    assert_eq!(ignored, vec!["Thumbs.db", "junk/._resource"]);
    let folders: Vec<&str> = cleanup.empty_folders.iter().map(|e| e.name()).collect();
    assert_eq!(folders, vec!["junk"]);

    let report = engine
        .execute(&cleanup.into_action_plan(), &root, &root, ExecutionMode::Full, &SilentReporter)
        .unwrap();
    assert!(report.is_success());
    assert!(!root.join("junk").exists());
    assert!(!root.join("Thumbs.db").exists());
    assert!(root.join("folder_a").join(HASH_CACHE_FILE_NAME).exists());
}

#[test]
fn test_file_moves_into_folder_that_replaces_a_file() {
    let tmp = tempdir().unwrap();
    let source = tmp.path().join("source");
    let destination = tmp.path().join("backup");
    fs::create_dir_all(source.join("y")).unwrap();
    fs::write(source.join("y").join("f"), "payload").unwrap();
    fs::create_dir_all(destination.join("x")).unwrap();
    fs::write(destination.join("x").join("f"), "payload").unwrap();
    fs::write(destination.join("y"), "a plain file").unwrap();

    let engine = engine();
    let src = engine.load_tree(&source, true, true, &SilentReporter).unwrap();
    let dst = engine.load_tree(&destination, true, true, &SilentReporter).unwrap();
    let plan = engine.plan_backup(&src, &dst);
    assert_eq!(plan.to_move_files.len(), 1);

    let report = engine
        .execute(&plan, &source, &destination, ExecutionMode::Full, &SilentReporter)
        .unwrap();
    assert!(report.is_success(), "failures: {:?}", report.failures);
    assert_eq!(fs::read_to_string(destination.join("y").join("f")).unwrap(), "payload");
    assert!(!destination.join("x").exists());

    let src = engine.load_tree(&source, true, true, &SilentReporter).unwrap();
    let dst = engine.load_tree(&destination, true, true, &SilentReporter).unwrap();
    assert!(engine.plan_backup(&src, &dst).is_empty());
}
