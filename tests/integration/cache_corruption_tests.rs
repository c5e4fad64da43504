use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;
use thumbcache::cache::content::{DATA_FILE, INDEX_FILE};
use thumbcache::cache::{
    CacheConfig, CacheError, ContentCache, ContentKey, ContentStore, DataEntry,
    CONTENT_CACHE_VERSION, INDEX_ENTRY_LEN,
};

fn fast_config() -> CacheConfig {
    CacheConfig {
        idle_interval: Duration::from_millis(5),
        ..CacheConfig::default()
    }
}

/// Store one text entry through the full pipeline and return its key.
fn populate(cache_dir: &Path, file: &Path) -> ContentKey {
    fs::write(file, "cached text").unwrap();
    let cache = ContentCache::open(cache_dir, &fast_config());
    cache.process(file);
    cache
        .finished()
        .recv_timeout(Duration::from_secs(10))
        .unwrap()
        .key
        .unwrap()
}

#[test]
fn test_truncated_index_invalidates_cache() {
    let cache_dir = tempdir().unwrap();
    let files = tempdir().unwrap();
    populate(cache_dir.path(), &files.path().join("a.txt"));

    let index = cache_dir.path().join(INDEX_FILE);
    let mut raw = fs::read(&index).unwrap();
    raw.truncate(raw.len() - 3);
    fs::write(&index, raw).unwrap();

    assert!(matches!(
        ContentStore::open(cache_dir.path()),
        Err(CacheError::Truncated(_))
    ));
    let cache = ContentCache::open(cache_dir.path(), &fast_config());
    assert!(!cache.is_valid());
}

#[test]
fn test_lost_data_is_ignored_on_open() {
    let cache_dir = tempdir().unwrap();
    let files = tempdir().unwrap();
    let key = populate(cache_dir.path(), &files.path().join("a.txt"));

    fs::write(cache_dir.path().join(DATA_FILE), b"").unwrap();

    let cache = ContentCache::open(cache_dir.path(), &fast_config());
    assert!(cache.is_valid());
    assert!(!cache.contains(&key));
    assert!(cache.is_empty());
}

#[test]
fn test_garbage_payload_is_extracted_again() {
    let cache_dir = tempdir().unwrap();
    let files = tempdir().unwrap();
    let file = files.path().join("a.txt");
    let key = populate(cache_dir.path(), &file);

    let data = cache_dir.path().join(DATA_FILE);
    let len = fs::metadata(&data).unwrap().len() as usize;
    fs::write(&data, vec![0xff; len]).unwrap();

    let cache = ContentCache::open(cache_dir.path(), &fast_config());
    assert!(cache.contains(&key));
    assert_eq!(cache.read(&key), None);

    cache.process(&file);
    let finished = cache
        .finished()
        .recv_timeout(Duration::from_secs(10))
        .unwrap();
    assert_eq!(finished.key, Some(key));
    assert_eq!(finished.entry, DataEntry::with_mime("text/plain"));

    // The existing record is kept; nothing new is appended.
    drop(cache);
    assert_eq!(
        fs::metadata(cache_dir.path().join(INDEX_FILE)).unwrap().len(),
        1 + INDEX_ENTRY_LEN
    );
}

#[test]
fn test_empty_index_file_is_initialized() {
    let cache_dir = tempdir().unwrap();
    fs::write(cache_dir.path().join(INDEX_FILE), b"").unwrap();

    let store = ContentStore::open(cache_dir.path()).unwrap();
    assert!(store.is_empty());
    assert_eq!(
        fs::read(cache_dir.path().join(INDEX_FILE)).unwrap(),
        vec![CONTENT_CACHE_VERSION]
    );
}

#[cfg(unix)]
#[test]
fn test_unwritable_directory_invalidates_cache() {
    use std::os::unix::fs::PermissionsExt;

    let root = tempdir().unwrap();
    let locked = root.path().join("locked");
    fs::create_dir(&locked).unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o500)).unwrap();

    // Root ignores permission bits; nothing to check there.
    if fs::write(locked.join("probe"), b"x").is_ok() {
        return;
    }

    let cache = ContentCache::open(locked.join("cache"), &fast_config());
    assert!(!cache.is_valid());

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o700)).unwrap();
}
