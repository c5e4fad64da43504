use image::{Rgb, RgbImage, Rgba, RgbaImage};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;
use thumbcache::cache::content::{DATA_FILE, INDEX_FILE};
use thumbcache::cache::{
    CacheConfig, ContentCache, ContentKey, DataEntry, Finished, CONTENT_CACHE_VERSION,
    INDEX_ENTRY_LEN,
};

const WAIT: Duration = Duration::from_secs(10);

fn fast_config() -> CacheConfig {
    CacheConfig {
        idle_interval: Duration::from_millis(5),
        ..CacheConfig::default()
    }
}

fn next(cache: &ContentCache) -> Finished {
    cache
        .finished()
        .recv_timeout(WAIT)
        .expect("no finished notification")
}

fn write_jpeg(path: &Path, width: u32, height: u32) {
    RgbImage::from_pixel(width, height, Rgb([200, 40, 40]))
        .save(path)
        .unwrap();
}

fn index_len(dir: &Path) -> u64 {
    fs::metadata(dir.join(INDEX_FILE)).unwrap().len()
}

#[test]
fn test_photo_scenario() {
    let cache_dir = tempdir().unwrap();
    let files = tempdir().unwrap();
    let photo = files.path().join("photo.jpg");
    write_jpeg(&photo, 200, 120);

    {
        let cache = ContentCache::open(cache_dir.path(), &fast_config());
        assert!(cache.is_valid());
        cache.process(&photo);

        let finished = next(&cache);
        assert_eq!(finished.path, photo);
        assert_eq!(finished.entry.mime_type, "image/jpeg");
        assert_eq!(
            finished.entry.thumbnail_sizes(),
            vec![(64, 64), (48, 48), (32, 32), (16, 16)]
        );
        let key = finished.key.expect("photo should be hashed");
        assert_eq!(key.size, fs::metadata(&photo).unwrap().len() as i64);
        assert!(cache.contains(&key));
        assert_eq!(cache.len(), 1);
    }

    assert_eq!(index_len(cache_dir.path()), 1 + INDEX_ENTRY_LEN);
    assert_eq!(fs::read(cache_dir.path().join(INDEX_FILE)).unwrap()[0], CONTENT_CACHE_VERSION);
}

#[test]
fn test_back_to_back_requests_store_one_record() {
    let cache_dir = tempdir().unwrap();
    let files = tempdir().unwrap();
    let photo = files.path().join("photo.jpg");
    write_jpeg(&photo, 64, 64);

    let cache = ContentCache::open(cache_dir.path(), &fast_config());
    cache.process(&photo);
    cache.process(&photo);

    let first = next(&cache);
    let second = next(&cache);
    assert_eq!(first.key, second.key);
    assert_eq!(first.entry, second.entry);
    assert_eq!(cache.len(), 1);
    drop(cache);

    assert_eq!(index_len(cache_dir.path()), 1 + INDEX_ENTRY_LEN);
}

#[test]
fn test_identical_content_shares_one_entry() {
    let cache_dir = tempdir().unwrap();
    let files = tempdir().unwrap();
    let a = files.path().join("a.txt");
    let b = files.path().join("b.txt");
    fs::write(&a, "same words").unwrap();
    fs::write(&b, "same words").unwrap();

    let cache = ContentCache::open(cache_dir.path(), &fast_config());
    cache.process_all([&a, &b]);

    let mut finished = vec![next(&cache), next(&cache)];
    finished.sort_by(|x, y| x.path.cmp(&y.path));
    assert_eq!(finished[0].path, a);
    assert_eq!(finished[1].path, b);
    assert_eq!(finished[0].key, finished[1].key);
    assert_eq!(finished[0].entry.mime_type, "text/plain");
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_reopen_serves_from_disk() {
    let cache_dir = tempdir().unwrap();
    let files = tempdir().unwrap();
    let photo = files.path().join("photo.jpg");
    write_jpeg(&photo, 90, 90);

    let (key, entry) = {
        let cache = ContentCache::open(cache_dir.path(), &fast_config());
        cache.process(&photo);
        let finished = next(&cache);
        (finished.key.unwrap(), finished.entry)
    };
    let stored = index_len(cache_dir.path());

    let cache = ContentCache::open(cache_dir.path(), &fast_config());
    assert!(cache.is_valid());
    assert_eq!(cache.read(&key), Some(entry.clone()));

    cache.process(&photo);
    let finished = next(&cache);
    assert_eq!(finished.entry, entry);
    drop(cache);
    assert_eq!(index_len(cache_dir.path()), stored);
}

#[test]
fn test_insert_is_idempotent() {
    let cache_dir = tempdir().unwrap();
    let cache = ContentCache::open(cache_dir.path(), &fast_config());
    let key = ContentKey::new(0x1234, 42);
    let entry = DataEntry {
        mime_type: "image/png".to_string(),
        thumbnails: vec![RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]))],
    };

    assert!(cache.insert(key, &entry));
    assert!(!cache.insert(key, &DataEntry::with_mime("image/gif")));
    assert_eq!(cache.read(&key), Some(entry));
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_version_mismatch_invalidates_cache() {
    let cache_dir = tempdir().unwrap();
    fs::write(cache_dir.path().join(INDEX_FILE), [CONTENT_CACHE_VERSION + 1]).unwrap();
    let files = tempdir().unwrap();
    let text = files.path().join("a.txt");
    fs::write(&text, "hello").unwrap();

    let cache = ContentCache::open(cache_dir.path(), &fast_config());
    assert!(!cache.is_valid());
    cache.process(&text);
    assert!(cache
        .finished()
        .recv_timeout(Duration::from_millis(200))
        .is_err());
    assert!(!cache.insert(ContentKey::new(1, 1), &DataEntry::with_mime("text/plain")));

    // The foreign file is left alone.
    assert_eq!(
        fs::read(cache_dir.path().join(INDEX_FILE)).unwrap(),
        vec![CONTENT_CACHE_VERSION + 1]
    );
}

#[test]
fn test_file_over_cap_is_not_hashed_or_stored() {
    let cache_dir = tempdir().unwrap();
    let files = tempdir().unwrap();
    // PNG content under a .txt name: sniffing would say image/png.
    let big = files.path().join("big.txt");
    RgbaImage::from_pixel(32, 32, Rgba([0, 0, 0, 255]))
        .save_with_format(&big, image::ImageFormat::Png)
        .unwrap();
    let size = fs::metadata(&big).unwrap().len();

    let config = CacheConfig {
        max_hash_size: size - 1,
        ..fast_config()
    };
    let cache = ContentCache::open(cache_dir.path(), &config);
    cache.process(&big);

    let finished = next(&cache);
    assert_eq!(finished.key, None);
    assert_eq!(finished.entry.mime_type, "text/plain");
    assert!(finished.entry.thumbnails.is_empty());
    assert!(cache.is_empty());
    drop(cache);
    assert_eq!(fs::metadata(cache_dir.path().join(DATA_FILE)).unwrap().len(), 0);
}

#[test]
fn test_empty_file_is_reported_but_not_stored() {
    let cache_dir = tempdir().unwrap();
    let files = tempdir().unwrap();
    let empty = files.path().join("empty.txt");
    fs::write(&empty, b"").unwrap();

    let cache = ContentCache::open(cache_dir.path(), &fast_config());
    cache.process(&empty);

    let finished = next(&cache);
    assert_eq!(finished.key, None);
    assert_eq!(finished.entry.mime_type, "text/plain");
    assert!(cache.is_empty());
}

#[test]
fn test_missing_file_is_dropped() {
    let cache_dir = tempdir().unwrap();
    let files = tempdir().unwrap();
    let real = files.path().join("real.txt");
    fs::write(&real, "content").unwrap();

    let cache = ContentCache::open(cache_dir.path(), &fast_config());
    cache.process(files.path().join("missing.txt"));
    cache.process(&real);

    let finished = next(&cache);
    assert_eq!(finished.path, real);
    assert!(cache
        .finished()
        .recv_timeout(Duration::from_millis(200))
        .is_err());
    assert!(cache.is_valid());
    assert_eq!(cache.pending(), 0);
}

/// Poll until the cache has nothing in flight.
fn wait_idle(cache: &ContentCache) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cache.pending() == 0 {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn test_pending_counts_until_notified() {
    let cache_dir = tempdir().unwrap();
    let files = tempdir().unwrap();
    let paths: Vec<_> = (0..3)
        .map(|i| {
            let path = files.path().join(format!("{}.txt", i));
            fs::write(&path, format!("text {}", i)).unwrap();
            path
        })
        .collect();

    let cache = ContentCache::open(cache_dir.path(), &fast_config());
    cache.process_all(paths.clone());
    assert!(cache.pending() <= 3);
    assert!(wait_idle(&cache));
    assert_eq!(cache.finished().try_iter().count(), 3);
}

#[test]
fn test_missing_file_settles_pending() {
    let cache_dir = tempdir().unwrap();
    let files = tempdir().unwrap();

    let cache = ContentCache::open(cache_dir.path(), &fast_config());
    cache.process(files.path().join("missing.txt"));
    assert!(wait_idle(&cache));
    assert!(cache.finished().try_recv().is_err());
}

#[cfg(unix)]
#[test]
fn test_unreadable_file_settles_pending() {
    use std::os::unix::fs::PermissionsExt;

    let cache_dir = tempdir().unwrap();
    let files = tempdir().unwrap();
    let locked = files.path().join("locked.txt");
    fs::write(&locked, "secret").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Root reads regardless of permission bits.
    if fs::read(&locked).is_ok() {
        return;
    }

    let cache = ContentCache::open(cache_dir.path(), &fast_config());
    cache.process(&locked);
    assert!(wait_idle(&cache));
    assert!(cache.finished().try_recv().is_err());
    assert!(cache.is_empty());
}

#[test]
fn test_cache_directory_is_created() {
    let root = tempdir().unwrap();
    let nested = root.path().join("a").join("b");
    let cache = ContentCache::open(&nested, &fast_config());
    assert!(cache.is_valid());
    assert_eq!(cache.dir(), nested.as_path());
    assert!(nested.join(INDEX_FILE).exists());
    assert!(nested.join(DATA_FILE).exists());
}
