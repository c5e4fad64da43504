use image::{Rgba, RgbaImage};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;
use thumbcache::cache::icon::ICON_INDEX_FILE;
use thumbcache::cache::{CacheConfig, IconCache, IconEvent, IconItem, ICON_CACHE_VERSION, ICON_SCALES};
use thumbcache::media::DirectoryIconTheme;

const WAIT: Duration = Duration::from_secs(10);

fn fast_config() -> CacheConfig {
    CacheConfig {
        idle_interval: Duration::from_millis(5),
        ..CacheConfig::default()
    }
}

/// `<root>/hicolor/32x32/places/<name>.png` for each name.
fn theme(root: &Path, names: &[&str]) -> DirectoryIconTheme {
    let dir = root.join("hicolor").join("32x32").join("places");
    fs::create_dir_all(&dir).unwrap();
    for name in names {
        RgbaImage::from_pixel(32, 32, Rgba([20, 120, 220, 255]))
            .save(dir.join(format!("{name}.png")))
            .unwrap();
    }
    DirectoryIconTheme::new(vec![root.to_path_buf()], "hicolor", "hicolor")
}

fn next_icon(cache: &IconCache) -> IconItem {
    loop {
        match cache.events().recv_timeout(WAIT).expect("no icon event") {
            IconEvent::Fetched(item) => return item,
            IconEvent::UpdateRequested => continue,
        }
    }
}

#[test]
fn test_fetch_and_reopen() {
    let cache_dir = tempdir().unwrap();
    let icons = tempdir().unwrap();

    {
        let cache = IconCache::open(
            cache_dir.path(),
            Box::new(theme(icons.path(), &["folder"])),
            &fast_config(),
        );
        assert!(cache.is_valid());
        assert!(cache.process("folder", 48));

        let item = next_icon(&cache);
        assert_eq!(item.key.name, "folder");
        assert_eq!(item.image.dimensions(), (48, 48));
        assert!(cache.contains("folder", 48));
    }

    // The theme is gone; the icon still comes from disk.
    let empty = tempdir().unwrap();
    let cache = IconCache::open(
        cache_dir.path(),
        Box::new(DirectoryIconTheme::new(vec![empty.path().to_path_buf()], "hicolor", "hicolor")),
        &fast_config(),
    );
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.read("folder", 48).map(|i| i.dimensions()), Some((48, 48)));
    assert!(cache.process("folder", 48));
    assert_eq!(next_icon(&cache).image.dimensions(), (48, 48));
}

#[test]
fn test_unknown_icon_produces_no_event() {
    let cache_dir = tempdir().unwrap();
    let icons = tempdir().unwrap();
    let cache = IconCache::open(
        cache_dir.path(),
        Box::new(theme(icons.path(), &["folder"])),
        &fast_config(),
    );

    assert!(cache.process("no-such-icon", 16));
    assert!(cache
        .events()
        .recv_timeout(Duration::from_millis(300))
        .is_err());
    assert_eq!(cache.pending(), 0);
    assert!(cache.is_empty());
}

#[test]
fn test_request_update_then_prefetch() {
    let cache_dir = tempdir().unwrap();
    let icons = tempdir().unwrap();
    let cache = IconCache::open(
        cache_dir.path(),
        Box::new(theme(icons.path(), &["folder", "user-home"])),
        &fast_config(),
    );

    cache.request_update();
    let event = cache.events().recv_timeout(WAIT).unwrap();
    assert!(matches!(event, IconEvent::UpdateRequested));

    let queued = cache.prefetch_all();
    assert_eq!(queued, 2 * ICON_SCALES.len());
    let mut fetched: Vec<(String, u32)> = (0..queued)
        .map(|_| {
            let item = next_icon(&cache);
            assert_eq!(item.image.dimensions(), (item.key.scale, item.key.scale));
            (item.key.name, item.key.scale)
        })
        .collect();
    fetched.sort();
    fetched.dedup();
    assert_eq!(fetched.len(), queued);
    assert_eq!(cache.len(), queued);

    // One-shot: no second update notification.
    assert!(cache
        .events()
        .recv_timeout(Duration::from_millis(200))
        .is_err());
}

#[test]
fn test_version_mismatch_invalidates_icon_cache() {
    let cache_dir = tempdir().unwrap();
    fs::write(cache_dir.path().join(ICON_INDEX_FILE), [ICON_CACHE_VERSION + 1]).unwrap();
    let icons = tempdir().unwrap();

    let cache = IconCache::open(
        cache_dir.path(),
        Box::new(theme(icons.path(), &["folder"])),
        &fast_config(),
    );
    assert!(!cache.is_valid());
    assert!(!cache.process("folder", 32));
    cache.request_update();
    assert!(cache
        .events()
        .recv_timeout(Duration::from_millis(200))
        .is_err());
}
