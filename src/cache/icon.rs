//! Theme icon cache.
//!
//! Icons are keyed by name and edge length and stored in `icons.index` +
//! `icons.data`. A single fetch thread serves requests newest first: hits
//! are read back from disk, misses go through the [`IconResolver`] and are
//! persisted before being reported.
//!
//! One mutex covers the index map, both files, the pending requests and the
//! update flag. It is released while the resolver runs, since a theme
//! lookup can walk a lot of directories.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use image::RgbaImage;

use super::entry::{is_null, IconBlob, IconIndexEntry, IconItem, IconKey, ICON_SCALES};
use super::files::CacheFiles;
use super::{CacheConfig, CacheResult};
use crate::media::IconResolver;
use crate::signal::ShutdownHandler;

/// Format version written at the start of `icons.index`.
pub const ICON_CACHE_VERSION: u8 = 1;

/// Index file name.
pub const ICON_INDEX_FILE: &str = "icons.index";

/// Data file name.
pub const ICON_DATA_FILE: &str = "icons.data";

/// Durable [`IconKey`] → bitmap mapping.
#[derive(Debug)]
pub struct IconStore {
    files: CacheFiles,
    index: HashMap<IconKey, i64>,
}

impl IconStore {
    /// Open or create the store in `dir`, replaying the index.
    pub fn open(dir: &Path) -> CacheResult<Self> {
        let mut files = CacheFiles::open(dir, ICON_INDEX_FILE, ICON_DATA_FILE, ICON_CACHE_VERSION)?;
        let data_len = files.data_len()?;

        let mut index = HashMap::new();
        for record in files.replay::<IconIndexEntry>()? {
            if record.offset < 0 || record.offset as u64 >= data_len {
                log::warn!("Ignoring dangling icon record for {:?}", record.key);
                continue;
            }
            index.insert(record.key, record.offset);
        }
        log::debug!("Opened icon cache in {} ({} icons)", dir.display(), index.len());

        Ok(Self { files, index })
    }

    /// Whether `key` is indexed.
    #[must_use]
    pub fn contains(&self, key: &IconKey) -> bool {
        self.index.contains_key(key)
    }

    /// Number of indexed icons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Read the bitmap stored for `key`.
    pub fn read(&mut self, key: &IconKey) -> CacheResult<Option<RgbaImage>> {
        match self.index.get(key).copied() {
            Some(offset) => Ok(Some(self.files.read::<IconBlob>(offset)?.0)),
            None => Ok(None),
        }
    }

    /// Persist `image` under `key`.
    ///
    /// Returns `false` without writing for null images and keys already stored.
    pub fn persist(&mut self, key: &IconKey, image: &RgbaImage) -> CacheResult<bool> {
        if is_null(image) || self.contains(key) {
            return Ok(false);
        }
        let offset = self.files.append(&IconBlob(image.clone()), |offset| IconIndexEntry {
            key: key.clone(),
            offset,
        })?;
        self.index.insert(key.clone(), offset);
        Ok(true)
    }
}

/// Notification emitted by the fetch thread.
#[derive(Debug, Clone)]
pub enum IconEvent {
    /// A requested icon is available.
    Fetched(IconItem),
    /// [`IconCache::request_update`] was called; callers should request
    /// their icons again.
    UpdateRequested,
}

struct IconState {
    store: IconStore,
    pending: Vec<IconKey>,
    /// A popped request has not been reported or dropped yet.
    in_flight: bool,
    update_requested: bool,
}

struct Shared {
    state: Mutex<IconState>,
    resolver: Arc<dyn IconResolver>,
}

impl Shared {
    fn new(store: IconStore, resolver: Arc<dyn IconResolver>) -> Self {
        Self {
            state: Mutex::new(IconState {
                store,
                pending: Vec::new(),
                in_flight: false,
                update_requested: false,
            }),
            resolver,
        }
    }

    fn lock(&self) -> MutexGuard<'_, IconState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Body of the fetch thread.
struct IconFetcher {
    shared: Arc<Shared>,
    events: Sender<IconEvent>,
}

impl IconFetcher {
    fn run(self, shutdown: ShutdownHandler, idle: Duration) {
        log::debug!("thumbcache-icons: started");
        while !shutdown.is_shutdown_requested() {
            if !self.step() {
                thread::sleep(idle);
            }
        }
        log::debug!("thumbcache-icons: stopped");
    }

    /// Handle the update flag or one pending request.
    ///
    /// Returns `false` when there was nothing to do.
    fn step(&self) -> bool {
        let key = {
            let mut state = self.shared.lock();
            if state.update_requested {
                state.update_requested = false;
                drop(state);
                self.emit(IconEvent::UpdateRequested);
                return true;
            }
            let Some(key) = state.pending.pop() else {
                return false;
            };
            state.in_flight = true;
            match state.store.read(&key) {
                Ok(Some(image)) => {
                    drop(state);
                    self.emit(IconEvent::Fetched(IconItem { key, image }));
                    self.done();
                    return true;
                }
                Ok(None) => {}
                Err(e) => log::warn!("Cannot read cached icon {:?}: {}", key, e),
            }
            key
        };

        let Some(image) = self.shared.resolver.resolve(&key.name, key.scale) else {
            log::debug!("Icon {} not found at {}px", key.name, key.scale);
            self.done();
            return true;
        };

        if let Err(e) = self.shared.lock().store.persist(&key, &image) {
            log::warn!("Cannot persist icon {:?}: {}", key, e);
        }
        self.emit(IconEvent::Fetched(IconItem { key, image }));
        self.done();
        true
    }

    /// Cleared after the event is sent, so a caller seeing no pending work
    /// can rely on every result being in the channel.
    fn done(&self) {
        self.shared.lock().in_flight = false;
    }

    fn emit(&self, event: IconEvent) {
        if self.events.send(event).is_err() {
            log::trace!("No receiver for icon event");
        }
    }
}

/// Asynchronous icon cache with its fetch thread.
pub struct IconCache {
    dir: PathBuf,
    shared: Option<Arc<Shared>>,
    shutdown: ShutdownHandler,
    handle: Option<JoinHandle<()>>,
    events: Receiver<IconEvent>,
}

impl IconCache {
    /// Open the cache in `dir` and start the fetch thread.
    ///
    /// Never fails: on setup errors the cache is returned invalid.
    pub fn open(dir: impl Into<PathBuf>, resolver: Box<dyn IconResolver>, config: &CacheConfig) -> Self {
        let dir = dir.into();
        let (events_tx, events) = unbounded();
        let mut cache = Self {
            dir,
            shared: None,
            shutdown: ShutdownHandler::new(),
            handle: None,
            events,
        };

        let store = match IconStore::open(&cache.dir) {
            Ok(store) => store,
            Err(e) => {
                log::error!("Icon cache in {} is unusable: {}", cache.dir.display(), e);
                return cache;
            }
        };

        let shared = Arc::new(Shared::new(store, Arc::from(resolver)));
        let fetcher = IconFetcher {
            shared: Arc::clone(&shared),
            events: events_tx,
        };
        let shutdown = cache.shutdown.clone();
        let idle = config.idle_interval;
        match thread::Builder::new()
            .name("thumbcache-icons".to_string())
            .spawn(move || fetcher.run(shutdown, idle))
        {
            Ok(handle) => {
                cache.handle = Some(handle);
                cache.shared = Some(shared);
            }
            Err(e) => log::error!("Cannot start icon fetch thread: {}", e),
        }
        cache
    }

    /// Whether setup succeeded.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.shared.is_some()
    }

    /// The cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Request the icon `name` at `scale`.
    ///
    /// Returns `false` for an invalid cache or scale, and when the request
    /// equals the most recent pending one.
    pub fn process(&self, name: &str, scale: u32) -> bool {
        let (Some(shared), Some(key)) = (&self.shared, IconKey::new(name, scale)) else {
            return false;
        };
        let mut state = shared.lock();
        if state.pending.last() == Some(&key) {
            return false;
        }
        log::trace!("Icon request {} at {}px", key.name, key.scale);
        state.pending.push(key);
        true
    }

    /// Drop pending requests and emit [`IconEvent::UpdateRequested`] once.
    pub fn request_update(&self) {
        if let Some(shared) = &self.shared {
            let mut state = shared.lock();
            state.pending.clear();
            state.update_requested = true;
        }
    }

    /// Request every icon of the theme at every scale.
    ///
    /// Returns the number of requests queued.
    pub fn prefetch_all(&self) -> usize {
        let Some(shared) = &self.shared else {
            return 0;
        };
        let names = shared.resolver.icon_names();
        let mut state = shared.lock();
        let before = state.pending.len();
        // Pushed in reverse so the first name at the largest scale is served first.
        for name in names.iter().rev() {
            for &scale in ICON_SCALES.iter().rev() {
                state.pending.push(IconKey {
                    name: name.clone(),
                    scale,
                });
            }
        }
        state.pending.len() - before
    }

    /// Fetch and update notifications.
    #[must_use]
    pub fn events(&self) -> &Receiver<IconEvent> {
        &self.events
    }

    /// Read a stored icon without going through the fetch thread.
    #[must_use]
    pub fn read(&self, name: &str, scale: u32) -> Option<RgbaImage> {
        let shared = self.shared.as_ref()?;
        let key = IconKey::new(name, scale)?;
        match shared.lock().store.read(&key) {
            Ok(image) => image,
            Err(e) => {
                log::warn!("Cannot read cached icon {:?}: {}", key, e);
                None
            }
        }
    }

    /// Whether the icon `name` at `scale` is stored.
    #[must_use]
    pub fn contains(&self, name: &str, scale: u32) -> bool {
        match (&self.shared, IconKey::new(name, scale)) {
            (Some(shared), Some(key)) => shared.lock().store.contains(&key),
            _ => false,
        }
    }

    /// Number of stored icons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.as_ref().map_or(0, |shared| shared.lock().store.len())
    }

    /// Whether no icon is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of requests not yet served, including the one being fetched.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.as_ref().map_or(0, |shared| {
            let state = shared.lock();
            state.pending.len() + usize::from(state.in_flight)
        })
    }
}

impl Drop for IconCache {
    fn drop(&mut self) {
        self.shutdown.request_shutdown();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Icon fetch thread panicked");
            }
        }
    }
}
