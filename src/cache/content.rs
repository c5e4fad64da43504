//! Thumbnail and mimetype cache keyed by content.
//!
//! [`ContentStore`] is the durable half: `index.cache` + `data.cache` and
//! the in-memory key → offset map replayed from the index.
//!
//! [`ContentCache`] wraps a store with the two background stages and a
//! dispatcher thread:
//!
//! ```text
//! process(path) ─► hasher ─► dispatcher ─┬─ indexed ──────────► Finished
//!                                        └─► extractor ─► persist ─► Finished
//! ```
//!
//! The dispatcher is the only thread that persists, so checking the index
//! and appending to it cannot interleave. Requests whose key is already
//! being extracted wait for that extraction instead of starting another.
//! If that extraction finds its file unreadable, the next waiting path is
//! extracted in its place.
//!
//! Every request is counted from `process` until it is either notified or
//! dropped as unreadable; [`ContentCache::pending`] reports that count.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, unbounded, Receiver, Sender};

use super::entry::{ContentKey, DataEntry, IndexEntry, WorkItem};
use super::files::CacheFiles;
use super::{CacheConfig, CacheResult};
use crate::extract::{
    spawn_extraction_worker, Extraction, ExtractionRequest, ExtractionWorker, Extractor,
};
use crate::hashing::{spawn_hashing_worker, HashOutcome, HashResult, Hasher, HashingWorker};
use crate::media::{ExecutableIconExtractor, NoExecutableIcons};
use crate::signal::ShutdownHandler;
use crate::worker::WorkQueue;

/// Format version written at the start of `index.cache`.
pub const CONTENT_CACHE_VERSION: u8 = 1;

/// Index file name.
pub const INDEX_FILE: &str = "index.cache";

/// Data file name.
pub const DATA_FILE: &str = "data.cache";

/// Durable key → [`DataEntry`] mapping.
#[derive(Debug)]
pub struct ContentStore {
    files: CacheFiles,
    index: HashMap<ContentKey, i64>,
}

impl ContentStore {
    /// Open or create the store in `dir`, replaying the index.
    ///
    /// Index records pointing past the end of the data file are ignored.
    /// When a key occurs more than once the last record wins.
    pub fn open(dir: &Path) -> CacheResult<Self> {
        let mut files = CacheFiles::open(dir, INDEX_FILE, DATA_FILE, CONTENT_CACHE_VERSION)?;
        let data_len = files.data_len()?;

        let mut index = HashMap::new();
        for record in files.replay::<IndexEntry>()? {
            if record.offset < 0 || record.offset as u64 >= data_len {
                log::warn!(
                    "Ignoring index record {:?} past the end of the data file ({} bytes)",
                    record,
                    data_len
                );
                continue;
            }
            index.insert(record.key, record.offset);
        }
        log::debug!("Opened content cache in {} ({} entries)", dir.display(), index.len());

        Ok(Self { files, index })
    }

    /// Whether `key` is indexed.
    #[must_use]
    pub fn contains(&self, key: &ContentKey) -> bool {
        self.index.contains_key(key)
    }

    /// Data file offset recorded for `key`.
    #[must_use]
    pub fn offset(&self, key: &ContentKey) -> Option<i64> {
        self.index.get(key).copied()
    }

    /// Number of indexed keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Read the entry stored for `key`.
    pub fn read(&mut self, key: &ContentKey) -> CacheResult<Option<DataEntry>> {
        match self.offset(key) {
            Some(offset) => Ok(Some(self.files.read(offset)?)),
            None => Ok(None),
        }
    }

    /// Persist `entry` under `key`.
    ///
    /// Returns `false` without writing when the key or entry is not
    /// cacheable, or when the key is already stored.
    pub fn persist(&mut self, key: ContentKey, entry: &DataEntry) -> CacheResult<bool> {
        if !key.is_cacheable() || !entry.is_cacheable() || self.contains(&key) {
            return Ok(false);
        }
        let offset = self
            .files
            .append(entry, |offset| IndexEntry { key, offset })?;
        self.index.insert(key, offset);
        Ok(true)
    }
}

/// Completion notice for one `process` request.
#[derive(Debug, Clone)]
pub struct Finished {
    /// The requested path.
    pub path: PathBuf,
    /// Content key, `None` for content that was never hashed.
    pub key: Option<ContentKey>,
    /// The cached or freshly extracted entry.
    pub entry: DataEntry,
}

/// Asynchronous content cache.
///
/// Owns the store, the hashing and extraction loops and the dispatcher
/// thread. Dropping the cache stops and joins all three threads.
pub struct ContentCache {
    dir: PathBuf,
    store: Option<Arc<Mutex<ContentStore>>>,
    hasher: Option<HashingWorker>,
    extractor: Option<ExtractionWorker>,
    dispatcher: Option<JoinHandle<()>>,
    shutdown: ShutdownHandler,
    outstanding: Arc<AtomicUsize>,
    finished: Receiver<Finished>,
}

impl ContentCache {
    /// Open the cache in `dir` without an executable icon source.
    pub fn open(dir: impl Into<PathBuf>, config: &CacheConfig) -> Self {
        Self::open_with(dir, config, Box::new(NoExecutableIcons))
    }

    /// Open the cache in `dir` and start its threads.
    ///
    /// Never fails: on setup errors the cache is returned invalid.
    pub fn open_with(
        dir: impl Into<PathBuf>,
        config: &CacheConfig,
        icons: Box<dyn ExecutableIconExtractor>,
    ) -> Self {
        let dir = dir.into();
        let (finished_tx, finished) = unbounded();
        let mut cache = Self {
            dir,
            store: None,
            hasher: None,
            extractor: None,
            dispatcher: None,
            shutdown: ShutdownHandler::new(),
            outstanding: Arc::new(AtomicUsize::new(0)),
            finished,
        };

        let store = match ContentStore::open(&cache.dir) {
            Ok(store) => Arc::new(Mutex::new(store)),
            Err(e) => {
                log::error!("Content cache in {} is unusable: {}", cache.dir.display(), e);
                return cache;
            }
        };

        if let Err(e) = cache.start(Arc::clone(&store), config, icons, finished_tx) {
            log::error!("Cannot start content cache workers: {}", e);
            cache.stop();
            return cache;
        }
        cache.store = Some(store);
        cache
    }

    fn start(
        &mut self,
        store: Arc<Mutex<ContentStore>>,
        config: &CacheConfig,
        icons: Box<dyn ExecutableIconExtractor>,
        finished: Sender<Finished>,
    ) -> std::io::Result<()> {
        let (hash_tx, hash_rx) = unbounded();
        let (item_tx, item_rx) = unbounded();

        let hasher = spawn_hashing_worker(
            Hasher::new(config.max_hash_size),
            hash_tx,
            config.idle_interval,
        )?;
        self.hasher = Some(hasher);

        let extractor = spawn_extraction_worker(
            Extractor::new(config.max_hash_size, config.jumbo_icons, icons),
            item_tx,
            config.idle_interval,
        )?;
        let dispatcher = Dispatcher {
            store,
            extraction: Arc::clone(extractor.queue()),
            waiting: HashMap::new(),
            outstanding: Arc::clone(&self.outstanding),
            finished,
        };
        self.extractor = Some(extractor);

        let shutdown = self.shutdown.clone();
        let idle = config.idle_interval;
        let handle = thread::Builder::new()
            .name("thumbcache-dispatcher".to_string())
            .spawn(move || dispatcher.run(hash_rx, item_rx, shutdown, idle))?;
        self.dispatcher = Some(handle);
        Ok(())
    }

    /// Whether setup succeeded.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.store.is_some()
    }

    /// The cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Request processing of one path.
    pub fn process(&self, path: impl Into<PathBuf>) {
        if let (Some(_), Some(hasher)) = (&self.store, &self.hasher) {
            self.outstanding.fetch_add(1, Ordering::SeqCst);
            hasher.enqueue(path.into());
        }
    }

    /// Request processing of several paths; the first one is served first.
    pub fn process_all<I, P>(&self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        if let (Some(_), Some(hasher)) = (&self.store, &self.hasher) {
            let mut batch: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
            batch.reverse();
            self.outstanding.fetch_add(batch.len(), Ordering::SeqCst);
            hasher.enqueue_all(batch);
        }
    }

    /// Number of requests neither notified nor dropped yet.
    ///
    /// A request leaves the count after its [`Finished`] notice was sent, so
    /// once this reads zero every notice is already in [`Self::finished`].
    #[must_use]
    pub fn pending(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Completion notices, one per finished request.
    #[must_use]
    pub fn finished(&self) -> &Receiver<Finished> {
        &self.finished
    }

    /// Whether `key` is stored.
    #[must_use]
    pub fn contains(&self, key: &ContentKey) -> bool {
        self.store
            .as_ref()
            .is_some_and(|store| lock(store).contains(key))
    }

    /// Read the entry stored for `key`.
    #[must_use]
    pub fn read(&self, key: &ContentKey) -> Option<DataEntry> {
        let store = self.store.as_ref()?;
        match lock(store).read(key) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Cannot read cached entry {:?}: {}", key, e);
                None
            }
        }
    }

    /// Persist `entry` under `key` synchronously.
    ///
    /// Returns whether a new record was written.
    pub fn insert(&self, key: ContentKey, entry: &DataEntry) -> bool {
        let Some(store) = self.store.as_ref() else {
            return false;
        };
        match lock(store).persist(key, entry) {
            Ok(written) => written,
            Err(e) => {
                log::warn!("Cannot persist entry {:?}: {}", key, e);
                false
            }
        }
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.as_ref().map_or(0, |store| lock(store).len())
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stop(&mut self) {
        self.shutdown.request_shutdown();
        if let Some(handle) = self.dispatcher.take() {
            if handle.join().is_err() {
                log::error!("Content cache dispatcher panicked");
            }
        }
        if let Some(mut hasher) = self.hasher.take() {
            hasher.join();
        }
        if let Some(mut extractor) = self.extractor.take() {
            extractor.join();
        }
    }
}

impl Drop for ContentCache {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock(store: &Mutex<ContentStore>) -> MutexGuard<'_, ContentStore> {
    store.lock().unwrap_or_else(|e| e.into_inner())
}

/// Routes hash results and extraction results; sole writer of the store.
struct Dispatcher {
    store: Arc<Mutex<ContentStore>>,
    extraction: Arc<WorkQueue<ExtractionRequest>>,
    /// Keys being extracted, with the extra paths waiting on them.
    waiting: HashMap<ContentKey, Vec<PathBuf>>,
    /// Requests accepted by `process` and not yet settled.
    outstanding: Arc<AtomicUsize>,
    finished: Sender<Finished>,
}

impl Dispatcher {
    fn run(
        mut self,
        hashes: Receiver<HashOutcome>,
        items: Receiver<Extraction>,
        shutdown: ShutdownHandler,
        idle: Duration,
    ) {
        log::debug!("thumbcache-dispatcher: started");
        let mut connected = true;
        while connected && !shutdown.is_shutdown_requested() {
            select! {
                recv(hashes) -> msg => match msg {
                    Ok(HashOutcome::Hashed(result)) => self.on_hashed(result),
                    Ok(HashOutcome::Unreadable(path)) => self.drop_request(&path),
                    Err(_) => connected = false,
                },
                recv(items) -> msg => match msg {
                    Ok(Extraction::Done(item)) => self.on_extracted(item),
                    Ok(Extraction::Unreadable(request)) => self.on_unreadable(request),
                    Err(_) => connected = false,
                },
                default(idle) => {}
            }
        }
        log::debug!("thumbcache-dispatcher: stopped");
    }

    fn on_hashed(&mut self, result: HashResult) {
        let HashResult { path, key } = result;
        let Some(key) = key.filter(ContentKey::is_cacheable) else {
            self.extraction.push(ExtractionRequest { key: None, path });
            return;
        };

        let cached = lock(&self.store).read(&key);
        match cached {
            Ok(Some(entry)) => {
                log::trace!("Cache hit for {}", path.display());
                self.notify(path, Some(key), entry);
                return;
            }
            Ok(None) => {}
            // Unreadable payload: extract again, persist will keep the old record.
            Err(e) => log::warn!("Cannot read cached entry for {}: {}", path.display(), e),
        }

        if let Some(waiters) = self.waiting.get_mut(&key) {
            waiters.push(path);
            return;
        }
        self.waiting.insert(key, Vec::new());
        self.extraction.push(ExtractionRequest {
            key: Some(key),
            path,
        });
    }

    fn on_extracted(&mut self, item: WorkItem) {
        let WorkItem { key, path, entry } = item;
        let mut paths = vec![path];

        if let Some(key) = key {
            match lock(&self.store).persist(key, &entry) {
                Ok(true) => log::trace!("Persisted {:?}", key),
                Ok(false) => {}
                Err(e) => log::warn!("Cannot persist entry for {}: {}", paths[0].display(), e),
            }
            paths.extend(self.waiting.remove(&key).unwrap_or_default());
        }

        for path in paths {
            self.notify(path, key, entry.clone());
        }
    }

    /// The file of an extraction vanished; hand the key to the next waiter.
    fn on_unreadable(&mut self, request: ExtractionRequest) {
        let ExtractionRequest { key, path } = request;
        self.drop_request(&path);

        let Some(key) = key else {
            return;
        };
        let Some(mut waiters) = self.waiting.remove(&key) else {
            return;
        };
        if let Some(next) = waiters.pop() {
            log::trace!("Extracting {:?} from {} instead", key, next.display());
            self.waiting.insert(key, waiters);
            self.extraction.push(ExtractionRequest {
                key: Some(key),
                path: next,
            });
        }
    }

    fn drop_request(&self, path: &Path) {
        log::debug!("Dropping unreadable {}", path.display());
        self.settle();
    }

    fn notify(&self, path: PathBuf, key: Option<ContentKey>, entry: DataEntry) {
        if self.finished.send(Finished { path, key, entry }).is_err() {
            log::trace!("No receiver for finished notification");
        }
        self.settle();
    }

    fn settle(&self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}
