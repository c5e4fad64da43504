//! Mimetype and thumbnail extraction stage.
//!
//! For each request the [`Extractor`] detects the mimetype (content sniffing
//! up to the size cap, extension only above it), renders the thumbnail
//! chain for images and pulls embedded icons out of executables. A request
//! always yields a [`WorkItem`] as long as the file can be read, even when
//! nothing could be rendered. Unreadable files come back as
//! [`Extraction::Unreadable`] so the caller can release the request.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::cache::{ContentKey, DataEntry, WorkItem};
use crate::hashing::DEFAULT_MAX_HASH_SIZE;
use crate::media::{self, mime, ExecutableIconExtractor, NoExecutableIcons};
use crate::worker::{Job, WorkerLoop};

/// One file waiting for extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    /// Key the result will be stored under, if the content was hashed.
    pub key: Option<ContentKey>,
    /// File to inspect.
    pub path: PathBuf,
}

/// What the extraction stage reports for one request.
#[derive(Debug, Clone)]
pub enum Extraction {
    /// The file was read; the entry may carry only a mimetype.
    Done(WorkItem),
    /// The file could not be opened or read.
    Unreadable(ExtractionRequest),
}

/// Derives a [`DataEntry`] from a file.
pub struct Extractor {
    max_size: u64,
    jumbo_icons: bool,
    icons: Box<dyn ExecutableIconExtractor>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HASH_SIZE, true, Box::new(NoExecutableIcons))
    }
}

impl Extractor {
    /// Create an extractor.
    ///
    /// Files larger than `max_size` are identified by extension only and get
    /// no thumbnails. With `jumbo_icons`, executables also contribute their
    /// jumbo icon when it is not mostly transparent.
    #[must_use]
    pub fn new(
        max_size: u64,
        jumbo_icons: bool,
        icons: Box<dyn ExecutableIconExtractor>,
    ) -> Self {
        Self {
            max_size,
            jumbo_icons,
            icons,
        }
    }

    /// Extract the mimetype and thumbnails of `path`.
    pub fn extract(&self, path: &Path) -> io::Result<DataEntry> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        if size > self.max_size {
            return Ok(DataEntry::with_mime(mime::detect(path, None)));
        }

        let mut content = Vec::with_capacity(size as usize);
        file.take(self.max_size).read_to_end(&mut content)?;

        let mut entry = DataEntry::with_mime(mime::detect(path, Some(&content)));
        if mime::is_image(&entry.mime_type) {
            match image::load_from_memory(&content) {
                Ok(img) => entry.thumbnails = media::thumbnail_chain(&img),
                Err(e) => log::debug!("Cannot decode {}: {}", path.display(), e),
            }
        } else if mime::is_executable(&entry.mime_type) {
            entry.thumbnails = self.executable_icons(path);
        }
        Ok(entry)
    }

    /// Jumbo icon first (when usable), then the regular icon.
    fn executable_icons(&self, path: &Path) -> Vec<image::RgbaImage> {
        let mut icons = Vec::new();
        if self.jumbo_icons {
            match self.icons.jumbo_icon(path) {
                Some(jumbo) if !media::is_mostly_transparent(&jumbo) => icons.push(jumbo),
                Some(_) => log::trace!("Discarding transparent jumbo icon of {}", path.display()),
                None => {}
            }
        }
        if let Some(icon) = self.icons.icon(path) {
            icons.push(icon);
        }
        icons
    }
}

impl Job for Extractor {
    type Input = ExtractionRequest;
    type Output = Extraction;

    fn run(&mut self, request: ExtractionRequest) -> Option<Extraction> {
        Some(match self.extract(&request.path) {
            Ok(entry) => Extraction::Done(WorkItem {
                key: request.key,
                path: request.path,
                entry,
            }),
            Err(e) => {
                log::debug!("Cannot extract {}: {}", request.path.display(), e);
                Extraction::Unreadable(request)
            }
        })
    }
}

/// Background loop extracting queued requests, newest first.
pub type ExtractionWorker = WorkerLoop<Extractor>;

/// Start an extraction loop reporting to `results`.
pub fn spawn_extraction_worker(
    extractor: Extractor,
    results: Sender<Extraction>,
    idle_interval: Duration,
) -> io::Result<ExtractionWorker> {
    WorkerLoop::spawn("thumbcache-extractor", extractor, results, idle_interval)
}
